//! Approval prompts raised by agent sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::SessionId;

/// An outstanding request for operator approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub session_id: SessionId,
    /// Short summary of the action (e.g. the command to run)
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Operator answer to an approval prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

impl ApprovalDecision {
    pub fn label(self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Deny => "denied",
        }
    }
}

/// Pick the prompt to show among several outstanding ones
///
/// The latest `created_at` wins; on equal timestamps the earlier candidate
/// in input order is kept. Missing timestamps sort before any known one.
pub fn select_approval_request<'a, I>(candidates: I) -> Option<&'a ApprovalRequest>
where
    I: IntoIterator<Item = Option<&'a ApprovalRequest>>,
{
    candidates
        .into_iter()
        .flatten()
        .fold(None, |best: Option<&'a ApprovalRequest>, next| match best {
            Some(current) if next.created_at <= current.created_at => Some(current),
            _ => Some(next),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(id: &str, secs: Option<i64>) -> Option<ApprovalRequest> {
        Some(ApprovalRequest {
            id: id.to_string(),
            session_id: "s1".to_string(),
            title: format!("run {}", id),
            detail: None,
            created_at: secs.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        })
    }

    fn select(candidates: &[Option<ApprovalRequest>]) -> Option<&ApprovalRequest> {
        select_approval_request(candidates.iter().map(Option::as_ref))
    }

    #[test]
    fn latest_wins() {
        let candidates = vec![request("a", Some(10)), None, request("b", Some(20))];
        assert_eq!(select(&candidates).unwrap().id, "b");
    }

    #[test]
    fn ties_keep_input_order() {
        let candidates = vec![request("a", Some(10)), request("b", Some(10))];
        assert_eq!(select(&candidates).unwrap().id, "a");
    }

    #[test]
    fn empty_or_all_none() {
        assert!(select(&[]).is_none());
        assert!(select(&[None, None]).is_none());
    }

    #[test]
    fn missing_timestamp_loses_to_known() {
        let candidates = vec![request("a", None), request("b", Some(1))];
        assert_eq!(select(&candidates).unwrap().id, "b");
    }
}
