//! UI mode dispatch
//!
//! The mode is a tagged union carrying its own state. A static table maps
//! each mode to the handler that routes commands in that mode, so the
//! reducer itself stays free of mode-specific rules.

use crate::core::ValidationError;

use super::commands::Command;

/// Current interaction mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UiMode {
    /// Navigating; nothing typed yet
    #[default]
    Browse,
    /// A draft is being composed for the focused session
    Compose,
    /// An approval prompt is on screen
    Approve { approval_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Browse,
    Compose,
    Approve,
}

impl UiMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::Browse => ModeKind::Browse,
            Self::Compose => ModeKind::Compose,
            Self::Approve { .. } => ModeKind::Approve,
        }
    }
}

/// What a mode handler decided about a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeRoute {
    Forward(Command),
    Rewrite(Command),
    Reject(ValidationError),
    Drop,
}

type ModeHandler = fn(&UiMode, Command) -> ModeRoute;

const DISPATCH: &[(ModeKind, ModeHandler)] = &[
    (ModeKind::Browse, route_idle),
    (ModeKind::Compose, route_idle),
    (ModeKind::Approve, route_approve),
];

/// Route `cmd` through the handler registered for `mode`
pub fn dispatch(mode: &UiMode, cmd: Command) -> ModeRoute {
    let kind = mode.kind();
    match DISPATCH.iter().find(|(k, _)| *k == kind) {
        Some((_, handler)) => handler(mode, cmd),
        None => ModeRoute::Forward(cmd),
    }
}

fn route_idle(_mode: &UiMode, cmd: Command) -> ModeRoute {
    match cmd {
        // No prompt on screen to answer
        Command::RespondApproval {
            approval_id: None, ..
        } => ModeRoute::Drop,
        other => ModeRoute::Forward(other),
    }
}

fn route_approve(mode: &UiMode, cmd: Command) -> ModeRoute {
    let UiMode::Approve { approval_id } = mode else {
        return ModeRoute::Forward(cmd);
    };
    match cmd {
        Command::SendMessage(_) => ModeRoute::Reject(ValidationError::ApprovalPending),
        Command::RespondApproval {
            approval_id: None,
            decision,
        } => ModeRoute::Rewrite(Command::RespondApproval {
            approval_id: Some(approval_id.clone()),
            decision,
        }),
        other => ModeRoute::Forward(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ApprovalDecision;

    fn approving() -> UiMode {
        UiMode::Approve {
            approval_id: "ap-1".into(),
        }
    }

    #[test]
    fn approve_mode_blocks_sending() {
        assert_eq!(
            dispatch(&approving(), Command::SendMessage("hi".into())),
            ModeRoute::Reject(ValidationError::ApprovalPending)
        );
        assert_eq!(
            dispatch(&UiMode::Compose, Command::SendMessage("hi".into())),
            ModeRoute::Forward(Command::SendMessage("hi".into()))
        );
    }

    #[test]
    fn approve_mode_fills_in_prompt_id() {
        let route = dispatch(
            &approving(),
            Command::RespondApproval {
                approval_id: None,
                decision: ApprovalDecision::Approve,
            },
        );
        assert_eq!(
            route,
            ModeRoute::Rewrite(Command::RespondApproval {
                approval_id: Some("ap-1".into()),
                decision: ApprovalDecision::Approve,
            })
        );
    }

    #[test]
    fn untargeted_response_outside_approve_is_dropped() {
        let route = dispatch(
            &UiMode::Browse,
            Command::RespondApproval {
                approval_id: None,
                decision: ApprovalDecision::Deny,
            },
        );
        assert_eq!(route, ModeRoute::Drop);
    }

    #[test]
    fn navigation_passes_every_mode() {
        for mode in [UiMode::Browse, UiMode::Compose, approving()] {
            assert_eq!(
                dispatch(&mode, Command::HistoryBack),
                ModeRoute::Forward(Command::HistoryBack)
            );
        }
    }
}
