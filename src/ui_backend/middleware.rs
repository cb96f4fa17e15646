//! Command Middleware
//!
//! Provides a pipeline pattern for processing commands with logging,
//! normalization, mode routing and validation before they reach the
//! reducer.

use crate::core::ValidationError;

use super::commands::Command;
use super::mode::{self, ModeRoute, UiMode};

/// What the middlewares can see of the reducer state
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub mode: &'a UiMode,
    pub focused_session: Option<&'a str>,
}

/// Result of middleware processing
#[derive(Debug, Clone)]
pub enum MiddlewareResult {
    /// Continue processing with this command
    Continue(Command),
    /// Transform the command into another command
    Transform(Command),
    /// Drop the command silently
    Block,
    /// Drop the command and tell the operator why
    Reject(ValidationError),
}

/// Middleware function type
pub type MiddlewareFn =
    Box<dyn Fn(&Command, &CommandContext<'_>) -> MiddlewareResult + Send + Sync + 'static>;

/// Command pipeline that applies middlewares in sequence
pub struct CommandPipeline {
    middlewares: Vec<MiddlewareFn>,
}

impl CommandPipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// The pipeline the reducer runs every command through
    pub fn standard() -> Self {
        Self::new()
            .with_middleware(Box::new(logging_middleware))
            .with_middleware(Box::new(normalization_middleware))
            .with_middleware(Box::new(mode_middleware))
            .with_middleware(Box::new(validation_middleware))
    }

    /// Add a middleware to the pipeline
    pub fn with_middleware(mut self, middleware: MiddlewareFn) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Process a command through the middleware pipeline
    ///
    /// Returns `Ok(Some(cmd))` if the command should be processed,
    /// `Ok(None)` if it was blocked and `Err` if it was rejected.
    pub fn process(
        &self,
        cmd: Command,
        ctx: &CommandContext<'_>,
    ) -> Result<Option<Command>, ValidationError> {
        let mut current = cmd;

        for middleware in &self.middlewares {
            match middleware(&current, ctx) {
                MiddlewareResult::Continue(c) => current = c,
                MiddlewareResult::Transform(c) => current = c,
                MiddlewareResult::Block => return Ok(None),
                MiddlewareResult::Reject(err) => return Err(err),
            }
        }

        Ok(Some(current))
    }
}

impl Default for CommandPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Built-in Middlewares ==========

/// Logging middleware - logs all commands
pub fn logging_middleware(cmd: &Command, ctx: &CommandContext<'_>) -> MiddlewareResult {
    tracing::debug!(command = ?cmd, mode = ?ctx.mode.kind(), "Processing command");
    MiddlewareResult::Continue(cmd.clone())
}

/// Normalization middleware - canonical line endings, no trailing blanks
pub fn normalization_middleware(cmd: &Command, _ctx: &CommandContext<'_>) -> MiddlewareResult {
    if let Command::SendMessage(text) = cmd {
        let normalized = text.replace("\r\n", "\n");
        let normalized = normalized.trim_end();
        if normalized != text {
            return MiddlewareResult::Transform(Command::SendMessage(normalized.to_string()));
        }
    }

    MiddlewareResult::Continue(cmd.clone())
}

/// Mode middleware - defers to the handler of the current mode
pub fn mode_middleware(cmd: &Command, ctx: &CommandContext<'_>) -> MiddlewareResult {
    match mode::dispatch(ctx.mode, cmd.clone()) {
        ModeRoute::Forward(c) => MiddlewareResult::Continue(c),
        ModeRoute::Rewrite(c) => MiddlewareResult::Transform(c),
        ModeRoute::Reject(err) => MiddlewareResult::Reject(err),
        ModeRoute::Drop => MiddlewareResult::Block,
    }
}

/// Validation middleware - rejects invalid input with a reason
pub fn validation_middleware(cmd: &Command, ctx: &CommandContext<'_>) -> MiddlewareResult {
    if let Command::SendMessage(text) = cmd {
        if text.trim().is_empty() {
            return MiddlewareResult::Reject(ValidationError::EmptyMessage);
        }
        if ctx.focused_session.is_none() {
            return MiddlewareResult::Reject(ValidationError::NoSessionSelected);
        }
    }

    MiddlewareResult::Continue(cmd.clone())
}
