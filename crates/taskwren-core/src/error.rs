use taskwren_backend::BackendError;
use thiserror::Error;

/// Failures of the dispatch path.
///
/// Parse and validation failures are recoverable: their text is fed back to
/// the model as a correction hint, bounded by the configured retry budgets.
/// Backend failures are folded into the conversation as tool-result turns.
/// Only an exhausted budget or an unavailable model surfaces to the user,
/// and then as a generic apology naming the failure kind.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: parameter '{param}': {reason}")]
    InvalidArguments {
        tool: String,
        param: String,
        reason: String,
    },
    #[error("could not extract a tool call: {0}")]
    ToolCallParse(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl DispatchError {
    /// Short human-readable kind for the apology reply.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::DuplicateTool(_) => "duplicate tool",
            DispatchError::UnknownTool(_) => "unknown tool",
            DispatchError::InvalidArguments { .. } => "invalid tool arguments",
            DispatchError::ToolCallParse(_) => "malformed tool call",
            DispatchError::ModelUnavailable(_) => "model unavailable",
            DispatchError::Backend(_) => "backend failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_detail() {
        let err = DispatchError::InvalidArguments {
            tool: "create_task".into(),
            param: "due_date".into(),
            reason: "expected YYYY-MM-DD".into(),
        };
        let text = err.to_string();
        assert!(text.contains("create_task"));
        assert!(text.contains("due_date"));
        assert!(text.contains("YYYY-MM-DD"));
    }

    #[test]
    fn kinds_are_short_labels() {
        assert_eq!(
            DispatchError::ToolCallParse("junk".into()).kind(),
            "malformed tool call"
        );
        assert_eq!(
            DispatchError::ModelUnavailable("timeout".into()).kind(),
            "model unavailable"
        );
    }

    #[test]
    fn backend_errors_convert() {
        let err: DispatchError = BackendError::RateLimited("quota".into()).into();
        assert_eq!(err.kind(), "backend failure");
        assert!(err.to_string().contains("quota"));
    }
}
