use thiserror::Error;

/// Error taxonomy shared by every orchestrator operation.
///
/// Variants map one-to-one onto an [`ErrorKind`] bucket, and every bucket has a
/// fixed HTTP status so a REST front-end can translate without inspecting
/// messages.
#[derive(Debug, Error)]
pub enum OrchError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Schema or semantic rejection of caller input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Malformed body or upload (oversize blob, not a gzipped tar).
    #[error("unprocessable payload: {0}")]
    InvalidPayload(String),

    #[error("failed to build app context: {0:#}")]
    ContextBuildFailed(anyhow::Error),

    #[error("placement controller {controller} rejected context: {message}")]
    PlacementRejected { controller: String, message: String },

    #[error("action controller {controller} failed: {message}")]
    ActionFailed { controller: String, message: String },

    #[error("sync engine rejected request: {0}")]
    SyncFailed(String),

    #[error("operation not permitted: {0}")]
    StateInvalid(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Coarse error classes, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    ContextBuildFailed,
    PlacementRejected,
    ActionFailed,
    SyncFailed,
    StateInvalid,
    Backend,
}

impl OrchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchError::NotFound(_) => ErrorKind::NotFound,
            OrchError::Conflict(_) => ErrorKind::Conflict,
            OrchError::Validation(_) | OrchError::InvalidPayload(_) => ErrorKind::Validation,
            OrchError::ContextBuildFailed(_) => ErrorKind::ContextBuildFailed,
            OrchError::PlacementRejected { .. } => ErrorKind::PlacementRejected,
            OrchError::ActionFailed { .. } => ErrorKind::ActionFailed,
            OrchError::SyncFailed(_) => ErrorKind::SyncFailed,
            OrchError::StateInvalid(_) => ErrorKind::StateInvalid,
            OrchError::Database(_)
            | OrchError::Serialization(_)
            | OrchError::Io(_)
            | OrchError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// HTTP status code an ingress layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            OrchError::NotFound(_) => 404,
            OrchError::Conflict(_) => 409,
            OrchError::Validation(_) => 400,
            OrchError::InvalidPayload(_) => 422,
            _ => 500,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        OrchError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        OrchError::Validation(msg.into())
    }

    pub fn state_invalid(msg: impl Into<String>) -> Self {
        OrchError::StateInvalid(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, OrchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(OrchError::not_found("project p").http_status(), 404);
        assert_eq!(OrchError::Conflict("dup".into()).http_status(), 409);
        assert_eq!(OrchError::validation("bad leaf").http_status(), 400);
        assert_eq!(OrchError::InvalidPayload("too big".into()).http_status(), 422);
        assert_eq!(OrchError::state_invalid("nope").http_status(), 500);
        assert_eq!(
            OrchError::SyncFailed("down".into()).kind(),
            ErrorKind::SyncFailed
        );
    }

    #[test]
    fn test_payload_errors_are_validation_kind() {
        let err = OrchError::InvalidPayload("not a gzipped tar".into());
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_context_build_failed_keeps_cause_chain() {
        let cause = anyhow::anyhow!("chart missing").context("rendering app web");
        let err = OrchError::ContextBuildFailed(cause);
        let text = err.to_string();
        assert!(text.contains("rendering app web"));
        assert!(text.contains("chart missing"));
    }
}
