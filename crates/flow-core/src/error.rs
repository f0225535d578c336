use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

/// Error kinds named in the runtime's error taxonomy. `AtomError`, `Timeout`
/// and `Cancelled` carry the node id they occurred on so callers can route
/// the corresponding `atom.error` / quarantine bookkeeping without re-parsing
/// a message string.
#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("unknown atom: {0}")]
    UnknownAtom(String),
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
    #[error("license required")]
    LicenseRequired,
    #[error("license invalid: {0}")]
    LicenseInvalid(String),
    #[error("throttled")]
    Throttled,
    #[error("degraded skip")]
    DegradedSkip,
    #[error("atom error on node {node_id}: {message}")]
    AtomError { node_id: String, message: String },
    #[error("timeout on node {0}")]
    Timeout(String),
    #[error("cancelled")]
    Cancelled,
    #[error("node quarantined: {0}")]
    QuarantinedNode(String),
    #[error("sink overflow")]
    SinkOverflow,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::UnknownAtom(_) => 1001,
            Self::InvalidWorkflow(_) => 1002,
            Self::LicenseRequired => 1003,
            Self::LicenseInvalid(_) => 1004,
            Self::Throttled => 1005,
            Self::DegradedSkip => 1006,
            Self::AtomError { .. } => 1007,
            Self::Timeout(_) => 1008,
            Self::Cancelled => 1009,
            Self::QuarantinedNode(_) => 1010,
            Self::SinkOverflow => 1011,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(CoreReason::UnknownAtom("x".into()).error_code(), 1001);
        assert_eq!(CoreReason::Throttled.error_code(), 1005);
        assert_eq!(CoreReason::SinkOverflow.error_code(), 1011);
    }
}
