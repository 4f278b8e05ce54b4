use thiserror::Error;

use crate::ports::PortError;
use crate::saga::{Orphan, Step, StepFailure};

/// Failure of an admin operation, tagged with the step that failed.
///
/// Variants raised after a write carry the resources whose compensation
/// failed, so manual cleanup is never silently skipped.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("registration {0} is already being approved")]
    AlreadyInProgress(String),

    #[error("identity provisioning failed: {message}")]
    IdentityProvisioningFailed {
        message: String,
        orphans: Vec<Orphan>,
    },

    #[error("user write failed: {message}")]
    UserWriteFailed {
        message: String,
        orphans: Vec<Orphan>,
    },

    #[error("profile write failed: {message}")]
    ProfileWriteFailed {
        message: String,
        orphans: Vec<Orphan>,
    },

    #[error("user {user_id} approved but pending registration cleanup failed: {message}")]
    CleanupFailed { user_id: String, message: String },

    #[error("{step} timed out after {timeout_ms}ms")]
    Timeout {
        step: Step,
        timeout_ms: u64,
        orphans: Vec<Orphan>,
    },

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("email delivery failed: {0}")]
    EmailFailed(String),

    #[error("unexpected: {0}")]
    Unexpected(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ApprovalError>;

impl ApprovalError {
    /// Build the error for a failed forward step, after compensation ran.
    pub fn from_step(step: Step, failure: StepFailure, orphans: Vec<Orphan>) -> Self {
        let port_error = match failure {
            StepFailure::TimedOut(timeout) => {
                return Self::Timeout {
                    step,
                    timeout_ms: timeout.as_millis() as u64,
                    orphans,
                }
            }
            StepFailure::Port(e) => e,
        };
        let message = port_error.to_string();
        match step {
            Step::FetchRegistration => {
                Self::NotFound(format!("Registration not found: {}", message))
            }
            Step::ProvisionIdentity => Self::IdentityProvisioningFailed { message, orphans },
            Step::WriteUser => Self::UserWriteFailed { message, orphans },
            Step::WriteProfile => Self::ProfileWriteFailed { message, orphans },
            Step::SendEmail => Self::EmailFailed(message),
            Step::DeleteRegistration => match port_error {
                PortError::Other(e) => Self::Unexpected(e),
                _ => Self::Unexpected(anyhow::anyhow!(message)),
            },
        }
    }

    /// The step this error is attributed to, when there is one.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::NotFound(_) | Self::AlreadyInProgress(_) => Some(Step::FetchRegistration),
            Self::IdentityProvisioningFailed { .. } => Some(Step::ProvisionIdentity),
            Self::UserWriteFailed { .. } => Some(Step::WriteUser),
            Self::ProfileWriteFailed { .. } => Some(Step::WriteProfile),
            Self::CleanupFailed { .. } => Some(Step::DeleteRegistration),
            Self::Timeout { step, .. } => Some(*step),
            Self::EmailFailed(_) => Some(Step::SendEmail),
            Self::InvalidInput(_) | Self::NotConfigured(_) | Self::Unexpected(_) => None,
        }
    }

    /// Resources left behind by failed compensations.
    pub fn orphans(&self) -> &[Orphan] {
        match self {
            Self::IdentityProvisioningFailed { orphans, .. }
            | Self::UserWriteFailed { orphans, .. }
            | Self::ProfileWriteFailed { orphans, .. }
            | Self::Timeout { orphans, .. } => orphans,
            _ => &[],
        }
    }

    /// True when the operation logically succeeded and only cleanup is left.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::CleanupFailed { .. })
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::AlreadyInProgress(_) => 409,
            Self::IdentityProvisioningFailed { .. } => 403,
            Self::UserWriteFailed { .. } | Self::ProfileWriteFailed { .. } => 400,
            Self::CleanupFailed { .. } => 200,
            Self::Timeout { .. } => 504,
            Self::NotConfigured(_) => 503,
            Self::EmailFailed(_) => 502,
            Self::Unexpected(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saga::Resource;
    use std::time::Duration;

    fn orphan() -> Orphan {
        Orphan {
            resource: Resource::Identity,
            id: "id-1".into(),
            message: "unavailable: down".into(),
        }
    }

    #[test]
    fn http_status_follows_failing_step() {
        assert_eq!(ApprovalError::InvalidInput("x".into()).http_status(), 400);
        assert_eq!(ApprovalError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ApprovalError::AlreadyInProgress("r1".into()).http_status(), 409);
        assert_eq!(
            ApprovalError::IdentityProvisioningFailed {
                message: "dup".into(),
                orphans: vec![]
            }
            .http_status(),
            403
        );
        assert_eq!(
            ApprovalError::UserWriteFailed {
                message: "x".into(),
                orphans: vec![]
            }
            .http_status(),
            400
        );
        assert_eq!(
            ApprovalError::ProfileWriteFailed {
                message: "x".into(),
                orphans: vec![]
            }
            .http_status(),
            400
        );
        assert_eq!(ApprovalError::NotConfigured("x".into()).http_status(), 503);
        assert_eq!(ApprovalError::EmailFailed("x".into()).http_status(), 502);
        assert_eq!(
            ApprovalError::Unexpected(anyhow::anyhow!("boom")).http_status(),
            500
        );
    }

    #[test]
    fn timeout_failure_maps_to_timeout_with_step() {
        let err = ApprovalError::from_step(
            Step::WriteUser,
            StepFailure::TimedOut(Duration::from_millis(250)),
            vec![orphan()],
        );
        assert_eq!(err.http_status(), 504);
        assert_eq!(err.step(), Some(Step::WriteUser));
        assert_eq!(err.orphans().len(), 1);
        assert_eq!(err.to_string(), "write_user timed out after 250ms");
    }

    #[test]
    fn port_failure_maps_by_step() {
        let err = ApprovalError::from_step(
            Step::ProvisionIdentity,
            StepFailure::Port(PortError::Conflict("email already registered".into())),
            vec![],
        );
        assert!(matches!(
            err,
            ApprovalError::IdentityProvisioningFailed { .. }
        ));
        assert_eq!(
            err.to_string(),
            "identity provisioning failed: conflict: email already registered"
        );

        let err = ApprovalError::from_step(
            Step::WriteProfile,
            StepFailure::Port(PortError::Rejected("bad column".into())),
            vec![orphan()],
        );
        assert!(matches!(err, ApprovalError::ProfileWriteFailed { .. }));
        assert_eq!(err.orphans()[0].id, "id-1");
    }

    #[test]
    fn only_cleanup_failure_is_a_warning() {
        let cleanup = ApprovalError::CleanupFailed {
            user_id: "u1".into(),
            message: "db down".into(),
        };
        assert!(cleanup.is_warning());
        assert_eq!(cleanup.step(), Some(Step::DeleteRegistration));
        assert!(!ApprovalError::NotFound("x".into()).is_warning());
    }
}
