//! Saga coordinator for multi-step provisioning across services that share
//! no transaction.
//!
//! Each forward step runs under a bounded timeout. After a step succeeds the
//! caller registers its compensating action; on failure [`Saga::compensate`]
//! runs the registered actions newest-first. A compensation that fails is
//! never retried: it is returned as an [`Orphan`] so the caller can surface it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::ports::{PortError, PortResult};

/// Forward steps of the provisioning workflows, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    FetchRegistration,
    ProvisionIdentity,
    WriteUser,
    WriteProfile,
    DeleteRegistration,
    SendEmail,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::FetchRegistration => "fetch_registration",
            Step::ProvisionIdentity => "provision_identity",
            Step::WriteUser => "write_user",
            Step::WriteProfile => "write_profile",
            Step::DeleteRegistration => "delete_registration",
            Step::SendEmail => "send_email",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of resource a compensation undoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    RegistrationClaim,
    Identity,
    User,
    Profile,
}

/// A resource left behind because its compensation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Orphan {
    pub resource: Resource,
    pub id: String,
    pub message: String,
}

impl fmt::Display for Orphan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} ({})", self.resource, self.id, self.message)
    }
}

/// Why a forward step did not complete.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

// Sync so that `&Saga` stays Send across the awaits in `run`.
type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, PortResult<()>> + Send + Sync>;

struct Compensator {
    resource: Resource,
    id: String,
    action: Compensation,
}

pub struct Saga {
    name: &'static str,
    step_timeout: Duration,
    compensations: Vec<Compensator>,
}

impl Saga {
    pub fn new(name: &'static str, step_timeout: Duration) -> Self {
        Self {
            name,
            step_timeout,
            compensations: Vec::new(),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Run one forward step under the step timeout.
    pub async fn run<T, F>(&self, step: Step, action: F) -> Result<T, StepFailure>
    where
        F: Future<Output = PortResult<T>>,
    {
        match tokio::time::timeout(self.step_timeout, action).await {
            Ok(Ok(value)) => {
                info!(saga = self.name, step = %step, "step completed");
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!(saga = self.name, step = %step, error = %e, "step failed");
                Err(StepFailure::Port(e))
            }
            Err(_) => {
                warn!(
                    saga = self.name,
                    step = %step,
                    timeout_ms = self.step_timeout.as_millis() as u64,
                    "step timed out"
                );
                Err(StepFailure::TimedOut(self.step_timeout))
            }
        }
    }

    /// Register the action that undoes a completed step.
    pub fn on_rollback<F, Fut>(&mut self, resource: Resource, id: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PortResult<()>> + Send + 'static,
    {
        self.compensations.push(Compensator {
            resource,
            id: id.into(),
            action: Box::new(move || Box::pin(action())),
        });
    }

    pub fn pending_compensations(&self) -> usize {
        self.compensations.len()
    }

    /// Undo every registered step, newest first.
    ///
    /// A compensation whose target is already gone counts as done.
    pub async fn compensate(&mut self) -> Vec<Orphan> {
        let mut orphans = Vec::new();
        while let Some(compensator) = self.compensations.pop() {
            let Compensator {
                resource,
                id,
                action,
            } = compensator;
            let message = match tokio::time::timeout(self.step_timeout, action()).await {
                Ok(Ok(())) | Ok(Err(PortError::NotFound(_))) => {
                    info!(saga = self.name, resource = ?resource, id = %id, "compensated");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!(
                    "compensation timed out after {}ms",
                    self.step_timeout.as_millis()
                ),
            };
            error!(
                saga = self.name,
                resource = ?resource,
                id = %id,
                error = %message,
                "compensation failed, resource orphaned"
            );
            orphans.push(Orphan {
                resource,
                id,
                message,
            });
        }
        orphans
    }

    /// Keep every completed step; discards the compensations.
    pub fn commit(&mut self) {
        self.compensations.clear();
    }
}

impl Drop for Saga {
    fn drop(&mut self) {
        if !self.compensations.is_empty() {
            warn!(
                saga = self.name,
                pending = self.compensations.len(),
                "saga dropped without commit or compensation"
            );
        }
    }
}
