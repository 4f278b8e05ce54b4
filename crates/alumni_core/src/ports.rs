//! Port traits for the external collaborators.
//! Implemented by alumni_backend; the services depend only on these traits.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::*;

/// Failure reported by a port implementation, already parsed from the
/// collaborator's raw response.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PortResult<T> = std::result::Result<T, PortError>;

/// A held approval claim. Only the token holder may release it.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub registration: PendingRegistration,
    pub token: String,
}

/// Result of trying to claim a pending registration for approval.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The caller now holds the claim.
    Claimed(Claim),
    /// The record exists but another approval holds a live claim.
    Busy,
    /// No record with that id.
    Missing,
}

/// Access to the `pending_registrations` table.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Atomically mark the registration as being approved.
    ///
    /// Succeeds when the record is unclaimed or its claim is older than `ttl`.
    async fn claim(&self, id: &str, ttl: Duration) -> PortResult<ClaimOutcome>;

    /// Drop a claim taken by [`RegistrationStore::claim`].
    ///
    /// A no-op when the claim has since expired and been taken by another
    /// approval holding a different token.
    async fn release(&self, id: &str, token: &str) -> PortResult<()>;

    /// Delete the registration. Returns false when no row matched.
    async fn delete(&self, id: &str) -> PortResult<bool>;

    /// Oldest-first listing for the review screen.
    async fn list(&self, limit: i64) -> PortResult<Vec<PendingRegistration>>;
}

/// Access to the `users` table.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &NewUser) -> PortResult<()>;
    async fn delete(&self, user_id: &str) -> PortResult<()>;
}

/// Access to the `user_profiles` table.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn insert(&self, profile: &UserProfile) -> PortResult<()>;
    async fn delete(&self, user_id: &str) -> PortResult<()>;
}

/// The external identity service, called with the elevated credential.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_identity(&self, request: &NewIdentity) -> PortResult<Identity>;
    async fn delete_identity(&self, identity_id: &str) -> PortResult<()>;
}

/// Transactional email provider.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> PortResult<EmailReceipt>;
}
