//! Alumni admin core: domain types, port traits and the provisioning sagas.
//!
//! Nothing here performs I/O directly. The BaaS adapters live in
//! `alumni_backend`; the HTTP surface lives in the `alumni-admin` crate.

pub mod credentials;
pub mod error;
pub mod memory;
pub mod ports;
pub mod saga;
pub mod service;
pub mod types;

pub use error::{ApprovalError, Result};
pub use ports::{
    Claim, ClaimOutcome, EmailSender, IdentityProvider, PortError, PortResult, ProfileStore,
    RegistrationStore, UserStore,
};
pub use saga::{Orphan, Resource, Saga, Step, StepFailure};
pub use service::{AdminService, ServiceConfig};
pub use types::*;
