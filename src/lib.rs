//! alumni-admin: privileged admin API for the alumni portal.
//!
//! Wires the [`alumni_core::AdminService`] workflows to HTTP routes. The
//! binary in `main.rs` supplies the BaaS adapters from `alumni_backend`;
//! tests build the same router over the in-memory ports.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
