//! BaaS adapters for the alumni admin ports.
//!
//! - [`pg`]: the `pending_registrations`, `users` and `user_profiles` tables
//! - [`identity`]: the auth admin API
//! - [`email`]: the transactional email provider

pub mod email;
pub mod identity;
pub mod pg;

pub use email::{HttpEmailSender, DEFAULT_EMAIL_API_URL};
pub use identity::AuthAdminClient;
pub use pg::{PgProfileStore, PgRegistrationStore, PgStores, PgUserStore};
