//! Domain types for the registration and account tables.
//!
//! Row types use the column names of the BaaS tables (`snake_case`), so they
//! serialize the same way the portal reads them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A self-submitted registration awaiting admin review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub current_job: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PendingRegistration {
    /// Minimal registration with only the required fields set.
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            student_id: None,
            graduation_year: None,
            program: None,
            phone: None,
            address: None,
            city: None,
            country: None,
            profile_image_url: None,
            current_job: None,
            company: None,
            created_at: None,
        }
    }

    /// Profile fields copied verbatim into the approved user's profile.
    pub fn profile_fields(&self) -> ProfileFields {
        ProfileFields {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            student_id: self.student_id.clone(),
            graduation_year: self.graduation_year,
            program: self.program.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            current_job: self.current_job.clone(),
            company: self.company.clone(),
            profile_image_url: self.profile_image_url.clone(),
        }
    }
}

/// Account role stored on the `users` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Alumni,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Alumni => "alumni",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alumni" => Ok(Role::Alumni),
            "admin" => Ok(Role::Admin),
            other => Err(format!(
                "unknown role '{}', expected 'alumni' or 'admin'",
                other
            )),
        }
    }
}

/// Account status stored on the `users` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Approved,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Approved => "approved",
        }
    }
}

/// Request to create an identity in the external identity service.
#[derive(Clone, PartialEq)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub confirmed: bool,
}

impl fmt::Debug for NewIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewIdentity")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("confirmed", &self.confirmed)
            .finish()
    }
}

/// Identity as returned by the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub confirmed: bool,
}

/// Canonical account row. `id` is always the identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub is_verified: bool,
}

impl NewUser {
    /// An approved, verified account for an existing identity.
    pub fn approved(identity: &Identity, role: Role) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            role,
            status: AccountStatus::Approved,
            is_verified: true,
        }
    }
}

/// Personal and academic profile fields, without the owning user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub current_job: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// Profile row keyed by user id (1:1 with `users`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(flatten)]
    pub fields: ProfileFields,
}

/// Admin-initiated account that bypasses self-registration.
#[derive(Clone, Default)]
pub struct NewAccount {
    pub email: String,
    pub password: Option<String>,
    pub role: Role,
    pub profile: ProfileFields,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Outcome of a successful provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub user_id: String,
}

/// Outbound transactional email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Provider acknowledgement for a sent email.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReceipt {
    pub success: bool,
    pub provider_response: serde_json::Value,
}
