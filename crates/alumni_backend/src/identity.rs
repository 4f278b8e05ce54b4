//! Identity admin API client
//!
//! Creates and deletes identities through the BaaS auth admin endpoints
//! (`/auth/v1/admin/users`) using the service-role key. Responses are parsed
//! into explicit types as soon as they arrive.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use alumni_core::ports::{IdentityProvider, PortError, PortResult};
use alumni_core::types::{Identity, NewIdentity};

#[derive(Serialize)]
struct CreateUserBody<'a> {
    email: &'a str,
    password: &'a str,
    email_confirm: bool,
}

#[derive(Debug, Deserialize)]
struct AdminUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
}

/// Some deployments wrap the user object, others return it bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateUserResponse {
    Wrapped { user: AdminUser },
    Bare(AdminUser),
}

impl CreateUserResponse {
    fn into_user(self) -> AdminUser {
        match self {
            CreateUserResponse::Wrapped { user } => user,
            CreateUserResponse::Bare(user) => user,
        }
    }
}

/// Error body shapes returned by the auth service across versions.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AuthErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl AuthErrorBody {
    fn describe(&self) -> Option<&str> {
        [&self.msg, &self.message, &self.error_description, &self.error]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.trim().is_empty())
    }

    fn is_duplicate(&self) -> bool {
        matches!(self.error_code.as_deref(), Some("email_exists" | "user_already_exists"))
            || self
                .describe()
                .map(|m| m.to_lowercase().contains("already been registered"))
                .unwrap_or(false)
    }
}

/// Map a non-success auth response onto the port taxonomy.
pub(crate) fn classify_auth_error(status: StatusCode, body: &str) -> PortError {
    let parsed: AuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .describe()
        .map(str::to_string)
        .unwrap_or_else(|| format!("identity service returned {}", status));

    match status.as_u16() {
        404 => PortError::NotFound(message),
        400 | 409 | 422 if parsed.is_duplicate() => PortError::Conflict(message),
        400 | 409 | 422 => PortError::Rejected(message),
        401 | 403 => PortError::Rejected(format!("service credential rejected: {}", message)),
        429 | 500..=599 => PortError::Unavailable(message),
        _ => PortError::Other(anyhow!("identity service returned {}: {}", status, message)),
    }
}

pub(crate) fn classify_transport_error(err: reqwest::Error) -> PortError {
    if err.is_timeout() || err.is_connect() {
        PortError::Unavailable(err.to_string())
    } else {
        PortError::Other(err.into())
    }
}

/// Auth admin API client holding the elevated credential.
pub struct AuthAdminClient {
    http: Client,
    base_url: String,
    service_key: String,
}

impl AuthAdminClient {
    pub fn new(base_url: &str, service_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/admin{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Accept", "application/json")
    }
}

#[async_trait]
impl IdentityProvider for AuthAdminClient {
    async fn create_identity(&self, request: &NewIdentity) -> PortResult<Identity> {
        let body = CreateUserBody {
            email: &request.email,
            password: &request.password,
            email_confirm: request.confirmed,
        };
        let response = self
            .authorized(self.http.post(self.endpoint("/users")))
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;
        if !status.is_success() {
            return Err(classify_auth_error(status, &text));
        }

        let user = serde_json::from_str::<CreateUserResponse>(&text)
            .with_context(|| {
                format!(
                    "Failed to parse identity response: {}",
                    text.chars().take(200).collect::<String>()
                )
            })?
            .into_user();
        debug!(identity_id = %user.id, "identity created");

        Ok(Identity {
            email: user.email.unwrap_or_else(|| request.email.clone()),
            confirmed: user.email_confirmed_at.is_some() || request.confirmed,
            id: user.id,
        })
    }

    async fn delete_identity(&self, identity_id: &str) -> PortResult<()> {
        let response = self
            .authorized(
                self.http
                    .delete(self.endpoint(&format!("/users/{}", identity_id))),
            )
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(identity_id, "identity deleted");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(classify_auth_error(status, &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_email_is_a_conflict() {
        let err = classify_auth_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":422,"error_code":"email_exists","msg":"A user with this email address has already been registered"}"#,
        );
        match err {
            PortError::Conflict(message) => assert!(message.contains("already been registered")),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn legacy_duplicate_message_is_a_conflict() {
        let err = classify_auth_error(
            StatusCode::BAD_REQUEST,
            r#"{"message":"A user with this email address has already been registered"}"#,
        );
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[test]
    fn weak_password_is_rejected() {
        let err = classify_auth_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"error_code":"weak_password","msg":"Password should be at least 6 characters"}"#,
        );
        match err {
            PortError::Rejected(message) => assert!(message.contains("at least 6")),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn bad_service_key_is_rejected() {
        let err = classify_auth_error(StatusCode::UNAUTHORIZED, r#"{"message":"Invalid API key"}"#);
        match err {
            PortError::Rejected(message) => {
                assert_eq!(message, "service credential rejected: Invalid API key")
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn server_errors_are_unavailable_even_without_json() {
        let err = classify_auth_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        match err {
            PortError::Unavailable(message) => assert!(message.contains("502")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn missing_identity_is_not_found() {
        let err = classify_auth_error(StatusCode::NOT_FOUND, r#"{"msg":"User not found"}"#);
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[test]
    fn create_response_accepts_bare_and_wrapped_users() {
        let bare: CreateUserResponse = serde_json::from_str(
            r#"{"id":"u1","email":"a@b.edu","email_confirmed_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(bare.into_user().id, "u1");

        let wrapped: CreateUserResponse =
            serde_json::from_str(r#"{"user":{"id":"u2","email":"a@b.edu"}}"#).unwrap();
        assert_eq!(wrapped.into_user().id, "u2");
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let client =
            AuthAdminClient::new("https://project.example.co/", "key", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.endpoint("/users"),
            "https://project.example.co/auth/v1/admin/users"
        );
    }
}
