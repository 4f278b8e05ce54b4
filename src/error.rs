//! HTTP mapping for admin failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use alumni_core::{ApprovalError, Orphan, Step};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("missing or invalid admin token")]
    Unauthorized,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    orphans: Option<&'a [Orphan]>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Approval(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (step, orphans) = match &self {
            AppError::Approval(e) => (e.step(), e.orphans()),
            AppError::Unauthorized => (None, &[][..]),
        };

        if status.is_server_error() || !orphans.is_empty() {
            tracing::error!(%status, ?step, ?orphans, error = %self, "admin request failed");
        } else {
            tracing::warn!(%status, ?step, error = %self, "admin request rejected");
        }

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            step,
            orphans: (!orphans.is_empty()).then_some(orphans),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alumni_core::Resource;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_reports_fetch_step() {
        let err = ApprovalError::NotFound("Registration not found: r9".into());
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Registration not found: r9");
        assert_eq!(json["step"], "fetch_registration");
        assert!(json.get("orphans").is_none());
    }

    #[tokio::test]
    async fn orphans_are_reported() {
        let err = ApprovalError::UserWriteFailed {
            message: "rejected: bad role".into(),
            orphans: vec![Orphan {
                resource: Resource::Identity,
                id: "u1".into(),
                message: "unavailable: down".into(),
            }],
        };
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["orphans"][0]["id"], "u1");
    }

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
