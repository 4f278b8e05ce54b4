//! Pending-registration handlers.
//!
//! POST   /api/admin/approve-registration   approve and provision
//! GET    /api/admin/registrations          list pending registrations
//! DELETE /api/admin/registrations/:id      reject (or finish a failed cleanup)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use alumni_core::{ApprovalError, PendingRegistration};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    #[serde(default)]
    pub registration_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub success: bool,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A missing or unparseable body is treated the same as a missing id.
pub async fn approve_registration(
    State(state): State<AppState>,
    payload: Option<Json<ApproveRequest>>,
) -> Result<Json<ApproveResponse>, AppError> {
    let registration_id = payload
        .and_then(|Json(request)| request.registration_id)
        .unwrap_or_default();

    match state.service.approve_registration(&registration_id).await {
        Ok(approval) => Ok(Json(ApproveResponse {
            success: true,
            user_id: approval.user_id,
            warning: None,
        })),
        Err(ApprovalError::CleanupFailed { user_id, message }) => {
            tracing::warn!(
                registration_id = %registration_id,
                user_id = %user_id,
                %message,
                "approved with stale pending registration"
            );
            Ok(Json(ApproveResponse {
                success: true,
                user_id,
                warning: Some(format!(
                    "pending registration could not be removed: {}",
                    message
                )),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub registrations: Vec<PendingRegistration>,
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let registrations = state.service.list_pending(query.limit).await?;
    Ok(Json(ListResponse {
        success: true,
        registrations,
    }))
}

pub async fn reject_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.service.reject_registration(&id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
