//! POST /api/admin/test-email: send a fixed message through the provider.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use alumni_core::{ApprovalError, EmailReceipt};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: String,
}

pub async fn send_test_email(
    State(state): State<AppState>,
    payload: Result<Json<TestEmailRequest>, JsonRejection>,
) -> Result<Json<EmailReceipt>, AppError> {
    let Json(request) =
        payload.map_err(|rejection| ApprovalError::InvalidInput(rejection.body_text()))?;
    let receipt = state.service.send_test_email(&request.to).await?;
    Ok(Json(receipt))
}
