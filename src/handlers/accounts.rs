//! POST /api/admin/create-user: provision an account directly.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use alumni_core::{ApprovalError, NewAccount, ProfileFields, Role};

use crate::error::AppError;
use crate::handlers::registrations::ApproveResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
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

impl CreateUserRequest {
    fn into_account(self) -> Result<NewAccount, ApprovalError> {
        let role = match self.role.as_deref().map(str::trim) {
            None | Some("") => Role::default(),
            Some(raw) => raw.parse().map_err(ApprovalError::InvalidInput)?,
        };
        Ok(NewAccount {
            email: self.email,
            password: self.password,
            role,
            profile: ProfileFields {
                first_name: self.first_name,
                last_name: self.last_name,
                student_id: self.student_id,
                graduation_year: self.graduation_year,
                program: self.program,
                phone: self.phone,
                address: self.address,
                city: self.city,
                country: self.country,
                current_job: self.current_job,
                company: self.company,
                profile_image_url: self.profile_image_url,
            },
        })
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Json<ApproveResponse>, AppError> {
    let Json(request) =
        payload.map_err(|rejection| ApprovalError::InvalidInput(rejection.body_text()))?;
    let account = request.into_account()?;
    let approval = state.service.create_account(account).await?;
    Ok(Json(ApproveResponse {
        success: true,
        user_id: approval.user_id,
        warning: None,
    }))
}
