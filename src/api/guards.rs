use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::Exam;
use crate::db::types::UserRole;

/// Caller identity decoded from the bearer token. Nothing is looked up locally.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) id: String,
    pub(crate) role: UserRole,
    pub(crate) name: String,
    pub(crate) class_id: Option<String>,
}

impl Identity {
    pub(crate) fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

pub(crate) struct CurrentUser(pub(crate) Identity);
pub(crate) struct CurrentStudent(pub(crate) Identity);
pub(crate) struct CurrentTeacher(pub(crate) Identity);
pub(crate) struct CurrentAdmin(pub(crate) Identity);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        let name = claims.name.unwrap_or_else(|| claims.sub.clone());
        Ok(CurrentUser(Identity {
            id: claims.sub,
            role: claims.role,
            name,
            class_id: claims.class_id,
        }))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        if identity.role == UserRole::Student {
            Ok(CurrentStudent(identity))
        } else {
            Err(ApiError::Forbidden("Student access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentTeacher {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        match identity.role {
            UserRole::Teacher | UserRole::Admin => Ok(CurrentTeacher(identity)),
            UserRole::Student => Err(ApiError::Forbidden("Teacher access required")),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        if identity.is_admin() {
            Ok(CurrentAdmin(identity))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

pub(crate) fn require_exam_owner(exam: &Exam, identity: &Identity) -> Result<(), ApiError> {
    if identity.is_admin() || exam.teacher_id == identity.id {
        return Ok(());
    }

    Err(ApiError::Forbidden("Not enough permissions for this exam"))
}
