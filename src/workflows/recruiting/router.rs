//! Thin HTTP surface over the recruiting services.
//!
//! Authentication lives upstream; the router only decodes the principal the
//! proxy injects via `x-user-id` / `x-roles` headers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::applications::{Application, ApplicationRepository, ApplicationService};
use super::catalog::CatalogRepository;
use super::domain::{ApplicationId, Principal, ProjectId, Role, UserId};
use super::notifications::NotificationSink;
use super::projects::ProjectRepository;
use super::settings::SettingsProvider;
use super::users::UserRepository;
use super::verification::{VerificationEngine, VerificationStore, VerificationTarget};
use super::wallet::WalletRepository;
use crate::error::CoreError;

pub struct RecruitingState<S, N, C> {
    pub applications: ApplicationService<S, N, C>,
    pub verification: VerificationEngine<S, N, C>,
}

/// Router builder exposing the recruiting endpoints.
pub fn recruiting_router<S, N, C>(state: Arc<RecruitingState<S, N, C>>) -> Router
where
    S: ApplicationRepository
        + ProjectRepository
        + CatalogRepository
        + UserRepository
        + WalletRepository
        + VerificationStore
        + 'static,
    N: NotificationSink + 'static,
    C: SettingsProvider + 'static,
{
    Router::new()
        .route(
            "/api/v1/recruiting/projects/:project_id/applications",
            post(start_draft_handler::<S, N, C>),
        )
        .route(
            "/api/v1/recruiting/applications/:application_id",
            get(status_handler::<S, N, C>),
        )
        .route(
            "/api/v1/recruiting/applications/:application_id/submit",
            post(submit_handler::<S, N, C>),
        )
        .route(
            "/api/v1/recruiting/verification/pending",
            get(pending_handler::<S, N, C>),
        )
        .route(
            "/api/v1/recruiting/verification/confirm",
            post(confirm_handler::<S, N, C>),
        )
        .with_state(state)
}

/// Decode the proxy-injected principal headers.
fn principal(headers: &HeaderMap) -> Result<Principal, CoreError> {
    let user = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CoreError::PermissionDenied("missing x-user-id header".to_string()))?;
    let roles = headers
        .get("x-roles")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .split(',')
        .filter_map(|label| match label.trim() {
            "super_admin" => Some(Role::SuperAdmin),
            "project_manager" => Some(Role::ProjectManager),
            "verifier" => Some(Role::Verifier),
            "reviewer" => Some(Role::Reviewer),
            "coach" => Some(Role::Coach),
            _ => None,
        })
        .collect::<Vec<_>>();
    Ok(Principal::new(UserId::new(user), roles))
}

fn status_view(application: &Application) -> serde_json::Value {
    json!({
        "application_id": application.id.as_str(),
        "status": application.status.label(),
        "auto_score": application.auto_score,
        "final_score": application.final_score,
        "frozen": application.is_frozen,
        "answers": application
            .answers
            .iter()
            .map(|answer| {
                json!({
                    "answer_id": answer.id.as_str(),
                    "catalog_item": answer.catalog_item.as_str(),
                    "document_status": answer.document_status.label(),
                    "item_score": answer.item_score,
                })
            })
            .collect::<Vec<_>>(),
    })
}

async fn start_draft_handler<S, N, C>(
    State(state): State<Arc<RecruitingState<S, N, C>>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: ApplicationRepository
        + ProjectRepository
        + CatalogRepository
        + UserRepository
        + WalletRepository
        + VerificationStore
        + 'static,
    N: NotificationSink + 'static,
    C: SettingsProvider + 'static,
{
    let result = principal(&headers).and_then(|principal| {
        state
            .applications
            .start_draft(&principal, &ProjectId::new(project_id))
    });
    match result {
        Ok(application) => {
            (StatusCode::CREATED, axum::Json(status_view(&application))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn status_handler<S, N, C>(
    State(state): State<Arc<RecruitingState<S, N, C>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationRepository
        + ProjectRepository
        + CatalogRepository
        + UserRepository
        + WalletRepository
        + VerificationStore
        + 'static,
    N: NotificationSink + 'static,
    C: SettingsProvider + 'static,
{
    match state.applications.get(&ApplicationId::new(application_id)) {
        Ok(application) => {
            (StatusCode::OK, axum::Json(status_view(&application))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn submit_handler<S, N, C>(
    State(state): State<Arc<RecruitingState<S, N, C>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: ApplicationRepository
        + ProjectRepository
        + CatalogRepository
        + UserRepository
        + WalletRepository
        + VerificationStore
        + 'static,
    N: NotificationSink + 'static,
    C: SettingsProvider + 'static,
{
    let result = principal(&headers).and_then(|principal| {
        state
            .applications
            .submit(&principal, &ApplicationId::new(application_id))
    });
    match result {
        Ok(application) => {
            (StatusCode::ACCEPTED, axum::Json(status_view(&application))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn pending_handler<S, N, C>(
    State(state): State<Arc<RecruitingState<S, N, C>>>,
    headers: HeaderMap,
) -> Response
where
    S: ApplicationRepository
        + ProjectRepository
        + CatalogRepository
        + UserRepository
        + WalletRepository
        + VerificationStore
        + 'static,
    N: NotificationSink + 'static,
    C: SettingsProvider + 'static,
{
    let result =
        principal(&headers).and_then(|principal| state.verification.list_pending(&principal));
    match result {
        Ok(pending) => (StatusCode::OK, axum::Json(pending)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn confirm_handler<S, N, C>(
    State(state): State<Arc<RecruitingState<S, N, C>>>,
    headers: HeaderMap,
    axum::Json(target): axum::Json<VerificationTarget>,
) -> Response
where
    S: ApplicationRepository
        + ProjectRepository
        + CatalogRepository
        + UserRepository
        + WalletRepository
        + VerificationStore
        + 'static,
    N: NotificationSink + 'static,
    C: SettingsProvider + 'static,
{
    let result =
        principal(&headers).and_then(|principal| state.verification.confirm(&principal, &target));
    match result {
        Ok(outcome) => (
            StatusCode::OK,
            axum::Json(json!({
                "record_id": outcome.record.as_str(),
                "valid_count": outcome.valid_count,
                "required_count": outcome.required_count,
                "promoted": outcome.promoted,
            })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
