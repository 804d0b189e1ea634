use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use cqrs_es::AggregateError;
use serde_json::json;
use uuid::Uuid;

use crate::command_extractor::CommandExtractor;
use crate::domain::commands::WizardCommand;
use crate::domain::wizard::WizardError;
use crate::services::auth::Session;
use crate::state::ApplicationState;

/// Commands and queries share one logical endpoint per wizard; the HTTP
/// method tells them apart.
pub fn router(state: ApplicationState) -> Router {
    Router::new()
        .route(
            "/wizards/{wizard_id}",
            get(query_handler).post(command_handler),
        )
        .route("/session", put(sign_in_handler).delete(sign_out_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

// Serves as our query endpoint to respond with the materialized `WizardView`
// for the requested wizard.
pub async fn query_handler(
    Path(wizard_id): Path<String>,
    State(state): State<ApplicationState>,
) -> Response {
    let Ok(uuid) = Uuid::parse_str(&wizard_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid wizard ID format").into_response();
    };

    match state.wizard_query.load(&uuid).await {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// Serves as our command endpoint to make changes in a `BookingWizard` aggregate.
pub async fn command_handler(
    Path(wizard_id): Path<String>,
    State(state): State<ApplicationState>,
    CommandExtractor(metadata, command): CommandExtractor,
) -> Response {
    if let WizardCommand::Start { id, .. } = &command {
        if id.to_string() != wizard_id {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Wizard id does not match the request path" })),
            )
                .into_response();
        }
    }

    match state
        .cqrs
        .execute_with_metadata(&wizard_id, command, metadata)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            tracing::info!(%wizard_id, error = %err, "command rejected");
            command_error_response(err)
        }
    }
}

fn command_error_response(err: AggregateError<WizardError>) -> Response {
    match err {
        AggregateError::UserError(err) => {
            let status = match err {
                WizardError::NotFound => StatusCode::NOT_FOUND,
                WizardError::VehicleUnavailable { .. } => StatusCode::CONFLICT,
                WizardError::SessionExpired => StatusCode::UNAUTHORIZED,
                WizardError::VehicleLookup(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::BAD_REQUEST,
            };
            let body = match err.redirect() {
                Some(redirect) => json!({
                    "error": err.to_string(),
                    "redirect": {
                        "path": redirect.path(),
                        "delayMs": redirect.delay_ms,
                        "notice": redirect.notice,
                    },
                }),
                None => json!({ "error": err.to_string() }),
            };
            (status, Json(body)).into_response()
        }
        AggregateError::AggregateConflict => (
            StatusCode::CONFLICT,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        err => {
            tracing::error!(error = %err, "command could not be processed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn sign_in_handler(
    State(state): State<ApplicationState>,
    Json(session): Json<Session>,
) -> StatusCode {
    state.session.sign_in(session);
    StatusCode::NO_CONTENT
}

pub async fn sign_out_handler(State(state): State<ApplicationState>) -> StatusCode {
    state.session.sign_out();
    tracing::info!("session ended");
    StatusCode::NO_CONTENT
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
