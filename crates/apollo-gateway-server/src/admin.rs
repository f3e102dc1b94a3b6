//! Persisted query administration: list, register, allow or disallow, remove.

use crate::AppState;
use apollo_gateway::QueryId;
use apollo_gateway::RegistrationError;
use apollo_gateway::RegistryError;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
pub(crate) struct QuerySummary {
    id: QueryId,
    allowed: bool,
    document: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RegisterQuery {
    document: String,
    /// Content-derived when absent
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SetAllowed {
    allowed: bool,
}

/// Registry and registration failures mapped to status codes
pub(crate) enum AdminError {
    Registration(RegistrationError),
    Registry(RegistryError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AdminError::Registration(RegistrationError::Invalid(error)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "errors": error.to_errors() }),
            ),
            AdminError::Registration(RegistrationError::Registry(error))
            | AdminError::Registry(error) => {
                let status = match error {
                    RegistryError::UnknownQuery(_) => StatusCode::NOT_FOUND,
                    RegistryError::DuplicateIdentifier(_) => StatusCode::CONFLICT,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, json!({ "errors": [{ "message": error.to_string() }] }))
            }
            // `RegistrationError` is non-exhaustive
            AdminError::Registration(error) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "errors": [{ "message": error.to_string() }] }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<RegistrationError> for AdminError {
    fn from(error: RegistrationError) -> Self {
        Self::Registration(error)
    }
}

impl From<RegistryError> for AdminError {
    fn from(error: RegistryError) -> Self {
        Self::Registry(error)
    }
}

pub(crate) async fn list_queries(State(state): State<AppState>) -> Json<Vec<QuerySummary>> {
    let entries = state.gateway.registry().entries();
    Json(
        entries
            .iter()
            .map(|entry| QuerySummary {
                id: entry.id.clone(),
                allowed: entry.allowed,
                document: entry.document.source().to_owned(),
            })
            .collect(),
    )
}

pub(crate) async fn register_query(
    State(state): State<AppState>,
    Json(body): Json<RegisterQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), AdminError> {
    let id = match body.id {
        Some(id) => {
            let id = QueryId::new(id)?;
            state.gateway.register_with_id(id, &body.document)?
        }
        None => state.gateway.register(&body.document)?,
    };
    tracing::info!(%id, "registered persisted query");
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub(crate) async fn set_allowed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SetAllowed>,
) -> Result<StatusCode, AdminError> {
    let id = QueryId::new(id)?;
    state.gateway.set_allowed(&id, body.allowed)?;
    tracing::info!(%id, allowed = body.allowed, "updated persisted query allow-list");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn remove_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AdminError> {
    let id = QueryId::new(id)?;
    state.gateway.remove(&id)?;
    tracing::info!(%id, "removed persisted query");
    Ok(StatusCode::NO_CONTENT)
}
