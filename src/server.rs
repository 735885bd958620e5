use axum::extract::{Query as Params, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::construct::{Atom, EntityId};
use crate::edn::Datum;
use crate::error::GraphiteError;
use crate::interface::{SharedDatabase, Stats};
use crate::query::Rows;
use crate::store::AtomListing;

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub as_of: Option<EntityId>,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub id: u64,
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    /// `null` for a query without a usable where part.
    pub rows: Option<Rows>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct TransactRequest {
    pub tx: String,
}

#[derive(Serialize)]
pub struct TransactResponse {
    pub id: u64,
    pub status: String,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempids: Option<HashMap<String, EntityId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atom_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct IdentityEntry {
    pub entity: EntityId,
    pub identity: String,
}

pub fn router(database: SharedDatabase) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/query", post(query))
        .route("/v1/transact", post(transact))
        .route("/v1/stats", get(stats))
        .route("/v1/identities", get(identities))
        .route("/v1/atoms", get(atoms))
        .layer(cors)
        .with_state(database)
}

fn status_of(error: &GraphiteError) -> StatusCode {
    match error {
        GraphiteError::Parse { .. }
        | GraphiteError::UnknownIdentity(_)
        | GraphiteError::UnsupportedReference(_)
        | GraphiteError::UnsupportedValue(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: GraphiteError) -> (StatusCode, String) {
    let status = status_of(&error);
    let message = error.to_string();
    warn!(%message, code = %status.as_u16(), "request failed");
    (status, message)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

async fn query(
    State(database): State<SharedDatabase>,
    Json(request): Json<QueryRequest>,
) -> (StatusCode, Json<QueryResponse>) {
    let started = Instant::now();
    let id = database.allocate_id();
    let params: Vec<Datum> = request.params.iter().map(Datum::from_json).collect();
    // the engines are synchronous, so they run on the blocking pool
    let result = tokio::task::spawn_blocking(move || {
        database.query(&request.query, request.as_of, &params)
    })
    .await
    .unwrap_or_else(|e| Err(GraphiteError::Execution(e.to_string())));
    let elapsed_ms = elapsed_ms(started);
    match result {
        Ok(rows) => {
            let row_count = rows.as_ref().map(Vec::len);
            info!(id, ms = elapsed_ms, rows = ?row_count, "query complete");
            let body = QueryResponse {
                id,
                status: "ok".into(),
                elapsed_ms,
                row_count,
                rows,
                error: None,
            };
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            let (status, message) = failure(e);
            let body = QueryResponse {
                id,
                status: "error".into(),
                elapsed_ms,
                row_count: None,
                rows: None,
                error: Some(message),
            };
            (status, Json(body))
        }
    }
}

async fn transact(
    State(database): State<SharedDatabase>,
    Json(request): Json<TransactRequest>,
) -> (StatusCode, Json<TransactResponse>) {
    let started = Instant::now();
    let id = database.allocate_id();
    let result = tokio::task::spawn_blocking(move || database.transact(&request.tx))
        .await
        .unwrap_or_else(|e| Err(GraphiteError::Execution(e.to_string())));
    let elapsed_ms = elapsed_ms(started);
    match result {
        Ok(report) => {
            info!(id, ms = elapsed_ms, tx_id = report.tx_id, "transaction complete");
            let body = TransactResponse {
                id,
                status: "ok".into(),
                elapsed_ms,
                tx_id: Some(report.tx_id),
                tempids: Some(report.tempids),
                atom_count: Some(report.atom_count),
                error: None,
            };
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            let (status, message) = failure(e);
            let body = TransactResponse {
                id,
                status: "error".into(),
                elapsed_ms,
                tx_id: None,
                tempids: None,
                atom_count: None,
                error: Some(message),
            };
            (status, Json(body))
        }
    }
}

/// Runs a call that takes the database lock on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .unwrap_or_else(|e| Err(GraphiteError::Execution(e.to_string())))
        .map_err(failure)
}

async fn stats(
    State(database): State<SharedDatabase>,
) -> Result<Json<Stats>, (StatusCode, String)> {
    blocking(move || database.stats()).await.map(Json)
}

async fn identities(
    State(database): State<SharedDatabase>,
) -> Result<Json<Vec<IdentityEntry>>, (StatusCode, String)> {
    let identities = blocking(move || database.identities()).await?;
    Ok(Json(
        identities
            .into_iter()
            .map(|(entity, identity)| IdentityEntry { entity, identity })
            .collect(),
    ))
}

async fn atoms(
    State(database): State<SharedDatabase>,
    Params(listing): Params<AtomListing>,
) -> Result<Json<Vec<Atom>>, (StatusCode, String)> {
    blocking(move || database.atoms(&listing)).await.map(Json)
}
