use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{CanonicalListing, Query, ResultMetadata};
use super::engine::{FailureKind, PropertyQueryEngine, QueryFailure, StageTimings};
use super::provider::ProviderTransport;
use super::reply;

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<CanonicalListing>,
    pub metadata: ResultMetadata,
    pub timings: StageTimings,
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<CanonicalListing>,
    pub reply: String,
}

/// Router exposing the property query endpoints.
pub fn property_query_router<T>(engine: Arc<PropertyQueryEngine<T>>) -> Router
where
    T: ProviderTransport + 'static,
{
    Router::new()
        .route("/api/v1/properties/query", post(query_handler::<T>))
        .route("/api/v1/properties/lookup", post(lookup_handler::<T>))
        .with_state(engine)
}

pub(crate) async fn query_handler<T>(
    State(engine): State<Arc<PropertyQueryEngine<T>>>,
    Json(query): Json<Query>,
) -> Response
where
    T: ProviderTransport + 'static,
{
    match engine.run_query(query).await {
        Ok(outcome) => {
            let reply = reply::summarize(&outcome.result);
            let body = QueryResponse {
                results: outcome.result.listings,
                metadata: outcome.result.metadata,
                timings: outcome.timings,
                reply,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(failure) => failure_response(failure),
    }
}

pub(crate) async fn lookup_handler<T>(
    State(engine): State<Arc<PropertyQueryEngine<T>>>,
    Json(request): Json<LookupRequest>,
) -> Response
where
    T: ProviderTransport + 'static,
{
    match engine.lookup_address(&request.address).await {
        Ok(Some(listing)) => {
            let body = LookupResponse {
                found: true,
                reply: reply::describe(&listing),
                listing: Some(listing),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(None) => {
            let body = LookupResponse {
                found: false,
                listing: None,
                reply: reply::not_found(request.address.trim()),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(failure) => failure_response(failure),
    }
}

fn failure_response(failure: QueryFailure) -> Response {
    let kind = failure.kind();
    let status = match kind {
        FailureKind::InvalidQuery => StatusCode::BAD_REQUEST,
        FailureKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        FailureKind::ProviderRequestError => StatusCode::BAD_GATEWAY,
    };
    let payload = json!({
        "error": {
            "kind": kind.as_str(),
            "stage": failure.stage.as_str(),
            "message": failure.error.to_string(),
        }
    });
    (status, Json(payload)).into_response()
}
