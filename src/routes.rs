//! HTTP routes.
//!
//! One POST endpoint carries the whole operation protocol; the engine
//! produces the response envelope either way, the route only picks the
//! status code from the error code.

use actix_web::{web, HttpResponse};
use floedb_commons::protocol::{OperationRequest, ResponseEnvelope};
use floedb_core::TableEngine;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub engine: Arc<TableEngine>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/v1/operations").route(web::post().to(handle_operation)))
        .service(web::resource("/healthz").route(web::get().to(healthz)));
}

async fn handle_operation(
    state: web::Data<AppState>,
    request: web::Json<OperationRequest>,
) -> HttpResponse {
    let envelope = state.engine.execute(request.into_inner()).await;
    HttpResponse::build(status_for(&envelope)).json(envelope)
}

async fn healthz(state: web::Data<AppState>) -> HttpResponse {
    let (hits, misses) = state.engine.cache_stats();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "metadata_cache": { "hits": hits, "misses": misses }
    }))
}

fn status_for(envelope: &ResponseEnvelope) -> actix_web::http::StatusCode {
    use actix_web::http::StatusCode;
    if envelope.success {
        return StatusCode::OK;
    }
    match envelope.error.as_ref().map(|e| e.code.as_str()) {
        Some("NotFound") => StatusCode::NOT_FOUND,
        Some("AlreadyExists") | Some("WriteConflict") => StatusCode::CONFLICT,
        Some("ResourceExhausted") => StatusCode::TOO_MANY_REQUESTS,
        Some("Timeout") => StatusCode::GATEWAY_TIMEOUT,
        Some("Internal") | None => StatusCode::INTERNAL_SERVER_ERROR,
        // Validation failures: InvalidRequest, InvalidSchema, SchemaMismatch,
        // TypeMismatch, ConfirmationRequired
        Some(_) => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floedb_commons::EngineError;

    fn failure(err: EngineError) -> ResponseEnvelope {
        ResponseEnvelope::failure("req".into(), 0.0, &err)
    }

    #[test]
    fn test_status_mapping() {
        use actix_web::http::StatusCode;
        let ok = ResponseEnvelope::success("req".into(), 0.0, serde_json::json!({}));
        assert_eq!(status_for(&ok), StatusCode::OK);
        assert_eq!(
            status_for(&failure(EngineError::not_found("t"))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&failure(EngineError::AlreadyExists("t".into()))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&failure(EngineError::invalid_request("x"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&failure(EngineError::ConfirmationRequired("x".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&failure(EngineError::Timeout("x".into()))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&failure(EngineError::internal("x"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
