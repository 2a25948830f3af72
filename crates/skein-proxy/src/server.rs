//! Actix Web HTTP server.
//!
//! Exposes an OpenAI-compatible surface:
//! - `POST /v1/chat/completions`
//! - `GET /v1/models`
//! - `GET /health`
//!
//! Every other path returns the OpenAI error envelope with a 404.

use crate::{config::ProxyConfig, models, streaming, translation, upstream::UpstreamClient};
use actix_cors::Cors;
use actix_web::{http::StatusCode, web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use futures::StreamExt;
use serde_json::{json, Value};
use skein_context::{apply_style_instruction, build_instruction, Compressor, StyleDetector};
use skein_protocol::{ChatCompletionRequest, ErrorBody, ModelCard, ModelList};
use std::sync::Arc;
use tracing::{debug, error, info};

/// `created` timestamp advertised for every catalog entry.
const MODEL_CATALOG_CREATED: i64 = 1_715_000_000;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub upstream: UpstreamClient,
    pub style: StyleDetector,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let upstream = UpstreamClient::new(&config)?;
        Ok(Self {
            config,
            upstream,
            style: StyleDetector::new(),
        })
    }
}

pub async fn serve(config: ProxyConfig) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    info!(addr = %addr, "skein-proxy listening");

    let state = web::Data::new(AppState::new(config)?);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(routes)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await
    .context("server error")?;

    Ok(())
}

/// Route table, shared between `serve` and handler tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    // Long conversations are the point of this proxy; allow large bodies.
    cfg.app_data(web::JsonConfig::default().limit(16 * 1024 * 1024).error_handler(|err, _req| {
        let message = err.to_string();
        actix_web::error::InternalError::from_response(
            err,
            error_response(StatusCode::BAD_REQUEST, message),
        )
        .into()
    }))
    .route("/health", web::get().to(health))
    .route("/v1/models", web::get().to(list_models))
    .route("/v1/chat/completions", web::post().to(chat_completions))
    .default_service(web::route().to(not_found));
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorBody::invalid_request(message, status.as_u16()))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "skein-proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "compression": {
            "max_context_messages": state.config.max_context_messages,
            "preserve_recent_messages": state.config.preserve_recent_messages,
            "chunk_size": state.config.chunk_size,
            "aggressive_threshold": state.config.aggressive_threshold,
        },
        "format_enforcement": state.config.format_enforcement,
        "merge_reasoning": state.config.merge_reasoning,
    }))
}

async fn list_models() -> HttpResponse {
    let data = models::external_model_ids()
        .into_iter()
        .map(|id| ModelCard::new(id, MODEL_CATALOG_CREATED, "skein"))
        .collect();

    HttpResponse::Ok().json(ModelList {
        object: "list".to_string(),
        data,
    })
}

async fn not_found() -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, "not found")
}

async fn chat_completions(
    state: web::Data<AppState>,
    body: web::Json<ChatCompletionRequest>,
) -> HttpResponse {
    let req = body.into_inner();

    // Validate before any upstream work.
    let messages = match req.messages.as_deref() {
        Some(m) if !m.is_empty() => m.to_vec(),
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "messages is required and must be a non-empty array",
            )
        }
    };

    let external_model = req
        .model
        .clone()
        .unwrap_or_else(|| models::DEFAULT_EXTERNAL_MODEL.to_string());

    // Bound the conversation before it goes upstream.
    let compressor = Compressor::new(
        state.config.compression(),
        Arc::new(state.upstream.clone()),
    );
    let outcome = compressor.compress(&messages).await;
    let mut bounded = outcome.messages;
    debug!(
        strategy = ?outcome.report.strategy,
        messages_before = outcome.report.messages_before,
        messages_after = outcome.report.messages_after,
        "compression pass finished"
    );

    // Style steering composes with compression: the instruction lands on
    // whichever system message survived.
    if state.config.format_enforcement {
        let profile = state.style.detect(&messages);
        if profile.uses_convention {
            let instruction = build_instruction(&profile, state.config.format_strictness);
            apply_style_instruction(&mut bounded, &instruction);
        }
    }

    let internal_model = models::resolve_model(&external_model, &state.upstream).await;
    let outgoing = translation::to_upstream_request(&req, &bounded, &internal_model);

    let upstream = match state.upstream.chat(&outgoing).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "upstream request failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("upstream request failed: {e}"),
            );
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        let text = upstream.text().await.unwrap_or_default();
        error!(%status, body = %text, "upstream error");
        let mirrored =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if text.is_empty() {
            "upstream error".to_string()
        } else {
            text
        };
        return error_response(mirrored, message);
    }

    if req.stream.unwrap_or(false) {
        let stream = streaming::relay(upstream, external_model, state.config.merge_reasoning)
            .map(|r| {
                r.map(web::Bytes::from)
                    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))
            });

        return HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header(("cache-control", "no-cache"))
            .streaming(stream);
    }

    let v: Value = match upstream.json().await {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to decode upstream response");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to decode upstream response: {e}"),
            );
        }
    };

    match translation::to_external_response(v, &external_model, state.config.merge_reasoning) {
        Ok(out) => HttpResponse::Ok().json(out),
        Err(e) => {
            error!(error = %e, "response translation error");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("response translation error: {e}"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    /// Upstream pointed at a closed local port: any accidental upstream call
    /// fails, so validation responses prove no call was attempted.
    fn test_state() -> web::Data<AppState> {
        let config = ProxyConfig {
            upstream_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            ..ProxyConfig::default()
        };
        web::Data::new(AppState::new(config).unwrap())
    }

    #[actix_web::test]
    async fn empty_messages_is_rejected_with_400() {
        // Validation errors must never reach the upstream.
        let app =
            test::init_service(App::new().app_data(test_state()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/v1/chat/completions")
            .set_json(json!({"model": "gpt-4o", "messages": []}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], 400);
    }

    #[actix_web::test]
    async fn missing_messages_is_rejected_with_400() {
        let app =
            test::init_service(App::new().app_data(test_state()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/v1/chat/completions")
            .set_json(json!({"model": "gpt-4o"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn non_array_messages_is_rejected_with_400() {
        let app =
            test::init_service(App::new().app_data(test_state()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/v1/chat/completions")
            .set_json(json!({"messages": "not an array"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[actix_web::test]
    async fn unknown_routes_return_the_error_envelope() {
        let app =
            test::init_service(App::new().app_data(test_state()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/v2/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], 404);
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[actix_web::test]
    async fn models_endpoint_lists_the_catalog() {
        let app =
            test::init_service(App::new().app_data(test_state()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/v1/models").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["object"], "list");
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap())
            .collect();
        assert!(ids.contains(&"gpt-4o"));
        assert!(body["data"][0]["object"] == "model");
    }

    #[actix_web::test]
    async fn health_reports_config_flags() {
        let app =
            test::init_service(App::new().app_data(test_state()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["compression"]["max_context_messages"].is_number());
    }
}
