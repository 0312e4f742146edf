// routes.rs
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::{header::CONTENT_TYPE, HeaderValue, Method};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{Config, ConfigError};
use crate::handlers;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/polls",
            get(handlers::list_polls).post(handlers::create_poll),
        )
        .route(
            "/polls/{id}",
            get(handlers::get_poll)
                .put(handlers::update_poll)
                .delete(handlers::delete_poll),
        )
        .route("/polls/{id}/eligibility", get(handlers::eligibility))
        .route("/polls/{id}/votes", post(handlers::submit_vote))
        .route("/polls/{id}/results", get(handlers::results))
        .route("/polls/{id}/share", get(handlers::share));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn cors_layer(config: &Config) -> Result<CorsLayer, ConfigError> {
    let origin = match &config.cors_allowed_origin {
        Some(origin) => {
            let value = HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                key: "CORS_ALLOWED_ORIGIN",
                value: origin.clone(),
                reason: e.to_string(),
            })?;
            AllowOrigin::exact(value)
        }
        None => AllowOrigin::from(Any),
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, config.identity_header.clone()])
        .max_age(Duration::from_secs(60 * 60)))
}
