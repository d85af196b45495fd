//! HTTP surface.
//!
//! [`build`] assembles every route under `/api`, plus `/health`, and wraps
//! them in the CORS and request-tracing layers.

mod almanac;
mod chat;
mod forex;
mod geo;
mod health;
mod kundli;
pub mod middleware;
mod rashifal;

use axum::Router;

use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .merge(chat::router())
        .merge(kundli::router())
        .merge(almanac::router())
        .merge(forex::router())
        .merge(rashifal::router())
        .merge(geo::router());

    Router::new()
        .merge(health::router())
        .nest("/api", api)
        .layer(middleware::cors_layer(&state.config))
        .layer(axum::middleware::from_fn(middleware::trace_requests))
        .with_state(state)
}
