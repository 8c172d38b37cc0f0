// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-server
#![deny(unsafe_code)]

/// Response envelope and error conversion.
pub mod api;
/// Route handlers.
pub mod handlers;
/// The admission pipeline stages.
pub mod middleware;
/// Shared daemon state.
pub mod state;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;

pub use state::{AppState, InMemoryParts};

/// The resource routes under `/api/v1`.
fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route(
            "/api/v1/workflows",
            get(handlers::list_workflows).post(handlers::create_workflow),
        )
        .route(
            "/api/v1/workflows/{id}",
            get(handlers::get_workflow)
                .put(handlers::update_workflow)
                .delete(handlers::delete_workflow),
        )
        .route("/api/v1/workflows/{id}/start", post(handlers::start_workflow))
        .route(
            "/api/v1/agents",
            get(handlers::list_agents).post(handlers::create_agent),
        )
        .route("/api/v1/agents/{id}", get(handlers::get_agent))
        .route(
            "/api/v1/tools",
            get(handlers::list_tools).post(handlers::create_tool),
        )
        .route(
            "/api/v1/budgets",
            get(handlers::list_budgets).put(handlers::put_budget),
        )
        .route("/api/v1/plans/estimate", post(handlers::estimate_plan))
}

/// Wrap a router in the full admission pipeline.
///
/// Declaration order is execution order: the first layer is outermost.
/// CORS sits outside recovery so preflight headers survive even a
/// panicking request.
pub fn apply_pipeline(state: AppState, routes: Router<AppState>) -> Router {
    routes
        .layer(
            ServiceBuilder::new()
                .layer(middleware::cors_layer())
                .layer(axum::middleware::from_fn(middleware::recovery))
                .layer(axum::middleware::from_fn(middleware::correlation))
                .layer(axum::middleware::from_fn(middleware::trace_stage))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::auth_stage,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::tenant_stage,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::rbac_stage,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::ratelimit_stage,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::redaction_stage,
                )),
        )
        .with_state(state)
}

/// Build the daemon's router with the full pipeline applied.
pub fn build_app(state: AppState) -> Router {
    apply_pipeline(state, resource_routes())
}
