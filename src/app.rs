// src/app.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::{
    config::AppState,
    handlers,
    middleware::{auth::scope_middleware, role_policy::role_guard},
};

/// Monta o router completo. O guard de rol envolve tudo; o resolvedor de
/// escopo só as rotas que precisam de local/usuário.
pub fn build_router(app_state: AppState) -> Router {
    // Rotas públicas: login e health ficam fora do resolvedor de escopo
    let auth_routes = Router::new().route("/login", post(handlers::auth::login));

    let me_routes = Router::new()
        .route("/me", get(handlers::auth::get_me))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            scope_middleware,
        ));

    let inventory_routes = Router::new()
        .route(
            "/",
            get(handlers::inventory::list_insumos).post(handlers::inventory::create_insumo),
        )
        .route("/alertas", get(handlers::inventory::stock_alerts))
        .route(
            "/{id}",
            get(handlers::inventory::get_insumo)
                .put(handlers::inventory::update_insumo)
                .delete(handlers::inventory::delete_insumo),
        )
        .route(
            "/{id}/movimientos",
            get(handlers::inventory::list_movements).post(handlers::inventory::post_movement),
        )
        .route("/{id}/lotes", get(handlers::inventory::list_lots))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            scope_middleware,
        ));

    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_routes.merge(me_routes))
        .nest("/api/insumos", inventory_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            role_guard,
        ))
        .with_state(app_state)
}
