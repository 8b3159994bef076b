//! Storefront API for an automotive paint retailer: catalog, cart,
//! addresses, orders, virtual-account/QRIS payments, a wallet with top-ups
//! and signed gateway webhooks.

use std::sync::Arc;

use axum::Router;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    trace::TraceLayer, validate_request::ValidateRequestHeaderLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod routes;

use config::Config;
use db::Store;
use reconcile::{PaymentNotifier, Reconciler};
use routes::{auth::AuthError, auth::AuthService, payments::SettleChance};

/// Builds the full router over a fresh in-memory store.
pub fn app(config: &Config) -> Result<Router, AuthError> {
    let store = Store::new();
    let notifier = Arc::new(Reconciler::new(
        store.payments.clone(),
        store.orders.clone(),
        store.wallets.clone(),
    ));
    build_router(config, store, notifier)
}

/// Builds the router over `store`, handing verified webhooks to `notifier`.
pub fn build_router(
    config: &Config,
    store: Store,
    notifier: Arc<dyn PaymentNotifier>,
) -> Result<Router, AuthError> {
    let service = Arc::new(AuthService::new(store.users.clone(), config)?);
    let chance = SettleChance::new(config.topup_settle_probability);

    let api = Router::new()
        .merge(routes::health::health_routes())
        .merge(routes::auth::auth_routes(service.clone()))
        .merge(routes::products::product_routes())
        .merge(routes::address::address_routes(
            service.clone(),
            store.addresses.clone(),
        ))
        .merge(routes::cart::cart_routes(service.clone(), store.carts.clone()))
        .merge(routes::orders::order_routes(service, store.orders.clone()))
        .merge(routes::payments::payment_routes(
            store.payments.clone(),
            store.orders.clone(),
            chance,
        ))
        .merge(routes::wallet::wallet_routes(
            store.wallets.clone(),
            store.payments.clone(),
            store.orders.clone(),
            chance,
        ))
        .merge(routes::webhooks::webhook_routes(
            Arc::new(config.webhook_secrets.clone()),
            notifier,
        ))
        .route_layer(ValidateRequestHeaderLayer::accept("application/json"));

    let router = Router::new()
        .nest("/api", api)
        .layer(CompressionLayer::new().gzip(true))
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
