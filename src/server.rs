use crate::api::handlers::{
    admin_complete_payout, create_manual_payout, cron_promote_holds, cron_run_payouts,
    get_activity, get_balance, get_payout_settings, health, list_payouts, orders_webhook,
    update_payout_settings,
};
use crate::api::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub fn create_app(state: Arc<AppState>) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        .route("/health", get(health))
        .nest(
            "/api/v1",
            Router::new()
                // Seller-facing money views
                .route("/stores/:store_id/balance", get(get_balance))
                .route("/stores/:store_id/activity", get(get_activity))
                .route("/stores/:store_id/payout-settings", get(get_payout_settings))
                .route("/stores/:store_id/payout-settings", put(update_payout_settings))
                // Payouts
                .route("/stores/:store_id/payouts", get(list_payouts))
                .route("/stores/:store_id/payouts", post(create_manual_payout))
                // Order-management webhooks (HMAC-signed)
                .route("/webhooks/orders", post(orders_webhook))
                // Signed cron endpoints
                .route("/cron/promote-holds", post(cron_promote_holds))
                .route("/cron/run-payouts", post(cron_run_payouts))
                // Admin reconciliation
                .route("/admin/payouts/:payout_id/complete", post(admin_complete_payout)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
