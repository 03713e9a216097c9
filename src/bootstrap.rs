use crate::api::AppState;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::jobs;
use crate::ledger::LedgerRepository;
use crate::payouts::bank_details::BankDetailsCipher;
use crate::payouts::executor::PayoutExecutor;
use crate::payouts::scheduler::PayoutScheduler;
use crate::payouts::PayoutRepository;
use crate::providers::CardNetworkClient;
use crate::reconciliation::ReconciliationService;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn initialize_app_state(config: Config) -> AppResult<Arc<AppState>> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;

    let ledger = Arc::new(LedgerRepository::new(pool.clone(), &config.default_currency));
    let payouts = Arc::new(PayoutRepository::new(pool.clone()));

    let bank_cipher = Arc::new(
        BankDetailsCipher::from_base64_key(&config.bank_details_key)
            .map_err(|e| AppError::Config(e.to_string()))?,
    );
    info!("✅ Bank-detail cipher ready");

    let card_network = Arc::new(CardNetworkClient::new(
        &config.card_network_api_url,
        &config.card_network_api_key,
        config.provider_timeout_secs,
    )?);
    info!("✅ Card-network client ready ({})", config.card_network_api_url);

    let executor = Arc::new(PayoutExecutor::new(
        ledger.clone(),
        payouts.clone(),
        card_network.clone(),
        bank_cipher.clone(),
    ));

    let scheduler = Arc::new(PayoutScheduler::new(
        payouts.clone(),
        executor.clone(),
        Duration::from_secs(config.payout_store_timeout_secs),
    ));

    let reconciliation = Arc::new(ReconciliationService::new(
        ledger.clone(),
        card_network.clone(),
        config.platform_fee_percent,
        config.provider_fee_percent,
        config.hold_period_days,
    ));
    info!(
        "✅ Reconciliation ready (platform fee {}%, provider fee {}%, hold {} days)",
        config.platform_fee_percent, config.provider_fee_percent, config.hold_period_days
    );

    let state = Arc::new(AppState {
        config,
        ledger,
        payouts,
        executor,
        scheduler,
        reconciliation,
        bank_cipher,
    });

    jobs::spawn_background_jobs(state.clone());

    Ok(state)
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("✅ Database connected, migrations applied");

    Ok(pool)
}
