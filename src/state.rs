//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    services::{
        coach_service::LlmClient,
        mail::{self, Mailer},
        notification_service::NotificationHub,
        payment_service::MollieClient,
        scan_service,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub mollie: MollieClient,
    pub llm: LlmClient,
    pub notifications: NotificationHub,
    /// Client used to fetch pages for scans.
    pub http: reqwest::Client,
}

impl AppState {
    /// Build the state and all outbound clients from configuration.
    pub fn new(config: Config, pool: DbPool) -> Result<Self, AppError> {
        let mailer = mail::from_config(&config)?;
        Self::with_mailer(config, pool, mailer)
    }

    /// Like [`AppState::new`] with an explicit mailer.
    pub fn with_mailer(
        config: Config,
        pool: DbPool,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AppError> {
        let mollie = MollieClient::new(&config.mollie_api_base, &config.mollie_api_key)?;
        let llm = LlmClient::new(
            &config.llm_api_base,
            config.llm_api_key.clone(),
            &config.llm_model,
        )?;
        let http = scan_service::http_client()?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            mailer,
            mollie,
            llm,
            notifications: NotificationHub::new(),
            http,
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
