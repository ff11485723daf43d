use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tutorhub_api::ApiClient;
use tutorhub_config::{AppConfig, AuthConfig};
use tutorhub_realtime::{ConnectionManager, NoToken, StaticToken, TokenFile, TokenProvider};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Pick where the access token comes from: inline token, then token file.
pub fn token_provider(auth: &AuthConfig) -> Arc<dyn TokenProvider> {
    if let Some(token) = auth.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
        return Arc::new(StaticToken::new(token));
    }
    match &auth.token_file {
        Some(path) => Arc::new(TokenFile::new(path)),
        None => Arc::new(NoToken),
    }
}

#[derive(Clone)]
pub struct ClientServices {
    pub api: ApiClient,
    pub realtime: ConnectionManager,
    pub tokens: Arc<dyn TokenProvider>,
}

impl ClientServices {
    pub fn initialise(config: &AppConfig) -> Result<Self> {
        Self::with_tokens(config, token_provider(&config.auth))
    }

    /// Same as `initialise` with an explicit token source.
    pub fn with_tokens(config: &AppConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let api = ApiClient::new(
            config.api.base_url.clone(),
            config.api.request_timeout(),
            Arc::clone(&tokens),
        )
        .context("failed to build api client")?;

        let realtime = ConnectionManager::new(config.realtime.ws_base_url.clone(), Arc::clone(&tokens))
            .with_ping_interval(config.realtime.ping_interval());

        info!(
            api = %config.api.base_url,
            ws = %config.realtime.ws_base_url,
            has_token = tokens.access_token().is_some(),
            "client services ready"
        );

        Ok(Self {
            api,
            realtime,
            tokens,
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
