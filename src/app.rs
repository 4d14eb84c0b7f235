//! Application assembly: config, encryption, repositories, router, serving.

use crate::cli::Args;
use lgw_core::config::Config;
use lgw_core::crypto::Encryption;
use lgw_server::AppState;
use lgw_store::Repositories;
use std::sync::Arc;

pub struct Application {
    state: AppState,
}

impl Application {
    /// Build the application: read env config, initialize the field cipher,
    /// open the store and assemble the shared state.
    pub fn build(args: &Args) -> anyhow::Result<Self> {
        let mut config = Config::from_env();
        if let Some(ref host) = args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }

        let encryption = Arc::new(Encryption::from_env_value(config.encryption_key.as_deref())?);
        let repos = Repositories::in_memory(encryption);

        if config.admin.is_enabled() {
            tracing::info!("admin token auth enabled");
        }

        let state = AppState::new(Arc::new(config), repos);
        Ok(Self { state })
    }

    /// Serve HTTP until ctrl-c, with the log-retention sweeper running in
    /// the background.
    pub async fn serve(self) -> anyhow::Result<()> {
        let config = self.state.config.clone();
        let cleanup = lgw_server::scheduler::spawn_log_cleanup(self.state.clone());
        let router = lgw_server::build_router(self.state);

        let addr = format!("{}:{}", config.host, config.port);
        tracing::info!("starting HTTP server on {addr}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            })
            .await?;

        cleanup.abort();
        tracing::info!("server shut down");
        Ok(())
    }
}
