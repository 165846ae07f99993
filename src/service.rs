use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum_server::Handle;
use image_store::ImageStore;
use tokio::signal;
use tracing::info;

use crate::{
    config::ServerConfig,
    routes::{create_routes, RouteState},
};

pub struct Service {
    pub config: ServerConfig,
    pub image_store: Arc<ImageStore>,
}

impl Service {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let image_store =
            Arc::new(ImageStore::new(&config.storage).context("error initializing image store")?);
        Ok(Self {
            config,
            image_store,
        })
    }

    pub async fn start(&self) -> Result<()> {
        let route_state = RouteState {
            config: Arc::new(self.config.clone()),
            image_store: self.image_store.clone(),
        };

        let handle = Handle::new();
        let handle_sh = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!("gateway api listening on {}", self.config.listen_addr);
        let routes = create_routes(route_state);
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.shutdown();
    info!("signal received, shutting down server gracefully");
}
