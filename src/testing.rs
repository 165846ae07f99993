use std::sync::Arc;

use anyhow::Result;
use axum::{body::Body, http::Request, response::Response, Router};
use image_store::{ImageStore, ImageStoreConfig};
use tower::ServiceExt;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{
    config::{AuthConfig, ServerConfig},
    routes::{create_routes, RouteState},
};

pub const TEST_USERNAME: &str = "uploader";
pub const TEST_PASSWORD: &str = "open sesame";

pub struct TestService {
    pub routes: Router,
    pub image_store: Arc<ImageStore>,
}

impl TestService {
    pub fn new() -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let config = ServerConfig {
            listen_addr: "127.0.0.1:8000".to_string(),
            auth: AuthConfig {
                username: TEST_USERNAME.to_string(),
                password: TEST_PASSWORD.to_string(),
            },
            storage: ImageStoreConfig {
                path: Some("memory:///".to_string()),
                s3: None,
            },
        };
        config.validate()?;
        let image_store = Arc::new(ImageStore::new(&config.storage)?);
        let routes = create_routes(RouteState {
            config: Arc::new(config),
            image_store: image_store.clone(),
        });

        Ok(Self {
            routes,
            image_store,
        })
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.routes.clone().oneshot(request).await.unwrap()
    }
}
