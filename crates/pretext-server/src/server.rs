//! Static preview server for built output.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::{header, HeaderValue};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use pretext_project::paths::hash_path;

use crate::access::{binding_for_access, url_for_access, Access, Environment};
use crate::registry::{Registry, RegistryError, RunningServer};

/// How many successive ports to try before giving up.
const PORT_ATTEMPTS: u16 = 100;

/// Configuration for the preview server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory served at `/`. Its hash identifies the server in the registry.
    pub directory: PathBuf,

    /// Who may connect
    pub access: Access,

    /// First port to try
    pub port: u16,

    /// Open a browser once listening
    pub launch: bool,

    /// Page below `directory` to open, e.g. `output/web/`.
    pub launch_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            access: Access::Private,
            port: 8128,
            launch: true,
            launch_path: String::new(),
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("No free port found starting at {0}")]
    NoFreePort(u16),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Server error: {0}")]
    Serve(String),
}

/// Router serving `directory` with caching disabled.
pub fn router(directory: impl Into<PathBuf>) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(directory.into()))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
}

/// Bind `host:port`, moving to the next port while the current one is taken.
pub async fn bind_first_free(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let mut candidate = port;
    for _ in 0..PORT_ATTEMPTS {
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                tracing::warn!("Port {} could not be used.", candidate);
                tracing::debug!("{}", e);
                candidate = candidate.checked_add(1).ok_or(ServerError::NoFreePort(port))?;
                tracing::warn!("Trying port {} instead.", candidate);
            }
        }
    }
    Err(ServerError::NoFreePort(port))
}

/// `base` joined with a relative page path.
pub fn page_url(base: &str, page: &str) -> String {
    let page = page.trim_start_matches('/');
    if page.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), page)
}

/// Preview server for one directory.
pub struct PreviewServer {
    config: ServerConfig,
    environment: Environment,
    registry: Registry,
}

impl PreviewServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            environment: Environment::detect(),
            registry: Registry::default(),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Serve until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        self.serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::debug!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, keeping the registry entry for that long.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("setting up PreTeXt web server ...");
        let binding = binding_for_access(self.config.access, &self.environment);
        let listener = bind_first_free(binding, self.config.port).await?;
        let addr: SocketAddr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(binding.to_string(), e.to_string()))?;

        let path_hash = hash_path(&self.config.directory);
        self.registry.add(RunningServer {
            path_hash: path_hash.clone(),
            pid: std::process::id(),
            port: addr.port(),
            binding: binding.to_string(),
        })?;

        let url = page_url(
            &url_for_access(self.config.access, addr.port(), &self.environment),
            &self.config.launch_path,
        );
        tracing::info!("Server will soon be available at {}", url);
        if self.config.launch {
            tracing::info!("Opening browser for {}", url);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open a browser: {}", e);
                tracing::info!("Open {} in a web browser to view the output.", url);
            }
        } else {
            tracing::info!("Open {} in a web browser to view the output.", url);
        }
        tracing::info!("Use [Ctrl]+[C] to halt the server.");

        let served = axum::serve(listener, router(&self.config.directory))
            .with_graceful_shutdown(shutdown)
            .await;

        tracing::info!("Stopping PreTeXt web server.");
        self.registry.remove(&path_hash)?;
        served.map_err(|e| ServerError::Serve(e.to_string()))
    }
}
