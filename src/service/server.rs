use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::models::AppConfig;
use crate::service::middleware::{cors_layer, request_context_middleware};
use crate::service::state::AppState;
use crate::service::token::TokenSource;
use crate::service::upstream::VisitSender;

pub fn build_app(state: AppState, config: &AppConfig) -> Router {
    crate::service::routes::build_routes()
        .layer(axum::middleware::from_fn(request_context_middleware))
        .layer(cors_layer(&config.server.cors))
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .with_state(state)
}

#[derive(Clone)]
pub struct AxumServer {
    pub is_running: Arc<RwLock<bool>>,
    // Actual bound port; differs from the configured one when that is 0.
    pub local_port: u16,
    pub state: AppState,
}

impl AxumServer {
    pub async fn set_running(&self, running: bool) {
        let mut r = self.is_running.write().await;
        *r = running;
        tracing::info!("Visit service running status updated to: {}", running);
    }

    /// Binds the listener and spawns the accept loop. The loop exits when
    /// `shutdown` is cancelled; connections already accepted finish on their own.
    pub async fn start(
        config: &AppConfig,
        source: Arc<dyn TokenSource>,
        sender: Arc<dyn VisitSender>,
        shutdown: CancellationToken,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let state = AppState::build(config, source, sender, shutdown.clone());
        let app = build_app(state.clone(), config);
        tracing::info!(
            "Request body size limit: {} KB",
            config.server.max_body_size / 1024
        );

        let addr = format!("{}:{}", config.server.bind_host(), config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Address {} binding failed: {}", addr, e))?;

        let local_port = listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(config.server.port);
        tracing::info!(
            "Visit service started at http://{}:{}",
            config.server.bind_host(),
            local_port
        );

        let server_instance = Self {
            is_running: state.runtime.is_running.clone(),
            local_port,
            state,
        };
        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                let accepted = tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Accept loop stopped");
                        break;
                    }
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok((stream, remote_addr)) => {
                        let io = TokioIo::new(stream);
                        use hyper::body::Incoming;
                        use tower::ServiceExt;
                        let app_with_info = app.clone().map_request(
                            move |mut req: axum::http::Request<Incoming>| {
                                req.extensions_mut()
                                    .insert(axum::extract::ConnectInfo(remote_addr));
                                req
                            },
                        );

                        let service = TowerToHyperService::new(app_with_info);

                        tokio::task::spawn(async move {
                            if let Err(err) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!("Connection handling ended or failed: {:?}", err);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {:?}", e);
                    }
                }
            }
        });

        Ok((server_instance, handle))
    }
}
