//! Server runtime.
//!
//! Two modes, chosen at startup:
//!
//! - **Long-lived process**: every enabled listener (OTLP-gRPC, OTLP-HTTP,
//!   API-HTTP) runs on its own task; any fatal server error or termination
//!   signal cancels a shared token, which drains the HTTP servers (capped at
//!   5 seconds) and stops the gRPC server. The first failure cause is
//!   returned.
//! - **Function-compute**: detected via the platform environment; the OTLP
//!   HTTP mux (`/v1`) and the fetch API (`/api`, `/health`) merge into one
//!   router served by the platform's request loop.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;

use crate::api::{api_router, ApiState};
use crate::auth::{AccessKeyInterceptor, AuthSettings};
use crate::config::ServerConfig;
use crate::ingest::{
    otlp_http_router, LogsServiceServer, MetricsServiceServer, OtlpGrpcReceiver, OtlpHttpState,
    TraceServiceServer,
};
use crate::{DepotError, SignalRepository};

const HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The depot server: repository plus ingress surfaces.
pub struct Server {
    config: ServerConfig,
    repository: Arc<SignalRepository>,
    auth: Arc<AuthSettings>,
    term_handler: Option<Box<dyn FnOnce() + Send>>,
}

impl Server {
    /// Build a server from validated configuration.
    pub fn new(config: ServerConfig) -> Result<Self, DepotError> {
        let repository = Arc::new(SignalRepository::new(&config.storage)?);
        let auth = Arc::new(AuthSettings::new(
            config.access_key_header.clone(),
            config.access_keys.clone(),
        ));
        Ok(Self {
            config,
            repository,
            auth,
            term_handler: None,
        })
    }

    /// Register a callback invoked when the function-compute platform
    /// signals termination.
    pub fn with_term_handler(mut self, handler: impl FnOnce() + Send + 'static) -> Self {
        self.term_handler = Some(Box::new(handler));
        self
    }

    /// Run until a termination signal or a fatal server error.
    pub async fn run(self) -> Result<(), DepotError> {
        if running_on_function_compute() {
            return self.run_function_compute().await;
        }

        let token = CancellationToken::new();
        {
            let token = token.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                token.cancel();
            });
        }
        self.bind().await?.serve(token).await
    }

    /// Bind every enabled listener eagerly. Binding to port 0 and reading
    /// the bound addresses back is the supported way to run on ephemeral
    /// ports (tests do this).
    pub async fn bind(self) -> Result<BoundServer, DepotError> {
        let otlp_grpc = if self.config.otlp.grpc_enabled() {
            Some(TcpListener::bind(self.config.otlp.grpc.socket_addr()?).await?)
        } else {
            None
        };
        let otlp_http = if self.config.otlp.http_enabled() {
            Some(TcpListener::bind(self.config.otlp.http.socket_addr()?).await?)
        } else {
            None
        };
        let api_http = if self.config.api.http_enabled() {
            Some(TcpListener::bind(self.config.api.http.socket_addr()?).await?)
        } else {
            None
        };

        Ok(BoundServer {
            repository: self.repository,
            auth: self.auth,
            otlp_grpc,
            otlp_http,
            api_http,
        })
    }

    /// One router serving both surfaces, for the platform request loop.
    fn merged_router(&self) -> Router {
        let otlp = otlp_http_router(OtlpHttpState {
            repository: self.repository.clone(),
            auth: self.auth.clone(),
        });
        let api = api_router(ApiState {
            repository: self.repository.clone(),
            auth: self.auth.clone(),
        });
        otlp.merge(api)
    }

    async fn run_function_compute(mut self) -> Result<(), DepotError> {
        tracing::info!("running under function-compute runtime");
        if let Some(handler) = self.term_handler.take() {
            tokio::spawn(async move {
                terminate_signal().await;
                handler();
            });
        }
        let router = self.merged_router();
        lambda_http::run(router)
            .await
            .map_err(|err| DepotError::Transport(err.to_string()))
    }
}

/// A server with its listeners bound but not yet serving.
pub struct BoundServer {
    repository: Arc<SignalRepository>,
    auth: Arc<AuthSettings>,
    otlp_grpc: Option<TcpListener>,
    otlp_http: Option<TcpListener>,
    api_http: Option<TcpListener>,
}

impl BoundServer {
    pub fn otlp_grpc_addr(&self) -> Option<SocketAddr> {
        self.otlp_grpc.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn otlp_http_addr(&self) -> Option<SocketAddr> {
        self.otlp_http.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn api_http_addr(&self) -> Option<SocketAddr> {
        self.api_http.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Serve until the token is cancelled; a fatal error on any server
    /// cancels the rest. Returns the first failure cause.
    pub async fn serve(self, token: CancellationToken) -> Result<(), DepotError> {
        let mut tasks: JoinSet<Result<(), DepotError>> = JoinSet::new();

        if let Some(listener) = self.otlp_grpc {
            let receiver = OtlpGrpcReceiver::new(self.repository.clone());
            let interceptor = AccessKeyInterceptor::new(self.auth.clone());
            tasks.spawn(run_grpc_server(listener, receiver, interceptor, token.clone()));
        }
        if let Some(listener) = self.otlp_http {
            let router = otlp_http_router(OtlpHttpState {
                repository: self.repository.clone(),
                auth: self.auth.clone(),
            });
            tasks.spawn(run_http_server(listener, router, token.clone(), "otlp"));
        }
        if let Some(listener) = self.api_http {
            let router = api_router(ApiState {
                repository: self.repository.clone(),
                auth: self.auth.clone(),
            });
            tasks.spawn(run_http_server(listener, router, token.clone(), "api"));
        }

        let mut first_error: Option<DepotError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result =
                joined.unwrap_or_else(|err| Err(DepotError::Transport(err.to_string())));
            if let Err(err) = result {
                tracing::error!(error = %err, "server task failed");
                token.cancel();
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn run_grpc_server(
    listener: TcpListener,
    receiver: OtlpGrpcReceiver,
    interceptor: AccessKeyInterceptor,
    token: CancellationToken,
) -> Result<(), DepotError> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "starting otlp grpc server");

    let shutdown = token.clone();
    tonic::transport::Server::builder()
        .add_service(TraceServiceServer::with_interceptor(
            receiver.clone(),
            interceptor.clone(),
        ))
        .add_service(MetricsServiceServer::with_interceptor(
            receiver.clone(),
            interceptor.clone(),
        ))
        .add_service(LogsServiceServer::with_interceptor(receiver, interceptor))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.cancelled().await;
        })
        .await
        .map_err(|err| DepotError::Transport(err.to_string()))?;

    tracing::info!(addr = %addr, "otlp grpc server stopped");
    Ok(())
}

async fn run_http_server(
    listener: TcpListener,
    router: Router,
    token: CancellationToken,
    name: &'static str,
) -> Result<(), DepotError> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, server = name, "starting http server");

    let shutdown = token.clone();
    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .into_future();

    let result = tokio::select! {
        result = serve => result.map_err(DepotError::Io),
        () = async {
            token.cancelled().await;
            tokio::time::sleep(HTTP_SHUTDOWN_TIMEOUT).await;
        } => {
            tracing::debug!(server = name, "http shutdown timeout elapsed");
            Ok(())
        }
    };

    tracing::info!(addr = %addr, server = name, "http server stopped");
    result
}

fn running_on_function_compute() -> bool {
    std::env::var_os("AWS_LAMBDA_RUNTIME_API").is_some()
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate_signal() => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut terminate) => {
            terminate.recv().await;
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
