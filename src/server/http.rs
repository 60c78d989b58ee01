//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Request bodies are
//! collected up front under the configured size limit, then handed to the
//! router as `Request<Bytes>`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::cache::{self, PageCache};
use crate::config::Args;
use crate::corrections::{ApplyEngine, CorrectionService, CorrectionStore};
use crate::db::DocumentStore;
use crate::entities::EntityRepository;
use crate::routes::{self, error_response};
use crate::schema::SchemaRegistry;
use crate::types::{CodexError, Result};
use crate::users::AdminUserService;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub db: Arc<dyn DocumentStore>,
    /// Live entity schemas
    pub registry: Arc<SchemaRegistry>,
    /// Rendered page cache
    pub cache: Arc<PageCache>,
    pub jwt: JwtValidator,
    pub entities: EntityRepository,
    /// Review lifecycle of corrections
    pub corrections: Arc<CorrectionStore>,
    /// Merge of approved corrections
    pub apply_engine: Arc<ApplyEngine>,
    /// Correction submission pipeline
    pub submissions: CorrectionService,
    pub users: AdminUserService,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every service on top of a document store
    pub fn new(args: Args, db: Arc<dyn DocumentStore>) -> Result<Self> {
        let secret = args
            .jwt_secret()
            .ok_or_else(|| CodexError::Config("JWT_SECRET is required in production mode".into()))?;
        let jwt = JwtValidator::new(&secret)?;

        let registry = Arc::new(SchemaRegistry::with_defaults());
        let cache = Arc::new(PageCache::new(
            Duration::from_secs(args.page_cache_ttl_secs),
            args.page_cache_max_entries,
        ));

        let entities = EntityRepository::new(Arc::clone(&db));
        let apply_engine = Arc::new(ApplyEngine::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            Arc::clone(&cache),
        ));
        let corrections = Arc::new(CorrectionStore::new(
            Arc::clone(&db),
            apply_engine.clone(),
        ));
        let submissions = CorrectionService::new(
            Arc::clone(&registry),
            entities.clone(),
            Arc::clone(&corrections),
        );
        let users = AdminUserService::new(Arc::clone(&db), Arc::clone(&cache));

        Ok(Self {
            args,
            db,
            registry,
            cache,
            jwt,
            entities,
            corrections,
            apply_engine,
            submissions,
            users,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server and serve until Ctrl-C or SIGTERM
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Codex listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - insecure JWT secret may be in use");
    }

    cache::spawn_cleanup_task(Arc::clone(&state.cache), Duration::from_secs(60));
    info!(
        ttl_secs = state.args.page_cache_ttl_secs,
        max_entries = state.args.page_cache_max_entries,
        "Page cache enabled"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            debug!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Codex shutting down");
                return Ok(());
            }
        }
    }
}

/// Collect the body under the size limit and route the request
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, state.args.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(%addr, %method, path = %path, "Request body too large");
            return Ok(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
                "PAYLOAD_TOO_LARGE",
            ));
        }
        Err(e) => {
            debug!(%addr, %method, path = %path, error = %e, "Failed to read request body");
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
                "BAD_REQUEST",
            ));
        }
    };

    let response = routes::route(&state, Request::from_parts(parts, body)).await;

    info!(
        %addr,
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    Ok(response)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
