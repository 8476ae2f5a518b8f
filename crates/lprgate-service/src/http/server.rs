use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::config::RuntimeConfig;
use crate::dispatch::{build_orchestrator, RecognitionOrchestrator};

#[derive(Clone)]
pub(crate) struct AppState {
    pub orchestrator: Arc<RecognitionOrchestrator>,
    pub recognizer_token: Arc<str>,
    pub db_path: Arc<PathBuf>,
    pub password_hash_cost: u32,
}

pub(crate) fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(super::system_endpoint::handle_root))
        .route("/health", get(super::system_endpoint::handle_health))
        .route("/metrics", get(super::system_endpoint::handle_metrics))
        .route("/__shutdown", get(super::system_endpoint::handle_shutdown))
        .route("/api/recognize", post(super::recognize_endpoint::handle_recognize))
        .route("/api/plate-logs", get(super::plate_log_endpoint::handle_list))
        .route("/api/keys", post(super::apikey_endpoint::handle_create))
        .route("/api/register", post(super::user_endpoint::handle_register))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn wait_for_shutdown_signal() {
    while !crate::shutdown_requested() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn serve_on_listener(listener: tokio::net::TcpListener, app: Router) -> io::Result<()> {
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
}

async fn run_server(addr: &str, app: Router) -> io::Result<()> {
    // 中文注释：localhost 可能只解析到 IPv6；双栈监听避免客户端选栈不同导致连不上。
    if let Some(port) = addr.strip_prefix("localhost:") {
        let v4 = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await;
        let v6 = tokio::net::TcpListener::bind(format!("[::1]:{port}")).await;
        return match (v4, v6) {
            (Ok(v4_listener), Ok(v6_listener)) => {
                let v4_task = serve_on_listener(v4_listener, app.clone());
                let v6_task = serve_on_listener(v6_listener, app);
                let (v4_result, v6_result) = tokio::join!(v4_task, v6_task);
                v4_result.and(v6_result)
            }
            (Ok(listener), Err(_)) | (Err(_), Ok(listener)) => serve_on_listener(listener, app).await,
            (Err(err), Err(_)) => Err(err),
        };
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on_listener(listener, app).await
}

pub fn start_http(addr: &str, config: RuntimeConfig) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let orchestrator =
            build_orchestrator(&config).map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        if config.recognizer_token.is_empty() {
            log::warn!("recognizer token is empty; backends will likely reject requests");
        }
        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            recognizer_token: Arc::from(config.recognizer_token.as_str()),
            db_path: Arc::new(config.db_path.clone()),
            password_hash_cost: config.password_hash_cost,
        };
        let app = build_router(state, config.max_upload_bytes);
        log::info!("lprgate listening: addr={addr}");
        run_server(addr, app).await
    })
}
