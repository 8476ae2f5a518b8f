use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

pub mod config;
pub mod dispatch;
mod http;
mod metrics;
mod storage_helpers;

pub use config::{RuntimeConfig, DEFAULT_ADDR};

pub const ADMIN_TOKEN_HEADER: &str = "X-Lprgate-Admin-Token";
const ENV_ADMIN_TOKEN: &str = "LPRGATE_ADMIN_TOKEN";

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static ADMIN_TOKEN: OnceLock<String> = OnceLock::new();

/// Runs the gateway on `addr` until a shutdown is requested. Blocks the
/// calling thread; configuration is read from the environment.
pub fn start_server(addr: &str) -> std::io::Result<()> {
    let config = RuntimeConfig::from_env();
    // 中文注释：启动阶段先做一次显式迁移；请求路径上只 open 不 init，避免每次识别都跑迁移检查。
    if let Err(err) = storage_helpers::initialize_storage(&config.db_path) {
        log::warn!("storage startup init skipped: {}", err);
    }
    log::info!(
        "lprgate starting: addr={}, endpoints={}, db={}, archive_bucket={}",
        addr,
        config.endpoints.len(),
        config.db_path.display(),
        config.archive_bucket.as_deref().unwrap_or("-")
    );
    http::server::start_http(addr, config)
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub fn clear_shutdown_flag() {
    SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
}

pub(crate) fn mark_shutdown_requested() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn build_admin_token() -> String {
    if let Some(token) = config::env_string(ENV_ADMIN_TOKEN) {
        return token;
    }
    // 中文注释：只放进 OnceLock，不回写环境变量；服务运行中多线程 set_var 不安全。
    let token = storage_helpers::random_hex(32);
    log::info!("admin token generated; export {ENV_ADMIN_TOKEN} to pin it");
    token
}

/// Token guarding key management. Taken from `LPRGATE_ADMIN_TOKEN`, or
/// generated once per process.
pub fn admin_token() -> &'static str {
    ADMIN_TOKEN.get_or_init(build_admin_token).as_str()
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in left.iter().zip(right.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

pub fn admin_token_matches(candidate: &str) -> bool {
    constant_time_eq(admin_token().as_bytes(), candidate.trim().as_bytes())
}

pub fn request_shutdown(addr: &str) {
    mark_shutdown_requested();
    // Best-effort wakeups for both IPv4 and IPv6 loopback so whichever listener is active exits.
    let _ = send_shutdown_request(addr);
    if let Some(port) = addr.trim().strip_prefix("localhost:") {
        let _ = send_shutdown_request(&format!("127.0.0.1:{port}"));
        let _ = send_shutdown_request(&format!("[::1]:{port}"));
    }
}

fn send_shutdown_request(addr: &str) -> std::io::Result<()> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Ok(());
    }
    let addr = addr.strip_prefix("http://").unwrap_or(addr);
    let addr = addr.split('/').next().unwrap_or(addr);
    let addr = match addr.strip_prefix("0.0.0.0:") {
        Some(port) => format!("127.0.0.1:{port}"),
        None => addr.to_string(),
    };
    let mut stream = TcpStream::connect(&addr)?;
    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));
    let _ = stream.set_read_timeout(Some(Duration::from_millis(200)));
    let request = format!("GET /__shutdown HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes())?;
    Ok(())
}
