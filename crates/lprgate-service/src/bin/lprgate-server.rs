use env_logger::{Builder, Env};
use std::io::Write;

fn init_logger() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn main() {
    init_logger();

    let addr = std::env::var(lprgate_service::config::ENV_ADDR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| lprgate_service::DEFAULT_ADDR.to_string());

    if let Err(err) = lprgate_service::start_server(&addr) {
        log::error!("lprgate stopped: addr={}, err={}", addr, err);
        std::process::exit(1);
    }
    log::info!("lprgate stopped: addr={addr}");
}
