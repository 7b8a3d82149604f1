//! logger.rs
//! Logger global (env_logger). `RUST_LOG` manda; por defecto info para el
//! servicio y warn para sqlx, que loguea cada sentencia en info.

const DEFAULT_FILTER: &str = "info,sqlx=warn";

pub fn init_logger() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();
}
