mod commands;
pub mod constants;
pub mod error;
mod models;
mod modules;
mod service;
#[cfg(test)]
mod test_utils;
mod utils;

use modules::system::logger;
use tracing::{error, info, warn};

fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_value(key)?;
    match raw.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid {} value: {}", key, raw);
            None
        }
    }
}

fn apply_env_overrides(config: &mut models::AppConfig) {
    if let Some(port) = parse_env_number::<u16>("VISIT_PORT") {
        info!("Using port from environment: {}", port);
        config.server.port = port;
    }

    if let Some(allow_lan) = env_value("VISIT_ALLOW_LAN_ACCESS") {
        if let Some(parsed) = parse_env_bool(&allow_lan) {
            config.server.allow_lan_access = parsed;
            info!("Using LAN access setting from environment: {}", parsed);
        } else {
            warn!("Ignoring invalid LAN access value: {}", allow_lan);
        }
    }

    if let Some(url) = env_value("VISIT_TOKEN_SOURCE_URL") {
        info!("Using token source URL from environment");
        config.token_source.url = url;
    }

    if let Some(url) = env_value("VISIT_ENDPOINT_URL") {
        info!("Using upstream endpoint URL from environment");
        config.upstream.endpoint_url = url;
    }

    if let Some(delay_ms) = parse_env_number::<u64>("VISIT_DELAY_MS") {
        info!("Using visit delay from environment: {}ms", delay_ms);
        config.dispatch.delay_ms = delay_ms;
    }

    if let Some(workers) = parse_env_number::<usize>("VISIT_JOB_WORKERS") {
        info!("Using job worker count from environment: {}", workers);
        config.jobs.workers = workers;
    }
}

fn load_startup_config() -> Result<models::AppConfig, String> {
    let mut config = modules::system::config::load_app_config()
        .map_err(|e| format!("failed_to_load_config: {}", e))?;

    apply_env_overrides(&mut config);
    modules::system::validation::validate_app_config(&config).map_err(|errors| {
        format!(
            "configuration_validation_failed:\n{}",
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;
    Ok(config)
}

async fn start_runtime(state: &commands::service::ServiceState) -> Result<(), String> {
    let config = load_startup_config()?;
    utils::http::log_tls_startup_diagnostics();

    info!("Starting visit service on port {}", config.server.port);
    if config.server.allow_lan_access {
        warn!("LAN access is enabled (bind address will be 0.0.0.0)");
    } else {
        info!("LAN access is disabled (bind address will be 127.0.0.1)");
    }

    let status = commands::service::start_service(&config, state)
        .await
        .map_err(|e| format!("failed_to_start_visit_service: {}", e))?;
    info!(
        "Visit service ready at {} with {} tokens loaded",
        status.base_url, status.loaded_tokens
    );
    Ok(())
}

pub fn run() {
    logger::init_logger();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(async {
        let state = commands::service::ServiceState::new();
        if let Err(e) = start_runtime(&state).await {
            error!("{}", e);
            std::process::exit(1);
        }

        info!("Visit service is running. Press Ctrl+C to exit.");
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down visit service");
        if let Err(e) = commands::service::stop_service(&state).await {
            warn!("Shutdown finished with errors: {}", e);
        }
    });
}
