use std::sync::LazyLock;

pub const SERVICE_NAME: &str = "visit-relay";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DATA_DIR_NAME: &str = ".visit-relay";

fn user_agent_from_env(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub static USER_AGENT: LazyLock<String> = LazyLock::new(|| {
    let ua = user_agent_from_env(std::env::var("VISIT_USER_AGENT").ok()).unwrap_or_else(|| {
        format!(
            "{}/{} {}/{}",
            SERVICE_NAME,
            VERSION,
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    });
    tracing::info!(user_agent = %ua, "User-Agent initialized");
    ua
});
