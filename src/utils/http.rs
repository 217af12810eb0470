use reqwest::{Client, Proxy};
use std::time::Duration;

use crate::models::UpstreamProxyConfig;

#[cfg(not(any(feature = "tls-native", feature = "tls-rustls")))]
compile_error!("one TLS backend feature must be enabled: `tls-native` or `tls-rustls`");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsBackendSelection {
    NativeTls,
    Rustls,
}

fn parse_tls_backend(raw: &str) -> Option<TlsBackendSelection> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "native" | "native-tls" | "default-tls" => Some(TlsBackendSelection::NativeTls),
        "rustls" => Some(TlsBackendSelection::Rustls),
        _ => None,
    }
}

fn supports_tls_backend(selection: TlsBackendSelection) -> bool {
    match selection {
        TlsBackendSelection::NativeTls => cfg!(feature = "tls-native"),
        TlsBackendSelection::Rustls => cfg!(feature = "tls-rustls"),
    }
}

fn compiled_default_tls_backend() -> TlsBackendSelection {
    if cfg!(feature = "tls-native") {
        TlsBackendSelection::NativeTls
    } else {
        TlsBackendSelection::Rustls
    }
}

fn selected_tls_backend() -> TlsBackendSelection {
    if let Some(requested) = std::env::var("TLS_BACKEND")
        .ok()
        .and_then(|raw| parse_tls_backend(&raw))
    {
        if supports_tls_backend(requested) {
            return requested;
        }
        tracing::warn!(
            "TLS_BACKEND requested an unavailable backend for this build; falling back to compiled default"
        );
    }
    compiled_default_tls_backend()
}

pub fn apply_tls_backend(builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
    match selected_tls_backend() {
        TlsBackendSelection::NativeTls => builder,
        TlsBackendSelection::Rustls => {
            #[cfg(feature = "tls-rustls")]
            {
                builder.use_rustls_tls()
            }
            #[cfg(not(feature = "tls-rustls"))]
            {
                builder
            }
        }
    }
}

pub fn tls_backend_name() -> &'static str {
    match selected_tls_backend() {
        TlsBackendSelection::NativeTls => "native-tls",
        TlsBackendSelection::Rustls => "rustls",
    }
}

// Shared builder for both outbound collaborators (token list, visit endpoint).
pub fn build_client(
    timeout_secs: u64,
    upstream_proxy: Option<&UpstreamProxyConfig>,
) -> Result<Client, reqwest::Error> {
    let mut builder = apply_tls_backend(Client::builder())
        .connect_timeout(Duration::from_secs(timeout_secs.min(20)))
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .user_agent(crate::constants::USER_AGENT.as_str());

    if let Some(config) = upstream_proxy {
        if config.enabled && !config.url.is_empty() {
            match Proxy::all(&config.url) {
                Ok(proxy) => {
                    builder = builder.proxy(proxy);
                    tracing::info!("HTTP client enabled upstream proxy: {}", config.url);
                }
                Err(e) => {
                    tracing::error!("invalid_proxy_url: {}, error: {}", config.url, e);
                }
            }
        }
    }

    builder.build()
}

pub fn log_tls_startup_diagnostics() {
    tracing::info!(
        "TLS startup diagnostics: requested_raw={:?}, effective={}",
        std::env::var("TLS_BACKEND").ok(),
        tls_backend_name()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{lock_env, ScopedEnvVar};

    #[test]
    fn tls_backend_aliases_are_recognized() {
        assert_eq!(parse_tls_backend("native"), Some(TlsBackendSelection::NativeTls));
        assert_eq!(parse_tls_backend(" RUSTLS "), Some(TlsBackendSelection::Rustls));
        assert_eq!(parse_tls_backend("openssl"), None);
    }

    #[test]
    fn unknown_override_falls_back_to_compiled_default() {
        let _lock = lock_env();
        let _env = ScopedEnvVar::set("TLS_BACKEND", "bogus");
        assert_eq!(selected_tls_backend(), compiled_default_tls_backend());
    }

    #[test]
    fn client_builds_with_and_without_proxy() {
        assert!(build_client(5, None).is_ok());
        let proxy = UpstreamProxyConfig {
            enabled: true,
            url: "http://127.0.0.1:3128".to_string(),
        };
        assert!(build_client(5, Some(&proxy)).is_ok());
    }
}
