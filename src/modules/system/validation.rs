use std::fmt;

use crate::models::{
    AppConfig, DispatchConfig, JobsConfig, PayloadMode, TokenSourceConfig, UpstreamConfig,
};

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
    pub actual_value: Option<String>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual_value {
            Some(val) => write!(f, "  • {}: {} (got: {})", self.field, self.message, val),
            None => write!(f, "  • {}: {}", self.field, self.message),
        }
    }
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            actual_value: None,
        }
    }

    fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            actual_value: Some(value.to_string()),
        }
    }
}

pub fn validate_app_config(config: &AppConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    if config.server.port == 0 {
        errors.push(ConfigError::with_value(
            "server.port",
            "must be between 1 and 65535",
            config.server.port,
        ));
    }
    validate_token_source(&config.token_source, &mut errors);
    validate_upstream(&config.upstream, &mut errors);
    validate_dispatch(&config.dispatch, &mut errors);
    validate_jobs(&config.jobs, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.starts_with("http://") || trimmed.starts_with("https://")
}

fn validate_token_source(config: &TokenSourceConfig, errors: &mut Vec<ConfigError>) {
    if config.url.trim().is_empty() {
        errors.push(ConfigError::new("token_source.url", "must not be empty"));
    } else if !is_http_url(&config.url) {
        errors.push(ConfigError::with_value(
            "token_source.url",
            "must start with http:// or https://",
            &config.url,
        ));
    }
    if config.fetch_timeout_secs == 0 || config.fetch_timeout_secs > 120 {
        errors.push(ConfigError::with_value(
            "token_source.fetch_timeout_secs",
            "must be between 1 and 120",
            config.fetch_timeout_secs,
        ));
    }
    if config.cache_ttl_secs == 0 {
        errors.push(ConfigError::with_value(
            "token_source.cache_ttl_secs",
            "must be greater than 0",
            config.cache_ttl_secs,
        ));
    }
    if config.default_region.trim().is_empty() {
        errors.push(ConfigError::new(
            "token_source.default_region",
            "must not be empty",
        ));
    }
}

fn validate_upstream(config: &UpstreamConfig, errors: &mut Vec<ConfigError>) {
    if config.endpoint_url.trim().is_empty() {
        errors.push(ConfigError::new("upstream.endpoint_url", "must not be empty"));
    } else if !is_http_url(&config.endpoint_url) {
        errors.push(ConfigError::with_value(
            "upstream.endpoint_url",
            "must start with http:// or https://",
            &config.endpoint_url,
        ));
    }
    if config.request_timeout_secs == 0 || config.request_timeout_secs > 120 {
        errors.push(ConfigError::with_value(
            "upstream.request_timeout_secs",
            "must be between 1 and 120",
            config.request_timeout_secs,
        ));
    }
    if config.content_type.trim().is_empty() {
        errors.push(ConfigError::new("upstream.content_type", "must not be empty"));
    }
    for name in config.extra_headers.keys() {
        if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ConfigError::with_value(
                "upstream.extra_headers",
                "contains an invalid header name",
                name,
            ));
        }
        if name.eq_ignore_ascii_case("authorization") {
            errors.push(ConfigError::new(
                "upstream.extra_headers",
                "authorization is set from the token pool and cannot be overridden",
            ));
        }
    }
    if config.upstream_proxy.enabled && !is_http_url(&config.upstream_proxy.url) {
        let scheme_ok = config.upstream_proxy.url.starts_with("socks5://");
        if !scheme_ok {
            errors.push(ConfigError::with_value(
                "upstream.upstream_proxy.url",
                "must be an http(s) or socks5 URL when the proxy is enabled",
                &config.upstream_proxy.url,
            ));
        }
    }
    match config.payload.mode {
        PayloadMode::Protobuf => {
            if config.payload.id_field == 0 {
                errors.push(ConfigError::with_value(
                    "upstream.payload.id_field",
                    "protobuf field numbers start at 1",
                    config.payload.id_field,
                ));
            }
            for (field, _) in &config.payload.trailer_fields {
                if *field == 0 || *field == config.payload.id_field {
                    errors.push(ConfigError::with_value(
                        "upstream.payload.trailer_fields",
                        "field number must be non-zero and differ from id_field",
                        field,
                    ));
                }
            }
        }
        PayloadMode::Hex => {
            if config.payload.hex.trim().is_empty() {
                errors.push(ConfigError::new(
                    "upstream.payload.hex",
                    "must not be empty in hex mode",
                ));
            } else if hex::decode(config.payload.hex.trim()).is_err() {
                errors.push(ConfigError::new(
                    "upstream.payload.hex",
                    "must be an even-length hexadecimal string",
                ));
            }
        }
    }
}

fn validate_dispatch(config: &DispatchConfig, errors: &mut Vec<ConfigError>) {
    if config.max_visits_per_request == 0 {
        errors.push(ConfigError::with_value(
            "dispatch.max_visits_per_request",
            "must be greater than 0",
            config.max_visits_per_request,
        ));
    }
    if config.delay_ms > 60_000 {
        errors.push(ConfigError::with_value(
            "dispatch.delay_ms",
            "should not exceed 60000",
            config.delay_ms,
        ));
    }
    if config.max_attempts == 0 || config.max_attempts > 10 {
        errors.push(ConfigError::with_value(
            "dispatch.max_attempts",
            "must be between 1 and 10",
            config.max_attempts,
        ));
    }
    if config.retry_base_ms > config.retry_max_ms {
        errors.push(ConfigError::with_value(
            "dispatch.retry_base_ms",
            "must not exceed dispatch.retry_max_ms",
            config.retry_base_ms,
        ));
    }
}

fn validate_jobs(config: &JobsConfig, errors: &mut Vec<ConfigError>) {
    if config.workers == 0 || config.workers > 64 {
        errors.push(ConfigError::with_value(
            "jobs.workers",
            "must be between 1 and 64",
            config.workers,
        ));
    }
    if config.queue_capacity == 0 {
        errors.push(ConfigError::with_value(
            "jobs.queue_capacity",
            "must be greater than 0",
            config.queue_capacity,
        ));
    }
    if config.max_visits_per_job == 0 {
        errors.push(ConfigError::with_value(
            "jobs.max_visits_per_job",
            "must be greater than 0",
            config.max_visits_per_job,
        ));
    }
    if config.max_tracked_jobs < config.queue_capacity {
        errors.push(ConfigError::with_value(
            "jobs.max_tracked_jobs",
            "must be at least jobs.queue_capacity",
            config.max_tracked_jobs,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut cfg = AppConfig::new();
        cfg.token_source.url = "https://tokens.example/list.json".to_string();
        cfg.upstream.endpoint_url = "https://upstream.example/visit".to_string();
        cfg
    }

    #[test]
    fn configured_defaults_pass() {
        assert!(validate_app_config(&valid_config()).is_ok());
    }

    #[test]
    fn bare_defaults_require_both_urls() {
        let errors = validate_app_config(&AppConfig::new()).expect_err("should fail");
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"token_source.url"));
        assert!(fields.contains(&"upstream.endpoint_url"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        cfg.dispatch.max_attempts = 0;
        cfg.jobs.workers = 0;
        let errors = validate_app_config(&cfg).expect_err("should fail");
        assert_eq!(errors.len(), 3);
        assert!(errors[0].to_string().contains("server.port"));
    }

    #[test]
    fn hex_mode_requires_valid_hex() {
        let mut cfg = valid_config();
        cfg.upstream.payload.mode = PayloadMode::Hex;
        cfg.upstream.payload.hex = "abc".to_string();
        let errors = validate_app_config(&cfg).expect_err("odd length");
        assert_eq!(errors[0].field, "upstream.payload.hex");

        cfg.upstream.payload.hex = "0a1b".to_string();
        assert!(validate_app_config(&cfg).is_ok());
    }

    #[test]
    fn authorization_header_cannot_be_overridden() {
        let mut cfg = valid_config();
        cfg.upstream
            .extra_headers
            .insert("Authorization".to_string(), "Bearer x".to_string());
        let errors = validate_app_config(&cfg).expect_err("should fail");
        assert!(errors.iter().any(|e| e.field == "upstream.extra_headers"));
    }

    #[test]
    fn tracked_jobs_must_cover_queue() {
        let mut cfg = valid_config();
        cfg.jobs.queue_capacity = 100;
        cfg.jobs.max_tracked_jobs = 10;
        let errors = validate_app_config(&cfg).expect_err("should fail");
        assert_eq!(errors[0].field, "jobs.max_tracked_jobs");
    }
}
