//! Configuration management.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::analytics::DEFAULT_OBJECT_TYPE;
use crate::auth::DEFAULT_HANDLE_DOMAIN;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
    pub analytics: AnalyticsConfig,
    pub security: SecurityConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub request_timeout_secs: u64,
    pub max_body_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsTransportKind {
    Log,
    Http,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    pub transport: AnalyticsTransportKind,
    pub endpoint: Option<String>,
    pub buffer_capacity: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub default_domain: String,
    pub object_type: String,
    pub trust_forwarded_for: bool,
}

impl AnalyticsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub rate_limiting_enabled: bool,
    pub rate_limit_requests_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base64-encoded Ed25519 public key. Principal resolution is off without it.
    pub jwt_public_key: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub max_age_secs: u64,
}

fn var_or<T: FromStr>(
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Like [`var_or`], but zero is rejected.
fn positive_var_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
{
    let value = var_or(name, default, "positive number")?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            expected: "positive number",
            value: "0".to_string(),
        });
    }
    Ok(value)
}

fn flag_or(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    var_or(name, default, "boolean")
}

fn optional_var(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment();

        Ok(Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: var_or("PORT", 8080, "port number")?,
                environment: environment.clone(),
                request_timeout_secs: var_or("REQUEST_TIMEOUT_SECS", 30, "number")?,
                max_body_size: var_or("MAX_BODY_SIZE", 1_048_576, "number")?,
            },
            logging: Self::parse_logging_config(&environment),
            telemetry: Self::parse_telemetry_config()?,
            analytics: Self::parse_analytics_config()?,
            security: Self::parse_security_config(&environment)?,
            auth: AuthConfig {
                jwt_public_key: optional_var("JWT_PUBLIC_KEY"),
                jwt_issuer: optional_var("JWT_ISSUER"),
                jwt_audience: optional_var("JWT_AUDIENCE"),
            },
            cors: Self::parse_cors_config(&environment)?,
        })
    }

    fn parse_environment() -> Environment {
        match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    fn parse_logging_config(environment: &Environment) -> LoggingConfig {
        let is_dev = environment.is_development();

        LoggingConfig {
            level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| if is_dev { "debug" } else { "info" }.to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| if is_dev { "pretty" } else { "json" }.to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    fn parse_telemetry_config() -> Result<TelemetryConfig, ConfigError> {
        Ok(TelemetryConfig {
            otlp_endpoint: optional_var("OTEL_EXPORTER_OTLP_ENDPOINT"),
            service_name: env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "beacon".to_string()),
            metrics_enabled: flag_or("METRICS_ENABLED", true)?,
        })
    }

    fn parse_analytics_config() -> Result<AnalyticsConfig, ConfigError> {
        let transport = match env::var("ANALYTICS_TRANSPORT")
            .unwrap_or_else(|_| "log".to_string())
            .to_lowercase()
            .as_str()
        {
            "log" => AnalyticsTransportKind::Log,
            "http" => AnalyticsTransportKind::Http,
            other => {
                return Err(ConfigError::Invalid {
                    name: "ANALYTICS_TRANSPORT",
                    expected: "transport (log, http)",
                    value: other.to_string(),
                })
            }
        };

        let enabled = flag_or("ANALYTICS_ENABLED", true)?;
        let endpoint = optional_var("ANALYTICS_ENDPOINT");
        if enabled && transport == AnalyticsTransportKind::Http && endpoint.is_none() {
            return Err(ConfigError::Missing("ANALYTICS_ENDPOINT"));
        }

        Ok(AnalyticsConfig {
            enabled,
            transport,
            endpoint,
            buffer_capacity: positive_var_or("ANALYTICS_BUFFER_CAPACITY", 10_000)?,
            batch_size: positive_var_or("ANALYTICS_BATCH_SIZE", 100)?,
            flush_interval_ms: positive_var_or("ANALYTICS_FLUSH_INTERVAL_MS", 500)?,
            http_timeout_secs: var_or("ANALYTICS_HTTP_TIMEOUT_SECS", 5, "number")?,
            shutdown_timeout_secs: var_or("ANALYTICS_SHUTDOWN_TIMEOUT_SECS", 10, "number")?,
            default_domain: env::var("ANALYTICS_DEFAULT_DOMAIN")
                .unwrap_or_else(|_| DEFAULT_HANDLE_DOMAIN.to_string()),
            object_type: env::var("ANALYTICS_OBJECT_TYPE")
                .unwrap_or_else(|_| DEFAULT_OBJECT_TYPE.to_string()),
            trust_forwarded_for: flag_or("ANALYTICS_TRUST_FORWARDED_FOR", false)?,
        })
    }

    fn parse_security_config(environment: &Environment) -> Result<SecurityConfig, ConfigError> {
        let is_prod = environment.is_production();

        Ok(SecurityConfig {
            rate_limiting_enabled: flag_or("RATE_LIMITING_ENABLED", is_prod)?,
            rate_limit_requests_per_minute: var_or("RATE_LIMIT_REQUESTS_PER_MINUTE", 300, "number")?,
        })
    }

    fn parse_cors_config(environment: &Environment) -> Result<CorsConfig, ConfigError> {
        let default_origins = if environment.is_development() {
            vec!["*".to_string()]
        } else {
            vec![]
        };

        Ok(CorsConfig {
            allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default_origins),
            max_age_secs: var_or("CORS_MAX_AGE_SECS", 3600, "number")?,
        })
    }

    pub fn validate_for_production(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.server.environment.is_production() {
            if self.cors.allowed_origins.contains(&"*".to_string()) {
                issues.push("CORS should not allow all origins (*) in production".to_string());
            }

            if !self.security.rate_limiting_enabled {
                issues.push("Rate limiting should be enabled in production".to_string());
            }

            if !self.analytics.enabled {
                issues.push("Analytics are disabled in production".to_string());
            }

            if self.analytics.transport == AnalyticsTransportKind::Log {
                issues.push("Analytics events are only written to the log".to_string());
            }

            if self.auth.jwt_public_key.is_none() {
                issues.push(
                    "JWT_PUBLIC_KEY is not set, every request will be anonymous".to_string(),
                );
            }
        }

        issues
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Config {
    pub fn default_for_testing() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                environment: Environment::Development,
                request_timeout_secs: 30,
                max_body_size: 1_048_576,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
            },
            telemetry: TelemetryConfig {
                otlp_endpoint: None,
                service_name: "beacon-test".to_string(),
                metrics_enabled: false,
            },
            analytics: AnalyticsConfig {
                enabled: true,
                transport: AnalyticsTransportKind::Log,
                endpoint: None,
                buffer_capacity: 1024,
                batch_size: 10,
                flush_interval_ms: 50,
                http_timeout_secs: 2,
                shutdown_timeout_secs: 5,
                default_domain: DEFAULT_HANDLE_DOMAIN.to_string(),
                object_type: DEFAULT_OBJECT_TYPE.to_string(),
                trust_forwarded_for: true,
            },
            security: SecurityConfig {
                rate_limiting_enabled: false,
                rate_limit_requests_per_minute: 300,
            },
            auth: AuthConfig {
                jwt_public_key: None,
                jwt_issuer: None,
                jwt_audience: None,
            },
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
                max_age_secs: 3600,
            },
        }
    }
}
