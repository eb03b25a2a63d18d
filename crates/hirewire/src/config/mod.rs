use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

const DEVELOPMENT_SESSION_SECRET: &str = "hirewire-development-session-secret";
const DEVELOPMENT_VIDEO_SECRET: &str = "hirewire-development-video-secret";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub session: SessionConfig,
    pub video: VideoConfig,
    pub resumes: ResumeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let session = SessionConfig {
            secret: secret_var("APP_SESSION_SECRET", environment, DEVELOPMENT_SESSION_SECRET)?,
            ttl_minutes: minutes_var("APP_SESSION_TTL_MINUTES", 240)?,
        };

        let video = VideoConfig {
            api_key: env::var("APP_VIDEO_API_KEY").unwrap_or_else(|_| "hirewire-dev".to_string()),
            api_secret: secret_var("APP_VIDEO_API_SECRET", environment, DEVELOPMENT_VIDEO_SECRET)?,
            ttl_minutes: minutes_var("APP_VIDEO_TOKEN_TTL_MINUTES", 60)?,
        };

        let public_url = env::var("APP_RESUMES_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:9000/resumes".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            session,
            video,
            resumes: ResumeConfig {
                public_url: public_url.trim_end_matches('/').to_string(),
            },
        })
    }
}

fn secret_var(
    name: &'static str,
    environment: AppEnvironment,
    fallback: &str,
) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ if environment == AppEnvironment::Production => Err(ConfigError::MissingSecret(name)),
        _ => Ok(fallback.to_string()),
    }
}

fn minutes_var(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(minutes) if minutes > 0 => Ok(minutes),
            _ => Err(ConfigError::InvalidTtl(name)),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Signing key and lifetime for interview session tokens.
#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

/// Credentials for the external video-calling provider.
#[derive(Clone)]
pub struct VideoConfig {
    pub api_key: String,
    pub api_secret: String,
    pub ttl_minutes: i64,
}

impl fmt::Debug for VideoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

/// Location resumes are served from.
#[derive(Debug, Clone)]
pub struct ResumeConfig {
    pub public_url: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTtl(&'static str),
    MissingSecret(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTtl(name) => {
                write!(f, "{name} must be a positive number of minutes")
            }
            ConfigError::MissingSecret(name) => {
                write!(f, "{name} must be set when running in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTtl(_)
            | ConfigError::MissingSecret(_) => None,
        }
    }
}
