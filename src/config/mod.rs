use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tls: TlsConfig,
    /// IP address of the single reverse proxy whose forwarded headers are trusted
    pub trusted_proxy: String,
    /// Value of the `Privacy-Policy` response header
    pub privacy_policy: String,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for a client to send request headers, idle keep-alive included
    pub read_timeout_secs: u64,
    /// Deadline for producing a response once the request is read
    pub write_timeout_secs: u64,
    /// HTTP/2 keep-alive ping interval for otherwise idle connections
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

impl DatabaseBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseBackend::Sqlite => "sqlite",
            DatabaseBackend::Postgres => "postgres",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub min_version: TlsVersion,
}

/// Minimum TLS protocol version accepted by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "TLS12")]
    Tls12,
    #[default]
    #[serde(rename = "TLS13")]
    Tls13,
}

impl TlsVersion {
    /// Unknown selectors fall back to TLS 1.3.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "TLS12" => TlsVersion::Tls12,
            "TLS13" => TlsVersion::Tls13,
            other => {
                tracing::warn!(
                    "Unknown TLS_MIN_VERSION '{other}', falling back to 'TLS13'. Supported values: TLS12, TLS13"
                );
                TlsVersion::Tls13
            }
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Config {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: &'static str = "1997";
    const DEFAULT_DATABASE_URL: &'static str = "sqlite://./ipsight.db?mode=rwc";
    const DEFAULT_MAX_CONNECTIONS: &'static str = "5";
    const DEFAULT_SHUTDOWN_GRACE_SECS: &'static str = "5";
    const DEFAULT_READ_TIMEOUT_SECS: &'static str = "5";
    const DEFAULT_WRITE_TIMEOUT_SECS: &'static str = "10";
    const DEFAULT_IDLE_TIMEOUT_SECS: &'static str = "60";

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("IPSIGHT_HOST").unwrap_or_else(|_| Self::DEFAULT_HOST.to_string());
        let port = std::env::var("IPSIGHT_PORT")
            .unwrap_or_else(|_| Self::DEFAULT_PORT.to_string())
            .parse::<u16>()
            .context("IPSIGHT_PORT must be a valid port number")?;
        let read_timeout_secs = env_secs("READ_TIMEOUT_SECS", Self::DEFAULT_READ_TIMEOUT_SECS)?;
        let write_timeout_secs = env_secs("WRITE_TIMEOUT_SECS", Self::DEFAULT_WRITE_TIMEOUT_SECS)?;
        let idle_timeout_secs = env_secs("IDLE_TIMEOUT_SECS", Self::DEFAULT_IDLE_TIMEOUT_SECS)?;

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_DATABASE_URL.to_string());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let trusted_proxy =
            std::env::var("TRUSTED_PROXY").context("TRUSTED_PROXY must be set")?;

        let cert_file = std::env::var("TLS_CERT_FILE").context("TLS_CERT_FILE must be set")?;
        let key_file = std::env::var("TLS_KEY_FILE").context("TLS_KEY_FILE must be set")?;
        let min_version = std::env::var("TLS_MIN_VERSION")
            .map(|v| TlsVersion::parse(&v))
            .unwrap_or_default();

        let privacy_policy =
            std::env::var("PRIVACY_POLICY_URL").context("PRIVACY_POLICY_URL must be set")?;

        let shutdown_grace_secs =
            env_secs("SHUTDOWN_GRACE_SECS", Self::DEFAULT_SHUTDOWN_GRACE_SECS)?;

        let config = Config {
            server: ServerConfig {
                host,
                port,
                read_timeout_secs,
                write_timeout_secs,
                idle_timeout_secs,
            },
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            tls: TlsConfig {
                cert_file: PathBuf::from(cert_file),
                key_file: PathBuf::from(key_file),
                min_version,
            },
            trusted_proxy,
            privacy_policy,
            shutdown_grace_secs,
        };

        config.validate()?;

        Ok(config)
    }

    /// Checks the values that `from_env` cannot default.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.trusted_proxy.trim().is_empty() {
            bail!("reverse proxy IP address is required");
        }

        self.trusted_proxy
            .parse::<IpAddr>()
            .with_context(|| format!("TRUSTED_PROXY '{}' is not an IP address", self.trusted_proxy))?;

        if self.database.url.is_empty() {
            bail!("dsn cannot be empty");
        }

        if self.tls.cert_file.as_os_str().is_empty() || self.tls.key_file.as_os_str().is_empty() {
            bail!("certification files are required");
        }

        if self.privacy_policy.is_empty() {
            bail!("privacy policy is required");
        }

        url::Url::parse(&self.privacy_policy).context("invalid privacy policy")?;

        if self.server.read_timeout_secs == 0
            || self.server.write_timeout_secs == 0
            || self.server.idle_timeout_secs == 0
        {
            bail!("server timeouts must be at least one second");
        }

        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn env_secs(name: &str, default: &str) -> anyhow::Result<u64> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .with_context(|| format!("{name} must be a whole number of seconds"))
}
