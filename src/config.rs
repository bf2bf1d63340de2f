use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};
use uuid::Uuid;

/// Longest download-link lifetime accepted: seven days.
pub const MAX_PRESIGN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub public_base_url: String,
    pub presign_secret: String,
    pub presign_ttl: Duration,
    pub store_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_base_url", &self.public_base_url)
            .field("presign_ttl", &self.presign_ttl)
            .field("store_timeout", &self.store_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image upload and retrieval service")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_SERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_SERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where image payloads are stored (overrides IMAGE_SERVICE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides IMAGE_SERVICE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Externally reachable base URL used in download links (overrides IMAGE_SERVICE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Lifetime of download links in seconds (overrides IMAGE_SERVICE_PRESIGN_TTL_SECS)
    #[arg(long)]
    pub presign_ttl_secs: Option<u64>,

    /// Per-call store timeout in seconds (overrides IMAGE_SERVICE_STORE_TIMEOUT_SECS)
    #[arg(long)]
    pub store_timeout_secs: Option<u64>,

    /// Largest accepted upload body (overrides IMAGE_SERVICE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name))?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values looked up through `lookup`, then defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let host = args
            .host
            .unwrap_or(lookup("IMAGE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".into()));
        let port = match args.port {
            Some(port) => port,
            None => parse_env(&lookup, "IMAGE_SERVICE_PORT", 3000)?,
        };
        let storage_dir = args.storage_dir.unwrap_or(
            lookup("IMAGE_SERVICE_STORAGE_DIR").unwrap_or_else(|_| "./data/images".into()),
        );
        let database_url = args.database_url.unwrap_or(
            lookup("IMAGE_SERVICE_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/meta/image_service.db".into()),
        );
        let public_base_url = args.public_url.unwrap_or(
            lookup("IMAGE_SERVICE_PUBLIC_URL").unwrap_or_else(|_| format!("http://{host}:{port}")),
        );
        let presign_ttl_secs = match args.presign_ttl_secs {
            Some(secs) => secs,
            None => parse_env(&lookup, "IMAGE_SERVICE_PRESIGN_TTL_SECS", 3600)?,
        };
        if presign_ttl_secs == 0 || presign_ttl_secs > MAX_PRESIGN_TTL_SECS {
            bail!(
                "presign TTL must be between 1 and {} seconds, got {}",
                MAX_PRESIGN_TTL_SECS,
                presign_ttl_secs
            );
        }
        let store_timeout_secs = match args.store_timeout_secs {
            Some(secs) => secs,
            None => parse_env(&lookup, "IMAGE_SERVICE_STORE_TIMEOUT_SECS", 10)?,
        };
        let max_upload_bytes = match args.max_upload_bytes {
            Some(bytes) => bytes,
            None => parse_env(&lookup, "IMAGE_SERVICE_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        };
        let presign_secret = match lookup("IMAGE_SERVICE_PRESIGN_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!(
                    "IMAGE_SERVICE_PRESIGN_SECRET not set; download links will not survive a restart"
                );
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            }
        };

        Ok(Self {
            host,
            port,
            storage_dir,
            database_url,
            public_base_url,
            presign_secret,
            presign_ttl: Duration::from_secs(presign_ttl_secs),
            store_timeout: Duration::from_secs(store_timeout_secs),
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
