use crate::services::catalog_service::{CatalogSettings, Delivery, KeyLayout, Schema, UrlPolicy};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub layout: KeyLayout,
    pub schema: Schema,
    pub url_policy: UrlPolicy,
    pub delivery: Delivery,
    /// Externally visible base URL used in generated blob links.
    pub public_base_url: String,
    /// Secret for signed blob URLs; a random one is used when absent.
    pub signing_secret: Option<String>,
    pub signed_url_ttl_days: u64,
    /// Request body limit for uploads; unlimited when absent.
    pub max_upload_bytes: Option<usize>,
}

/// What the binary should do after loading configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Migrate,
    Audit,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "PDF catalog with blob storage and searchable metadata")]
pub struct Args {
    /// Host to bind to (overrides CATALOG_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CATALOG_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where PDF blobs are stored (overrides CATALOG_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides CATALOG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Record id and blob key layout (overrides CATALOG_LAYOUT)
    #[arg(long, value_enum)]
    pub layout: Option<KeyLayout>,

    /// Descriptive field schema (overrides CATALOG_SCHEMA)
    #[arg(long, value_enum)]
    pub schema: Option<Schema>,

    /// Link cached on each record at upload (overrides CATALOG_URL_POLICY)
    #[arg(long, value_enum)]
    pub url_policy: Option<UrlPolicy>,

    /// How downloads are served (overrides CATALOG_DELIVERY)
    #[arg(long, value_enum)]
    pub delivery: Option<Delivery>,

    /// Base URL for generated links (overrides CATALOG_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Signed URL lifetime in days (overrides CATALOG_SIGNED_URL_TTL_DAYS)
    #[arg(long)]
    pub signed_url_ttl_days: Option<u64>,

    /// Maximum upload body size in bytes (overrides CATALOG_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "audit")]
    pub migrate: bool,

    /// Print a consistency report of records against blobs and exit
    #[arg(long)]
    pub audit: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::from_args(Args::parse())
    }

    /// Merge already-parsed CLI args over the environment.
    pub fn from_args(args: Args) -> Result<(Self, RunMode)> {
        // --- Environment fallback ---
        let env_host = env::var("CATALOG_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("CATALOG_PORT")?.unwrap_or(3000);
        let env_storage =
            env::var("CATALOG_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("CATALOG_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/catalog.db".into());
        let env_layout = env_enum("CATALOG_LAYOUT")?.unwrap_or(KeyLayout::Hierarchical);
        let env_schema = env_enum("CATALOG_SCHEMA")?.unwrap_or(Schema::Titled);
        let env_url_policy = env_enum("CATALOG_URL_POLICY")?.unwrap_or(UrlPolicy::None);
        let env_delivery = env_enum("CATALOG_DELIVERY")?.unwrap_or(Delivery::Stream);
        let env_ttl = env_parse("CATALOG_SIGNED_URL_TTL_DAYS")?.unwrap_or(365);
        let env_max_upload = env_parse("CATALOG_MAX_UPLOAD_BYTES")?;
        let env_base_url = env::var("CATALOG_PUBLIC_BASE_URL").ok();
        let signing_secret = env::var("CATALOG_SIGNING_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        // --- Merge ---
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_base_url = args
            .public_base_url
            .or(env_base_url)
            .unwrap_or_else(|| default_base_url(&host, port));

        let cfg = Self {
            host,
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            layout: args.layout.unwrap_or(env_layout),
            schema: args.schema.unwrap_or(env_schema),
            url_policy: args.url_policy.unwrap_or(env_url_policy),
            delivery: args.delivery.unwrap_or(env_delivery),
            public_base_url,
            signing_secret,
            signed_url_ttl_days: args.signed_url_ttl_days.unwrap_or(env_ttl),
            max_upload_bytes: args.max_upload_bytes.or(env_max_upload),
        };

        let mode = if args.migrate {
            RunMode::Migrate
        } else if args.audit {
            RunMode::Audit
        } else {
            RunMode::Serve
        };
        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            layout: self.layout,
            schema: self.schema,
            url_policy: self.url_policy,
            delivery: self.delivery,
            signed_url_ttl: Duration::from_secs(
                self.signed_url_ttl_days.saturating_mul(SECONDS_PER_DAY),
            ),
        }
    }
}

fn default_base_url(host: &str, port: u16) -> String {
    let host = match host {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{port}")
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_enum<T: ValueEnum>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => <T as ValueEnum>::from_str(&value, true)
            .map(Some)
            .map_err(|err| anyhow!("parsing {} value `{}`: {}", name, value, err)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_select_mode_and_variant() {
        let args = Args::parse_from([
            "pdf-catalog",
            "--port",
            "8080",
            "--layout",
            "flat",
            "--url-policy",
            "signed",
            "--delivery",
            "redirect",
            "--audit",
        ]);
        let (cfg, mode) = AppConfig::from_args(args).unwrap();
        assert_eq!(mode, RunMode::Audit);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.layout, KeyLayout::Flat);
        assert_eq!(cfg.url_policy, UrlPolicy::Signed);
        assert_eq!(cfg.delivery, Delivery::Redirect);
        assert_eq!(cfg.addr(), format!("{}:8080", cfg.host));
    }

    #[test]
    fn migrate_and_audit_conflict() {
        assert!(Args::try_parse_from(["pdf-catalog", "--migrate", "--audit"]).is_err());
    }

    #[test]
    fn ttl_days_become_settings_duration() {
        let args = Args::parse_from(["pdf-catalog", "--signed-url-ttl-days", "2"]);
        let (cfg, _) = AppConfig::from_args(args).unwrap();
        assert_eq!(
            cfg.catalog_settings().signed_url_ttl,
            Duration::from_secs(2 * SECONDS_PER_DAY)
        );
    }

    #[test]
    fn huge_ttl_saturates() {
        let days = u64::MAX.to_string();
        let args = Args::parse_from(["pdf-catalog", "--signed-url-ttl-days", days.as_str()]);
        let (cfg, _) = AppConfig::from_args(args).unwrap();
        assert_eq!(
            cfg.catalog_settings().signed_url_ttl,
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn wildcard_host_maps_to_loopback_base_url() {
        assert_eq!(default_base_url("0.0.0.0", 3000), "http://127.0.0.1:3000");
        assert_eq!(default_base_url("files.local", 80), "http://files.local:80");
    }
}
