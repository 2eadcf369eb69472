use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Scheme and authority used in public object URLs.
    pub public_url: String,
    pub bucket: String,
    /// On-the-fly render URLs; read once at startup.
    pub image_transforms: bool,
    pub admin_email: String,
    pub admin_password: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image delivery service for a photography portfolio")]
pub struct Args {
    /// Host to bind to (overrides FOLIO_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FOLIO_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides FOLIO_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FOLIO_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL of this server (overrides FOLIO_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Bucket holding the portfolio images (overrides FOLIO_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Serve render URLs instead of stored variants (overrides FOLIO_IMAGE_TRANSFORMS)
    #[arg(long)]
    pub image_transforms: Option<bool>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge `args` over the variables returned by `lookup` over defaults.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let env_port = match lookup("FOLIO_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FOLIO_PORT value `{}`", value))?,
            None => 3000,
        };

        let host = args.host.unwrap_or_else(|| env_or("FOLIO_HOST", "0.0.0.0"));
        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or_else(|| lookup("FOLIO_PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));

        Ok(Self {
            host,
            port,
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("FOLIO_STORAGE_DIR", "./data/objects")),
            database_url: args
                .database_url
                .unwrap_or_else(|| env_or("FOLIO_DATABASE_URL", "sqlite://./data/meta/folio.db")),
            public_url: public_url.trim_end_matches('/').to_string(),
            bucket: args
                .bucket
                .unwrap_or_else(|| env_or("FOLIO_BUCKET", "portfolio-images")),
            image_transforms: args.image_transforms.unwrap_or_else(|| {
                lookup("FOLIO_IMAGE_TRANSFORMS")
                    .map(|value| parse_flag(&value))
                    .unwrap_or(false)
            }),
            admin_email: env_or("FOLIO_ADMIN_EMAIL", "admin@localhost"),
            admin_password: env_or("FOLIO_ADMIN_PASSWORD", ""),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `1` and `true` (any case) turn a flag on; anything else leaves it off.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let cfg = AppConfig::from_sources(Args::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.public_url, "http://127.0.0.1:3000");
        assert_eq!(cfg.bucket, "portfolio-images");
        assert!(!cfg.image_transforms);
        assert!(cfg.admin_password.is_empty());
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(8080),
            image_transforms: Some(false),
            ..Args::default()
        };
        let cfg = AppConfig::from_sources(
            args,
            lookup(&[
                ("FOLIO_PORT", "9000"),
                ("FOLIO_IMAGE_TRANSFORMS", "true"),
                ("FOLIO_PUBLIC_URL", "https://photos.example.com/"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(!cfg.image_transforms);
        assert_eq!(cfg.public_url, "https://photos.example.com");
    }

    #[test]
    fn transform_flag_parsing() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" true "));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = AppConfig::from_sources(Args::default(), lookup(&[("FOLIO_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("FOLIO_PORT"));
    }
}
