use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Storage backend selected once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    /// Bounded in-process LRU cache with per-entry TTL.
    Memory {
        max_items: usize,
        ttl: Duration,
        sweep_interval: Option<Duration>,
    },
    /// Embedded key-value store on disk.
    Sled { path: PathBuf, timeout: Duration },
    /// Relational store reached through a connection URL.
    Sqlite { url: String, timeout: Duration },
}

impl StorageConfig {
    pub const DEFAULT_MAX_ITEMS: usize = 5000;
    pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

    pub fn memory_defaults() -> Self {
        StorageConfig::Memory {
            max_items: Self::DEFAULT_MAX_ITEMS,
            ttl: Self::DEFAULT_TTL,
            sweep_interval: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageConfig::Memory { .. } => "memory",
            StorageConfig::Sled { .. } => "sled",
            StorageConfig::Sqlite { .. } => "sqlite",
        }
    }
}

pub struct Config {
    pub host: String,
    pub http_port: u16,
    pub storage: StorageConfig,
    pub event_buffer: usize,
}

impl Config {
    const DEFAULT_HOST: &str = "0.0.0.0";
    const DEFAULT_HTTP_PORT: u16 = 8080;
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
    const DEFAULT_EVENT_BUFFER: usize = 1000;

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("DISMISSIBLE_DATA_DIR")
            .unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_string());
        let timeout = Duration::from_millis(parse_or(
            &lookup,
            "DISMISSIBLE_STORE_TIMEOUT_MS",
            Self::DEFAULT_STORE_TIMEOUT_MS,
        ));

        let backend = lookup("DISMISSIBLE_STORAGE").unwrap_or_else(|| "memory".to_string());
        let storage = match backend.trim().to_lowercase().as_str() {
            "sled" => StorageConfig::Sled {
                path: Path::new(&data_dir).join("items.sled"),
                timeout,
            },
            "sqlite" => StorageConfig::Sqlite {
                url: lookup("DISMISSIBLE_SQLITE_URL")
                    .unwrap_or_else(|| format!("sqlite://{}/items.db", data_dir)),
                timeout,
            },
            other => {
                if other != "memory" {
                    warn!("Unknown DISMISSIBLE_STORAGE '{}', falling back to memory", other);
                }
                let sweep_ms: u64 = parse_or(&lookup, "DISMISSIBLE_CACHE_SWEEP_MS", 0);
                StorageConfig::Memory {
                    max_items: parse_or(
                        &lookup,
                        "DISMISSIBLE_CACHE_MAX_ITEMS",
                        StorageConfig::DEFAULT_MAX_ITEMS,
                    ),
                    ttl: Duration::from_millis(parse_or(
                        &lookup,
                        "DISMISSIBLE_CACHE_TTL_MS",
                        StorageConfig::DEFAULT_TTL.as_millis() as u64,
                    )),
                    sweep_interval: (sweep_ms > 0).then(|| Duration::from_millis(sweep_ms)),
                }
            }
        };

        Self {
            host: lookup("DISMISSIBLE_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string()),
            http_port: parse_or(&lookup, "DISMISSIBLE_HTTP_PORT", Self::DEFAULT_HTTP_PORT),
            storage,
            event_buffer: parse_or(&lookup, "DISMISSIBLE_EVENT_BUFFER", Self::DEFAULT_EVENT_BUFFER),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

fn parse_or<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default", name, raw);
            default
        }),
        None => default,
    }
}
