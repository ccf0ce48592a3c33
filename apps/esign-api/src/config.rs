//! Runtime configuration, read from the environment (and `.env`)

use anyhow::{Context, Result};
use esign_core::StampOptions;
use std::path::PathBuf;

/// 16 MiB, the largest accepted upload after base64 decoding
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Root for uploaded documents, signed output and signature assets
    pub storage_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub stamp: StampOptions,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("esign-api");

        let port = env_parse("PORT")?.unwrap_or(3001);
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            std::fs::create_dir_all(&data_dir).ok();
            format!("sqlite:{}/esign.db?mode=rwc", data_dir.display())
        });
        let storage_dir = std::env::var("ESIGN_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploads"));
        let max_upload_bytes =
            env_parse("ESIGN_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let defaults = StampOptions::default();
        let stamp = StampOptions {
            default_box_width: env_parse("ESIGN_DEFAULT_BOX_WIDTH")?
                .unwrap_or(defaults.default_box_width),
            default_box_height: env_parse("ESIGN_DEFAULT_BOX_HEIGHT")?
                .unwrap_or(defaults.default_box_height),
            ..defaults
        };

        Ok(Self {
            port,
            database_url,
            storage_dir,
            max_upload_bytes,
            stamp,
        })
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.storage_dir.join("documents")
    }

    pub fn signatures_dir(&self) -> PathBuf {
        self.storage_dir.join("signatures")
    }

    /// Request body limit: base64 inflates uploads by a third, plus JSON overhead
    pub fn max_request_bytes(&self) -> usize {
        self.max_upload_bytes / 3 * 4 + 64 * 1024
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
