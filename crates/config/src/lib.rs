//! # Config - Run Configuration
//!
//! Everything a load needs besides the input files, resolved once at startup
//! from defaults plus environment overrides:
//!
//! | Variable                | Meaning                           | Default                 |
//! |-------------------------|-----------------------------------|-------------------------|
//! | `BULKLOAD_OUTPUT_DIR`   | base output directory             | `./data<yyyyMMddHHmm>`  |
//! | `BULKLOAD_HASH`         | partitioner (`murmur3`, `fnv1a`)  | `murmur3`               |
//! | `BULKLOAD_SEGMENT_ROWS` | max rows per segment              | `100000`                |
//! | `BULKLOAD_SEGMENT_KB`   | max approximate KiB per segment   | `65536`                 |
//! | `BULKLOAD_JOBS`         | files processed in parallel       | `1`                     |
//!
//! An unparseable or zero value is a [`ConfigError`].

use builder::Thresholds;
use chrono::{DateTime, Utc};
use partitioner::HashAlgorithm;
use schema::{ColumnType, Schema, SchemaError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const ENV_OUTPUT_DIR: &str = "BULKLOAD_OUTPUT_DIR";
pub const ENV_HASH: &str = "BULKLOAD_HASH";
pub const ENV_SEGMENT_ROWS: &str = "BULKLOAD_SEGMENT_ROWS";
pub const ENV_SEGMENT_KB: &str = "BULKLOAD_SEGMENT_KB";
pub const ENV_JOBS: &str = "BULKLOAD_JOBS";

pub const DEFAULT_SEGMENT_ROWS: usize = 100_000;
pub const DEFAULT_SEGMENT_KB: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Base directory; tables land in `<output_dir>/<keyspace>/<table>/`.
    pub output_dir: PathBuf,
    pub schema: Arc<Schema>,
    pub hash_algorithm: HashAlgorithm,
    pub thresholds: Thresholds,
    /// Number of input files processed concurrently.
    pub jobs: usize,
}

impl LoaderConfig {
    /// Reads the `BULKLOAD_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), Utc::now())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source
    /// and clock.
    pub fn from_lookup<F>(lookup: F, now: DateTime<Utc>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or = |key: &str, default: String| lookup(key).unwrap_or(default);

        let output_dir = PathBuf::from(env_or(
            ENV_OUTPUT_DIR,
            default_output_dir(now).to_string_lossy().into_owned(),
        ));

        let hash = env_or(ENV_HASH, HashAlgorithm::default().name().to_string());
        let hash_algorithm = hash.parse::<HashAlgorithm>().map_err(|e| {
            ConfigError::Invalid {
                key: ENV_HASH,
                value: hash.clone(),
                reason: e.to_string(),
            }
        })?;

        let max_rows = positive(
            ENV_SEGMENT_ROWS,
            env_or(ENV_SEGMENT_ROWS, DEFAULT_SEGMENT_ROWS.to_string()),
        )?;
        let segment_kb = positive(
            ENV_SEGMENT_KB,
            env_or(ENV_SEGMENT_KB, DEFAULT_SEGMENT_KB.to_string()),
        )?;
        let jobs = positive(ENV_JOBS, env_or(ENV_JOBS, "1".to_string()))?;

        let max_bytes = segment_kb.checked_mul(1024).ok_or_else(|| ConfigError::Invalid {
            key: ENV_SEGMENT_KB,
            value: segment_kb.to_string(),
            reason: "too large".into(),
        })?;

        Ok(Self {
            output_dir,
            schema: Arc::new(wiki_views_schema()?),
            hash_algorithm,
            thresholds: Thresholds {
                max_rows,
                max_bytes,
            },
            jobs,
        })
    }
}

/// `./data<yyyyMMddHHmm>` for the given start time.
pub fn default_output_dir(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!("./data{}", now.format("%Y%m%d%H%M")))
}

/// Table fed by hourly page-view dumps: one row per (hour, wiki, title).
pub fn wiki_views_schema() -> Result<Schema, SchemaError> {
    Schema::builder("wiki", "views")
        .column("datetime", ColumnType::Timestamp)
        .column("wiki", ColumnType::Text)
        .column("title", ColumnType::Text)
        .column("views", ColumnType::Int)
        .partition_key(["datetime", "wiki", "title"])
        .build()
}

fn positive(key: &'static str, value: String) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            key,
            value,
            reason: "must be at least 1".into(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}
