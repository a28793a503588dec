//! `VantaDB` configuration.
//!
//! Two layers live here:
//!
//! 1. Typed creation options ([`DatabaseOptions`], [`IndexConfig`],
//!    [`StorageConfig`], [`QuantizerConfig`]) consumed by the coordinator.
//! 2. File/environment [`Settings`] loaded via figment
//!    (defaults < `vantadb.toml` < `VANTADB_*` environment variables).
//!
//! The forgiving string↔number↔bool coercion accepted by dynamic frontends
//! lives only at the JSON parse boundary ([`DatabaseOptions::from_json`]);
//! everything past it is strictly typed.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

/// Index selection and tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexConfig {
    /// HNSW approximate index.
    Hnsw {
        /// Target degree on upper layers (M).
        m: usize,
        /// Candidate list size during construction.
        ef_construction: usize,
        /// Candidate list size during search.
        ef_search: usize,
    },
    /// Exact brute-force index.
    Flat,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::Hnsw {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// In-memory record store.
    Memory,
    /// Disk-resident record store.
    Disk {
        /// Directory holding the storage files.
        data_dir: PathBuf,
        /// Payload read cache budget in megabytes.
        #[serde(default = "default_cache_size_mb")]
        cache_size_mb: usize,
    },
}

const fn default_cache_size_mb() -> usize {
    64
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Quantizer selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuantizerConfig {
    /// Per-dimension scalar quantization.
    Scalar {
        /// Bits per dimension, `1..=16`.
        bits: u8,
    },
    /// Product quantization with per-partition codebooks.
    Product {
        /// Number of subvectors; must divide the dimension.
        subvectors: usize,
    },
}

/// Creation options for a [`crate::Database`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Index selection and tuning.
    pub index: IndexConfig,
    /// Storage backend selection.
    pub storage: StorageConfig,
    /// Distance metric, immutable for the life of the index.
    pub metric: DistanceMetric,
    /// Explicit dimension; when absent the first insert sets it.
    pub dimensions: Option<usize>,
    /// Optional quantizer.
    pub quantizer: Option<QuantizerConfig>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            storage: StorageConfig::default(),
            metric: DistanceMetric::Cosine,
            dimensions: None,
            quantizer: None,
        }
    }
}

impl DatabaseOptions {
    /// Validates all option ranges.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for out-of-range parameters.
    pub fn validate(&self) -> Result<()> {
        if let IndexConfig::Hnsw {
            m,
            ef_construction,
            ef_search,
        } = self.index
        {
            if !(2..=256).contains(&m) {
                return Err(Error::Config(format!("m {m} is out of range [2, 256]")));
            }
            if ef_construction < m {
                return Err(Error::Config(format!(
                    "ef_construction {ef_construction} must be >= m {m}"
                )));
            }
            if ef_search == 0 {
                return Err(Error::Config("ef_search must be positive".to_string()));
            }
        }
        if let Some(dims) = self.dimensions {
            if dims == 0 {
                return Err(Error::Config("dimensions must be positive".to_string()));
            }
        }
        match self.quantizer {
            Some(QuantizerConfig::Scalar { bits }) => {
                if !(1..=16).contains(&bits) {
                    return Err(Error::Config(format!(
                        "bits {bits} is out of range [1, 16]"
                    )));
                }
            }
            Some(QuantizerConfig::Product { subvectors }) => {
                if subvectors == 0 {
                    return Err(Error::Config("subvectors must be positive".to_string()));
                }
                if let Some(dims) = self.dimensions {
                    if dims % subvectors != 0 {
                        return Err(Error::Config(format!(
                            "subvectors {subvectors} must divide dimensions {dims}"
                        )));
                    }
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Parses options from an untyped JSON object, applying forgiving
    /// string↔number↔bool coercion.
    ///
    /// Recognized keys: `index.type`, `index.m`, `index.ef_construction`,
    /// `index.ef_search`, `storage.type`, `storage.data_dir`,
    /// `storage.cache_size_mb`, `quantizer.type`, `quantizer.bits`,
    /// `quantizer.subvectors`, `metric`, `dimensions`.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for unknown index/storage/quantizer types or
    /// metrics, and for values that cannot be coerced.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Config("options must be a JSON object".to_string()))?;

        let mut options = Self::default();

        if let Some(metric) = obj.get("metric") {
            options.metric = DistanceMetric::from_name(&coerce_string(metric, "metric")?)?;
        }
        if let Some(dims) = obj.get("dimensions") {
            options.dimensions = Some(coerce_usize(dims, "dimensions")?);
        }

        if let Some(index) = obj.get("index") {
            let index = index
                .as_object()
                .ok_or_else(|| Error::Config("index must be a JSON object".to_string()))?;
            let kind = index
                .get("type")
                .map(|v| coerce_string(v, "index.type"))
                .transpose()?
                .unwrap_or_else(|| "hnsw".to_string());
            options.index = match kind.as_str() {
                "hnsw" => IndexConfig::Hnsw {
                    m: index
                        .get("m")
                        .map(|v| coerce_usize(v, "index.m"))
                        .transpose()?
                        .unwrap_or(16),
                    ef_construction: index
                        .get("ef_construction")
                        .map(|v| coerce_usize(v, "index.ef_construction"))
                        .transpose()?
                        .unwrap_or(200),
                    ef_search: index
                        .get("ef_search")
                        .map(|v| coerce_usize(v, "index.ef_search"))
                        .transpose()?
                        .unwrap_or(50),
                },
                "flat" => IndexConfig::Flat,
                other => return Err(Error::Config(format!("unknown index type '{other}'"))),
            };
        }

        if let Some(storage) = obj.get("storage") {
            let storage = storage
                .as_object()
                .ok_or_else(|| Error::Config("storage must be a JSON object".to_string()))?;
            let kind = storage
                .get("type")
                .map(|v| coerce_string(v, "storage.type"))
                .transpose()?
                .unwrap_or_else(|| "memory".to_string());
            options.storage = match kind.as_str() {
                "memory" => StorageConfig::Memory,
                "disk" => StorageConfig::Disk {
                    data_dir: storage
                        .get("data_dir")
                        .map(|v| coerce_string(v, "storage.data_dir"))
                        .transpose()?
                        .map(PathBuf::from)
                        .ok_or_else(|| {
                            Error::Config("disk storage requires data_dir".to_string())
                        })?,
                    cache_size_mb: storage
                        .get("cache_size_mb")
                        .map(|v| coerce_usize(v, "storage.cache_size_mb"))
                        .transpose()?
                        .unwrap_or_else(default_cache_size_mb),
                },
                other => return Err(Error::Config(format!("unknown storage type '{other}'"))),
            };
        }

        if let Some(quantizer) = obj.get("quantizer") {
            if !quantizer.is_null() {
                let quantizer = quantizer
                    .as_object()
                    .ok_or_else(|| Error::Config("quantizer must be a JSON object".to_string()))?;
                let kind = quantizer
                    .get("type")
                    .map(|v| coerce_string(v, "quantizer.type"))
                    .transpose()?
                    .ok_or_else(|| Error::Config("quantizer requires a type".to_string()))?;
                options.quantizer = Some(match kind.as_str() {
                    "scalar" => QuantizerConfig::Scalar {
                        bits: u8::try_from(
                            quantizer
                                .get("bits")
                                .map(|v| coerce_usize(v, "quantizer.bits"))
                                .transpose()?
                                .unwrap_or(8),
                        )
                        .map_err(|_| Error::Config("bits is out of range [1, 16]".to_string()))?,
                    },
                    "product" => QuantizerConfig::Product {
                        subvectors: quantizer
                            .get("subvectors")
                            .map(|v| coerce_usize(v, "quantizer.subvectors"))
                            .transpose()?
                            .unwrap_or(8),
                    },
                    other => {
                        return Err(Error::Config(format!("unknown quantizer type '{other}'")))
                    }
                });
            }
        }

        options.validate()?;
        Ok(options)
    }
}

fn coerce_string(value: &JsonValue, key: &str) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::Config(format!("'{key}' must be a string"))),
    }
}

fn coerce_usize(value: &JsonValue, key: &str) -> Result<usize> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| Error::Config(format!("'{key}' must be a non-negative integer"))),
        JsonValue::String(s) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::Config(format!("'{key}' must be a non-negative integer"))),
        JsonValue::Bool(b) => Ok(usize::from(*b)),
        _ => Err(Error::Config(format!("'{key}' must be a number"))),
    }
}

/// File- and environment-driven settings for embedders.
///
/// Priority (highest to lowest): `VANTADB_*` environment variables,
/// `vantadb.toml`, built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default database creation options.
    pub database: DatabaseOptions,
    /// Logging level: error, warn, info, debug, trace.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseOptions::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `vantadb.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from_path("vantadb.toml")
    }

    /// Loads settings from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("VANTADB_").split("_").lowercase(false));

        let settings: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.database.validate()?;
        Ok(settings)
    }

    /// Creates settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        let settings: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        settings.database.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_options_validate() {
        DatabaseOptions::default().validate().unwrap();
    }

    #[test]
    fn test_from_json_with_coercion() {
        let options = DatabaseOptions::from_json(&json!({
            "metric": "euclidean",
            "dimensions": "128",
            "index": {"type": "hnsw", "m": "32", "ef_construction": 400, "ef_search": "100"},
            "storage": {"type": "disk", "data_dir": "/tmp/vanta", "cache_size_mb": "16"},
        }))
        .unwrap();

        assert_eq!(options.metric, DistanceMetric::Euclidean);
        assert_eq!(options.dimensions, Some(128));
        assert_eq!(
            options.index,
            IndexConfig::Hnsw {
                m: 32,
                ef_construction: 400,
                ef_search: 100
            }
        );
        assert_eq!(
            options.storage,
            StorageConfig::Disk {
                data_dir: PathBuf::from("/tmp/vanta"),
                cache_size_mb: 16
            }
        );
    }

    #[test]
    fn test_from_json_rejects_unknown_types() {
        assert!(DatabaseOptions::from_json(&json!({"index": {"type": "ivf"}})).is_err());
        assert!(DatabaseOptions::from_json(&json!({"storage": {"type": "s3"}})).is_err());
        assert!(DatabaseOptions::from_json(&json!({"metric": "minkowski"})).is_err());
    }

    #[test]
    fn test_out_of_range_parameters_fail() {
        let mut options = DatabaseOptions {
            index: IndexConfig::Hnsw {
                m: 1,
                ef_construction: 200,
                ef_search: 50,
            },
            ..DatabaseOptions::default()
        };
        assert!(options.validate().is_err());

        options.index = IndexConfig::default();
        options.quantizer = Some(QuantizerConfig::Scalar { bits: 17 });
        assert!(options.validate().is_err());

        options.quantizer = Some(QuantizerConfig::Product { subvectors: 5 });
        options.dimensions = Some(12);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_settings_from_toml() {
        let settings = Settings::from_toml(
            r#"
            log_level = "debug"

            [database]
            metric = "dot_product"

            [database.index]
            type = "flat"
            "#,
        )
        .unwrap();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.database.metric, DistanceMetric::DotProduct);
        assert_eq!(settings.database.index, IndexConfig::Flat);
    }
}
