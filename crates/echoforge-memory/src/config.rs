//! Memory Configuration
//!
//! Declares the provider set, semantic search defaults and consolidation
//! policy. Configurations are plain serde structs with sensible defaults and
//! can be loaded from TOML.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::providers::TypeOwnership;
use crate::types::SUMMARY_TYPE;

/// Memory subsystem configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Providers in routing order
    pub providers: Vec<ProviderSpec>,

    /// Semantic search defaults
    pub semantic: SemanticConfig,

    /// Consolidation policy
    pub consolidation: ConsolidationOptions,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderSpec::Volatile {
                    name: "volatile".into(),
                    types: TypeOwnership::only(["short-term", "working"]),
                },
                ProviderSpec::Durable {
                    name: "durable".into(),
                    path: PathBuf::from("memory.db"),
                    types: TypeOwnership::only(["long-term", SUMMARY_TYPE]),
                },
                ProviderSpec::Semantic {
                    name: "semantic".into(),
                    types: TypeOwnership::only(["semantic"]),
                    similarity_threshold: None,
                },
            ],
            semantic: SemanticConfig::default(),
            consolidation: ConsolidationOptions::default(),
        }
    }
}

/// Storage backend declaration, chosen at construction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSpec {
    /// In-process, non-persistent
    Volatile {
        name: String,
        #[serde(default)]
        types: TypeOwnership,
    },

    /// SQLite file
    Durable {
        name: String,
        path: PathBuf,
        #[serde(default)]
        types: TypeOwnership,
    },

    /// Embedding index
    Semantic {
        name: String,
        #[serde(default)]
        types: TypeOwnership,
        /// Falls back to `[semantic] similarity_threshold` when unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        similarity_threshold: Option<f64>,
    },
}

impl ProviderSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Volatile { name, .. } | Self::Durable { name, .. } | Self::Semantic { name, .. } => name,
        }
    }

    pub fn types(&self) -> &TypeOwnership {
        match self {
            Self::Volatile { types, .. } | Self::Durable { types, .. } | Self::Semantic { types, .. } => {
                types
            }
        }
    }

    /// Whether this backend needs an embedding capability
    pub fn requires_embedder(&self) -> bool {
        matches!(self, Self::Semantic { .. })
    }

    /// Effective search threshold of a semantic backend
    pub fn similarity_threshold(&self, semantic: &SemanticConfig) -> Option<f64> {
        match self {
            Self::Semantic {
                similarity_threshold, ..
            } => Some(similarity_threshold.unwrap_or(semantic.similarity_threshold)),
            _ => None,
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}

/// Semantic search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Minimum cosine similarity for a semantic match (default: 0.7)
    pub similarity_threshold: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Consolidation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationOptions {
    /// Minimum members for a cluster to qualify (default: 2)
    pub min_cluster_size: usize,

    /// Join and coherence threshold for similarity clustering (default: 0.7)
    pub similarity_threshold: f64,

    /// Clusters whose entries are all older than this many milliseconds are
    /// skipped (default: no limit)
    pub max_memory_age: Option<i64>,

    /// Allow clusters containing private entries (default: true)
    pub include_private: bool,

    /// Maximum members rendered into one summarization prompt (default: 20)
    pub max_entries_in_prompt: usize,

    /// Type of produced summaries (default: "summary")
    pub consolidated_memory_type: String,

    /// Keep source entries after a successful consolidation (default: true)
    pub retain_sources: bool,

    /// Feed existing summaries back into clustering (default: false)
    pub include_consolidated: bool,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            similarity_threshold: default_similarity_threshold(),
            max_memory_age: None,
            include_private: true,
            max_entries_in_prompt: 20,
            consolidated_memory_type: SUMMARY_TYPE.to_string(),
            retain_sources: true,
            include_consolidated: false,
        }
    }
}

impl ConsolidationOptions {
    pub fn with_min_cluster_size(mut self, min_cluster_size: usize) -> Self {
        self.min_cluster_size = min_cluster_size;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_max_memory_age(mut self, max_age_ms: i64) -> Self {
        self.max_memory_age = Some(max_age_ms);
        self
    }

    pub fn with_include_private(mut self, include_private: bool) -> Self {
        self.include_private = include_private;
        self
    }

    pub fn with_max_entries_in_prompt(mut self, max_entries: usize) -> Self {
        self.max_entries_in_prompt = max_entries;
        self
    }

    pub fn with_consolidated_memory_type(mut self, entry_type: impl Into<String>) -> Self {
        self.consolidated_memory_type = entry_type.into();
        self
    }

    pub fn with_retain_sources(mut self, retain_sources: bool) -> Self {
        self.retain_sources = retain_sources;
        self
    }

    pub fn with_include_consolidated(mut self, include_consolidated: bool) -> Self {
        self.include_consolidated = include_consolidated;
        self
    }

    /// Validate the consolidation policy
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.min_cluster_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "consolidation.min_cluster_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        check_threshold("consolidation.similarity_threshold", self.similarity_threshold)?;

        if let Some(age) = self.max_memory_age {
            if age <= 0 {
                return Err(ConfigValidationError::InvalidValue {
                    field: "consolidation.max_memory_age".into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        if self.max_entries_in_prompt == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "consolidation.max_entries_in_prompt".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.consolidated_memory_type.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "consolidation.consolidated_memory_type".into(),
                message: "cannot be empty".into(),
            });
        }

        Ok(())
    }
}

fn check_threshold(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigValidationError::InvalidValue {
            field: field.into(),
            message: format!("must be between 0 and 1, got {}", value),
        });
    }
    Ok(())
}

impl MemoryConfig {
    /// Create a config with the given providers and default policies
    pub fn new(providers: Vec<ProviderSpec>) -> Self {
        Self {
            providers,
            ..Default::default()
        }
    }

    /// Append a provider
    pub fn with_provider(mut self, provider: ProviderSpec) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set semantic search configuration
    pub fn with_semantic(mut self, semantic: SemanticConfig) -> Self {
        self.semantic = semantic;
        self
    }

    /// Set consolidation policy
    pub fn with_consolidation(mut self, consolidation: ConsolidationOptions) -> Self {
        self.consolidation = consolidation;
        self
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigValidationError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigValidationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigValidationError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| ConfigValidationError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(path = %path.display(), "Loading memory configuration");
        Self::from_toml_str(&input)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.providers.is_empty() {
            return Err(ConfigValidationError::NoProviders);
        }

        let mut names = HashSet::new();
        for (index, provider) in self.providers.iter().enumerate() {
            if provider.name().trim().is_empty() {
                return Err(ConfigValidationError::InvalidValue {
                    field: format!("providers[{}].name", index),
                    message: "cannot be empty".into(),
                });
            }

            if !names.insert(provider.name()) {
                return Err(ConfigValidationError::DuplicateProvider(provider.name().to_string()));
            }

            if let Some(types) = provider.types().types() {
                if types.is_empty() || types.iter().any(|t| t.trim().is_empty()) {
                    return Err(ConfigValidationError::InvalidValue {
                        field: format!("providers[{}].types", index),
                        message: "must list at least one non-empty type".into(),
                    });
                }
            }

            match provider {
                ProviderSpec::Durable { path, .. } if path.as_os_str().is_empty() => {
                    return Err(ConfigValidationError::InvalidValue {
                        field: format!("providers[{}].path", index),
                        message: "cannot be empty".into(),
                    });
                }
                ProviderSpec::Semantic {
                    similarity_threshold: Some(threshold),
                    ..
                } => {
                    check_threshold(&format!("providers[{}].similarity_threshold", index), *threshold)?;
                }
                _ => {}
            }
        }

        check_threshold("semantic.similarity_threshold", self.semantic.similarity_threshold)?;
        self.consolidation.validate()
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("at least one provider is required")]
    NoProviders,

    #[error("duplicate provider name: {0}")]
    DuplicateProvider(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
