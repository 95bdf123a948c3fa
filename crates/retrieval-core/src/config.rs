use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SearchType;

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Merge `config.toml`, `config.<env>.toml` and `APP_*` variables.
    ///
    /// Nested keys use a double underscore: `APP_SEARCH__DEFAULT_K=5`.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            other => tracing::debug!(env = other, "no environment-specific config file"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_toml_str(toml: &str) -> Self { Self { figment: Figment::new().merge(Toml::string(toml)) } }

    /// Typed settings with `~` and `$VAR` expanded in every path and relative
    /// collection paths placed under `base_dir`.
    pub fn settings(&self) -> Result<Settings> {
        let raw: Settings = self.figment.extract()?;
        if raw.search.default_k == 0 {
            return Err(Error::InvalidConfig("search.default_k must be at least 1".to_string()));
        }
        Ok(raw.expanded())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordBackendKind {
    /// Case-insensitive occurrence counting.
    #[default]
    TermFrequency,
    /// BM25 ranking over a tantivy index.
    Bm25,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_k: usize,
    pub search_type: SearchType,
    pub keyword_backend: KeywordBackendKind,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_k: 10, search_type: SearchType::Hybrid, keyword_backend: KeywordBackendKind::TermFrequency }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the `<base_dir>/collections/<name>` path convention.
    pub base_dir: PathBuf,
    /// Collections whose directory does not follow the convention. Relative
    /// entries are taken from `base_dir`.
    pub collections: BTreeMap<String, PathBuf>,
    pub search: SearchSettings,
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data"),
            collections: BTreeMap::new(),
            search: SearchSettings::default(),
            log_level: None,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    #[must_use]
    pub fn with_collection(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.collections.insert(name.to_string(), path.into());
        self
    }

    /// Directory that holds the artifacts of collection `name`.
    pub fn collection_path(&self, name: &str) -> PathBuf {
        match self.collections.get(name) {
            Some(path) => path.clone(),
            None => self.collections_root().join(name),
        }
    }

    pub fn collections_root(&self) -> PathBuf { self.base_dir.join("collections") }

    fn expanded(mut self) -> Self {
        self.base_dir = expand_path(self.base_dir.to_string_lossy());
        for path in self.collections.values_mut() {
            *path = resolve_under(&self.base_dir, path.to_string_lossy());
        }
        self
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Expanded `path`, joined onto `base` unless it is already absolute.
pub fn resolve_under<S: AsRef<str>>(base: &Path, path: S) -> PathBuf {
    let path = expand_path(path);
    if path.is_absolute() { path } else { base.join(path) }
}
