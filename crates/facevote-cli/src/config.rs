use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, ensure, Context, Result};
use facevote_core::classifier::DEFAULT_MAX_NEIGHBORS;
use facevote_core::detector::DEFAULT_DARK_THRESHOLD;
use facevote_core::types::DEFAULT_CHOICES;
use facevote_core::Choice;
use serde::Deserialize;

/// Name of the optional config file inside the data directory.
pub const CONFIG_FILE: &str = "facevote.toml";
/// SQLite identity database inside the data directory.
pub const SQLITE_FILE: &str = "faces.db";

/// Where registrations are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("unknown store backend {other:?} (expected json or sqlite)"),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        })
    }
}

/// Station configuration: defaults, then `facevote.toml`, then `FACEVOTE_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the identity store, ledger and receipts.
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    /// Ballot options offered to voters, in display order.
    pub choices: Vec<Choice>,
    /// Upper bound on the classifier's neighbor count.
    pub max_neighbors: usize,
    /// Fraction of near-black pixels above which a capture holds no face.
    pub dark_threshold: f32,
    /// Config file that was applied, if any.
    pub config_file: Option<PathBuf>,
}

/// Keys accepted in `facevote.toml`. All optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    store_backend: Option<StoreBackend>,
    choices: Option<Vec<String>>,
    max_neighbors: Option<usize>,
    dark_threshold: Option<f32>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default_dir = env("FACEVOTE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&env));

        let (file, config_file) = match env("FACEVOTE_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                (read_file(&path)?, Some(path))
            }
            None => {
                let path = default_dir.join(CONFIG_FILE);
                if path.exists() {
                    (read_file(&path)?, Some(path))
                } else {
                    (FileConfig::default(), None)
                }
            }
        };

        let data_dir = env("FACEVOTE_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or(default_dir);

        let store_backend = match env("FACEVOTE_STORE_BACKEND") {
            Some(v) => v.parse()?,
            None => file.store_backend.unwrap_or_default(),
        };

        let choices: Vec<Choice> = match env("FACEVOTE_CHOICES") {
            Some(v) => parse_choices(&v),
            None => match file.choices {
                Some(list) => list
                    .iter()
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .map(Choice::new)
                    .collect(),
                None => DEFAULT_CHOICES.iter().map(|c| Choice::new(*c)).collect(),
            },
        };

        let max_neighbors = env_parse(
            &env,
            "FACEVOTE_MAX_NEIGHBORS",
            file.max_neighbors.unwrap_or(DEFAULT_MAX_NEIGHBORS),
        );
        let dark_threshold = env_parse(
            &env,
            "FACEVOTE_DARK_THRESHOLD",
            file.dark_threshold.unwrap_or(DEFAULT_DARK_THRESHOLD),
        );

        ensure!(!choices.is_empty(), "at least one ballot choice is required");
        ensure!(max_neighbors > 0, "max_neighbors must be at least 1");
        ensure!(
            dark_threshold > 0.0 && dark_threshold <= 1.0,
            "dark_threshold must be in (0, 1], got {dark_threshold}"
        );

        Ok(Self {
            data_dir,
            store_backend,
            choices,
            max_neighbors,
            dark_threshold,
            config_file,
        })
    }

    /// Path to the SQLite identity database.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join(SQLITE_FILE)
    }

    /// Resolve voter input to one of the configured choices: either its
    /// 1-based position in the list or its name (case-insensitive).
    pub fn resolve_choice(&self, input: &str) -> Option<Choice> {
        let input = input.trim();
        if let Ok(n) = input.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| self.choices.get(i)).cloned();
        }
        self.choices
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(input))
            .cloned()
    }
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facevote")
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

fn parse_choices(raw: &str) -> Vec<Choice> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(Choice::new)
        .collect()
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match env(key) {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparseable setting");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("HOME", "/home/station")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/home/station/.local/share/facevote"));
        assert_eq!(config.store_backend, StoreBackend::Json);
        assert_eq!(
            config.choices.iter().map(Choice::as_str).collect::<Vec<_>>(),
            ["BJP", "CONGRESS", "APB", "NOTA"]
        );
        assert_eq!(config.max_neighbors, 5);
        assert!((config.dark_threshold - 0.95).abs() < f32::EPSILON);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_xdg_data_home() {
        let config = Config::from_lookup(lookup(&[("XDG_DATA_HOME", "/srv/data")])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/data/facevote"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FACEVOTE_DATA_DIR", "/var/lib/facevote"),
            ("FACEVOTE_STORE_BACKEND", "SQLite"),
            ("FACEVOTE_CHOICES", "Red, Blue ,,NOTA"),
            ("FACEVOTE_MAX_NEIGHBORS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.sqlite_path(), PathBuf::from("/var/lib/facevote/faces.db"));
        assert_eq!(config.choices.len(), 3);
        assert_eq!(config.choices[1].as_str(), "Blue");
        assert_eq!(config.max_neighbors, 3);
    }

    #[test]
    fn test_unparseable_number_falls_back() {
        let config =
            Config::from_lookup(lookup(&[("HOME", "/h"), ("FACEVOTE_MAX_NEIGHBORS", "many")]))
                .unwrap();
        assert_eq!(config.max_neighbors, DEFAULT_MAX_NEIGHBORS);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = Config::from_lookup(lookup(&[("HOME", "/h"), ("FACEVOTE_STORE_BACKEND", "pickle")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_file_overlay_below_env() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "store_backend = \"sqlite\"\nchoices = [\"A\", \"B\"]\nmax_neighbors = 2\n",
        )
        .unwrap();
        let data_dir = dir.path().display().to_string();

        let config = Config::from_lookup(lookup(&[
            ("FACEVOTE_DATA_DIR", data_dir.as_str()),
            ("FACEVOTE_MAX_NEIGHBORS", "4"),
        ]))
        .unwrap();
        assert_eq!(config.config_file, Some(dir.path().join(CONFIG_FILE)));
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.choices, vec![Choice::new("A"), Choice::new("B")]);
        assert_eq!(config.max_neighbors, 4);
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml").display().to_string();
        assert!(Config::from_lookup(lookup(&[("FACEVOTE_CONFIG", missing.as_str())])).is_err());
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("station.toml");
        std::fs::write(&path, "threshold = 0.4\n").unwrap();
        let path = path.display().to_string();
        assert!(Config::from_lookup(lookup(&[("FACEVOTE_CONFIG", path.as_str())])).is_err());
    }

    #[test]
    fn test_empty_choice_list_rejected() {
        assert!(Config::from_lookup(lookup(&[("HOME", "/h"), ("FACEVOTE_CHOICES", " , ")])).is_err());
    }

    #[test]
    fn test_resolve_choice() {
        let config = Config::from_lookup(lookup(&[("HOME", "/h")])).unwrap();
        assert_eq!(config.resolve_choice("2"), Some(Choice::new("CONGRESS")));
        assert_eq!(config.resolve_choice(" nota "), Some(Choice::new("NOTA")));
        assert_eq!(config.resolve_choice("0"), None);
        assert_eq!(config.resolve_choice("9"), None);
        assert_eq!(config.resolve_choice("Greens"), None);
    }
}
