use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::remote::{ParamValue, SortDirection};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  /// Custom title for header (defaults to the server host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub tree: TreeSettings,
  #[serde(default)]
  pub datasets: DatasetSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub url: String,
  /// Authentication type sent along with the credential string
  /// (e.g. "AuroraID" or "Crumbs")
  pub authtype: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeSettings {
  /// Branches kept fresh at once, root included
  #[serde(default = "default_tree_capacity")]
  pub capacity: usize,
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  /// Entity types left out of branch fetches (case-insensitive)
  #[serde(
    default = "default_exclude",
    deserialize_with = "deserialize_uppercase_list"
  )]
  pub exclude: Vec<String>,
  /// Extra scalar parameters passed on every tree call
  #[serde(default)]
  pub params: BTreeMap<String, ParamValue>,
}

impl Default for TreeSettings {
  fn default() -> Self {
    Self {
      capacity: default_tree_capacity(),
      ttl_secs: default_ttl_secs(),
      exclude: default_exclude(),
      params: BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSettings {
  /// Records held in the prefetch window
  #[serde(default = "default_window")]
  pub capacity: u64,
  /// Records shown per page in the browser
  #[serde(default = "default_page_size")]
  pub page_size: u64,
  #[serde(default)]
  pub order: SortDirection,
  #[serde(default = "default_sortby")]
  pub sortby: String,
  #[serde(default)]
  pub sorttype: i64,
}

impl Default for DatasetSettings {
  fn default() -> Self {
    Self {
      capacity: default_window(),
      page_size: default_page_size(),
      order: SortDirection::default(),
      sortby: default_sortby(),
      sorttype: 0,
    }
  }
}

fn default_tree_capacity() -> usize {
  crate::cache::DEFAULT_TREE_CAPACITY
}

fn default_ttl_secs() -> u64 {
  crate::cache::DEFAULT_TTL.as_secs()
}

fn default_exclude() -> Vec<String> {
  vec!["USER".to_string(), "DATASET".to_string()]
}

fn default_window() -> u64 {
  crate::cache::DEFAULT_WINDOW
}

fn default_page_size() -> u64 {
  20
}

fn default_sortby() -> String {
  crate::cache::DEFAULT_SORT_BY.to_string()
}

fn deserialize_uppercase_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_uppercase()).collect())
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./aurora-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/aurora-cache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/aurora-cache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("aurora-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("aurora-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the credential string from the environment.
  ///
  /// Reads AURORA_AUTHSTR; an empty value counts as unset.
  pub fn get_authstr() -> Option<String> {
    std::env::var("AURORA_AUTHSTR")
      .ok()
      .filter(|s| !s.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("server:\n  url: aurora.example.org\n").unwrap();

    assert_eq!(config.server.url, "aurora.example.org");
    assert!(config.server.authtype.is_none());
    assert_eq!(config.tree.capacity, crate::cache::DEFAULT_TREE_CAPACITY);
    assert_eq!(config.tree.ttl_secs, 3600);
    assert_eq!(config.tree.exclude, vec!["USER", "DATASET"]);
    assert_eq!(config.datasets.capacity, 11000);
    assert_eq!(config.datasets.order, SortDirection::Desc);
    assert_eq!(config.datasets.sortby, "system.dataset.time.expire");
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
server:
  url: https://aurora.example.org
  authtype: AuroraID
title: Lab data
tree:
  capacity: 6
  ttl_secs: 120
  exclude: [user, Task]
  params:
    perm: DATASET_READ
    limit: 5
datasets:
  capacity: 500
  page_size: 25
  order: asc
  sortby: system.dataset.time.created
  sorttype: 1
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.server.authtype.as_deref(), Some("AuroraID"));
    assert_eq!(config.title.as_deref(), Some("Lab data"));
    assert_eq!(config.tree.capacity, 6);
    assert_eq!(config.tree.exclude, vec!["USER", "TASK"]);
    assert_eq!(
      config.tree.params.get("perm"),
      Some(&ParamValue::Text("DATASET_READ".into()))
    );
    assert_eq!(config.tree.params.get("limit"), Some(&ParamValue::Int(5)));
    assert_eq!(config.datasets.order, SortDirection::Asc);
    assert_eq!(config.datasets.page_size, 25);
    assert_eq!(config.datasets.sorttype, 1);
  }

  #[test]
  fn test_missing_server_is_an_error() {
    assert!(Config::parse("title: nothing\n").is_err());
  }
}
