//! CLI context store: named server addresses + tokens persisted
//! at `~/.config/flotilla/config.toml`.

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
  #[serde(default)]
  pub current_context: String,
  #[serde(default)]
  pub contexts: BTreeMap<String, ContextEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextEntry {
  pub address: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub access_token: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub refresh_token: String,
}

pub fn config_path() -> anyhow::Result<PathBuf> {
  let home = std::env::var_os("HOME")
    .ok_or_else(|| anyhow!("HOME is not set"))?;
  Ok(
    PathBuf::from(home)
      .join(".config")
      .join("flotilla")
      .join("config.toml"),
  )
}

pub fn load() -> anyhow::Result<CliConfig> {
  let path = config_path()?;
  if !path.exists() {
    return Ok(CliConfig::default());
  }
  let contents = std::fs::read_to_string(&path).with_context(
    || format!("failed to read {}", path.display()),
  )?;
  toml::from_str(&contents).with_context(|| {
    format!("failed to parse {}", path.display())
  })
}

pub fn save(config: &CliConfig) -> anyhow::Result<()> {
  let path = config_path()?;
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).with_context(|| {
      format!("failed to create {}", parent.display())
    })?;
  }
  let contents = toml::to_string_pretty(config)
    .context("failed to encode CLI config")?;
  std::fs::write(&path, contents).with_context(|| {
    format!("failed to write {}", path.display())
  })?;
  Ok(())
}

impl CliConfig {
  /// The selected context, `--context` override first.
  pub fn entry(
    &self,
    name_override: Option<&str>,
  ) -> anyhow::Result<(String, ContextEntry)> {
    let name = match name_override {
      Some(name) => name.to_string(),
      None if !self.current_context.is_empty() => {
        self.current_context.clone()
      }
      None => {
        return Err(anyhow!(
          "no context configured, run 'flo config add-context <name> --address <url>' first"
        ));
      }
    };
    let entry = self.contexts.get(&name).ok_or_else(|| {
      anyhow!("no context named '{name}' in the CLI config")
    })?;
    Ok((name, entry.clone()))
  }

  pub fn store_tokens(
    &mut self,
    name: &str,
    access_token: String,
    refresh_token: String,
  ) {
    if let Some(entry) = self.contexts.get_mut(name) {
      entry.access_token = access_token;
      entry.refresh_token = refresh_token;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_through_toml() {
    let mut config = CliConfig {
      current_context: String::from("dev"),
      ..Default::default()
    };
    config.contexts.insert(
      String::from("dev"),
      ContextEntry {
        address: String::from("http://localhost:9120"),
        access_token: String::from("a"),
        refresh_token: String::from("r"),
      },
    );
    let encoded = toml::to_string_pretty(&config).unwrap();
    let decoded: CliConfig = toml::from_str(&encoded).unwrap();
    assert_eq!(decoded.current_context, "dev");
    assert_eq!(
      decoded.contexts["dev"].address,
      "http://localhost:9120"
    );
  }

  #[test]
  fn entry_prefers_the_override() {
    let mut config = CliConfig {
      current_context: String::from("dev"),
      ..Default::default()
    };
    config.contexts.insert(
      String::from("dev"),
      ContextEntry::default(),
    );
    config.contexts.insert(
      String::from("prod"),
      ContextEntry {
        address: String::from("https://flotilla.example"),
        ..Default::default()
      },
    );
    let (name, entry) = config.entry(Some("prod")).unwrap();
    assert_eq!(name, "prod");
    assert_eq!(entry.address, "https://flotilla.example");
    assert!(config.entry(Some("missing")).is_err());
  }
}
