use std::{fs, path::Path};

use serde::Deserialize;

use crate::{
  error::{HeapError, HeapResult},
  map::DEFAULT_MAP_HINT,
};

/// How freed ranges are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  /// Legacy behaviour: a free lowers the watermark by the block size and the
  /// range is not tracked. Later allocations may overlap blocks that are
  /// still live.
  #[default]
  Bump,
  /// Freed ranges go to an address-ordered, coalescing free list and are
  /// reused first-fit. The watermark only drops when the topmost range is
  /// freed.
  FreeList,
}

/// Options for opening a [`PersistentHeap`](crate::PersistentHeap).
///
/// ```toml
/// strategy = "free-list"
/// map_hint = 0
/// sync_on_free = false
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapConfig {
  pub strategy: Strategy,
  /// Preferred mapping address, `0` lets the kernel choose.
  pub map_hint: usize,
  pub sync_on_free: bool,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      strategy: Strategy::Bump,
      map_hint: DEFAULT_MAP_HINT,
      sync_on_free: true,
    }
  }
}

impl HeapConfig {
  pub fn from_toml_str(source: &str) -> HeapResult<Self> {
    toml::from_str(source).map_err(|err| HeapError::InvalidConfig(err.to_string()))
  }

  pub fn load(path: impl AsRef<Path>) -> HeapResult<Self> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)
      .map_err(|err| HeapError::InvalidConfig(format!("{}: {err}", path.display())))?;
    Self::from_toml_str(&source)
  }

  pub fn with_strategy(
    mut self,
    strategy: Strategy,
  ) -> Self {
    self.strategy = strategy;
    self
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn test_defaults() {
    let config = HeapConfig::from_toml_str("").unwrap();
    assert_eq!(config, HeapConfig::default());
    assert_eq!(config.strategy, Strategy::Bump);
    assert_eq!(config.map_hint, 0x6000_0000_0000);
    assert!(config.sync_on_free);
  }

  #[test]
  fn test_parse() {
    let config = HeapConfig::from_toml_str(
      r#"
        strategy = "free-list"
        map_hint = 0
        sync_on_free = false
      "#,
    )
    .unwrap();

    assert_eq!(config.strategy, Strategy::FreeList);
    assert_eq!(config.map_hint, 0);
    assert!(!config.sync_on_free);
  }

  #[test]
  fn test_rejects_unknown() {
    assert!(matches!(
      HeapConfig::from_toml_str("strategy = \"slab\""),
      Err(HeapError::InvalidConfig(_))
    ));
    assert!(matches!(
      HeapConfig::from_toml_str("grow = true"),
      Err(HeapError::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sync_on_free = false").unwrap();

    let config = HeapConfig::load(file.path()).unwrap();
    assert!(!config.sync_on_free);
    assert_eq!(config.strategy, Strategy::Bump);

    assert!(HeapConfig::load("/nonexistent/heap.toml").is_err());
  }
}
