use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::hash::HashEngine;

pub const DEFAULT_ALGORITHM: &str = "sha256";
pub const DEFAULT_ENCODING: &str = "utf_8";
pub const DEFAULT_THRESHOLD: usize = 128;
pub const DEFAULT_CAPACITY: usize = 1024 * 1024 * 1024;

/// Settings fixed when a tree is created.
///
/// `disable_cache` keeps the live subroots but retains nothing else; `disable_optimizations` recomputes every
/// subtree from the stored leaves and is the baseline the cached paths are checked against.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeConfig {
  pub provider: Option<String>,
  pub algorithm: String,
  pub encoding: String,
  pub security: bool,
  pub raw_bytes: bool,
  pub threshold: usize,
  pub capacity: usize,
  pub disable_cache: bool,
  pub disable_optimizations: bool,
}

impl Default for TreeConfig {
  fn default() -> Self {
    TreeConfig {
      provider: None,
      algorithm: DEFAULT_ALGORITHM.to_string(),
      encoding: DEFAULT_ENCODING.to_string(),
      security: true,
      raw_bytes: true,
      threshold: DEFAULT_THRESHOLD,
      capacity: DEFAULT_CAPACITY,
      disable_cache: false,
      disable_optimizations: false,
    }
  }
}

macro_rules! property_decl {
  ($name:ident, $type:ty) => {
    pub fn $name(mut self, $name: $type) -> Self {
      self.$name = $name;
      self
    }
  };
}

impl TreeConfig {
  property_decl!(security, bool);
  property_decl!(raw_bytes, bool);
  property_decl!(threshold, usize);
  property_decl!(capacity, usize);
  property_decl!(disable_cache, bool);
  property_decl!(disable_optimizations, bool);

  pub fn provider(mut self, provider: &str) -> Self {
    self.provider = Some(provider.to_string());
    self
  }

  pub fn algorithm(mut self, algorithm: &str) -> Self {
    self.algorithm = algorithm.to_string();
    self
  }

  pub fn encoding(mut self, encoding: &str) -> Self {
    self.encoding = encoding.to_string();
    self
  }

  pub fn from_json(text: &str) -> Result<Self> {
    Ok(serde_json::from_str(text)?)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    Self::from_json(&std::fs::read_to_string(path)?)
  }

  /// Resolves the hashing policy; unknown algorithm or encoding names fail here rather than on first use.
  pub fn engine(&self) -> Result<HashEngine> {
    HashEngine::from_names(&self.algorithm, &self.encoding, self.security, self.raw_bytes)
  }
}
