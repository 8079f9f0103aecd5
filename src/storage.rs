use crate::error::{Error, Result};
use crate::hash::Digest;

pub mod file;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;

pub use file::FileStorage;
#[cfg(feature = "rocksdb")]
pub use self::rocksdb::RocksDBStorage;

/// Persistence of the append-only leaf hash sequence.
///
/// Implementations only need to keep leaf hashes; every internal node can be recomputed from them.
pub trait Storage: Send + Sync {
  /// Number of stored leaves.
  fn get_size(&self) -> Result<u64>;

  /// Leaf hash at the 0-based `index`.
  fn get_leaf(&self, index: u64) -> Result<Digest>;

  /// Appends a leaf hash and returns its index.
  fn store_leaf(&mut self, hash: &Digest) -> Result<u64>;

  /// Flushes pending writes to the underlying medium.
  fn sync(&mut self) -> Result<()> {
    Ok(())
  }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
  leaves: Vec<Digest>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Storage for MemoryStorage {
  fn get_size(&self) -> Result<u64> {
    Ok(self.leaves.len() as u64)
  }

  fn get_leaf(&self, index: u64) -> Result<Digest> {
    let size = self.leaves.len() as u64;
    usize::try_from(index)
      .ok()
      .and_then(|i| self.leaves.get(i))
      .cloned()
      .ok_or(Error::IndexOutOfRange { index, size })
  }

  fn store_leaf(&mut self, hash: &Digest) -> Result<u64> {
    self.leaves.push(hash.clone());
    Ok(self.leaves.len() as u64 - 1)
  }
}
