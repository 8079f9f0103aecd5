use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use uuid::Uuid;

use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::hash::{Digest, HashEngine, Record};
use crate::hashtree::cache::{CacheStats, SubrootCache};
use crate::hashtree::{HashTree, Span, decompose};
use crate::proof::MerkleProof;
#[cfg(feature = "rocksdb")]
use crate::storage::RocksDBStorage;
use crate::storage::{FileStorage, MemoryStorage, Storage};


/// Append-only Merkle tree over the leaf hashes kept in `S`.
///
/// Appends are serialized by the write lock on the storage; readers share the read lock and only touch the
/// subroot cache under a short-lived mutex, so proofs and roots are always computed over a fully merged tree.
pub struct MerkleTree<S: Storage> {
  engine: HashEngine,
  config: TreeConfig,
  provider: String,
  pub(crate) storage: RwLock<S>,
  cache: Mutex<SubrootCache>,
  size: AtomicU64,
}

impl MerkleTree<MemoryStorage> {
  pub fn on_memory(config: TreeConfig) -> Result<Self> {
    Self::new(MemoryStorage::new(), config)
  }
}

impl MerkleTree<FileStorage> {
  pub fn on_file<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
    let engine = config.engine()?;
    Self::new(FileStorage::open(path, engine.algorithm())?, config)
  }
}

#[cfg(feature = "rocksdb")]
impl MerkleTree<RocksDBStorage> {
  pub fn on_rocksdb<P: AsRef<Path>>(dir: P, config: TreeConfig) -> Result<Self> {
    let engine = config.engine()?;
    Self::new(RocksDBStorage::open(dir, engine.algorithm())?, config)
  }
}

impl<S: Storage> MerkleTree<S> {
  /// Builds a tree over `storage`, restoring the live subroots of any leaves it already holds.
  pub fn new(storage: S, config: TreeConfig) -> Result<Self> {
    let engine = config.engine()?;
    let provider = config.provider.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let size = storage.get_size()?;
    let cache = SubrootCache::new(config.threshold, config.capacity, !config.disable_cache);
    let tree = MerkleTree { engine, config, provider, storage: RwLock::new(storage), cache: Mutex::new(cache), size: AtomicU64::new(size) };
    if size > 0 && !tree.config.disable_optimizations {
      let storage = tree.storage.read()?;
      let mut frontier = Vec::with_capacity(size.count_ones() as usize);
      for span in decompose(size) {
        frontier.push((span, tree.span_digest(&storage, span)?));
      }
      tree.cache.lock()?.reset_frontier(frontier);
      drop(storage);
      tracing::debug!("restored tree of {size} leaves for provider {}", tree.provider);
    }
    Ok(tree)
  }

  pub fn engine(&self) -> &HashEngine {
    &self.engine
  }

  pub fn config(&self) -> &TreeConfig {
    &self.config
  }

  /// Identifier stamped into every proof generated by this tree.
  pub fn provider(&self) -> &str {
    &self.provider
  }

  pub fn size(&self) -> u64 {
    self.size.load(Ordering::Acquire)
  }

  /// Hashes `record` as a leaf and appends it. Returns the new size.
  pub fn append<'a, R: Into<Record<'a>>>(&self, record: R) -> Result<u64> {
    let digest = self.engine.hash_leaf(record)?;
    self.append_hash(digest)
  }

  /// Appends an already computed leaf hash. Returns the new size.
  pub fn append_hash(&self, digest: Digest) -> Result<u64> {
    if digest.algorithm() != self.engine.algorithm() {
      return Err(Error::InvalidDigest(format!("{} leaf cannot be appended to a {} tree", digest.algorithm(), self.engine.algorithm())));
    }
    let mut storage = self.storage.write()?;
    let index = storage.store_leaf(&digest)?;
    if !self.config.disable_optimizations {
      self.cache.lock()?.push(Span::leaf(index), digest, &self.engine);
    }
    self.size.store(index + 1, Ordering::Release);
    Ok(index + 1)
  }

  /// Stored hash of the leaf at 0-based `index`.
  pub fn leaf(&self, index: u64) -> Result<Digest> {
    let size = self.size();
    if index >= size {
      return Err(Error::IndexOutOfRange { index, size });
    }
    self.storage.read()?.get_leaf(index)
  }

  /// Current root hash.
  pub fn root(&self) -> Result<Digest> {
    self.root_at(self.size())
  }

  /// Root hash of the tree as it was when it had `size` leaves.
  pub fn root_at(&self, size: u64) -> Result<Digest> {
    if size == 0 {
      return Err(Error::EmptyTree);
    }
    let current = self.size();
    if size > current {
      return Err(Error::IndexOutOfRange { index: size, size: current });
    }
    let storage = self.storage.read()?;
    self.fold_spans(&storage, &decompose(size))
  }

  pub fn cache_stats(&self) -> Result<CacheStats> {
    Ok(self.cache.lock()?.stats())
  }

  /// Changes the bounds of the retained history, evicting immediately when lowered.
  pub fn set_cache_limits(&self, threshold: usize, capacity: usize) -> Result<()> {
    self.cache.lock()?.set_limits(threshold, capacity);
    Ok(())
  }

  /// Drops every retained historical subroot. Live subroots are kept.
  pub fn clear_cache(&self) -> Result<()> {
    self.cache.lock()?.clear();
    Ok(())
  }

  pub fn sync(&self) -> Result<()> {
    self.storage.write()?.sync()
  }

  pub fn into_storage(self) -> Result<S> {
    Ok(self.storage.into_inner()?)
  }

  pub(crate) fn proof(&self, offset: i64, path: Vec<crate::proof::SignedHash>, commitment: Option<Digest>) -> Result<MerkleProof> {
    MerkleProof::new(&self.provider, &self.engine, offset, path, commitment)
  }

  /// Digest of the perfect subtree `span`, taken from the cache when possible and otherwise recomputed from
  /// the stored leaves.
  pub(crate) fn span_digest(&self, storage: &S, span: Span) -> Result<Digest> {
    if span.is_leaf() {
      return storage.get_leaf(span.start);
    }
    let optimized = !self.config.disable_optimizations;
    if optimized {
      let cached = self.cache.lock()?.get(&span);
      if let Some(digest) = cached {
        return Ok(digest);
      }
    }
    let (left, right) = span.halves();
    let digest = self.engine.hash_nodes(&self.span_digest(storage, left)?, &self.span_digest(storage, right)?);
    if optimized {
      self.cache.lock()?.insert(span, digest.clone());
    }
    Ok(digest)
  }

  /// Left fold of the subroots of `spans` with the node hash.
  pub(crate) fn fold_spans(&self, storage: &S, spans: &[Span]) -> Result<Digest> {
    let (first, rest) = spans.split_first().ok_or(Error::EmptyTree)?;
    let mut acc = self.span_digest(storage, *first)?;
    for span in rest {
      acc = self.engine.hash_nodes(&acc, &self.span_digest(storage, *span)?);
    }
    Ok(acc)
  }
}

impl<S: Storage> HashTree for MerkleTree<S> {
  type Error = Error;

  fn append<'a, R: Into<Record<'a>>>(&self, record: R) -> Result<u64> {
    MerkleTree::append(self, record)
  }

  fn size(&self) -> u64 {
    MerkleTree::size(self)
  }

  fn leaf(&self, index: u64) -> Result<Digest> {
    MerkleTree::leaf(self, index)
  }

  fn root_at(&self, size: u64) -> Result<Digest> {
    MerkleTree::root_at(self, size)
  }

  fn prove_inclusion(&self, index: u64, size: u64) -> Result<MerkleProof> {
    MerkleTree::prove_inclusion(self, index, size)
  }

  fn prove_consistency(&self, size1: u64, size2: u64) -> Result<MerkleProof> {
    MerkleTree::prove_consistency(self, size1, size2)
  }

  fn sync(&self) -> Result<()> {
    MerkleTree::sync(self)
  }
}
