use std::fs::{metadata, read_dir};
use std::path::Path;

pub mod config;
pub mod error;
pub mod hash;
pub mod hashtree;
pub mod proof;
pub mod storage;
pub mod verify;

pub use config::TreeConfig;
pub use error::{Error, Result};
pub use hash::{Algorithm, Digest, Encoding, HashEngine, Record};
pub use hashtree::cache::CacheStats;
pub use hashtree::tree::MerkleTree;
pub use hashtree::{HashTree, Span, decompose};
pub use proof::{MerkleProof, ProofBody, ProofHeader, Sign, SignedHash, Status};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use verify::Verifier;

/// Deterministic 8-byte record for the `value`-th benchmark entry.
#[inline]
pub fn u64_to_rand_bytes(value: u64, buffer: &mut [u8; 8]) {
  // SplitMix64
  let mut z = value.wrapping_add(0x9e3779b97f4a7c15);
  z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
  let z = z ^ (z >> 31);

  buffer.copy_from_slice(&z.to_le_bytes());
}

/// Bytes used on disk by a file, or by every file below a directory.
pub fn file_size<P: AsRef<Path>>(path: P) -> u64 {
  if path.as_ref().is_file() {
    metadata(&path).map(|m| m.len()).unwrap_or(0)
  } else if path.as_ref().is_dir() {
    read_dir(path)
      .into_iter()
      .flatten()
      .flat_map(std::result::Result::ok)
      .map(|e| {
        let path = e.path();
        if path.is_dir() { file_size(&path) } else { metadata(&path).map(|m| m.len()).unwrap_or(0) }
      })
      .sum()
  } else {
    0
  }
}
