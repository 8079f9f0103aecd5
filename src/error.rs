use std::sync::PoisonError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
  #[error("unsupported hash algorithm: {0}")]
  UnsupportedAlgorithm(String),

  #[error("unsupported text encoding: {0}")]
  UnsupportedEncoding(String),

  #[error("the tree is empty")]
  EmptyTree,

  #[error("index {index} is out of range for size {size}")]
  IndexOutOfRange { index: u64, size: u64 },

  #[error("invalid proof: {0}")]
  InvalidProof(String),

  #[error("cannot deserialize proof: {0}")]
  Deserialization(String),

  #[error("invalid digest: {0}")]
  InvalidDigest(String),

  #[error("cannot encode or decode record: {0}")]
  Encoding(String),

  #[error("storage error: {0}")]
  Storage(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error("lock poisoned: {0}")]
  Poisoned(String),

  #[cfg(feature = "rocksdb")]
  #[error(transparent)]
  RocksDB(#[from] rocksdb::Error),
}

impl<T> From<PoisonError<T>> for Error {
  fn from(err: PoisonError<T>) -> Self {
    Error::Poisoned(err.to_string())
  }
}
