use std::path::Path;

use rocksdb::{DB, DBCompressionType, Options, WriteBatch};

use crate::error::{Error, Result};
use crate::hash::{Algorithm, Digest};
use crate::storage::Storage;

const SIZE_KEY: &[u8] = b"size";
const LEAF_PREFIX: u8 = b'L';

/// Leaf hashes in an embedded RocksDB, one key per leaf.
pub struct RocksDBStorage {
  db: DB,
  algorithm: Algorithm,
  size: u64,
}

impl RocksDBStorage {
  pub fn open<P: AsRef<Path>>(dir: P, algorithm: Algorithm) -> Result<Self> {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_compression_type(DBCompressionType::None);
    let db = DB::open(&opts, dir)?;
    let size = match db.get(SIZE_KEY)? {
      Some(bytes) => {
        let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| Error::Storage("corrupted leaf count".to_string()))?;
        u64::from_le_bytes(bytes)
      }
      None => 0,
    };
    Ok(RocksDBStorage { db, algorithm, size })
  }

  fn key(index: u64) -> [u8; 9] {
    let mut key = [LEAF_PREFIX; 9];
    key[1..].copy_from_slice(&index.to_be_bytes());
    key
  }
}

impl Storage for RocksDBStorage {
  fn get_size(&self) -> Result<u64> {
    Ok(self.size)
  }

  fn get_leaf(&self, index: u64) -> Result<Digest> {
    if index >= self.size {
      return Err(Error::IndexOutOfRange { index, size: self.size });
    }
    match self.db.get(Self::key(index))? {
      Some(bytes) => Digest::new(self.algorithm, bytes),
      None => Err(Error::Storage(format!("leaf {index} is missing"))),
    }
  }

  fn store_leaf(&mut self, hash: &Digest) -> Result<u64> {
    if hash.algorithm() != self.algorithm {
      return Err(Error::InvalidDigest(format!("{} digest cannot be stored in a {} store", hash.algorithm(), self.algorithm)));
    }
    let index = self.size;
    let mut batch = WriteBatch::default();
    batch.put(Self::key(index), hash.as_bytes());
    batch.put(SIZE_KEY, (index + 1).to_le_bytes());
    self.db.write(batch)?;
    self.size = index + 1;
    Ok(index)
  }

  fn sync(&mut self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}
