use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::hash::{Algorithm, Digest};
use crate::storage::Storage;

const MAGIC: u32 = 0x4C4B_524D; // "MRKL"
const HEADER_SIZE: u64 = 4 + 1 + 1 + 2 + 8;

/// Leaf hashes in a flat file of fixed-length records.
///
/// ```text
/// [magic:u32][algorithm:u8][reserved:u8][digest length:u16][count:u64][digest 0][digest 1]...
/// ```
///
/// All integers are little-endian. The count is rewritten after every append, so a record past the count is an
/// incomplete write and is overwritten by the next append.
pub struct FileStorage {
  file: Mutex<File>,
  algorithm: Algorithm,
  size: u64,
}

impl FileStorage {
  /// Opens the leaf file at `path`, creating it when missing.
  pub fn open<P: AsRef<Path>>(path: P, algorithm: Algorithm) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let mut file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;
    let length = file.metadata()?.len();
    let size = if length == 0 {
      Self::write_header(&mut file, algorithm, 0)?;
      0
    } else {
      Self::read_header(&mut file, algorithm, length, &path)?
    };
    tracing::debug!("opened leaf file {} with {size} leaves", path.display());
    Ok(FileStorage { file: Mutex::new(file), algorithm, size })
  }

  fn write_header(file: &mut File, algorithm: Algorithm, count: u64) -> Result<()> {
    let mut header = Vec::with_capacity(HEADER_SIZE as usize);
    header.write_u32::<LittleEndian>(MAGIC)?;
    header.write_u8(algorithm.id())?;
    header.write_u8(0)?;
    header.write_u16::<LittleEndian>(algorithm.output_len() as u16)?;
    header.write_u64::<LittleEndian>(count)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    Ok(())
  }

  fn read_header(file: &mut File, algorithm: Algorithm, length: u64, path: &Path) -> Result<u64> {
    if length < HEADER_SIZE {
      return Err(Error::Storage(format!("{} is not a leaf file", path.display())));
    }
    let mut header = [0u8; HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;
    let mut cursor = Cursor::new(&header);
    if cursor.read_u32::<LittleEndian>()? != MAGIC {
      return Err(Error::Storage(format!("{} is not a leaf file", path.display())));
    }
    let id = cursor.read_u8()?;
    let _reserved = cursor.read_u8()?;
    let digest_len = cursor.read_u16::<LittleEndian>()? as usize;
    let count = cursor.read_u64::<LittleEndian>()?;
    if Algorithm::from_id(id) != Some(algorithm) || digest_len != algorithm.output_len() {
      return Err(Error::Storage(format!("{} holds digests of another algorithm than {algorithm}", path.display())));
    }
    let Some(expected) = count.checked_mul(digest_len as u64).and_then(|bytes| bytes.checked_add(HEADER_SIZE)) else {
      return Err(Error::Storage(format!("{} is corrupted: {count} leaves declared", path.display())));
    };
    if expected > length {
      return Err(Error::Storage(format!("{} is truncated: {count} leaves declared in {length} bytes", path.display())));
    }
    Ok(count)
  }

  fn position(&self, index: u64) -> u64 {
    HEADER_SIZE + index * self.algorithm.output_len() as u64
  }
}

impl Storage for FileStorage {
  fn get_size(&self) -> Result<u64> {
    Ok(self.size)
  }

  fn get_leaf(&self, index: u64) -> Result<Digest> {
    if index >= self.size {
      return Err(Error::IndexOutOfRange { index, size: self.size });
    }
    let mut bytes = vec![0u8; self.algorithm.output_len()];
    let mut file = self.file.lock()?;
    file.seek(SeekFrom::Start(self.position(index)))?;
    file.read_exact(&mut bytes)?;
    Digest::new(self.algorithm, bytes)
  }

  fn store_leaf(&mut self, hash: &Digest) -> Result<u64> {
    if hash.algorithm() != self.algorithm {
      return Err(Error::InvalidDigest(format!("{} digest cannot be stored in a {} leaf file", hash.algorithm(), self.algorithm)));
    }
    let index = self.size;
    let position = self.position(index);
    let file = self.file.get_mut()?;
    file.seek(SeekFrom::Start(position))?;
    let mut bw = BufWriter::new(&mut *file);
    bw.write_all(hash.as_bytes())?;
    bw.flush()?;
    drop(bw);

    file.seek(SeekFrom::Start(HEADER_SIZE - 8))?;
    file.write_u64::<LittleEndian>(index + 1)?;
    self.size = index + 1;
    Ok(index)
  }

  fn sync(&mut self) -> Result<()> {
    self.file.get_mut()?.sync_all()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::hash::{Encoding, HashEngine};
  use tempfile::NamedTempFile;

  #[test]
  fn test_basic_operations() {
    let temp_file = NamedTempFile::new().unwrap();
    let engine = HashEngine::default();
    let mut storage = FileStorage::open(temp_file.path(), Algorithm::Sha256).unwrap();
    assert_eq!(0, storage.get_size().unwrap());

    let hashes = ["hello", "world", "test"].iter().map(|s| engine.hash_leaf(*s).unwrap()).collect::<Vec<_>>();
    for (i, hash) in hashes.iter().enumerate() {
      assert_eq!(i as u64, storage.store_leaf(hash).unwrap());
    }
    assert_eq!(3, storage.get_size().unwrap());
    for (i, hash) in hashes.iter().enumerate() {
      assert_eq!(*hash, storage.get_leaf(i as u64).unwrap());
    }
    assert!(matches!(storage.get_leaf(3), Err(Error::IndexOutOfRange { index: 3, size: 3 })));
  }

  #[test]
  fn test_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let engine = HashEngine::new(Algorithm::Sha512, Encoding::Utf8, true, true);
    let a = engine.hash_leaf("persistent").unwrap();
    let b = engine.hash_leaf("data").unwrap();

    {
      let mut storage = FileStorage::open(&path, Algorithm::Sha512).unwrap();
      storage.store_leaf(&a).unwrap();
      storage.store_leaf(&b).unwrap();
      storage.sync().unwrap();
    }

    {
      let storage = FileStorage::open(&path, Algorithm::Sha512).unwrap();
      assert_eq!(2, storage.get_size().unwrap());
      assert_eq!(a, storage.get_leaf(0).unwrap());
      assert_eq!(b, storage.get_leaf(1).unwrap());
    }

    assert!(matches!(FileStorage::open(&path, Algorithm::Sha256), Err(Error::Storage(_))));
  }

  #[test]
  fn test_rejects_foreign_files() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"definitely not a leaf file").unwrap();
    temp_file.flush().unwrap();
    assert!(matches!(FileStorage::open(temp_file.path(), Algorithm::Sha256), Err(Error::Storage(_))));

    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"MRKL").unwrap();
    temp_file.flush().unwrap();
    assert!(matches!(FileStorage::open(temp_file.path(), Algorithm::Sha256), Err(Error::Storage(_))));
  }

  #[test]
  fn test_rejects_corrupted_counts() {
    for count in [u64::MAX / 2, u64::MAX, 3] {
      let mut temp_file = NamedTempFile::new().unwrap();
      let mut header = Vec::new();
      header.write_u32::<LittleEndian>(MAGIC).unwrap();
      header.write_u8(Algorithm::Sha256.id()).unwrap();
      header.write_u8(0).unwrap();
      header.write_u16::<LittleEndian>(32).unwrap();
      header.write_u64::<LittleEndian>(count).unwrap();
      header.extend_from_slice(&[0u8; 64]);
      temp_file.write_all(&header).unwrap();
      temp_file.flush().unwrap();
      assert!(matches!(FileStorage::open(temp_file.path(), Algorithm::Sha256), Err(Error::Storage(_))), "{count}");
    }
  }

  #[test]
  fn test_rejects_other_algorithms() {
    let temp_file = NamedTempFile::new().unwrap();
    let mut storage = FileStorage::open(temp_file.path(), Algorithm::Sha256).unwrap();
    let digest = HashEngine::new(Algorithm::Blake3, Encoding::Utf8, true, true).hash_leaf("x").unwrap();
    assert!(matches!(storage.store_leaf(&digest), Err(Error::InvalidDigest(_))));
  }
}
