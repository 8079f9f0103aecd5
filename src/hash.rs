//! Digest computation for leaves and internal nodes.
//!
//! A [`HashEngine`] is fixed at tree-creation time and carries the algorithm, the text encoding of records, and
//! the two flags that shape the hashed preimage:
//!
//! - `security` - prefixes `0x00` to leaf preimages and `0x01` to node preimages so that a leaf can never be
//!   confused with an internal node.
//! - `raw_bytes` - byte records are hashed as-is; otherwise they must round-trip through the text encoding.
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use crate::error::{Error, Result};

pub const LEAF_PREFIX: u8 = 0x00;
pub const NODE_PREFIX: u8 = 0x01;

/// Hash algorithms a tree can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
  Sha224,
  Sha256,
  Sha384,
  Sha512,
  Sha3_224,
  Sha3_256,
  Sha3_384,
  Sha3_512,
  Blake3,
}

impl Algorithm {
  pub const ALL: [Algorithm; 9] = [
    Algorithm::Sha224,
    Algorithm::Sha256,
    Algorithm::Sha384,
    Algorithm::Sha512,
    Algorithm::Sha3_224,
    Algorithm::Sha3_256,
    Algorithm::Sha3_384,
    Algorithm::Sha3_512,
    Algorithm::Blake3,
  ];

  /// The name written into serialized proofs.
  pub fn name(&self) -> &'static str {
    match self {
      Algorithm::Sha224 => "sha_224",
      Algorithm::Sha256 => "sha_256",
      Algorithm::Sha384 => "sha_384",
      Algorithm::Sha512 => "sha_512",
      Algorithm::Sha3_224 => "sha3_224",
      Algorithm::Sha3_256 => "sha3_256",
      Algorithm::Sha3_384 => "sha3_384",
      Algorithm::Sha3_512 => "sha3_512",
      Algorithm::Blake3 => "blake3",
    }
  }

  /// The label shown in human-readable proofs.
  pub fn label(&self) -> &'static str {
    match self {
      Algorithm::Sha224 => "SHA224",
      Algorithm::Sha256 => "SHA256",
      Algorithm::Sha384 => "SHA384",
      Algorithm::Sha512 => "SHA512",
      Algorithm::Sha3_224 => "SHA3-224",
      Algorithm::Sha3_256 => "SHA3-256",
      Algorithm::Sha3_384 => "SHA3-384",
      Algorithm::Sha3_512 => "SHA3-512",
      Algorithm::Blake3 => "BLAKE3",
    }
  }

  /// Digest length in bytes.
  pub fn output_len(&self) -> usize {
    match self {
      Algorithm::Sha224 | Algorithm::Sha3_224 => 28,
      Algorithm::Sha256 | Algorithm::Sha3_256 => 32,
      Algorithm::Sha384 | Algorithm::Sha3_384 => 48,
      Algorithm::Sha512 | Algorithm::Sha3_512 => 64,
      Algorithm::Blake3 => blake3::OUT_LEN,
    }
  }

  /// Stable one-byte identifier used by on-disk storage headers.
  pub fn id(&self) -> u8 {
    match self {
      Algorithm::Sha224 => 1,
      Algorithm::Sha256 => 2,
      Algorithm::Sha384 => 3,
      Algorithm::Sha512 => 4,
      Algorithm::Sha3_224 => 5,
      Algorithm::Sha3_256 => 6,
      Algorithm::Sha3_384 => 7,
      Algorithm::Sha3_512 => 8,
      Algorithm::Blake3 => 9,
    }
  }

  pub fn from_id(id: u8) -> Option<Algorithm> {
    Self::ALL.iter().copied().find(|a| a.id() == id)
  }

  fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
    match self {
      Algorithm::Sha224 => digest_with::<sha2::Sha224>(parts),
      Algorithm::Sha256 => digest_with::<sha2::Sha256>(parts),
      Algorithm::Sha384 => digest_with::<sha2::Sha384>(parts),
      Algorithm::Sha512 => digest_with::<sha2::Sha512>(parts),
      Algorithm::Sha3_224 => digest_with::<sha3::Sha3_224>(parts),
      Algorithm::Sha3_256 => digest_with::<sha3::Sha3_256>(parts),
      Algorithm::Sha3_384 => digest_with::<sha3::Sha3_384>(parts),
      Algorithm::Sha3_512 => digest_with::<sha3::Sha3_512>(parts),
      Algorithm::Blake3 => {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
          hasher.update(part);
        }
        hasher.finalize().as_bytes().to_vec()
      }
    }
  }
}

fn digest_with<D: sha2::Digest>(parts: &[&[u8]]) -> Vec<u8> {
  let mut hasher = D::new();
  for part in parts {
    hasher.update(part);
  }
  hasher.finalize().to_vec()
}

impl FromStr for Algorithm {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match normalize(s).as_str() {
      "sha224" => Ok(Algorithm::Sha224),
      "sha256" => Ok(Algorithm::Sha256),
      "sha384" => Ok(Algorithm::Sha384),
      "sha512" => Ok(Algorithm::Sha512),
      "sha3224" => Ok(Algorithm::Sha3_224),
      "sha3256" => Ok(Algorithm::Sha3_256),
      "sha3384" => Ok(Algorithm::Sha3_384),
      "sha3512" => Ok(Algorithm::Sha3_512),
      "blake3" => Ok(Algorithm::Blake3),
      _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
    }
  }
}

impl Display for Algorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Text codecs a tree can encode its records with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
  Utf8,
  Utf16,
  Utf16Le,
  Utf16Be,
  Utf32,
  Utf32Le,
  Utf32Be,
  Ascii,
  Latin1,
}

impl Encoding {
  pub fn name(&self) -> &'static str {
    match self {
      Encoding::Utf8 => "utf_8",
      Encoding::Utf16 => "utf_16",
      Encoding::Utf16Le => "utf_16_le",
      Encoding::Utf16Be => "utf_16_be",
      Encoding::Utf32 => "utf_32",
      Encoding::Utf32Le => "utf_32_le",
      Encoding::Utf32Be => "utf_32_be",
      Encoding::Ascii => "ascii",
      Encoding::Latin1 => "latin_1",
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Encoding::Utf8 => "UTF-8",
      Encoding::Utf16 => "UTF-16",
      Encoding::Utf16Le => "UTF-16-LE",
      Encoding::Utf16Be => "UTF-16-BE",
      Encoding::Utf32 => "UTF-32",
      Encoding::Utf32Le => "UTF-32-LE",
      Encoding::Utf32Be => "UTF-32-BE",
      Encoding::Ascii => "ASCII",
      Encoding::Latin1 => "LATIN-1",
    }
  }

  /// Encodes text. The endian-less UTF-16/32 forms write a little-endian BOM.
  pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
    let bytes = match self {
      Encoding::Utf8 => text.as_bytes().to_vec(),
      Encoding::Utf16 => {
        let mut bytes = vec![0xFF, 0xFE];
        text.encode_utf16().for_each(|u| bytes.extend_from_slice(&u.to_le_bytes()));
        bytes
      }
      Encoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
      Encoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
      Encoding::Utf32 => {
        let mut bytes = vec![0xFF, 0xFE, 0x00, 0x00];
        text.chars().for_each(|c| bytes.extend_from_slice(&(c as u32).to_le_bytes()));
        bytes
      }
      Encoding::Utf32Le => text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect(),
      Encoding::Utf32Be => text.chars().flat_map(|c| (c as u32).to_be_bytes()).collect(),
      Encoding::Ascii => narrow(text, 0x7F, self)?,
      Encoding::Latin1 => narrow(text, 0xFF, self)?,
    };
    Ok(bytes)
  }

  pub fn decode(&self, bytes: &[u8]) -> Result<String> {
    let invalid = || Error::Encoding(format!("bytes are not valid {}", self.label()));
    match self {
      Encoding::Utf8 => std::str::from_utf8(bytes).map(str::to_string).map_err(|_| invalid()),
      Encoding::Utf16 => match bytes {
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes).ok_or_else(invalid),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes).ok_or_else(invalid),
        _ => decode_utf16(bytes, u16::from_le_bytes).ok_or_else(invalid),
      },
      Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes).ok_or_else(invalid),
      Encoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes).ok_or_else(invalid),
      Encoding::Utf32 => match bytes {
        [0x00, 0x00, 0xFE, 0xFF, rest @ ..] => decode_utf32(rest, u32::from_be_bytes).ok_or_else(invalid),
        [0xFF, 0xFE, 0x00, 0x00, rest @ ..] => decode_utf32(rest, u32::from_le_bytes).ok_or_else(invalid),
        _ => decode_utf32(bytes, u32::from_le_bytes).ok_or_else(invalid),
      },
      Encoding::Utf32Le => decode_utf32(bytes, u32::from_le_bytes).ok_or_else(invalid),
      Encoding::Utf32Be => decode_utf32(bytes, u32::from_be_bytes).ok_or_else(invalid),
      Encoding::Ascii => {
        if bytes.is_ascii() {
          Ok(bytes.iter().map(|b| *b as char).collect())
        } else {
          Err(invalid())
        }
      }
      Encoding::Latin1 => Ok(bytes.iter().map(|b| *b as char).collect()),
    }
  }
}

fn narrow(text: &str, max: u32, encoding: &Encoding) -> Result<Vec<u8>> {
  text
    .chars()
    .map(|c| {
      if c as u32 <= max {
        Ok(c as u32 as u8)
      } else {
        Err(Error::Encoding(format!("{c:?} cannot be encoded as {}", encoding.label())))
      }
    })
    .collect()
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
  if bytes.len() % 2 != 0 {
    return None;
  }
  let units = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]]));
  char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

fn decode_utf32(bytes: &[u8], unit: fn([u8; 4]) -> u32) -> Option<String> {
  if bytes.len() % 4 != 0 {
    return None;
  }
  bytes.chunks_exact(4).map(|c| char::from_u32(unit([c[0], c[1], c[2], c[3]]))).collect()
}

impl FromStr for Encoding {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match normalize(s).as_str() {
      "utf8" => Ok(Encoding::Utf8),
      "utf16" => Ok(Encoding::Utf16),
      "utf16le" => Ok(Encoding::Utf16Le),
      "utf16be" => Ok(Encoding::Utf16Be),
      "utf32" => Ok(Encoding::Utf32),
      "utf32le" => Ok(Encoding::Utf32Le),
      "utf32be" => Ok(Encoding::Utf32Be),
      "ascii" | "usascii" => Ok(Encoding::Ascii),
      "latin1" | "iso88591" | "l1" => Ok(Encoding::Latin1),
      _ => Err(Error::UnsupportedEncoding(s.to_string())),
    }
  }
}

impl Display for Encoding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

fn normalize(name: &str) -> String {
  name.chars().filter(|c| *c != '_' && *c != '-').flat_map(char::to_lowercase).collect()
}

/// A fixed-length hash value tagged with the algorithm that produced it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest {
  algorithm: Algorithm,
  bytes: Vec<u8>,
}

impl Digest {
  pub fn new(algorithm: Algorithm, bytes: Vec<u8>) -> Result<Self> {
    if bytes.len() != algorithm.output_len() {
      return Err(Error::InvalidDigest(format!(
        "{} bytes given for {} which produces {} bytes",
        bytes.len(),
        algorithm,
        algorithm.output_len()
      )));
    }
    Ok(Digest { algorithm, bytes })
  }

  pub fn from_hex(algorithm: Algorithm, hex: &str) -> Result<Self> {
    let bytes = hex::decode(hex).map_err(|e| Error::InvalidDigest(format!("{hex:?}: {e}")))?;
    Self::new(algorithm, bytes)
  }

  pub fn algorithm(&self) -> Algorithm {
    self.algorithm
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub fn to_hex(&self) -> String {
    hex::encode(&self.bytes)
  }
}

impl Display for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl Debug for Digest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.algorithm, self.to_hex())
  }
}

/// A value to be appended as a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
  Bytes(&'a [u8]),
  Text(&'a str),
}

impl<'a> From<&'a [u8]> for Record<'a> {
  fn from(bytes: &'a [u8]) -> Self {
    Record::Bytes(bytes)
  }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Record<'a> {
  fn from(bytes: &'a [u8; N]) -> Self {
    Record::Bytes(bytes)
  }
}

impl<'a> From<&'a Vec<u8>> for Record<'a> {
  fn from(bytes: &'a Vec<u8>) -> Self {
    Record::Bytes(bytes)
  }
}

impl<'a> From<&'a str> for Record<'a> {
  fn from(text: &'a str) -> Self {
    Record::Text(text)
  }
}

impl<'a> From<&'a String> for Record<'a> {
  fn from(text: &'a String) -> Self {
    Record::Text(text)
  }
}

/// Stateless hashing policy shared by a tree, its proofs and their verifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEngine {
  algorithm: Algorithm,
  encoding: Encoding,
  security: bool,
  raw_bytes: bool,
}

impl HashEngine {
  pub fn new(algorithm: Algorithm, encoding: Encoding, security: bool, raw_bytes: bool) -> Self {
    HashEngine { algorithm, encoding, security, raw_bytes }
  }

  /// Resolves algorithm and encoding names, failing before any hashing takes place.
  pub fn from_names(algorithm: &str, encoding: &str, security: bool, raw_bytes: bool) -> Result<Self> {
    Ok(Self::new(algorithm.parse()?, encoding.parse()?, security, raw_bytes))
  }

  pub fn algorithm(&self) -> Algorithm {
    self.algorithm
  }

  pub fn encoding(&self) -> Encoding {
    self.encoding
  }

  pub fn security(&self) -> bool {
    self.security
  }

  pub fn raw_bytes(&self) -> bool {
    self.raw_bytes
  }

  pub fn hash_leaf<'a, R: Into<Record<'a>>>(&self, record: R) -> Result<Digest> {
    let preimage = match record.into() {
      Record::Text(text) => self.encoding.encode(text)?,
      Record::Bytes(bytes) if self.raw_bytes => return Ok(self.digest(LEAF_PREFIX, &[bytes])),
      Record::Bytes(bytes) => self.encoding.encode(&self.encoding.decode(bytes)?)?,
    };
    Ok(self.digest(LEAF_PREFIX, &[&preimage]))
  }

  pub fn hash_nodes(&self, left: &Digest, right: &Digest) -> Digest {
    debug_assert_eq!(self.algorithm, left.algorithm);
    debug_assert_eq!(self.algorithm, right.algorithm);
    self.digest(NODE_PREFIX, &[left.as_bytes(), right.as_bytes()])
  }

  fn digest(&self, prefix: u8, parts: &[&[u8]]) -> Digest {
    let bytes = if self.security {
      let prefix = [prefix];
      let mut preimage = Vec::with_capacity(parts.len() + 1);
      preimage.push(&prefix[..]);
      preimage.extend_from_slice(parts);
      self.algorithm.digest(&preimage)
    } else {
      self.algorithm.digest(parts)
    };
    Digest { algorithm: self.algorithm, bytes }
  }
}

impl Default for HashEngine {
  fn default() -> Self {
    HashEngine::new(Algorithm::Sha256, Encoding::Utf8, true, true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_known_leaf_digests() {
    let plain = HashEngine::new(Algorithm::Sha256, Encoding::Utf8, false, true);
    assert_eq!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855", plain.hash_leaf(b"").unwrap().to_hex());
    assert_eq!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad", plain.hash_leaf("abc").unwrap().to_hex());

    // RFC 6962 empty leaf: SHA256(0x00)
    let secure = HashEngine::new(Algorithm::Sha256, Encoding::Utf8, true, true);
    assert_eq!("6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d", secure.hash_leaf(b"").unwrap().to_hex());

    let sha3 = HashEngine::new(Algorithm::Sha3_256, Encoding::Utf8, false, true);
    assert_eq!("a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a", sha3.hash_leaf(b"").unwrap().to_hex());

    let blake3 = HashEngine::new(Algorithm::Blake3, Encoding::Utf8, false, true);
    assert_eq!(blake3::hash(b"").to_hex().as_str(), blake3.hash_leaf(b"").unwrap().to_hex());
  }

  #[test]
  fn test_output_lengths() {
    for algorithm in Algorithm::ALL {
      let engine = HashEngine::new(algorithm, Encoding::Utf8, true, true);
      let leaf = engine.hash_leaf("x").unwrap();
      assert_eq!(algorithm.output_len(), leaf.len(), "{algorithm}");
      assert_eq!(algorithm.output_len(), engine.hash_nodes(&leaf, &leaf).len(), "{algorithm}");
      assert_eq!(Some(algorithm), Algorithm::from_id(algorithm.id()));
      assert_eq!(algorithm, algorithm.name().parse::<Algorithm>().unwrap());
    }
  }

  #[test]
  fn test_security_prefix_separates_leaves_and_nodes() {
    let engine = HashEngine::new(Algorithm::Sha256, Encoding::Utf8, true, true);
    let a = engine.hash_leaf("a").unwrap();
    let b = engine.hash_leaf("b").unwrap();
    let mut concat = a.as_bytes().to_vec();
    concat.extend_from_slice(b.as_bytes());
    assert_ne!(engine.hash_nodes(&a, &b), engine.hash_leaf(&concat).unwrap());

    let insecure = HashEngine::new(Algorithm::Sha256, Encoding::Utf8, false, true);
    let a = insecure.hash_leaf("a").unwrap();
    let b = insecure.hash_leaf("b").unwrap();
    let mut concat = a.as_bytes().to_vec();
    concat.extend_from_slice(b.as_bytes());
    assert_eq!(insecure.hash_nodes(&a, &b), insecure.hash_leaf(&concat).unwrap());
  }

  #[test]
  fn test_node_order_matters() {
    let engine = HashEngine::default();
    let a = engine.hash_leaf("a").unwrap();
    let b = engine.hash_leaf("b").unwrap();
    assert_ne!(engine.hash_nodes(&a, &b), engine.hash_nodes(&b, &a));
  }

  #[test]
  fn test_name_parsing() {
    for name in ["sha256", "sha_256", "SHA-256", "Sha256"] {
      assert_eq!(Algorithm::Sha256, name.parse::<Algorithm>().unwrap());
    }
    assert_eq!(Algorithm::Sha3_512, "sha3_512".parse::<Algorithm>().unwrap());
    assert!(matches!("md5".parse::<Algorithm>(), Err(Error::UnsupportedAlgorithm(_))));
    assert!(matches!(HashEngine::from_names("whirlpool", "utf_8", true, true), Err(Error::UnsupportedAlgorithm(_))));

    assert_eq!(Encoding::Utf8, "utf-8".parse::<Encoding>().unwrap());
    assert_eq!(Encoding::Utf8, "utf_8".parse::<Encoding>().unwrap());
    assert_eq!(Encoding::Latin1, "iso-8859-1".parse::<Encoding>().unwrap());
    assert!(matches!("ebcdic".parse::<Encoding>(), Err(Error::UnsupportedEncoding(_))));
  }

  #[test]
  fn test_text_encodings() {
    assert_eq!(vec![0x68, 0x00, 0x69, 0x00], Encoding::Utf16Le.encode("hi").unwrap());
    assert_eq!(vec![0x00, 0x68, 0x00, 0x69], Encoding::Utf16Be.encode("hi").unwrap());
    assert_eq!(vec![0xFF, 0xFE, 0x68, 0x00], Encoding::Utf16.encode("h").unwrap());
    assert_eq!(vec![0xE9], Encoding::Latin1.encode("é").unwrap());
    assert!(Encoding::Ascii.encode("é").is_err());

    for encoding in [Encoding::Utf8, Encoding::Utf16, Encoding::Utf16Be, Encoding::Utf32, Encoding::Utf32Be] {
      let bytes = encoding.encode("Merkle ツリー").unwrap();
      assert_eq!("Merkle ツリー", encoding.decode(&bytes).unwrap(), "{encoding}");
    }
    assert!(Encoding::Utf8.decode(&[0xC3]).is_err());
    assert!(Encoding::Utf16Le.decode(&[0x00]).is_err());
  }

  #[test]
  fn test_raw_bytes_policy() {
    let raw = HashEngine::new(Algorithm::Sha256, Encoding::Utf8, true, true);
    let cooked = HashEngine::new(Algorithm::Sha256, Encoding::Utf8, true, false);

    // valid UTF-8 hashes identically either way
    assert_eq!(raw.hash_leaf(b"abc").unwrap(), cooked.hash_leaf(b"abc").unwrap());
    assert_eq!(raw.hash_leaf("abc").unwrap(), raw.hash_leaf(b"abc").unwrap());

    // opaque bytes are accepted only in raw mode
    assert!(raw.hash_leaf(b"\xFF\xFE\xFD").is_ok());
    assert!(matches!(cooked.hash_leaf(b"\xFF\xFE\xFD"), Err(Error::Encoding(_))));

    let utf16 = HashEngine::new(Algorithm::Sha256, Encoding::Utf16Le, true, true);
    assert_ne!(raw.hash_leaf("abc").unwrap(), utf16.hash_leaf("abc").unwrap());
  }

  #[test]
  fn test_digest_hex() {
    let engine = HashEngine::default();
    let digest = engine.hash_leaf("hello").unwrap();
    assert_eq!(digest, Digest::from_hex(Algorithm::Sha256, &digest.to_hex()).unwrap());
    assert_eq!(digest.to_hex(), digest.to_string());
    assert!(matches!(Digest::from_hex(Algorithm::Sha512, &digest.to_hex()), Err(Error::InvalidDigest(_))));
    assert!(matches!(Digest::from_hex(Algorithm::Sha256, "xyz"), Err(Error::InvalidDigest(_))));
  }
}
