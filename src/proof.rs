use std::fmt::{self, Display};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::hash::{Algorithm, Digest, Encoding, HashEngine};

const CREATED_AT_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Side of the running hash a path digest is combined on.
///
/// `Left` (`-1` on the wire) puts the digest on the left: `hash_nodes(digest, acc)`. `Right` (`+1`) puts it on
/// the right: `hash_nodes(acc, digest)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
  Left,
  Right,
}

impl Sign {
  pub fn value(&self) -> i8 {
    match self {
      Sign::Left => -1,
      Sign::Right => 1,
    }
  }

  pub fn from_value(value: i64) -> Result<Self> {
    match value {
      -1 => Ok(Sign::Left),
      1 => Ok(Sign::Right),
      _ => Err(Error::InvalidProof(format!("path sign must be +1 or -1, not {value}"))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHash {
  pub sign: Sign,
  pub digest: Digest,
}

impl SignedHash {
  pub fn new(sign: Sign, digest: Digest) -> Self {
    SignedHash { sign, digest }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Verified,
  Unverified,
  Failed,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Status::Verified => "VERIFIED",
      Status::Unverified => "UNVERIFIED",
      Status::Failed => "FAILED",
    }
  }

  fn parse(s: &str) -> Result<Self> {
    match s {
      "VERIFIED" => Ok(Status::Verified),
      "UNVERIFIED" => Ok(Status::Unverified),
      "FAILED" => Ok(Status::Failed),
      _ => Err(Error::InvalidProof(format!("unknown status: {s}"))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofHeader {
  uuid: String,
  timestamp: i64,
  created_at: String,
  provider: String,
  hash_type: Algorithm,
  encoding: Encoding,
  raw_bytes: bool,
  security: bool,
  commitment: Option<Digest>,
  status: Option<Status>,
}

impl ProofHeader {
  pub fn uuid(&self) -> &str {
    &self.uuid
  }

  /// Creation time in seconds since the Unix epoch.
  pub fn timestamp(&self) -> i64 {
    self.timestamp
  }

  pub fn created_at(&self) -> &str {
    &self.created_at
  }

  pub fn provider(&self) -> &str {
    &self.provider
  }

  pub fn hash_type(&self) -> Algorithm {
    self.hash_type
  }

  pub fn encoding(&self) -> Encoding {
    self.encoding
  }

  pub fn raw_bytes(&self) -> bool {
    self.raw_bytes
  }

  pub fn security(&self) -> bool {
    self.security
  }

  pub fn commitment(&self) -> Option<&Digest> {
    self.commitment.as_ref()
  }

  /// `None` until the proof has been verified.
  pub fn status(&self) -> Option<Status> {
    self.status
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofBody {
  offset: i64,
  path: Vec<SignedHash>,
}

impl ProofBody {
  pub fn offset(&self) -> i64 {
    self.offset
  }

  pub fn path(&self) -> &[SignedHash] {
    &self.path
  }
}

/// Self-describing audit or consistency proof.
///
/// The header records how leaves were hashed and the root the path is expected to reach; the body holds the
/// signed path and the offset where replay starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
  header: ProofHeader,
  body: ProofBody,
}

impl MerkleProof {
  pub fn new(provider: &str, engine: &HashEngine, offset: i64, path: Vec<SignedHash>, commitment: Option<Digest>) -> Result<Self> {
    let now = Local::now();
    let header = ProofHeader {
      uuid: Uuid::new_v4().to_string(),
      timestamp: now.timestamp(),
      created_at: now.format(CREATED_AT_FORMAT).to_string(),
      provider: provider.to_string(),
      hash_type: engine.algorithm(),
      encoding: engine.encoding(),
      raw_bytes: engine.raw_bytes(),
      security: engine.security(),
      commitment,
      status: None,
    };
    let proof = MerkleProof { header, body: ProofBody { offset, path } };
    proof.validate()?;
    Ok(proof)
  }

  pub fn header(&self) -> &ProofHeader {
    &self.header
  }

  pub fn body(&self) -> &ProofBody {
    &self.body
  }

  pub fn offset(&self) -> i64 {
    self.body.offset
  }

  pub fn path(&self) -> &[SignedHash] {
    &self.body.path
  }

  pub fn commitment(&self) -> Option<&Digest> {
    self.header.commitment.as_ref()
  }

  pub fn status(&self) -> Option<Status> {
    self.header.status
  }

  pub(crate) fn set_status(&mut self, status: Status) {
    self.header.status = Some(status);
  }

  /// Hashing policy the proof was generated with.
  pub fn engine(&self) -> HashEngine {
    HashEngine::new(self.header.hash_type, self.header.encoding, self.header.security, self.header.raw_bytes)
  }

  /// Checks that `offset` fits the path and that every digest belongs to the declared algorithm.
  pub fn validate(&self) -> Result<()> {
    let len = self.body.path.len();
    let offset = self.body.offset;
    if len == 0 {
      if offset != -1 {
        return Err(Error::InvalidProof(format!("offset {offset} given for an empty path")));
      }
    } else if offset < 0 || offset as u64 >= len as u64 {
      return Err(Error::InvalidProof(format!("offset {offset} is out of range for a path of {len} hashes")));
    }
    let algorithm = self.header.hash_type;
    let digests = self.body.path.iter().map(|h| &h.digest).chain(self.header.commitment.iter());
    for digest in digests {
      if digest.algorithm() != algorithm {
        return Err(Error::InvalidProof(format!("{} digest in a {algorithm} proof", digest.algorithm())));
      }
    }
    Ok(())
  }

  /// JSON document of the proof; keys are sorted at every level.
  pub fn serialize(&self) -> Value {
    let h = &self.header;
    let path = self.body.path.iter().map(|s| json!([s.sign.value(), s.digest.to_hex()])).collect::<Vec<_>>();
    json!({
      "header": {
        "uuid": h.uuid,
        "timestamp": h.timestamp,
        "created_at": h.created_at,
        "provider": h.provider,
        "hash_type": h.hash_type.name(),
        "encoding": h.encoding.name(),
        "raw_bytes": h.raw_bytes,
        "security": h.security,
        "commitment": h.commitment.as_ref().map(Digest::to_hex),
        "status": h.status.map(|s| s.as_str()),
      },
      "body": {
        "offset": self.body.offset,
        "path": path,
      },
    })
  }

  /// Sorted keys with 4-space indentation.
  pub fn to_json_text(&self) -> Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    self.serialize().serialize(&mut serializer)?;
    String::from_utf8(buffer).map_err(|e| Error::Encoding(e.to_string()))
  }

  pub fn deserialize(value: &Value) -> Result<Self> {
    let record = ProofRecord::deserialize(value).map_err(|e| Error::Deserialization(e.to_string()))?;
    record.into_proof()
  }

  pub fn from_json(text: &str) -> Result<Self> {
    let value = serde_json::from_str::<Value>(text).map_err(|e| Error::InvalidProof(format!("malformed JSON: {e}")))?;
    Self::deserialize(&value)
  }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProofRecord {
  header: HeaderRecord,
  body: BodyRecord,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderRecord {
  uuid: String,
  timestamp: i64,
  created_at: String,
  provider: String,
  hash_type: String,
  encoding: String,
  raw_bytes: bool,
  security: bool,
  commitment: Option<String>,
  status: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BodyRecord {
  offset: i64,
  path: Vec<(i64, String)>,
}

impl ProofRecord {
  fn into_proof(self) -> Result<MerkleProof> {
    let h = self.header;
    let hash_type = h.hash_type.parse::<Algorithm>().map_err(|e| Error::InvalidProof(e.to_string()))?;
    let encoding = h.encoding.parse::<Encoding>().map_err(|e| Error::InvalidProof(e.to_string()))?;
    let digest = |hex: &str| Digest::from_hex(hash_type, hex).map_err(|e| Error::InvalidProof(e.to_string()));
    let commitment = h.commitment.as_deref().map(digest).transpose()?;
    let status = h.status.as_deref().map(Status::parse).transpose()?;
    let path = self
      .body
      .path
      .iter()
      .map(|(sign, hex)| Ok(SignedHash::new(Sign::from_value(*sign)?, digest(hex.as_str())?)))
      .collect::<Result<Vec<_>>>()?;
    let header = ProofHeader {
      uuid: h.uuid,
      timestamp: h.timestamp,
      created_at: h.created_at,
      provider: h.provider,
      hash_type,
      encoding,
      raw_bytes: h.raw_bytes,
      security: h.security,
      commitment,
      status,
    };
    let proof = MerkleProof { header, body: ProofBody { offset: self.body.offset, path } };
    proof.validate()?;
    Ok(proof)
  }
}

/// One line per path entry: right-aligned index, signed side, hex digest.
pub fn render_path(path: &[SignedHash]) -> String {
  path.iter().enumerate().map(|(i, h)| format!("\n{:>9}   {:+}   {}", format!("[{i}]"), h.sign.value(), h.digest)).collect()
}

impl Display for MerkleProof {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let h = &self.header;
    let commitment = h.commitment.as_ref().map(Digest::to_hex).unwrap_or_else(|| "NONE".to_string());
    let status = h.status.unwrap_or(Status::Unverified).as_str();
    writeln!(f)?;
    writeln!(f, "    ----------------------------------- PROOF ------------------------------------")?;
    writeln!(f)?;
    writeln!(f, "    uuid        : {}", h.uuid)?;
    writeln!(f)?;
    writeln!(f, "    timestamp   : {} ({})", h.timestamp, h.created_at)?;
    writeln!(f, "    provider    : {}", h.provider)?;
    writeln!(f)?;
    writeln!(f, "    hash-type   : {}", h.hash_type.label())?;
    writeln!(f, "    encoding    : {}", h.encoding.label())?;
    writeln!(f, "    raw_bytes   : {}", if h.raw_bytes { "TRUE" } else { "FALSE" })?;
    writeln!(f, "    security    : {}", if h.security { "ACTIVATED" } else { "DEACTIVATED" })?;
    writeln!(f)?;
    writeln!(f, "    offset      : {}", self.body.offset)?;
    writeln!(f, "    path        :{}", render_path(&self.body.path))?;
    writeln!(f)?;
    writeln!(f, "    commitment  : {commitment}")?;
    writeln!(f)?;
    writeln!(f, "    status      : {status}")?;
    writeln!(f)?;
    writeln!(f, "    -------------------------------- END OF PROOF --------------------------------")
  }
}
