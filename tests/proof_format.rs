use serde_json::json;

use merkle_engine::proof::render_path;
use merkle_engine::{
  Algorithm, Digest, Encoding, Error, HashEngine, MerkleProof, MerkleTree, Sign, SignedHash, Status, TreeConfig, Verifier,
};

const PROVIDER: &str = "1a0894bc-9755-11e9-a651-70c94e89b637";

const PATH: [(i8, &str); 11] = [
  (1, "3f824b56e7de850906e053efa4e9ed2762a15b9171824241c77b20e0eb44e3b8"),
  (1, "4d8ced510cab21d23a5fd527dd122d7a3c12df33bc90a937c0a6b91fb6ea0992"),
  (1, "35f75fd1cfef0437bc7a4cae7387998f909fab1dfe6ced53d449c16090d8aa52"),
  (-1, "73c027eac67a7b43af1a13427b2ad455451e4edfcaced8c2350b5d34adaa8020"),
  (1, "cbd441af056bf79c65a2154bc04ac2e0e40d7a2c0e77b80c27125f47d3d7cba3"),
  (1, "4e467bd5f3fc6767f12f4ffb918359da84f2a4de9ca44074488b8acf1e10262e"),
  (-1, "db7f4ee8be8025dbffee11b434f179b3b0d0f3a1d7693a441f19653a65662ad3"),
  (-1, "f235a9eb55315c9a197d069db9c75a01d99da934c5f80f9f175307fb6ac4d8fe"),
  (1, "e003d116f27c877f6de213cf4d03cce17b94aece7b2ec2f2b19367abf914bcc8"),
  (-1, "6a59026cd21a32aaee21fe6522778b398464c6ea742ccd52285aa727c367d8f2"),
  (-1, "2dca521da60bf0628caa3491065e32afc9da712feb38ff3886d1c8dda31193f8"),
];

const COMMITMENT: &str = "d079da3aee8025dbffee11b434f1abd52e97caa1d7693a441f196093abc64993";

fn engine() -> HashEngine {
  HashEngine::new(Algorithm::Sha256, Encoding::Utf8, true, true)
}

fn path() -> Vec<SignedHash> {
  PATH
    .iter()
    .map(|(sign, hex)| {
      let sign = if *sign < 0 { Sign::Left } else { Sign::Right };
      SignedHash::new(sign, Digest::from_hex(Algorithm::Sha256, hex).unwrap())
    })
    .collect()
}

fn fixture() -> MerkleProof {
  MerkleProof::new(PROVIDER, &engine(), 5, path(), None).unwrap()
}

fn empty() -> MerkleProof {
  MerkleProof::new(PROVIDER, &engine(), -1, vec![], None).unwrap()
}

#[test]
fn test_serialize() {
  let proof = fixture();
  let header = proof.header();
  let expected = json!({
    "header": {
      "uuid": header.uuid(),
      "timestamp": header.timestamp(),
      "created_at": header.created_at(),
      "provider": PROVIDER,
      "hash_type": "sha_256",
      "encoding": "utf_8",
      "raw_bytes": true,
      "security": true,
      "commitment": null,
      "status": null,
    },
    "body": {
      "offset": 5,
      "path": PATH.iter().map(|(sign, hex)| json!([sign, hex])).collect::<Vec<_>>(),
    },
  });
  assert_eq!(expected, proof.serialize());

  let empty = empty();
  assert_eq!(json!({"offset": -1, "path": []}), empty.serialize()["body"]);
}

#[test]
fn test_to_json_text() {
  let proof = fixture();
  let header = proof.header();
  let path = PATH
    .iter()
    .map(|(sign, hex)| format!("            [\n                {sign},\n                \"{hex}\"\n            ]"))
    .collect::<Vec<_>>()
    .join(",\n");
  let expected = format!(
    "{{\n    \"body\": {{\n        \"offset\": 5,\n        \"path\": [\n{path}\n        ]\n    }},\n    \"header\": {{\n        \"commitment\": null,\n        \"created_at\": \"{}\",\n        \"encoding\": \"utf_8\",\n        \"hash_type\": \"sha_256\",\n        \"provider\": \"{PROVIDER}\",\n        \"raw_bytes\": true,\n        \"security\": true,\n        \"status\": null,\n        \"timestamp\": {},\n        \"uuid\": \"{}\"\n    }}\n}}",
    header.created_at(),
    header.timestamp(),
    header.uuid()
  );
  assert_eq!(expected, proof.to_json_text().unwrap());

  let empty = empty();
  let text = empty.to_json_text().unwrap();
  assert!(text.starts_with("{\n    \"body\": {\n        \"offset\": -1,\n        \"path\": []\n    },\n    \"header\": {\n"));
}

#[test]
fn test_round_trips() {
  for proof in [fixture(), empty()] {
    assert_eq!(proof, MerkleProof::deserialize(&proof.serialize()).unwrap());
    assert_eq!(proof, MerkleProof::from_json(&proof.to_json_text().unwrap()).unwrap());
  }

  let tree = MerkleTree::on_memory(TreeConfig::default().provider(PROVIDER)).unwrap();
  for i in 0..9 {
    tree.append(format!("{i}").as_str()).unwrap();
  }
  let mut proof = tree.prove_consistency(3, 9).unwrap();
  assert!(Verifier::verify(&mut proof, &tree.root_at(3).unwrap(), None).unwrap());
  let restored = MerkleProof::from_json(&proof.to_json_text().unwrap()).unwrap();
  assert_eq!(proof, restored);
  assert_eq!(Some(Status::Verified), restored.status());
  assert_eq!(Some(&tree.root().unwrap()), restored.commitment());
}

#[test]
fn test_commitment_and_status_serialization() {
  let commitment = Digest::from_hex(Algorithm::Sha256, COMMITMENT).unwrap();
  let mut proof = MerkleProof::new(PROVIDER, &engine(), 5, path(), Some(commitment.clone())).unwrap();
  assert_eq!(json!(COMMITMENT), proof.serialize()["header"]["commitment"]);

  // the fixture path does not lead to the fixture commitment
  let provided = path()[4].digest.clone();
  assert!(!Verifier::verify(&mut proof, &provided, None).unwrap());
  assert_eq!(json!("FAILED"), proof.serialize()["header"]["status"]);
  assert_eq!(Some(Status::Failed), MerkleProof::from_json(&proof.to_json_text().unwrap()).unwrap().status());
}

#[test]
fn test_display() {
  let proof = fixture();
  let text = proof.to_string();
  let header = proof.header();
  for line in [
    format!("    uuid        : {}", header.uuid()),
    format!("    timestamp   : {} ({})", header.timestamp(), header.created_at()),
    format!("    provider    : {PROVIDER}"),
    "    hash-type   : SHA256".to_string(),
    "    encoding    : UTF-8".to_string(),
    "    raw_bytes   : TRUE".to_string(),
    "    security    : ACTIVATED".to_string(),
    "    offset      : 5".to_string(),
    "    commitment  : NONE".to_string(),
    "    status      : UNVERIFIED".to_string(),
  ] {
    assert!(text.lines().any(|l| l == line), "missing {line:?} in\n{text}");
  }
  assert!(text.contains(&format!("    path        :{}\n", render_path(proof.path()))));
  assert!(text.contains(&format!("      [0]   +1   {}", PATH[0].1)));
  assert!(text.contains(&format!("     [10]   -1   {}", PATH[10].1)));

  let text = empty().to_string();
  assert!(text.lines().any(|l| l == "    path        :"));
  assert!(text.lines().any(|l| l == "    offset      : -1"));
}

#[test]
fn test_display_flags() {
  let engine = HashEngine::new(Algorithm::Sha3_256, Encoding::Utf16, false, false);
  let text = MerkleProof::new(PROVIDER, &engine, -1, vec![], None).unwrap().to_string();
  assert!(text.lines().any(|l| l == "    hash-type   : SHA3-256"));
  assert!(text.lines().any(|l| l == "    raw_bytes   : FALSE"));
  assert!(text.lines().any(|l| l == "    security    : DEACTIVATED"));
}

#[test]
fn test_malformed_payloads() {
  assert!(matches!(MerkleProof::from_json("[]"), Err(Error::Deserialization(_))));
  assert!(matches!(MerkleProof::from_json("{\"header\""), Err(Error::InvalidProof(_))));

  let mut value = fixture().serialize();
  value["header"]["encoding"] = json!("ebcdic");
  assert!(matches!(MerkleProof::deserialize(&value), Err(Error::InvalidProof(_))));

  let mut value = fixture().serialize();
  value["body"]["path"][3][1] = json!(&PATH[3].1[..10]);
  assert!(matches!(MerkleProof::deserialize(&value), Err(Error::InvalidProof(_))));

  let mut value = fixture().serialize();
  value["body"].as_object_mut().unwrap().remove("offset");
  assert!(matches!(MerkleProof::deserialize(&value), Err(Error::Deserialization(_))));
}
