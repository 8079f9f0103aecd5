use crate::error::{Error, Result};
use crate::hash::{Digest, HashEngine, Record};
use crate::proof::{MerkleProof, Sign, SignedHash, Status};

/// Replays proofs without access to the tree that generated them.
pub struct Verifier;

impl Verifier {
  /// Replays `proof` from `provided` and compares the result with `target`, or with the proof's commitment when
  /// no target is given. Records the outcome in the proof's status.
  pub fn verify(proof: &mut MerkleProof, provided: &Digest, target: Option<&Digest>) -> Result<bool> {
    proof.validate()?;
    let target = target.or(proof.commitment()).cloned().ok_or_else(|| Error::InvalidProof("no commitment to verify against".to_string()))?;
    let algorithm = proof.header().hash_type();
    for digest in [provided, &target] {
      if digest.algorithm() != algorithm {
        return Err(Error::InvalidProof(format!("{} digest given for a {algorithm} proof", digest.algorithm())));
      }
    }

    let engine = proof.engine();
    let verified = replay(&engine, proof.offset(), proof.path(), provided)?.is_some_and(|root| root == target);
    if verified {
      proof.set_status(Status::Verified);
    } else {
      tracing::warn!("proof {} failed against {}", proof.header().uuid(), target);
      proof.set_status(Status::Failed);
    }
    Ok(verified)
  }

  /// Hashes `record` as a leaf with the proof's own policy, then verifies.
  pub fn verify_record<'a, R: Into<Record<'a>>>(proof: &mut MerkleProof, record: R, target: Option<&Digest>) -> Result<bool> {
    let provided = proof.engine().hash_leaf(record)?;
    Self::verify(proof, &provided, target)
  }
}

/// Folds `path` starting from `provided` and returns the reached root, or `None` when a consistency prefix does
/// not reproduce `provided`.
pub fn replay(engine: &HashEngine, offset: i64, path: &[SignedHash], provided: &Digest) -> Result<Option<Digest>> {
  if offset == -1 {
    return if path.is_empty() {
      Ok(Some(provided.clone()))
    } else {
      Err(Error::InvalidProof(format!("offset -1 given for a path of {} hashes", path.len())))
    };
  }
  let split = usize::try_from(offset)
    .ok()
    .filter(|o| *o < path.len())
    .ok_or_else(|| Error::InvalidProof(format!("offset {offset} is out of range for a path of {} hashes", path.len())))?;
  let (prefix, chain) = path.split_at(split);

  let seed = match prefix.split_first() {
    None => provided.clone(),
    Some((first, rest)) => {
      // the old subroots fold to the old root
      if fold(engine, first.digest.clone(), rest) != *provided {
        return Ok(None);
      }
      // and the left siblings of the chain rebuild it around the smallest one
      let last = &prefix[prefix.len() - 1].digest;
      let mut lefts = chain.iter().rev().filter(|h| h.sign == Sign::Left).map(|h| &h.digest);
      let rebuilt = match lefts.next() {
        None => last.clone(),
        Some(head) => engine.hash_nodes(&lefts.fold(head.clone(), |acc, d| engine.hash_nodes(&acc, d)), last),
      };
      if rebuilt != *provided {
        return Ok(None);
      }
      last.clone()
    }
  };
  Ok(Some(fold(engine, seed, chain)))
}

fn fold(engine: &HashEngine, seed: Digest, path: &[SignedHash]) -> Digest {
  path.iter().fold(seed, |acc, h| match h.sign {
    Sign::Left => engine.hash_nodes(&h.digest, &acc),
    Sign::Right => engine.hash_nodes(&acc, &h.digest),
  })
}

impl MerkleProof {
  /// Shorthand for [`Verifier::verify`].
  pub fn verify(&mut self, provided: &Digest, target: Option<&Digest>) -> Result<bool> {
    Verifier::verify(self, provided, target)
  }
}
