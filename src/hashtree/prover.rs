use crate::error::{Error, Result};
use crate::hashtree::tree::MerkleTree;
use crate::hashtree::{Span, decompose};
use crate::proof::{MerkleProof, Sign, SignedHash};
use crate::storage::Storage;

impl<S: Storage> MerkleTree<S> {
  /// Proof that the leaf at `index` is part of the tree of `size` leaves.
  ///
  /// The path climbs from the leaf to the root of its subtree in the decomposition of `size`, then folds in the
  /// larger subroots on the left as one digest and the smaller ones on the right one by one.
  pub fn prove_inclusion(&self, index: u64, size: u64) -> Result<MerkleProof> {
    let current = self.size();
    if size > current {
      return Err(Error::IndexOutOfRange { index: size, size: current });
    }
    if index >= size {
      return Err(Error::IndexOutOfRange { index, size });
    }
    let storage = self.storage.read()?;
    let path = self.audit_path(&storage, Span::leaf(index), size)?;
    let commitment = self.fold_spans(&storage, &decompose(size))?;
    drop(storage);
    tracing::trace!("inclusion proof of {index} in {size}: {} hashes", path.len());
    let offset = if path.is_empty() { -1 } else { 0 };
    self.proof(offset, path, Some(commitment))
  }

  /// Proof that the tree of `size1` leaves is a prefix of the tree of `size2` leaves.
  ///
  /// The path starts with every subroot of the old tree, which folds to the old root, and `offset` is their
  /// count. The rest is the audit path of the smallest old subroot within the new tree; its left entries re-fold
  /// with that subroot to the old root and all of it folds to the new root.
  pub fn prove_consistency(&self, size1: u64, size2: u64) -> Result<MerkleProof> {
    let current = self.size();
    if size2 > current {
      return Err(Error::IndexOutOfRange { index: size2, size: current });
    }
    if size1 > size2 {
      return Err(Error::IndexOutOfRange { index: size1, size: size2 });
    }
    if size2 == 0 {
      return self.proof(-1, Vec::new(), None);
    }
    let storage = self.storage.read()?;
    let commitment = self.fold_spans(&storage, &decompose(size2))?;
    if size1 == 0 || size1 == size2 {
      drop(storage);
      return self.proof(-1, Vec::new(), Some(commitment));
    }

    let old = decompose(size1);
    let mut path = Vec::with_capacity(old.len() + 2 * u64::BITS as usize);
    for span in &old {
      path.push(SignedHash::new(Sign::Right, self.span_digest(&storage, *span)?));
    }
    let offset = path.len();
    path.extend(self.audit_path(&storage, old[offset - 1], size2)?);
    drop(storage);
    tracing::trace!("consistency proof of {size1} in {size2}: {} hashes", path.len());
    self.proof(offset as i64, path, Some(commitment))
  }

  /// Sibling digests that fold the subtree `span` up to the root of the tree of `size` leaves.
  fn audit_path(&self, storage: &S, span: Span, size: u64) -> Result<Vec<SignedHash>> {
    let subroots = decompose(size);
    let q = subroots.iter().position(|s| s.contains(&span)).ok_or(Error::IndexOutOfRange { index: span.start, size })?;
    let mut path = Vec::new();
    let mut current = span;
    while current != subroots[q] {
      let sign = if current.is_left_child() { Sign::Right } else { Sign::Left };
      path.push(SignedHash::new(sign, self.span_digest(storage, current.sibling())?));
      current = current.parent();
    }
    if q > 0 {
      path.push(SignedHash::new(Sign::Left, self.fold_spans(storage, &subroots[..q])?));
    }
    for s in &subroots[q + 1..] {
      path.push(SignedHash::new(Sign::Right, self.span_digest(storage, *s)?));
    }
    Ok(path)
  }
}
