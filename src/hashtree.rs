use crate::hash::{Digest, Record};
use crate::proof::MerkleProof;

pub mod cache;
pub mod prover;
pub mod tree;

/// Core hash tree abstraction
pub trait HashTree {
  type Error;

  /// Append a new record to the tree and return the new number of leaves
  fn append<'a, R: Into<Record<'a>>>(&self, record: R) -> Result<u64, Self::Error>;

  /// Get the current size (number of leaf nodes)
  fn size(&self) -> u64;

  /// Get the stored hash of leaf `index`
  fn leaf(&self, index: u64) -> Result<Digest, Self::Error>;

  /// Get the root hash of the tree as it was when it had `size` leaves
  fn root_at(&self, size: u64) -> Result<Digest, Self::Error>;

  /// Generate the proof that leaf `index` is included in the tree of `size` leaves
  fn prove_inclusion(&self, index: u64, size: u64) -> Result<MerkleProof, Self::Error>;

  /// Generate the proof that the tree of `size1` leaves is a prefix of the tree of `size2` leaves
  fn prove_consistency(&self, size1: u64, size2: u64) -> Result<MerkleProof, Self::Error>;

  /// Sync changes to persistent storage
  fn sync(&self) -> Result<(), Self::Error>;
}

/// Leaf range `[start, start + size)` of a perfect subtree. `size` is a power of two and `start` is a multiple
/// of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
  pub start: u64,
  pub size: u64,
}

impl Span {
  pub fn new(start: u64, size: u64) -> Self {
    debug_assert!(size.is_power_of_two(), "{size}");
    debug_assert_eq!(0, start % size, "{start}/{size}");
    Span { start, size }
  }

  pub fn leaf(index: u64) -> Self {
    Span { start: index, size: 1 }
  }

  pub fn end(&self) -> u64 {
    self.start + self.size
  }

  pub fn level(&self) -> u8 {
    self.size.trailing_zeros() as u8
  }

  pub fn is_leaf(&self) -> bool {
    self.size == 1
  }

  pub fn contains(&self, other: &Span) -> bool {
    self.start <= other.start && other.end() <= self.end()
  }

  pub fn is_left_child(&self) -> bool {
    self.start % (self.size * 2) == 0
  }

  pub fn sibling(&self) -> Span {
    if self.is_left_child() { Span::new(self.start + self.size, self.size) } else { Span::new(self.start - self.size, self.size) }
  }

  pub fn parent(&self) -> Span {
    let size = self.size * 2;
    Span::new(self.start - self.start % size, size)
  }

  pub fn halves(&self) -> (Span, Span) {
    debug_assert!(!self.is_leaf());
    let half = self.size / 2;
    (Span::new(self.start, half), Span::new(self.start + half, half))
  }
}

/// Splits a tree of `size` leaves into its maximal perfect subtrees, largest (leftmost) first.
pub fn decompose(size: u64) -> Vec<Span> {
  let mut spans = Vec::with_capacity(size.count_ones() as usize);
  let mut start = 0;
  for level in (0..u64::BITS).rev() {
    let width = 1u64 << level;
    if size & width != 0 {
      spans.push(Span::new(start, width));
      start += width;
    }
  }
  spans
}
