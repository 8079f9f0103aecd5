use lru::LruCache;

use crate::hash::{Digest, HashEngine};
use crate::hashtree::Span;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
  /// Retained historical subroots, not counting the live ones.
  pub entries: usize,
  /// Digest bytes held by the retained historical subroots.
  pub bytes: usize,
}

/// Memoized digests of perfect subtrees.
///
/// The live subroots of the current tree (one per set bit of its size) are pinned and never evicted. Subroots
/// that stop being live when two equal spans merge move to a bounded history, dropped least recently used
/// first once either `threshold` entries or `capacity` bytes is exceeded.
pub struct SubrootCache {
  frontier: Vec<(Span, Digest)>,
  history: LruCache<Span, Digest>,
  threshold: usize,
  capacity: usize,
  bytes: usize,
  enabled: bool,
  hits: u64,
  misses: u64,
  evictions: u64,
}

impl SubrootCache {
  pub fn new(threshold: usize, capacity: usize, enabled: bool) -> Self {
    SubrootCache {
      frontier: Vec::with_capacity(u64::BITS as usize),
      history: LruCache::unbounded(),
      threshold,
      capacity,
      bytes: 0,
      enabled,
      hits: 0,
      misses: 0,
      evictions: 0,
    }
  }

  /// Live subroots, largest first.
  pub fn frontier(&self) -> &[(Span, Digest)] {
    &self.frontier
  }

  /// Adds the digest of a newly appended leaf and merges equal-sized trailing subroots until the frontier
  /// matches the binary decomposition of the new size.
  pub fn push(&mut self, span: Span, digest: Digest, engine: &HashEngine) {
    debug_assert_eq!(self.frontier.last().map(|(s, _)| s.end()).unwrap_or(0), span.start);
    self.frontier.push((span, digest));
    while self.mergeable() {
      let Some((right_span, right)) = self.frontier.pop() else { break };
      let Some((left_span, left)) = self.frontier.pop() else { break };
      let merged = engine.hash_nodes(&left, &right);
      self.insert(left_span, left);
      self.insert(right_span, right);
      self.frontier.push((left_span.parent(), merged));
    }
  }

  /// Replaces the live subroots, e.g. after reopening a persisted tree.
  pub fn reset_frontier(&mut self, frontier: Vec<(Span, Digest)>) {
    self.frontier = frontier;
  }

  pub fn get(&mut self, span: &Span) -> Option<Digest> {
    let found = match self.frontier.iter().find(|(s, _)| s == span) {
      Some((_, digest)) => Some(digest.clone()),
      None => self.history.get(span).cloned(),
    };
    if found.is_some() {
      self.hits += 1;
    } else {
      self.misses += 1;
    }
    found
  }

  /// Retains a historical subroot. Leaves are read from storage directly and are not retained.
  pub fn insert(&mut self, span: Span, digest: Digest) {
    if !self.enabled || span.is_leaf() {
      return;
    }
    let len = digest.len();
    if let Some(previous) = self.history.put(span, digest) {
      self.bytes -= previous.len();
    }
    self.bytes += len;
    self.evict();
  }

  pub fn set_limits(&mut self, threshold: usize, capacity: usize) {
    tracing::debug!("subroot cache limits changed: {} -> {threshold} entries, {} -> {capacity} bytes", self.threshold, self.capacity);
    self.threshold = threshold;
    self.capacity = capacity;
    self.evict();
  }

  pub fn clear(&mut self) {
    self.history.clear();
    self.bytes = 0;
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      hits: self.hits,
      misses: self.misses,
      evictions: self.evictions,
      entries: self.history.len(),
      bytes: self.bytes,
    }
  }

  fn mergeable(&self) -> bool {
    match self.frontier.as_slice() {
      [.., (left, _), (right, _)] => left.size == right.size,
      _ => false,
    }
  }

  fn evict(&mut self) {
    while self.history.len() > self.threshold || self.bytes > self.capacity {
      match self.history.pop_lru() {
        Some((span, digest)) => {
          tracing::trace!("evicted subroot [{}, {})", span.start, span.end());
          self.bytes -= digest.len();
          self.evictions += 1;
        }
        None => break,
      }
    }
  }
}
