//! Address-ordered free ranges for the reclaiming strategy.
//!
//! Ranges are payload offsets. Adjacent ranges are merged on insert, so the
//! list never holds two ranges that touch.
//!
//! ```text
//!   before free(B):   [ A free ][ B live ][ C free ][ D live ]
//!   after free(B):    [      A + B + C free      ][ D live ]
//! ```

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub(crate) struct FreeList {
  // start offset -> length
  ranges: BTreeMap<usize, usize>,
}

impl FreeList {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Takes `size` bytes from the lowest range that can hold them.
  ///
  /// The remainder of a larger range stays on the list.
  pub(crate) fn take_first_fit(
    &mut self,
    size: usize,
  ) -> Option<usize> {
    if size == 0 {
      return None;
    }

    let (&start, &len) = self.ranges.iter().find(|&(_, &len)| len >= size)?;
    self.ranges.remove(&start);

    if len > size {
      self.ranges.insert(start + size, len - size);
    }

    Some(start)
  }

  /// Returns `[start, start + size)` to the list, merging with neighbours.
  pub(crate) fn insert(
    &mut self,
    start: usize,
    size: usize,
  ) {
    if size == 0 {
      return;
    }

    let mut start = start;
    let mut size = size;

    if let Some((&prev_start, &prev_len)) = self.ranges.range(..start).next_back() {
      if prev_start + prev_len == start {
        self.ranges.remove(&prev_start);
        start = prev_start;
        size += prev_len;
      }
    }

    if let Some(next_len) = self.ranges.remove(&(start + size)) {
      size += next_len;
    }

    self.ranges.insert(start, size);
  }

  /// Drops a range ending exactly at `watermark` and returns the lowered
  /// watermark.
  pub(crate) fn trim_tail(
    &mut self,
    watermark: usize,
  ) -> usize {
    match self.ranges.last_key_value() {
      Some((&start, &len)) if start + len == watermark => {
        self.ranges.remove(&start);
        start
      }
      _ => watermark,
    }
  }

  pub(crate) fn free_bytes(&self) -> usize {
    self.ranges.values().sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_coalesce() {
    let mut list = FreeList::new();
    list.insert(0, 8);
    list.insert(16, 8);
    assert_eq!(list.ranges.len(), 2);

    list.insert(8, 8);
    assert_eq!(list.ranges.len(), 1);
    assert_eq!(list.ranges.get(&0), Some(&24));
    assert_eq!(list.free_bytes(), 24);
  }

  #[test]
  fn test_first_fit_splits() {
    let mut list = FreeList::new();
    list.insert(0, 4);
    list.insert(10, 20);

    assert_eq!(list.take_first_fit(8), Some(10));
    assert_eq!(list.ranges.get(&18), Some(&12));

    assert_eq!(list.take_first_fit(4), Some(0));
    assert_eq!(list.take_first_fit(13), None);
    assert_eq!(list.take_first_fit(0), None);
    assert_eq!(list.free_bytes(), 12);
  }

  #[test]
  fn test_trim_tail() {
    let mut list = FreeList::new();
    list.insert(4, 4);
    list.insert(12, 8);

    assert_eq!(list.trim_tail(24), 24);
    assert_eq!(list.trim_tail(20), 12);
    assert_eq!(list.free_bytes(), 4);
  }
}
