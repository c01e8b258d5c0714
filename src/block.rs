use std::collections::HashMap;

/// Bookkeeping for one allocation handed out in this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
  pub addr: *mut u8,
  pub size: usize,
  pub is_free: bool,
}

impl Block {
  pub fn new(
    addr: *mut u8,
    size: usize,
  ) -> Self {
    Self {
      addr,
      size,
      is_free: false,
    }
  }
}

/// Append-only record of every allocation, in creation order.
///
/// Records are never removed; freeing only flips `is_free`. The same address
/// may appear more than once once a range has been handed out again, so the
/// address index keeps every record index for an address in creation order.
#[derive(Debug, Default)]
pub(crate) struct BlockRegistry {
  blocks: Vec<Block>,
  by_addr: HashMap<usize, Vec<usize>>,
  live_bytes: usize,
}

impl BlockRegistry {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn push(
    &mut self,
    addr: *mut u8,
    size: usize,
  ) {
    let index = self.blocks.len();
    self.blocks.push(Block::new(addr, size));
    self.by_addr.entry(addr as usize).or_default().push(index);
    self.live_bytes += size;
  }

  fn find_live(
    &self,
    addr: *const u8,
  ) -> Option<usize> {
    self
      .by_addr
      .get(&(addr as usize))?
      .iter()
      .copied()
      .find(|&index| !self.blocks[index].is_free)
  }

  /// Marks the oldest live block at `addr` as free and returns it.
  ///
  /// Unknown and already freed addresses yield `None`.
  pub(crate) fn release(
    &mut self,
    addr: *const u8,
  ) -> Option<Block> {
    let index = self.find_live(addr)?;
    let block = &mut self.blocks[index];
    block.is_free = true;
    self.live_bytes -= block.size;
    Some(*block)
  }

  pub(crate) fn is_live(
    &self,
    addr: *const u8,
  ) -> bool {
    self.find_live(addr).is_some()
  }

  pub(crate) fn blocks(&self) -> &[Block] {
    &self.blocks
  }

  pub(crate) fn live_bytes(&self) -> usize {
    self.live_bytes
  }
}
