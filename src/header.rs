use std::mem;

use bytemuck::{Pod, Zeroable};

/// Value stored in the first word of an initialized heap file.
pub const MAGIC: u64 = 1111;

/// Size in bytes of the persistent header at the start of the mapping.
pub const HEADER_SIZE: usize = mem::size_of::<Header>();

/// Fixed-layout prefix of the backing file.
///
/// ```text
///   offset 0        8               16
///   ┌───────────────┬───────────────┬──────────────────────────┐
///   │ magic (1111)  │ utilized      │ payload ...              │
///   └───────────────┴───────────────┴──────────────────────────┘
/// ```
///
/// Both words are native-endian machine words.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Header {
  magic: u64,
  utilized: u64,
}

impl Header {
  pub const fn new(utilized: u64) -> Self {
    Self {
      magic: MAGIC,
      utilized,
    }
  }

  /// Header of an empty heap.
  pub const fn empty() -> Self {
    Self::new(0)
  }

  pub fn is_valid(&self) -> bool {
    self.magic == MAGIC
  }

  pub fn utilized(&self) -> u64 {
    self.utilized
  }

  /// Decodes a header from the start of `bytes`.
  ///
  /// Returns `None` if `bytes` is shorter than [`HEADER_SIZE`].
  pub fn read_from(bytes: &[u8]) -> Option<Self> {
    let raw = bytes.get(..HEADER_SIZE)?;
    Some(bytemuck::pod_read_unaligned(raw))
  }

  /// Encodes the header into the start of `bytes`.
  ///
  /// # Panics
  ///
  /// Panics if `bytes` is shorter than [`HEADER_SIZE`].
  pub fn write_to(
    &self,
    bytes: &mut [u8],
  ) {
    bytes[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(self));
  }
}
