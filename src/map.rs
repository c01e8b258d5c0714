use std::{
  fs::File,
  io,
  os::fd::AsRawFd,
  ptr::{self, NonNull},
  slice,
};

use bytemuck::Zeroable;
use libc::c_void;
use tracing::debug;

use crate::{
  error::{HeapError, HeapResult},
  header::{HEADER_SIZE, Header},
};

/// Address the heap prefers to be mapped at. Advisory only.
pub const DEFAULT_MAP_HINT: usize = 0x6000_0000_0000;

/// A shared read-write mapping of a whole file. Unmapped on drop.
pub(crate) struct Mapping {
  addr: NonNull<u8>,
  len: usize,
}

impl Mapping {
  /// Maps the first `len` bytes of `file`, asking for `hint` if it is non-zero.
  ///
  /// The kernel is free to place the mapping elsewhere; the returned mapping
  /// records wherever it actually landed.
  pub(crate) fn new(
    file: &File,
    len: usize,
    hint: usize,
  ) -> HeapResult<Self> {
    let hint_ptr = if hint == 0 {
      ptr::null_mut()
    } else {
      hint as *mut c_void
    };

    let addr = unsafe {
      libc::mmap(
        hint_ptr,
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        file.as_raw_fd(),
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(HeapError::Map {
        len,
        source: io::Error::last_os_error(),
      });
    }

    if hint != 0 && addr as usize != hint {
      debug!(hint = ?hint_ptr, actual = ?addr, "mapping hint not honored");
    }

    let addr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| HeapError::Map {
      len,
      source: io::Error::other("mmap returned a null address"),
    })?;

    Ok(Self { addr, len })
  }

  pub(crate) fn as_ptr(&self) -> *mut u8 {
    self.addr.as_ptr()
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  pub(crate) fn header(&self) -> Header {
    let bytes = unsafe { slice::from_raw_parts(self.as_ptr(), HEADER_SIZE) };
    Header::read_from(bytes).unwrap_or_else(Header::zeroed)
  }

  pub(crate) fn write_header(
    &self,
    header: &Header,
  ) {
    let bytes = unsafe { slice::from_raw_parts_mut(self.as_ptr(), HEADER_SIZE) };
    header.write_to(bytes);
  }

  /// Synchronously flushes the first `len` bytes of the mapping to the file.
  pub(crate) fn sync(
    &self,
    len: usize,
  ) -> HeapResult<()> {
    let len = len.min(self.len);
    let rc = unsafe { libc::msync(self.as_ptr().cast(), len, libc::MS_SYNC) };

    if rc == -1 {
      return Err(HeapError::Sync {
        source: io::Error::last_os_error(),
      });
    }

    Ok(())
  }
}

impl Drop for Mapping {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.as_ptr().cast(), self.len);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{io::Write, os::unix::fs::FileExt};

  use super::*;
  use crate::header::MAGIC;

  fn scratch_file(len: u64) -> File {
    let file = tempfile::tempfile().unwrap();
    file.set_len(len).unwrap();
    file
  }

  #[test]
  fn test_header_round_trip() {
    let file = scratch_file(4096);
    let mapping = Mapping::new(&file, 4096, 0).unwrap();

    assert!(!mapping.header().is_valid());

    mapping.write_header(&Header::new(128));
    mapping.sync(mapping.len()).unwrap();

    assert_eq!(mapping.header(), Header::new(128));
  }

  #[test]
  fn test_writes_reach_file() {
    let file = scratch_file(64);

    {
      let mapping = Mapping::new(&file, 64, DEFAULT_MAP_HINT).unwrap();
      mapping.write_header(&Header::new(3));
      mapping.sync(64).unwrap();
    }

    let mut bytes = [0u8; HEADER_SIZE];
    file.read_exact_at(&mut bytes, 0).unwrap();
    assert_eq!(&bytes[..8], &MAGIC.to_ne_bytes());
    assert_eq!(&bytes[8..16], &3u64.to_ne_bytes());
  }

  #[test]
  fn test_file_writes_are_visible() {
    let mut file = scratch_file(0);
    file.write_all(bytemuck::bytes_of(&Header::new(9))).unwrap();
    file.set_len(32).unwrap();

    let mapping = Mapping::new(&file, 32, 0).unwrap();
    assert_eq!(mapping.header().utilized(), 9);
  }

  #[test]
  fn test_zero_length_fails() {
    let file = scratch_file(0);
    assert!(matches!(
      Mapping::new(&file, 0, 0),
      Err(HeapError::Map { len: 0, .. })
    ));
  }
}
