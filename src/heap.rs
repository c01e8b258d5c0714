use std::{
  ffi::{CStr, c_char},
  fs::{File, OpenOptions},
  os::fd::AsRawFd,
  path::Path,
  ptr::{self, NonNull},
};

use tracing::{debug, error, trace, warn};

use crate::{
  block::{Block, BlockRegistry},
  config::{HeapConfig, Strategy},
  error::{HeapError, HeapResult},
  free_list::FreeList,
  header::{HEADER_SIZE, Header},
  map::Mapping,
};

/// An open persistent heap.
///
/// Dropping the heap checkpoints it the same way [`close`](Self::close) does,
/// logging any failure instead of returning it.
pub struct PersistentHeap {
  // `None` once the heap has been checkpointed and unmapped.
  mapping: Option<Mapping>,
  payload: NonNull<u8>,
  file: File,
  capacity: usize,
  utilized: usize,
  registry: BlockRegistry,
  free_list: FreeList,
  config: HeapConfig,
}

impl PersistentHeap {
  /// Creates `path` (truncating it if it exists) and sizes it to `len` bytes.
  ///
  /// The resulting file holds `len - HEADER_SIZE` bytes of payload once
  /// opened.
  pub fn create_file(
    path: impl AsRef<Path>,
    len: u64,
  ) -> HeapResult<()> {
    let path = path.as_ref();
    let create_err = |source| HeapError::CreateFile {
      path: path.to_path_buf(),
      source,
    };

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(true)
      .open(path)
      .map_err(create_err)?;
    file.set_len(len).map_err(create_err)
  }

  /// Opens the heap stored in `path` with the default configuration.
  ///
  /// With `reset` set, or when the file carries no valid header, the heap
  /// starts empty. Otherwise it resumes at the persisted watermark.
  pub fn open(
    path: impl AsRef<Path>,
    reset: bool,
  ) -> HeapResult<Self> {
    Self::open_with(path, reset, &HeapConfig::default())
  }

  pub fn open_with(
    path: impl AsRef<Path>,
    reset: bool,
    config: &HeapConfig,
  ) -> HeapResult<Self> {
    let path = path.as_ref();

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .open(path)
      .map_err(|source| HeapError::Open {
        path: path.to_path_buf(),
        source,
      })?;

    let metadata = file.metadata().map_err(|source| HeapError::Metadata {
      path: path.to_path_buf(),
      source,
    })?;

    if !metadata.file_type().is_file() {
      return Err(HeapError::NotRegularFile {
        path: path.to_path_buf(),
      });
    }

    let len = metadata.len();
    let map_len = usize::try_from(len).map_err(|_| HeapError::FileTooLarge {
      path: path.to_path_buf(),
      len,
    })?;

    if map_len < HEADER_SIZE {
      return Err(HeapError::FileTooSmall {
        path: path.to_path_buf(),
        len,
      });
    }

    let capacity = map_len - HEADER_SIZE;
    let mapping = Mapping::new(&file, map_len, config.map_hint)?;
    let payload = unsafe { NonNull::new_unchecked(mapping.as_ptr().add(HEADER_SIZE)) };

    let stored = mapping.header();
    let header = if reset {
      Header::empty()
    } else if !stored.is_valid() {
      warn!(path = %path.display(), "no heap header found, starting empty");
      Header::empty()
    } else if stored.utilized() > capacity as u64 {
      warn!(
        path = %path.display(),
        utilized = stored.utilized(),
        capacity,
        "persisted watermark exceeds capacity, starting empty"
      );
      Header::empty()
    } else {
      stored
    };

    if header != stored {
      mapping.write_header(&header);
    }

    // Bounded by `capacity` above.
    let utilized = header.utilized() as usize;

    debug!(
      path = %path.display(),
      base = ?mapping.as_ptr(),
      capacity,
      utilized,
      reset,
      "opened persistent heap"
    );

    Ok(Self {
      mapping: Some(mapping),
      payload,
      file,
      capacity,
      utilized,
      registry: BlockRegistry::new(),
      free_list: FreeList::new(),
      config: config.clone(),
    })
  }

  /// Persists the header, flushes the mapping, unmaps it and closes the file.
  pub fn close(mut self) -> HeapResult<()> {
    self.checkpoint()
  }

  /// Persists the header and flushes the whole mapping without closing.
  pub fn sync(&self) -> HeapResult<()> {
    match &self.mapping {
      Some(mapping) => {
        mapping.write_header(&Header::new(self.utilized as u64));
        mapping.sync(mapping.len())
      }
      None => Ok(()),
    }
  }

  fn checkpoint(&mut self) -> HeapResult<()> {
    let result = self.sync();

    if self.mapping.take().is_some() {
      debug!(fd = self.file.as_raw_fd(), utilized = self.utilized, "closed persistent heap");
    }

    result
  }

  /// Bytes between the payload base and the watermark.
  pub fn utilized(&self) -> usize {
    self.utilized
  }

  /// Payload bytes available in total: the file size minus the header.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Start of the payload region, just past the header.
  pub fn base(&self) -> *mut u8 {
    self.payload.as_ptr()
  }

  /// Address the file actually got mapped at.
  pub fn mapped_base(&self) -> *mut u8 {
    self
      .mapping
      .as_ref()
      .map_or(ptr::null_mut(), |mapping| mapping.as_ptr())
  }

  pub fn strategy(&self) -> Strategy {
    self.config.strategy
  }

  /// Sum of the sizes of blocks allocated and not yet freed by this process.
  pub fn live_bytes(&self) -> usize {
    self.registry.live_bytes()
  }

  /// Bytes sitting in the free list, waiting to be handed out again.
  ///
  /// Always zero under [`Strategy::Bump`].
  pub fn reusable_bytes(&self) -> usize {
    self.free_list.free_bytes()
  }

  /// Every block allocated by this process, in creation order.
  pub fn blocks(&self) -> &[Block] {
    self.registry.blocks()
  }

  pub fn block_count(&self) -> usize {
    self.registry.blocks().len()
  }

  pub fn is_live(
    &self,
    ptr: *const u8,
  ) -> bool {
    !ptr.is_null() && self.registry.is_live(ptr)
  }

  fn bump(
    &mut self,
    size: usize,
  ) -> HeapResult<usize> {
    let available = self.capacity - self.utilized;

    if size > available {
      warn!(requested = size, available, "heap is full");
      return Err(HeapError::OutOfCapacity {
        requested: size,
        available,
      });
    }

    let offset = self.utilized;
    self.utilized += size;
    Ok(offset)
  }

  /// Hands out `size` bytes.
  ///
  /// With [`Strategy::Bump`] the block always starts at the current
  /// watermark. No alignment padding is added.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> HeapResult<NonNull<u8>> {
    let offset = match self.config.strategy {
      Strategy::Bump => self.bump(size)?,
      Strategy::FreeList => match self.free_list.take_first_fit(size) {
        Some(offset) => offset,
        None => self.bump(size)?,
      },
    };

    let block = unsafe { self.payload.add(offset) };

    self.registry.push(block.as_ptr(), size);
    trace!(size, addr = ?block, utilized = self.utilized, "allocated block");

    Ok(block)
  }

  /// Copies `s`, terminator included, into a fresh block.
  pub fn duplicate_string(
    &mut self,
    s: &CStr,
  ) -> HeapResult<NonNull<c_char>> {
    let bytes = s.to_bytes_with_nul();
    let block = self.allocate(bytes.len())?;

    unsafe {
      ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len());
    }

    Ok(block.cast())
  }

  /// Releases the live block starting at `ptr`.
  ///
  /// Null, unknown and already freed pointers are ignored. The bytes of a
  /// freed block are left untouched. Under [`Strategy::Bump`] the watermark
  /// drops by the block size even when the block is not the topmost one, so a
  /// later allocation can overlap blocks that are still in use.
  pub fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    let Some(block) = self.registry.release(ptr) else {
      trace!(addr = ?ptr, "ignoring free of unknown or freed block");
      return;
    };

    if self.config.sync_on_free {
      if let Some(mapping) = &self.mapping {
        if let Err(err) = mapping.sync(HEADER_SIZE + self.utilized) {
          warn!(%err, "failed to flush heap on free");
        }
      }
    }

    match self.config.strategy {
      Strategy::Bump => {
        self.utilized = self.utilized.saturating_sub(block.size);
      }
      Strategy::FreeList => {
        let offset = block.addr as usize - self.base() as usize;
        self.free_list.insert(offset, block.size);
        self.utilized = self.free_list.trim_tail(self.utilized);
      }
    }

    trace!(size = block.size, addr = ?ptr, utilized = self.utilized, "freed block");
  }
}

impl Drop for PersistentHeap {
  fn drop(&mut self) {
    if let Err(err) = self.checkpoint() {
      error!(%err, "failed to checkpoint heap on drop");
    }
  }
}

#[cfg(test)]
mod tests {
  use tempfile::NamedTempFile;

  use super::*;

  fn heap_file(len: u64) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    file.as_file().set_len(len).unwrap();
    file
  }

  #[test]
  fn test_alloc() {
    let file = heap_file(HEADER_SIZE as u64 + 64);
    let mut heap = PersistentHeap::open(file.path(), true).unwrap();

    assert_eq!(heap.capacity(), 64);
    assert_eq!(heap.utilized(), 0);
    assert_eq!(heap.base(), unsafe { heap.mapped_base().add(HEADER_SIZE) });

    let first = heap.allocate(8).unwrap().as_ptr();
    assert_eq!(first, heap.base());

    let second = heap.allocate(5).unwrap().as_ptr();
    assert_eq!(second, unsafe { heap.base().add(8) });
    assert_eq!(heap.utilized(), 13);

    unsafe {
      first.cast::<u64>().write_unaligned(0xDEAD_BEEF);
      ptr::write_bytes(second, 0xAB, 5);

      assert_eq!(first.cast::<u64>().read_unaligned(), 0xDEAD_BEEF);
      assert_eq!(*second.add(4), 0xAB);
    }

    assert_eq!(heap.block_count(), 2);
    assert_eq!(heap.live_bytes(), 13);
  }

  #[test]
  fn test_exhaustion() {
    let file = heap_file(HEADER_SIZE as u64 + 16);
    let mut heap = PersistentHeap::open(file.path(), true).unwrap();

    heap.allocate(10).unwrap();

    assert!(matches!(
      heap.allocate(7),
      Err(HeapError::OutOfCapacity {
        requested: 7,
        available: 6
      })
    ));
    assert_eq!(heap.utilized(), 10);
    assert_eq!(heap.block_count(), 1);

    heap.allocate(6).unwrap();
    assert_eq!(heap.utilized(), heap.capacity());
    assert!(heap.allocate(1).is_err());

    assert!(heap.allocate(0).is_ok());
    assert_eq!(heap.utilized(), 16);
  }

  #[test]
  fn test_free_bump() {
    let file = heap_file(HEADER_SIZE as u64 + 64);
    let mut heap = PersistentHeap::open(file.path(), true).unwrap();

    let first = heap.allocate(8).unwrap().as_ptr();
    let second = heap.allocate(4).unwrap().as_ptr();

    heap.free(first);
    assert_eq!(heap.utilized(), 4);
    assert!(!heap.is_live(first));
    assert!(heap.is_live(second));

    heap.free(first);
    heap.free(ptr::null_mut());
    heap.free(unsafe { heap.base().add(40) });
    assert_eq!(heap.utilized(), 4);

    // The watermark dropped below `second`, so the next block overlaps it.
    let third = heap.allocate(8).unwrap().as_ptr();
    assert_eq!(third, unsafe { heap.base().add(4) });
    assert!(third < unsafe { second.add(4) });
  }

  #[test]
  fn test_free_list_reuses_holes() {
    let file = heap_file(HEADER_SIZE as u64 + 64);
    let config = HeapConfig::default().with_strategy(Strategy::FreeList);
    let mut heap = PersistentHeap::open_with(file.path(), true, &config).unwrap();

    let a = heap.allocate(8).unwrap().as_ptr();
    let b = heap.allocate(8).unwrap().as_ptr();
    let c = heap.allocate(8).unwrap().as_ptr();

    heap.free(a);
    heap.free(b);
    assert_eq!(heap.utilized(), 24);
    assert_eq!(heap.live_bytes(), 8);
    assert_eq!(heap.reusable_bytes(), 16);

    // `a` and `b` were merged into one 16 byte hole.
    let d = heap.allocate(12).unwrap().as_ptr();
    assert_eq!(d, a);
    assert_eq!(heap.utilized(), 24);

    // Freeing the topmost block pulls the watermark down to the hole below.
    heap.free(c);
    assert_eq!(heap.utilized(), 12);
    heap.free(d);
    assert_eq!(heap.utilized(), 0);
    assert_eq!(heap.live_bytes(), 0);
  }

  #[test]
  fn test_duplicate_string() {
    let file = heap_file(HEADER_SIZE as u64 + 8);
    let mut heap = PersistentHeap::open(file.path(), true).unwrap();

    let copy = heap.duplicate_string(c"abc").unwrap();
    assert_eq!(heap.utilized(), 4);
    assert_eq!(unsafe { CStr::from_ptr(copy.as_ptr()) }, c"abc");

    assert!(heap.duplicate_string(c"long").is_err());
    assert_eq!(heap.utilized(), 4);
    assert_eq!(heap.block_count(), 1);
  }

  #[test]
  fn test_rejects_bad_files() {
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
      PersistentHeap::open(dir.path().join("missing"), false),
      Err(HeapError::Open { .. })
    ));
    assert!(matches!(
      PersistentHeap::open("/dev/null", false),
      Err(HeapError::NotRegularFile { .. })
    ));

    let small = heap_file(HEADER_SIZE as u64 - 1);
    assert!(matches!(
      PersistentHeap::open(small.path(), false),
      Err(HeapError::FileTooSmall { .. })
    ));
  }
}
