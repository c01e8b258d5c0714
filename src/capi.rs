//! C-compatible surface.
//!
//! Every entry point tolerates null arguments: pointer results come back
//! null, sizes come back zero and void calls do nothing. Failures are logged
//! and never unwind across the boundary.

use std::{
  ffi::{CStr, OsStr, c_char, c_int, c_void},
  os::unix::ffi::OsStrExt,
  path::Path,
  ptr,
};

use tracing::error;

use crate::heap::PersistentHeap;

/// Opens the heap file at `path`. Returns null on failure.
///
/// # Safety
///
/// `path` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_open(
  path: *const c_char,
  reset: c_int,
) -> *mut PersistentHeap {
  if path.is_null() {
    return ptr::null_mut();
  }

  let path = Path::new(OsStr::from_bytes(unsafe { CStr::from_ptr(path) }.to_bytes()));

  match PersistentHeap::open(path, reset != 0) {
    Ok(heap) => Box::into_raw(Box::new(heap)),
    Err(err) => {
      error!(%err, "failed to open persistent heap");
      ptr::null_mut()
    }
  }
}

/// Checkpoints and releases a heap returned by [`pheap_open`].
///
/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`]. It is invalid
/// after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_close(heap: *mut PersistentHeap) {
  if heap.is_null() {
    return;
  }

  let heap = unsafe { Box::from_raw(heap) };
  if let Err(err) = heap.close() {
    error!(%err, "failed to close persistent heap");
  }
}

/// Persists the header and flushes the mapping. Returns 0 on success.
///
/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_sync(heap: *const PersistentHeap) -> c_int {
  let Some(heap) = (unsafe { heap.as_ref() }) else {
    return -1;
  };

  match heap.sync() {
    Ok(()) => 0,
    Err(err) => {
      error!(%err, "failed to sync persistent heap");
      -1
    }
  }
}

/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_malloc(
  heap: *mut PersistentHeap,
  n: usize,
) -> *mut c_void {
  let Some(heap) = (unsafe { heap.as_mut() }) else {
    return ptr::null_mut();
  };

  heap
    .allocate(n)
    .map_or(ptr::null_mut(), |block| block.as_ptr().cast())
}

/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`], and `s` must be
/// null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_strdup(
  heap: *mut PersistentHeap,
  s: *const c_char,
) -> *mut c_char {
  let Some(heap) = (unsafe { heap.as_mut() }) else {
    return ptr::null_mut();
  };
  if s.is_null() {
    return ptr::null_mut();
  }

  heap
    .duplicate_string(unsafe { CStr::from_ptr(s) })
    .map_or(ptr::null_mut(), |block| block.as_ptr())
}

/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_free(
  heap: *mut PersistentHeap,
  p: *mut c_void,
) {
  if let Some(heap) = unsafe { heap.as_mut() } {
    heap.free(p.cast());
  }
}

/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_utilized(heap: *const PersistentHeap) -> usize {
  unsafe { heap.as_ref() }.map_or(0, PersistentHeap::utilized)
}

/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_capacity(heap: *const PersistentHeap) -> usize {
  unsafe { heap.as_ref() }.map_or(0, PersistentHeap::capacity)
}

/// # Safety
///
/// `heap` must be null or a live handle from [`pheap_open`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pheap_mbase(heap: *const PersistentHeap) -> *mut c_void {
  unsafe { heap.as_ref() }.map_or(ptr::null_mut(), |heap| heap.base().cast())
}
