use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can occur while opening or operating a persistent heap.
#[derive(Error, Debug)]
pub enum HeapError {
  /// The backing file could not be opened for read-write.
  #[error("failed to open heap file {}: {source}", .path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The backing file could not be created or sized.
  #[error("failed to create heap file {}: {source}", .path.display())]
  CreateFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// `fstat` on the backing file failed.
  #[error("failed to get file stats for {}: {source}", .path.display())]
  Metadata {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("heap file {} is not a regular file", .path.display())]
  NotRegularFile { path: PathBuf },

  /// The file cannot even hold the persistent header.
  #[error("heap file {} is {len} bytes, smaller than the header", .path.display())]
  FileTooSmall { path: PathBuf, len: u64 },

  #[error("heap file {} is {len} bytes, too large to map", .path.display())]
  FileTooLarge { path: PathBuf, len: u64 },

  #[error("failed to map {len} bytes: {source}")]
  Map {
    len: usize,
    #[source]
    source: io::Error,
  },

  #[error("failed to flush mapping: {source}")]
  Sync {
    #[source]
    source: io::Error,
  },

  /// Granting the request would push the watermark past capacity.
  #[error("heap is full, cannot allocate {requested} bytes ({available} available)")]
  OutOfCapacity { requested: usize, available: usize },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),
}

/// Result type for heap operations.
pub type HeapResult<T> = Result<T, HeapError>;
