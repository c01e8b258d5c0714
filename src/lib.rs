//! # pheap - A Persistent File-Backed Heap
//!
//! This crate provides a **bump allocator** whose memory lives in a file mapped
//! into the process with `mmap(2)`. Allocations survive restarts: closing the
//! heap records the allocation watermark in a small header, and reopening the
//! file resumes from it.
//!
//! ## Overview
//!
//! ```text
//!   Backing File / Mapping:
//!
//!   ┌────────────┬─────┬─────┬─────┬────────────────────────────────────┐
//!   │   Header   │ A1  │ A2  │ A3  │            Free Space              │
//!   │ magic=1111 │     │     │     │                                    │
//!   │ utilized   │     │     │     │                                    │
//!   └────────────┴─────┴─────┴─────┴────────────────────────────────────┘
//!   ▲            ▲                 ▲                                    ▲
//!   │            │                 │                                    │
//!   mapped       base          watermark                          end of file
//!   base                    (base + utilized)                (base + capacity)
//! ```
//!
//! Each allocation hands out the bytes just past the watermark and moves it
//! forward. The header is only rewritten on [`PersistentHeap::close`],
//! [`PersistentHeap::sync`] or drop, so those are the durability points.
//!
//! ## Crate Structure
//!
//! ```text
//!   pheap
//!   ├── block      - Block records and the in-memory registry
//!   ├── capi       - extern "C" surface (pheap_open, pheap_malloc, ...)
//!   ├── config     - HeapConfig / Strategy, loaded from TOML
//!   ├── error      - HeapError
//!   ├── free_list  - Coalescing free ranges (Strategy::FreeList)
//!   ├── header     - Persistent header layout
//!   ├── heap       - PersistentHeap
//!   └── map        - mmap / msync / munmap
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pheap::PersistentHeap;
//!
//! fn main() -> pheap::HeapResult<()> {
//!     PersistentHeap::create_file("heap.img", 1 << 20)?;
//!
//!     let mut heap = PersistentHeap::open("heap.img", true)?;
//!     let name = heap.duplicate_string(c"hello")?;
//!     println!("stored at {:?}, {} bytes used", name, heap.utilized());
//!     heap.close()?;
//!
//!     // Later, possibly in another process.
//!     let heap = PersistentHeap::open("heap.img", false)?;
//!     assert_eq!(heap.utilized(), 6);
//!     Ok(())
//! }
//! ```
//!
//! ## Freeing
//!
//! The default [`Strategy::Bump`] lowers the watermark by the size of a freed
//! block without tracking the freed range:
//!
//! ```text
//!   alloc A(8), alloc B(8)     [ A ][ B ]........   utilized = 16
//!   free A                     [ A ][ B ]........   utilized = 8
//!   alloc C(8)                 [ A ][B=C]........   utilized = 16
//!                                    ▲
//!                                    └── C overlaps B, which is still live
//! ```
//!
//! Freed bytes are never zeroed. [`Strategy::FreeList`] keeps freed ranges in
//! a coalescing free list instead and reuses them first-fit.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no locking, and nothing coordinates several
//!   mappings of the same file
//! - **Fixed size**: the file is never grown or shrunk
//! - **No alignment**: blocks are placed at byte granularity
//! - **Session-local bookkeeping**: block records and free ranges are not
//!   persisted, only the watermark is
//! - **Unix-only**: requires `libc` and `mmap`

mod block;
pub mod capi;
mod config;
mod error;
mod free_list;
mod header;
mod heap;
mod map;

pub use block::Block;
pub use config::{HeapConfig, Strategy};
pub use error::{HeapError, HeapResult};
pub use header::{HEADER_SIZE, Header, MAGIC};
pub use heap::PersistentHeap;
pub use map::DEFAULT_MAP_HINT;
