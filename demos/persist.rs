use std::{env, ffi::CStr, path::PathBuf};

use pheap::{HeapConfig, HeapResult, PersistentHeap};
use tracing_subscriber::EnvFilter;

/// Prints where a block landed relative to the payload base.
fn print_alloc(
  heap: &PersistentHeap,
  label: &str,
  size: usize,
  addr: *mut u8,
) {
  println!(
    "[{}] allocated {} bytes, address = {:?}, offset = {}, utilized = {}/{}",
    label,
    size,
    addr,
    addr as usize - heap.base() as usize,
    heap.utilized(),
    heap.capacity(),
  );
}

fn main() -> HeapResult<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
    .init();

  // Optional arguments: heap file path and a TOML config.
  let mut args = env::args().skip(1);
  let path = args
    .next()
    .map_or_else(|| env::temp_dir().join("pheap-demo.img"), PathBuf::from);
  let config = match args.next() {
    Some(config) => HeapConfig::load(config)?,
    None => HeapConfig::default(),
  };

  PersistentHeap::create_file(&path, 4096)?;

  // --------------------------------------------------------------------
  // 1) Fresh heap: allocate a counter and a string.
  // --------------------------------------------------------------------
  let mut heap = PersistentHeap::open_with(&path, true, &config)?;
  println!("\n[1] mapped at {:?}, payload base {:?}", heap.mapped_base(), heap.base());

  let counter = heap.allocate(8)?.as_ptr();
  print_alloc(&heap, "1", 8, counter);
  unsafe { counter.cast::<u64>().write_unaligned(41) };

  let greeting = heap.duplicate_string(c"hello from the first run")?;
  print_alloc(&heap, "1", 25, greeting.as_ptr().cast());

  let offsets = (
    counter as usize - heap.base() as usize,
    greeting.as_ptr() as usize - heap.base() as usize,
  );
  heap.close()?;

  // --------------------------------------------------------------------
  // 2) Reopen: the watermark and the bytes are still there.
  // --------------------------------------------------------------------
  let mut heap = PersistentHeap::open_with(&path, false, &config)?;
  println!("\n[2] reopened with utilized = {}", heap.utilized());

  unsafe {
    let counter = heap.base().add(offsets.0).cast::<u64>();
    counter.write_unaligned(counter.read_unaligned() + 1);
    println!("[2] counter = {}", counter.read_unaligned());

    let greeting = CStr::from_ptr(heap.base().add(offsets.1).cast());
    println!("[2] greeting = {:?}", greeting);
  }

  // --------------------------------------------------------------------
  // 3) Free a block allocated in this session and watch the watermark.
  // --------------------------------------------------------------------
  let scratch = heap.allocate(100)?.as_ptr();
  print_alloc(&heap, "3", 100, scratch);
  heap.free(scratch);
  println!("[3] after free, utilized = {}", heap.utilized());

  for block in heap.blocks() {
    println!("[3] block {:?} size {} free {}", block.addr, block.size, block.is_free);
  }

  heap.close()?;
  println!("\n[4] done, heap file left at {}", path.display());

  Ok(())
}
