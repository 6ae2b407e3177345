//! Operations on a possibly absent queue.
//!
//! These mirror how a driving program holds its queue: as an
//! `Option<Box<Queue>>` that may be destroyed at any time. Every operation that
//! needs a queue reports [`Error::InvalidArgument`] when handed `None`, while
//! queries and in-place transformations treat it as empty.

use crate::{Error, Queue, Result, alloc};

/// Creates an empty queue on the heap.
pub fn create() -> Result<Box<Queue>> {
    let ptr = alloc::try_alloc::<Queue>()?;
    // SAFETY: `ptr` is allocated by the global allocator with the layout of
    // `Queue`, which is exactly what `Box` expects.
    unsafe {
        ptr.write(Queue::new());
        Ok(Box::from_raw(ptr.as_ptr()))
    }
}

/// Releases `queue` together with all of its elements.
pub fn destroy(queue: Option<Box<Queue>>) {
    drop(queue)
}

pub fn insert_head(queue: Option<&mut Queue>, s: &str) -> Result<()> {
    queue.ok_or(Error::InvalidArgument)?.insert_head(s)
}

pub fn insert_tail(queue: Option<&mut Queue>, s: &str) -> Result<()> {
    queue.ok_or(Error::InvalidArgument)?.insert_tail(s)
}

/// See [`Queue::remove_head`]. Returns `Ok(false)` if `queue` is empty.
pub fn remove_head(queue: Option<&mut Queue>, out: Option<&mut [u8]>) -> Result<bool> {
    Ok(queue.ok_or(Error::InvalidArgument)?.remove_head(out))
}

pub fn size(queue: Option<&Queue>) -> usize {
    queue.map_or(0, Queue::len)
}

pub fn reverse(queue: Option<&mut Queue>) {
    if let Some(q) = queue {
        q.reverse();
    }
}

pub fn sort(queue: Option<&mut Queue>) {
    if let Some(q) = queue {
        q.sort();
    }
}
