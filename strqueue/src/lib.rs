mod alloc;
mod error;
mod queue;
mod sort;

pub mod handle;

pub use self::error::{Error, Result};
pub use self::queue::{Iter, Queue};
