use crate::{Error, Result};
use std::alloc::Layout;
use std::ptr::NonNull;

/// Allocates uninitialized storage for a `T`, reporting exhaustion instead of
/// aborting the process.
pub(crate) fn try_alloc<T>() -> Result<NonNull<T>> {
    let layout = Layout::new::<T>();
    debug_assert_ne!(layout.size(), 0);
    // SAFETY: `T` is never zero-sized here.
    NonNull::new(unsafe { std::alloc::alloc(layout) })
        .map(NonNull::cast)
        .ok_or(Error::AllocationFailure)
}

/// # Safety
///
/// `ptr` must be returned from [`try_alloc`] and its value must have been
/// moved out or dropped already.
pub(crate) unsafe fn dealloc<T>(ptr: NonNull<T>) {
    let layout = Layout::new::<T>();
    unsafe { std::alloc::dealloc(ptr.as_ptr().cast(), layout) }
}

/// Copies exactly `s.len()` bytes into a new allocation.
pub(crate) fn try_copy_str(s: &str) -> Result<Box<str>> {
    let mut buf = String::new();
    buf.try_reserve_exact(s.len())
        .map_err(|_| Error::AllocationFailure)?;
    buf.push_str(s);
    Ok(buf.into_boxed_str())
}

/// An allocator for unit tests which fails on demand, per thread.
#[cfg(test)]
pub(crate) mod failing {
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::cell::Cell;

    thread_local! {
        // Number of allocations to let through before failing, if armed.
        static BUDGET: Cell<Option<usize>> = const { Cell::new(None) };
        // Allocations made minus allocations released on this thread.
        static LIVE: Cell<isize> = const { Cell::new(0) };
    }

    struct FailingAlloc;

    #[global_allocator]
    static ALLOC: FailingAlloc = FailingAlloc;

    unsafe impl GlobalAlloc for FailingAlloc {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let fail = BUDGET
                .try_with(|b| match b.get() {
                    Some(0) => true,
                    Some(n) => {
                        b.set(Some(n - 1));
                        false
                    },
                    None => false,
                })
                .unwrap_or(false);
            if fail {
                return std::ptr::null_mut();
            }
            let ptr = unsafe { System.alloc(layout) };
            if !ptr.is_null() {
                _ = LIVE.try_with(|n| n.set(n.get() + 1));
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            _ = LIVE.try_with(|n| n.set(n.get() - 1));
            unsafe { System.dealloc(ptr, layout) }
        }
    }

    /// Returns the number of allocations made on this thread and not yet
    /// released.
    pub(crate) fn live() -> isize {
        LIVE.with(Cell::get)
    }

    /// Runs `f` with every allocation on this thread failing once `budget`
    /// allocations have succeeded.
    pub(crate) fn fail_after<T>(budget: usize, f: impl FnOnce() -> T) -> T {
        BUDGET.with(|b| b.set(Some(budget)));
        let output = f();
        BUDGET.with(|b| b.set(None));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_str_is_exact() {
        let s = try_copy_str("hello").unwrap();
        assert_eq!(&*s, "hello");
        assert_eq!(s.len(), 5);
        assert_eq!(&*try_copy_str("").unwrap(), "");
    }

    #[test]
    fn copy_str_reports_exhaustion() {
        let r = failing::fail_after(0, || try_copy_str("hello"));
        assert_eq!(r, Err(Error::AllocationFailure));
    }

    #[test]
    fn alloc_reports_exhaustion() {
        let r = failing::fail_after(0, try_alloc::<u64>);
        assert_eq!(r, Err(Error::AllocationFailure));

        let ptr = try_alloc::<u64>().unwrap();
        unsafe {
            ptr.write(42);
            assert_eq!(ptr.read(), 42);
            dealloc(ptr);
        }
    }
}
