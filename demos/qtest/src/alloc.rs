use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

thread_local! {
    // The allocator deciding failures on this thread, null if disarmed.
    static ARMED: Cell<*const FaultyAlloc> = const { Cell::new(ptr::null()) };
}

fn armed() -> *const FaultyAlloc {
    ARMED.try_with(Cell::get).unwrap_or(ptr::null())
}

/// A global allocator which, while armed, fails allocations at random.
///
/// Arming is per thread. Whichever instance is armed on the current thread
/// decides the failures, so an instance other than the global one can drive
/// them as well. Randomness comes from an inline xorshift generator since
/// nothing here may allocate.
pub struct FaultyAlloc {
    fail_percent: AtomicU32,
    state: AtomicU64,
}

impl FaultyAlloc {
    pub const fn new() -> Self {
        Self {
            fail_percent: AtomicU32::new(0),
            state: AtomicU64::new(0x2545_f491_4f6c_dd1d),
        }
    }

    pub fn set_fail_percent(&self, percent: u32) {
        self.fail_percent.store(percent.min(100), Ordering::Relaxed);
    }

    pub fn fail_percent(&self) -> u32 {
        self.fail_percent.load(Ordering::Relaxed)
    }

    /// Resets the generator from `seed` through one splitmix64 step.
    pub fn seed(&self, seed: u64) {
        let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        // Zero is a fixed point of xorshift.
        if z == 0 {
            z = 0x2545_f491_4f6c_dd1d;
        }
        self.state.store(z, Ordering::Relaxed);
    }

    /// Arms failure injection on this thread until the returned guard is
    /// dropped.
    pub fn arm(&self) -> Armed<'_> {
        let prev = ARMED.with(|a| a.replace(self));
        Armed { alloc: self, prev }
    }

    fn should_fail(&self) -> bool {
        ptr::eq(armed(), self) && self.draw()
    }

    fn draw(&self) -> bool {
        let percent = self.fail_percent.load(Ordering::Relaxed);
        if percent == 0 {
            return false;
        }
        let mut x = self.state.load(Ordering::Relaxed);
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state.store(x, Ordering::Relaxed);
        x % 100 < percent as u64
    }
}

impl Default for FaultyAlloc {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for FaultyAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let armed = armed();
        // SAFETY: An armed allocator outlives its guard, which disarms it.
        if !armed.is_null() && unsafe { &*armed }.draw() {
            return ptr::null_mut();
        }
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

pub struct Armed<'a> {
    alloc: &'a FaultyAlloc,
    prev: *const FaultyAlloc,
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        debug_assert!(ptr::eq(armed(), self.alloc));
        ARMED.with(|a| a.set(self.prev));
    }
}
