use crate::{Result, alloc};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

pub(crate) type Link = Option<NonNull<Element>>;

pub(crate) struct Element {
    pub(crate) value: Box<str>,
    pub(crate) next: Link,
}

impl Element {
    /// Allocates an unlinked element holding a copy of `s`.
    ///
    /// The payload is released again if the element itself cannot be
    /// allocated.
    fn try_new(s: &str) -> Result<NonNull<Self>> {
        let value = alloc::try_copy_str(s)?;
        let ptr = alloc::try_alloc::<Self>()?;
        // SAFETY: `ptr` is freshly allocated for an `Element`.
        unsafe { ptr.write(Element { value, next: None }) };
        Ok(ptr)
    }

    /// # Safety
    ///
    /// `ptr` must come from [`try_new`](Self::try_new), must already be
    /// unlinked and must not be used afterwards.
    unsafe fn release(ptr: NonNull<Self>) -> Box<str> {
        unsafe {
            let elem = ptr.read();
            alloc::dealloc(ptr);
            elem.value
        }
    }
}

/// A FIFO queue of owned strings backed by a singly-linked list.
///
/// Insertion at either end and removal at the head run in constant time.
/// [`reverse`](Self::reverse) and [`sort`](Self::sort) relink the existing
/// elements in place without allocating.
pub struct Queue {
    pub(crate) head: Link,
    pub(crate) tail: Link,
    pub(crate) len: usize,
    marker: PhantomData<Box<Element>>,
}

// SAFETY: A queue exclusively owns all of its elements, so it can be moved or
// shared across threads just like a `Vec<Box<str>>`.
unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl Queue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Alias of [`len`](Self::len).
    pub fn size(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the payload at the head of this queue.
    pub fn head(&self) -> Option<&str> {
        // SAFETY: Every linked element stays alive as long as `self` is
        // borrowed.
        self.head.map(|p| unsafe { &*p.as_ref().value })
    }

    /// Returns the payload at the tail of this queue.
    pub fn tail(&self) -> Option<&str> {
        self.tail.map(|p| unsafe { &*p.as_ref().value })
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }

    /// Inserts a copy of `s` at the head.
    ///
    /// On failure the queue is left untouched.
    pub fn insert_head(&mut self, s: &str) -> Result<()> {
        let mut elem = Element::try_new(s)?;
        // SAFETY: `elem` is not linked yet, so we hold the only pointer to it.
        unsafe { elem.as_mut().next = self.head };
        if self.head.is_none() {
            self.tail = Some(elem);
        }
        self.head = Some(elem);
        self.len += 1;
        Ok(())
    }

    /// Inserts a copy of `s` at the tail.
    ///
    /// On failure the queue is left untouched.
    pub fn insert_tail(&mut self, s: &str) -> Result<()> {
        let elem = Element::try_new(s)?;
        match self.tail {
            // SAFETY: The tail is a live element owned by this queue.
            Some(mut tail) => unsafe { tail.as_mut().next = Some(elem) },
            None => self.head = Some(elem),
        }
        self.tail = Some(elem);
        self.len += 1;
        Ok(())
    }

    /// Removes the head and hands back its payload.
    pub fn pop_head(&mut self) -> Option<Box<str>> {
        let head = self.head?;
        // SAFETY: `head` is live and owned by us. It is unlinked before being
        // released and no other pointer to it remains.
        unsafe {
            self.head = head.as_ref().next;
            if self.head.is_none() {
                self.tail = None;
            }
            self.len -= 1;
            Some(Element::release(head))
        }
    }

    /// Removes the head, copying its payload into `out` if provided.
    ///
    /// At most `out.len() - 1` bytes are copied and the rest of `out` is
    /// zero-filled, so the copied bytes are always followed by a NUL. An empty
    /// buffer is left as is. Returns `false` if this queue is empty.
    pub fn remove_head(&mut self, out: Option<&mut [u8]>) -> bool {
        let Some(value) = self.pop_head() else {
            return false;
        };
        if let Some(buf) = out {
            copy_truncated(&value, buf);
        }
        true
    }

    /// Reverses the order of elements by relinking them in place.
    pub fn reverse(&mut self) {
        let mut prev: Link = None;
        let mut cur = self.head;
        while let Some(mut elem) = cur {
            // SAFETY: Each element is visited exactly once and only through
            // the chain owned by this queue.
            unsafe {
                cur = elem.as_ref().next;
                elem.as_mut().next = prev;
            }
            prev = Some(elem);
        }
        self.tail = self.head;
        self.head = prev;
        tracing::trace!("reversed queue, len={}", self.len);
    }

    /// Releases all elements.
    pub fn clear(&mut self) {
        while self.pop_head().is_some() {}
    }
}

fn copy_truncated(src: &str, buf: &mut [u8]) {
    let Some(max) = buf.len().checked_sub(1) else {
        return;
    };
    let n = src.len().min(max);
    buf[..n].copy_from_slice(&src.as_bytes()[..n]);
    buf[n..].fill(0);
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        let len = self.len;
        // Walk iteratively, a recursive drop would overflow on long chains.
        self.clear();
        tracing::debug!("released queue, elements={len}");
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a Queue {
    type Item = &'a str;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Iterates over the payloads of a [`Queue`] from head to tail.
pub struct Iter<'a> {
    next: Link,
    remaining: usize,
    marker: PhantomData<&'a Element>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let elem = self.next?;
        // SAFETY: The queue is borrowed for `'a`, so none of its elements can
        // be released meanwhile.
        let elem = unsafe { &*elem.as_ptr() };
        self.next = elem.next;
        self.remaining -= 1;
        Some(&*elem.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
impl Queue {
    pub(crate) fn from_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut q = Queue::new();
        for s in values {
            q.insert_tail(s).unwrap();
        }
        q
    }

    pub(crate) fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_owned).collect()
    }

    /// Panics if the chain disagrees with the recorded head, tail or length.
    pub(crate) fn assert_invariants(&self) {
        assert_eq!(self.len == 0, self.head.is_none());
        assert_eq!(self.head.is_none(), self.tail.is_none());

        let mut count = 0;
        let mut last = None;
        let mut cur = self.head;
        while let Some(elem) = cur {
            count += 1;
            assert!(count <= self.len, "chain is longer than recorded");
            last = Some(elem);
            cur = unsafe { elem.as_ref().next };
        }
        assert_eq!(count, self.len);
        assert_eq!(last, self.tail);
    }
}
