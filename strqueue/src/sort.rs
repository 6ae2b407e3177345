//! In-place merge sort over the element chain.
//!
//! All routines operate on chains exclusively owned by a single [`Queue`] and
//! only relink elements, they never allocate or copy payloads.

use crate::queue::{Element, Link, Queue};
use std::ptr::NonNull;

impl Queue {
    /// Sorts elements in ascending byte-wise order of their payloads.
    ///
    /// The sort is stable: equal payloads keep their relative order.
    pub fn sort(&mut self) {
        if self.len < 2 {
            return;
        }
        // SAFETY: The chain starting at `head` is owned by this queue and is
        // terminated by `None`.
        unsafe {
            self.head = merge_sort(self.head);
            let mut last = self.head;
            while let Some(next) = last.and_then(|e| e.as_ref().next) {
                last = Some(next);
            }
            self.tail = last;
        }
        tracing::trace!("sorted queue, len={}", self.len);
    }
}

/// # Safety
///
/// `head` must start a valid, `None`-terminated chain not reachable from
/// anywhere else.
unsafe fn merge_sort(head: Link) -> Link {
    let start = head?;
    unsafe {
        if start.as_ref().next.is_none() {
            return head;
        }
        let (left, right) = split(start);
        merge(merge_sort(Some(left)), merge_sort(right))
    }
}

/// Cuts the chain after its midpoint, returning the two halves.
///
/// The left half is never shorter than the right one.
///
/// # Safety
///
/// Same as [`merge_sort`].
unsafe fn split(start: NonNull<Element>) -> (NonNull<Element>, Link) {
    let mut slow = start;
    let mut fast = start;
    unsafe {
        while let Some(ahead) = fast.as_ref().next {
            let Some(ahead) = ahead.as_ref().next else {
                break;
            };
            let Some(next) = slow.as_ref().next else {
                break;
            };
            slow = next;
            fast = ahead;
        }
        let right = slow.as_mut().next.take();
        (start, right)
    }
}

/// Merges two sorted chains, taking from `left` first on ties.
///
/// # Safety
///
/// Both chains must satisfy the requirements of [`merge_sort`] and be
/// disjoint.
unsafe fn merge(mut left: Link, mut right: Link) -> Link {
    let mut head: Link = None;
    // The link to be filled with the next element.
    let mut slot = &raw mut head;
    unsafe {
        loop {
            let elem = match (left, right) {
                (Some(l), Some(r)) if l.as_ref().value <= r.as_ref().value => {
                    left = l.as_ref().next;
                    l
                },
                (Some(_), Some(r)) => {
                    right = r.as_ref().next;
                    r
                },
                // The remainder is already sorted, splice it as a whole.
                (rest, None) | (None, rest) => {
                    *slot = rest;
                    break;
                },
            };
            *slot = Some(elem);
            slot = &raw mut (*elem.as_ptr()).next;
        }
    }
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_values(len: usize) -> Vec<String> {
        std::iter::repeat_with(|| {
            let n = fastrand::usize(0..4);
            std::iter::repeat_with(|| fastrand::char('a'..='d'))
                .take(n)
                .collect()
        })
        .take(len)
        .collect()
    }

    fn elements(q: &Queue) -> Vec<(String, NonNull<Element>)> {
        let mut r = vec![];
        let mut cur = q.head;
        while let Some(elem) = cur {
            unsafe {
                r.push((elem.as_ref().value.to_string(), elem));
                cur = elem.as_ref().next;
            }
        }
        r
    }

    #[test]
    fn sort_three() {
        let mut q = Queue::from_values(["b", "a", "c"]);
        q.sort();
        q.assert_invariants();

        let mut buf = [0u8; 4];
        for expected in [b"a", b"b", b"c"] {
            assert!(q.remove_head(Some(&mut buf[..])));
            assert_eq!(&buf[..2], &[expected[0], 0]);
        }
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn sort_trivial_queues() {
        let mut q = Queue::new();
        q.sort();
        q.assert_invariants();

        q.insert_tail("only").unwrap();
        q.sort();
        q.assert_invariants();
        assert_eq!(q.to_vec(), ["only"]);
    }

    #[test]
    fn sort_is_ordered_permutation() {
        for len in 0..64 {
            let input = random_values(len);
            let mut q = Queue::from_values(input.iter().map(String::as_str));
            q.sort();
            q.assert_invariants();

            let mut expected = input.clone();
            expected.sort();
            assert_eq!(q.to_vec(), expected);
        }
    }

    #[test]
    fn sort_is_idempotent() {
        let input = random_values(100);
        let mut q = Queue::from_values(input.iter().map(String::as_str));
        q.sort();
        let once = elements(&q);
        q.sort();
        q.assert_invariants();
        assert_eq!(elements(&q), once);
    }

    #[test]
    fn sort_is_stable() {
        let input = random_values(200);
        let mut q = Queue::from_values(input.iter().map(String::as_str));
        let mut expected = elements(&q);
        // `sort_by` on a slice is stable too.
        expected.sort_by(|a, b| a.0.cmp(&b.0));
        q.sort();
        assert_eq!(elements(&q), expected);
    }

    #[test]
    fn sort_compares_bytes() {
        let mut q = Queue::from_values(["b", "B", "ab", "a", "", "é", "z"]);
        q.sort();
        assert_eq!(q.to_vec(), ["", "B", "a", "ab", "b", "z", "é"]);
        assert_eq!(q.tail(), Some("é"));
    }

    #[test]
    fn split_halves() {
        for len in 1..10 {
            let values = (0..len).map(|i| i.to_string()).collect::<Vec<_>>();
            let mut q = Queue::from_values(values.iter().map(String::as_str));
            let head = q.head.take().unwrap();
            q.tail = None;
            q.len = 0;

            let (left, right) = unsafe { split(head) };
            let mut halves = Queue::new();
            halves.head = Some(left);
            halves.len = (len + 1) / 2;
            halves.tail = elements(&halves).last().map(|e| e.1);
            halves.assert_invariants();
            assert_eq!(halves.to_vec(), values[..(len + 1) / 2]);

            let mut rest = Queue::new();
            rest.head = right;
            rest.len = len / 2;
            rest.tail = elements(&rest).last().map(|e| e.1);
            rest.assert_invariants();
            assert_eq!(rest.to_vec(), values[(len + 1) / 2..]);
        }
    }

    #[test]
    fn sort_then_insert_tail() {
        let mut q = Queue::from_values(["c", "a", "b"]);
        q.sort();
        q.insert_tail("d").unwrap();
        q.assert_invariants();
        assert_eq!(q.to_vec(), ["a", "b", "c", "d"]);
    }
}
