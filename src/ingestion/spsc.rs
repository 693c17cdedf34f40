//! Bounded single-producer/single-consumer ring buffer.
//!
//! When the buffer is full, `push` evicts the oldest unread item instead of
//! failing, so a slow consumer sees the freshest data. The queue is split
//! into a [`Producer`] and a [`Consumer`]; neither half is `Clone` and both
//! operate through `&mut self`, so there is exactly one of each.
//!
//! Each slot carries a stamp derived from the unbounded cursor values:
//! `stamp == i` means the slot is free for index `i`, `stamp == i + 1`
//! means it holds item `i`. The head cursor is moved by compare-and-swap
//! because both sides may advance it: the consumer when it pops, the
//! producer when it evicts. Whoever wins the CAS owns the item.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Shared state behind a producer/consumer pair
pub struct SpscQueue<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    buffer: Box<[Slot<T>]>,
    capacity: usize,
    mask: usize, // For fast modulo via bitwise AND
}

// SAFETY: slots are only accessed by the side that owns them according to
// the stamp/head protocol, and values move between threads, so `T: Send`
// is sufficient.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        assert!(capacity.is_power_of_two(), "Capacity must be power of 2");

        let buffer = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            buffer,
            capacity,
            mask: capacity - 1,
        }
    }

    /// Split into the producer and consumer halves
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let queue = Arc::new(self);
        (
            Producer {
                queue: Arc::clone(&queue),
            },
            Consumer { queue },
        )
    }

    /// Producer side only. Returns `true` if an unread item was evicted.
    fn push(&self, value: T) -> bool {
        // Only the producer writes `tail`
        let tail = self.tail.load(Ordering::Relaxed);
        let slot = &self.buffer[tail & self.mask];
        let oldest = tail.wrapping_sub(self.capacity);
        let mut evicted = false;

        loop {
            let stamp = slot.stamp.load(Ordering::Acquire);
            if stamp == tail {
                break;
            }

            // Full: the slot still holds `oldest`. Claim it unless the
            // consumer got there first.
            if stamp == oldest.wrapping_add(1)
                && self
                    .head
                    .compare_exchange(
                        oldest,
                        oldest.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            {
                // SAFETY: winning the CAS transfers ownership of item `oldest`
                unsafe { (*slot.value.get()).assume_init_drop() };
                evicted = true;
                break;
            }

            // The consumer claimed `oldest` and is still moving it out
            spin_loop();
        }

        // SAFETY: the slot is free for index `tail` and no consumer reads it
        // until the stamp below is published
        unsafe { (*slot.value.get()).write(value) };
        slot.stamp.store(tail.wrapping_add(1), Ordering::Release);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        evicted
    }

    /// Consumer side only
    fn pop(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let slot = &self.buffer[head & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == head.wrapping_add(1) {
                if self
                    .head
                    .compare_exchange_weak(
                        head,
                        head.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // SAFETY: winning the CAS transfers ownership of item `head`
                    let value = unsafe { (*slot.value.get()).assume_init_read() };
                    slot.stamp
                        .store(head.wrapping_add(self.capacity), Ordering::Release);
                    return Some(value);
                }
                // Evicted by the producer; retry with the new head
            } else if stamp == head || self.tail.load(Ordering::Acquire) == head {
                return None;
            } else {
                spin_loop();
            }
        }
    }

    /// Snapshot emptiness; racy under concurrent use
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot length; racy under concurrent use
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut idx = head;
        while idx != tail {
            let slot = &mut self.buffer[idx & self.mask];
            // SAFETY: items in [head, tail) are initialized and unowned
            unsafe { slot.value.get_mut().assume_init_drop() };
            idx = idx.wrapping_add(1);
        }
    }
}

/// Writing half, owned by the network thread
pub struct Producer<T> {
    queue: Arc<SpscQueue<T>>,
}

impl<T> Producer<T> {
    /// Push without blocking, evicting the oldest unread item if full.
    /// Returns `true` if an item was evicted.
    #[inline]
    pub fn push(&mut self, value: T) -> bool {
        self.queue.push(value)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

/// Reading half, owned by one worker
pub struct Consumer<T> {
    queue: Arc<SpscQueue<T>>,
}

impl<T> Consumer<T> {
    /// Oldest item, or `None` if the queue is empty
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Create a producer/consumer pair over a queue of `capacity` items
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    SpscQueue::new(capacity).split()
}
