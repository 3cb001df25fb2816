//! Bounded single-producer/single-consumer lock-free ring queue
//!
//! The only inter-thread communication primitive in the platform.
//! Capacity is rounded up to a power of two so index masking replaces
//! modulo. The write index is published with release ordering and read
//! with acquire ordering, so a successful pop happens-after the
//! matching push. Head and tail live on separate cache lines to avoid
//! false sharing between the two threads.
//!
//! Construction hands out a move-only `(Producer, Consumer)` pair;
//! owning an endpoint is the static witness that exactly one thread
//! produces and exactly one consumes.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Ring<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next slot the producer will write. Monotonic; masked on access.
    tail: CachePadded<AtomicUsize>,
    /// Next slot the consumer will read. Monotonic; masked on access.
    head: CachePadded<AtomicUsize>,
}

// The ring is shared between exactly two threads; slot access is
// serialized by the head/tail protocol.
unsafe impl<T: Send> Sync for Ring<T> {}
unsafe impl<T: Send> Send for Ring<T> {}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        for i in head..tail {
            unsafe {
                (*self.buf[i & self.mask].get()).assume_init_drop();
            }
        }
    }
}

/// Create a ring with at least `capacity` slots (rounded up to a power
/// of two) and return its two endpoints.
pub fn ring<T: Send>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let cap = capacity.max(1).next_power_of_two();
    let buf = (0..cap)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let ring = Arc::new(Ring {
        buf,
        mask: cap - 1,
        tail: CachePadded::new(AtomicUsize::new(0)),
        head: CachePadded::new(AtomicUsize::new(0)),
    });

    (
        Producer {
            ring: Arc::clone(&ring),
        },
        Consumer { ring },
    )
}

/// The write endpoint. Move-only; exactly one thread holds it.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

impl<T: Send> Producer<T> {
    /// Push without blocking. Returns the value when the ring is full.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        let head = self.ring.head.load(Ordering::Acquire);
        if tail - head == self.ring.buf.len() {
            return Err(value);
        }
        unsafe {
            (*self.ring.buf[tail & self.ring.mask].get()).write(value);
        }
        self.ring.tail.store(tail + 1, Ordering::Release);
        Ok(())
    }

    /// Push, pause-spinning until the consumer frees a slot. This is
    /// the hot-path variant: fullness becomes back-pressure on the
    /// producer's own inbound queue rather than data loss.
    pub fn push_spin(&mut self, value: T) {
        let mut value = value;
        loop {
            match self.try_push(value) {
                Ok(()) => return,
                Err(returned) => {
                    value = returned;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        let head = self.ring.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.buf.len()
    }
}

/// The read endpoint. Move-only; exactly one thread holds it. Never
/// blocks: an empty ring reports `None`.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T: Send> Consumer<T> {
    /// Pop without blocking. `None` when the ring is empty.
    pub fn try_pop(&mut self) -> Option<T> {
        let head = self.ring.head.load(Ordering::Relaxed);
        let tail = self.ring.tail.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let value = unsafe { (*self.ring.buf[head & self.ring.mask].get()).assume_init_read() };
        self.ring.head.store(head + 1, Ordering::Release);
        Some(value)
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        let head = self.ring.head.load(Ordering::Relaxed);
        let tail = self.ring.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.buf.len()
    }
}
