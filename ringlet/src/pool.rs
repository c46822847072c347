//! Fixed-capacity object pool with a lock-free SPSC free list.
//!
//! The pool backs the per-operation user-data blocks referenced by SQE
//! `user_data` payloads. Slot addresses are stable for the lifetime of the
//! pool, so a slot index is a durable handle between submission and
//! completion. One thread may allocate while another deallocates without
//! locks; in the driver both roles belong to the same thread.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Single-producer/single-consumer ring of free slot indices.
///
/// `head` and `tail` are monotonic counters; the ring position is the
/// counter modulo capacity. At most `capacity` indices are ever in the
/// ring, so the counters can never lap each other.
struct FreeRing {
    buf: Box<[AtomicU32]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl FreeRing {
    fn new(capacity: u32) -> Self {
        let buf: Vec<AtomicU32> = (0..capacity).map(AtomicU32::new).collect();
        FreeRing {
            buf: buf.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(capacity as usize),
        }
    }

    /// Pop a free index. Returns None when the ring is empty (pool exhausted).
    fn pop(&self) -> Option<u32> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        let idx = self.buf[head % self.buf.len()].load(Ordering::Relaxed);
        self.head.store(head + 1, Ordering::Release);
        Some(idx)
    }

    /// Push an index back. Never fails: at most `capacity` indices exist.
    fn push(&self, idx: u32) {
        let tail = self.tail.load(Ordering::Relaxed);
        debug_assert!(tail - self.head.load(Ordering::Relaxed) < self.buf.len());
        self.buf[tail % self.buf.len()].store(idx, Ordering::Relaxed);
        self.tail.store(tail + 1, Ordering::Release);
    }

    fn available(&self) -> usize {
        self.tail.load(Ordering::Acquire) - self.head.load(Ordering::Acquire)
    }
}

/// Fixed-capacity pool of `T` with stable slot addresses.
///
/// No reallocation, no shrinkage. Exhaustion is transient: the driver frees
/// slots as completions arrive and retries.
pub(crate) struct ObjectPool<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    free: FreeRing,
}

// Safety: slot contents are only touched by the holder of the slot index,
// and the free ring hands each index to exactly one holder at a time.
unsafe impl<T: Send> Send for ObjectPool<T> {}
unsafe impl<T: Send> Sync for ObjectPool<T> {}

impl<T> ObjectPool<T> {
    pub(crate) fn new(capacity: u32) -> Self {
        let slots: Vec<UnsafeCell<MaybeUninit<T>>> = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        ObjectPool {
            slots: slots.into_boxed_slice(),
            free: FreeRing::new(capacity),
        }
    }

    /// Reserve a slot and construct `value` in place.
    ///
    /// Returns the slot index, or gives `value` back when the pool is
    /// exhausted.
    pub(crate) fn allocate(&self, value: T) -> Result<u32, T> {
        match self.free.pop() {
            Some(idx) => {
                unsafe {
                    (*self.slots[idx as usize].get()).write(value);
                }
                Ok(idx)
            }
            None => Err(value),
        }
    }

    /// Move the value out of a slot and release the slot.
    ///
    /// # Safety
    ///
    /// `idx` must have been returned by [`allocate`](Self::allocate) and not
    /// yet taken.
    pub(crate) unsafe fn take(&self, idx: u32) -> T {
        debug_assert!((idx as usize) < self.slots.len());
        let value = unsafe { (*self.slots[idx as usize].get()).assume_init_read() };
        self.free.push(idx);
        value
    }

    /// Number of free slots.
    pub(crate) fn available(&self) -> usize {
        self.free.available()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_take_cycle() {
        let pool: ObjectPool<String> = ObjectPool::new(4);
        assert_eq!(pool.available(), 4);

        let idx = pool.allocate("hello".to_string()).unwrap();
        assert_eq!(pool.available(), 3);

        let value = unsafe { pool.take(idx) };
        assert_eq!(value, "hello");
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn exhaustion_returns_value() {
        let pool: ObjectPool<u64> = ObjectPool::new(2);
        let a = pool.allocate(1).unwrap();
        let _b = pool.allocate(2).unwrap();

        assert_eq!(pool.allocate(3), Err(3));

        // Freeing a slot makes allocation succeed again.
        unsafe { pool.take(a) };
        assert!(pool.allocate(4).is_ok());
    }

    #[test]
    fn slot_reuse_preserves_values() {
        let pool: ObjectPool<u32> = ObjectPool::new(3);
        let mut indices = Vec::new();
        for i in 0..3 {
            indices.push(pool.allocate(i * 10).unwrap());
        }
        for (i, idx) in indices.into_iter().enumerate() {
            assert_eq!(unsafe { pool.take(idx) }, i as u32 * 10);
        }
    }

    #[test]
    fn concurrent_producer_consumer() {
        use std::sync::mpsc;

        let pool: ObjectPool<u64> = ObjectPool::new(64);
        let (tx, rx) = mpsc::channel::<u32>();

        std::thread::scope(|s| {
            let pool_ref = &pool;
            s.spawn(move || {
                let mut sum = 0u64;
                for _ in 0..10_000 {
                    let idx = rx.recv().unwrap();
                    sum += unsafe { pool_ref.take(idx) };
                }
                assert_eq!(sum, (0..10_000u64).sum());
            });

            for i in 0..10_000u64 {
                loop {
                    match pool.allocate(i) {
                        Ok(idx) => {
                            tx.send(idx).unwrap();
                            break;
                        }
                        Err(_) => std::thread::yield_now(),
                    }
                }
            }
        });

        assert_eq!(pool.available(), 64);
    }
}
