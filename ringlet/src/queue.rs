//! Submission queue between application threads and the driver.
//!
//! An unbounded lock-free channel carries the requests (many producers, one
//! consumer); an eventfd carries one permit per push. The driver keeps a
//! read on the eventfd armed in the ring, so a single `submit_and_wait`
//! blocks on both new submissions and I/O completions. Pushes by the same
//! producer are delivered in order; ordering across producers is
//! unspecified.

use std::io;
use std::os::fd::RawFd;

use crossbeam_channel::{Receiver, Sender};

pub(crate) struct SubmitQueue<T> {
    tx: Sender<T>,
    eventfd: RawFd,
}

impl<T> SubmitQueue<T> {
    /// Create the queue and its consumer end. The caller owns the eventfd
    /// and must close it after the consumer has exited.
    pub(crate) fn new() -> io::Result<(SubmitQueue<T>, Receiver<T>)> {
        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            return Err(io::Error::last_os_error());
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        Ok((SubmitQueue { tx, eventfd }, rx))
    }

    /// Enqueue a request and release one permit. Returns false when the
    /// consumer has disconnected (teardown); the request is dropped.
    pub(crate) fn push(&self, value: T) -> bool {
        if self.tx.send(value).is_ok() {
            self.notify();
            true
        } else {
            false
        }
    }

    /// Write one permit to the eventfd, waking the driver.
    pub(crate) fn notify(&self) {
        let val: u64 = 1;
        unsafe {
            libc::write(self.eventfd, &val as *const u64 as *const libc::c_void, 8);
        }
    }

    pub(crate) fn eventfd(&self) -> RawFd {
        self.eventfd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_permits(fd: RawFd) -> u64 {
        let mut buf = [0u8; 8];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, 8) };
        assert_eq!(n, 8);
        u64::from_ne_bytes(buf)
    }

    #[test]
    fn push_delivers_value_and_permit() {
        let (queue, rx) = SubmitQueue::<u32>::new().unwrap();
        assert!(queue.push(7));
        assert!(queue.push(9));

        assert_eq!(rx.try_recv(), Ok(7));
        assert_eq!(rx.try_recv(), Ok(9));
        // eventfd accumulated one count per push
        assert_eq!(read_permits(queue.eventfd()), 2);
        unsafe { libc::close(queue.eventfd()) };
    }

    #[test]
    fn per_producer_order_is_preserved() {
        let (queue, rx) = SubmitQueue::<(usize, u32)>::new().unwrap();

        std::thread::scope(|s| {
            for producer in 0..4usize {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..100u32 {
                        queue.push((producer, i));
                    }
                });
            }
        });

        let mut last = [None::<u32>; 4];
        while let Ok((producer, i)) = rx.try_recv() {
            if let Some(prev) = last[producer] {
                assert!(i > prev, "producer {producer} reordered: {prev} then {i}");
            }
            last[producer] = Some(i);
        }
        for (producer, seen) in last.iter().enumerate() {
            assert_eq!(*seen, Some(99), "producer {producer} incomplete");
        }
        unsafe { libc::close(queue.eventfd()) };
    }
}
