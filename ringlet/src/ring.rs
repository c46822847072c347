use std::io;

use io_uring::{IoUring, squeue};

use crate::config::Config;

/// Wrapper around IoUring providing SQE push helpers with flush-on-full
/// retry. The ring is owned and mutated by the driver thread only.
pub(crate) struct Ring {
    ring: IoUring,
}

impl Ring {
    /// Create and configure the io_uring instance.
    pub(crate) fn setup(config: &Config) -> io::Result<Self> {
        let ring = IoUring::builder().build(config.sq_entries)?;
        Ok(Ring { ring })
    }

    /// Push an SQE to the submission queue.
    ///
    /// If the SQ is full, pending entries are submitted to make room and the
    /// push is retried once.
    ///
    /// # Safety
    /// The SQE must reference valid memory for the lifetime of the operation.
    pub(crate) unsafe fn push(&mut self, entry: squeue::Entry) -> io::Result<()> {
        unsafe {
            if self.ring.submission().push(&entry).is_err() {
                self.ring.submit()?;
                if self.ring.submission().push(&entry).is_err() {
                    return Err(io::Error::other("SQ still full after submit"));
                }
            }
        }
        Ok(())
    }

    /// Push a linked pair of SQEs contiguously.
    ///
    /// Sets `IOSQE_IO_LINK` on the first entry so the kernel attaches the
    /// second (a link-timeout) to it. Flushes first if fewer than two SQ
    /// slots remain, so the pair is never split across a submit boundary.
    ///
    /// # Safety
    /// Both SQEs must reference valid memory for the lifetime of their
    /// operations.
    pub(crate) unsafe fn push_linked(
        &mut self,
        first: squeue::Entry,
        second: squeue::Entry,
    ) -> io::Result<()> {
        let entries = [first.flags(squeue::Flags::IO_LINK), second];

        {
            let sq = self.ring.submission();
            if sq.capacity() - sq.len() < 2 {
                drop(sq);
                self.ring.submit()?;
                let sq = self.ring.submission();
                if sq.capacity() - sq.len() < 2 {
                    return Err(io::Error::other("SQ too small for linked pair"));
                }
            }
        }

        unsafe {
            self.ring
                .submission()
                .push_multiple(&entries)
                .map_err(|_| io::Error::other("SQ full after flush for linked pair"))?;
        }
        Ok(())
    }

    /// Submit pending SQEs without waiting.
    pub(crate) fn submit(&self) -> io::Result<usize> {
        self.ring.submit()
    }

    /// Submit pending SQEs and wait for at least `min_complete` CQEs.
    pub(crate) fn submit_and_wait(&self, min_complete: usize) -> io::Result<usize> {
        self.ring.submitter().submit_and_wait(min_complete)
    }

    /// Drain all currently available CQEs into `batch` as
    /// `(user_data, result, flags)` triples.
    pub(crate) fn drain_completions(&mut self, batch: &mut Vec<(u64, i32, u32)>) {
        for cqe in self.ring.completion() {
            batch.push((cqe.user_data(), cqe.result(), cqe.flags()));
        }
    }
}
