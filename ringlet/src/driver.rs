//! The driver loop: sole owner of the ring and the user-data pool.
//!
//! One iteration: block in `submit_and_wait` until at least one CQE (an I/O
//! completion or the eventfd permit read), reap every available completion,
//! re-arm the eventfd if it was consumed, then prepare up to `submit_batch`
//! queued submissions. The loop exits once stop was requested, the queue is
//! empty, and nothing is in flight.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use io_uring::opcode;
use io_uring::types::{Fd, Timespec};

use crate::completion::{OpTag, UserData};
use crate::config::Config;
use crate::metrics;
use crate::op::{OpUserData, SubmitRequest};
use crate::pool::ObjectPool;
use crate::reactor::Shared;
use crate::ring::Ring;

pub(crate) struct Driver {
    ring: Ring,
    pool: ObjectPool<OpUserData>,
    rx: Receiver<SubmitRequest>,
    shared: Arc<Shared>,
    eventfd_buf: [u8; 8],
    /// Pre-allocated batch buffer for draining CQEs: (user_data, result, flags).
    cqe_batch: Vec<(u64, i32, u32)>,
    /// User-data blocks outstanding (one per plain SQE, two per linked pair).
    in_flight: usize,
    submit_batch: usize,
}

impl Driver {
    pub(crate) fn new(
        config: &Config,
        ring: Ring,
        rx: Receiver<SubmitRequest>,
        shared: Arc<Shared>,
    ) -> Driver {
        Driver {
            ring,
            pool: ObjectPool::new(config.user_data_slots),
            rx,
            shared,
            eventfd_buf: [0u8; 8],
            cqe_batch: Vec::with_capacity(config.sq_entries as usize * 4),
            in_flight: 0,
            submit_batch: config.submit_batch as usize,
        }
    }

    pub(crate) fn run(&mut self) {
        self.arm_eventfd();
        loop {
            if self.shared.stopping() && self.rx.is_empty() && self.in_flight == 0 {
                break;
            }
            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                // CQ pressure: fall through and reap.
                Err(e) if e.raw_os_error() == Some(libc::EBUSY) => {}
                // Ring wedged: bail without the clean-teardown accounting.
                Err(_) => return,
            }
            if self.reap() {
                self.arm_eventfd();
            }
            self.drain_queue();
            if !self.rx.is_empty() {
                // More than one batch was queued behind a single permit;
                // self-notify so the next wait returns immediately.
                self.shared.notify();
            }
        }
        // Anything still queued raced past the accepting flag; dropping the
        // requests cancels their operations.
        while let Ok(request) = self.rx.try_recv() {
            drop(request);
        }
        debug_assert_eq!(self.pool.available(), self.pool.capacity());
    }

    /// Push the internal eventfd read. Its CQE is the driver's wakeup signal.
    fn arm_eventfd(&mut self) {
        let entry = opcode::Read::new(
            Fd(self.shared.eventfd()),
            self.eventfd_buf.as_mut_ptr(),
            self.eventfd_buf.len() as u32,
        )
        .build()
        .user_data(UserData::encode(OpTag::EventFd, 0).raw());
        let _ = unsafe { self.ring.push(entry) };
    }

    /// Drain every available CQE. Returns true when the eventfd read
    /// completed and must be re-armed.
    fn reap(&mut self) -> bool {
        self.cqe_batch.clear();
        self.ring.drain_completions(&mut self.cqe_batch);

        let mut rearm_eventfd = false;
        for &(user_data, res, flags) in &self.cqe_batch {
            metrics::CQE_PROCESSED.increment();
            let ud = UserData(user_data);
            match ud.tag() {
                Some(OpTag::EventFd) => rearm_eventfd = true,
                Some(OpTag::Io) => {
                    match unsafe { self.pool.take(ud.slot()) } {
                        OpUserData::Io(slot) => slot.complete(res, flags),
                        OpUserData::LinkTimeout { .. } => {
                            debug_assert!(false, "Io tag on a timeout block");
                        }
                    }
                    self.in_flight -= 1;
                    metrics::OPS_IN_FLIGHT.decrement();
                }
                Some(OpTag::LinkTimeout) => {
                    // No completion semantics of its own: free the block
                    // (and the timespec it owns) and move on.
                    let _ = unsafe { self.pool.take(ud.slot()) };
                    if res == -libc::ETIME {
                        metrics::LINK_TIMEOUTS_FIRED.increment();
                    }
                    self.in_flight -= 1;
                    metrics::OPS_IN_FLIGHT.decrement();
                }
                None => {}
            }
        }
        rearm_eventfd
    }

    fn drain_queue(&mut self) {
        for _ in 0..self.submit_batch {
            match self.rx.try_recv() {
                Ok(request) => self.submit_request(request),
                Err(_) => break,
            }
        }
    }

    fn submit_request(&mut self, request: SubmitRequest) {
        let parts = request.into_parts();
        let idx = self.allocate(OpUserData::Io(Arc::clone(&parts.slot)));
        let entry = parts
            .prepare
            .build()
            .user_data(UserData::encode(OpTag::Io, idx).raw());

        let pushed = match parts.deadline {
            None => unsafe { self.ring.push(entry) },
            Some(after) => {
                let ts = Box::new(
                    Timespec::new()
                        .sec(after.as_secs())
                        .nsec(after.subsec_nanos()),
                );
                let ts_ptr: *const Timespec = &*ts;
                let t_idx = self.allocate(OpUserData::LinkTimeout { _ts: ts });
                let timeout_entry = opcode::LinkTimeout::new(ts_ptr)
                    .build()
                    .user_data(UserData::encode(OpTag::LinkTimeout, t_idx).raw());
                let pushed = unsafe { self.ring.push_linked(entry, timeout_entry) };
                match pushed {
                    Ok(()) => {
                        self.in_flight += 1;
                        metrics::OPS_IN_FLIGHT.increment();
                        metrics::SQE_SUBMITTED.increment();
                    }
                    Err(_) => {
                        let _ = unsafe { self.pool.take(t_idx) };
                    }
                }
                pushed
            }
        };

        match pushed {
            Ok(()) => {
                self.in_flight += 1;
                metrics::OPS_IN_FLIGHT.increment();
                metrics::SQE_SUBMITTED.increment();
            }
            Err(_) => {
                // The SQE could not be placed even after a flush; cancel
                // the operation rather than wedge the caller.
                if let OpUserData::Io(slot) = unsafe { self.pool.take(idx) } {
                    slot.complete(-libc::ECANCELED, 0);
                }
            }
        }
    }

    /// Allocate a user-data block, reaping completions while the pool is
    /// exhausted. Exhaustion with nothing in flight means no completion can
    /// ever free a slot; that is a programmer error.
    fn allocate(&mut self, value: OpUserData) -> u32 {
        let mut value = value;
        loop {
            match self.pool.allocate(value) {
                Ok(idx) => return idx,
                Err(returned) => {
                    value = returned;
                    metrics::POOL_EXHAUSTED_SPINS.increment();
                    assert!(
                        self.in_flight > 0,
                        "user-data pool exhausted with nothing in flight"
                    );
                    let _ = self.ring.submit();
                    if self.reap() {
                        self.arm_eventfd();
                    }
                    std::thread::yield_now();
                }
            }
        }
    }
}
