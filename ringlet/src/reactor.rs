//! The reactor: owns the submission queue and the driver thread.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use crate::config::Config;
use crate::driver::Driver;
use crate::error::Error;
use crate::metrics;
use crate::op::SubmitRequest;
use crate::queue::SubmitQueue;
use crate::ring::Ring;

/// State shared between producer threads and the driver.
pub(crate) struct Shared {
    queue: SubmitQueue<SubmitRequest>,
    accepting: AtomicBool,
    stop: AtomicBool,
}

impl Shared {
    pub(crate) fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn eventfd(&self) -> RawFd {
        self.queue.eventfd()
    }

    pub(crate) fn notify(&self) {
        self.queue.notify();
    }
}

/// An io_uring reactor with a single background driver thread.
///
/// Op futures ([`read`](Reactor::read), [`write`](Reactor::write), …)
/// publish submissions onto an MPSC queue; the driver thread multiplexes
/// them onto the ring, reaps completions, and wakes the suspended futures.
/// The ring and the user-data pool are owned exclusively by the driver.
///
/// A `Reactor` is an explicit value, threaded to call sites by reference;
/// [`Reactor::global`] provides a process-wide default for hosts that want
/// one.
pub struct Reactor {
    shared: Arc<Shared>,
    driver: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Reactor {
    /// Set up the ring, spawn the driver thread, and start accepting work.
    pub fn new(config: Config) -> Result<Reactor, Error> {
        config.validate()?;
        let ring = Ring::setup(&config)?;
        let (queue, rx) = SubmitQueue::new()?;
        let shared = Arc::new(Shared {
            queue,
            accepting: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        });

        let mut driver = Driver::new(&config, ring, rx, Arc::clone(&shared));
        let handle = thread::Builder::new()
            .name("ringlet-driver".to_string())
            .spawn(move || driver.run())
            .map_err(|e| Error::DriverStart(e.to_string()))?;

        shared.accepting.store(true, Ordering::Release);
        Ok(Reactor {
            shared,
            driver: Mutex::new(Some(handle)),
        })
    }

    /// The process-wide reactor, created on first use with the default
    /// config. Initialisation failure here is fatal.
    pub fn global() -> &'static Reactor {
        static GLOBAL: OnceLock<Reactor> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Reactor::new(Config::default()).expect("global reactor initialisation failed")
        })
    }

    /// Enqueue one submission. Returns true iff the driver is accepting
    /// work. Safe to call from any thread.
    pub(crate) fn submit(&self, request: SubmitRequest) -> bool {
        if !self.shared.accepting.load(Ordering::Acquire) {
            metrics::SUBMISSIONS_REFUSED.increment();
            return false;
        }
        self.shared.queue.push(request)
    }

    /// Cooperative shutdown: refuse new work, let the driver drain the
    /// queue and in-flight completions, then exit.
    pub fn request_stop(&self) {
        self.shared.accepting.store(false, Ordering::Release);
        self.shared.stop.store(true, Ordering::Release);
        self.shared.queue.notify();
    }

    /// Block until the driver thread has exited. The driver runs in the
    /// background from construction; this merely joins the lifecycle.
    pub fn run(&self) {
        let handle = self.driver.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.request_stop();
        self.run();
        unsafe {
            libc::close(self.shared.eventfd());
        }
    }
}
