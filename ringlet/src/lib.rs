//! ringlet — a single-threaded io_uring reactor for Linux.
//!
//! ringlet multiplexes futures onto io_uring submission/completion queues.
//! Application threads publish operations onto a lock-free queue; one
//! background driver thread owns the ring, batches submissions, reaps
//! completions, and wakes the suspended futures.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::os::fd::AsRawFd;
//! use ringlet::{Config, Reactor};
//!
//! fn main() -> Result<(), ringlet::Error> {
//!     let reactor = Reactor::new(Config::default())?;
//!
//!     let file = std::fs::File::open("/etc/hostname").unwrap();
//!     let mut buf = [0u8; 256];
//!     let n = futures_block_on(reactor.read(file.as_raw_fd(), &mut buf, 0));
//!     println!("{}", String::from_utf8_lossy(&buf[..n as usize]));
//!
//!     reactor.request_stop();
//!     reactor.run();
//!     Ok(())
//! }
//! # fn futures_block_on<F: std::future::Future>(_f: F) -> i32 { 0 }
//! ```
//!
//! Operations resolve to the raw signed CQE result; the reactor never
//! interprets kernel return codes. Attach a deadline with
//! [`Submit::timeout`] — the wrapped operation resolves to `None` when the
//! kernel cancels it.
//!
//! # Platform
//!
//! Linux only. Requires io_uring with READ/WRITE/READV/WRITEV/ACCEPT and
//! LINK_TIMEOUT support (kernel 5.6+).

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod completion;
pub(crate) mod driver;
pub(crate) mod pool;
pub(crate) mod queue;
pub(crate) mod ring;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod error;
pub mod metrics;
pub mod op;
pub mod reactor;
pub mod task;

// ── Re-exports ──────────────────────────────────────────────────────────

/// Reactor configuration.
pub use config::Config;
/// Reactor setup errors.
pub use error::Error;
/// Accept one connection.
pub use op::AcceptOp;
/// Connect a socket to a remote address.
pub use op::ConnectOp;
/// Caller-built SQE.
pub use op::CustomOp;
/// Future for an operation with a linked timeout.
pub use op::LinkTimeout;
/// Description of one SQE.
pub use op::Prepare;
/// Read into a borrowed buffer.
pub use op::ReadOp;
/// Vectored read.
pub use op::ReadvOp;
/// One ring operation: prepare + complete steps.
pub use op::RingOp;
/// Future for one submitted ring operation.
pub use op::Submit;
/// Write from a borrowed buffer.
pub use op::WriteOp;
/// Vectored write.
pub use op::WritevOp;
/// The reactor runtime.
pub use reactor::Reactor;
/// Receiving half handed to a sendable-task body.
pub use task::Inbox;
/// A coroutine driven by externally supplied values.
pub use task::SendableTask;
/// Outcome of one resume call.
pub use task::Step;
