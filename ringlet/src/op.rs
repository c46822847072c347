//! I/O operation futures.
//!
//! Each operation is described by a [`RingOp`]: a prepare step that maps its
//! parameters onto one SQE, and a completion step that interprets the raw
//! CQE result. [`Submit`] carries a `RingOp` through the reactor: the first
//! poll publishes a submission request (waker + result slot + prepare) and
//! parks; the driver pokes the slot and wakes; a later poll observes the
//! result. [`LinkTimeout`] attaches a deadline by linking a timeout SQE
//! behind the operation's SQE.

use std::future::Future;
use std::io::{IoSlice, IoSliceMut};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicU32, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use io_uring::types::Timespec;
use io_uring::{opcode, squeue, types::Fd};

use crate::reactor::Reactor;

// ── Completion slot ─────────────────────────────────────────────────────

const PENDING: u8 = 0;
const COMPLETE: u8 = 1;

/// Shared result storage for one in-flight operation.
///
/// The driver writes the CQE result and flags, publishes with a release
/// store on `state`, then wakes the registered waker. The future reads the
/// state with an acquire load, so the result fields are visible once
/// `COMPLETE` is observed.
pub(crate) struct CqeSlot {
    state: AtomicU8,
    res: AtomicI32,
    flags: AtomicU32,
    waker: Mutex<Option<Waker>>,
}

impl CqeSlot {
    fn new() -> Self {
        CqeSlot {
            state: AtomicU8::new(PENDING),
            res: AtomicI32::new(0),
            flags: AtomicU32::new(0),
            waker: Mutex::new(None),
        }
    }

    /// Driver side: store the result and wake the suspended future.
    pub(crate) fn complete(&self, res: i32, flags: u32) {
        self.res.store(res, Ordering::Relaxed);
        self.flags.store(flags, Ordering::Relaxed);
        self.state.store(COMPLETE, Ordering::Release);
        let waker = self.waker.lock().unwrap().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn set_waker(&self, waker: Waker) {
        *self.waker.lock().unwrap() = Some(waker);
    }

    fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETE
    }

    fn result(&self) -> (i32, u32) {
        (self.res.load(Ordering::Relaxed), self.flags.load(Ordering::Relaxed))
    }

    fn poll_result(&self, cx: &mut Context<'_>) -> Poll<(i32, u32)> {
        if self.is_complete() {
            return Poll::Ready(self.result());
        }
        self.set_waker(cx.waker().clone());
        // Re-check: the driver may have completed between the first check
        // and the waker store.
        if self.is_complete() {
            return Poll::Ready(self.result());
        }
        Poll::Pending
    }
}

// ── Submission request ──────────────────────────────────────────────────

/// Description of one SQE, consumed exactly once by the driver.
///
/// Constructing a `Prepare` is safe; only submission gives the kernel
/// access to the referenced memory, and every submission path is either
/// checked (the concrete ops borrow their buffers) or `unsafe`
/// ([`Reactor::prepare`]).
pub enum Prepare {
    Read {
        fd: RawFd,
        buf: *mut u8,
        len: u32,
        offset: u64,
    },
    Write {
        fd: RawFd,
        buf: *const u8,
        len: u32,
        offset: u64,
    },
    Readv {
        fd: RawFd,
        iovs: *const libc::iovec,
        nr: u32,
        offset: u64,
    },
    Writev {
        fd: RawFd,
        iovs: *const libc::iovec,
        nr: u32,
        offset: u64,
    },
    Accept {
        fd: RawFd,
        addr: *mut libc::sockaddr,
        addrlen: *mut libc::socklen_t,
        flags: i32,
    },
    Connect {
        fd: RawFd,
        addr: *const libc::sockaddr,
        addrlen: libc::socklen_t,
    },
    Custom(Box<dyn FnOnce() -> squeue::Entry + Send>),
}

// Safety: the pointers come from buffers borrowed by the originating
// future, which keeps them valid until the completion is delivered (see
// `Submit::drop`). The driver thread only dereferences them through the
// kernel.
unsafe impl Send for Prepare {}

impl Prepare {
    /// Build the SQE. The driver stamps the user_data afterwards.
    pub(crate) fn build(self) -> squeue::Entry {
        match self {
            Prepare::Read { fd, buf, len, offset } => {
                opcode::Read::new(Fd(fd), buf, len).offset(offset).build()
            }
            Prepare::Write { fd, buf, len, offset } => {
                opcode::Write::new(Fd(fd), buf, len).offset(offset).build()
            }
            Prepare::Readv { fd, iovs, nr, offset } => {
                opcode::Readv::new(Fd(fd), iovs, nr).offset(offset).build()
            }
            Prepare::Writev { fd, iovs, nr, offset } => {
                opcode::Writev::new(Fd(fd), iovs, nr).offset(offset).build()
            }
            Prepare::Accept { fd, addr, addrlen, flags } => {
                opcode::Accept::new(Fd(fd), addr, addrlen).flags(flags).build()
            }
            Prepare::Connect { fd, addr, addrlen } => {
                opcode::Connect::new(Fd(fd), addr, addrlen).build()
            }
            Prepare::Custom(build) => build(),
        }
    }
}

/// One submission carried from an application thread to the driver.
///
/// A request dropped before the driver prepares it (stop-time teardown, a
/// disconnected queue) cancels its operation so the suspended future is
/// never stranded.
pub(crate) struct SubmitRequest {
    parts: Option<RequestParts>,
}

pub(crate) struct RequestParts {
    pub(crate) prepare: Prepare,
    pub(crate) slot: Arc<CqeSlot>,
    pub(crate) deadline: Option<Duration>,
}

impl SubmitRequest {
    pub(crate) fn new(prepare: Prepare, slot: Arc<CqeSlot>, deadline: Option<Duration>) -> Self {
        SubmitRequest {
            parts: Some(RequestParts {
                prepare,
                slot,
                deadline,
            }),
        }
    }

    pub(crate) fn into_parts(mut self) -> RequestParts {
        self.parts.take().expect("submission consumed twice")
    }
}

impl Drop for SubmitRequest {
    fn drop(&mut self) {
        if let Some(parts) = self.parts.take() {
            parts.slot.complete(-libc::ECANCELED, 0);
        }
    }
}

/// Tagged user-data block held in the pool for each in-flight SQE.
pub(crate) enum OpUserData {
    /// An application operation: the shared completion slot.
    Io(Arc<CqeSlot>),
    /// The timeout half of a linked pair. Owns the timespec its SQE points
    /// at; recognised and dropped when the CQE arrives.
    LinkTimeout { _ts: Box<Timespec> },
}

// ── RingOp ──────────────────────────────────────────────────────────────

/// One ring operation: a prepare step producing its SQE description and a
/// completion step interpreting the raw result code.
pub trait RingOp {
    type Output;

    /// Describe the SQE. Called exactly once, immediately before submission.
    fn prepare(&mut self) -> Prepare;

    /// Interpret the signed CQE result. The reactor itself never interprets
    /// result codes; kernel conventions pass through untouched.
    fn complete(&mut self, res: i32, flags: u32) -> Self::Output;
}

/// Read into a borrowed buffer (`IORING_OP_READ`).
pub struct ReadOp<'a> {
    fd: RawFd,
    buf: &'a mut [u8],
    offset: u64,
}

impl RingOp for ReadOp<'_> {
    type Output = i32;

    fn prepare(&mut self) -> Prepare {
        Prepare::Read {
            fd: self.fd,
            buf: self.buf.as_mut_ptr(),
            len: self.buf.len() as u32,
            offset: self.offset,
        }
    }

    fn complete(&mut self, res: i32, _flags: u32) -> i32 {
        res
    }
}

/// Write from a borrowed buffer (`IORING_OP_WRITE`).
pub struct WriteOp<'a> {
    fd: RawFd,
    buf: &'a [u8],
    offset: u64,
}

impl RingOp for WriteOp<'_> {
    type Output = i32;

    fn prepare(&mut self) -> Prepare {
        Prepare::Write {
            fd: self.fd,
            buf: self.buf.as_ptr(),
            len: self.buf.len() as u32,
            offset: self.offset,
        }
    }

    fn complete(&mut self, res: i32, _flags: u32) -> i32 {
        res
    }
}

/// Vectored read (`IORING_OP_READV`).
pub struct ReadvOp<'a> {
    fd: RawFd,
    bufs: &'a mut [IoSliceMut<'a>],
    offset: u64,
}

impl RingOp for ReadvOp<'_> {
    type Output = i32;

    fn prepare(&mut self) -> Prepare {
        Prepare::Readv {
            fd: self.fd,
            // IoSliceMut is ABI-compatible with iovec.
            iovs: self.bufs.as_ptr() as *const libc::iovec,
            nr: self.bufs.len() as u32,
            offset: self.offset,
        }
    }

    fn complete(&mut self, res: i32, _flags: u32) -> i32 {
        res
    }
}

/// Vectored write (`IORING_OP_WRITEV`).
pub struct WritevOp<'a> {
    fd: RawFd,
    bufs: &'a [IoSlice<'a>],
    offset: u64,
}

impl RingOp for WritevOp<'_> {
    type Output = i32;

    fn prepare(&mut self) -> Prepare {
        Prepare::Writev {
            fd: self.fd,
            iovs: self.bufs.as_ptr() as *const libc::iovec,
            nr: self.bufs.len() as u32,
            offset: self.offset,
        }
    }

    fn complete(&mut self, res: i32, _flags: u32) -> i32 {
        res
    }
}

/// Peer address storage for an accept. Boxed so its address survives moves
/// of the future between polls.
struct AcceptAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

/// Accept one connection (`IORING_OP_ACCEPT`). Resolves to the new
/// descriptor (or negated errno) and the decoded peer address.
pub struct AcceptOp {
    fd: RawFd,
    flags: i32,
    addr: Box<AcceptAddr>,
}

impl RingOp for AcceptOp {
    type Output = (i32, Option<SocketAddr>);

    fn prepare(&mut self) -> Prepare {
        self.addr.len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        Prepare::Accept {
            fd: self.fd,
            addr: &mut self.addr.storage as *mut _ as *mut libc::sockaddr,
            addrlen: &mut self.addr.len,
            flags: self.flags,
        }
    }

    fn complete(&mut self, res: i32, _flags: u32) -> Self::Output {
        let peer = if res >= 0 {
            sockaddr_to_socket_addr(&self.addr.storage, self.addr.len as u32)
        } else {
            None
        };
        (res, peer)
    }
}

/// Destination address storage for a connect. Boxed so its address
/// survives moves of the future between polls.
struct ConnectAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

/// Connect a socket to a remote address (`IORING_OP_CONNECT`). Resolves to
/// `0` on success, or a negated errno.
pub struct ConnectOp {
    fd: RawFd,
    addr: Box<ConnectAddr>,
}

impl RingOp for ConnectOp {
    type Output = i32;

    fn prepare(&mut self) -> Prepare {
        Prepare::Connect {
            fd: self.fd,
            addr: &self.addr.storage as *const _ as *const libc::sockaddr,
            addrlen: self.addr.len,
        }
    }

    fn complete(&mut self, res: i32, _flags: u32) -> i32 {
        res
    }
}

/// Caller-built SQE. See [`Reactor::prepare`].
pub struct CustomOp {
    build: Option<Box<dyn FnOnce() -> squeue::Entry + Send>>,
}

impl RingOp for CustomOp {
    type Output = i32;

    fn prepare(&mut self) -> Prepare {
        Prepare::Custom(self.build.take().expect("custom op prepared twice"))
    }

    fn complete(&mut self, res: i32, _flags: u32) -> i32 {
        res
    }
}

// ── Futures ─────────────────────────────────────────────────────────────

enum SubmitState {
    Unsent,
    InFlight(Arc<CqeSlot>),
    Done,
}

/// Future for one submitted ring operation.
///
/// At most one submission is ever in flight per future. Dropping the future
/// while its operation is in flight blocks until the completion is
/// delivered: the buffers the SQE references stay borrowed for the kernel's
/// whole write window. Wrap the operation in [`Submit::timeout`] when it
/// must be cancellable.
pub struct Submit<'r, O: RingOp> {
    reactor: &'r Reactor,
    op: O,
    deadline: Option<Duration>,
    state: SubmitState,
}

impl<'r, O: RingOp> Submit<'r, O> {
    pub(crate) fn new(reactor: &'r Reactor, op: O) -> Self {
        Submit {
            reactor,
            op,
            deadline: None,
            state: SubmitState::Unsent,
        }
    }

    /// Attach a deadline: the operation's SQE is linked to a timeout SQE
    /// and is cancelled by the kernel if it has not completed within
    /// `after`. Must be called before the first poll.
    pub fn timeout(mut self, after: Duration) -> LinkTimeout<'r, O> {
        self.deadline = Some(after);
        LinkTimeout { inner: self }
    }

    fn poll_raw(&mut self, cx: &mut Context<'_>) -> Poll<(i32, u32)> {
        match &self.state {
            SubmitState::Done => panic!("operation polled after completion"),
            SubmitState::Unsent => {
                let slot = Arc::new(CqeSlot::new());
                // Register before publishing so a completion delivered
                // before we return cannot miss the wake.
                slot.set_waker(cx.waker().clone());
                let request =
                    SubmitRequest::new(self.op.prepare(), Arc::clone(&slot), self.deadline);
                if !self.reactor.submit(request) {
                    self.state = SubmitState::Done;
                    return Poll::Ready((-libc::ECANCELED, 0));
                }
                self.state = SubmitState::InFlight(slot);
                Poll::Pending
            }
            SubmitState::InFlight(slot) => match slot.poll_result(cx) {
                Poll::Ready(result) => {
                    self.state = SubmitState::Done;
                    Poll::Ready(result)
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<O: RingOp + Unpin> Future for Submit<'_, O> {
    type Output = O::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<O::Output> {
        let this = self.get_mut();
        match this.poll_raw(cx) {
            Poll::Ready((res, flags)) => Poll::Ready(this.op.complete(res, flags)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<O: RingOp> Drop for Submit<'_, O> {
    fn drop(&mut self) {
        if let SubmitState::InFlight(slot) = &self.state {
            // The SQE references this future's borrows; they must outlive
            // the kernel's use of them.
            while !slot.is_complete() {
                std::thread::yield_now();
            }
        }
    }
}

/// Future for an operation with a linked timeout.
///
/// Resolves to `None` when the kernel reports the operation cancelled
/// (`-ECANCELED`, the deadline fired first), otherwise to the inner
/// operation's completion.
pub struct LinkTimeout<'r, O: RingOp> {
    inner: Submit<'r, O>,
}

impl<O: RingOp + Unpin> Future for LinkTimeout<'_, O> {
    type Output = Option<O::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<O::Output>> {
        let this = self.get_mut();
        match this.inner.poll_raw(cx) {
            Poll::Ready((res, _flags)) if res == -libc::ECANCELED => Poll::Ready(None),
            Poll::Ready((res, flags)) => Poll::Ready(Some(this.inner.op.complete(res, flags))),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ── Reactor constructors ────────────────────────────────────────────────

impl Reactor {
    /// Read from `fd` at `offset` into `buf`. Resolves to the number of
    /// bytes read, or a negated errno. Pass offset `0` for pipes and
    /// sockets.
    pub fn read<'r, 'a>(
        &'r self,
        fd: RawFd,
        buf: &'a mut [u8],
        offset: u64,
    ) -> Submit<'r, ReadOp<'a>> {
        Submit::new(self, ReadOp { fd, buf, offset })
    }

    /// Write `buf` to `fd` at `offset`. Resolves to the number of bytes
    /// written, or a negated errno.
    pub fn write<'r, 'a>(
        &'r self,
        fd: RawFd,
        buf: &'a [u8],
        offset: u64,
    ) -> Submit<'r, WriteOp<'a>> {
        Submit::new(self, WriteOp { fd, buf, offset })
    }

    /// Vectored read into `bufs`.
    pub fn readv<'r, 'a>(
        &'r self,
        fd: RawFd,
        bufs: &'a mut [IoSliceMut<'a>],
        offset: u64,
    ) -> Submit<'r, ReadvOp<'a>> {
        Submit::new(self, ReadvOp { fd, bufs, offset })
    }

    /// Vectored write from `bufs`.
    pub fn writev<'r, 'a>(
        &'r self,
        fd: RawFd,
        bufs: &'a [IoSlice<'a>],
        offset: u64,
    ) -> Submit<'r, WritevOp<'a>> {
        Submit::new(self, WritevOp { fd, bufs, offset })
    }

    /// Accept one connection on a listening socket. `flags` are accept4(2)
    /// flags (e.g. `SOCK_CLOEXEC`); pass `0` for none.
    pub fn accept(&self, fd: RawFd, flags: i32) -> Submit<'_, AcceptOp> {
        let addr = Box::new(AcceptAddr {
            storage: unsafe { std::mem::zeroed() },
            len: 0,
        });
        Submit::new(self, AcceptOp { fd, flags, addr })
    }

    /// Connect `fd` to `addr`. Resolves to `0` on success, or a negated
    /// errno.
    pub fn connect(&self, fd: RawFd, addr: SocketAddr) -> Submit<'_, ConnectOp> {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let len = socket_addr_to_sockaddr(addr, &mut storage);
        Submit::new(
            self,
            ConnectOp {
                fd,
                addr: Box::new(ConnectAddr { storage, len }),
            },
        )
    }

    /// Submit a caller-built SQE. `build` is invoked exactly once, on the
    /// driver thread, to produce the entry; the driver stamps the user_data
    /// afterwards. Resolves to the raw CQE result.
    ///
    /// # Safety
    ///
    /// Any memory the entry references must remain valid until the future
    /// resolves or is dropped.
    pub unsafe fn prepare<F>(&self, build: F) -> Submit<'_, CustomOp>
    where
        F: FnOnce() -> squeue::Entry + Send + 'static,
    {
        Submit::new(
            self,
            CustomOp {
                build: Some(Box::new(build)),
            },
        )
    }
}

// ── sockaddr conversion ─────────────────────────────────────────────────

/// Write a SocketAddr into a sockaddr_storage, return the address length.
pub(crate) fn socket_addr_to_sockaddr(
    addr: SocketAddr,
    storage: &mut libc::sockaddr_storage,
) -> libc::socklen_t {
    // Zero the storage to avoid uninitialised padding bytes.
    unsafe {
        std::ptr::write_bytes(
            storage as *mut _ as *mut u8,
            0,
            std::mem::size_of::<libc::sockaddr_storage>(),
        );
    }
    match addr {
        SocketAddr::V4(v4) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in;
            unsafe {
                (*sa).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sa).sin_port = v4.port().to_be();
                (*sa).sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            }
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        }
        SocketAddr::V6(v6) => {
            let sa = storage as *mut _ as *mut libc::sockaddr_in6;
            unsafe {
                (*sa).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sa).sin6_port = v6.port().to_be();
                (*sa).sin6_flowinfo = v6.flowinfo();
                (*sa).sin6_addr.s6_addr = v6.ip().octets();
                (*sa).sin6_scope_id = v6.scope_id();
            }
            std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t
        }
    }
}

/// Convert a libc sockaddr_storage to a std SocketAddr.
pub(crate) fn sockaddr_to_socket_addr(
    addr: &libc::sockaddr_storage,
    len: u32,
) -> Option<SocketAddr> {
    match addr.ss_family as libc::c_int {
        libc::AF_INET if len >= std::mem::size_of::<libc::sockaddr_in>() as u32 => {
            let sa = unsafe { &*(addr as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr));
            let port = u16::from_be(sa.sin_port);
            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        libc::AF_INET6 if len >= std::mem::size_of::<libc::sockaddr_in6>() as u32 => {
            let sa = unsafe { &*(addr as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sa.sin6_addr.s6_addr);
            let port = u16::from_be(sa.sin6_port);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                sa.sin6_flowinfo,
                sa.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_completes_once() {
        let slot = CqeSlot::new();
        assert!(!slot.is_complete());
        slot.complete(42, 7);
        assert!(slot.is_complete());
        assert_eq!(slot.result(), (42, 7));
    }

    #[test]
    fn decode_v4_sockaddr() {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let sa = &mut storage as *mut _ as *mut libc::sockaddr_in;
        unsafe {
            (*sa).sin_family = libc::AF_INET as libc::sa_family_t;
            (*sa).sin_port = 8080u16.to_be();
            (*sa).sin_addr.s_addr = u32::from_ne_bytes([127, 0, 0, 1]);
        }
        let decoded = sockaddr_to_socket_addr(
            &storage,
            std::mem::size_of::<libc::sockaddr_in>() as u32,
        );
        assert_eq!(decoded, Some("127.0.0.1:8080".parse().unwrap()));
    }

    #[test]
    fn decode_unknown_family() {
        let storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        assert_eq!(sockaddr_to_socket_addr(&storage, 128), None);
    }

    #[test]
    fn sockaddr_round_trips_v4_and_v6() {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        for addr in ["127.0.0.1:8080", "[::1]:443"] {
            let addr: SocketAddr = addr.parse().unwrap();
            let len = socket_addr_to_sockaddr(addr, &mut storage);
            assert_eq!(sockaddr_to_socket_addr(&storage, len as u32), Some(addr));
        }
    }
}
