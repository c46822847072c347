//! Stream a file to stdout through the reactor.
//!
//! Usage: cargo run --example cat -- <path>

use std::future::Future;
use std::os::fd::AsRawFd;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::Thread;

use ringlet::{Config, Reactor};

struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let waker = Waker::from(Arc::new(ThreadWaker(std::thread::current())));
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(out) => return out,
            Poll::Pending => std::thread::park(),
        }
    }
}

fn main() -> Result<(), ringlet::Error> {
    let path = std::env::args().nth(1).unwrap_or("/etc/hostname".into());
    let file = std::fs::File::open(&path).map_err(ringlet::Error::Io)?;

    let reactor = Reactor::new(Config::default())?;
    let mut buf = [0u8; 4096];
    let mut offset = 0u64;

    loop {
        let n = block_on(reactor.read(file.as_raw_fd(), &mut buf, offset));
        if n < 0 {
            eprintln!("read failed: {}", std::io::Error::from_raw_os_error(-n));
            break;
        }
        if n == 0 {
            break;
        }
        let written = block_on(reactor.write(libc::STDOUT_FILENO, &buf[..n as usize], 0));
        if written < 0 {
            eprintln!("write failed: {}", std::io::Error::from_raw_os_error(-written));
            break;
        }
        offset += n as u64;
    }

    reactor.request_stop();
    reactor.run();
    Ok(())
}
