//! Sendable tasks: bidirectional generators.
//!
//! A sendable task is a suspended computation the caller feeds values into.
//! The task body receives an [`Inbox`] and awaits [`Inbox::recv`] whenever
//! it needs the next value; the caller drives it with
//! [`SendableTask::resume`], which either reports another suspension
//! ([`Step::Yielded`], "need more input") or the body's final result.
//! Dropping the task cancels it by unwinding the suspended future.
//!
//! The exchange is a single-threaded mailbox: no channels, no executor. The
//! streaming HTTP parser in `ringlet-http` is the canonical consumer, with
//! socket chunks as the resume values.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// Outcome of one [`SendableTask::resume`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum Step<Y> {
    /// The body suspended awaiting another value.
    Yielded,
    /// The body returned.
    Complete(Y),
}

/// Receiving half handed to the task body.
pub struct Inbox<R> {
    mailbox: Rc<RefCell<Option<R>>>,
}

impl<R> Inbox<R> {
    /// Suspend until the driver supplies the next value.
    pub fn recv(&self) -> Recv<'_, R> {
        Recv {
            mailbox: &self.mailbox,
        }
    }
}

/// Future returned by [`Inbox::recv`].
pub struct Recv<'a, R> {
    mailbox: &'a Rc<RefCell<Option<R>>>,
}

impl<R> Future for Recv<'_, R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<R> {
        match self.mailbox.borrow_mut().take() {
            Some(value) => Poll::Ready(value),
            None => Poll::Pending,
        }
    }
}

/// A coroutine driven by externally supplied values.
pub struct SendableTask<R, Y> {
    future: Pin<Box<dyn Future<Output = Y>>>,
    mailbox: Rc<RefCell<Option<R>>>,
    finished: bool,
}

impl<R, Y> SendableTask<R, Y> {
    /// Construct a task from its body. The body runs lazily: nothing
    /// executes until the first [`resume`](Self::resume).
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Inbox<R>) -> Fut,
        Fut: Future<Output = Y> + 'static,
    {
        let mailbox = Rc::new(RefCell::new(None));
        let inbox = Inbox {
            mailbox: Rc::clone(&mailbox),
        };
        SendableTask {
            future: Box::pin(body(inbox)),
            mailbox,
            finished: false,
        }
    }

    /// Deliver `value` and pump the body until its next suspension or
    /// completion.
    ///
    /// # Panics
    ///
    /// Panics when called on a finished task.
    pub fn resume(&mut self, value: R) -> Step<Y> {
        assert!(!self.finished, "resumed a finished task");
        *self.mailbox.borrow_mut() = Some(value);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => {
                self.finished = true;
                Step::Complete(output)
            }
            Poll::Pending => Step::Yielded,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

// Resumption is driven solely by `resume`; the waker never fires.
const NOOP_VTABLE: RawWakerVTable = RawWakerVTable::new(
    |_| RawWaker::new(std::ptr::null(), &NOOP_VTABLE),
    |_| {},
    |_| {},
    |_| {},
);

fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &NOOP_VTABLE)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_until_zero() {
        let mut task = SendableTask::new(|inbox: Inbox<u32>| async move {
            let mut total = 0u32;
            loop {
                let n = inbox.recv().await;
                if n == 0 {
                    return total;
                }
                total += n;
            }
        });

        assert_eq!(task.resume(3), Step::Yielded);
        assert_eq!(task.resume(4), Step::Yielded);
        assert_eq!(task.resume(0), Step::Complete(7));
        assert!(task.is_finished());
    }

    #[test]
    fn first_resume_runs_body_prefix() {
        let mut task = SendableTask::new(|inbox: Inbox<&str>| async move {
            // Runs on the first resume, before the first recv.
            let first = inbox.recv().await;
            first.len()
        });
        assert_eq!(task.resume("hello"), Step::Complete(5));
    }

    #[test]
    fn completes_without_consuming_value() {
        let mut task = SendableTask::new(|_inbox: Inbox<u8>| async move { 42u8 });
        assert_eq!(task.resume(0), Step::Complete(42));
    }

    #[test]
    #[should_panic(expected = "resumed a finished task")]
    fn resume_after_finish_panics() {
        let mut task = SendableTask::new(|_inbox: Inbox<u8>| async move { 0u8 });
        let _ = task.resume(1);
        let _ = task.resume(2);
    }

    #[test]
    fn drop_cancels_suspended_body() {
        struct SetOnDrop(Rc<RefCell<bool>>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                *self.0.borrow_mut() = true;
            }
        }

        let dropped = Rc::new(RefCell::new(false));
        let guard = SetOnDrop(Rc::clone(&dropped));
        let mut task = SendableTask::new(move |inbox: Inbox<u8>| async move {
            let _guard = guard;
            loop {
                inbox.recv().await;
            }
        });
        assert_eq!(task.resume(1), Step::Yielded);
        assert!(!*dropped.borrow());
        drop(task);
        assert!(*dropped.borrow());
    }
}
