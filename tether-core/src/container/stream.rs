//! Change Streams
//!
//! Each call to [`StateNotifier::stream`](super::StateNotifier::stream)
//! creates an independent subscriber with its own buffer. Subscribers only
//! see changes made after they subscribed. The stream ends once the
//! notifier is disposed and the buffer has been drained.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use futures_util::stream::{FusedStream, Stream};

struct Shared<T> {
    queue: VecDeque<T>,
    waker: Option<Waker>,
    closed: bool,
}

/// A stream of the values a notifier takes on.
pub struct ChangeStream<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

/// The notifier's end of a [`ChangeStream`].
pub(crate) struct StreamSink<T> {
    shared: Weak<RefCell<Shared<T>>>,
}

pub(crate) fn channel<T>() -> (StreamSink<T>, ChangeStream<T>) {
    let shared = Rc::new(RefCell::new(Shared {
        queue: VecDeque::new(),
        waker: None,
        closed: false,
    }));
    let sink = StreamSink {
        shared: Rc::downgrade(&shared),
    };
    (sink, ChangeStream { shared })
}

impl<T> StreamSink<T> {
    /// Queue `value`. Returns false once the stream has been dropped.
    pub(crate) fn push(&self, value: T) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let waker = {
            let mut shared = shared.borrow_mut();
            shared.queue.push_back(value);
            shared.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    pub(crate) fn close(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let waker = {
            let mut shared = shared.borrow_mut();
            shared.closed = true;
            shared.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<T> ChangeStream<T> {
    /// Number of changes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.shared.borrow().queue.len()
    }

    /// Whether the notifier behind this stream was disposed.
    pub fn is_closed(&self) -> bool {
        self.shared.borrow().closed
    }
}

impl<T> Stream for ChangeStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut shared = self.shared.borrow_mut();
        if let Some(value) = shared.queue.pop_front() {
            return Poll::Ready(Some(value));
        }
        if shared.closed {
            return Poll::Ready(None);
        }
        shared.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> FusedStream for ChangeStream<T> {
    fn is_terminated(&self) -> bool {
        let shared = self.shared.borrow();
        shared.closed && shared.queue.is_empty()
    }
}
