//! Cancellable one-shot completion used by asynchronous layout runs.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::channel::oneshot;

#[derive(Default)]
struct CancelState {
	cancelled: Cell<bool>,
	waker: RefCell<Option<Waker>>,
}

/// Cheap handle that can cancel a [`Cancellable`] from elsewhere.
#[derive(Clone)]
pub struct CancelToken {
	state: Rc<CancelState>,
}

impl CancelToken {
	/// Idempotent, and harmless after the completion has already resolved.
	pub fn cancel(&self) {
		if self.state.cancelled.replace(true) {
			return;
		}
		if let Some(waker) = self.state.waker.borrow_mut().take() {
			waker.wake();
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.state.cancelled.get()
	}
}

/// Producer side, held by whoever finishes the work.
pub struct Completer<T> {
	tx: oneshot::Sender<T>,
}

impl<T> Completer<T> {
	pub fn complete(self, value: T) {
		let _ = self.tx.send(value);
	}
}

/// Resolves to `Some(value)` on completion, `None` when cancelled or when the
/// [`Completer`] is dropped without completing.
pub struct Cancellable<T> {
	rx: oneshot::Receiver<T>,
	token: CancelToken,
}

impl<T> Cancellable<T> {
	pub fn token(&self) -> CancelToken {
		self.token.clone()
	}

	pub fn cancel(&self) {
		self.token.cancel();
	}
}

pub fn cancellable<T>() -> (Completer<T>, Cancellable<T>) {
	let (tx, rx) = oneshot::channel();
	let token = CancelToken {
		state: Rc::new(CancelState::default()),
	};
	(Completer { tx }, Cancellable { rx, token })
}

impl<T> Future for Cancellable<T> {
	type Output = Option<T>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		if self.token.is_cancelled() {
			return Poll::Ready(None);
		}
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(Ok(value)) if !self.token.is_cancelled() => Poll::Ready(Some(value)),
			Poll::Ready(_) => Poll::Ready(None),
			Poll::Pending => {
				*self.token.state.waker.borrow_mut() = Some(cx.waker().clone());
				Poll::Pending
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use futures::executor::block_on;

	use super::*;

	#[test]
	fn resolves_with_completed_value() {
		let (completer, completion) = cancellable();
		completer.complete(7);
		assert_eq!(block_on(completion), Some(7));
	}

	#[test]
	fn cancel_wins_over_late_completion() {
		let (completer, completion) = cancellable();
		let token = completion.token();
		token.cancel();
		token.cancel();
		completer.complete(1);
		assert_eq!(block_on(completion), None);
	}

	#[test]
	fn dropped_completer_resolves_to_none() {
		let (completer, completion) = cancellable::<()>();
		drop(completer);
		assert_eq!(block_on(completion), None);
	}

	#[test]
	fn cancel_after_completion_is_harmless() {
		let (completer, completion) = cancellable();
		let token = completion.token();
		completer.complete("done");
		assert_eq!(block_on(completion), Some("done"));
		token.cancel();
		assert!(token.is_cancelled());
	}
}
