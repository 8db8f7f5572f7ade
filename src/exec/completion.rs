use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use crate::error::IoError;
use crate::exec::executor::Exec;
use crate::exec::reactor::Direction;

/// Terminal state of an asynchronous operation.
///
/// Cancellation is its own variant rather than an error so callers can
/// tell "aborted by request" apart from "failed".
#[derive(Debug)]
pub enum Outcome<T> {
	Done(T),
	Failed(std::io::Error),
	Cancelled,
}

impl<T> Outcome<T> {
	pub fn is_done(&self) -> bool {
		matches!(self, Outcome::Done(_))
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Outcome::Cancelled)
	}

	/// Collapses into a Result; cancellation becomes IoError::Cancelled.
	pub fn into_result(self) -> std::io::Result<T> {
		match self {
			Outcome::Done(v) => Ok(v),
			Outcome::Failed(e) => Err(e),
			Outcome::Cancelled => Err(IoError::Cancelled.into()),
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Strategy {
	/// Run on the executor thread, never inline from the initiating call.
	Deferred,
	/// May run before the initiating call returns when the result is
	/// already known; otherwise behaves like Deferred.
	Immediate,
	/// Invoked directly wherever the result materialises. Used by the
	/// blocking adapter, whose action is just a channel send.
	Direct,
}

/// A completion strategy: one closure, invoked exactly once with the
/// operation's Outcome. Consumed by delivery, so a second delivery is
/// unrepresentable.
pub struct Handler<T> {
	run: Box<dyn FnOnce(Outcome<T>) + Send + 'static>,
	strategy: Strategy,
}

/// Deferred callback: always dispatched through the executor.
pub fn callback<T>(f: impl FnOnce(Outcome<T>) + Send + 'static) -> Handler<T> {
	Handler {
		run: Box::new(f),
		strategy: Strategy::Deferred,
	}
}

/// Callback that opts into the immediate-completion fast path.
pub fn immediate<T>(f: impl FnOnce(Outcome<T>) + Send + 'static) -> Handler<T> {
	Handler {
		run: Box::new(f),
		strategy: Strategy::Immediate,
	}
}

/// Blocking adapter: the returned Waiter parks the calling thread until
/// the paired handler has been delivered.
pub fn blocking<T: Send + 'static>() -> (Handler<T>, Waiter<T>) {
	let (tx, rx) = mpsc::channel();
	let handler = Handler {
		run: Box::new(move |outcome| {
			let _ = tx.send(outcome);
		}),
		strategy: Strategy::Direct,
	};
	(handler, Waiter { rx })
}

/// Receiving half of the blocking adapter.
pub struct Waiter<T> {
	rx: mpsc::Receiver<Outcome<T>>,
}

impl<T> Waiter<T> {
	/// Blocks until the operation reaches a terminal state.
	///
	/// A dropped handler (driver torn down mid-flight) reads as
	/// cancellation.
	pub fn wait(self) -> Outcome<T> {
		self.rx.recv().unwrap_or(Outcome::Cancelled)
	}
}

impl<T: Send + 'static> Handler<T> {
	/// Delivery from a completion context (reactor or executor thread).
	pub(crate) fn dispatch(self, exec: &Exec, outcome: Outcome<T>) {
		match self.strategy {
			Strategy::Direct => (self.run)(outcome),
			Strategy::Deferred | Strategy::Immediate => {
				let run = self.run;
				exec.post(move || run(outcome));
			}
		}
	}

	/// Delivery at initiation time, when the result is known before the
	/// initiating call returns. Only Immediate and Direct strategies run
	/// inline here; Deferred still goes through the executor.
	pub(crate) fn dispatch_initial(self, exec: &Exec, outcome: Outcome<T>) {
		match self.strategy {
			Strategy::Immediate | Strategy::Direct => (self.run)(outcome),
			Strategy::Deferred => {
				let run = self.run;
				exec.post(move || run(outcome));
			}
		}
	}
}

/// Per-socket count of undelivered completions, one counter per
/// transfer direction.
///
/// An operation may only complete inline at initiation while the
/// counter for its direction is zero; otherwise an earlier completion
/// could be observed after a later one.
pub(crate) struct Flight {
	send: AtomicUsize,
	recv: AtomicUsize,
}

impl Flight {
	pub fn new() -> Self {
		Self {
			send: AtomicUsize::new(0),
			recv: AtomicUsize::new(0),
		}
	}

	fn cell(&self, dir: Direction) -> &AtomicUsize {
		match dir {
			Direction::Send => &self.send,
			Direction::Recv => &self.recv,
		}
	}

	/// Increments and returns the previous count.
	pub fn inc(&self, dir: Direction) -> usize {
		self.cell(dir).fetch_add(1, Ordering::SeqCst)
	}

	pub fn dec(&self, dir: Direction) {
		self.cell(dir).fetch_sub(1, Ordering::SeqCst);
	}
}

/// Bundles a handler with everything delivery needs: the executor to
/// post through and the in-flight counter to settle afterwards.
pub(crate) struct Delivery<T> {
	handler: Handler<T>,
	exec: Exec,
	flight: Arc<Flight>,
	dir: Direction,
}

impl<T: Send + 'static> Delivery<T> {
	pub fn new(handler: Handler<T>, exec: Exec, flight: Arc<Flight>, dir: Direction) -> Self {
		Self { handler, exec, flight, dir }
	}

	/// Deliver from the reactor side. The counter settles after the
	/// handler has run, so initiation-time fast paths never overtake an
	/// undelivered completion.
	pub fn deliver(self, outcome: Outcome<T>) {
		let Delivery { handler, exec, flight, dir } = self;
		match handler.strategy {
			Strategy::Direct => {
				(handler.run)(outcome);
				flight.dec(dir);
			}
			Strategy::Deferred | Strategy::Immediate => {
				let run = handler.run;
				exec.post(move || {
					run(outcome);
					flight.dec(dir);
				});
			}
		}
	}

	/// Deliver before the initiating call returns.
	pub fn deliver_initial(self, outcome: Outcome<T>) {
		let Delivery { handler, exec, flight, dir } = self;
		match handler.strategy {
			Strategy::Immediate | Strategy::Direct => {
				(handler.run)(outcome);
				flight.dec(dir);
			}
			Strategy::Deferred => {
				let run = handler.run;
				exec.post(move || {
					run(outcome);
					flight.dec(dir);
				});
			}
		}
	}

	pub fn cancelled(self) {
		self.deliver(Outcome::Cancelled);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn outcome_into_result() {
		assert_eq!(Outcome::Done(7usize).into_result().unwrap(), 7);
		assert!(Outcome::<usize>::Cancelled.into_result().is_err());
		let e = Outcome::<usize>::Failed(std::io::Error::from_raw_os_error(libc::ECONNREFUSED));
		assert_eq!(e.into_result().unwrap_err().raw_os_error(), Some(libc::ECONNREFUSED));
	}

	#[test]
	fn blocking_pair_hands_over_the_outcome() {
		let (handler, waiter) = blocking::<usize>();
		(handler.run)(Outcome::Done(3));
		match waiter.wait() {
			Outcome::Done(3) => {}
			other => panic!("unexpected outcome: {:?}", other),
		}
	}

	#[test]
	fn dropped_handler_reads_as_cancelled() {
		let (handler, waiter) = blocking::<usize>();
		drop(handler);
		assert!(waiter.wait().is_cancelled());
	}
}
