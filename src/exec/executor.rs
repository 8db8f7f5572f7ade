use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tracing::debug;

use crate::exec::poller::{self, Poller};
use crate::exec::reactor::{Command, Reactor, WAKE_TOKEN};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Run {
	Task(Task),
	Exit,
}

/// Clonable handle to a running Driver.
///
/// Every socket keeps one for its lifetime; it carries the completion
/// queue and the reactor command channel. Cloning is cheap.
#[derive(Clone)]
pub struct Exec {
	tasks: mpsc::Sender<Run>,
	commands: mpsc::Sender<Command>,
	wake: Arc<OwnedFd>,
}

impl Exec {
	/// Schedules a task on the executor thread.
	///
	/// If the executor has already been torn down the task runs on the
	/// calling thread instead; completions are never silently dropped.
	pub fn post(&self, f: impl FnOnce() + Send + 'static) {
		if let Err(mpsc::SendError(msg)) = self.tasks.send(Run::Task(Box::new(f))) {
			if let Run::Task(task) = msg {
				task();
			}
		}
	}

	/// Hands a command to the reactor and wakes it. Returns the command
	/// back if the reactor is gone.
	pub(crate) fn submit(&self, cmd: Command) -> Result<(), Command> {
		self.commands.send(cmd).map_err(|e| e.0)?;
		poller::signal(self.wake.as_raw_fd());
		Ok(())
	}

	/// Cancels every pending operation on the descriptor and waits for
	/// the reactor to acknowledge. After this returns, nothing in the
	/// reactor references the descriptor.
	pub(crate) fn cancel_fd(&self, fd: RawFd) {
		let (tx, rx) = mpsc::channel();
		if self.submit(Command::Cancel { fd, done: tx }).is_ok() {
			let _ = rx.recv();
		}
	}
}

/// Owns the reactor and executor threads.
///
/// Dropping the Driver shuts the reactor down first, so every pending
/// operation is delivered as Cancelled, then lets the executor finish
/// the completions already queued before it exits.
pub struct Driver {
	exec: Exec,
	reactor: Option<thread::JoinHandle<()>>,
	worker: Option<thread::JoinHandle<()>>,
}

impl Driver {
	pub fn new() -> io::Result<Self> {
		let wake = Arc::new(poller::new_eventfd()?);
		let poller = Poller::new()?;
		poller.add(wake.as_raw_fd(), WAKE_TOKEN, libc::EPOLLIN as u32)?;

		let (task_tx, task_rx) = mpsc::channel();
		let (cmd_tx, cmd_rx) = mpsc::channel();

		let exec = Exec {
			tasks: task_tx,
			commands: cmd_tx,
			wake: wake.clone(),
		};

		let reactor = Reactor::new(poller, wake, cmd_rx);
		let reactor = thread::Builder::new()
			.name("gramlane-reactor".into())
			.spawn(move || reactor.run())?;
		let worker = thread::Builder::new()
			.name("gramlane-exec".into())
			.spawn(move || run_worker(task_rx))?;

		debug!("driver started");
		Ok(Self {
			exec,
			reactor: Some(reactor),
			worker: Some(worker),
		})
	}

	/// Handle for constructing sockets.
	pub fn handle(&self) -> Exec {
		self.exec.clone()
	}
}

impl Drop for Driver {
	fn drop(&mut self) {
		let _ = self.exec.submit(Command::Shutdown);
		if let Some(handle) = self.reactor.take() {
			let _ = handle.join();
		}
		let _ = self.exec.tasks.send(Run::Exit);
		if let Some(handle) = self.worker.take() {
			let _ = handle.join();
		}
		debug!("driver stopped");
	}
}

fn run_worker(rx: mpsc::Receiver<Run>) {
	while let Ok(msg) = rx.recv() {
		match msg {
			Run::Task(task) => task(),
			Run::Exit => break,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn posted_task_runs_on_the_worker() {
		let driver = Driver::new().unwrap();
		let exec = driver.handle();
		let (tx, rx) = mpsc::channel();
		let caller = thread::current().id();
		exec.post(move || {
			let _ = tx.send(thread::current().id());
		});
		let ran_on = rx.recv().unwrap();
		assert_ne!(ran_on, caller);
	}

	#[test]
	fn post_after_teardown_runs_inline() {
		let driver = Driver::new().unwrap();
		let exec = driver.handle();
		drop(driver);
		let (tx, rx) = mpsc::channel();
		exec.post(move || {
			let _ = tx.send(());
		});
		rx.recv().unwrap();
	}
}
