use std::collections::{HashMap, VecDeque};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::mpsc;

use tracing::{trace, warn};

use crate::exec::poller::{self, Poller};

/// Token reserved for the wakeup eventfd.
pub(crate) const WAKE_TOKEN: u64 = u64::MAX;

const EVENT_BUFFER_CAPACITY: usize = 256;

/// Transfer direction of a pending operation. Queues, readiness
/// interest, and completion ordering are all kept per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
	Recv,
	Send,
}

pub(crate) enum Progress {
	/// Terminal state reached and delivered.
	Done,
	/// Would block; leave queued until the descriptor is ready again.
	Again,
}

/// A queued asynchronous operation. Owns its buffers and handler.
pub(crate) trait Op: Send {
	/// Runs the operation's syscall once. Delivers the outcome on any
	/// terminal state.
	fn attempt(&mut self) -> Progress;

	/// Like `attempt`, but from the initiating call itself, where an
	/// immediate-strategy handler is allowed to run inline.
	fn attempt_initial(&mut self) -> Progress {
		self.attempt()
	}

	/// Delivers Outcome::Cancelled.
	fn cancel(self: Box<Self>);
}

pub(crate) enum Command {
	Submit {
		fd: RawFd,
		dir: Direction,
		op: Box<dyn Op>,
	},
	Cancel {
		fd: RawFd,
		done: mpsc::Sender<()>,
	},
	Shutdown,
}

#[derive(Default)]
struct Entry {
	recv: VecDeque<Box<dyn Op>>,
	send: VecDeque<Box<dyn Op>>,
	interest: u32,
}

impl Entry {
	fn queue_mut(&mut self, dir: Direction) -> &mut VecDeque<Box<dyn Op>> {
		match dir {
			Direction::Recv => &mut self.recv,
			Direction::Send => &mut self.send,
		}
	}

	fn wanted(&self) -> u32 {
		let mut mask = 0;
		if !self.recv.is_empty() {
			mask |= libc::EPOLLIN as u32;
		}
		if !self.send.is_empty() {
			mask |= libc::EPOLLOUT as u32;
		}
		mask
	}
}

/// Readiness demultiplexer. Runs on its own thread; sockets talk to it
/// through the command channel, waking it via eventfd.
///
/// Pending operations are held in per-descriptor, per-direction FIFO
/// queues, which is what gives completions their issuance-order
/// guarantee.
pub(crate) struct Reactor {
	poller: Poller,
	wake: Arc<OwnedFd>,
	commands: mpsc::Receiver<Command>,
	fds: HashMap<RawFd, Entry>,
}

impl Reactor {
	pub fn new(poller: Poller, wake: Arc<OwnedFd>, commands: mpsc::Receiver<Command>) -> Self {
		Self {
			poller,
			wake,
			commands,
			fds: HashMap::new(),
		}
	}

	pub fn run(mut self) {
		let mut events: [libc::epoll_event; EVENT_BUFFER_CAPACITY] =
			[libc::epoll_event { events: 0, u64: 0 }; EVENT_BUFFER_CAPACITY];

		'main: loop {
			loop {
				match self.commands.try_recv() {
					Ok(Command::Shutdown) => break 'main,
					Ok(cmd) => self.handle_command(cmd),
					Err(mpsc::TryRecvError::Empty) => break,
					Err(mpsc::TryRecvError::Disconnected) => break 'main,
				}
			}

			let n = match self.poller.wait(&mut events, -1) {
				Ok(n) => n,
				Err(e) => {
					warn!(error = %e, "epoll_wait failed");
					continue;
				}
			};

			for event in events.iter().take(n) {
				if event.u64 == WAKE_TOKEN {
					poller::drain(self.wake.as_raw_fd());
					continue;
				}
				self.dispatch_ready(event.u64 as RawFd, event.events);
			}
		}

		self.shutdown();
	}

	fn handle_command(&mut self, cmd: Command) {
		match cmd {
			Command::Submit { fd, dir, mut op } => {
				trace!(fd, ?dir, "submit");
				let entry = self.fds.entry(fd).or_default();
				let queue = entry.queue_mut(dir);
				// Only the head of an empty queue may run ahead of the
				// readiness loop; anything else would complete out of
				// issuance order.
				if queue.is_empty() {
					if let Progress::Again = op.attempt() {
						queue.push_back(op);
					}
				} else {
					queue.push_back(op);
				}
				self.sync_interest(fd);
			}
			Command::Cancel { fd, done } => {
				trace!(fd, "cancel");
				if let Some(mut entry) = self.fds.remove(&fd) {
					if entry.interest != 0 {
						let _ = self.poller.remove(fd);
					}
					for op in entry.recv.drain(..) {
						op.cancel();
					}
					for op in entry.send.drain(..) {
						op.cancel();
					}
				}
				let _ = done.send(());
			}
			Command::Shutdown => {}
		}
	}

	fn dispatch_ready(&mut self, fd: RawFd, revents: u32) {
		let Some(entry) = self.fds.get_mut(&fd) else {
			return;
		};
		let errored = revents & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32) != 0;
		if errored || revents & libc::EPOLLIN as u32 != 0 {
			Self::drain_queue(&mut entry.recv);
		}
		if errored || revents & libc::EPOLLOUT as u32 != 0 {
			Self::drain_queue(&mut entry.send);
		}
		self.sync_interest(fd);
	}

	/// Attempts queued operations in order until one would block or the
	/// queue empties.
	fn drain_queue(queue: &mut VecDeque<Box<dyn Op>>) {
		while let Some(mut op) = queue.pop_front() {
			match op.attempt() {
				Progress::Done => continue,
				Progress::Again => {
					queue.push_front(op);
					break;
				}
			}
		}
	}

	/// Brings the epoll interest mask in line with the queues, dropping
	/// the registration entirely once both queues are empty.
	fn sync_interest(&mut self, fd: RawFd) {
		let (want, had) = match self.fds.get(&fd) {
			Some(entry) => (entry.wanted(), entry.interest),
			None => return,
		};
		if want == had {
			if want == 0 {
				self.fds.remove(&fd);
			}
			return;
		}
		if want == 0 {
			let _ = self.poller.remove(fd);
			self.fds.remove(&fd);
			return;
		}
		let res = if had == 0 {
			self.poller.add(fd, fd as u64, want)
		} else {
			self.poller.modify(fd, fd as u64, want)
		};
		match res {
			Ok(()) => {
				if let Some(entry) = self.fds.get_mut(&fd) {
					entry.interest = want;
				}
			}
			Err(e) => {
				warn!(fd, error = %e, "epoll registration failed, cancelling queued operations");
				if let Some(mut entry) = self.fds.remove(&fd) {
					if entry.interest != 0 {
						let _ = self.poller.remove(fd);
					}
					for op in entry.recv.drain(..) {
						op.cancel();
					}
					for op in entry.send.drain(..) {
						op.cancel();
					}
				}
			}
		}
	}

	/// Cancels everything still queued. Runs once the command loop has
	/// exited, so no new submissions can race it.
	fn shutdown(&mut self) {
		for (fd, mut entry) in self.fds.drain() {
			if entry.interest != 0 {
				let _ = self.poller.remove(fd);
			}
			for op in entry.recv.drain(..) {
				op.cancel();
			}
			for op in entry.send.drain(..) {
				op.cancel();
			}
		}
	}
}
