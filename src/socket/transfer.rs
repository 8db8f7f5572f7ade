//! Datagram syscalls shared by the synchronous and asynchronous paths,
//! plus the pending-operation types the reactor queues.

use std::os::fd::RawFd;

use crate::addr::Endpoint;
use crate::error::{IoError, errno};
use crate::exec::{Delivery, Direction, Op, Outcome, Progress};
use crate::protocol::Protocol;

pub(crate) fn send_some(fd: RawFd, buf: &[u8], flags: i32) -> std::io::Result<usize> {
	let n = unsafe {
		libc::send(
			fd,
			buf.as_ptr() as *const libc::c_void,
			buf.len(),
			flags,
		)
	};
	if n == -1 {
		Err(IoError::Write { errno: errno() }.into())
	} else {
		Ok(n as usize)
	}
}

pub(crate) fn send_to_ep(fd: RawFd, buf: &[u8], flags: i32, target: &Endpoint) -> std::io::Result<usize> {
	let n = unsafe {
		libc::sendto(
			fd,
			buf.as_ptr() as *const libc::c_void,
			buf.len(),
			flags,
			target.data(),
			target.socklen(),
		)
	};
	if n == -1 {
		Err(IoError::Write { errno: errno() }.into())
	} else {
		Ok(n as usize)
	}
}

pub(crate) fn recv_some(fd: RawFd, buf: &mut [u8], flags: i32) -> std::io::Result<usize> {
	let n = unsafe {
		libc::recv(
			fd,
			buf.as_mut_ptr() as *mut libc::c_void,
			buf.len(),
			flags,
		)
	};
	if n == -1 {
		Err(IoError::Read { errno: errno() }.into())
	} else {
		Ok(n as usize)
	}
}

/// recvfrom filling in the sender's address. `from` must be zero-length
/// capacity storage; its live length is set from what the kernel wrote.
pub(crate) fn recv_from_ep(
	fd: RawFd,
	buf: &mut [u8],
	flags: i32,
	from: &mut Endpoint,
) -> std::io::Result<usize> {
	let mut len = Endpoint::capacity() as libc::socklen_t;
	let n = unsafe {
		libc::recvfrom(
			fd,
			buf.as_mut_ptr() as *mut libc::c_void,
			buf.len(),
			flags,
			from.data_mut(),
			&mut len,
		)
	};
	if n == -1 {
		Err(IoError::Read { errno: errno() }.into())
	} else {
		from.set_socklen(len);
		Ok(n as usize)
	}
}

/// Parks the calling thread until the descriptor is ready in the given
/// direction. Only the explicit synchronous forms use this.
pub(crate) fn wait_ready(fd: RawFd, dir: Direction) -> std::io::Result<()> {
	let events = match dir {
		Direction::Recv => libc::POLLIN,
		Direction::Send => libc::POLLOUT,
	};
	loop {
		let mut pfd = libc::pollfd { fd, events, revents: 0 };
		let r = unsafe { libc::poll(&mut pfd, 1, -1) };
		if r == -1 {
			if errno() == libc::EINTR {
				continue;
			}
			return Err(std::io::Error::from_raw_os_error(errno()));
		}
		return Ok(());
	}
}

/// Non-blocking readiness probe.
pub(crate) fn ready_now(fd: RawFd, dir: Direction) -> std::io::Result<bool> {
	let events = match dir {
		Direction::Recv => libc::POLLIN,
		Direction::Send => libc::POLLOUT,
	};
	loop {
		let mut pfd = libc::pollfd { fd, events, revents: 0 };
		let r = unsafe { libc::poll(&mut pfd, 1, 0) };
		if r == -1 {
			if errno() == libc::EINTR {
				continue;
			}
			return Err(std::io::Error::from_raw_os_error(errno()));
		}
		return Ok(r > 0);
	}
}

/// Retries a non-blocking syscall until it completes, parking on
/// poll(2) whenever it would block. Would-block is never surfaced.
pub(crate) fn blocking_loop<T>(
	fd: RawFd,
	dir: Direction,
	mut f: impl FnMut() -> std::io::Result<T>,
) -> std::io::Result<T> {
	loop {
		match f() {
			Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => wait_ready(fd, dir)?,
			Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
			other => return other,
		}
	}
}

/// Folds a syscall result into what an Op::attempt needs: None keeps
/// the operation queued, Some is terminal and carries the outcome.
fn settle<T>(res: std::io::Result<T>) -> Option<Outcome<T>> {
	match res {
		Ok(v) => Some(Outcome::Done(v)),
		Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
		Err(e) if e.kind() == std::io::ErrorKind::Interrupted => None,
		Err(e) => Some(Outcome::Failed(e)),
	}
}

/// Pending send or send_to. Owns the payload until delivery.
pub(crate) struct SendOp {
	fd: RawFd,
	data: Vec<u8>,
	flags: i32,
	target: Option<Endpoint>,
	delivery: Option<Delivery<usize>>,
}

impl SendOp {
	pub fn new(
		fd: RawFd,
		data: Vec<u8>,
		flags: i32,
		target: Option<Endpoint>,
		delivery: Delivery<usize>,
	) -> Self {
		Self {
			fd,
			data,
			flags,
			target,
			delivery: Some(delivery),
		}
	}

	fn step(&mut self, initial: bool) -> Progress {
		let res = match &self.target {
			Some(ep) => send_to_ep(self.fd, &self.data, self.flags, ep),
			None => send_some(self.fd, &self.data, self.flags),
		};
		match settle(res) {
			None => Progress::Again,
			Some(outcome) => {
				if let Some(delivery) = self.delivery.take() {
					if initial {
						delivery.deliver_initial(outcome);
					} else {
						delivery.deliver(outcome);
					}
				}
				Progress::Done
			}
		}
	}
}

impl Op for SendOp {
	fn attempt(&mut self) -> Progress {
		self.step(false)
	}

	fn attempt_initial(&mut self) -> Progress {
		self.step(true)
	}

	fn cancel(mut self: Box<Self>) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}

// An op dropped without ever reaching attempt/cancel (a submission that
// outlived the reactor) still owes its completion.
impl Drop for SendOp {
	fn drop(&mut self) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}

/// Pending receive; the completion hands the filled buffer over.
pub(crate) struct RecvOp {
	fd: RawFd,
	capacity: usize,
	flags: i32,
	delivery: Option<Delivery<Vec<u8>>>,
}

impl RecvOp {
	pub fn new(fd: RawFd, capacity: usize, flags: i32, delivery: Delivery<Vec<u8>>) -> Self {
		Self {
			fd,
			capacity,
			flags,
			delivery: Some(delivery),
		}
	}

	fn step(&mut self, initial: bool) -> Progress {
		let mut buf = vec![0u8; self.capacity];
		let res = recv_some(self.fd, &mut buf, self.flags);
		match settle(res) {
			None => Progress::Again,
			Some(outcome) => {
				let outcome = match outcome {
					Outcome::Done(n) => {
						buf.truncate(n);
						Outcome::Done(buf)
					}
					Outcome::Failed(e) => Outcome::Failed(e),
					Outcome::Cancelled => Outcome::Cancelled,
				};
				if let Some(delivery) = self.delivery.take() {
					if initial {
						delivery.deliver_initial(outcome);
					} else {
						delivery.deliver(outcome);
					}
				}
				Progress::Done
			}
		}
	}
}

impl Op for RecvOp {
	fn attempt(&mut self) -> Progress {
		self.step(false)
	}

	fn attempt_initial(&mut self) -> Progress {
		self.step(true)
	}

	fn cancel(mut self: Box<Self>) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}

impl Drop for RecvOp {
	fn drop(&mut self) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}

/// Pending receive_from; completes with the bytes and the sender's
/// endpoint, tagged with the socket's protocol.
pub(crate) struct RecvFromOp {
	fd: RawFd,
	capacity: usize,
	flags: i32,
	proto: Protocol,
	delivery: Option<Delivery<(Vec<u8>, Endpoint)>>,
}

impl RecvFromOp {
	pub fn new(
		fd: RawFd,
		capacity: usize,
		flags: i32,
		proto: Protocol,
		delivery: Delivery<(Vec<u8>, Endpoint)>,
	) -> Self {
		Self {
			fd,
			capacity,
			flags,
			proto,
			delivery: Some(delivery),
		}
	}

	fn step(&mut self, initial: bool) -> Progress {
		let mut buf = vec![0u8; self.capacity];
		let mut from = Endpoint::new(self.proto);
		let res = recv_from_ep(self.fd, &mut buf, self.flags, &mut from);
		match settle(res) {
			None => Progress::Again,
			Some(outcome) => {
				let outcome = match outcome {
					Outcome::Done(n) => {
						buf.truncate(n);
						Outcome::Done((buf, from))
					}
					Outcome::Failed(e) => Outcome::Failed(e),
					Outcome::Cancelled => Outcome::Cancelled,
				};
				if let Some(delivery) = self.delivery.take() {
					if initial {
						delivery.deliver_initial(outcome);
					} else {
						delivery.deliver(outcome);
					}
				}
				Progress::Done
			}
		}
	}
}

impl Op for RecvFromOp {
	fn attempt(&mut self) -> Progress {
		self.step(false)
	}

	fn attempt_initial(&mut self) -> Progress {
		self.step(true)
	}

	fn cancel(mut self: Box<Self>) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}

impl Drop for RecvFromOp {
	fn drop(&mut self) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}

/// Readiness probe: completes with 0 once the descriptor is ready,
/// transferring and consuming nothing.
pub(crate) struct WaitOp {
	fd: RawFd,
	dir: Direction,
	delivery: Option<Delivery<usize>>,
}

impl WaitOp {
	pub fn new(fd: RawFd, dir: Direction, delivery: Delivery<usize>) -> Self {
		Self {
			fd,
			dir,
			delivery: Some(delivery),
		}
	}

	fn step(&mut self, initial: bool) -> Progress {
		let outcome = match ready_now(self.fd, self.dir) {
			Ok(false) => return Progress::Again,
			Ok(true) => Outcome::Done(0),
			Err(e) => Outcome::Failed(e),
		};
		if let Some(delivery) = self.delivery.take() {
			if initial {
				delivery.deliver_initial(outcome);
			} else {
				delivery.deliver(outcome);
			}
		}
		Progress::Done
	}
}

impl Op for WaitOp {
	fn attempt(&mut self) -> Progress {
		self.step(false)
	}

	fn attempt_initial(&mut self) -> Progress {
		self.step(true)
	}

	fn cancel(mut self: Box<Self>) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}

impl Drop for WaitOp {
	fn drop(&mut self) {
		if let Some(delivery) = self.delivery.take() {
			delivery.cancelled();
		}
	}
}
