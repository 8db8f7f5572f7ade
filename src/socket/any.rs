use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use crate::addr::{Domain, Endpoint};
use crate::error::{SocketError, errno};
use crate::exec::{Command, Delivery, Direction, Exec, Flight, Handler, Op, Outcome, Progress};
use crate::protocol::Protocol;
use crate::socket::datagram::{BoundDatagram, ConnectedDatagram};
use crate::socket::fd::SockFd;
use crate::socket::options::{self, AtMark, BytesReadable, GetOption, IoControl, SetOption};
use crate::socket::raw::RawSocket;
use crate::socket::transfer::{self, RecvFromOp, RecvOp, SendOp, WaitOp};
use crate::socket::{Datagram, Shutdown};

/// A datagram socket whose address family and protocol are chosen at
/// runtime.
///
/// Where `BoundDatagram<Ipv4>` fixes the family in its type, an
/// AnyDatagram carries a `Protocol` value instead, so one type can hold
/// a UDP/IPv4 socket, a UDP/IPv6 socket, or any other datagram protocol
/// the OS knows. All family-specific behavior lives in the descriptor
/// and the syscalls; there is no dispatch table.
///
/// The socket owns its descriptor through `SockFd` and holds a clone of
/// the driver handle for its whole lifetime. Synchronous operations
/// park the calling thread; `async_*` operations return immediately and
/// deliver exactly one `Outcome` through the supplied handler.
pub struct AnyDatagram {
	proto: Protocol,
	fd: SockFd,
	exec: Exec,
	flight: Arc<Flight>,
}

/// A typed datagram socket that can be erased into an AnyDatagram.
///
/// Conversion consumes the source: the descriptor moves, and the
/// runtime descriptor is derived from the source's domain.
pub trait IntoAnyDatagram {
	fn protocol(&self) -> Protocol;
	fn into_fd(self) -> OwnedFd;
}

impl<D: Domain> IntoAnyDatagram for BoundDatagram<D> {
	fn protocol(&self) -> Protocol {
		Protocol::of::<D>()
	}

	fn into_fd(self) -> OwnedFd {
		BoundDatagram::into_fd(self)
	}
}

impl<D: Domain> IntoAnyDatagram for ConnectedDatagram<D> {
	fn protocol(&self) -> Protocol {
		Protocol::of::<D>()
	}

	fn into_fd(self) -> OwnedFd {
		ConnectedDatagram::into_fd(self)
	}
}

impl<D: Domain> IntoAnyDatagram for RawSocket<D, Datagram> {
	fn protocol(&self) -> Protocol {
		Protocol::of::<D>()
	}

	fn into_fd(self) -> OwnedFd {
		RawSocket::into_fd(self)
	}
}

impl AnyDatagram {
	/// A closed socket bound to a driver. Open it with `open`, `assign`,
	/// or `assign_socket`.
	pub fn new(exec: Exec) -> Self {
		Self {
			proto: Protocol::unspecified(),
			fd: SockFd::new(),
			exec,
			flight: Arc::new(Flight::new()),
		}
	}

	/// Erases a typed datagram socket. The source is consumed and its
	/// descriptor moves here.
	pub fn adopt<S: IntoAnyDatagram>(exec: Exec, source: S) -> std::io::Result<Self> {
		let mut socket = Self::new(exec);
		socket.assign_socket(source)?;
		Ok(socket)
	}

	/// Opens a fresh descriptor for the given protocol.
	///
	/// The descriptor is created non-blocking; synchronous calls still
	/// block by parking on readiness.
	pub fn open(&mut self, proto: Protocol) -> std::io::Result<()> {
		if self.fd.is_open() {
			return Err(SocketError::AlreadyOpen.into());
		}
		let raw = unsafe {
			libc::socket(
				proto.family(),
				proto.socktype() | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
				proto.protocol(),
			)
		};
		if raw == -1 {
			return Err(SocketError::Create { errno: errno() }.into());
		}
		self.fd.open(unsafe { OwnedFd::from_raw_fd(raw) })?;
		self.proto = proto;
		Ok(())
	}

	/// Adopts a caller-supplied descriptor verbatim.
	///
	/// No check that the descriptor matches the stated protocol is made
	/// here; the OS rejects mismatches at first use.
	pub fn assign(&mut self, proto: Protocol, fd: OwnedFd) -> std::io::Result<()> {
		options::set_nonblocking(&fd, true)?;
		self.fd.open(fd)?;
		self.proto = proto;
		Ok(())
	}

	/// `open` with an existing descriptor. Same adoption semantics as
	/// `assign`.
	pub fn open_native(&mut self, proto: Protocol, fd: OwnedFd) -> std::io::Result<()> {
		self.assign(proto, fd)
	}

	/// Like `assign`, but first closes the previously held descriptor
	/// if one was open, then moves the typed socket's descriptor in.
	pub fn assign_socket<S: IntoAnyDatagram>(&mut self, source: S) -> std::io::Result<()> {
		if self.fd.is_open() {
			self.close()?;
		}
		let proto = source.protocol();
		self.assign(proto, source.into_fd())
	}

	#[inline]
	pub fn is_open(&self) -> bool {
		self.fd.is_open()
	}

	/// The runtime descriptor this socket was opened with.
	#[inline]
	pub fn protocol(&self) -> Protocol {
		self.proto
	}

	/// The driver handle this socket delivers completions through.
	pub fn executor(&self) -> &Exec {
		&self.exec
	}

	/// The raw descriptor, if open.
	pub fn native_handle(&self) -> Option<RawFd> {
		self.fd.raw()
	}

	/// Cancels every in-flight asynchronous operation on this socket.
	/// Each one completes with `Outcome::Cancelled`. Returns once the
	/// reactor has acknowledged.
	pub fn cancel(&self) -> std::io::Result<()> {
		let raw = self.fd.get()?;
		self.exec.cancel_fd(raw);
		Ok(())
	}

	/// Closes the socket. In-flight asynchronous operations complete
	/// with `Outcome::Cancelled` before the descriptor is released, so
	/// no completion ever sees a dead handle. Idempotent.
	pub fn close(&mut self) -> std::io::Result<()> {
		if !self.fd.is_open() {
			return Ok(());
		}
		if let Some(raw) = self.fd.raw() {
			self.exec.cancel_fd(raw);
		}
		self.proto = Protocol::unspecified();
		self.fd.close()
	}

	/// Transfers the descriptor out without closing it. Pending
	/// operations are cancelled first.
	pub fn release(&mut self) -> std::io::Result<OwnedFd> {
		let raw = self.fd.get()?;
		self.exec.cancel_fd(raw);
		self.proto = Protocol::unspecified();
		match self.fd.release() {
			Some(fd) => Ok(fd),
			None => Err(SocketError::NotOpen.into()),
		}
	}

	fn check_family(&self, ep: &Endpoint) -> std::io::Result<()> {
		let family = ep.family();
		if family == libc::AF_UNSPEC || family == self.proto.family() {
			Ok(())
		} else {
			Err(SocketError::FamilyMismatch {
				socket: self.proto.family(),
				endpoint: family,
			}
			.into())
		}
	}

	// ---- addressing ----

	/// Binds to a local endpoint.
	pub fn bind(&self, local: &Endpoint) -> std::io::Result<()> {
		let fd = self.fd.get()?;
		self.check_family(local)?;
		let r = unsafe { libc::bind(fd, local.data(), local.socklen()) };
		if r == -1 {
			Err(SocketError::Bind {
				errno: errno(),
				addr: format!("{:?}", local),
			}
			.into())
		} else {
			Ok(())
		}
	}

	/// Fixes the default peer for subsequent send/recv. No handshake
	/// happens on a datagram socket; the kernel just filters and routes.
	pub fn connect(&self, peer: &Endpoint) -> std::io::Result<()> {
		let fd = self.fd.get()?;
		self.check_family(peer)?;
		let r = unsafe { libc::connect(fd, peer.data(), peer.socklen()) };
		if r == -1 {
			Err(SocketError::Connect {
				errno: errno(),
				addr: format!("{:?}", peer),
			}
			.into())
		} else {
			Ok(())
		}
	}

	/// Asynchronous connect. Datagram connect never waits, so the
	/// outcome is known before this returns; delivery timing still
	/// follows the handler's strategy.
	pub fn async_connect(&self, peer: &Endpoint, handler: Handler<()>) {
		let outcome = match self.connect(peer) {
			Ok(()) => Outcome::Done(()),
			Err(e) => Outcome::Failed(e),
		};
		handler.dispatch_initial(&self.exec, outcome);
	}

	/// The locally bound endpoint, tagged with this socket's protocol.
	pub fn local_endpoint(&self) -> std::io::Result<Endpoint> {
		let fd = self.fd.get()?;
		let mut ep = Endpoint::new(self.proto);
		let mut len = Endpoint::capacity() as libc::socklen_t;
		let r = unsafe { libc::getsockname(fd, ep.data_mut(), &mut len) };
		if r == -1 {
			return Err(SocketError::GetOption { errno: errno(), option: "SO_SOCKNAME" }.into());
		}
		ep.set_socklen(len);
		Ok(ep)
	}

	/// The connected peer's endpoint. Fails NotConnected before
	/// `connect` has fixed a peer.
	pub fn remote_endpoint(&self) -> std::io::Result<Endpoint> {
		let fd = self.fd.get()?;
		let mut ep = Endpoint::new(self.proto);
		let mut len = Endpoint::capacity() as libc::socklen_t;
		let r = unsafe { libc::getpeername(fd, ep.data_mut(), &mut len) };
		if r == -1 {
			let e = errno();
			if e == libc::ENOTCONN {
				return Err(SocketError::NotConnected.into());
			}
			return Err(SocketError::GetOption { errno: e, option: "SO_PEERNAME" }.into());
		}
		ep.set_socklen(len);
		Ok(ep)
	}

	// ---- synchronous transfer ----

	/// Sends on the connected peer. A zero-length buffer sends an empty
	/// datagram, which is enough to wake a blocked peer.
	pub fn send(&self, buf: &[u8]) -> std::io::Result<usize> {
		self.send_with_flags(buf, 0)
	}

	pub fn send_with_flags(&self, buf: &[u8], flags: i32) -> std::io::Result<usize> {
		let fd = self.fd.get()?;
		transfer::blocking_loop(fd, Direction::Send, || transfer::send_some(fd, buf, flags))
	}

	pub fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
		self.recv_with_flags(buf, 0)
	}

	pub fn recv_with_flags(&self, buf: &mut [u8], flags: i32) -> std::io::Result<usize> {
		let fd = self.fd.get()?;
		transfer::blocking_loop(fd, Direction::Recv, || transfer::recv_some(fd, buf, flags))
	}

	pub fn send_to(&self, buf: &[u8], target: &Endpoint) -> std::io::Result<usize> {
		self.send_to_with_flags(buf, target, 0)
	}

	pub fn send_to_with_flags(&self, buf: &[u8], target: &Endpoint, flags: i32) -> std::io::Result<usize> {
		let fd = self.fd.get()?;
		self.check_family(target)?;
		transfer::blocking_loop(fd, Direction::Send, || {
			transfer::send_to_ep(fd, buf, flags, target)
		})
	}

	/// Receives a datagram along with its sender's endpoint.
	pub fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, Endpoint)> {
		self.recv_from_with_flags(buf, 0)
	}

	pub fn recv_from_with_flags(&self, buf: &mut [u8], flags: i32) -> std::io::Result<(usize, Endpoint)> {
		let fd = self.fd.get()?;
		let mut from = Endpoint::new(self.proto);
		let n = transfer::blocking_loop(fd, Direction::Recv, || {
			transfer::recv_from_ep(fd, buf, flags, &mut from)
		})?;
		Ok((n, from))
	}

	/// Blocks until the socket is writable without sending anything.
	/// Returns 0, mirroring the no-buffer transfer shape.
	pub fn probe_send(&self) -> std::io::Result<usize> {
		let fd = self.fd.get()?;
		transfer::wait_ready(fd, Direction::Send)?;
		Ok(0)
	}

	/// Blocks until a datagram is readable without consuming it.
	pub fn probe_recv(&self) -> std::io::Result<usize> {
		let fd = self.fd.get()?;
		transfer::wait_ready(fd, Direction::Recv)?;
		Ok(0)
	}

	// ---- asynchronous transfer ----

	fn delivery<T: Send + 'static>(&self, handler: Handler<T>, dir: Direction) -> Delivery<T> {
		Delivery::new(handler, self.exec.clone(), self.flight.clone(), dir)
	}

	/// Queues an operation. The head of an idle direction gets one
	/// speculative attempt on the calling thread, which is where the
	/// immediate-completion fast path fires; everything else goes to
	/// the reactor.
	fn launch(&self, fd: RawFd, dir: Direction, mut op: Box<dyn Op>) {
		if self.flight.inc(dir) == 0 {
			if matches!(op.attempt_initial(), Progress::Done) {
				return;
			}
		}
		if let Err(cmd) = self.exec.submit(Command::Submit { fd, dir, op }) {
			// Driver already torn down: the contract still owes exactly
			// one completion.
			if let Command::Submit { op, .. } = cmd {
				op.cancel();
			}
		}
	}

	pub fn async_send(&self, data: Vec<u8>, handler: Handler<usize>) {
		self.async_send_with_flags(data, 0, handler)
	}

	pub fn async_send_with_flags(&self, data: Vec<u8>, flags: i32, handler: Handler<usize>) {
		let fd = match self.fd.get() {
			Ok(fd) => fd,
			Err(e) => return handler.dispatch_initial(&self.exec, Outcome::Failed(e)),
		};
		let delivery = self.delivery(handler, Direction::Send);
		let op = SendOp::new(fd, data, flags, None, delivery);
		self.launch(fd, Direction::Send, Box::new(op));
	}

	pub fn async_send_to(&self, data: Vec<u8>, target: &Endpoint, handler: Handler<usize>) {
		self.async_send_to_with_flags(data, target, 0, handler)
	}

	pub fn async_send_to_with_flags(
		&self,
		data: Vec<u8>,
		target: &Endpoint,
		flags: i32,
		handler: Handler<usize>,
	) {
		let fd = match self.fd.get() {
			Ok(fd) => fd,
			Err(e) => return handler.dispatch_initial(&self.exec, Outcome::Failed(e)),
		};
		if let Err(e) = self.check_family(target) {
			return handler.dispatch_initial(&self.exec, Outcome::Failed(e));
		}
		let delivery = self.delivery(handler, Direction::Send);
		let op = SendOp::new(fd, data, flags, Some(*target), delivery);
		self.launch(fd, Direction::Send, Box::new(op));
	}

	/// Receives up to `capacity` bytes; the completion hands over the
	/// filled buffer.
	pub fn async_recv(&self, capacity: usize, handler: Handler<Vec<u8>>) {
		self.async_recv_with_flags(capacity, 0, handler)
	}

	pub fn async_recv_with_flags(&self, capacity: usize, flags: i32, handler: Handler<Vec<u8>>) {
		let fd = match self.fd.get() {
			Ok(fd) => fd,
			Err(e) => return handler.dispatch_initial(&self.exec, Outcome::Failed(e)),
		};
		let delivery = self.delivery(handler, Direction::Recv);
		let op = RecvOp::new(fd, capacity, flags, delivery);
		self.launch(fd, Direction::Recv, Box::new(op));
	}

	pub fn async_recv_from(&self, capacity: usize, handler: Handler<(Vec<u8>, Endpoint)>) {
		self.async_recv_from_with_flags(capacity, 0, handler)
	}

	pub fn async_recv_from_with_flags(
		&self,
		capacity: usize,
		flags: i32,
		handler: Handler<(Vec<u8>, Endpoint)>,
	) {
		let fd = match self.fd.get() {
			Ok(fd) => fd,
			Err(e) => return handler.dispatch_initial(&self.exec, Outcome::Failed(e)),
		};
		let delivery = self.delivery(handler, Direction::Recv);
		let op = RecvFromOp::new(fd, capacity, flags, self.proto, delivery);
		self.launch(fd, Direction::Recv, Box::new(op));
	}

	/// Completes with 0 once the socket is writable; nothing is sent.
	pub fn async_probe_send(&self, handler: Handler<usize>) {
		let fd = match self.fd.get() {
			Ok(fd) => fd,
			Err(e) => return handler.dispatch_initial(&self.exec, Outcome::Failed(e)),
		};
		let delivery = self.delivery(handler, Direction::Send);
		let op = WaitOp::new(fd, Direction::Send, delivery);
		self.launch(fd, Direction::Send, Box::new(op));
	}

	/// Completes with 0 once a datagram is readable; nothing is
	/// consumed.
	pub fn async_probe_recv(&self, handler: Handler<usize>) {
		let fd = match self.fd.get() {
			Ok(fd) => fd,
			Err(e) => return handler.dispatch_initial(&self.exec, Outcome::Failed(e)),
		};
		let delivery = self.delivery(handler, Direction::Recv);
		let op = WaitOp::new(fd, Direction::Recv, delivery);
		self.launch(fd, Direction::Recv, Box::new(op));
	}

	// ---- introspection ----

	/// Bytes readable without blocking.
	pub fn available(&self) -> std::io::Result<usize> {
		let mut cmd = BytesReadable::new();
		self.io_control(&mut cmd)?;
		Ok(cmd.get())
	}

	/// Out-of-band boundary probe. Pure datagram protocols define no
	/// marker; whatever the OS reports for them is passed through.
	pub fn at_mark(&self) -> std::io::Result<bool> {
		let mut cmd = AtMark::new();
		self.io_control(&mut cmd)?;
		Ok(cmd.get())
	}

	pub fn set_option<O: SetOption>(&self, option: &O) -> std::io::Result<()> {
		let fd = self.fd.get()?;
		let r = unsafe {
			libc::setsockopt(fd, option.level(), option.name(), option.data(), option.size())
		};
		if r == -1 {
			Err(SocketError::SetOption { errno: errno(), option: "socket option" }.into())
		} else {
			Ok(())
		}
	}

	pub fn get_option<O: GetOption>(&self, option: &mut O) -> std::io::Result<()> {
		let fd = self.fd.get()?;
		let mut len = option.size();
		let r = unsafe {
			libc::getsockopt(fd, option.level(), option.name(), option.data_mut(), &mut len)
		};
		if r == -1 {
			Err(SocketError::GetOption { errno: errno(), option: "socket option" }.into())
		} else {
			option.resize(len);
			Ok(())
		}
	}

	pub fn io_control<C: IoControl>(&self, cmd: &mut C) -> std::io::Result<()> {
		let fd = self.fd.get()?;
		let r = unsafe { libc::ioctl(fd, cmd.cmd(), cmd.data_mut()) };
		if r == -1 {
			Err(std::io::Error::from_raw_os_error(errno()))
		} else {
			Ok(())
		}
	}

	/// Disables further send and/or receive without closing the
	/// descriptor.
	pub fn shutdown(&self, how: Shutdown) -> std::io::Result<()> {
		let fd = self.fd.get()?;
		let r = unsafe { libc::shutdown(fd, how.raw()) };
		if r == -1 {
			let e = errno();
			if e == libc::ENOTCONN {
				return Err(SocketError::NotConnected.into());
			}
			return Err(std::io::Error::from_raw_os_error(e));
		}
		Ok(())
	}
}

impl Drop for AnyDatagram {
	fn drop(&mut self) {
		if self.fd.is_open() {
			let _ = self.close();
		}
	}
}

impl std::fmt::Debug for AnyDatagram {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AnyDatagram")
			.field("protocol", &self.proto)
			.field("fd", &self.fd)
			.finish()
	}
}
