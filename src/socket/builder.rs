use std::fmt::Debug;
use std::marker::PhantomData;

use crate::addr::{Domain, ToSockAddr};

use super::{
	BoundDatagram, Datagram, RawSocket,
	set_recv_buffer_size, set_reuse_addr, set_reuse_port, set_send_buffer_size,
};

/// Buffer size configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferConfig {
	pub recv: Option<usize>,
	pub send: Option<usize>,
}

impl BufferConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn recv(mut self, size: usize) -> Self {
		self.recv = Some(size);
		self
	}

	pub fn send(mut self, size: usize) -> Self {
		self.send = Some(size);
		self
	}

	pub fn both(mut self, size: usize) -> Self {
		self.recv = Some(size);
		self.send = Some(size);
		self
	}

	fn apply<S: std::os::fd::AsRawFd>(&self, socket: &S) -> std::io::Result<()> {
		if let Some(size) = self.recv {
			set_recv_buffer_size(socket, size)?;
		}
		if let Some(size) = self.send {
			set_send_buffer_size(socket, size)?;
		}
		Ok(())
	}
}

/// Address reuse configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReuseConfig {
	pub addr: bool,
	pub port: bool,
}

impl ReuseConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn addr(mut self, enable: bool) -> Self {
		self.addr = enable;
		self
	}

	pub fn port(mut self, enable: bool) -> Self {
		self.port = enable;
		self
	}

	/// Enable both for load balancing across threads.
	pub fn both(mut self) -> Self {
		self.addr = true;
		self.port = true;
		self
	}

	fn apply<S: std::os::fd::AsRawFd>(&self, socket: &S) -> std::io::Result<()> {
		if self.addr {
			set_reuse_addr(socket, true)?;
		}
		if self.port {
			set_reuse_port(socket, true)?;
		}
		Ok(())
	}
}

/// Builder for UDP/Unix datagram sockets.
///
/// # Example
/// ```ignore
/// use gramlane::{Ipv4, SocketAddrV4, DatagramBuilder, ReuseConfig, BufferConfig};
///
/// let socket = DatagramBuilder::<Ipv4>::new()
///     .reuse(ReuseConfig::new().addr(true))
///     .buffers(BufferConfig::new().recv(1048576))  // 1MB receive buffer
///     .bind(SocketAddrV4::new([0, 0, 0, 0], 5353))?;
/// ```
pub struct DatagramBuilder<D: Domain> {
	reuse: ReuseConfig,
	buffers: BufferConfig,
	nonblocking: bool,
	_marker: PhantomData<D>,
}

impl<D: Domain> Default for DatagramBuilder<D> {
	fn default() -> Self {
		Self::new()
	}
}

impl<D: Domain> DatagramBuilder<D> {
	pub fn new() -> Self {
		Self {
			reuse: ReuseConfig::default(),
			buffers: BufferConfig::default(),
			nonblocking: false,
			_marker: PhantomData,
		}
	}

	/// Set address reuse options.
	pub fn reuse(mut self, config: ReuseConfig) -> Self {
		self.reuse = config;
		self
	}

	/// Set buffer sizes.
	pub fn buffers(mut self, config: BufferConfig) -> Self {
		self.buffers = config;
		self
	}

	/// Set non-blocking mode.
	pub fn nonblocking(mut self, enable: bool) -> Self {
		self.nonblocking = enable;
		self
	}

	/// Binds to an address.
	pub fn bind(self, addr: D::Addr) -> std::io::Result<BoundDatagram<D>>
	where
		D::Addr: ToSockAddr, <D as Domain>::Addr: Debug
	{
		let socket = RawSocket::<D, Datagram>::new()?;

		self.reuse.apply(&socket)?;
		self.buffers.apply(&socket)?;

		if self.nonblocking {
			socket.set_nonblocking(true)?;
		}

		socket.bind_datagram(addr)
	}
}
