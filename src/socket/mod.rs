mod any;
mod builder;
mod datagram;
mod fd;
mod options;
mod raw;
pub(crate) mod transfer;

pub use self::any::{AnyDatagram, IntoAnyDatagram};
pub use self::builder::{BufferConfig, DatagramBuilder, ReuseConfig};
pub use self::datagram::{BoundDatagram, ConnectedDatagram};
pub use self::fd::SockFd;
pub use self::options::{
	AtMark, Broadcast, BytesReadable, GetOption, IoControl, RecvBufferSize,
	ReuseAddr, SendBufferSize, SetOption,
	set_nonblocking, set_recv_buffer_size, set_reuse_addr, set_reuse_port,
	set_send_buffer_size,
};
pub use self::raw::RawSocket;

/// Trait for socket type markers.
///
/// Each type implementing this trait represents a socket type
/// that can be passed to the `socket()` syscall.
pub trait SockType {
	/// Returns the libc constant for this socket type.
	fn raw() -> libc::c_int;
}

/// Datagram socket marker.
///
/// Provides unreliable, unordered packets.
/// Used for UDP (with Ipv4/Ipv6) or Unix datagram sockets.
pub struct Datagram;

impl SockType for Datagram {
	#[inline]
	fn raw() -> libc::c_int {
		libc::SOCK_DGRAM
	}
}

/// Which half of the socket to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	Read,
	Write,
	Both,
}

impl Shutdown {
	pub(crate) fn raw(self) -> libc::c_int {
		match self {
			Shutdown::Read => libc::SHUT_RD,
			Shutdown::Write => libc::SHUT_WR,
			Shutdown::Both => libc::SHUT_RDWR,
		}
	}
}
