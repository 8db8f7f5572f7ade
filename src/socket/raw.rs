use std::marker::PhantomData;
use std::os::fd::{FromRawFd, OwnedFd};

use crate::addr::{Domain, ToSockAddr};
use crate::error::{SocketError, errno};
use crate::socket::datagram::BoundDatagram;
use crate::socket::options;

use super::{Datagram, SockType};

/// A socket that has been created but not yet bound or connected.
///
/// This is the starting point for the typed socket flows.
/// Use `.bind_datagram()` to get a usable datagram socket.
pub struct RawSocket<D: Domain, T: SockType> {
	fd: OwnedFd,
	_marker: PhantomData<(D, T)>,
}

impl<D: Domain, T: SockType> RawSocket<D, T> {
	/// Creates a new raw socket.
	///
	/// Calls the `socket()` syscall with the appropriate domain and type.
	/// The socket is created with `SOCK_CLOEXEC` (close on exec).
	pub fn new() -> std::io::Result<Self> {
		let fd = unsafe { libc::socket(D::raw(), T::raw() | libc::SOCK_CLOEXEC, 0) };
		if fd == -1 {
			return Err(SocketError::Create { errno: errno() }.into());
		}
		let fd = unsafe { OwnedFd::from_raw_fd(fd) };

		Ok(Self {
			fd,
			_marker: PhantomData,
		})
	}

	/// Returns the raw file descriptor.
	///
	/// Used internally for syscalls. Does not transfer ownership.
	#[inline]
	pub fn as_raw_fd(&self) -> libc::c_int {
		use std::os::fd::AsRawFd;
		self.fd.as_raw_fd()
	}

	/// Sets the socket to non-blocking mode.
	pub fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
		options::set_nonblocking(&self.fd, nonblocking)
	}

	pub(crate) fn into_fd(self) -> OwnedFd {
		self.fd
	}
}

impl<D: Domain> RawSocket<D, Datagram> {
	/// Binds the socket to an address.
	///
	/// Consumes self, returns a datagram socket ready for send/recv.
	/// The address type is determined by the Domain:
	/// - Ipv4 → SocketAddrV4
	/// - Ipv6 → SocketAddrV6
	/// - Unix → UnixAddr
	pub fn bind_datagram(self, addr: D::Addr) -> std::io::Result<BoundDatagram<D>>
	where
		D::Addr: ToSockAddr + std::fmt::Debug,
	{
		let result = addr.with_raw(|ptr, len| unsafe {
			libc::bind(self.as_raw_fd(), ptr, len)
		});

		match result {
			Some(-1) => Err(SocketError::Bind {
				errno: errno(),
				addr: format!("{:?}", addr),
			}
			.into()),
			Some(_) => Ok(BoundDatagram::from_fd(self.into_fd())),
			None => Err(SocketError::InvalidAddress {
				reason: "address too long",
			}
			.into()),
		}
	}
}

impl<D: Domain, T: SockType> std::os::fd::AsRawFd for RawSocket<D, T> {
	fn as_raw_fd(&self) -> std::os::fd::RawFd {
		self.fd.as_raw_fd()
	}
}

impl<D: Domain, T: SockType> std::os::fd::AsFd for RawSocket<D, T> {
	fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

impl<D: Domain, T: SockType> std::os::fd::FromRawFd for RawSocket<D, T> {
	unsafe fn from_raw_fd(fd: std::os::fd::RawFd) -> Self {
		unsafe {
			Self {
				fd: OwnedFd::from_raw_fd(fd),
				_marker: PhantomData,
			}
		}
	}
}

impl<D: Domain, T: SockType> std::os::fd::IntoRawFd for RawSocket<D, T> {
	fn into_raw_fd(self) -> std::os::fd::RawFd {
		self.fd.into_raw_fd()
	}
}
