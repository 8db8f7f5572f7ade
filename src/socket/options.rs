use std::os::fd::AsRawFd;

use crate::error::{SocketError, errno};

/// Sets SO_REUSEADDR on a socket.
///
/// Allows binding to an address that's in TIME_WAIT state.
/// Essential for server restarts.
pub fn set_reuse_addr<S: AsRawFd>(socket: &S, enable: bool) -> std::io::Result<()> {
	let val: libc::c_int = if enable { 1 } else { 0 };
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			libc::SOL_SOCKET,
			libc::SO_REUSEADDR,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SocketError::SetOption { errno: errno(), option: "SO_REUSEADDR" }.into())
	} else {
		Ok(())
	}
}

/// Sets SO_REUSEPORT on a socket.
///
/// Allows multiple sockets to bind the same port.
/// Used for load balancing across threads/processes.
pub fn set_reuse_port<S: AsRawFd>(socket: &S, enable: bool) -> std::io::Result<()> {
	let val: libc::c_int = if enable { 1 } else { 0 };
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			libc::SOL_SOCKET,
			libc::SO_REUSEPORT,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SocketError::SetOption { errno: errno(), option: "SO_REUSEPORT" }.into())
	} else {
		Ok(())
	}
}

/// Sets receive buffer size (SO_RCVBUF).
///
/// Controls how much data the kernel buffers for incoming packets.
/// Kernel typically doubles this value internally.
pub fn set_recv_buffer_size<S: AsRawFd>(socket: &S, size: usize) -> std::io::Result<()> {
	let val = size as libc::c_int;
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			libc::SOL_SOCKET,
			libc::SO_RCVBUF,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SocketError::SetOption { errno: errno(), option: "SO_RCVBUF" }.into())
	} else {
		Ok(())
	}
}

/// Sets send buffer size (SO_SNDBUF).
///
/// Controls how much outgoing data the kernel buffers before returning
/// EAGAIN. Kernel typically doubles this value internally.
pub fn set_send_buffer_size<S: AsRawFd>(socket: &S, size: usize) -> std::io::Result<()> {
	let val = size as libc::c_int;
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			libc::SOL_SOCKET,
			libc::SO_SNDBUF,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SocketError::SetOption { errno: errno(), option: "SO_SNDBUF" }.into())
	} else {
		Ok(())
	}
}

/// Sets O_NONBLOCK via fcntl.
///
/// Required for anything the reactor drives.
pub fn set_nonblocking<S: AsRawFd>(socket: &S, nonblocking: bool) -> std::io::Result<()> {
	let flags = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_GETFL) };
	if flags == -1 {
		return Err(SocketError::GetOption { errno: errno(), option: "F_GETFL" }.into());
	}
	let new_flags = if nonblocking {
		flags | libc::O_NONBLOCK
	} else {
		flags & !libc::O_NONBLOCK
	};
	let result = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_SETFL, new_flags) };
	if result == -1 {
		return Err(SocketError::SetOption { errno: errno(), option: "O_NONBLOCK" }.into());
	}
	Ok(())
}

/// A settable socket option, opaque to the socket that applies it.
///
/// The runtime-polymorphic socket cannot know every option of every
/// family, so options describe themselves: level, name, and a view of
/// their value bytes.
pub trait SetOption {
	fn level(&self) -> libc::c_int;
	fn name(&self) -> libc::c_int;
	fn data(&self) -> *const libc::c_void;
	fn size(&self) -> libc::socklen_t;
}

/// A readable socket option.
pub trait GetOption {
	fn level(&self) -> libc::c_int;
	fn name(&self) -> libc::c_int;
	fn data_mut(&mut self) -> *mut libc::c_void;
	fn size(&self) -> libc::socklen_t;
	/// Called with the length the kernel reported back.
	fn resize(&mut self, _len: libc::socklen_t) {}
}

/// An opaque device-control command (ioctl).
pub trait IoControl {
	fn cmd(&self) -> libc::c_ulong;
	fn data_mut(&mut self) -> *mut libc::c_void;
}

macro_rules! int_option {
	($(#[$doc:meta])* $name:ident, $level:expr, $optname:expr) => {
		$(#[$doc])*
		#[derive(Debug, Default, Clone, Copy)]
		pub struct $name {
			value: libc::c_int,
		}

		impl $name {
			pub fn new(value: libc::c_int) -> Self {
				Self { value }
			}

			pub fn value(&self) -> libc::c_int {
				self.value
			}
		}

		impl SetOption for $name {
			fn level(&self) -> libc::c_int {
				$level
			}
			fn name(&self) -> libc::c_int {
				$optname
			}
			fn data(&self) -> *const libc::c_void {
				&self.value as *const _ as *const libc::c_void
			}
			fn size(&self) -> libc::socklen_t {
				std::mem::size_of::<libc::c_int>() as libc::socklen_t
			}
		}

		impl GetOption for $name {
			fn level(&self) -> libc::c_int {
				$level
			}
			fn name(&self) -> libc::c_int {
				$optname
			}
			fn data_mut(&mut self) -> *mut libc::c_void {
				&mut self.value as *mut _ as *mut libc::c_void
			}
			fn size(&self) -> libc::socklen_t {
				std::mem::size_of::<libc::c_int>() as libc::socklen_t
			}
		}
	};
}

int_option!(
	/// SO_SNDBUF as an option object.
	SendBufferSize,
	libc::SOL_SOCKET,
	libc::SO_SNDBUF
);

int_option!(
	/// SO_RCVBUF as an option object.
	RecvBufferSize,
	libc::SOL_SOCKET,
	libc::SO_RCVBUF
);

int_option!(
	/// SO_REUSEADDR as an option object. Nonzero enables.
	ReuseAddr,
	libc::SOL_SOCKET,
	libc::SO_REUSEADDR
);

int_option!(
	/// SO_BROADCAST as an option object. Nonzero enables.
	Broadcast,
	libc::SOL_SOCKET,
	libc::SO_BROADCAST
);

/// FIONREAD: bytes readable without blocking.
#[derive(Debug, Default)]
pub struct BytesReadable {
	value: libc::c_int,
}

impl BytesReadable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self) -> usize {
		self.value.max(0) as usize
	}
}

impl IoControl for BytesReadable {
	fn cmd(&self) -> libc::c_ulong {
		libc::FIONREAD as libc::c_ulong
	}
	fn data_mut(&mut self) -> *mut libc::c_void {
		&mut self.value as *mut _ as *mut libc::c_void
	}
}

/// SIOCATMARK ioctl request value on Linux.
///
/// The `libc` crate does not export this constant for Linux targets
/// (only for Apple platforms), so it is provided here verbatim from
/// `<asm-generic/sockios.h>`.
#[cfg(target_os = "linux")]
const SIOCATMARK: libc::c_ulong = 0x8905;

/// SIOCATMARK: out-of-band boundary probe.
///
/// Meaningful only for protocols that define an out-of-band marker;
/// what a pure datagram protocol reports is up to the OS.
#[derive(Debug, Default)]
pub struct AtMark {
	value: libc::c_int,
}

impl AtMark {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self) -> bool {
		self.value != 0
	}
}

impl IoControl for AtMark {
	fn cmd(&self) -> libc::c_ulong {
		SIOCATMARK as libc::c_ulong
	}
	fn data_mut(&mut self) -> *mut libc::c_void {
		&mut self.value as *mut _ as *mut libc::c_void
	}
}
