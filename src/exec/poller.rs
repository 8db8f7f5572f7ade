// Linux-only: epoll + eventfd.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Thin wrapper around the Linux `epoll` API. All direct OS-level
/// readiness calls live here.
pub(crate) struct Poller {
	epoll: OwnedFd,
}

impl Poller {
	/// Creates a new `epoll` instance.
	pub fn new() -> io::Result<Self> {
		let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
		if fd < 0 {
			return Err(io::Error::last_os_error());
		}
		Ok(Self {
			epoll: unsafe { OwnedFd::from_raw_fd(fd) },
		})
	}

	/// Registers a descriptor with the given interest mask
	/// (level-triggered).
	pub fn add(&self, fd: RawFd, token: u64, interest: u32) -> io::Result<()> {
		self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest)
	}

	/// Replaces the interest mask of an already-registered descriptor.
	pub fn modify(&self, fd: RawFd, token: u64, interest: u32) -> io::Result<()> {
		self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest)
	}

	/// Removes a descriptor from the epoll set.
	pub fn remove(&self, fd: RawFd) -> io::Result<()> {
		self.ctl(libc::EPOLL_CTL_DEL, fd, 0, 0)
	}

	/// Waits for events, filling the provided buffer.
	/// EINTR is treated as zero events, not an error.
	pub fn wait(&self, events: &mut [libc::epoll_event], timeout_ms: i32) -> io::Result<usize> {
		let n = unsafe {
			libc::epoll_wait(
				self.epoll.as_raw_fd(),
				events.as_mut_ptr(),
				events.len() as i32,
				timeout_ms,
			)
		};
		if n < 0 {
			let err = io::Error::last_os_error();
			if err.kind() == io::ErrorKind::Interrupted {
				return Ok(0);
			}
			Err(err)
		} else {
			Ok(n as usize)
		}
	}

	fn ctl(&self, op: libc::c_int, fd: RawFd, token: u64, interest: u32) -> io::Result<()> {
		let mut event = libc::epoll_event {
			events: interest,
			u64: token,
		};
		let res = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
		if res < 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(())
		}
	}
}

/// Creates the eventfd the reactor sleeps against.
pub(crate) fn new_eventfd() -> io::Result<OwnedFd> {
	let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
	if fd < 0 {
		Err(io::Error::last_os_error())
	} else {
		Ok(unsafe { OwnedFd::from_raw_fd(fd) })
	}
}

/// Wakes the reactor out of epoll_wait.
pub(crate) fn signal(fd: RawFd) {
	let value: u64 = 1;
	let _ = unsafe {
		libc::write(
			fd,
			&value as *const u64 as *const std::ffi::c_void,
			std::mem::size_of::<u64>(),
		)
	};
}

/// Resets the eventfd counter so the next signal is observable.
pub(crate) fn drain(fd: RawFd) {
	let mut value: u64 = 0;
	let _ = unsafe {
		libc::read(
			fd,
			&mut value as *mut u64 as *mut std::ffi::c_void,
			std::mem::size_of::<u64>(),
		)
	};
}
