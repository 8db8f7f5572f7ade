use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

use crate::error::{SocketError, errno};

/// Owns at most one socket descriptor.
///
/// Exactly one SockFd owns a given descriptor at a time; moving the
/// wrapper moves the descriptor with it, and `release` transfers it out
/// without closing. Drop closes exactly once through OwnedFd.
#[derive(Debug, Default)]
pub struct SockFd {
	fd: Option<OwnedFd>,
}

impl SockFd {
	pub fn new() -> Self {
		Self { fd: None }
	}

	/// Assumes ownership of an externally obtained descriptor.
	/// Fails if one is already owned.
	pub fn open(&mut self, fd: OwnedFd) -> std::io::Result<()> {
		if self.fd.is_some() {
			return Err(SocketError::AlreadyOpen.into());
		}
		self.fd = Some(fd);
		Ok(())
	}

	#[inline]
	pub fn is_open(&self) -> bool {
		self.fd.is_some()
	}

	/// The raw descriptor, if open. Does not transfer ownership.
	pub fn raw(&self) -> Option<RawFd> {
		self.fd.as_ref().map(|fd| fd.as_raw_fd())
	}

	/// The raw descriptor, or NotOpen.
	pub fn get(&self) -> std::io::Result<RawFd> {
		self.raw().ok_or_else(|| SocketError::NotOpen.into())
	}

	/// Transfers the descriptor out without closing it, leaving the
	/// wrapper closed.
	pub fn release(&mut self) -> Option<OwnedFd> {
		self.fd.take()
	}

	/// Releases the OS resource. Idempotent; a close-syscall failure is
	/// reported rather than swallowed, and the wrapper is closed either
	/// way.
	pub fn close(&mut self) -> std::io::Result<()> {
		match self.fd.take() {
			None => Ok(()),
			Some(fd) => {
				let raw = fd.into_raw_fd();
				if unsafe { libc::close(raw) } == -1 {
					Err(std::io::Error::from_raw_os_error(errno()))
				} else {
					Ok(())
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::os::fd::FromRawFd;

	fn dgram_fd() -> OwnedFd {
		let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
		assert!(raw >= 0);
		unsafe { OwnedFd::from_raw_fd(raw) }
	}

	#[test]
	fn open_twice_fails() {
		let mut sock = SockFd::new();
		sock.open(dgram_fd()).unwrap();
		let err = sock.open(dgram_fd()).unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
		assert!(sock.is_open());
	}

	#[test]
	fn close_is_idempotent() {
		let mut sock = SockFd::new();
		sock.open(dgram_fd()).unwrap();
		sock.close().unwrap();
		assert!(!sock.is_open());
		sock.close().unwrap();
	}

	#[test]
	fn release_leaves_wrapper_closed() {
		let mut sock = SockFd::new();
		sock.open(dgram_fd()).unwrap();
		let fd = sock.release().unwrap();
		assert!(!sock.is_open());
		assert!(sock.get().is_err());
		drop(fd);
	}

	#[test]
	fn get_on_closed_is_not_open() {
		let sock = SockFd::new();
		assert!(crate::error::is_not_open(&sock.get().unwrap_err()));
	}
}
