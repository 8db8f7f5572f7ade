/// Socket lifecycle/configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
	#[error("socket() failed: {}", errno_to_str(*.errno))]
	Create { errno: i32 },

	#[error("socket is already open")]
	AlreadyOpen,

	#[error("socket is not open")]
	NotOpen,

	#[error("socket is not connected")]
	NotConnected,

	#[error("bind({addr}) failed: {}", errno_to_str(*.errno))]
	Bind { errno: i32, addr: String },

	#[error("connect({addr}) failed: {}", errno_to_str(*.errno))]
	Connect { errno: i32, addr: String },

	#[error("setsockopt({option}) failed: {}", errno_to_str(*.errno))]
	SetOption { errno: i32, option: &'static str },

	#[error("getsockopt({option}) failed: {}", errno_to_str(*.errno))]
	GetOption { errno: i32, option: &'static str },

	#[error("invalid address: {reason}")]
	InvalidAddress { reason: &'static str },

	#[error("address length {len} exceeds storage capacity {cap}")]
	InvalidAddressLength { len: usize, cap: usize },

	#[error("endpoint family {endpoint} does not match socket family {socket}")]
	FamilyMismatch { socket: i32, endpoint: i32 },
}

/// I/O operation errors.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
	#[error("recv() failed: {}", errno_to_str(*.errno))]
	Read { errno: i32 },

	#[error("send() failed: {}", errno_to_str(*.errno))]
	Write { errno: i32 },

	#[error("operation would block")]
	WouldBlock,

	#[error("interrupted by signal")]
	Interrupted,

	#[error("operation cancelled")]
	Cancelled,
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
	unsafe { *libc::__errno_location() }
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
	match errno {
		libc::EACCES => "permission denied".into(),
		libc::EADDRINUSE => "address already in use".into(),
		libc::EADDRNOTAVAIL => "address not available".into(),
		libc::EAFNOSUPPORT => "address family not supported".into(),
		libc::EAGAIN => "resource temporarily unavailable".into(),
		libc::EBADF => "bad file descriptor".into(),
		libc::ECONNREFUSED => "connection refused".into(),
		libc::ECONNRESET => "connection reset by peer".into(),
		libc::EINPROGRESS => "operation in progress".into(),
		libc::EINTR => "interrupted by signal".into(),
		libc::EINVAL => "invalid argument".into(),
		libc::EMFILE => "too many open files".into(),
		libc::EMSGSIZE => "message too long".into(),
		libc::ENETUNREACH => "network unreachable".into(),
		libc::ENOBUFS => "no buffer space available".into(),
		libc::ENOTCONN => "not connected".into(),
		libc::EPIPE => "broken pipe".into(),
		libc::ETIMEDOUT => "connection timed out".into(),
		_ => format!("errno {}", errno),
	}
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
	match errno {
		libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
		libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
		libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
		libc::EAGAIN | libc::EWOULDBLOCK => std::io::ErrorKind::WouldBlock,
		libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
		libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
		libc::EINTR => std::io::ErrorKind::Interrupted,
		libc::EINVAL => std::io::ErrorKind::InvalidInput,
		libc::ENOTCONN => std::io::ErrorKind::NotConnected,
		libc::EPIPE => std::io::ErrorKind::BrokenPipe,
		libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
		_ => std::io::ErrorKind::Other,
	}
}

impl From<SocketError> for std::io::Error {
	fn from(err: SocketError) -> Self {
		let kind = match &err {
			SocketError::Create { errno } => errno_to_kind(*errno),
			SocketError::AlreadyOpen => std::io::ErrorKind::InvalidInput,
			SocketError::NotOpen => std::io::ErrorKind::InvalidInput,
			SocketError::NotConnected => std::io::ErrorKind::NotConnected,
			SocketError::Bind { errno, .. } => errno_to_kind(*errno),
			SocketError::Connect { errno, .. } => errno_to_kind(*errno),
			SocketError::SetOption { errno, .. } => errno_to_kind(*errno),
			SocketError::GetOption { errno, .. } => errno_to_kind(*errno),
			SocketError::InvalidAddress { .. } => std::io::ErrorKind::InvalidInput,
			SocketError::InvalidAddressLength { .. } => std::io::ErrorKind::InvalidInput,
			SocketError::FamilyMismatch { .. } => std::io::ErrorKind::InvalidInput,
		};
		std::io::Error::new(kind, err)
	}
}

impl From<IoError> for std::io::Error {
	fn from(err: IoError) -> Self {
		let kind = match &err {
			IoError::Read { errno } => errno_to_kind(*errno),
			IoError::Write { errno } => errno_to_kind(*errno),
			IoError::WouldBlock => std::io::ErrorKind::WouldBlock,
			IoError::Interrupted => std::io::ErrorKind::Interrupted,
			IoError::Cancelled => std::io::ErrorKind::Interrupted,
		};
		std::io::Error::new(kind, err)
	}
}

/// True if the io::Error wraps this crate's NotOpen case.
///
/// Callers that need to tell the crate's own lifecycle failures apart
/// from raw OS errors can use this instead of downcasting by hand.
pub fn is_not_open(err: &std::io::Error) -> bool {
	err.get_ref()
		.and_then(|inner| inner.downcast_ref::<SocketError>())
		.is_some_and(|e| matches!(e, SocketError::NotOpen))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_open_is_detectable_through_io_error() {
		let io: std::io::Error = SocketError::NotOpen.into();
		assert!(is_not_open(&io));
		let os: std::io::Error = IoError::Read { errno: libc::ECONNRESET }.into();
		assert!(!is_not_open(&os));
	}

	#[test]
	fn errno_maps_to_kind() {
		let io: std::io::Error = IoError::Write { errno: libc::EPIPE }.into();
		assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
	}
}
