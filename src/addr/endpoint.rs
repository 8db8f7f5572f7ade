use crate::addr::{FromSockAddr, ToSockAddr};
use crate::error::SocketError;
use crate::protocol::Protocol;

/// A type-erased socket address.
///
/// Holds enough storage for the largest native address representation
/// plus the number of bytes actually in use, tagged with the Protocol
/// that produced it. Typed addresses (SocketAddrV4, UnixAddr, ...) move
/// in and out through the same ToSockAddr/FromSockAddr traits the typed
/// sockets use.
#[derive(Clone, Copy)]
pub struct Endpoint {
	storage: libc::sockaddr_storage,
	len: libc::socklen_t,
	proto: Protocol,
}

impl Endpoint {
	/// Zeroed endpoint tagged with the given descriptor.
	pub fn new(proto: Protocol) -> Self {
		Self {
			storage: unsafe { std::mem::zeroed() },
			len: 0,
			proto,
		}
	}

	/// Maximum native address size this endpoint can hold.
	pub const fn capacity() -> usize {
		std::mem::size_of::<libc::sockaddr_storage>()
	}

	/// Creates an endpoint by copying a raw native address.
	///
	/// Fails if `len` exceeds the storage capacity.
	///
	/// # Safety
	/// `addr` must point to at least `len` readable bytes of a valid
	/// sockaddr for the stated protocol.
	pub unsafe fn from_raw(
		proto: Protocol,
		addr: *const libc::sockaddr,
		len: libc::socklen_t,
	) -> std::io::Result<Self> {
		if len as usize > Self::capacity() {
			return Err(SocketError::InvalidAddressLength {
				len: len as usize,
				cap: Self::capacity(),
			}
			.into());
		}
		let mut ep = Self::new(proto);
		unsafe {
			std::ptr::copy_nonoverlapping(
				addr as *const u8,
				&mut ep.storage as *mut _ as *mut u8,
				len as usize,
			);
		}
		ep.len = len;
		Ok(ep)
	}

	/// Creates an endpoint from a typed address.
	pub fn from_addr<A: ToSockAddr>(proto: Protocol, addr: &A) -> std::io::Result<Self> {
		addr.with_raw(|ptr, len| unsafe { Self::from_raw(proto, ptr, len) })
			.ok_or_else(|| -> std::io::Error {
				SocketError::InvalidAddress { reason: "address too long" }.into()
			})?
	}

	/// Reinterprets the stored bytes as a typed address.
	///
	/// Returns None if the bytes are too short for the requested type.
	pub fn to_addr<A: FromSockAddr>(&self) -> Option<A> {
		unsafe { A::from_sockaddr(self.data(), self.len) }
	}

	/// The descriptor this endpoint was produced with.
	#[inline]
	pub fn protocol(&self) -> Protocol {
		self.proto
	}

	/// Address family of the stored bytes; falls back to the tag while
	/// the endpoint is still zero-length.
	pub fn family(&self) -> libc::c_int {
		if self.len == 0 {
			self.proto.family()
		} else {
			self.storage.ss_family as libc::c_int
		}
	}

	/// Raw pointer for the native I/O layer.
	#[inline]
	pub fn data(&self) -> *const libc::sockaddr {
		&self.storage as *const _ as *const libc::sockaddr
	}

	/// Mutable raw pointer for syscalls that fill in an address.
	#[inline]
	pub fn data_mut(&mut self) -> *mut libc::sockaddr {
		&mut self.storage as *mut _ as *mut libc::sockaddr
	}

	/// Number of bytes in use.
	#[inline]
	pub fn len(&self) -> usize {
		self.len as usize
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub(crate) fn socklen(&self) -> libc::socklen_t {
		self.len
	}

	pub(crate) fn set_socklen(&mut self, len: libc::socklen_t) {
		debug_assert!(len as usize <= Self::capacity());
		self.len = len;
	}

	fn bytes(&self) -> &[u8] {
		unsafe {
			std::slice::from_raw_parts(
				&self.storage as *const _ as *const u8,
				self.len as usize,
			)
		}
	}
}

impl Default for Endpoint {
	fn default() -> Self {
		Self::new(Protocol::unspecified())
	}
}

/// Byte-for-byte content plus length; the protocol tag does not
/// participate.
impl PartialEq for Endpoint {
	fn eq(&self, other: &Self) -> bool {
		self.len == other.len && self.bytes() == other.bytes()
	}
}

impl Eq for Endpoint {}

impl std::fmt::Debug for Endpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Endpoint")
			.field("family", &self.family())
			.field("len", &self.len)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::addr::SocketAddrV4;

	#[test]
	fn default_is_zero_length() {
		let ep = Endpoint::default();
		assert_eq!(ep.len(), 0);
		assert_eq!(ep.family(), libc::AF_UNSPEC);
	}

	#[test]
	fn typed_address_round_trips() {
		let addr = SocketAddrV4::new([127, 0, 0, 1], 9000);
		let ep = Endpoint::from_addr(Protocol::udp4(), &addr).unwrap();
		assert_eq!(ep.family(), libc::AF_INET);
		assert!(ep.len() >= std::mem::size_of::<libc::sockaddr_in>());
		let back: SocketAddrV4 = ep.to_addr().unwrap();
		assert_eq!(back, addr);
	}

	#[test]
	fn equality_ignores_protocol_tag() {
		let addr = SocketAddrV4::new([10, 0, 0, 1], 53);
		let a = Endpoint::from_addr(Protocol::udp4(), &addr).unwrap();
		let b = Endpoint::from_addr(Protocol::datagram(libc::AF_INET, 0), &addr).unwrap();
		assert_eq!(a, b);
		let c = Endpoint::from_addr(Protocol::udp4(), &SocketAddrV4::new([10, 0, 0, 2], 53)).unwrap();
		assert_ne!(a, c);
	}

	#[test]
	fn oversized_length_is_rejected() {
		let addr = SocketAddrV4::new([127, 0, 0, 1], 1);
		let raw = Endpoint::from_addr(Protocol::udp4(), &addr).unwrap();
		let err = unsafe {
			Endpoint::from_raw(Protocol::udp4(), raw.data(), (Endpoint::capacity() + 1) as libc::socklen_t)
		}
		.unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
	}
}
