use crate::addr::{Domain, Endpoint};

/// Identifies an address family / socket kind / protocol number triple
/// at runtime.
///
/// Where the typed sockets pin the family at compile time through a
/// `Domain` marker, a `Protocol` value carries the same information as
/// plain integers so one socket type can serve any family. Two values
/// are equal iff all three fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
	family: libc::c_int,
	socktype: libc::c_int,
	protocol: libc::c_int,
}

impl Protocol {
	/// Creates a datagram descriptor for the given family and protocol
	/// number. The socket kind is fixed to SOCK_DGRAM.
	pub fn datagram(family: libc::c_int, protocol: libc::c_int) -> Self {
		Self {
			family,
			socktype: libc::SOCK_DGRAM,
			protocol,
		}
	}

	/// The descriptor a default endpoint carries before any socket
	/// interprets it: family AF_UNSPEC, protocol 0.
	pub fn unspecified() -> Self {
		Self::datagram(libc::AF_UNSPEC, 0)
	}

	/// Derives the descriptor for a typed domain marker.
	///
	/// Protocol number 0 lets the OS pick the family default, which is
	/// what the typed sockets are created with.
	pub fn of<D: Domain>() -> Self {
		Self::datagram(D::raw(), 0)
	}

	/// UDP over IPv4.
	pub fn udp4() -> Self {
		Self::datagram(libc::AF_INET, libc::IPPROTO_UDP)
	}

	/// UDP over IPv6.
	pub fn udp6() -> Self {
		Self::datagram(libc::AF_INET6, libc::IPPROTO_UDP)
	}

	#[inline]
	pub fn family(&self) -> libc::c_int {
		self.family
	}

	#[inline]
	pub fn socktype(&self) -> libc::c_int {
		self.socktype
	}

	#[inline]
	pub fn protocol(&self) -> libc::c_int {
		self.protocol
	}

	/// Returns a zeroed endpoint tagged with this descriptor.
	pub fn endpoint(&self) -> Endpoint {
		Endpoint::new(*self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::addr::{Ipv4, Unix};

	#[test]
	fn equality_is_by_triple() {
		assert_eq!(Protocol::udp4(), Protocol::datagram(libc::AF_INET, libc::IPPROTO_UDP));
		assert_ne!(Protocol::udp4(), Protocol::udp6());
		assert_ne!(Protocol::udp4(), Protocol::datagram(libc::AF_INET, 0));
	}

	#[test]
	fn derived_from_domain_marker() {
		assert_eq!(Protocol::of::<Ipv4>().family(), libc::AF_INET);
		assert_eq!(Protocol::of::<Unix>().family(), libc::AF_UNIX);
		assert_eq!(Protocol::of::<Ipv4>().socktype(), libc::SOCK_DGRAM);
	}

	#[test]
	fn endpoint_factory_tags_descriptor() {
		let p = Protocol::udp4();
		let ep = p.endpoint();
		assert_eq!(ep.protocol(), p);
		assert_eq!(ep.len(), 0);
	}
}
