pub mod exec;
pub mod socket;
mod addr;
mod error;
mod protocol;

pub use self::error::{IoError, SocketError, errno, is_not_open};
pub use self::addr::{Domain, Endpoint, FromSockAddr, ToSockAddr,
					 Ipv4, Ipv6, Unix,
					 SocketAddrV4, SocketAddrV6, UnixAddr};
pub use self::protocol::Protocol;
pub use self::socket::{AnyDatagram, IntoAnyDatagram,
					 RawSocket, BoundDatagram, ConnectedDatagram,
					 Datagram, SockType, SockFd, Shutdown,
					 DatagramBuilder, BufferConfig, ReuseConfig};
pub use self::socket::{SetOption, GetOption, IoControl,
					 SendBufferSize, RecvBufferSize, ReuseAddr, Broadcast,
					 BytesReadable, AtMark,
					 set_reuse_addr, set_reuse_port, set_nonblocking,
					 set_recv_buffer_size, set_send_buffer_size};
pub use self::exec::{Driver, Exec, Handler, Outcome, Waiter,
					 blocking, callback, immediate};
