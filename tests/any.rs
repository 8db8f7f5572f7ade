use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use test_case::test_case;

use gramlane::{
	AnyDatagram, DatagramBuilder, Driver, Endpoint, Ipv4, Outcome, Protocol,
	SocketAddrV4, SocketError, Unix, UnixAddr, blocking, callback, immediate,
	is_not_open,
};

fn v4_endpoint(port: u16) -> Endpoint {
	Endpoint::from_addr(Protocol::udp4(), &SocketAddrV4::loopback(port)).unwrap()
}

fn udp_socket(driver: &Driver) -> AnyDatagram {
	let mut sock = AnyDatagram::new(driver.handle());
	sock.open(Protocol::udp4()).unwrap();
	sock.bind(&v4_endpoint(0)).unwrap();
	sock
}

fn is_family_mismatch(err: &std::io::Error) -> bool {
	err.get_ref()
		.and_then(|inner| inner.downcast_ref::<SocketError>())
		.is_some_and(|e| matches!(e, SocketError::FamilyMismatch { .. }))
}

#[test]
fn endpoint_factory_tags_its_descriptor() {
	for proto in [Protocol::udp4(), Protocol::udp6(), Protocol::of::<Unix>()] {
		let ep = proto.endpoint();
		assert_eq!(ep.protocol(), proto);
		assert_eq!(ep.len(), 0);
	}
}

#[test]
fn erasing_a_typed_socket_moves_the_descriptor() {
	let driver = Driver::new().unwrap();
	let typed = DatagramBuilder::<Ipv4>::new()
		.bind(SocketAddrV4::loopback(0))
		.unwrap();
	let port = typed.local_addr().unwrap().port();
	assert_ne!(port, 0);

	// The typed socket is consumed by the conversion.
	let sock = AnyDatagram::adopt(driver.handle(), typed).unwrap();
	assert!(sock.is_open());
	assert_eq!(sock.protocol(), Protocol::of::<Ipv4>());

	let local: SocketAddrV4 = sock.local_endpoint().unwrap().to_addr().unwrap();
	assert_eq!(local.port(), port);
}

#[test]
fn assigning_a_typed_socket_replaces_the_old_descriptor() {
	let driver = Driver::new().unwrap();
	let mut sock = udp_socket(&driver);
	let old = sock.native_handle().unwrap();

	let typed = DatagramBuilder::<Ipv4>::new()
		.bind(SocketAddrV4::loopback(0))
		.unwrap();
	let port = typed.local_addr().unwrap().port();
	sock.assign_socket(typed).unwrap();

	assert!(sock.is_open());
	let local: SocketAddrV4 = sock.local_endpoint().unwrap().to_addr().unwrap();
	assert_eq!(local.port(), port);
	let _ = old; // closed by the assignment
}

#[test]
fn open_twice_is_already_open() {
	let driver = Driver::new().unwrap();
	let mut sock = AnyDatagram::new(driver.handle());
	assert!(!sock.is_open());
	sock.open(Protocol::udp4()).unwrap();
	let err = sock.open(Protocol::udp4()).unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn every_operation_fails_not_open_after_close() {
	let driver = Driver::new().unwrap();
	let mut sock = udp_socket(&driver);
	sock.close().unwrap();
	// close is idempotent, everything else reports NotOpen
	sock.close().unwrap();

	let target = v4_endpoint(9);
	let mut buf = [0u8; 8];

	assert!(is_not_open(&sock.bind(&target).unwrap_err()));
	assert!(is_not_open(&sock.connect(&target).unwrap_err()));
	assert!(is_not_open(&sock.local_endpoint().unwrap_err()));
	assert!(is_not_open(&sock.remote_endpoint().unwrap_err()));
	assert!(is_not_open(&sock.send(b"x").unwrap_err()));
	assert!(is_not_open(&sock.recv(&mut buf).unwrap_err()));
	assert!(is_not_open(&sock.send_to(b"x", &target).unwrap_err()));
	assert!(is_not_open(&sock.recv_from(&mut buf).unwrap_err()));
	assert!(is_not_open(&sock.probe_send().unwrap_err()));
	assert!(is_not_open(&sock.probe_recv().unwrap_err()));
	assert!(is_not_open(&sock.available().unwrap_err()));
	assert!(is_not_open(&sock.at_mark().unwrap_err()));
	assert!(is_not_open(&sock.shutdown(gramlane::Shutdown::Both).unwrap_err()));
	assert!(is_not_open(&sock.cancel().unwrap_err()));
	assert!(is_not_open(&sock.release().unwrap_err()));
	assert!(is_not_open(
		&sock.set_option(&gramlane::SendBufferSize::new(16384)).unwrap_err()
	));
	let mut opt = gramlane::SendBufferSize::new(0);
	assert!(is_not_open(&sock.get_option(&mut opt).unwrap_err()));
	let mut cmd = gramlane::BytesReadable::new();
	assert!(is_not_open(&sock.io_control(&mut cmd).unwrap_err()));

	// Asynchronous forms report through the completion, never by
	// returning an error.
	let (handler, waiter) = blocking::<usize>();
	sock.async_send(b"x".to_vec(), handler);
	match waiter.wait() {
		Outcome::Failed(e) => assert!(is_not_open(&e)),
		other => panic!("unexpected outcome: {:?}", other),
	}

	// Reopening works after close.
	sock.open(Protocol::udp4()).unwrap();
	assert!(sock.is_open());
}

#[test_case(1)]
#[test_case(512)]
#[test_case(4096)]
fn send_to_recv_from_round_trips(len: usize) {
	let driver = Driver::new().unwrap();
	let a = udp_socket(&driver);
	let b = udp_socket(&driver);

	let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
	let sent = a.send_to(&payload, &b.local_endpoint().unwrap()).unwrap();
	assert_eq!(sent, len);

	let mut buf = vec![0u8; len + 16];
	let (n, from) = b.recv_from(&mut buf).unwrap();
	assert_eq!(n, len);
	assert_eq!(&buf[..n], &payload[..]);
	assert_eq!(from, a.local_endpoint().unwrap());
}

#[test]
fn connected_send_recv_round_trips() {
	let driver = Driver::new().unwrap();
	let a = udp_socket(&driver);
	let b = udp_socket(&driver);

	a.connect(&b.local_endpoint().unwrap()).unwrap();
	assert_eq!(a.remote_endpoint().unwrap(), b.local_endpoint().unwrap());

	a.send(b"hello").unwrap();
	let mut buf = [0u8; 16];
	let n = b.recv(&mut buf).unwrap();
	assert_eq!(&buf[..n], b"hello");
}

#[test]
fn unconnected_remote_endpoint_is_not_connected() {
	let driver = Driver::new().unwrap();
	let sock = udp_socket(&driver);
	let err = sock.remote_endpoint().unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
}

#[test]
fn ephemeral_bind_reports_the_assigned_port() {
	let driver = Driver::new().unwrap();
	let mut sock = AnyDatagram::new(driver.handle());
	sock.open(Protocol::udp4()).unwrap();
	sock.bind(&v4_endpoint(0)).unwrap();
	let local: SocketAddrV4 = sock.local_endpoint().unwrap().to_addr().unwrap();
	assert_ne!(local.port(), 0);
}

#[test]
fn cross_family_endpoint_is_rejected_before_the_syscall() {
	let driver = Driver::new().unwrap();
	let sock = udp_socket(&driver);
	let v6 = Endpoint::from_addr(Protocol::udp6(), &gramlane::SocketAddrV6::loopback(9)).unwrap();
	let err = sock.send_to(b"x", &v6).unwrap_err();
	assert!(is_family_mismatch(&err));
}

#[test]
fn unix_abstract_datagram_round_trips() {
	let driver = Driver::new().unwrap();
	let proto = Protocol::of::<Unix>();

	let mut a = AnyDatagram::new(driver.handle());
	a.open(proto).unwrap();
	a.bind(&Endpoint::from_addr(proto, &UnixAddr::abstract_socket(b"gramlane.test.a")).unwrap())
		.unwrap();

	let mut b = AnyDatagram::new(driver.handle());
	b.open(proto).unwrap();
	b.bind(&Endpoint::from_addr(proto, &UnixAddr::abstract_socket(b"gramlane.test.b")).unwrap())
		.unwrap();

	a.send_to(b"local", &b.local_endpoint().unwrap()).unwrap();
	let mut buf = [0u8; 16];
	let (n, from) = b.recv_from(&mut buf).unwrap();
	assert_eq!(&buf[..n], b"local");
	assert_eq!(from, a.local_endpoint().unwrap());

	let sender: UnixAddr = from.to_addr().unwrap();
	assert!(sender.is_abstract());
}

#[test]
fn exactly_one_completion_per_async_operation() {
	let driver = Driver::new().unwrap();
	let a = udp_socket(&driver);
	let b = udp_socket(&driver);
	a.connect(&b.local_endpoint().unwrap()).unwrap();

	let count = Arc::new(AtomicUsize::new(0));
	let (tx, rx) = mpsc::channel();
	let count2 = count.clone();
	a.async_send(
		b"once".to_vec(),
		callback(move |outcome| {
			count2.fetch_add(1, Ordering::SeqCst);
			let _ = tx.send(outcome);
		}),
	);

	let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
	assert!(matches!(outcome, Outcome::Done(4)));
	// Give a hypothetical duplicate delivery time to show up.
	thread::sleep(Duration::from_millis(50));
	assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_delivers_cancelled_for_every_in_flight_operation() {
	let driver = Driver::new().unwrap();
	let sock = udp_socket(&driver);

	let (tx, rx) = mpsc::channel();
	for _ in 0..3 {
		let tx = tx.clone();
		sock.async_recv(
			64,
			callback(move |outcome| {
				let _ = tx.send(outcome);
			}),
		);
	}

	sock.cancel().unwrap();

	for _ in 0..3 {
		let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
		assert!(outcome.is_cancelled(), "expected Cancelled, got {:?}", outcome);
	}
	assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn close_cancels_in_flight_operations() {
	let driver = Driver::new().unwrap();
	let mut sock = udp_socket(&driver);

	let (handler, waiter) = blocking::<Vec<u8>>();
	sock.async_recv(64, handler);
	sock.close().unwrap();

	assert!(waiter.wait().is_cancelled());
	assert!(!sock.is_open());
}

#[test]
fn driver_teardown_cancels_in_flight_operations() {
	let driver = Driver::new().unwrap();
	let sock = udp_socket(&driver);

	let (handler, waiter) = blocking::<Vec<u8>>();
	sock.async_recv(64, handler);
	drop(driver);

	assert!(waiter.wait().is_cancelled());
}

#[test]
fn receive_completions_deliver_in_issuance_order() {
	let driver = Driver::new().unwrap();
	let receiver = udp_socket(&driver);
	let sender = udp_socket(&driver);
	let target = receiver.local_endpoint().unwrap();

	let order: Arc<Mutex<Vec<(&'static str, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
	let (tx, rx) = mpsc::channel();

	for tag in ["first", "second"] {
		let order = order.clone();
		let tx = tx.clone();
		receiver.async_recv(
			64,
			callback(move |outcome| {
				if let Outcome::Done(data) = outcome {
					order.lock().unwrap().push((tag, data));
				}
				let _ = tx.send(());
			}),
		);
	}

	sender.send_to(b"one", &target).unwrap();
	sender.send_to(b"two", &target).unwrap();

	rx.recv_timeout(Duration::from_secs(5)).unwrap();
	rx.recv_timeout(Duration::from_secs(5)).unwrap();

	let order = order.lock().unwrap();
	assert_eq!(order.len(), 2);
	assert_eq!(order[0], ("first", b"one".to_vec()));
	assert_eq!(order[1], ("second", b"two".to_vec()));
}

#[test]
fn async_recv_from_reports_the_sender() {
	let driver = Driver::new().unwrap();
	let receiver = udp_socket(&driver);
	let sender = udp_socket(&driver);

	let (handler, waiter) = blocking::<(Vec<u8>, Endpoint)>();
	receiver.async_recv_from(64, handler);
	sender
		.send_to(b"who", &receiver.local_endpoint().unwrap())
		.unwrap();

	match waiter.wait() {
		Outcome::Done((data, from)) => {
			assert_eq!(data, b"who".to_vec());
			assert_eq!(from, sender.local_endpoint().unwrap());
		}
		other => panic!("unexpected outcome: {:?}", other),
	}
}

#[test]
fn immediate_handler_runs_before_the_call_returns() {
	let driver = Driver::new().unwrap();
	let a = udp_socket(&driver);
	let b = udp_socket(&driver);
	a.connect(&b.local_endpoint().unwrap()).unwrap();

	let ran_on: Arc<Mutex<Option<thread::ThreadId>>> = Arc::new(Mutex::new(None));
	let ran_on2 = ran_on.clone();
	// A UDP send with buffer space free completes speculatively, so an
	// immediate handler fires on the calling thread.
	a.async_send(
		b"now".to_vec(),
		immediate(move |outcome| {
			assert!(outcome.is_done());
			*ran_on2.lock().unwrap() = Some(thread::current().id());
		}),
	);

	assert_eq!(*ran_on.lock().unwrap(), Some(thread::current().id()));
}

#[test]
fn deferred_handler_never_runs_inline() {
	let driver = Driver::new().unwrap();
	let a = udp_socket(&driver);
	let b = udp_socket(&driver);
	a.connect(&b.local_endpoint().unwrap()).unwrap();

	let (tx, rx) = mpsc::channel();
	a.async_send(
		b"later".to_vec(),
		callback(move |outcome| {
			assert!(outcome.is_done());
			let _ = tx.send(thread::current().id());
		}),
	);

	let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
	assert_ne!(ran_on, thread::current().id());
}

#[test]
fn blocking_adapter_presents_async_as_sync() {
	let driver = Driver::new().unwrap();
	let receiver = udp_socket(&driver);
	let sender = udp_socket(&driver);
	let target = receiver.local_endpoint().unwrap();

	let (handler, waiter) = blocking::<Vec<u8>>();
	receiver.async_recv(64, handler);

	let sender_thread = thread::spawn(move || {
		thread::sleep(Duration::from_millis(20));
		sender.send_to(b"wake", &target).unwrap();
		sender
	});

	match waiter.wait() {
		Outcome::Done(data) => assert_eq!(data, b"wake".to_vec()),
		other => panic!("unexpected outcome: {:?}", other),
	}
	drop(sender_thread.join().unwrap());
}

#[test]
fn probe_receive_consumes_nothing() {
	let driver = Driver::new().unwrap();
	let receiver = udp_socket(&driver);
	let sender = udp_socket(&driver);

	sender
		.send_to(b"still here", &receiver.local_endpoint().unwrap())
		.unwrap();

	let (handler, waiter) = blocking::<usize>();
	receiver.async_probe_recv(handler);
	match waiter.wait() {
		Outcome::Done(0) => {}
		other => panic!("unexpected outcome: {:?}", other),
	}

	// The datagram is still queued after the probe.
	assert!(receiver.available().unwrap() >= b"still here".len());
	let mut buf = [0u8; 32];
	let (n, _) = receiver.recv_from(&mut buf).unwrap();
	assert_eq!(&buf[..n], b"still here");
}

#[test]
fn zero_length_send_wakes_the_peer() {
	let driver = Driver::new().unwrap();
	let a = udp_socket(&driver);
	let b = udp_socket(&driver);

	a.send_to(&[], &b.local_endpoint().unwrap()).unwrap();
	b.probe_recv().unwrap();
	let mut buf = [0u8; 8];
	let (n, from) = b.recv_from(&mut buf).unwrap();
	assert_eq!(n, 0);
	assert_eq!(from, a.local_endpoint().unwrap());
}

#[test]
fn options_round_trip_through_opaque_objects() {
	let driver = Driver::new().unwrap();
	let sock = udp_socket(&driver);

	sock.set_option(&gramlane::SendBufferSize::new(32 * 1024)).unwrap();
	let mut read_back = gramlane::SendBufferSize::new(0);
	sock.get_option(&mut read_back).unwrap();
	// The kernel at least doubles what was requested.
	assert!(read_back.value() >= 32 * 1024);
}

#[test]
fn shutdown_on_unconnected_datagram_is_not_connected() {
	let driver = Driver::new().unwrap();
	let sock = udp_socket(&driver);
	let err = sock.shutdown(gramlane::Shutdown::Both).unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
}

#[test]
fn async_connect_reports_through_the_handler() {
	let driver = Driver::new().unwrap();
	let a = udp_socket(&driver);
	let b = udp_socket(&driver);

	let (handler, waiter) = blocking::<()>();
	a.async_connect(&b.local_endpoint().unwrap(), handler);
	assert!(waiter.wait().is_done());
	assert_eq!(a.remote_endpoint().unwrap(), b.local_endpoint().unwrap());
}
