//! End-to-end connection behaviour over the in-memory driver

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use linkpacket_core::filter::RawInstruction;
use linkpacket_core::{Addr, Config, Direction, Error, EtherType, Interface, Op, SocketType};
use linkpacket_platform::{Conn, MockDriver, MockPeer};

const LOCAL: [u8; 6] = [0x02, 0x00, 0x5e, 0x10, 0x00, 0x01];
const REMOTE: [u8; 6] = [0x02, 0x00, 0x5e, 0x10, 0x00, 0x02];

fn test_interface() -> Interface {
    Interface::new(3, "mock0", 1500).with_hardware_addr(Addr::from(LOCAL))
}

fn frame(ether_type: u16, payload_len: usize) -> Vec<u8> {
    let mut f = Vec::with_capacity(14 + payload_len);
    f.extend_from_slice(&LOCAL);
    f.extend_from_slice(&REMOTE);
    f.extend_from_slice(&ether_type.to_be_bytes());
    f.extend((0..payload_len).map(|i| i as u8));
    f
}

fn open_with(protocol: EtherType, config: &Config) -> (Conn, MockPeer) {
    let (driver, peer, local) =
        MockDriver::open(&test_interface(), SocketType::Raw, protocol, config).unwrap();
    (Conn::with_driver(Box::new(driver), local), peer)
}

fn open(protocol: EtherType) -> (Conn, MockPeer) {
    open_with(protocol, &Config::default())
}

#[test]
fn test_ipv4_accepted_arp_dropped() {
    let (conn, peer) = open(EtherType::IPV4);

    assert!(!peer.inject(&frame(0x0806, 28)).unwrap());
    assert!(peer.inject(&frame(0x0800, 46)).unwrap());
    assert_eq!(peer.pending(), 1);

    let mut buf = [0u8; 2048];
    let (n, from) = conn.read_from(&mut buf).unwrap();
    assert_eq!(n, 60);
    assert_eq!(from, Addr::from(REMOTE));
    assert_eq!(&buf[12..14], &[0x08, 0x00]);
    assert_eq!(conn.local_addr(), &Addr::from(LOCAL));
}

#[test]
fn test_frame_capped_at_mtu() {
    let (conn, peer) = open(EtherType::IPV4);
    assert!(peer.inject(&frame(0x0800, 1900)).unwrap());

    let mut buf = [0u8; 4096];
    let (n, _) = conn.read_from(&mut buf).unwrap();
    assert_eq!(n, 1500);
}

#[test]
fn test_short_buffer_truncates() {
    let (conn, peer) = open(EtherType::IPV4);
    peer.inject(&frame(0x0800, 100)).unwrap();

    let mut buf = [0u8; 20];
    let (n, from) = conn.read_from(&mut buf).unwrap();
    assert_eq!(n, 20);
    assert_eq!(from, Addr::from(REMOTE));
}

#[test]
fn test_read_deadline_times_out_within_bound() {
    let (conn, _peer) = open(EtherType::IPV4);
    let start = Instant::now();
    conn.set_read_deadline(Some(start + Duration::from_millis(50)))
        .unwrap();

    let mut buf = [0u8; 64];
    let err = conn.read_from(&mut buf).unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert_eq!(err.op, Op::Read);
    assert!(elapsed >= Duration::from_millis(50), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
}

#[test]
fn test_past_deadline_wins_over_queued_frame() {
    let (conn, peer) = open(EtherType::IPV4);
    peer.inject(&frame(0x0800, 46)).unwrap();
    conn.set_read_deadline(Some(Instant::now() - Duration::from_millis(1)))
        .unwrap();

    let mut buf = [0u8; 128];
    assert!(conn.read_from(&mut buf).unwrap_err().is_timeout());
    assert_eq!(peer.pending(), 1);

    conn.set_read_deadline(None).unwrap();
    let (n, _) = conn.read_from(&mut buf).unwrap();
    assert_eq!(n, 60);
}

#[test]
fn test_blocked_read_sees_later_frame() {
    let (conn, peer) = open(EtherType::ARP);
    let reader = thread::spawn(move || {
        let mut buf = [0u8; 128];
        conn.read_from(&mut buf).map(|(n, _)| n)
    });

    thread::sleep(Duration::from_millis(30));
    peer.inject(&frame(0x0806, 28)).unwrap();
    assert_eq!(reader.join().unwrap().unwrap(), 42);
}

#[test]
fn test_close_unblocks_reader() {
    let (conn, _peer) = open(EtherType::IPV4);
    let conn = Arc::new(conn);

    let reader = {
        let conn = Arc::clone(&conn);
        thread::spawn(move || {
            let mut buf = [0u8; 128];
            conn.read_from(&mut buf)
        })
    };

    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    conn.close().unwrap();

    let err = reader.join().unwrap().unwrap_err();
    assert!(err.is_closed(), "unexpected error: {err}");
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_operations_after_close() {
    let (conn, peer) = open(EtherType::IPV4);
    conn.close().unwrap();

    let err = conn.close().unwrap_err();
    assert_eq!(err.op, Op::Close);
    assert!(err.is_closed());

    let mut buf = [0u8; 16];
    assert!(conn.read_from(&mut buf).unwrap_err().is_closed());
    assert!(conn
        .write_to(&[0u8; 60], &Addr::from(REMOTE))
        .unwrap_err()
        .is_closed());
    assert!(conn.set_deadline(None).unwrap_err().is_closed());
    assert!(conn.stats().unwrap_err().is_closed());

    let err = conn.syscall_conn().unwrap_err();
    assert_eq!(err.op, Op::SyscallConn);
    assert!(err.is_closed());

    assert!(matches!(peer.inject(&frame(0x0800, 46)), Err(Error::Closed)));
}

#[test]
fn test_error_display_names_operation_and_address() {
    let (conn, _peer) = open(EtherType::IPV4);
    conn.set_read_deadline(Some(Instant::now())).unwrap();

    let mut buf = [0u8; 16];
    let err = conn.read_from(&mut buf).unwrap_err();
    assert_eq!(err.to_string(), "read packet 02:00:5e:10:00:01: i/o timeout");

    let io_err: std::io::Error = err.into();
    assert_eq!(io_err.kind(), std::io::ErrorKind::TimedOut);
}

#[test]
fn test_inout_loops_back_written_frames() {
    let (conn, peer) = open(EtherType::IPV4);
    let out = frame(0x0800, 46);

    assert_eq!(conn.write_to(&out, &Addr::from(REMOTE)).unwrap(), 60);
    assert_eq!(peer.sent(), vec![(out.clone(), Addr::from(REMOTE))]);

    let mut buf = [0u8; 128];
    let (n, _) = conn.read_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], out.as_slice());
}

#[test]
fn test_inbound_only_skips_own_frames() {
    let config = Config::new().with_direction(Direction::In);
    let (conn, peer) = open_with(EtherType::IPV4, &config);

    conn.write_to(&frame(0x0800, 46), &Addr::from(REMOTE))
        .unwrap();
    assert_eq!(peer.sent().len(), 1);
    assert_eq!(peer.pending(), 0);
}

#[test]
fn test_write_rejects_empty_destination() {
    let (conn, _peer) = open(EtherType::IPV4);
    let empty = Addr::from_valid_prefix(&[], 0).unwrap();

    let err = conn.write_to(&frame(0x0800, 46), &empty).unwrap_err();
    assert_eq!(err.op, Op::Write);
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn test_write_deadline_expired() {
    let (conn, peer) = open(EtherType::IPV4);
    conn.set_write_deadline(Some(Instant::now() - Duration::from_secs(1)))
        .unwrap();

    let err = conn
        .write_to(&frame(0x0800, 46), &Addr::from(REMOTE))
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(peer.sent().is_empty());
}

#[test]
fn test_stats_reset_on_read() {
    let (conn, peer) = open(EtherType::IPV4);
    for _ in 0..3 {
        peer.inject(&frame(0x0800, 46)).unwrap();
    }
    peer.inject(&frame(0x86dd, 46)).unwrap();

    assert_eq!(conn.stats().unwrap().packets, 3);
    assert_eq!(conn.stats().unwrap().packets, 0);
}

#[test]
fn test_config_filter_follows_protocol_check() {
    // Accept at most 64 bytes of anything the protocol check lets through.
    let config = Config::new().with_filter(vec![RawInstruction::new(0x06, 0, 0, 64)]);
    let (conn, peer) = open_with(EtherType::IPV4, &config);

    let program = peer.program();
    assert_eq!(program.len(), 4);
    assert_eq!(program[3].k, 64);

    assert!(!peer.inject(&frame(0x0806, 28)).unwrap());
    assert!(peer.inject(&frame(0x0800, 200)).unwrap());

    let mut buf = [0u8; 512];
    let (n, _) = conn.read_from(&mut buf).unwrap();
    assert_eq!(n, 64);
}

#[test]
fn test_set_bpf_replaces_program() {
    let (conn, peer) = open(EtherType::IPV4);
    conn.set_bpf(&[RawInstruction::new(0x06, 0, 0, 0)]).unwrap();

    assert!(!peer.inject(&frame(0x0800, 46)).unwrap());

    let err = conn
        .set_bpf(&[RawInstruction::new(0x05, 0, 0, 7)])
        .unwrap_err();
    assert_eq!(err.op, Op::Set);
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn test_promiscuous_toggle() {
    let (conn, peer) = open(EtherType::IPV4);
    conn.set_promiscuous(true).unwrap();
    assert!(peer.is_promiscuous());
    conn.set_promiscuous(false).unwrap();
    assert!(!peer.is_promiscuous());
}

#[test]
fn test_raw_conn_unavailable_on_mock() {
    let (conn, _peer) = open(EtherType::IPV4);
    let raw = conn.syscall_conn().unwrap();
    let err = raw.control(|_| {}).unwrap_err();
    assert_eq!(err.op, Op::RawControl);
    assert!(err.is_unsupported());
}

#[test]
fn test_mock_rejects_datagram_and_outbound() {
    let ifi = test_interface();
    let err = MockDriver::open(&ifi, SocketType::Datagram, EtherType::IPV4, &Config::default())
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));

    let config = Config::new().with_direction(Direction::Out);
    let err = MockDriver::open(&ifi, SocketType::Raw, EtherType::IPV4, &config).unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
}

#[test]
fn test_listen_rejects_malformed_config() {
    let config = Config::new().with_filter(vec![RawInstruction::new(0x15, 5, 0, 1)]);
    let err = Conn::listen(&test_interface(), SocketType::Raw, 0x0800, Some(&config))
        .unwrap_err();
    assert_eq!(err.op, Op::Listen);
    assert_eq!(err.addr, Some(Addr::from(LOCAL)));
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}
