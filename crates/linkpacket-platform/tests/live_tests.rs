//! Tests against real interfaces
//!
//! These need `CAP_NET_RAW` (Linux) or read access to `/dev/bpf*` (BSD), so
//! they are ignored by default and skip themselves when permission is
//! denied. Run with `cargo test -- --ignored` as root.

use std::time::{Duration, Instant};

use linkpacket_core::{Error, Interface, SocketType};
use linkpacket_platform::{interfaces, Conn};

fn candidate() -> Option<Interface> {
    let all = interfaces().ok()?;
    all.iter()
        .find(|ifi| ifi.is_ethernet_up())
        .or_else(|| all.first())
        .cloned()
}

fn listen_or_skip(ifi: &Interface, kind: SocketType) -> Option<Conn> {
    match Conn::listen(ifi, kind, 0x0800, None) {
        Ok(conn) => Some(conn),
        Err(e) if matches!(e.source, Error::PermissionDenied(_)) => {
            eprintln!("skipping: {e}");
            None
        }
        Err(e) => panic!("listen on {}: {e}", ifi.name),
    }
}

#[test]
#[ignore = "needs raw socket privileges"]
fn test_live_read_deadline() {
    let Some(ifi) = candidate() else {
        eprintln!("skipping: no interface");
        return;
    };
    let Some(conn) = listen_or_skip(&ifi, SocketType::Raw) else {
        return;
    };

    let start = Instant::now();
    conn.set_read_deadline(Some(start + Duration::from_millis(300)))
        .unwrap();
    let mut buf = vec![0u8; 65_536];
    loop {
        match conn.read_from(&mut buf) {
            Ok(_) => continue,
            Err(e) => {
                assert!(e.is_timeout(), "unexpected error: {e}");
                break;
            }
        }
    }
    assert!(start.elapsed() < Duration::from_secs(2));
    conn.close().unwrap();
}

#[test]
#[ignore = "needs raw socket privileges"]
fn test_live_close_unblocks_read() {
    let Some(ifi) = candidate() else {
        eprintln!("skipping: no interface");
        return;
    };
    let Some(conn) = listen_or_skip(&ifi, SocketType::Raw) else {
        return;
    };
    // Drop everything so the read below can only end by close.
    if conn.set_bpf(&[linkpacket_core::filter::RawInstruction::new(0x06, 0, 0, 0)]).is_err() {
        eprintln!("skipping: filter replacement unavailable");
        return;
    }

    let conn = std::sync::Arc::new(conn);
    let reader = {
        let conn = std::sync::Arc::clone(&conn);
        std::thread::spawn(move || {
            let mut buf = [0u8; 2048];
            conn.read_from(&mut buf)
        })
    };
    std::thread::sleep(Duration::from_millis(100));
    conn.close().unwrap();
    assert!(reader.join().unwrap().unwrap_err().is_closed());
}

#[cfg(target_os = "linux")]
#[test]
#[ignore = "needs raw socket privileges"]
fn test_live_stats_and_raw_control() {
    let Some(ifi) = candidate() else {
        eprintln!("skipping: no interface");
        return;
    };
    let Some(conn) = listen_or_skip(&ifi, SocketType::Datagram) else {
        return;
    };

    conn.stats().unwrap();
    let mut seen = -1;
    conn.syscall_conn()
        .unwrap()
        .control(|fd| seen = fd)
        .unwrap();
    assert!(seen >= 0);
}

#[cfg(target_os = "linux")]
#[test]
#[ignore = "needs raw socket privileges"]
fn test_live_close_inside_control() {
    let Some(ifi) = candidate() else {
        eprintln!("skipping: no interface");
        return;
    };
    let Some(conn) = listen_or_skip(&ifi, SocketType::Raw) else {
        return;
    };

    let mut closed = None;
    conn.syscall_conn()
        .unwrap()
        .control(|_| closed = Some(conn.close()))
        .unwrap();
    assert!(closed.unwrap().is_ok());
    let mut buf = [0u8; 64];
    assert!(conn.read_from(&mut buf).unwrap_err().is_closed());
}
