//! Listen command - receive and print frames

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use linkpacket_core::{Addr, Direction, EtherType, SocketType};
use linkpacket_platform::{interface_by_name, Conn};
use tracing::{info, warn};

use super::load_config;

/// How often the loop checks for Ctrl-C while no frames arrive
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Listen command arguments
#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Interface name, such as eth0 or en0
    pub interface: String,

    /// EtherType: ipv4, arp, ipv6, vlan, all, or a number (0x88cc)
    #[arg(short, long, default_value = "ipv4")]
    pub protocol: EtherType,

    /// Socket type: raw or datagram
    #[arg(short = 't', long = "type", default_value = "raw")]
    pub kind: SocketType,

    /// Traffic direction: in, out or in-out (overrides the config file)
    #[arg(short, long)]
    pub direction: Option<Direction>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable promiscuous mode
    #[arg(long)]
    pub promiscuous: bool,

    /// Bytes of each frame to show in hex
    #[arg(long, default_value_t = 32)]
    pub preview: usize,
}

/// Execute the listen command
pub fn execute(args: ListenArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if let Some(direction) = args.direction {
        config.direction = direction;
    }

    let ifi = interface_by_name(&args.interface)
        .with_context(|| format!("Unknown interface: {}", args.interface))?;
    let conn = Conn::listen(
        &ifi,
        args.kind,
        u32::from(args.protocol.value()),
        Some(&config),
    )
    .with_context(|| format!("Failed to listen on {}", ifi.name))?;

    if args.promiscuous {
        conn.set_promiscuous(true)
            .context("Failed to enable promiscuous mode")?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    info!(
        interface = %ifi.name,
        local = %conn.local_addr(),
        protocol = %args.protocol,
        direction = %config.direction,
        "Listening"
    );

    let end = args
        .timeout
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut buf = vec![0u8; buffer_len(ifi.mtu)];
    let mut received: u64 = 0;

    while running.load(Ordering::SeqCst) && args.count.map_or(true, |n| received < n) {
        let slice = Instant::now() + POLL_INTERVAL;
        let deadline = end.map_or(slice, |end| end.min(slice));
        conn.set_read_deadline(Some(deadline))?;

        match conn.read_from(&mut buf) {
            Ok((n, from)) => {
                received += 1;
                println!("{}", format_frame(&buf[..n], &from, args.kind, args.preview));
            }
            Err(e) if e.is_timeout() => {
                if end.is_some_and(|end| Instant::now() >= end) {
                    break;
                }
            }
            Err(e) => return Err(e).context("Receive failed"),
        }
    }

    match conn.stats() {
        Ok(stats) => info!(
            received,
            kernel_packets = stats.packets,
            drops = stats.drops,
            "Stopped"
        ),
        Err(e) if e.is_unsupported() => info!(received, "Stopped"),
        Err(e) => warn!(error = %e, "Statistics unavailable"),
    }

    conn.close()?;
    Ok(())
}

/// Receive buffer: MTU plus room for an Ethernet header and VLAN tag
fn buffer_len(mtu: u32) -> usize {
    let mtu = if mtu == 0 { 65_535 } else { mtu as usize };
    mtu + 18
}

/// One output line: source, length, EtherType (raw frames only), hex preview
fn format_frame(frame: &[u8], from: &Addr, kind: SocketType, preview: usize) -> String {
    let ether_type = match (kind, frame.get(12..14)) {
        (SocketType::Raw, Some(&[hi, lo])) => {
            format!(" {}", EtherType::new(u16::from_be_bytes([hi, lo])))
        }
        _ => String::new(),
    };
    let shown = &frame[..frame.len().min(preview)];
    let more = if frame.len() > shown.len() { ".." } else { "" };
    format!(
        "{} len {}{} {}{}",
        from.to_string().cyan(),
        frame.len(),
        ether_type.yellow(),
        hex::encode(shown).dimmed(),
        more
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_frame() {
        colored::control::set_override(false);
        let mut frame = vec![0xffu8; 6];
        frame.extend_from_slice(&[2, 0, 0, 0, 0, 1]);
        frame.extend_from_slice(&[0x08, 0x06]);
        frame.extend_from_slice(&[0xaa; 10]);

        let from = Addr::from([2, 0, 0, 0, 0, 1]);
        let line = format_frame(&frame, &from, SocketType::Raw, 4);
        assert_eq!(line, "02:00:00:00:00:01 len 24 0x0806 ffffffff..");

        let line = format_frame(&frame[14..], &from, SocketType::Datagram, 32);
        assert_eq!(line, "02:00:00:00:00:01 len 10 aaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn test_buffer_len() {
        assert_eq!(buffer_len(1500), 1518);
        assert_eq!(buffer_len(0), 65_553);
    }
}
