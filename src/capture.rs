//! Packet capture: pulling game TCP payloads off the network.
//!
//! [`parse_ipv4_tcp`] strips IPv4 and TCP headers from a raw network-layer
//! packet. Live sniffing uses WinDivert in sniff mode and is only available
//! on Windows builds with the `windivert` feature; other builds can still
//! replay capture logs.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Default game server port.
pub const DEFAULT_PORT: u16 = 32800;

/// One direction of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flow {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl Flow {
    /// Placeholder for streams whose endpoints were not recorded.
    pub const UNKNOWN: Flow = Flow {
        src: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
        dst: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
    };

    pub fn involves_port(&self, port: u16) -> bool { self.src.port() == port || self.dst.port() == port }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} -> {}", self.src, self.dst) }
}

/// TCP payload borrowed from a captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub flow: Flow,
    pub payload: &'a [u8],
}

impl Segment<'_> {
    pub fn to_owned_segment(&self) -> OwnedSegment { OwnedSegment { flow: self.flow, payload: self.payload.to_vec() } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedSegment {
    pub flow: Flow,
    pub payload: Vec<u8>,
}

/// Parse an IPv4 packet carrying TCP. Anything else yields `None`.
pub fn parse_ipv4_tcp(data: &[u8]) -> Option<Segment<'_>> {
    if data.len() < 20 || (data[0] >> 4) != 4 || data[9] != 6 { return None; } // IPv4 + TCP
    let ihl = (data[0] & 0x0F) as usize * 4;
    if ihl < 20 || data.len() < ihl + 20 { return None; }
    // total length bounds the payload when the capture carries link padding
    let total = u16::from_be_bytes([data[2], data[3]]) as usize;
    let end = if total >= ihl + 20 && total <= data.len() { total } else { data.len() };

    let tcp = &data[ihl..end];
    let data_offset = (tcp[12] >> 4) as usize * 4;
    if data_offset < 20 || data_offset > tcp.len() { return None; }

    let src_ip = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst_ip = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let src_port = u16::from_be_bytes([tcp[0], tcp[1]]);
    let dst_port = u16::from_be_bytes([tcp[2], tcp[3]]);
    Some(Segment {
        flow: Flow {
            src: SocketAddr::V4(SocketAddrV4::new(src_ip, src_port)),
            dst: SocketAddr::V4(SocketAddrV4::new(dst_ip, dst_port)),
        },
        payload: &tcp[data_offset..],
    })
}

/// A blocking source of TCP payloads.
pub trait PacketSource {
    /// Next non-empty payload, or `None` once the source is exhausted.
    fn next_segment(&mut self) -> Result<Option<OwnedSegment>>;
}

/// Open a live sniffer for TCP traffic to or from `port`.
#[cfg(all(windows, feature = "windivert"))]
pub fn open_live(port: u16) -> Result<Box<dyn PacketSource>> {
    Ok(Box::new(live::DivertSource::open(port)?))
}

#[cfg(not(all(windows, feature = "windivert")))]
pub fn open_live(port: u16) -> Result<Box<dyn PacketSource>> {
    anyhow::bail!("live capture on port {port} needs a Windows build with the `windivert` feature; use `replay` for capture logs")
}

#[cfg(all(windows, feature = "windivert"))]
mod live {
    use super::{parse_ipv4_tcp, OwnedSegment, PacketSource};
    use anyhow::{anyhow, Result};
    use windivert::prelude::*;

    pub struct DivertSource {
        handle: WinDivert<NetworkLayer>,
        port: u16,
        buf: Vec<u8>,
    }

    impl DivertSource {
        pub fn open(port: u16) -> Result<Self> {
            let filter = format!("tcp.PayloadLength > 0 and (tcp.SrcPort == {port} or tcp.DstPort == {port})");
            let flags = WinDivertFlags::new().set_sniff();
            let handle = WinDivert::network(&filter, 0, flags).map_err(|e| anyhow!("WinDivert open failed: {e:?}"))?;
            log::info!("sniffing with filter `{}`", filter);
            Ok(Self { handle, port, buf: vec![0u8; 65535] })
        }
    }

    impl PacketSource for DivertSource {
        fn next_segment(&mut self) -> Result<Option<OwnedSegment>> {
            loop {
                let packet = self.handle.recv(Some(&mut self.buf[..])).map_err(|e| anyhow!("WinDivert recv failed: {e:?}"))?;
                match parse_ipv4_tcp(&packet.data) {
                    Some(seg) if !seg.payload.is_empty() && seg.flow.involves_port(self.port) => return Ok(Some(seg.to_owned_segment())),
                    _ => continue,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(ihl_words: u8, tcp_words: u8, payload: &[u8], padding: usize) -> Vec<u8> {
        let ihl = ihl_words as usize * 4;
        let thl = tcp_words as usize * 4;
        let total = ihl + thl + payload.len();
        let mut p = vec![0u8; ihl];
        p[0] = 0x40 | ihl_words;
        p[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        p[9] = 6;
        p[12..16].copy_from_slice(&[192, 168, 0, 10]);
        p[16..20].copy_from_slice(&[10, 0, 0, 5]);
        let mut tcp = vec![0u8; thl];
        tcp[0..2].copy_from_slice(&32800u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&51234u16.to_be_bytes());
        tcp[12] = tcp_words << 4;
        p.extend(tcp);
        p.extend_from_slice(payload);
        p.extend(std::iter::repeat(0u8).take(padding));
        p
    }

    #[test]
    fn extracts_payload_and_flow() {
        let raw = packet(5, 5, b"TOZ data", 0);
        let seg = parse_ipv4_tcp(&raw).unwrap();
        assert_eq!(seg.payload, b"TOZ data");
        assert_eq!(seg.flow.src, "192.168.0.10:32800".parse::<SocketAddr>().unwrap());
        assert_eq!(seg.flow.dst, "10.0.0.5:51234".parse::<SocketAddr>().unwrap());
        assert!(seg.flow.involves_port(DEFAULT_PORT));
        assert!(!seg.flow.involves_port(80));
    }

    #[test]
    fn honours_options_and_padding() {
        let raw = packet(6, 8, b"abc", 6);
        let seg = parse_ipv4_tcp(&raw).unwrap();
        assert_eq!(seg.payload, b"abc");
    }

    #[test]
    fn rejects_non_tcp_and_truncated() {
        let mut udp = packet(5, 5, b"x", 0);
        udp[9] = 17;
        assert!(parse_ipv4_tcp(&udp).is_none());
        let mut v6 = packet(5, 5, b"x", 0);
        v6[0] = 0x65;
        assert!(parse_ipv4_tcp(&v6).is_none());
        let raw = packet(5, 5, b"", 0);
        assert!(parse_ipv4_tcp(&raw[..30]).is_none());
        assert_eq!(parse_ipv4_tcp(&raw).unwrap().payload, b"");
    }

    #[test]
    fn flow_display() {
        let seg_raw = packet(5, 5, b"", 0);
        let flow = parse_ipv4_tcp(&seg_raw).unwrap().flow;
        assert_eq!(flow.to_string(), "192.168.0.10:32800 -> 10.0.0.5:51234");
        assert_eq!(Flow::UNKNOWN.to_string(), "0.0.0.0:0 -> 0.0.0.0:0");
    }

    #[cfg(not(all(windows, feature = "windivert")))]
    #[test]
    fn live_capture_unavailable_without_feature() {
        assert!(open_live(DEFAULT_PORT).is_err());
    }
}
