//! Minimal STUN client (RFC 5389 subset) for public-address discovery.
//!
//! Sends a Binding Request over the caller's own UDP socket — so the NAT
//! mapping the server observes is the same one peers will send to — and
//! parses XOR-MAPPED-ADDRESS out of the response by fixed byte offset.
//! IPv6 is out of scope; malformed or missing responses are treated as
//! per-server failures, not fatal ones.

use std::net::Ipv4Addr;
use std::time::Duration;

use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::StunError;

const MAGIC_COOKIE: u32 = 0x2112_A442;
const BINDING_REQUEST: u16 = 0x0001;
const RESPONSE_WAIT: Duration = Duration::from_secs(2);
const XOR_MAPPED_ADDRESS_OFFSET: usize = 28;

/// A STUN server host:port pair and the outcome of the last attempt against it.
#[derive(Debug, Clone)]
pub struct StunBinding {
    pub server: String,
    pub succeeded: bool,
}

fn build_request() -> [u8; 20] {
    let mut buf = [0u8; 20];
    buf[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // length = 0 (no attributes)
    buf[2..4].copy_from_slice(&0u16.to_be_bytes());
    buf[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    rand::thread_rng().fill_bytes(&mut buf[8..20]);
    buf
}

/// Parse XOR-MAPPED-ADDRESS (IPv4 only) at the fixed offset the simplified
/// wire format uses. Returns `None` if the response is too short.
fn parse_xor_mapped_address(response: &[u8]) -> Option<(Ipv4Addr, u16)> {
    if response.len() < XOR_MAPPED_ADDRESS_OFFSET + 6 {
        return None;
    }
    let port_bytes = &response[XOR_MAPPED_ADDRESS_OFFSET..XOR_MAPPED_ADDRESS_OFFSET + 2];
    let ip_bytes = &response[XOR_MAPPED_ADDRESS_OFFSET + 2..XOR_MAPPED_ADDRESS_OFFSET + 6];

    let raw_port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
    let port = raw_port ^ 0x2112;

    let octets = [
        ip_bytes[0] ^ 0x21,
        ip_bytes[1] ^ 0x21,
        ip_bytes[2] ^ 0x21,
        ip_bytes[3] ^ 0x21,
    ];

    Some((Ipv4Addr::from(octets), port))
}

/// Run Binding Requests against `servers` over `socket`, retrying up to
/// `max_retries` full passes. Falls back to an HTTPS IP-echo service on
/// total failure, in which case the port is assumed to equal the socket's
/// locally bound port (the caller should treat this as "NAT traversal may
/// not work").
pub async fn discover(
    socket: &UdpSocket,
    servers: &[String],
    max_retries: u32,
) -> Result<(Ipv4Addr, u16), StunError> {
    for attempt in 0..=max_retries {
        for server in servers {
            match try_server(socket, server).await {
                Ok(addr) => {
                    tracing::info!(server = %server, attempt, "STUN discovery succeeded");
                    return Ok(addr);
                }
                Err(e) => {
                    tracing::debug!(server = %server, attempt, error = %e, "STUN server unreachable");
                }
            }
        }
    }

    tracing::warn!("all STUN servers exhausted, falling back to IP-echo");
    let ip = fallback_ip_echo().await?;
    let local_port = socket
        .local_addr()
        .map(|a| a.port())
        .unwrap_or_default();
    Ok((ip, local_port))
}

async fn try_server(socket: &UdpSocket, server: &str) -> Result<(Ipv4Addr, u16), StunError> {
    let request = build_request();
    socket
        .send_to(&request, server)
        .await
        .map_err(|_| StunError::NoResponse)?;

    let mut buf = [0u8; 512];
    let n = timeout(RESPONSE_WAIT, socket.recv(&mut buf))
        .await
        .map_err(|_| StunError::NoResponse)?
        .map_err(|_| StunError::NoResponse)?;

    if n < 20 {
        return Err(StunError::ShortResponse);
    }
    parse_xor_mapped_address(&buf[..n]).ok_or(StunError::ShortResponse)
}

/// Ask a public IP-echo endpoint for just the IPv4 address; the port is
/// unknowable this way and must be supplied by the caller.
async fn fallback_ip_echo() -> Result<Ipv4Addr, StunError> {
    let text = reqwest::get("https://api.ipify.org")
        .await
        .map_err(|e| StunError::FallbackFailed(e.to_string()))?
        .text()
        .await
        .map_err(|e| StunError::FallbackFailed(e.to_string()))?;

    text.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| StunError::FallbackFailed(format!("unparseable response: {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_20_byte_binding_request_with_real_magic_cookie() {
        let req = build_request();
        assert_eq!(req.len(), 20);
        assert_eq!(u16::from_be_bytes([req[0], req[1]]), BINDING_REQUEST);
        assert_eq!(u16::from_be_bytes([req[2], req[3]]), 0);
        assert_eq!(
            u32::from_be_bytes([req[4], req[5], req[6], req[7]]),
            MAGIC_COOKIE
        );
    }

    #[test]
    fn parses_xor_mapped_address_at_fixed_offset() {
        let mut response = vec![0u8; 32];
        // port 12345 XOR 0x2112
        let xored_port = 12345u16 ^ 0x2112;
        response[28..30].copy_from_slice(&xored_port.to_be_bytes());
        // ip 203.0.113.7 XOR 0x21 per octet
        let ip_octets = [203u8 ^ 0x21, 0u8 ^ 0x21, 113u8 ^ 0x21, 7u8 ^ 0x21];
        response[30..34].copy_from_slice(&ip_octets);

        let (ip, port) = parse_xor_mapped_address(&response).unwrap();
        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(port, 12345);
    }

    #[test]
    fn rejects_short_response() {
        let response = vec![0u8; 10];
        assert!(parse_xor_mapped_address(&response).is_none());
    }
}
