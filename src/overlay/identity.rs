/**
 * overlay/identity.rs
 *
 * Local endpoint discovery
 */

use anyhow::{Context, Result};
use std::net::UdpSocket;
use std::time::Duration;
use tracing::warn;

use super::types::Endpoint;

/// Discover the local endpoint for an already-bound UDP port. Either IP
/// may come back empty on failure; the overlay keeps working with
/// whichever side of the NAT is still addressable.
pub async fn discover(port: u16, reflector_url: &str, reflector_timeout: Duration) -> Endpoint {
    let private_ip = private_ip().unwrap_or_else(|e| {
        warn!("private IP discovery failed: {:#}", e);
        String::new()
    });
    let public_ip = public_ip(reflector_url, reflector_timeout)
        .await
        .unwrap_or_else(|e| {
            warn!("public IP discovery failed: {:#}", e);
            String::new()
        });
    Endpoint {
        public_ip,
        private_ip,
        port: port.to_string(),
    }
}

/// Local-side address of a throwaway UDP "connection". No packet is sent;
/// the OS just commits to an outbound interface.
fn private_ip() -> Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("bind probe socket")?;
    socket.connect("8.8.8.8:80").context("select route")?;
    let addr = socket.local_addr().context("read probe address")?;
    Ok(addr.ip().to_string())
}

/// Plain-text public IP from the reflector service. Bounded by a timeout
/// so a dead reflector cannot stall startup.
async fn public_ip(url: &str, timeout: Duration) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("build reflector client")?;
    let body = client
        .get(url)
        .send()
        .await
        .context("reflector request")?
        .text()
        .await
        .context("reflector body")?;
    Ok(body.trim().to_string())
}
