//! Open Pixel Control client.
//!
//! Each frame is `channel, command, length (u16 big-endian), payload`, where
//! the payload is one byte per color component followed by any auxiliary
//! device bytes.

use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};

pub const DEFAULT_SERVER: &str = "127.0.0.1:7890";
/// Channel 0 addresses every channel on the server.
pub const BROADCAST_CHANNEL: u8 = 0;
pub const CMD_SET_PIXEL_COLORS: u8 = 0x00;
pub const HEADER_LEN: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Debug)]
pub enum OpcError {
    Connect { server: String, source: io::Error },
    Write { server: String, source: io::Error },
    NotConnected { server: String },
    PayloadTooLarge { len: usize },
}

impl fmt::Display for OpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { server, source } => {
                write!(f, "failed to connect to OPC server {server}: {source}")
            }
            Self::Write { server, source } => {
                write!(f, "failed to write frame to OPC server {server}: {source}")
            }
            Self::NotConnected { server } => write!(f, "not connected to OPC server {server}"),
            Self::PayloadTooLarge { len } => write!(
                f,
                "OPC payload of {len} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit"
            ),
        }
    }
}

impl std::error::Error for OpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect { source, .. } | Self::Write { source, .. } => Some(source),
            Self::NotConnected { .. } | Self::PayloadTooLarge { .. } => None,
        }
    }
}

impl OpcError {
    /// Whether dropping and re-opening the connection could clear the error.
    pub fn is_connection_failure(&self) -> bool {
        !matches!(self, Self::PayloadTooLarge { .. })
    }
}

/// Clamp every channel into `[0, 255]` in place. `NaN` becomes 0.
pub fn clamp_pixels(pixels: &mut [f32]) {
    for value in pixels.iter_mut() {
        *value = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 255.0)
        };
    }
}

/// Clamp `pixels` in place and append one complete frame to `out`.
pub fn encode_frame(
    channel: u8,
    pixels: &mut [f32],
    aux: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), OpcError> {
    let len = pixels.len() + aux.len();
    let Ok(wire_len) = u16::try_from(len) else {
        return Err(OpcError::PayloadTooLarge { len });
    };

    clamp_pixels(pixels);
    out.reserve(HEADER_LEN + len);
    out.push(channel);
    out.push(CMD_SET_PIXEL_COLORS);
    out.extend_from_slice(&wire_len.to_be_bytes());
    out.extend(pixels.iter().map(|&value| value as u8));
    out.extend_from_slice(aux);
    Ok(())
}

/// Destination for rendered frames.
pub trait PixelSink {
    /// Clamp `pixels` in place and transmit them, followed by `aux`.
    fn send(&mut self, channel: u8, pixels: &mut [f32], aux: &[u8]) -> Result<(), OpcError>;

    /// Drop any existing connection and open a new one.
    fn reconnect(&mut self) -> Result<(), OpcError>;

    fn is_connected(&self) -> bool;

    fn close(&mut self);
}

/// Persistent TCP connection to an OPC server.
#[derive(Debug)]
pub struct OpcClient {
    server: String,
    stream: Option<TcpStream>,
    frame: Vec<u8>,
}

impl OpcClient {
    pub fn connect(server: impl Into<String>) -> Result<Self, OpcError> {
        let mut client = Self::disconnected(server);
        client.reconnect()?;
        Ok(client)
    }

    /// A client that will only connect on the first `reconnect`.
    pub fn disconnected(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            stream: None,
            frame: Vec::new(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

impl PixelSink for OpcClient {
    fn send(&mut self, channel: u8, pixels: &mut [f32], aux: &[u8]) -> Result<(), OpcError> {
        self.frame.clear();
        encode_frame(channel, pixels, aux, &mut self.frame)?;

        let Some(stream) = self.stream.as_mut() else {
            return Err(OpcError::NotConnected {
                server: self.server.clone(),
            });
        };
        if let Err(source) = stream.write_all(&self.frame) {
            self.stream = None;
            return Err(OpcError::Write {
                server: self.server.clone(),
                source,
            });
        }
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), OpcError> {
        self.close();
        let stream = TcpStream::connect(&self.server).map_err(|source| OpcError::Connect {
            server: self.server.clone(),
            source,
        })?;
        // Frames are latency-sensitive and written in one call.
        if let Err(error) = stream.set_nodelay(true) {
            tracing::warn!(action = "set_nodelay", server = %self.server, %error);
        }
        tracing::info!(action = "opc_connect", server = %self.server);
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            tracing::info!(action = "opc_close", server = %self.server);
        }
    }
}

impl Drop for OpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sink that encodes frames and throws them away. Used for offline
/// benchmarking.
#[derive(Debug, Default)]
pub struct NullSink {
    frame: Vec<u8>,
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl PixelSink for NullSink {
    fn send(&mut self, channel: u8, pixels: &mut [f32], aux: &[u8]) -> Result<(), OpcError> {
        self.frame.clear();
        encode_frame(channel, pixels, aux, &mut self.frame)?;
        self.frames += 1;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), OpcError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::{clamp_pixels, encode_frame, OpcClient, OpcError, PixelSink};

    #[test]
    fn out_of_range_values_are_clipped_in_place() {
        let mut pixels = [300.0, -5.0, 128.0];
        let mut frame = Vec::new();
        encode_frame(0, &mut pixels, &[], &mut frame).expect("encode");

        assert_eq!(frame, vec![0x00, 0x00, 0x00, 0x03, 0xFF, 0x00, 0x80]);
        assert_eq!(pixels, [255.0, 0.0, 128.0]);
    }

    #[test]
    fn auxiliary_bytes_follow_pixels_in_the_same_payload() {
        let mut pixels = [1.9, 2.0, 3.0];
        let mut frame = Vec::new();
        encode_frame(7, &mut pixels, &[9, 8, 7], &mut frame).expect("encode");
        assert_eq!(frame, vec![7, 0, 0, 6, 1, 2, 3, 9, 8, 7]);
    }

    #[test]
    fn length_is_big_endian() {
        let mut pixels = vec![0.0; 300];
        let mut frame = Vec::new();
        encode_frame(1, &mut pixels, &[], &mut frame).expect("encode");
        assert_eq!(&frame[..4], &[1, 0, 0x01, 0x2C]);
        assert_eq!(frame.len(), 304);
    }

    #[test]
    fn oversized_payload_is_rejected_without_touching_pixels() {
        let mut pixels = vec![999.0; 65_535];
        let mut frame = Vec::new();
        let error = encode_frame(0, &mut pixels, &[0], &mut frame).expect_err("too large");
        assert!(matches!(error, OpcError::PayloadTooLarge { len: 65_536 }));
        assert!(!error.is_connection_failure());
        assert!(frame.is_empty());
        assert_eq!(pixels[0], 999.0);
    }

    #[test]
    fn nan_is_clamped_to_zero() {
        let mut pixels = [f32::NAN, f32::INFINITY, f32::NEG_INFINITY];
        clamp_pixels(&mut pixels);
        assert_eq!(pixels, [0.0, 255.0, 0.0]);
    }

    #[test]
    fn disconnected_client_reports_not_connected() {
        let mut client = OpcClient::disconnected("127.0.0.1:9");
        let error = client
            .send(0, &mut [1.0, 2.0, 3.0], &[])
            .expect_err("no connection");
        assert!(matches!(error, OpcError::NotConnected { .. }));
        assert!(error.is_connection_failure());
        assert!(!client.is_connected());
    }
}
