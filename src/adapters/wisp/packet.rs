//! WISP v1 packet layout.
//!
//! ```text
//! | type: u8 | stream_id: u32 LE | payload ... |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const PACKET_CONNECT: u8 = 0x01;
pub const PACKET_DATA: u8 = 0x02;
pub const PACKET_CONTINUE: u8 = 0x03;
pub const PACKET_CLOSE: u8 = 0x04;

const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Tcp,
    Udp,
}

impl StreamType {
    fn from_byte(byte: u8) -> Result<Self, PacketError> {
        match byte {
            0x01 => Ok(StreamType::Tcp),
            0x02 => Ok(StreamType::Udp),
            other => Err(PacketError::UnknownStreamType(other)),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            StreamType::Tcp => 0x01,
            StreamType::Udp => 0x02,
        }
    }
}

/// Reasons carried by CLOSE packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CloseReason {
    Unknown = 0x01,
    Voluntary = 0x02,
    NetworkError = 0x03,
    InvalidInfo = 0x41,
    Unreachable = 0x42,
    Timeout = 0x43,
    Refused = 0x44,
    TcpTimeout = 0x47,
    Blocked = 0x48,
    Throttled = 0x49,
    ClientError = 0x81,
}

impl CloseReason {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x02 => CloseReason::Voluntary,
            0x03 => CloseReason::NetworkError,
            0x41 => CloseReason::InvalidInfo,
            0x42 => CloseReason::Unreachable,
            0x43 => CloseReason::Timeout,
            0x44 => CloseReason::Refused,
            0x47 => CloseReason::TcpTimeout,
            0x48 => CloseReason::Blocked,
            0x49 => CloseReason::Throttled,
            0x81 => CloseReason::ClientError,
            _ => CloseReason::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Connect {
        stream_type: StreamType,
        port: u16,
        hostname: String,
    },
    Data(Bytes),
    Continue {
        buffer_remaining: u32,
    },
    Close(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_id: u32,
    pub payload: Payload,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short: {0} bytes")]
    Truncated(usize),

    #[error("unknown packet type 0x{0:02x}")]
    UnknownType(u8),

    #[error("unknown stream type 0x{0:02x}")]
    UnknownStreamType(u8),

    #[error("hostname is not valid UTF-8")]
    InvalidHostname,
}

impl Packet {
    pub fn data(stream_id: u32, data: Bytes) -> Self {
        Self {
            stream_id,
            payload: Payload::Data(data),
        }
    }

    pub fn continue_with(stream_id: u32, buffer_remaining: u32) -> Self {
        Self {
            stream_id,
            payload: Payload::Continue { buffer_remaining },
        }
    }

    pub fn close(stream_id: u32, reason: CloseReason) -> Self {
        Self {
            stream_id,
            payload: Payload::Close(reason),
        }
    }

    pub fn parse(mut raw: Bytes) -> Result<Self, PacketError> {
        if raw.len() < HEADER_LEN {
            return Err(PacketError::Truncated(raw.len()));
        }
        let total = raw.len();
        let kind = raw.get_u8();
        let stream_id = raw.get_u32_le();

        let payload = match kind {
            PACKET_CONNECT => {
                if raw.len() < 3 {
                    return Err(PacketError::Truncated(total));
                }
                let stream_type = StreamType::from_byte(raw.get_u8())?;
                let port = raw.get_u16_le();
                let hostname =
                    String::from_utf8(raw.to_vec()).map_err(|_| PacketError::InvalidHostname)?;
                Payload::Connect {
                    stream_type,
                    port,
                    hostname,
                }
            }
            PACKET_DATA => Payload::Data(raw),
            PACKET_CONTINUE => {
                if raw.len() < 4 {
                    return Err(PacketError::Truncated(total));
                }
                Payload::Continue {
                    buffer_remaining: raw.get_u32_le(),
                }
            }
            PACKET_CLOSE => {
                if raw.is_empty() {
                    return Err(PacketError::Truncated(total));
                }
                Payload::Close(CloseReason::from_byte(raw.get_u8()))
            }
            other => return Err(PacketError::UnknownType(other)),
        };

        Ok(Self { stream_id, payload })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 8);
        match &self.payload {
            Payload::Connect {
                stream_type,
                port,
                hostname,
            } => {
                buf.put_u8(PACKET_CONNECT);
                buf.put_u32_le(self.stream_id);
                buf.put_u8(stream_type.as_byte());
                buf.put_u16_le(*port);
                buf.put_slice(hostname.as_bytes());
            }
            Payload::Data(data) => {
                buf.reserve(data.len());
                buf.put_u8(PACKET_DATA);
                buf.put_u32_le(self.stream_id);
                buf.put_slice(data);
            }
            Payload::Continue { buffer_remaining } => {
                buf.put_u8(PACKET_CONTINUE);
                buf.put_u32_le(self.stream_id);
                buf.put_u32_le(*buffer_remaining);
            }
            Payload::Close(reason) => {
                buf.put_u8(PACKET_CLOSE);
                buf.put_u32_le(self.stream_id);
                buf.put_u8(*reason as u8);
            }
        }
        buf.freeze()
    }
}
