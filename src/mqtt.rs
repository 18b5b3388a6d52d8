//! Minimal MQTT 3.1.1 packet codec
//!
//! Covers what a publish-only client needs: CONNECT/CONNACK, QoS 0 PUBLISH,
//! PINGREQ/PINGRESP and DISCONNECT, plus enough header parsing to skip or log
//! anything else the broker sends.

use crate::error::CodecError;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;
const FLAG_CLEAN_SESSION: u8 = 0x02;
const MAX_REMAINING_LENGTH: usize = 268_435_455;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    Connack,
    Publish,
    Puback,
    Subscribe,
    Suback,
    Pingreq,
    Pingresp,
    Disconnect,
    Other(u8),
}

impl PacketType {
    fn from_nibble(value: u8) -> Self {
        match value {
            1 => Self::Connect,
            2 => Self::Connack,
            3 => Self::Publish,
            4 => Self::Puback,
            8 => Self::Subscribe,
            9 => Self::Suback,
            12 => Self::Pingreq,
            13 => Self::Pingresp,
            14 => Self::Disconnect,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet: PacketType,
    pub flags: u8,
    /// Bytes taken by the fixed header itself.
    pub header_len: usize,
    /// Bytes following the fixed header.
    pub remaining_len: usize,
}

impl FixedHeader {
    pub fn packet_len(&self) -> usize {
        self.header_len + self.remaining_len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnackCode {
    Accepted,
    Refused(u8),
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_u8(&mut self, value: u8) -> Result<(), CodecError> {
        let slot = self.buf.get_mut(self.pos).ok_or(CodecError::BufferTooSmall)?;
        *slot = value;
        self.pos += 1;
        Ok(())
    }

    fn put_u16(&mut self, value: u16) -> Result<(), CodecError> {
        for byte in value.to_be_bytes() {
            self.put_u8(byte)?;
        }
        Ok(())
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos + bytes.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(CodecError::BufferTooSmall)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_str(&mut self, value: &str) -> Result<(), CodecError> {
        let len = u16::try_from(value.len()).map_err(|_| CodecError::Malformed)?;
        self.put_u16(len)?;
        self.put_bytes(value.as_bytes())
    }

    fn put_remaining_length(&mut self, mut len: usize) -> Result<(), CodecError> {
        if len > MAX_REMAINING_LENGTH {
            return Err(CodecError::Malformed);
        }
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            self.put_u8(byte)?;
            if len == 0 {
                return Ok(());
            }
        }
    }
}

/// CONNECT with clean session and no credentials.
pub fn encode_connect(
    buf: &mut [u8],
    client_id: &str,
    keep_alive_secs: u16,
) -> Result<usize, CodecError> {
    let remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + client_id.len();
    let mut w = Writer::new(buf);
    w.put_u8(0x10)?;
    w.put_remaining_length(remaining)?;
    w.put_str(PROTOCOL_NAME)?;
    w.put_u8(PROTOCOL_LEVEL)?;
    w.put_u8(FLAG_CLEAN_SESSION)?;
    w.put_u16(keep_alive_secs)?;
    w.put_str(client_id)?;
    Ok(w.pos)
}

/// PUBLISH at QoS 0, not retained.
pub fn encode_publish(buf: &mut [u8], topic: &str, payload: &[u8]) -> Result<usize, CodecError> {
    if topic.is_empty() {
        return Err(CodecError::Malformed);
    }
    let remaining = 2 + topic.len() + payload.len();
    let mut w = Writer::new(buf);
    w.put_u8(0x30)?;
    w.put_remaining_length(remaining)?;
    w.put_str(topic)?;
    w.put_bytes(payload)?;
    Ok(w.pos)
}

pub fn encode_pingreq(buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    w.put_u8(0xC0)?;
    w.put_u8(0x00)?;
    Ok(w.pos)
}

pub fn encode_disconnect(buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    w.put_u8(0xE0)?;
    w.put_u8(0x00)?;
    Ok(w.pos)
}

pub fn decode_header(bytes: &[u8]) -> Result<FixedHeader, CodecError> {
    let first = *bytes.first().ok_or(CodecError::Incomplete)?;
    let mut remaining_len = 0usize;
    let mut multiplier = 1usize;
    let mut idx = 1;
    loop {
        // The remaining length spans at most four bytes.
        if idx > 4 {
            return Err(CodecError::Malformed);
        }
        let byte = *bytes.get(idx).ok_or(CodecError::Incomplete)?;
        remaining_len += (byte & 0x7F) as usize * multiplier;
        idx += 1;
        if byte & 0x80 == 0 {
            break;
        }
        multiplier *= 128;
    }
    Ok(FixedHeader {
        packet: PacketType::from_nibble(first >> 4),
        flags: first & 0x0F,
        header_len: idx,
        remaining_len,
    })
}

pub fn decode_connack(bytes: &[u8]) -> Result<ConnackCode, CodecError> {
    let header = decode_header(bytes)?;
    if header.packet != PacketType::Connack || header.remaining_len != 2 {
        return Err(CodecError::Malformed);
    }
    let code = *bytes
        .get(header.header_len + 1)
        .ok_or(CodecError::Incomplete)?;
    Ok(match code {
        0 => ConnackCode::Accepted,
        refused => ConnackCode::Refused(refused),
    })
}

/// Topic of a complete inbound PUBLISH packet.
pub fn publish_topic(packet: &[u8]) -> Result<&str, CodecError> {
    let header = decode_header(packet)?;
    if header.packet != PacketType::Publish {
        return Err(CodecError::Malformed);
    }
    let body = packet
        .get(header.header_len..header.packet_len())
        .ok_or(CodecError::Incomplete)?;
    let len_bytes = body.get(..2).ok_or(CodecError::Malformed)?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let topic = body.get(2..2 + len).ok_or(CodecError::Malformed)?;
    core::str::from_utf8(topic).map_err(|_| CodecError::Malformed)
}

/// Reassembles broker packets that arrive split across socket reads.
///
/// Packets longer than `N` are skipped; their bytes are discarded as they
/// arrive. A malformed header drops everything buffered.
pub struct Inbound<const N: usize> {
    buf: [u8; N],
    len: usize,
    skip: usize,
}

impl<const N: usize> Default for Inbound<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Inbound<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            skip: 0,
        }
    }

    /// Free space for the next read.
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.skip = 0;
    }

    /// Take `n` bytes just read into [`spare`](Self::spare) and hand every
    /// packet completed so far to `on_packet`. Returns how many were handed out.
    pub fn commit(&mut self, n: usize, mut on_packet: impl FnMut(FixedHeader, &[u8])) -> usize {
        let end = (self.len + n).min(N);
        let mut start = self.skip.min(end);
        self.skip -= start;

        let mut delivered = 0;
        while start < end {
            let pending = &self.buf[start..end];
            match decode_header(pending) {
                Ok(header) if header.packet_len() > N => {
                    self.skip = header.packet_len() - pending.len();
                    start = end;
                }
                Ok(header) if header.packet_len() <= pending.len() => {
                    on_packet(header, &pending[..header.packet_len()]);
                    delivered += 1;
                    start += header.packet_len();
                }
                Ok(_) | Err(CodecError::Incomplete) => break,
                Err(_) => start = end,
            }
        }

        self.buf.copy_within(start..end, 0);
        self.len = end - start;
        delivered
    }
}
