use crate::protocol::ProtocolError;
use crate::sweep::matrix::FrequencyPowerMatrix;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{ErrorKind, Read, Write};

pub const HEADER_LEN: usize = 5;
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    DataFrame,
    TextNotice,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        match self {
            MessageKind::DataFrame => 0x01,
            MessageKind::TextNotice => 0x02,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            0x01 => Ok(MessageKind::DataFrame),
            0x02 => Ok(MessageKind::TextNotice),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// Decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Matrix(FrequencyPowerMatrix),
    Notice(String),
}

/// One framed message as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    payload: Vec<u8>,
}

impl Message {
    pub fn data_frame(matrix: &FrequencyPowerMatrix) -> Result<Self, ProtocolError> {
        let payload =
            serde_json::to_vec(matrix).map_err(|err| ProtocolError::Payload(err.to_string()))?;
        Ok(Self {
            kind: MessageKind::DataFrame,
            payload,
        })
    }

    pub fn notice(text: &str) -> Self {
        Self {
            kind: MessageKind::TextNotice,
            payload: text.as_bytes().to_vec(),
        }
    }

    pub fn from_payload(payload: &Payload) -> Result<Self, ProtocolError> {
        match payload {
            Payload::Matrix(matrix) => Self::data_frame(matrix),
            Payload::Notice(text) => Ok(Self::notice(text)),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn decode(&self) -> Result<Payload, ProtocolError> {
        match self.kind {
            MessageKind::DataFrame => serde_json::from_slice(&self.payload)
                .map(Payload::Matrix)
                .map_err(|err| ProtocolError::Payload(err.to_string())),
            MessageKind::TextNotice => String::from_utf8(self.payload.clone())
                .map(Payload::Notice)
                .map_err(|err| ProtocolError::Payload(err.to_string())),
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        if self.payload.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(self.payload.len()));
        }
        writer.write_u32::<BigEndian>(self.payload.len() as u32)?;
        writer.write_u8(self.kind.tag())?;
        writer.write_all(&self.payload)?;
        writer.flush()?;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Reads exactly one frame, looping over short reads.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        read_full(reader, &mut header)?;
        let length = BigEndian::read_u32(&header[..4]) as usize;
        let kind = MessageKind::from_tag(header[4])?;
        if length > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(length));
        }

        let mut payload = vec![0u8; length];
        read_full(reader, &mut payload)?;
        Ok(Self { kind, payload })
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ProtocolError::ConnectionTruncated {
                    expected: buf.len(),
                    received: filled,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
