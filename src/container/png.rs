//! PNG chunk walker.
//!
//! Chunk layout: `length (u32 BE) | type (4 B) | data (length B) | crc (u32 BE)`,
//! with the CRC-32 taken over type and data.  Unlike the JPEG walker, every
//! chunk read before the stop point is checksum-verified.

use std::io::{self, Read, Seek, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use log::warn;

use super::{eof_as_none, read_payload, Container, Format, PacketSlot};
use crate::error::{Result, XmpError};

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub const IHDR: [u8; 4] = *b"IHDR";
pub const ITXT: [u8; 4] = *b"iTXt";
pub const IEND: [u8; 4] = *b"IEND";

/// iTXt payload prefix of the XMP chunk: keyword, NUL separator, compression
/// flag and method, empty language tag and empty translated keyword.
pub const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp\0\0\0\0\0";

/// Length, type and CRC fields around every chunk's data.
pub const CHUNK_OVERHEAD: usize = 12;

/// PNG caps chunk data at 2^31 - 1 bytes.
pub const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_type: [u8; 4],
    pub data:       Vec<u8>,
    pub crc:        u32,
}

impl Chunk {
    pub fn compute_crc(&self) -> u32 {
        chunk_crc(&self.chunk_type, &self.data)
    }

    pub fn crc_ok(&self) -> bool {
        self.compute_crc() == self.crc
    }

    /// Chunk type for diagnostics.
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.chunk_type).into_owned()
    }

    pub fn disk_len(&self) -> u64 {
        (CHUNK_OVERHEAD + self.data.len()) as u64
    }
}

fn chunk_crc(chunk_type: &[u8; 4], data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    hasher.finalize()
}

pub struct Png;

impl Container for Png {
    type Record = Chunk;

    const FORMAT: Format = Format::Png;
    const MAX_PACKET_LEN: usize = MAX_CHUNK_LEN as usize - XMP_KEYWORD.len();

    fn read_record<R: Read>(reader: &mut R) -> Result<Option<Chunk>> {
        let length = match eof_as_none(reader.read_u32::<BigEndian>())? {
            Some(n) => n,
            None    => return Ok(end("stream ended before IEND")),
        };
        if length > MAX_CHUNK_LEN {
            return Ok(end("chunk length out of range"));
        }
        let mut chunk_type = [0u8; 4];
        if eof_as_none(reader.read_exact(&mut chunk_type))?.is_none() {
            return Ok(end("stream ended inside a chunk type"));
        }
        let data = match read_payload(reader, u64::from(length))? {
            Some(d) => d,
            None    => return Ok(end("chunk data truncated")),
        };
        let crc = match eof_as_none(reader.read_u32::<BigEndian>())? {
            Some(c) => c,
            None    => return Ok(end("stream ended inside a chunk CRC")),
        };
        Ok(Some(Chunk { chunk_type, data, crc }))
    }

    fn write_record<W: Write>(writer: &mut W, packet: &[u8]) -> io::Result<()> {
        let mut data = Vec::with_capacity(XMP_KEYWORD.len() + packet.len());
        data.extend_from_slice(XMP_KEYWORD);
        data.extend_from_slice(packet);
        let length = u32::try_from(data.len())
            .ok()
            .filter(|&n| n <= MAX_CHUNK_LEN)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "XMP packet does not fit in one PNG chunk")
            })?;

        writer.write_u32::<BigEndian>(length)?;
        writer.write_all(&ITXT)?;
        writer.write_all(&data)?;
        writer.write_u32::<BigEndian>(chunk_crc(&ITXT, &data))?;
        Ok(())
    }

    fn record_len(packet_len: usize) -> u64 {
        (CHUNK_OVERHEAD + XMP_KEYWORD.len() + packet_len) as u64
    }

    fn scan<R: Read + Seek>(reader: &mut R) -> Result<PacketSlot> {
        let mut magic = [0u8; 8];
        match eof_as_none(reader.read_exact(&mut magic))? {
            Some(()) if magic == SIGNATURE => {}
            _ => return Err(XmpError::NotAPngFile),
        }

        let mut slot = PacketSlot::default();
        loop {
            let start = reader.stream_position()?;
            let chunk = match Self::read_record(reader)? {
                Some(c) => c,
                None    => break,
            };
            if !chunk.crc_ok() {
                return Err(XmpError::ChecksumError { chunk_type: chunk.type_name(), offset: start });
            }

            match chunk.chunk_type {
                IHDR => slot.position = Some(reader.stream_position()?),
                ITXT if chunk.data.starts_with(XMP_KEYWORD) => {
                    slot.position   = Some(start);
                    slot.record_len = chunk.disk_len();
                    slot.packet     = Some(chunk.data[XMP_KEYWORD.len()..].to_vec());
                    break;
                }
                IEND => break,
                _ => {}
            }
        }
        Ok(slot)
    }
}

fn end(reason: &str) -> Option<Chunk> {
    warn!("PNG chunk walk stopped: {reason}");
    None
}
