//! JPEG segment walker.
//!
//! A segment is `FF <marker>` followed, for most markers, by a big-endian u16
//! length that counts itself plus the payload.  The XMP packet lives in an
//! APP1 segment whose payload starts with the Adobe XAP namespace.
//!
//! The walker never errors on bad segment structure once the SOI magic has
//! been checked: a bogus marker byte, an impossible length, or a truncated
//! stream all end the walk as if the metadata region were over.

use std::io::{self, Read, Seek, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use super::{eof_as_none, read_payload, Container, Format, PacketSlot};
use crate::error::{Result, XmpError};

pub const SOI: [u8; 2] = [0xFF, 0xD8];

pub const APP0: u8 = 0xE0;
pub const APP1: u8 = 0xE1;
pub const SOS:  u8 = 0xDA;
pub const EOI:  u8 = 0xD9;
const TEM:      u8 = 0x01;

/// APP1 payload prefix of an XMP segment (29 bytes, NUL included).
pub const XMP_NAMESPACE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
/// APP1 payload prefix of an Exif segment.
pub const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";

/// Largest framed packet one APP1 segment may carry.  Extended XMP is not
/// supported.
pub const MAX_PACKET_LEN: usize = 65502;

/// One segment as read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub marker:  u8,
    /// Payload after the length field; empty for standalone markers.
    pub payload: Vec<u8>,
    /// `0xFF` fill bytes that preceded the marker.
    pub fill:    u64,
}

impl Segment {
    /// Bytes this segment occupies on disk, fill excluded.
    pub fn disk_len(&self) -> u64 {
        if is_standalone(self.marker) { 2 } else { 4 + self.payload.len() as u64 }
    }
}

/// Markers that carry no length field.
fn is_standalone(marker: u8) -> bool {
    matches!(marker, TEM | 0xD0..=0xD9)
}

pub struct Jpeg;

impl Container for Jpeg {
    type Record = Segment;

    const FORMAT: Format = Format::Jpeg;
    const MAX_PACKET_LEN: usize = MAX_PACKET_LEN;

    fn read_record<R: Read>(reader: &mut R) -> Result<Option<Segment>> {
        let lead = match eof_as_none(reader.read_u8())? {
            Some(b) => b,
            None    => return Ok(end("stream ended before a marker")),
        };
        if lead != 0xFF {
            return Ok(end("expected 0xFF before a marker"));
        }

        let mut fill   = 0u64;
        let mut marker = match eof_as_none(reader.read_u8())? {
            Some(b) => b,
            None    => return Ok(end("stream ended inside a marker")),
        };
        while marker == 0xFF {
            fill += 1;
            marker = match eof_as_none(reader.read_u8())? {
                Some(b) => b,
                None    => return Ok(end("stream ended inside fill bytes")),
            };
        }

        if is_standalone(marker) {
            return Ok(Some(Segment { marker, payload: Vec::new(), fill }));
        }

        let length = match eof_as_none(reader.read_u16::<BigEndian>())? {
            Some(n) => n,
            None    => return Ok(end("stream ended inside a length field")),
        };
        if length < 2 {
            return Ok(end("segment length below 2"));
        }
        match read_payload(reader, u64::from(length) - 2)? {
            Some(payload) => Ok(Some(Segment { marker, payload, fill })),
            None          => Ok(end("segment payload truncated")),
        }
    }

    fn write_record<W: Write>(writer: &mut W, packet: &[u8]) -> io::Result<()> {
        let length = u16::try_from(2 + XMP_NAMESPACE.len() + packet.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "XMP packet does not fit in one APP1 segment")
        })?;
        writer.write_u8(0xFF)?;
        writer.write_u8(APP1)?;
        writer.write_u16::<BigEndian>(length)?;
        writer.write_all(XMP_NAMESPACE)?;
        writer.write_all(packet)?;
        Ok(())
    }

    fn record_len(packet_len: usize) -> u64 {
        (4 + XMP_NAMESPACE.len() + packet_len) as u64
    }

    fn scan<R: Read + Seek>(reader: &mut R) -> Result<PacketSlot> {
        let mut magic = [0u8; 2];
        match eof_as_none(reader.read_exact(&mut magic))? {
            Some(()) if magic == SOI => {}
            _ => return Err(XmpError::NotAJpegFile),
        }

        let mut slot = PacketSlot::default();
        loop {
            let start   = reader.stream_position()?;
            let segment = match Self::read_record(reader)? {
                Some(s) => s,
                None    => break,
            };
            let after = reader.stream_position()?;

            match segment.marker {
                APP0 => slot.position = Some(after),
                APP1 if segment.payload.starts_with(EXIF_SIGNATURE) => {
                    slot.position = Some(after);
                }
                APP1 if segment.payload.starts_with(XMP_NAMESPACE) => {
                    let position = start + segment.fill;
                    slot.position   = Some(position);
                    slot.record_len = after - position;
                    slot.packet     = Some(segment.payload[XMP_NAMESPACE.len()..].to_vec());
                    break;
                }
                SOS | EOI => break,
                _ => {}
            }
        }
        Ok(slot)
    }
}

fn end(reason: &str) -> Option<Segment> {
    warn!("JPEG segment walk stopped: {reason}");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn jpeg(segments: &[Vec<u8>]) -> Vec<u8> {
        let mut out = SOI.to_vec();
        for s in segments {
            out.extend_from_slice(s);
        }
        out.extend_from_slice(&[0xFF, SOS, 0x00, 0x02, 0x12, 0x34, 0xFF, EOI]);
        out
    }

    fn xmp_payload(packet: &[u8]) -> Vec<u8> {
        let mut p = XMP_NAMESPACE.to_vec();
        p.extend_from_slice(packet);
        p
    }

    #[test]
    fn rejects_bad_magic() {
        let mut c = Cursor::new(b"\x89PNG".to_vec());
        assert!(matches!(Jpeg::scan(&mut c), Err(XmpError::NotAJpegFile)));
        let mut c = Cursor::new(vec![0xFF]);
        assert!(matches!(Jpeg::scan(&mut c), Err(XmpError::NotAJpegFile)));
    }

    #[test]
    fn no_app_segments_has_no_insertion_point() {
        let data = jpeg(&[segment(0xDB, &[0u8; 65])]);
        let slot = Jpeg::scan(&mut Cursor::new(data)).unwrap();
        assert_eq!(slot, PacketSlot::default());
    }

    #[test]
    fn insertion_point_follows_last_early_segment() {
        let app0 = segment(APP0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
        let mut exif_payload = EXIF_SIGNATURE.to_vec();
        exif_payload.extend_from_slice(b"II*\0");
        let exif = segment(APP1, &exif_payload);
        let dqt  = segment(0xDB, &[0u8; 10]);
        let data = jpeg(&[app0.clone(), exif.clone(), dqt]);

        let slot = Jpeg::scan(&mut Cursor::new(data)).unwrap();
        assert_eq!(slot.position, Some((2 + app0.len() + exif.len()) as u64));
        assert_eq!(slot.record_len, 0);
        assert!(!slot.has_packet());
    }

    #[test]
    fn finds_xmp_segment() {
        let app0 = segment(APP0, b"JFIF\0");
        let xmp  = segment(APP1, &xmp_payload(b"<packet/>"));
        let data = jpeg(&[app0.clone(), xmp.clone()]);

        let slot = Jpeg::scan(&mut Cursor::new(data)).unwrap();
        assert_eq!(slot.position, Some((2 + app0.len()) as u64));
        assert_eq!(slot.record_len, xmp.len() as u64);
        assert_eq!(slot.record_len, Jpeg::record_len(b"<packet/>".len()));
        assert_eq!(slot.packet.as_deref(), Some(&b"<packet/>"[..]));
    }

    #[test]
    fn stops_at_start_of_scan() {
        let app0 = segment(APP0, b"JFIF\0");
        let mut data = jpeg(&[app0.clone()]);
        data.extend_from_slice(&segment(APP1, &xmp_payload(b"late")));

        let slot = Jpeg::scan(&mut Cursor::new(data)).unwrap();
        assert_eq!(slot.position, Some((2 + app0.len()) as u64));
        assert!(!slot.has_packet());
    }

    #[test]
    fn fill_bytes_are_not_part_of_the_record() {
        let app0 = segment(APP0, b"JFIF\0");
        let mut xmp = vec![0xFF, 0xFF];
        xmp.extend_from_slice(&segment(APP1, &xmp_payload(b"p")));
        let data = jpeg(&[app0.clone(), xmp]);

        let slot = Jpeg::scan(&mut Cursor::new(data)).unwrap();
        assert_eq!(slot.position, Some((2 + app0.len() + 2) as u64));
        assert_eq!(slot.record_len, Jpeg::record_len(1));
    }

    #[test]
    fn corrupt_length_ends_walk_without_error() {
        let app0 = segment(APP0, b"JFIF\0");
        let mut bad = segment(0xDB, &[0x11u8; 8]);
        bad[2] = 0x00;
        bad[3] = 0x03;
        let data = jpeg(&[app0.clone(), bad, segment(APP1, &xmp_payload(b"p"))]);

        let slot = Jpeg::scan(&mut Cursor::new(data)).unwrap();
        assert!(!slot.has_packet());
        assert_eq!(slot.position, Some((2 + app0.len()) as u64));
    }

    #[test]
    fn truncated_stream_ends_walk() {
        let mut data = SOI.to_vec();
        data.extend_from_slice(&[0xFF, APP1, 0x10, 0x00, b'h', b't']);
        let slot = Jpeg::scan(&mut Cursor::new(data)).unwrap();
        assert_eq!(slot, PacketSlot::default());
    }

    #[test]
    fn write_record_layout() {
        let mut buf = Vec::new();
        Jpeg::write_record(&mut buf, b"abc").unwrap();
        assert_eq!(&buf[..2], &[0xFF, APP1]);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]) as usize, 2 + 29 + 3);
        assert_eq!(&buf[4..33], XMP_NAMESPACE);
        assert_eq!(&buf[33..], b"abc");
        assert_eq!(buf.len() as u64, Jpeg::record_len(3));

        let seg = Jpeg::read_record(&mut Cursor::new(buf)).unwrap().unwrap();
        assert_eq!(seg.marker, APP1);
        assert_eq!(seg.disk_len(), Jpeg::record_len(3));
    }

    #[test]
    fn write_record_rejects_oversized_packet() {
        let mut buf = Vec::new();
        let err = Jpeg::write_record(&mut buf, &vec![b' '; 70_000]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn standalone_markers_have_no_length() {
        let mut c = Cursor::new(vec![0xFF, 0xD3, 0xFF, EOI]);
        let rst = Jpeg::read_record(&mut c).unwrap().unwrap();
        assert_eq!(rst.marker, 0xD3);
        assert_eq!(rst.disk_len(), 2);
        let eoi = Jpeg::read_record(&mut c).unwrap().unwrap();
        assert_eq!(eoi.marker, EOI);
    }
}
