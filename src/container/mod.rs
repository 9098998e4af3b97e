//! Container walkers that locate the XMP record inside an image file.
//!
//! Each container is a flat sequence of self-delimiting records (JPEG
//! segments, PNG chunks).  A walker reads them strictly in order from the
//! current position and stops at the first XMP record or at the point past
//! which XMP never appears (JPEG start-of-scan, PNG `IEND`).  While walking it
//! remembers where a new XMP record should go if none exists yet.
//!
//! | Format | Record | XMP record | Insert after |
//! |--------|--------|------------|--------------|
//! | JPEG | `FF xx` + u16 length | APP1 + `http://ns.adobe.com/xap/1.0/\0` | last APP0 / APP1-Exif |
//! | PNG  | u32 length + type + data + CRC | `iTXt` + `XML:com.adobe.xmp\0\0\0\0\0` | `IHDR` |

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::Path;

use crate::error::{Result, XmpError};

pub mod jpeg;
pub mod png;

pub use jpeg::Jpeg;
pub use png::Png;

// ── Format ────────────────────────────────────────────────────────────────────

/// Container formats with an XMP walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Jpeg,
    Png,
}

impl Format {
    /// Pick a format from the lowercased file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jpg") | Some("jpeg") => Ok(Format::Jpeg),
            Some("png")                => Ok(Format::Png),
            _ => Err(XmpError::UnsupportedFormat { path: path.to_owned() }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png  => "png",
        }
    }
}

// ── PacketSlot ────────────────────────────────────────────────────────────────

/// Where the packet lives in a file, or where it would go.
///
/// Computed fresh by every scan and never cached across writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketSlot {
    /// Offset of the existing XMP record, or of the insertion point when the
    /// file has none.  `None` when the walker found neither.
    pub position:   Option<u64>,
    /// On-disk length of the existing XMP record; 0 when there is none.
    pub record_len: u64,
    /// Stored packet with the container's namespace prefix removed.
    pub packet:     Option<Vec<u8>>,
}

impl PacketSlot {
    /// Bytes available for a packet without resizing the file.
    pub fn capacity(&self) -> usize {
        self.packet.as_ref().map_or(0, Vec::len)
    }

    pub fn has_packet(&self) -> bool {
        self.packet.is_some()
    }
}

// ── Container ─────────────────────────────────────────────────────────────────

/// One container format: how to walk its records and how to encode an XMP
/// record.
pub trait Container {
    /// One parsed record.
    type Record;

    const FORMAT: Format;

    /// Largest framed packet a single XMP record can carry.
    const MAX_PACKET_LEN: usize;

    /// Read the next record.  `Ok(None)` means the record stream ended, either
    /// cleanly or because it was truncated or malformed.
    fn read_record<R: Read>(reader: &mut R) -> Result<Option<Self::Record>>;

    /// Encode a complete XMP record carrying `packet`.
    fn write_record<W: Write>(writer: &mut W, packet: &[u8]) -> io::Result<()>;

    /// On-disk length of the XMP record [`Container::write_record`] emits.
    fn record_len(packet_len: usize) -> u64;

    /// Validate the magic number, then walk records to find the packet slot.
    fn scan<R: Read + Seek>(reader: &mut R) -> Result<PacketSlot>;
}

/// Open `path` and scan it for the packet slot.  The file is closed on return.
pub fn read_slot<C: Container>(path: &Path) -> Result<PacketSlot> {
    let mut reader = BufReader::new(File::open(path)?);
    let slot = C::scan(&mut reader)?;
    log::debug!(
        "{}: {} scan -> position={:?} record_len={} capacity={}",
        path.display(),
        C::FORMAT.name(),
        slot.position,
        slot.record_len,
        slot.capacity(),
    );
    Ok(slot)
}

/// Map an end-of-file while reading a record to `None`.
pub(crate) fn eof_as_none<T>(r: io::Result<T>) -> io::Result<Option<T>> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read exactly `len` bytes without trusting `len` for the allocation size.
pub(crate) fn read_payload<R: Read>(reader: &mut R, len: u64) -> io::Result<Option<Vec<u8>>> {
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    Ok(if data.len() as u64 == len { Some(data) } else { None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_dispatch_on_extension() {
        assert_eq!(Format::from_path(Path::new("a.jpg")).unwrap(), Format::Jpeg);
        assert_eq!(Format::from_path(Path::new("a.JPEG")).unwrap(), Format::Jpeg);
        assert_eq!(Format::from_path(Path::new("dir/a.b.Png")).unwrap(), Format::Png);
        assert!(matches!(
            Format::from_path(Path::new("a.gif")),
            Err(XmpError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            Format::from_path(Path::new("jpg")),
            Err(XmpError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn slot_capacity() {
        let empty = PacketSlot::default();
        assert_eq!(empty.capacity(), 0);
        assert!(!empty.has_packet());

        let slot = PacketSlot { position: Some(20), record_len: 40, packet: Some(vec![b' '; 7]) };
        assert_eq!(slot.capacity(), 7);
        assert!(slot.has_packet());
    }

    #[test]
    fn short_payload_is_none() {
        let mut r: &[u8] = b"abc";
        assert_eq!(read_payload(&mut r, 5).unwrap(), None);
        let mut r: &[u8] = b"abcdef";
        assert_eq!(read_payload(&mut r, 3).unwrap(), Some(b"abc".to_vec()));
    }
}
