//! Commit a new packet to a container file.
//!
//! # Fit path
//! When the framed packet fits the existing slot it is padded to exactly the
//! slot's capacity and the record is overwritten in place.  The file length
//! and every byte outside the record stay as they were.
//!
//! # Grow path
//! Otherwise the slot is enlarged to the next multiple of
//! [`WriteOptions::capacity_step`] and the whole file is rebuilt:
//!
//! ```text
//! original  [ 0 .. position ) [ old record ] [ rest ]
//! rebuilt   [ 0 .. position ) [ new record ] [ rest ]
//! ```
//!
//! The rebuild goes to a temporary file in the target's directory, which is
//! synced and then renamed over the original.  Until the rename the original
//! is untouched; on any error the temporary file is deleted.  Rounding the
//! capacity up means later writes of similar size take the fit path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::info;
use tempfile::NamedTempFile;

use crate::config::WriteOptions;
use crate::container::{read_slot, Container};
use crate::error::{Result, XmpError};
use crate::packet;

/// Write `xmp` (bare RDF or an already framed packet) into the file at `path`.
///
/// The slot is re-derived from disk first.  Returns the packet exactly as
/// stored, padding included.
pub fn write_packet<C: Container>(path: &Path, xmp: &[u8], options: &WriteOptions) -> Result<Vec<u8>> {
    options.validate()?;

    let slot     = read_slot::<C>(path)?;
    let position = slot.position.ok_or(XmpError::NoInsertionPoint)?;

    let framed = if packet::is_wrapped(xmp) {
        xmp.to_vec()
    } else {
        packet::wrap(xmp, options.packet_id.as_deref())
    };
    check_limit::<C>(framed.len())?;

    if framed.len() > slot.capacity() {
        let capacity = packet::grow_capacity(framed.len(), options.capacity_step);
        check_limit::<C>(capacity)?;
        let padded = packet::pad(&framed, capacity)?;
        info!(
            "{}: rebuilding {} file, XMP slot {} -> {} bytes",
            path.display(),
            C::FORMAT.name(),
            slot.capacity(),
            capacity,
        );
        rebuild::<C>(path, position, slot.record_len, &padded)?;
        Ok(padded)
    } else {
        let padded = packet::pad(&framed, slot.capacity())?;
        info!(
            "{}: rewriting {}-byte XMP slot in place at offset {position}",
            path.display(),
            slot.capacity(),
        );
        overwrite::<C>(path, position, slot.record_len, &padded)?;
        Ok(padded)
    }
}

fn check_limit<C: Container>(len: usize) -> Result<()> {
    if len > C::MAX_PACKET_LEN {
        return Err(XmpError::PacketTooLarge { len, limit: C::MAX_PACKET_LEN });
    }
    Ok(())
}

/// Replace the record at `position` with one of identical length.
fn overwrite<C: Container>(path: &Path, position: u64, record_len: u64, packet: &[u8]) -> Result<()> {
    let mut record = Vec::with_capacity(C::record_len(packet.len()) as usize);
    C::write_record(&mut record, packet)?;
    if record.len() as u64 != record_len {
        return Err(XmpError::SlotSizeMismatch { expected: record_len, actual: record.len() as u64 });
    }

    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(position))?;
    file.write_all(&record)?;
    file.sync_data()?;
    Ok(())
}

/// Copy `path` to a sibling temporary file with the `record_len` bytes at
/// `position` replaced by a new record, then move it into place.
fn rebuild<C: Container>(path: &Path, position: u64, record_len: u64, packet: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut src     = File::open(path)?;
    let permissions = src.metadata()?.permissions();
    let mut temp    = NamedTempFile::new_in(dir)?;

    {
        let mut out = BufWriter::new(temp.as_file_mut());
        let head = io::copy(&mut (&mut src).take(position), &mut out)?;
        if head != position {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank during rewrite").into());
        }
        C::write_record(&mut out, packet)?;
        src.seek(SeekFrom::Start(position + record_len))?;
        io::copy(&mut src, &mut out)?;
        out.flush()?;
    }
    drop(src);

    temp.as_file().sync_all()?;
    fs::set_permissions(temp.path(), permissions)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
