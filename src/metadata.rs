//! [`Metadata`] handle — the primary embedding surface.
//!
//! ```no_run
//! use tinyxmp::Metadata;
//!
//! let mut meta = Metadata::load("photo.jpg")?;
//! if meta.has_xmp() {
//!     println!("{}", String::from_utf8_lossy(&meta.get_xmp().unwrap_or_default()));
//! }
//! meta.write_xmp(b"<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\"></rdf:RDF>")?;
//! # Ok::<(), tinyxmp::XmpError>(())
//! ```

use std::path::{Path, PathBuf};

use log::debug;

use crate::config::WriteOptions;
use crate::container::{read_slot, Format, Jpeg, Png};
use crate::error::Result;
use crate::packet;
use crate::rewrite::write_packet;

/// XMP metadata of one file.
///
/// Holds at most one cached packet: the RDF slice of whatever was last read
/// from or written to the file.  Handles share nothing; two handles on the
/// same path must not be used concurrently.
#[derive(Debug)]
pub struct Metadata {
    path:    PathBuf,
    format:  Format,
    options: WriteOptions,
    xmp:     Option<Vec<u8>>,
}

impl Metadata {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Pick a container by file extension and read its packet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path, WriteOptions::default())
    }

    pub fn load_with<P: AsRef<Path>>(path: P, options: WriteOptions) -> Result<Self> {
        options.validate()?;
        let path   = path.as_ref().to_owned();
        let format = Format::from_path(&path)?;
        let mut meta = Self { path, format, options, xmp: None };
        meta.reload()?;
        Ok(meta)
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    /// Re-read the packet from disk, replacing the cached one.
    pub fn reload(&mut self) -> Result<()> {
        let slot = match self.format {
            Format::Jpeg => read_slot::<Jpeg>(&self.path)?,
            Format::Png  => read_slot::<Png>(&self.path)?,
        };
        self.xmp = slot.packet.as_deref().and_then(rdf_of);
        debug!("{}: has_xmp={}", self.path.display(), self.xmp.is_some());
        Ok(())
    }

    pub fn has_xmp(&self) -> bool {
        self.xmp.is_some()
    }

    /// Copy of the cached RDF.
    pub fn get_xmp(&self) -> Option<Vec<u8>> {
        self.xmp.clone()
    }

    /// Borrowed view of the cached RDF.
    pub fn xmp(&self) -> Option<&[u8]> {
        self.xmp.as_deref()
    }

    // ── Write ─────────────────────────────────────────────────────────────────

    /// Store `xmp` (bare RDF or a framed packet) in the file.
    ///
    /// The packet slot is always re-scanned from disk.  An empty `xmp` writes
    /// nothing and only refreshes the cache.
    pub fn write_xmp(&mut self, xmp: &[u8]) -> Result<()> {
        if xmp.is_empty() {
            return self.reload();
        }
        let stored = match self.format {
            Format::Jpeg => write_packet::<Jpeg>(&self.path, xmp, &self.options)?,
            Format::Png  => write_packet::<Png>(&self.path, xmp, &self.options)?,
        };
        self.xmp = rdf_of(&stored);
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path { &self.path }

    pub fn format(&self) -> Format { self.format }

    pub fn options(&self) -> &WriteOptions { &self.options }
}

fn rdf_of(stored: &[u8]) -> Option<Vec<u8>> {
    Some(packet::unwrap(stored)).filter(|r| !r.is_empty()).map(<[u8]>::to_vec)
}
