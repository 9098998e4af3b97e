//! Read and rewrite the raw XMP packet embedded in JPEG and PNG files.
//!
//! The packet's RDF is treated as opaque bytes.  This crate owns only the
//! `<?xpacket?>` envelope and the container record that carries it: a JPEG
//! APP1 segment or a PNG `iTXt` chunk.

pub mod config;
pub mod container;
pub mod error;
pub mod metadata;
pub mod packet;
pub mod rewrite;

pub use config::WriteOptions;
pub use container::{Container, Format, Jpeg, PacketSlot, Png};
pub use error::{Result, XmpError};
pub use metadata::Metadata;
pub use packet::{is_wrapped, pad, unwrap, wrap};
