//! XMP packet wrapper: framing, unframing and padding.
//!
//! # Layout
//!
//! ```text
//! <?xpacket begin="<BOM>" id="<hex id>"?>
//! <x:xmpmeta xmlns:x="adobe:ns:meta/"> RDF </x:xmpmeta>
//! [ padding ]
//! <?xpacket end="w"?>
//! ```
//!
//! Padding is whitespace between `</x:xmpmeta>` and the trailing processing
//! instruction.  It reserves room so a later, larger packet can overwrite the
//! old one in place instead of forcing the container to be rebuilt.
//!
//! The RDF body is opaque here.  Nothing in this module parses XML; packet
//! boundaries are found by plain byte search.

use uuid::Uuid;

use crate::error::{Result, XmpError};

/// Prefix shared by the begin and end processing instructions.
pub const PACKET_MARKER: &[u8] = b"<?xpacket";
/// UTF-8 byte-order mark carried in the `begin` attribute.
pub const BOM: &[u8; 3] = b"\xef\xbb\xbf";
/// Default growth quantum, in bytes, for rebuilt slots.
pub const DEFAULT_CAPACITY_STEP: usize = 4000;

const XMPMETA_OPEN:  &[u8] = b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">";
const XMPMETA_CLOSE: &[u8] = b"</x:xmpmeta>";
const PACKET_END:    &[u8] = b"<?xpacket end=\"w\"?>";
const RDF_OPEN:      &[u8] = b"<rdf:RDF";
const RDF_CLOSE:     &[u8] = b"</rdf:RDF>";

/// Column width of the padding region; every line break lands on a multiple.
const PAD_LINE: usize = 80;

// ── Framing ───────────────────────────────────────────────────────────────────

/// Fresh random packet id: 128 bits as 32 lowercase hex digits.
pub fn new_packet_id() -> String {
    hex::encode(Uuid::new_v4().as_bytes())
}

/// Wrap bare RDF in the xpacket envelope.
///
/// `id` becomes the packet's `id` attribute; when `None` a random one is
/// generated, which is the only nondeterministic part of the output.
pub fn wrap(rdf: &[u8], id: Option<&str>) -> Vec<u8> {
    let id = id.map(str::to_owned).unwrap_or_else(new_packet_id);

    let mut out = Vec::with_capacity(rdf.len() + id.len() + 128);
    out.extend_from_slice(b"<?xpacket begin=\"");
    out.extend_from_slice(BOM);
    out.extend_from_slice(b"\" id=\"");
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(b"\"?>");
    out.extend_from_slice(XMPMETA_OPEN);
    out.extend_from_slice(rdf);
    out.extend_from_slice(XMPMETA_CLOSE);
    out.extend_from_slice(PACKET_END);
    out
}

/// Slice from the first `<rdf:RDF` through the first `</rdf:RDF>` inclusive.
///
/// Only the first pair is considered, even if the packet carries several RDF
/// roots.  Returns an empty slice when either marker is missing or the close
/// marker comes before the open one.
pub fn unwrap(packet: &[u8]) -> &[u8] {
    let start = match find(packet, RDF_OPEN) {
        Some(i) => i,
        None    => return &[],
    };
    let end = match find(packet, RDF_CLOSE) {
        Some(i) => i + RDF_CLOSE.len(),
        None    => return &[],
    };
    packet.get(start..end).unwrap_or(&[])
}

/// True iff `bytes` carries exactly two `<?xpacket` instructions.
pub fn is_wrapped(bytes: &[u8]) -> bool {
    count(bytes, PACKET_MARKER) == 2
}

// ── Padding ───────────────────────────────────────────────────────────────────

/// Inflate a framed packet to exactly `size` bytes.
///
/// Whitespace is inserted before the last `<?xpacket` instruction (or appended
/// when there is none).  The padding is spaces with a newline at every 80th
/// byte of the padding region, and its final byte is always a newline.
pub fn pad(packet: &[u8], size: usize) -> Result<Vec<u8>> {
    if packet.len() > size {
        return Err(XmpError::PacketTooLarge { len: packet.len(), limit: size });
    }
    let split = rfind(packet, PACKET_MARKER).unwrap_or(packet.len());

    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&packet[..split]);
    out.extend_from_slice(&padding(size - packet.len()));
    out.extend_from_slice(&packet[split..]);
    Ok(out)
}

fn padding(len: usize) -> Vec<u8> {
    let mut pad = vec![b' '; len];
    for b in pad.iter_mut().step_by(PAD_LINE) {
        *b = b'\n';
    }
    if let Some(last) = pad.last_mut() {
        *last = b'\n';
    }
    pad
}

/// Capacity for a slot that has to grow to hold `len` bytes: the next
/// multiple of `step` strictly above `len`.
pub fn grow_capacity(len: usize, step: usize) -> usize {
    (len / step + 1) * step
}

// ── Byte search ───────────────────────────────────────────────────────────────

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    let mut n    = 0;
    let mut rest = haystack;
    while let Some(i) = find(rest, needle) {
        n += 1;
        rest = &rest[i + needle.len()..];
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    const RDF: &[u8] = b"<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\"></rdf:RDF>";

    #[test]
    fn wrap_layout() {
        let p = wrap(RDF, Some("abc123"));
        assert!(p.starts_with(b"<?xpacket begin=\"\xef\xbb\xbf\" id=\"abc123\"?>"));
        assert!(p.ends_with(b"</x:xmpmeta><?xpacket end=\"w\"?>"));
        assert_eq!(unwrap(&p), RDF);
    }

    #[test]
    fn generated_ids_are_hex_and_distinct() {
        let a = new_packet_id();
        let b = new_packet_id();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn unwrap_takes_first_pair_only() {
        let p = b"x<rdf:RDF>a</rdf:RDF><rdf:RDF>b</rdf:RDF>y";
        assert_eq!(unwrap(p), b"<rdf:RDF>a</rdf:RDF>");
    }

    #[test]
    fn unwrap_degenerate_inputs() {
        assert_eq!(unwrap(b""), b"");
        assert_eq!(unwrap(b"<rdf:RDF>no close"), b"");
        assert_eq!(unwrap(b"no open</rdf:RDF>"), b"");
        assert_eq!(unwrap(b"</rdf:RDF><rdf:RDF>"), b"");
    }

    #[test]
    fn wrapped_detection() {
        assert!(is_wrapped(&wrap(RDF, None)));
        assert!(!is_wrapped(RDF));
        assert!(!is_wrapped(b"<?xpacket begin=\"\"?><rdf:RDF></rdf:RDF>"));
        assert!(!is_wrapped(b"<?xpacket<?xpacket<?xpacket"));
    }

    #[test]
    fn pad_layout() {
        let p = wrap(RDF, Some("id"));
        let padded = pad(&p, p.len() + 200).unwrap();
        assert_eq!(padded.len(), p.len() + 200);

        let split = rfind(&p, PACKET_MARKER).unwrap();
        let region = &padded[split..split + 200];
        assert_eq!(region[0], b'\n');
        assert_eq!(region[80], b'\n');
        assert_eq!(region[160], b'\n');
        assert_eq!(region[199], b'\n');
        assert_eq!(region.iter().filter(|&&b| b == b'\n').count(), 4);
        assert!(region.iter().all(|&b| b == b' ' || b == b'\n'));
        assert!(padded.ends_with(PACKET_END));
        assert_eq!(unwrap(&padded), RDF);
    }

    #[test]
    fn pad_to_own_length_is_identity() {
        let p = wrap(RDF, Some("id"));
        assert_eq!(pad(&p, p.len()).unwrap(), p);
    }

    #[test]
    fn pad_single_byte() {
        let p = wrap(RDF, Some("id"));
        let padded = pad(&p, p.len() + 1).unwrap();
        let split = rfind(&p, PACKET_MARKER).unwrap();
        assert_eq!(padded[split], b'\n');
    }

    #[test]
    fn pad_rejects_smaller_target() {
        let p = wrap(RDF, None);
        match pad(&p, p.len() - 1) {
            Err(XmpError::PacketTooLarge { len, limit }) => {
                assert_eq!(len, p.len());
                assert_eq!(limit, p.len() - 1);
            }
            other => panic!("expected PacketTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn grow_capacity_steps() {
        assert_eq!(grow_capacity(1, 4000), 4000);
        assert_eq!(grow_capacity(3999, 4000), 4000);
        assert_eq!(grow_capacity(4000, 4000), 8000);
        assert_eq!(grow_capacity(4001, 4000), 8000);
    }
}
