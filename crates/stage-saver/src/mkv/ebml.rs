//! EBML element encoding
//!
//! Only the subset needed for a streaming Matroska writer: element IDs are
//! written verbatim, sizes as variable-length integers, and master elements
//! may be left open with the reserved "unknown size" marker.

/// Largest payload size a vint of `len` bytes can carry (all-ones is reserved)
const fn vint_max(len: u32) -> u64 {
    (1u64 << (7 * len)) - 2
}

/// Size marker for master elements whose length is never written back
pub const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Encode `value` as the shortest EBML variable-length integer
pub fn encode_vint(value: u64, out: &mut Vec<u8>) {
    let len = (1..=8).find(|&len| value <= vint_max(len)).unwrap_or(8);
    let marked = value | (1u64 << (7 * len));
    out.extend_from_slice(&marked.to_be_bytes()[8 - len as usize..]);
}

/// Append an element ID (already carrying its length marker)
pub fn encode_id(id: u32, out: &mut Vec<u8>) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    out.extend_from_slice(&bytes[skip..]);
}

/// Append a complete element with a binary payload
pub fn write_binary(id: u32, payload: &[u8], out: &mut Vec<u8>) {
    encode_id(id, out);
    encode_vint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

/// Append an unsigned integer element using the fewest bytes
pub fn write_uint(id: u32, value: u64, out: &mut Vec<u8>) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    write_binary(id, &bytes[skip..], out);
}

/// Append an 8-byte float element
pub fn write_float(id: u32, value: f64, out: &mut Vec<u8>) {
    write_binary(id, &value.to_be_bytes(), out);
}

/// Append a UTF-8 string element
pub fn write_string(id: u32, value: &str, out: &mut Vec<u8>) {
    write_binary(id, value.as_bytes(), out);
}

/// Append a master element whose children were encoded into `children`
pub fn write_master(id: u32, children: &[u8], out: &mut Vec<u8>) {
    write_binary(id, children, out);
}

/// Open a master element of unknown size; children follow in the stream
pub fn open_unknown_size(id: u32, out: &mut Vec<u8>) {
    encode_id(id, out);
    out.extend_from_slice(&UNKNOWN_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vint(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_vint(value, &mut out);
        out
    }

    #[test]
    fn test_vint_lengths() {
        assert_eq!(vint(0), vec![0x80]);
        assert_eq!(vint(7), vec![0x87]);
        assert_eq!(vint(126), vec![0xFE]);
        // 127 would be the reserved all-ones pattern in one byte.
        assert_eq!(vint(127), vec![0x40, 0x7F]);
        assert_eq!(vint(16382), vec![0x7F, 0xFE]);
        assert_eq!(vint(16383), vec![0x20, 0x3F, 0xFF]);
    }

    #[test]
    fn test_id_encoding() {
        let mut out = Vec::new();
        encode_id(0x1A45_DFA3, &mut out);
        encode_id(0x4286, &mut out);
        encode_id(0xA3, &mut out);
        assert_eq!(out, vec![0x1A, 0x45, 0xDF, 0xA3, 0x42, 0x86, 0xA3]);
    }

    #[test]
    fn test_uint_minimal_width() {
        let mut out = Vec::new();
        write_uint(0xD7, 1, &mut out);
        assert_eq!(out, vec![0xD7, 0x81, 0x01]);

        let mut out = Vec::new();
        write_uint(0xE7, 0, &mut out);
        assert_eq!(out, vec![0xE7, 0x81, 0x00]);

        let mut out = Vec::new();
        write_uint(0x2A_D7B1, 1_000_000, &mut out);
        assert_eq!(out, vec![0x2A, 0xD7, 0xB1, 0x83, 0x0F, 0x42, 0x40]);
    }

    #[test]
    fn test_string_and_float() {
        let mut out = Vec::new();
        write_string(0x86, "A_OPUS", &mut out);
        assert_eq!(out, b"\x86\x86A_OPUS".to_vec());

        let mut out = Vec::new();
        write_float(0xB5, 48000.0, &mut out);
        assert_eq!(out[..2], [0xB5, 0x88]);
        assert_eq!(f64::from_be_bytes(out[2..].try_into().unwrap()), 48000.0);
    }

    #[test]
    fn test_unknown_size_master() {
        let mut out = Vec::new();
        open_unknown_size(0x1F43_B675, &mut out);
        assert_eq!(
            out,
            vec![0x1F, 0x43, 0xB6, 0x75, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }
}
