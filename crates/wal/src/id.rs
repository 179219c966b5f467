use std::fmt;

/// Identifier of a batch: the unsigned varint encoding of its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(Vec<u8>);

impl BatchId {
    /// Encodes a sequence number the same way the log stores it.
    pub fn from_sequence(seq: u64) -> Self {
        Self(encode_uvarint(seq))
    }

    /// Wraps raw key bytes read from the store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decoded sequence number, or `None` if the bytes are not a valid varint.
    pub fn sequence(&self) -> Option<u64> {
        decode_uvarint(&self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sequence() {
            Some(seq) => write!(f, "{seq}"),
            None => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

fn encode_uvarint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
    out
}

fn decode_uvarint(buf: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i == 10 {
            return None;
        }
        if byte < 0x80 {
            // The tenth byte may only carry the top bit of a u64.
            if i == 9 && byte > 1 {
                return None;
            }
            if i + 1 != buf.len() {
                return None;
            }
            return Some(value | u64::from(byte) << shift);
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_sequences_are_single_byte() {
        assert_eq!(BatchId::from_sequence(1).as_bytes(), &[1]);
        assert_eq!(BatchId::from_sequence(127).as_bytes(), &[127]);
        assert_eq!(BatchId::from_sequence(128).as_bytes(), &[0x80, 0x01]);
    }

    #[test]
    fn sequence_decodes_back() {
        for seq in [0, 1, 300, 16_384, u64::MAX] {
            assert_eq!(BatchId::from_sequence(seq).sequence(), Some(seq));
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let id = BatchId::from_bytes(vec![1, 2]);
        assert_eq!(id.sequence(), None);
        assert_eq!(id.to_string(), "0x0102");
    }

    #[test]
    fn display_uses_sequence_number() {
        assert_eq!(BatchId::from_sequence(300).to_string(), "300");
    }
}
