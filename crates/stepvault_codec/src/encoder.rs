//! Canonical CBOR encoder.

use crate::error::CodecResult;
use crate::value::Value;

/// Encode a value to canonical CBOR bytes.
///
/// Output is deterministic (RFC 8949 §4.2.1): shortest integer arguments,
/// definite lengths only, map keys sorted by their encoded form. Floats are
/// always written at float64 width regardless of their value.
///
/// # Errors
///
/// Encoding a [`Value`] cannot currently fail; the `Result` leaves room for
/// the decoder's limits to be enforced symmetrically.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a value, appending to the buffer.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(false) => self.buffer.push(0xf4),
            Value::Bool(true) => self.buffer.push(0xf5),
            Value::Integer(n) => self.write_integer(*n),
            Value::Float(f) => {
                self.buffer.push(0xfb);
                self.buffer.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Value::Bytes(b) => {
                self.write_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.write_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.write_head(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(pairs) => self.write_map(pairs)?,
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn write_integer(&mut self, n: i64) {
        if n >= 0 {
            self.write_head(0, n as u64);
        } else {
            self.write_head(1, (-1 - n) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_head(&mut self, major: u8, arg: u64) {
        let mt = major << 5;
        match arg {
            0..=23 => self.buffer.push(mt | arg as u8),
            24..=0xFF => self.buffer.extend_from_slice(&[mt | 24, arg as u8]),
            0x100..=0xFFFF => {
                self.buffer.push(mt | 25);
                self.buffer.extend_from_slice(&(arg as u16).to_be_bytes());
            }
            0x1_0000..=0xFFFF_FFFF => {
                self.buffer.push(mt | 26);
                self.buffer.extend_from_slice(&(arg as u32).to_be_bytes());
            }
            _ => {
                self.buffer.push(mt | 27);
                self.buffer.extend_from_slice(&arg.to_be_bytes());
            }
        }
    }

    fn write_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        // Keys are sorted by their own encoding, whatever order the map holds.
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let mut key_encoder = CanonicalEncoder::new();
            key_encoder.encode(key)?;
            entries.push((key_encoder.into_bytes(), value));
        }
        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        self.write_head(5, entries.len() as u64);
        for (key_bytes, value) in entries {
            self.buffer.extend_from_slice(&key_bytes);
            self.encode(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() {
        assert_eq!(to_canonical_cbor(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Value::Bool(true)).unwrap(), vec![0xf5]);
        assert_eq!(to_canonical_cbor(&Value::from(23)).unwrap(), vec![0x17]);
        assert_eq!(to_canonical_cbor(&Value::from(24)).unwrap(), vec![0x18, 24]);
        assert_eq!(
            to_canonical_cbor(&Value::from(256)).unwrap(),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(to_canonical_cbor(&Value::from(-1)).unwrap(), vec![0x20]);
        assert_eq!(to_canonical_cbor(&Value::from(-25)).unwrap(), vec![0x38, 24]);
    }

    #[test]
    fn floats_are_fixed_width() {
        assert_eq!(
            to_canonical_cbor(&Value::from(2.5)).unwrap(),
            vec![0xfb, 0x40, 0x04, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(to_canonical_cbor(&Value::from(1.0)).unwrap().len(), 9);
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(
            to_canonical_cbor(&Value::from("hi")).unwrap(),
            vec![0x62, b'h', b'i']
        );
        assert_eq!(
            to_canonical_cbor(&Value::Bytes(vec![1, 2])).unwrap(),
            vec![0x42, 1, 2]
        );
    }

    #[test]
    fn unsorted_map_is_written_sorted() {
        let map = Value::Map(vec![
            (Value::from("bb"), Value::from(2)),
            (Value::from("a"), Value::from(1)),
        ]);
        assert_eq!(
            to_canonical_cbor(&map).unwrap(),
            vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]
        );
    }
}
