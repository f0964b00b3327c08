//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Maximum element count accepted for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 1024 * 1024;

/// Maximum byte/text string length accepted.
const MAX_BYTES_LENGTH: u64 = 64 * 1024 * 1024;

/// Decode a single value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not canonical CBOR, contain half or
/// single precision floats, indefinite lengths or tags, or carry trailing
/// bytes.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::invalid_structure("trailing bytes after value"));
    }
    Ok(value)
}

/// A decoder that accepts only canonical CBOR as produced by
/// [`crate::CanonicalEncoder`].
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial = self.read_byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.read_length(info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_slice(len)?.to_vec()))
            }
            3 => {
                let len = self.read_length(info, MAX_BYTES_LENGTH)?;
                let bytes = self.read_slice(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => {
                let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                Ok(Value::Array(items))
            }
            5 => self.decode_map(info),
            6 => Err(CodecError::invalid_structure("tagged values are not stored")),
            _ => self.decode_simple(info),
        }
    }

    fn decode_map(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.read_length(info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(1024));
        let data = self.data;
        let mut previous_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let start = self.pos;
            let key = self.decode()?;
            let key_bytes = &data[start..self.pos];

            if let Some(prev) = previous_key {
                let order = prev.len().cmp(&key_bytes.len()).then_with(|| prev.cmp(key_bytes));
                if order != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }
            previous_key = Some(key_bytes);

            let value = self.decode()?;
            pairs.push((key, value));
        }

        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, info: u8) -> CodecResult<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 | 23 => Ok(Value::Null),
            25 | 26 => Err(CodecError::invalid_structure(
                "non-canonical: floats are stored at float64 width",
            )),
            27 => {
                let b = self.read_slice(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Ok(Value::Float(f64::from_bits(u64::from_be_bytes(raw))))
            }
            31 => Err(CodecError::IndefiniteLengthForbidden),
            other => Err(CodecError::invalid_structure(format!(
                "unsupported simple value {other}"
            ))),
        }
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let slice = self.data.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_length(&mut self, info: u8, max: u64) -> CodecResult<usize> {
        let claimed = self.read_argument(info)?;
        if claimed > max {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed: max,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::IntegerOverflow)
    }

    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, floor) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => {
                let b = self.read_slice(2)?;
                (u64::from(u16::from_be_bytes([b[0], b[1]])), 0x100)
            }
            26 => {
                let b = self.read_slice(4)?;
                (u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])), 0x1_0000)
            }
            27 => {
                let b = self.read_slice(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                (u64::from_be_bytes(raw), 0x1_0000_0000)
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < floor {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }
}
