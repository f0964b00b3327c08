//! # StepVault Codec
//!
//! Value model shared by every StepVault layer.
//!
//! This crate provides:
//! - [`Value`], the structured record type stored in object stores
//! - [`Key`], the ordered key type object stores are indexed by
//! - canonical CBOR encoding, used by the engine to copy records in and
//!   out of storage (callers never share memory with stored records)
//! - a serde bridge ([`to_value`] / [`from_value`]) so typed schemas can be
//!   mapped onto [`Value`]
//!
//! ## Usage
//!
//! ```
//! use stepvault_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let record = Value::object([("name", Value::from("Ada")), ("age", Value::from(36))]);
//! let bytes = to_canonical_cbor(&record).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod decoder;
mod encoder;
mod error;
mod key;
mod value;

pub use bridge::{from_value, to_value};
pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use key::Key;
pub use value::{Value, MAX_OBJECT_DEPTH};
