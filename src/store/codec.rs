//! Self-describing wire encoding of configuration values.
//!
//! Values travel as bincode-serialized `Option<ConfigValue>`. The enum
//! variant tag carries the value kind, so decoding needs no schema. Delete
//! entries carry an empty payload.

use bytes::Bytes;

use super::Operation;
use crate::ConfigValue;
use crate::DecodeError;

/// Encodes a value for `put`.
pub fn encode_value(value: &ConfigValue) -> Result<Bytes, DecodeError> {
    bincode::serialize(&Some(value))
        .map(Bytes::from)
        .map_err(DecodeError::Encode)
}

/// Decodes the payload of an entry.
///
/// Deletes always decode to `None`. A put whose payload encodes the absent
/// marker also decodes to `None`.
pub fn decode_payload(
    key: &str,
    operation: Operation,
    payload: &[u8],
) -> Result<Option<ConfigValue>, DecodeError> {
    match operation {
        Operation::Delete => Ok(None),
        Operation::Put => {
            bincode::deserialize::<Option<ConfigValue>>(payload).map_err(|source| {
                DecodeError::Payload {
                    key: key.to_string(),
                    source,
                }
            })
        }
    }
}
