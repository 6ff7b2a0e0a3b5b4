//! Session codecs: encode/decode the value bag plus CSRF token to a
//! storable byte blob.

use super::SessionError;
use super::data::SessionValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Encode/decode contract between the session manager and its store.
pub trait Codec: Send + Sync {
    /// Serialize the CSRF token and value bag.
    fn encode(
        &self,
        csrf_token: &str,
        values: &HashMap<String, SessionValue>,
    ) -> Result<Vec<u8>, SessionError>;

    /// Deserialize a stored blob back into the CSRF token and value
    /// bag.
    fn decode(
        &self,
        blob: &[u8],
    ) -> Result<(String, HashMap<String, SessionValue>), SessionError>;
}

#[derive(Serialize)]
struct EncodeEnvelope<'a> {
    v: &'a HashMap<String, SessionValue>,
    cr: &'a str,
}

#[derive(Deserialize)]
struct DecodeEnvelope {
    v: HashMap<String, SessionValue>,
    cr: String,
}

/// JSON codec, the default.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(
        &self,
        csrf_token: &str,
        values: &HashMap<String, SessionValue>,
    ) -> Result<Vec<u8>, SessionError> {
        serde_json::to_vec(&EncodeEnvelope {
            v: values,
            cr: csrf_token,
        })
        .map_err(|e| SessionError::Encoding(format!("encode: {e}")))
    }

    fn decode(
        &self,
        blob: &[u8],
    ) -> Result<(String, HashMap<String, SessionValue>), SessionError> {
        let envelope: DecodeEnvelope = serde_json::from_slice(blob)
            .map_err(|e| SessionError::Encoding(format!("decode: {e}")))?;
        Ok((envelope.cr, envelope.v))
    }
}

/// MessagePack codec: denser records than JSON for stores where blob
/// size matters.
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode(
        &self,
        csrf_token: &str,
        values: &HashMap<String, SessionValue>,
    ) -> Result<Vec<u8>, SessionError> {
        rmp_serde::to_vec_named(&EncodeEnvelope {
            v: values,
            cr: csrf_token,
        })
        .map_err(|e| SessionError::Encoding(format!("encode: {e}")))
    }

    fn decode(
        &self,
        blob: &[u8],
    ) -> Result<(String, HashMap<String, SessionValue>), SessionError> {
        let envelope: DecodeEnvelope = rmp_serde::from_slice(blob)
            .map_err(|e| SessionError::Encoding(format!("decode: {e}")))?;
        Ok((envelope.cr, envelope.v))
    }
}
