//! Session token generation and validation.
//!
//! A token is `raw entropy + 2-byte checksum`, base64url-encoded
//! without padding for transport. The checksum is an anti-tampering
//! measure so that obviously forged or truncated cookies are discarded
//! before hitting the store; it is not cryptographic authentication.
//! Tokens failing validation are treated as absent, never as errors.

use super::SessionError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Raw entropy length of session tokens, in bytes.
pub const TOKEN_LEN: usize = 30;

/// Raw entropy length of CSRF tokens, in bytes.
pub const CSRF_TOKEN_LEN: usize = 20;

/// Checksum strategy appended to raw token bytes.
///
/// Implementations append a fixed-size suffix over the raw bytes and
/// verify it on inbound tokens.
pub trait Checksum: Send + Sync {
    /// Append the checksum over the buffer's current contents.
    fn append(&self, buf: &mut Vec<u8>);

    /// Whether the buffer ends in a valid checksum over its prefix.
    fn validate(&self, buf: &[u8]) -> bool;

    /// Total length after appending to `raw` input bytes.
    fn encoded_len(&self, raw: usize) -> usize;

    /// Raw length recovered from `total` checksummed bytes.
    fn decoded_len(&self, total: usize) -> usize;
}

/// The default strategy: a 2-byte little-endian multiplicative mix of
/// the first three raw bytes. Intentionally lightweight.
pub struct SimpleChecksum;

impl SimpleChecksum {
    fn mix(bytes: &[u8]) -> u16 {
        u16::from(bytes[0])
            .wrapping_mul(u16::from(bytes[1]))
            .wrapping_add(99)
            .wrapping_mul(u16::from(bytes[2]))
    }
}

impl Checksum for SimpleChecksum {
    fn append(&self, buf: &mut Vec<u8>) {
        assert!(buf.len() >= 3, "checksum input needs at least 3 bytes");
        let sum = Self::mix(buf);
        buf.extend_from_slice(&sum.to_le_bytes());
    }

    fn validate(&self, buf: &[u8]) -> bool {
        if buf.len() < 5 {
            return false;
        }
        let sum = Self::mix(buf);
        buf[buf.len() - 2..] == sum.to_le_bytes()
    }

    fn encoded_len(&self, raw: usize) -> usize {
        raw + 2
    }

    fn decoded_len(&self, total: usize) -> usize {
        total.saturating_sub(2)
    }
}

/// Keyed strategy: HMAC-SHA256 over the raw bytes, truncated to 2
/// bytes. Covers the whole token, so any single-byte mutation is
/// detected, at the cost of a keyed hash per validation.
pub struct HmacChecksum {
    key: Vec<u8>,
}

impl HmacChecksum {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        HmacChecksum { key: key.into() }
    }

    fn tag(&self, payload: &[u8]) -> [u8; 2] {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(payload);
        let digest = mac.finalize().into_bytes();
        [digest[0], digest[1]]
    }
}

impl Checksum for HmacChecksum {
    fn append(&self, buf: &mut Vec<u8>) {
        let tag = self.tag(buf);
        buf.extend_from_slice(&tag);
    }

    fn validate(&self, buf: &[u8]) -> bool {
        if buf.len() < 3 {
            return false;
        }
        let (payload, suffix) = buf.split_at(buf.len() - 2);
        let tag = self.tag(payload);
        suffix.ct_eq(&tag).into()
    }

    fn encoded_len(&self, raw: usize) -> usize {
        raw + 2
    }

    fn decoded_len(&self, total: usize) -> usize {
        total.saturating_sub(2)
    }
}

/// Generate a checksummed, base64url-encoded token with `raw_len`
/// bytes of entropy from the operating system's secure random source.
///
/// An entropy failure is surfaced as [`SessionError::Token`] and fails
/// the single affected request; it never tears down the process.
pub fn generate_token(raw_len: usize, checksum: &dyn Checksum) -> Result<String, SessionError> {
    let mut raw = vec![0u8; raw_len];
    OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|e| SessionError::Token(format!("secure random source failed: {e}")))?;
    checksum.append(&mut raw);
    Ok(URL_SAFE_NO_PAD.encode(&raw))
}

/// Whether an inbound encoded token decodes and carries a valid
/// checksum. Failures are soft: the caller treats the token as absent.
pub fn validate_token(token: &str, checksum: &dyn Checksum) -> bool {
    match URL_SAFE_NO_PAD.decode(token) {
        Ok(raw) => {
            if checksum.validate(&raw) {
                true
            } else {
                tracing::info!(token, "session token failed checksum validation");
                false
            }
        }
        Err(e) => {
            tracing::info!(token, error = %e, "session token failed base64 decoding");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_validate() {
        for checksum in [
            &SimpleChecksum as &dyn Checksum,
            &HmacChecksum::new(b"k".to_vec()),
        ] {
            let token = generate_token(TOKEN_LEN, checksum).expect("entropy");
            assert!(validate_token(&token, checksum));
        }
    }

    #[test]
    fn test_token_length() {
        let token = generate_token(TOKEN_LEN, &SimpleChecksum).expect("entropy");
        // 32 raw bytes -> ceil(32 * 8 / 6) base64url characters.
        assert_eq!(token.len(), 43);
        let token = generate_token(CSRF_TOKEN_LEN, &SimpleChecksum).expect("entropy");
        assert_eq!(token.len(), 30);
    }

    #[test]
    fn test_simple_checksum_detects_covered_mutations() {
        let mut buf = vec![3u8, 5, 7, 11, 13];
        SimpleChecksum.append(&mut buf);
        assert!(SimpleChecksum.validate(&buf));

        // The mix covers the first three bytes and the suffix itself.
        for idx in [0usize, 1, 2, 5, 6] {
            let mut corrupt = buf.clone();
            corrupt[idx] = corrupt[idx].wrapping_add(1);
            assert!(!SimpleChecksum.validate(&corrupt), "byte {idx} undetected");
        }
    }

    #[test]
    fn test_hmac_checksum_detects_any_mutation() {
        let checksum = HmacChecksum::new(b"test-key-for-unit-tests".to_vec());
        let mut buf = (0u8..20).collect::<Vec<u8>>();
        checksum.append(&mut buf);
        assert!(checksum.validate(&buf));

        for idx in [0usize, 5, 13, 19, 20, 21] {
            let mut corrupt = buf.clone();
            corrupt[idx] ^= 0x41;
            assert!(!checksum.validate(&corrupt), "byte {idx} undetected");
        }
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(!validate_token("not base64url!!!", &SimpleChecksum));
        assert!(!validate_token("", &SimpleChecksum));
        assert!(!validate_token("AAAA", &SimpleChecksum));
    }

    #[test]
    fn test_encoded_decoded_len_round_trip() {
        let checksum = SimpleChecksum;
        assert_eq!(checksum.encoded_len(TOKEN_LEN), TOKEN_LEN + 2);
        assert_eq!(checksum.decoded_len(checksum.encoded_len(TOKEN_LEN)), TOKEN_LEN);
    }
}
