//! Fee payer keypair decoding.
//!
//! Accepted encodings of the 64-byte secret:
//! - base58 (Phantom / `solana-keygen` export)
//! - base64
//! - a JSON byte array (`solana-keygen` keypair file contents)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use solana_keypair::Keypair;

use crate::error::SolanaAdapterError;

const KEYPAIR_LENGTH: usize = 64;

/// Decodes a fee payer keypair.
///
/// # Errors
///
/// Returns [`SolanaAdapterError::InvalidKey`] when no encoding yields a valid keypair.
pub fn parse_keypair(secret: &str) -> Result<Keypair, SolanaAdapterError> {
    let secret = secret.trim();
    let bytes = if secret.starts_with('[') {
        serde_json::from_str::<Vec<u8>>(secret)
            .map_err(|e| SolanaAdapterError::InvalidKey(format!("malformed byte array: {e}")))?
    } else {
        decode_text(secret)?
    };
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| SolanaAdapterError::InvalidKey(e.to_string()))
}

fn decode_text(secret: &str) -> Result<Vec<u8>, SolanaAdapterError> {
    if let Ok(bytes) = bs58::decode(secret).into_vec()
        && bytes.len() == KEYPAIR_LENGTH
    {
        return Ok(bytes);
    }
    match STANDARD.decode(secret) {
        Ok(bytes) if bytes.len() == KEYPAIR_LENGTH => Ok(bytes),
        _ => Err(SolanaAdapterError::InvalidKey(
            "expected a 64-byte keypair in base58, base64 or JSON array form".to_owned(),
        )),
    }
}
