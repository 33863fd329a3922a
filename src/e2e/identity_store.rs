use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::e2e::IdentityKeypair;
use crate::error::{ChorusError, Result};

pub fn decode_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| ChorusError::Config(e.to_string()))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| ChorusError::Config("invalid key length".to_string()))
}

pub fn encode_key(key: &[u8; 32]) -> String {
    BASE64.encode(key)
}

/// Reads the conversation identity from `path`, creating and persisting a new
/// one if the file is missing or unreadable.
pub fn load_or_create_identity(path: &str) -> Result<IdentityKeypair> {
    if let Ok(encoded) = fs::read_to_string(path) {
        if let Ok(secret) = decode_key(&encoded) {
            return Ok(IdentityKeypair::from_secret_bytes(secret));
        }
    }

    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).map_err(|e| ChorusError::Runtime(e.to_string()))?;
    }
    let identity = IdentityKeypair::generate();
    fs::write(path, encode_key(&identity.secret_bytes()))
        .map_err(|e| ChorusError::Runtime(e.to_string()))?;
    Ok(identity)
}
