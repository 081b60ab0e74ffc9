//! Encrypted-script recovery.
//!
//! Script blobs ship base64-encoded and XXTEA-encrypted. The master key is
//! not stored directly: four obfuscated fragments concatenate to a base64
//! string whose decoded bytes, minus a fixed ASCII seed, are the key.

use crate::xxtea;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

const KEY_FRAGMENTS: [&str; 4] = ["w8dqj8eEqm", "Wex31a55to", "l8SLr3+gsn", "th15Fqpg"];
const KEY_SEED: &[u8; 28] = b"kQ3nV8xB1mD6pZ4rT9wY2gJ7cL5f";

const LUA_MAGIC: [u8; 4] = [0x1B, 0x4C, 0x75, 0x61];

/// Unmask the embedded master key.
///
/// Concatenates the four fragments plus the `"=="` padding, base64-decodes,
/// and subtracts the seed position-wise modulo 256.
pub fn derive_master_key() -> Vec<u8> {
    let joined = format!("{}{}{}{}==", KEY_FRAGMENTS[0], KEY_FRAGMENTS[1], KEY_FRAGMENTS[2], KEY_FRAGMENTS[3]);
    let decoded = B64.decode(joined.as_bytes()).expect("embedded key fragments are valid base64");
    decoded
        .iter()
        .zip(KEY_SEED.iter())
        .map(|(d, s)| d.wrapping_sub(*s))
        .collect()
}

pub struct ScriptDecryptor {
    key: Vec<u8>,
}

impl ScriptDecryptor {
    pub fn with_builtin_key() -> Self {
        Self { key: derive_master_key() }
    }

    /// Override for builds whose key shifted.
    pub fn with_key(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Attempt recovery. `Ok(Some(script))` is a Lua payload; `Ok(None)`
    /// means the bytes do not decode to Lua and should be written as-is.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        let text: Vec<u8> =
            payload.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
        let cipher = match B64.decode(&text) {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        let plain = match xxtea::decrypt_bytes(&cipher, &self.key) {
            Some(p) => p,
            None => return Ok(None),
        };
        if looks_like_lua(&plain) {
            Ok(Some(plain))
        } else {
            Ok(None)
        }
    }
}

/// Accept compiled chunks by magic, otherwise require a plausible source
/// prefix: valid UTF-8 carrying a common keyword.
fn looks_like_lua(data: &[u8]) -> bool {
    if data.len() >= 4 && data[..4] == LUA_MAGIC {
        return true;
    }
    let head = &data[..data.len().min(512)];
    let text = match std::str::from_utf8(head) {
        Ok(t) => t,
        // A multibyte sequence may be cut at the window edge; retry on the
        // valid prefix.
        Err(e) if e.valid_up_to() > 0 => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or("")
        }
        Err(_) => return false,
    };
    if text.is_empty() {
        return false;
    }
    const KEYWORDS: [&str; 6] = ["function", "local ", "return", "require", "--", "end"];
    KEYWORDS.iter().any(|k| text.contains(k))
}
