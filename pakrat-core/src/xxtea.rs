//! XXTEA (corrected block TEA) over 32-bit little-endian words.
//!
//! Only script blobs go through this path; the key is the recovered master
//! key padded or truncated to 16 bytes.

const DELTA: u32 = 0x9E37_79B9;

pub const KEY_WORDS: usize = 4;

/// Pack a byte key into the four u32 words XXTEA wants, padding with zeros
/// past the end and ignoring anything beyond 16 bytes.
pub fn key_words(key: &[u8]) -> [u32; KEY_WORDS] {
    let mut padded = [0u8; 16];
    let n = key.len().min(16);
    padded[..n].copy_from_slice(&key[..n]);
    let mut out = [0u32; KEY_WORDS];
    for i in 0..KEY_WORDS {
        out[i] = u32::from_le_bytes(padded[i * 4..i * 4 + 4].try_into().unwrap());
    }
    out
}

#[inline]
fn mx(sum: u32, y: u32, z: u32, p: usize, e: u32, key: &[u32; KEY_WORDS]) -> u32 {
    (((z >> 5) ^ (y << 2)).wrapping_add((y >> 3) ^ (z << 4)))
        ^ ((sum ^ y).wrapping_add(key[(p & 3) ^ e as usize] ^ z))
}

/// Encrypt `v` in place. No-op for fewer than two words.
pub fn encrypt_words(v: &mut [u32], key: &[u32; KEY_WORDS]) {
    let n = v.len();
    if n < 2 {
        return;
    }
    let rounds = 6 + 52 / n;
    let mut sum = 0u32;
    let mut z = v[n - 1];
    for _ in 0..rounds {
        sum = sum.wrapping_add(DELTA);
        let e = (sum >> 2) & 3;
        for p in 0..n {
            let y = v[(p + 1) % n];
            v[p] = v[p].wrapping_add(mx(sum, y, z, p, e, key));
            z = v[p];
        }
    }
}

/// Decrypt `v` in place. No-op for fewer than two words.
pub fn decrypt_words(v: &mut [u32], key: &[u32; KEY_WORDS]) {
    let n = v.len();
    if n < 2 {
        return;
    }
    let rounds = 6 + 52 / n;
    let mut sum = (rounds as u32).wrapping_mul(DELTA);
    let mut y = v[0];
    while sum != 0 {
        let e = (sum >> 2) & 3;
        for p in (0..n).rev() {
            let z = v[(p + n - 1) % n];
            v[p] = v[p].wrapping_sub(mx(sum, y, z, p, e, key));
            y = v[p];
        }
        sum = sum.wrapping_sub(DELTA);
    }
}

/// Decrypt a byte buffer whose length is a multiple of 4 and at least 8.
/// Returns `None` for buffers XXTEA cannot address.
pub fn decrypt_bytes(data: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 8 || data.len() % 4 != 0 {
        return None;
    }
    let kw = key_words(key);
    let mut words: Vec<u32> = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    decrypt_words(&mut words, &kw);
    let mut out = Vec::with_capacity(data.len());
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    Some(out)
}

/// Encrypt a byte buffer; same length constraints as [`decrypt_bytes`].
/// Kept public for fixture construction in tests.
pub fn encrypt_bytes(data: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 8 || data.len() % 4 != 0 {
        return None;
    }
    let kw = key_words(key);
    let mut words: Vec<u32> = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    encrypt_words(&mut words, &kw);
    let mut out = Vec::with_capacity(data.len());
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    Some(out)
}
