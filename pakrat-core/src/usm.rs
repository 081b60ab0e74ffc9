//! CRI USM container demultiplexer.
//!
//! A USM file is a run of blocks, each an 8-byte header (4-byte signature +
//! big-endian size) followed by the block body. Stream routing keys combine
//! the signature with the `@SFA` stream id so multiple audio tracks stay
//! separate.

use crate::error::ExtractError;
use anyhow::Result;
use std::collections::BTreeMap;

pub const SIG_CRID: &[u8; 4] = b"CRID";
pub const SIG_SFV: &[u8; 4] = b"@SFV";
pub const SIG_SFA: &[u8; 4] = b"@SFA";
pub const SIG_SBT: &[u8; 4] = b"@SBT";
pub const SIG_CUE: &[u8; 4] = b"@CUE";
pub const SIG_ALP: &[u8; 4] = b"@ALP";

const HEADER_END: &[u8] = b"#HEADER END";
const METADATA_END: &[u8] = b"#METADATA END";
const CONTENTS_END: &[u8] = b"#CONTENTS END";
/// Every section marker occupies 32 bytes including its NUL terminator.
const MARKER_LEN: usize = 32;

/// One demultiplexed elementary stream.
pub struct Stream {
    pub signature: [u8; 4],
    pub stream_id: u8,
    /// Output extension without the dot: `m2v`, `adx`, `hca`, `aix` or `bin`.
    pub ext: &'static str,
    pub data: Vec<u8>,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < needle.len() || from > haystack.len() - needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn known_signature(sig: &[u8; 4]) -> bool {
    matches!(sig, x if x == SIG_CRID || x == SIG_SFV || x == SIG_SFA
        || x == SIG_SBT || x == SIG_CUE || x == SIG_ALP)
}

/// Demultiplex a USM buffer into its `@SFV`/`@SFA` streams.
///
/// Other stream kinds are accumulated and discarded; empty streams are
/// dropped. Errors bubble up so the dispatcher can fall back to writing the
/// original container.
pub fn demux(buf: &[u8]) -> Result<Vec<Stream>> {
    let start = find(buf, SIG_CRID, 0).ok_or_else(|| {
        ExtractError::CorruptOrWrongKey("no CRID block in USM payload".into())
    })?;

    // Route every block payload into its per-stream accumulator.
    let mut acc: BTreeMap<u32, ([u8; 4], u8, Vec<u8>)> = BTreeMap::new();
    let mut pos = start;
    while pos + 8 <= buf.len() {
        let mut sig = [0u8; 4];
        sig.copy_from_slice(&buf[pos..pos + 4]);
        if !known_signature(&sig) {
            break;
        }
        let block_size =
            u32::from_be_bytes(buf[pos + 4..pos + 8].try_into().unwrap()) as usize;
        if pos + 8 + block_size > buf.len() {
            return Err(ExtractError::TruncatedInput(format!(
                "USM block at {} claims {} bytes past end",
                pos, block_size
            ))
            .into());
        }
        if block_size >= 4 {
            let header_skip =
                u16::from_be_bytes(buf[pos + 8..pos + 10].try_into().unwrap()) as usize;
            let footer_skip =
                u16::from_be_bytes(buf[pos + 10..pos + 12].try_into().unwrap()) as usize;
            let stream_id = if &sig == SIG_SFA && block_size > 4 { buf[pos + 12] } else { 0 };
            if header_skip + footer_skip <= block_size {
                let data_len = block_size - header_skip - footer_skip;
                let data_start = pos + 8 + header_skip;
                let key = stream_id as u32 | u32::from_le_bytes(sig);
                let entry = acc.entry(key).or_insert_with(|| (sig, stream_id, Vec::new()));
                entry.2.extend_from_slice(&buf[data_start..data_start + data_len]);
            }
        }
        pos += block_size + 8;
    }

    let mut out = Vec::new();
    for (_, (sig, stream_id, bytes)) in acc {
        if &sig != SIG_SFV && &sig != SIG_SFA {
            continue;
        }
        let payload = trim_markers(&bytes);
        if payload.is_empty() {
            continue;
        }
        let ext = if &sig == SIG_SFV { "m2v" } else { audio_ext(payload) };
        out.push(Stream { signature: sig, stream_id, ext, data: payload.to_vec() });
    }
    Ok(out)
}

/// Cut the header/metadata preamble and the contents-end trailer out of an
/// accumulated stream.
fn trim_markers(bytes: &[u8]) -> &[u8] {
    let mut data_start = 0usize;
    if let Some(p) = rfind(bytes, HEADER_END) {
        data_start = data_start.max(p + MARKER_LEN);
    }
    if let Some(p) = rfind(bytes, METADATA_END) {
        data_start = data_start.max(p + MARKER_LEN);
    }
    if data_start > bytes.len() {
        return &[];
    }
    let end = match find(bytes, CONTENTS_END, data_start) {
        Some(p) => p,
        None => bytes.len(),
    };
    &bytes[data_start..end]
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Audio codec by payload magic.
fn audio_ext(payload: &[u8]) -> &'static str {
    if payload.len() >= 4 && &payload[..4] == b"AIXF" {
        "aix"
    } else if !payload.is_empty() && payload[0] == 0x80 {
        "adx"
    } else if payload.len() >= 4 && &payload[..4] == b"HCA\0" {
        "hca"
    } else {
        "bin"
    }
}

const DIR_STREAM_TAG: &[u8] = b"CRIUSF_DIR_STREAM";

/// Recover the original `.usm` file name from a CRID header payload.
///
/// Used when the block index carries an empty name for a video entry. Walks
/// the NUL-terminated string table after the directory-stream tag until a
/// string ends in `.usm`, then strips any drive or root prefix.
pub fn recover_usm_name(buf: &[u8]) -> Option<String> {
    let crid = find(buf, SIG_CRID, 0)?;
    if crid + 8 > buf.len() {
        return None;
    }
    let block_size = u32::from_be_bytes(buf[crid + 4..crid + 8].try_into().unwrap()) as usize;
    let payload_end = (crid + 8 + block_size).min(buf.len());
    let payload = &buf[crid + 8..payload_end];

    let tag = find(payload, DIR_STREAM_TAG, 0)?;
    let mut p = tag + DIR_STREAM_TAG.len() + 1; // tag + its NUL
    while p < payload.len() {
        let end = match payload[p..].iter().position(|&b| b == 0) {
            Some(rel) => p + rel,
            None => payload.len(),
        };
        if end > p {
            if let Ok(s) = std::str::from_utf8(&payload[p..end]) {
                if s.to_ascii_lowercase().ends_with(".usm") {
                    return Some(strip_root(s));
                }
            }
        }
        p = end + 1;
    }
    None
}

/// Drop drive letters and leading separators, normalize to forward slashes.
fn strip_root(s: &str) -> String {
    let mut t = s.replace('\\', "/");
    if t.len() >= 2 && t.as_bytes()[1] == b':' {
        t = t[2..].to_string();
    }
    t.trim_start_matches('/').to_string()
}
