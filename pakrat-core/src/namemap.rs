//! ESFM name catalogue: numeric Wwise identifiers to human-readable paths.
//!
//! The catalogue is six sectors addressed by 24-bit big-endian descriptors.
//! Regular keys pack a language index and a file-record offset into three
//! bytes; file records chain through word records into the string sector.
//! Music keys carry literal names under one root folder and win over regular
//! keys on lookup.

use crate::error::ExtractError;
use crate::wire::Reader;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

const MAGIC: &[u8; 4] = b"ESFM";
const VERSION_BYTES: [u8; 2] = [0x33, 0x30];
const KEY_RECORD_LEN: usize = 7;

#[derive(Clone, Copy, Debug)]
struct PackedKey {
    language: u8,
    file_offset: u32,
}

pub struct NameMap {
    pub game_name: String,
    pub languages: Vec<String>,
    keys: HashMap<u64, PackedKey>,
    music: HashMap<u64, String>,
    music_root: String,
    strings: Vec<u8>,
    words: Vec<u8>,
    files: Vec<u8>,
}

#[derive(Clone, Copy)]
struct Sector {
    offset: u32,
    size: u32,
}

impl NameMap {
    pub fn load(path: &Path) -> Result<NameMap> {
        if !path.is_file() {
            return Err(ExtractError::NotFound(path.to_path_buf()).into());
        }
        let data = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
        parse(&data).with_context(|| format!("parse name map {:?}", path))
    }

    /// Resolve an identifier to `language \ path` segments (music names live
    /// under their root folder instead of a language). `None` when unmapped.
    pub fn resolve(&self, id: u64) -> Option<Vec<String>> {
        if let Some(name) = self.music.get(&id) {
            return Some(vec![self.music_root.clone(), name.clone()]);
        }
        let key = self.keys.get(&id)?;
        let language = self.languages.get(key.language as usize)?.clone();
        let mut segments = vec![language];
        segments.extend(self.file_record(key.file_offset).ok()?);
        Some(segments)
    }

    /// Decode one file record: a list of words, each a path segment.
    fn file_record(&self, offset: u32) -> Result<Vec<String>> {
        let mut r = Reader::new(&self.files);
        r.seek(offset as u64);
        let part_count = r.u8("file partCount")?;
        let mut segments = Vec::with_capacity(part_count as usize);
        for _ in 0..part_count {
            let word_off = r.u24_be("word offset")?;
            segments.push(self.word(word_off)?);
        }
        Ok(segments)
    }

    /// One word: its string pieces joined by `_`.
    fn word(&self, offset: u32) -> Result<String> {
        let mut r = Reader::new(&self.words);
        r.seek(offset as u64);
        let piece_count = r.u8("wordPartCount")?;
        let mut pieces = Vec::with_capacity(piece_count as usize);
        for _ in 0..piece_count {
            let string_off = r.u16_be("string offset")?;
            pieces.push(self.string_record(string_off as u32)?);
        }
        Ok(pieces.join("_"))
    }

    /// A string record is UTF-8 text, or a packed big-endian numeric when the
    /// lead byte exceeds 128.
    fn string_record(&self, offset: u32) -> Result<String> {
        let mut r = Reader::new(&self.strings);
        r.seek(offset as u64);
        let lead = r.u8("string lead byte")?;
        if lead > 128 {
            let n = (lead - 128) as usize;
            let raw = r.bytes(n, "packed numeric")?;
            let mut value: u64 = 0;
            for &b in raw {
                value = (value << 8) | b as u64;
            }
            Ok(value.to_string())
        } else {
            let raw = r.bytes(lead as usize, "string bytes")?;
            String::from_utf8(raw.to_vec()).map_err(|_| {
                ExtractError::CorruptOrWrongKey("string sector holds invalid UTF-8".into()).into()
            })
        }
    }
}

pub fn parse(data: &[u8]) -> Result<NameMap> {
    let mut r = Reader::new(data);
    let magic = r.bytes(4, "magic")?;
    if magic != MAGIC {
        return Err(ExtractError::CorruptOrWrongKey("missing ESFM magic".into()).into());
    }
    r.bytes(2, "reserved")?;
    let version = r.bytes(2, "version")?;
    if version != VERSION_BYTES {
        return Err(ExtractError::CorruptOrWrongKey(format!(
            "unsupported catalogue version {:02X}{:02X}",
            version[0], version[1]
        ))
        .into());
    }
    r.bytes(2, "reserved")?;
    let game_name = r.lp8_utf8("game name")?;
    let _version_byte = r.u8("post-name version")?; // opaque

    let mut sectors = [Sector { offset: 0, size: 0 }; 6];
    for s in sectors.iter_mut() {
        s.offset = r.u24_be("sector offset")?;
        s.size = r.u24_be("sector size")?;
    }
    let [languages_sec, strings_sec, words_sec, files_sec, keys_sec, music_sec] = sectors;

    let languages = {
        let mut lr = Reader::new(sector_slice(data, languages_sec, "languages")?);
        let count = lr.u8("language count")?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(lr.lp8_utf8("language name")?);
        }
        names
    };

    let strings = sector_slice(data, strings_sec, "strings")?.to_vec();
    let words = sector_slice(data, words_sec, "words")?.to_vec();
    let files = sector_slice(data, files_sec, "files")?.to_vec();

    let keys_raw = sector_slice(data, keys_sec, "keys")?;
    let mut keys = HashMap::new();
    for rec in keys_raw.chunks_exact(KEY_RECORD_LEN) {
        let packed = ((rec[0] as u32) << 16) | ((rec[1] as u32) << 8) | rec[2] as u32;
        let language = (packed >> 22) as u8;
        let file_offset = packed & 0x3F_FFFF;
        if language as usize >= languages.len() {
            return Err(ExtractError::CorruptOrWrongKey(format!(
                "key language index {} out of range",
                language
            ))
            .into());
        }
        if file_offset as usize >= files.len() {
            return Err(ExtractError::CorruptOrWrongKey(format!(
                "key file offset {} outside file sector",
                file_offset
            ))
            .into());
        }
        let id = u32::from_be_bytes(rec[3..7].try_into().unwrap()) as u64;
        keys.insert(id, PackedKey { language, file_offset });
    }

    let (music_root, music) = {
        let raw = sector_slice(data, music_sec, "music")?;
        let mut mr = Reader::new(raw);
        let mut map = HashMap::new();
        let root = if raw.is_empty() { String::new() } else { mr.lp8_utf8("music root")? };
        while mr.remaining() > 4 {
            let id = mr.u32_be("music id")? as u64;
            let name = mr.lp8_utf8("music name")?;
            map.insert(id, name);
        }
        (root, map)
    };

    Ok(NameMap { game_name, languages, keys, music, music_root, strings, words, files })
}

fn sector_slice<'a>(data: &'a [u8], s: Sector, what: &str) -> Result<&'a [u8]> {
    let start = s.offset as usize;
    let end = start + s.size as usize;
    if end > data.len() || start > end {
        return Err(ExtractError::TruncatedInput(format!(
            "{} sector {}..{} outside {} bytes",
            what,
            start,
            end,
            data.len()
        ))
        .into());
    }
    Ok(&data[start..end])
}
