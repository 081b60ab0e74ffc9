//! Wwise PCK (AKPK) package codec and extractor.
//!
//! Plain packages announce themselves with the `AKPK` magic; obfuscated ones
//! carry a masked header that [`crate::mask`] undoes with the header size as
//! the seed. File bodies in obfuscated packages are masked per entry with the
//! low half of the file id.

use crate::audio::{self, DecodeJob, WemDecoder};
use crate::bnk;
use crate::error::ExtractError;
use crate::mask;
use crate::namemap::NameMap;
use crate::postprocess::write_with_parents;
use crate::report::Reporter;
use crate::wire::Reader;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub const AKPK_MAGIC: u32 = u32::from_le_bytes(*b"AKPK");

/// Header overhead in the content region: endianness flag + three sector-size
/// words (+ one more when the externals sector is present).
const BASE_OVERHEAD: usize = 16;
const EXT_OVERHEAD: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectorKind {
    Banks,
    Sounds,
    Externals,
}

#[derive(Clone, Debug)]
pub struct LanguageEntry {
    pub id: u32,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct PckEntry {
    pub kind: SectorKind,
    pub file_id: u64,
    pub block_size: u32,
    pub size: u64,
    pub raw_offset: u32,
    pub language_id: u32,
}

impl PckEntry {
    /// Actual byte offset of the file body.
    pub fn data_offset(&self) -> u64 {
        if self.block_size == 0 {
            self.raw_offset as u64
        } else {
            self.raw_offset as u64 * self.block_size as u64
        }
    }
}

#[derive(Debug)]
pub struct PckHeader {
    pub obfuscated: bool,
    pub header_size: u32,
    pub languages: Vec<LanguageEntry>,
    pub banks: Vec<PckEntry>,
    pub sounds: Vec<PckEntry>,
    pub externals: Vec<PckEntry>,
}

impl PckHeader {
    pub fn entries(&self) -> impl Iterator<Item = &PckEntry> {
        self.banks.iter().chain(self.sounds.iter()).chain(self.externals.iter())
    }

    pub fn language_name(&self, id: u32) -> Option<&str> {
        self.languages.iter().find(|l| l.id == id).map(|l| l.name.as_str())
    }
}

/// Read and (if needed) unmask the package header.
pub fn read_header(f: &mut File) -> Result<PckHeader> {
    let mut prefix = [0u8; 8];
    f.read_exact(&mut prefix).context("read PCK magic")?;
    let magic = u32::from_le_bytes(prefix[..4].try_into().unwrap());
    let header_size = u32::from_le_bytes(prefix[4..].try_into().unwrap());

    let mut body = vec![0u8; header_size as usize];
    f.read_exact(&mut body).context("read PCK header content")?;

    let obfuscated = magic != AKPK_MAGIC;
    if obfuscated {
        if body.len() < 4 {
            return Err(ExtractError::TruncatedInput("obfuscated header under 4 bytes".into()).into());
        }
        // The leading word is the obfuscation flag; the tail is the masked
        // plain content (endianness flag + sectors), seeded by the header size.
        body.drain(..4);
        mask::apply(&mut body, header_size, 0);
    }

    let mut header = parse_content(&body)?;
    header.obfuscated = obfuscated;
    header.header_size = header_size;
    Ok(header)
}

fn parse_content(body: &[u8]) -> Result<PckHeader> {
    let mut r = Reader::new(body);
    let flag = r.u32_le("endianness flag")?;
    if flag != 1 {
        return Err(ExtractError::UnsupportedEndianness(flag).into());
    }
    let lang_size = r.u32_le("language sector size")? as usize;
    let bnk_size = r.u32_le("bank sector size")? as usize;
    let snd_size = r.u32_le("sound sector size")? as usize;

    let known = BASE_OVERHEAD + lang_size + bnk_size + snd_size;
    let ext_size = if body.len() > known {
        let s = r.u32_le("externals sector size")? as usize;
        if EXT_OVERHEAD + lang_size + bnk_size + snd_size + s != body.len() {
            return Err(ExtractError::CorruptOrWrongKey(format!(
                "sector sizes sum to {} but header content is {} bytes",
                EXT_OVERHEAD + lang_size + bnk_size + snd_size + s,
                body.len()
            ))
            .into());
        }
        Some(s)
    } else {
        if known != body.len() {
            return Err(ExtractError::CorruptOrWrongKey(format!(
                "sector sizes sum to {} but header content is {} bytes",
                known,
                body.len()
            ))
            .into());
        }
        None
    };

    let take = |r: &mut Reader<'_>, n: usize, what: &str| -> Result<Vec<u8>> {
        Ok(r.bytes(n, what)?.to_vec())
    };
    let lang_raw = take(&mut r, lang_size, "language sector")?;
    let bnk_raw = take(&mut r, bnk_size, "bank sector")?;
    let snd_raw = take(&mut r, snd_size, "sound sector")?;
    let ext_raw = match ext_size {
        Some(n) => take(&mut r, n, "externals sector")?,
        None => Vec::new(),
    };

    Ok(PckHeader {
        obfuscated: false,
        header_size: 0,
        languages: parse_language_sector(&lang_raw)?,
        banks: parse_file_sector(&bnk_raw, SectorKind::Banks)?,
        sounds: parse_file_sector(&snd_raw, SectorKind::Sounds)?,
        externals: parse_file_sector(&ext_raw, SectorKind::Externals)?,
    })
}

fn parse_language_sector(sector: &[u8]) -> Result<Vec<LanguageEntry>> {
    if sector.is_empty() {
        return Ok(Vec::new());
    }
    let mut r = Reader::new(sector);
    let count = r.u32_le("language count")?;
    let mut out = Vec::with_capacity(count.min(0x1000) as usize);
    for _ in 0..count {
        let name_offset = r.u32_le("language name offset")? as usize;
        let id = r.u32_le("language id")?;
        out.push(LanguageEntry { id, name: read_language_name(sector, name_offset)? });
    }
    Ok(out)
}

/// Names are NUL-terminated, UTF-8 or UTF-16LE; a zero byte inside the first
/// two bytes marks the wide encoding.
fn read_language_name(sector: &[u8], offset: usize) -> Result<String> {
    if offset + 2 > sector.len() {
        return Err(ExtractError::TruncatedInput(format!(
            "language name offset {} outside sector",
            offset
        ))
        .into());
    }
    let wide = sector[offset] == 0 || sector[offset + 1] == 0;
    if wide {
        let mut units = Vec::new();
        let mut p = offset;
        while p + 2 <= sector.len() {
            let u = u16::from_le_bytes([sector[p], sector[p + 1]]);
            if u == 0 {
                break;
            }
            units.push(u);
            p += 2;
        }
        Ok(String::from_utf16_lossy(&units))
    } else {
        let end = sector[offset..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| offset + p)
            .unwrap_or(sector.len());
        Ok(String::from_utf8_lossy(&sector[offset..end]).into_owned())
    }
}

fn parse_file_sector(sector: &[u8], kind: SectorKind) -> Result<Vec<PckEntry>> {
    if sector.is_empty() {
        return Ok(Vec::new());
    }
    let mut r = Reader::new(sector);
    let count = r.u32_le("file count")?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let entry_size = (sector.len() - 4) / count as usize;
    if entry_size != 20 && entry_size != 24 {
        return Err(ExtractError::CorruptOrWrongKey(format!(
            "{:?} sector: {} bytes over {} entries gives unsupported entry size {}",
            kind,
            sector.len() - 4,
            count,
            entry_size
        ))
        .into());
    }
    let alt = entry_size >= 24;

    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let file_id = if alt && kind == SectorKind::Externals {
            // 64-bit id stored low half first.
            let lo = r.u32_le("file id low")? as u64;
            let hi = r.u32_le("file id high")? as u64;
            (hi << 32) | lo
        } else {
            r.u32_le("file id")? as u64
        };
        let block_size = r.u32_le("block size")?;
        let size = if alt && kind != SectorKind::Externals {
            r.i64_le("file size")? as u64
        } else {
            r.u32_le("file size")? as u64
        };
        let raw_offset = r.u32_le("raw offset")?;
        let language_id = r.u32_le("language id")?;
        out.push(PckEntry { kind, file_id, block_size, size, raw_offset, language_id });
    }
    Ok(out)
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct PckTally {
    pub wems: usize,
    pub banks: usize,
    /// WEMs expanded out of banks.
    pub embedded: usize,
    pub plugins: usize,
    pub unknown: usize,
    pub failed: usize,
    pub decoded: usize,
    /// Decode jobs that fell back to the raw WEM.
    pub fallback: usize,
}

pub struct PckRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    /// Write unrecognized payloads as `<id>.unknown` instead of dropping them.
    pub save_unknown: bool,
}

/// Extract every entry of a package. With a decoder, WEMs are decoded to WAV
/// in a bounded parallel batch at the end; without one they are written raw.
pub fn extract(
    req: &PckRequest<'_>,
    name_map: Option<&NameMap>,
    decoder: Option<&dyn WemDecoder>,
    rep: &dyn Reporter,
) -> Result<PckTally> {
    if !req.input.is_file() {
        return Err(ExtractError::NotFound(req.input.to_path_buf()).into());
    }
    let mut f = File::open(req.input).with_context(|| format!("open {:?}", req.input))?;
    let file_len = f.metadata()?.len();
    let header = read_header(&mut f).with_context(|| format!("header of {:?}", req.input))?;
    rep.info(&format!(
        "{:?}: {} banks, {} sounds, {} externals, {} languages{}",
        req.input,
        header.banks.len(),
        header.sounds.len(),
        header.externals.len(),
        header.languages.len(),
        if header.obfuscated { " (obfuscated)" } else { "" }
    ));

    let mut tally = PckTally::default();
    let mut jobs: Vec<DecodeJob> = Vec::new();
    let entries: Vec<PckEntry> = header.entries().cloned().collect();
    for entry in &entries {
        let offset = entry.data_offset();
        if offset.checked_add(entry.size).map(|end| end > file_len).unwrap_or(true) {
            rep.verbose(&format!(
                "entry {} spans {}..{} past package end {}",
                entry.file_id,
                offset,
                offset.saturating_add(entry.size),
                file_len
            ));
            tally.failed += 1;
            continue;
        }
        let mut buf = vec![0u8; entry.size as usize];
        f.seek(SeekFrom::Start(offset))?;
        if let Err(e) = f.read_exact(&mut buf) {
            rep.verbose(&format!("entry {}: read failed: {}", entry.file_id, e));
            tally.failed += 1;
            continue;
        }
        if header.obfuscated {
            mask::apply(&mut buf, entry.file_id as u32, 0);
        }
        if let Err(e) = dispatch_entry(req, &header, entry, buf, name_map, decoder.is_some(), &mut jobs, &mut tally, rep) {
            rep.verbose(&format!("entry {}: {:#}", entry.file_id, e));
            tally.failed += 1;
        }
    }

    if let Some(dec) = decoder {
        let decode = audio::decode_all(dec, jobs, req.output, rep)?;
        tally.decoded = decode.decoded;
        tally.fallback = decode.fallback;
    }
    Ok(tally)
}

#[allow(clippy::too_many_arguments)]
fn dispatch_entry(
    req: &PckRequest<'_>,
    header: &PckHeader,
    entry: &PckEntry,
    buf: Vec<u8>,
    name_map: Option<&NameMap>,
    decoding: bool,
    jobs: &mut Vec<DecodeJob>,
    tally: &mut PckTally,
    rep: &dyn Reporter,
) -> Result<()> {
    let magic: [u8; 4] = buf.get(..4).and_then(|m| m.try_into().ok()).unwrap_or([0; 4]);
    match &magic {
        b"RIFF" | b"RIFX" => {
            let base = entry_base_path(req.output, header, entry, name_map);
            if decoding {
                jobs.push(DecodeJob {
                    wem: buf,
                    wav_dest: base.with_extension("wav"),
                    wem_dest: base.with_extension("wem"),
                });
            } else {
                write_with_parents(&base.with_extension("wem"), &buf)?;
            }
            tally.wems += 1;
        }
        b"BKHD" => {
            let base = entry_base_path(req.output, header, entry, name_map);
            write_with_parents(&base.with_extension("bnk"), &buf)?;
            tally.banks += 1;
            for wem in bnk::parse(&buf).context("bank index")? {
                let end = wem.offset + wem.size as u64;
                if end > buf.len() as u64 {
                    rep.verbose(&format!(
                        "bank {}: embedded wem {} spans past bank end",
                        entry.file_id, wem.id
                    ));
                    tally.failed += 1;
                    continue;
                }
                let body = buf[wem.offset as usize..end as usize].to_vec();
                let base = embedded_base_path(req.output, entry.file_id, wem.id, name_map);
                if decoding {
                    jobs.push(DecodeJob {
                        wem: body,
                        wav_dest: base.with_extension("wav"),
                        wem_dest: base.with_extension("wem"),
                    });
                } else {
                    write_with_parents(&base.with_extension("wem"), &body)?;
                }
                tally.embedded += 1;
            }
        }
        b"PLUG" => {
            let base = entry_base_path(req.output, header, entry, name_map);
            write_with_parents(&base.with_extension("plg"), &buf)?;
            tally.plugins += 1;
        }
        _ => {
            if req.save_unknown {
                let base = entry_base_path(req.output, header, entry, name_map);
                write_with_parents(&base.with_extension("unknown"), &buf)?;
            }
            tally.unknown += 1;
        }
    }
    Ok(())
}

/// Destination without extension. Mapped ids take their catalogue path;
/// unmapped ones land under `unmapped/`, inside a language directory when the
/// entry carries one.
fn entry_base_path(
    out: &Path,
    header: &PckHeader,
    entry: &PckEntry,
    name_map: Option<&NameMap>,
) -> PathBuf {
    if let Some(segments) = name_map.and_then(|m| m.resolve(entry.file_id)) {
        let mut p = out.to_path_buf();
        for s in segments {
            p.push(s);
        }
        return p;
    }
    let mut p = out.to_path_buf();
    if entry.language_id != 0 {
        if let Some(lang) = header.language_name(entry.language_id) {
            p.push(lang);
        }
    }
    p.push("unmapped");
    p.push(entry.file_id.to_string());
    p
}

fn embedded_base_path(
    out: &Path,
    bank_id: u64,
    wem_id: u32,
    name_map: Option<&NameMap>,
) -> PathBuf {
    if let Some(segments) = name_map.and_then(|m| m.resolve(wem_id as u64)) {
        let mut p = out.to_path_buf();
        for s in segments {
            p.push(s);
        }
        return p;
    }
    out.join("unmapped").join(format!("{}_{}", bank_id, wem_id))
}
