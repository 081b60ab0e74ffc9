//! Wwise sound-bank (BNK) index reader.
//!
//! Only `DIDX` (the embedded-WEM index) and `DATA` (the payload base) matter;
//! `BKHD`, `HIRC`, `ENVS`, `STMG`, `PLAT` and anything else are walked past
//! by their section size without being consumed.

use crate::error::ExtractError;
use crate::wire::Reader;
use anyhow::Result;

/// One embedded WEM, with its offset already rebased onto the whole bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BnkEntry {
    pub id: u32,
    /// Absolute byte offset within the bank buffer.
    pub offset: u64,
    pub size: u32,
}

const DIDX_ENTRY_LEN: u32 = 12;

/// Scan a bank and return its embedded-WEM entries.
pub fn parse(data: &[u8]) -> Result<Vec<BnkEntry>> {
    let mut r = Reader::new(data);
    let mut raw: Vec<(u32, u32, u32)> = Vec::new();
    let mut data_base: Option<u64> = None;

    while r.remaining() >= 8 {
        let sig: [u8; 4] = r.bytes(4, "section signature")?.try_into().unwrap();
        let size = r.u32_le("section size")?;
        let section_start = r.pos();
        match &sig {
            b"DIDX" => {
                for _ in 0..size / DIDX_ENTRY_LEN {
                    let id = r.u32_le("DIDX id")?;
                    let rel = r.u32_le("DIDX offset")?;
                    let len = r.u32_le("DIDX size")?;
                    raw.push((id, rel, len));
                }
            }
            b"DATA" => {
                data_base = Some(section_start);
            }
            _ => {}
        }
        r.seek(section_start + size as u64);
    }

    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let base = data_base.ok_or_else(|| {
        ExtractError::CorruptOrWrongKey("bank has DIDX but no DATA section".into())
    })?;
    Ok(raw
        .into_iter()
        .map(|(id, rel, size)| BnkEntry { id, offset: base + rel as u64, size })
        .collect())
}
