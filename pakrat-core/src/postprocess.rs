//! Per-block-type post-processing.
//!
//! A processor either fully handles the write (possibly renaming the
//! destination), declines, or fails; the dispatcher matches on the outcome
//! and falls back to a raw write for anything but `Handled`.

use crate::blocktype::BlockType;
use crate::report::Reporter;
use crate::script::ScriptDecryptor;
use crate::spark;
use crate::usm;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

pub enum PostOutcome {
    /// The processor wrote everything itself; skip the raw write.
    Handled,
    /// The processor declined; write the payload verbatim.
    Raw,
    /// The processor blew up; write the payload verbatim and note the error.
    Failed(anyhow::Error),
}

pub trait PostProcessor {
    /// `dest` is the path the raw payload would be written to.
    fn process(&self, payload: &[u8], dest: &Path, rep: &dyn Reporter) -> PostOutcome;
}

/// Registry mapping block types to their processors. Built once at
/// construction; lookups during a dispatch are read-only.
pub struct Pipeline {
    processors: HashMap<BlockType, Box<dyn PostProcessor>>,
}

impl Pipeline {
    pub fn empty() -> Self {
        Self { processors: HashMap::new() }
    }

    /// The standard registration set: tables to JSON, video through the USM
    /// demuxer, Lua through script recovery.
    pub fn standard() -> Self {
        let mut p = Self::empty();
        p.register(BlockType::Table, Box::new(TableToJson));
        p.register(BlockType::Video, Box::new(VideoDemux));
        p.register(BlockType::Lua, Box::new(LuaRecover::new()));
        p
    }

    pub fn register(&mut self, block_type: BlockType, proc_: Box<dyn PostProcessor>) {
        self.processors.insert(block_type, proc_);
    }

    pub fn process(
        &self,
        block_type: BlockType,
        payload: &[u8],
        dest: &Path,
        rep: &dyn Reporter,
    ) -> PostOutcome {
        match self.processors.get(&block_type) {
            Some(p) => p.process(payload, dest, rep),
            None => PostOutcome::Raw,
        }
    }
}

/// SparkBuffer table payloads become pretty-printed JSON, `.bytes` -> `.json`.
pub struct TableToJson;

impl PostProcessor for TableToJson {
    fn process(&self, payload: &[u8], dest: &Path, _rep: &dyn Reporter) -> PostOutcome {
        let json = match spark::decode_to_json(payload) {
            Ok(v) => v,
            Err(e) => return PostOutcome::Failed(e),
        };
        let out = dest.with_extension("json");
        match write_with_parents(&out, json.as_bytes()) {
            Ok(()) => PostOutcome::Handled,
            Err(e) => PostOutcome::Failed(e),
        }
    }
}

/// USM containers fan out into per-stream video/audio files beside the
/// original base name.
pub struct VideoDemux;

impl PostProcessor for VideoDemux {
    fn process(&self, payload: &[u8], dest: &Path, rep: &dyn Reporter) -> PostOutcome {
        let streams = match usm::demux(payload) {
            Ok(s) => s,
            Err(e) => return PostOutcome::Failed(e),
        };
        if streams.is_empty() {
            return PostOutcome::Raw;
        }
        let mut used: std::collections::HashSet<std::path::PathBuf> = Default::default();
        for s in &streams {
            let mut out = dest.with_extension(s.ext);
            let stem = dest
                .file_stem()
                .map(|os| os.to_string_lossy().into_owned())
                .unwrap_or_else(|| "stream".to_string());
            let mut n = 1usize;
            while used.contains(&out) {
                out = dest.with_file_name(format!("{}_{}.{}", stem, n, s.ext));
                n += 1;
            }
            used.insert(out.clone());
            if let Err(e) = write_with_parents(&out, &s.data) {
                return PostOutcome::Failed(e);
            }
            rep.verbose(&format!("  demuxed {} bytes -> {:?}", s.data.len(), out));
        }
        PostOutcome::Handled
    }
}

/// Encrypted Lua blobs are recovered and renamed to `.lua`; payloads that do
/// not decode to Lua are left for the raw write.
pub struct LuaRecover {
    decryptor: ScriptDecryptor,
}

impl LuaRecover {
    pub fn new() -> Self {
        Self { decryptor: ScriptDecryptor::with_builtin_key() }
    }
}

impl Default for LuaRecover {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcessor for LuaRecover {
    fn process(&self, payload: &[u8], dest: &Path, _rep: &dyn Reporter) -> PostOutcome {
        match self.decryptor.decrypt(payload) {
            Ok(Some(script)) => {
                let out = dest.with_extension("lua");
                match write_with_parents(&out, &script) {
                    Ok(()) => PostOutcome::Handled,
                    Err(e) => PostOutcome::Failed(e),
                }
            }
            // Not a Lua payload: keep the original bytes.
            Ok(None) => PostOutcome::Raw,
            Err(e) => PostOutcome::Failed(e),
        }
    }
}

pub(crate) fn write_with_parents(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
