//! VFS extraction dispatcher.
//!
//! Resolves a block type to its directory hash, loads the block index,
//! pulls file payloads out of the chunk files, and routes each payload
//! through the post-processor pipeline before it reaches disk.

use crate::blc::{self, BlockIndex};
use crate::blocktype::BlockType;
use crate::chacha;
use crate::error::ExtractError;
use crate::postprocess::{write_with_parents, Pipeline, PostOutcome};
use crate::report::Reporter;
use crate::usm;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Embedded default key. Known to shift across game builds; every request
/// can override it.
pub const DEFAULT_KEY_B64: &str = "e+zO4Fi8dFkS8hp6z3r/hSacbWEH/YTdh3h5VF0NVJU=";

pub fn default_key() -> [u8; chacha::KEY_LEN] {
    parse_key(DEFAULT_KEY_B64).expect("embedded key constant decodes")
}

/// Decode a caller-supplied base64 key; must decode to exactly 32 bytes.
pub fn parse_key(b64: &str) -> Result<[u8; chacha::KEY_LEN]> {
    let raw = B64.decode(b64.trim().as_bytes()).context("key is not valid base64")?;
    let arr: [u8; chacha::KEY_LEN] = raw
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("key must decode to 32 bytes, got {}", raw.len()))?;
    Ok(arr)
}

pub struct VfsRequest<'a> {
    /// The `VFS` directory holding the per-block hash directories.
    pub vfs_root: &'a Path,
    pub output: &'a Path,
    pub block_type: BlockType,
    pub key: [u8; chacha::KEY_LEN],
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct ExtractTally {
    /// Files fully written by a post-processor.
    pub handled: usize,
    /// Files written verbatim (no processor, processor declined, or fallback).
    pub raw: usize,
    /// Files that produced no output.
    pub failed: usize,
}

impl ExtractTally {
    pub fn written(&self) -> usize {
        self.handled + self.raw
    }
}

/// Extract one block type into the output directory.
///
/// Per-file failures are reported at verbose level and skipped; an index that
/// fails to load or check aborts the dispatch.
pub fn extract_block(
    req: &VfsRequest<'_>,
    pipeline: &Pipeline,
    rep: &dyn Reporter,
) -> Result<ExtractTally> {
    let dir = resolve_block_dir(req.vfs_root, req.block_type)?;
    let index = load_index(&dir, &req.key)?;
    rep.info(&format!(
        "{}: {} chunks, {} files ({} bytes)",
        req.block_type,
        index.chunks.len(),
        index.file_count(),
        index.group_chunks_length
    ));

    let chunk_paths = chunk_path_map(&dir)?;
    let mut tally = ExtractTally::default();
    for chunk in &index.chunks {
        let chunk_name = chunk.chunk_file_name();
        let chunk_path = match chunk_paths.get(&chunk_name) {
            Some(p) => p.clone(),
            None => {
                rep.verbose(&format!("missing chunk {}; skipping {} files", chunk_name, chunk.files.len()));
                tally.failed += chunk.files.len();
                continue;
            }
        };
        let mut f = File::open(&chunk_path).with_context(|| format!("open {:?}", chunk_path))?;
        for file in &chunk.files {
            match extract_one(req, &index, &mut f, file, pipeline, rep) {
                Ok(true) => tally.handled += 1,
                Ok(false) => tally.raw += 1,
                Err(e) => {
                    rep.verbose(&format!("failed {:?}: {:#}", file.file_name, e));
                    tally.failed += 1;
                }
            }
        }
    }
    Ok(tally)
}

fn extract_one(
    req: &VfsRequest<'_>,
    index: &BlockIndex,
    f: &mut File,
    file: &blc::FileInfo,
    pipeline: &Pipeline,
    rep: &dyn Reporter,
) -> Result<bool> {
    f.seek(SeekFrom::Start(file.offset)).context("seek file payload")?;
    let mut payload = vec![0u8; file.len as usize];
    f.read_exact(&mut payload).context("read file payload")?;

    if file.use_encrypt {
        let nonce = per_file_nonce(index.version, file.iv_seed);
        chacha::apply_keystream(&req.key, &nonce, &mut payload);
    }

    let dest = destination(req, file, &payload);
    match pipeline.process(req.block_type, &payload, &dest, rep) {
        PostOutcome::Handled => {
            rep.verbose(&format!("processed {:?}", dest));
            Ok(true)
        }
        PostOutcome::Raw => {
            write_with_parents(&dest, &payload)?;
            rep.verbose(&format!("wrote {:?}", dest));
            Ok(false)
        }
        PostOutcome::Failed(e) => {
            rep.verbose(&format!("post-processor failed on {:?}: {:#}; writing raw", dest, e));
            write_with_parents(&dest, &payload)?;
            Ok(false)
        }
    }
}

/// Nonce for an encrypted file entry: protocol version (LE) then ivSeed (LE).
pub fn per_file_nonce(version: u32, iv_seed: u64) -> [u8; chacha::NONCE_LEN] {
    let mut nonce = [0u8; chacha::NONCE_LEN];
    nonce[..4].copy_from_slice(&version.to_le_bytes());
    nonce[4..].copy_from_slice(&iv_seed.to_le_bytes());
    nonce
}

fn destination(req: &VfsRequest<'_>, file: &blc::FileInfo, payload: &[u8]) -> PathBuf {
    if file.file_name.is_empty() {
        if req.block_type == BlockType::Video {
            if let Some(name) = usm::recover_usm_name(payload) {
                return join_sanitized(req.output, &name);
            }
            return req
                .output
                .join("Video")
                .join(format!("{:016X}.usm", file.file_name_hash));
        }
        return req.output.join(format!("{:016X}.bin", file.file_name_hash));
    }
    join_sanitized(req.output, &file.file_name)
}

/// Join an index-supplied name under the output root, dropping absolute and
/// parent components so the index cannot write outside the tree.
fn join_sanitized(root: &Path, name: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    let normalized = name.replace('\\', "/");
    for part in normalized.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.ends_with(':') {
            continue;
        }
        out.push(part);
    }
    out
}

/// Case-insensitive lookup of a block's hash directory.
pub fn resolve_block_dir(vfs_root: &Path, block_type: BlockType) -> Result<PathBuf> {
    let want = block_type.dir_hash();
    if !vfs_root.is_dir() {
        return Err(ExtractError::NotFound(vfs_root.to_path_buf()).into());
    }
    for ent in std::fs::read_dir(vfs_root)? {
        let ent = ent?;
        if !ent.file_type()?.is_dir() {
            continue;
        }
        let name = ent.file_name();
        if name.to_string_lossy().eq_ignore_ascii_case(want) {
            return Ok(ent.path());
        }
    }
    Err(ExtractError::NotFound(vfs_root.join(want)).into())
}

fn load_index(dir: &Path, key: &[u8; chacha::KEY_LEN]) -> Result<BlockIndex> {
    let base = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    blc::load(&dir.join(format!("{}.blc", base)), key)
}

/// All chunk files in a block directory, keyed by lowercased file name so the
/// index's hex rendering matches regardless of on-disk case.
fn chunk_path_map(dir: &Path) -> Result<HashMap<String, PathBuf>> {
    let mut map = HashMap::new();
    for ent in std::fs::read_dir(dir)? {
        let ent = ent?;
        let name = ent.file_name().to_string_lossy().to_lowercase();
        if name.ends_with(".chk") {
            map.insert(name, ent.path());
        }
    }
    Ok(map)
}

/// One line of the `--debug` enumeration.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlockSummary {
    pub block_type: BlockType,
    pub group_name: String,
    pub version: u32,
    pub chunk_count: usize,
    pub file_count: usize,
    pub total_bytes: u64,
    /// Chunk files whose MD5 digest disagrees with the index.
    pub digest_mismatches: Vec<String>,
    /// Chunk files the index names but the directory lacks.
    pub missing_chunks: Vec<String>,
}

/// Describe every block present under the VFS root without extracting.
/// Verifies each chunk's content digest while it is at hand.
pub fn describe_blocks(
    vfs_root: &Path,
    key: &[u8; chacha::KEY_LEN],
    rep: &dyn Reporter,
) -> Result<Vec<BlockSummary>> {
    let mut out = Vec::new();
    for bt in BlockType::ALL {
        let dir = match resolve_block_dir(vfs_root, bt) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let index = match load_index(&dir, key) {
            Ok(i) => i,
            Err(e) => {
                rep.error(&format!("{}: index unreadable: {:#}", bt, e));
                continue;
            }
        };
        let chunk_paths = chunk_path_map(&dir)?;
        let mut digest_mismatches = Vec::new();
        let mut missing_chunks = Vec::new();
        for chunk in &index.chunks {
            let name = chunk.chunk_file_name();
            match chunk_paths.get(&name) {
                Some(p) => {
                    let data = std::fs::read(p).with_context(|| format!("read {:?}", p))?;
                    let digest: [u8; 16] = Md5::digest(&data).into();
                    if digest != chunk.content_md5 {
                        digest_mismatches.push(name);
                    }
                }
                None => missing_chunks.push(name),
            }
        }
        out.push(BlockSummary {
            block_type: bt,
            group_name: index.group_cfg_name.clone(),
            version: index.version,
            chunk_count: index.chunks.len(),
            file_count: index.file_count(),
            total_bytes: index.group_chunks_length,
            digest_mismatches,
            missing_chunks,
        });
    }
    Ok(out)
}
