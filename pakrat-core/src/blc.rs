//! BLC block-index codec.
//!
//! A `.blc` file is ChaCha20-encrypted past a 12-byte nonce prefix. After the
//! in-place decrypt the index is parsed from offset 0: the protocol version
//! sits in the (plain) nonce bytes and the 12 reserved bytes straddle the
//! nonce/ciphertext boundary, which is how the original packer laid it out.

use crate::chacha;
use crate::error::ExtractError;
use crate::wire::Reader;
use anyhow::{Context, Result};
use std::path::Path;

/// One file entry inside a chunk.
#[derive(Clone, Debug)]
pub struct FileInfo {
    pub file_name: String,
    pub file_name_hash: u64,
    pub file_chunk_md5_name: [u8; 16],
    pub file_data_md5: [u8; 16],
    pub offset: u64,
    pub len: u64,
    pub block_type: u8,
    pub use_encrypt: bool,
    /// Present only when `use_encrypt` is set.
    pub iv_seed: u64,
}

/// One content-addressed chunk.
#[derive(Clone, Debug)]
pub struct ChunkInfo {
    pub md5_name: [u8; 16],
    pub content_md5: [u8; 16],
    pub length: u64,
    pub block_type: u8,
    pub files: Vec<FileInfo>,
}

impl ChunkInfo {
    /// On-disk chunk file name: the identifier bytes hexed in stored
    /// (little-endian) order, plus the `.chk` extension.
    pub fn chunk_file_name(&self) -> String {
        format!("{}.chk", hex::encode(self.md5_name))
    }
}

/// Decrypted, parsed block index.
#[derive(Clone, Debug)]
pub struct BlockIndex {
    pub version: u32,
    /// Unspecified metadata after the version field. Possibly a CRC; recorded
    /// but never enforced.
    pub reserved: [u8; 12],
    pub group_cfg_name: String,
    /// Uppercase hex of the first 4 hash-name bytes (LE). Must match the
    /// containing directory name.
    pub group_cfg_hash_name: String,
    pub group_file_info_num: u32,
    pub group_chunks_length: u64,
    pub block_type: u8,
    pub chunks: Vec<ChunkInfo>,
    /// The 12-byte nonce prefix, kept for per-file nonce construction.
    pub nonce: [u8; 12],
}

impl BlockIndex {
    pub fn file_count(&self) -> usize {
        self.chunks.iter().map(|c| c.files.len()).sum()
    }
}

/// Read and decrypt a `.blc` file, parse it, and check it against the file's
/// basename. A basename mismatch is `CorruptOrWrongKey`: either the bytes are
/// damaged or the key is not the one this build shipped with.
pub fn load(path: &Path, key: &[u8; chacha::KEY_LEN]) -> Result<BlockIndex> {
    if !path.is_file() {
        return Err(ExtractError::NotFound(path.to_path_buf()).into());
    }
    let mut data = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
    if data.len() < chacha::NONCE_LEN {
        return Err(ExtractError::TruncatedInput(format!(
            "{:?}: {} bytes is shorter than the nonce prefix",
            path,
            data.len()
        ))
        .into());
    }
    let mut nonce = [0u8; chacha::NONCE_LEN];
    nonce.copy_from_slice(&data[..chacha::NONCE_LEN]);
    {
        let (_, body) = data.split_at_mut(chacha::NONCE_LEN);
        chacha::apply_keystream(key, &nonce, body);
    }

    let index = parse(&data, nonce).with_context(|| format!("parse index {:?}", path))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ExtractError::NotFound(path.to_path_buf()))?;
    if !index.group_cfg_hash_name.eq_ignore_ascii_case(stem) {
        return Err(ExtractError::CorruptOrWrongKey(format!(
            "index hash {} does not match directory {}",
            index.group_cfg_hash_name, stem
        ))
        .into());
    }
    Ok(index)
}

/// Parse an already-decrypted index buffer. Exposed separately so tests can
/// exercise the layout without touching the filesystem.
pub fn parse(data: &[u8], nonce: [u8; 12]) -> Result<BlockIndex> {
    let mut r = Reader::new(data);
    let version = r.u32_le("version")?;
    let mut reserved = [0u8; 12];
    reserved.copy_from_slice(r.bytes(12, "reserved")?);
    let group_cfg_name = r.lp_utf8("groupCfgName")?;
    let hash_raw = r.bytes(8, "groupCfgHashName")?;
    let hash_word = u32::from_le_bytes(hash_raw[..4].try_into().unwrap());
    let group_cfg_hash_name = format!("{:08X}", hash_word);
    let group_file_info_num = r.u32_le("groupFileInfoNum")?;
    let group_chunks_length = r.u64_le("groupChunksLength")?;
    let block_type = r.u8("blockType")?;
    let chunk_count = r.u32_le("chunkCount")?;

    let mut chunks = Vec::with_capacity(chunk_count.min(0x10000) as usize);
    for ci in 0..chunk_count {
        let chunk = parse_chunk(&mut r)
            .with_context(|| format!("chunk {} of {}", ci, chunk_count))?;
        chunks.push(chunk);
    }

    let index = BlockIndex {
        version,
        reserved,
        group_cfg_name,
        group_cfg_hash_name,
        group_file_info_num,
        group_chunks_length,
        block_type,
        chunks,
        nonce,
    };
    check_invariants(&index)?;
    Ok(index)
}

fn parse_chunk(r: &mut Reader<'_>) -> Result<ChunkInfo> {
    let md5_name = r.array16("chunk md5Name")?;
    let content_md5 = r.array16("chunk contentMD5")?;
    let length = r.u64_le("chunk length")?;
    let block_type = r.u8("chunk blockType")?;
    let file_count = r.u32_le("chunk fileCount")?;
    let mut files = Vec::with_capacity(file_count.min(0x10000) as usize);
    for fi in 0..file_count {
        let file = parse_file(r).with_context(|| format!("file {} of {}", fi, file_count))?;
        files.push(file);
    }
    Ok(ChunkInfo { md5_name, content_md5, length, block_type, files })
}

fn parse_file(r: &mut Reader<'_>) -> Result<FileInfo> {
    let file_name = r.lp_utf8("fileName")?;
    let file_name_hash = r.u64_le("fileNameHash")?;
    let file_chunk_md5_name = r.array16("fileChunkMD5Name")?;
    let file_data_md5 = r.array16("fileDataMD5")?;
    let offset = r.u64_le("file offset")?;
    let len = r.u64_le("file len")?;
    let block_type = r.u8("file blockType")?;
    let use_encrypt = r.u8("bUseEncrypt")? != 0;
    let iv_seed = if use_encrypt { r.u64_le("ivSeed")? } else { 0 };
    Ok(FileInfo {
        file_name,
        file_name_hash,
        file_chunk_md5_name,
        file_data_md5,
        offset,
        len,
        block_type,
        use_encrypt,
        iv_seed,
    })
}

fn check_invariants(index: &BlockIndex) -> Result<()> {
    let mut total: u64 = 0;
    for chunk in &index.chunks {
        total = total.wrapping_add(chunk.length);
        for file in &chunk.files {
            if file.file_chunk_md5_name != chunk.md5_name {
                return Err(ExtractError::CorruptOrWrongKey(format!(
                    "file {:?} references chunk {} but lives in {}",
                    file.file_name,
                    hex::encode(file.file_chunk_md5_name),
                    hex::encode(chunk.md5_name)
                ))
                .into());
            }
            let end = file.offset.checked_add(file.len);
            if end.is_none() || end.unwrap() > chunk.length {
                return Err(ExtractError::CorruptOrWrongKey(format!(
                    "file {:?} spans {}..{:?} past chunk length {}",
                    file.file_name, file.offset, end, chunk.length
                ))
                .into());
            }
        }
    }
    if total != index.group_chunks_length {
        return Err(ExtractError::CorruptOrWrongKey(format!(
            "chunk lengths sum to {} but the index claims {}",
            total, index.group_chunks_length
        ))
        .into());
    }
    Ok(())
}
