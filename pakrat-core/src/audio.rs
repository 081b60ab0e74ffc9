//! External audio decoding capability.
//!
//! The core never links a decoder; callers hand in whatever driver they have
//! (a subprocess wrapper, a native library binding) behind [`WemDecoder`].
//! Decoding is the one concurrent stage: a bounded parallel map over
//! independent jobs, each owning its input bytes and output path.

use crate::postprocess::write_with_parents;
use crate::report::Reporter;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Decodes one WEM file on disk into a WAV at `wav_path`.
///
/// Implementations must be callable from multiple threads at once.
pub trait WemDecoder: Sync {
    fn decode(&self, wem_path: &Path, wav_path: &Path) -> Result<()>;
}

/// A decoder that always declines. Lets raw-mode callers share the decode
/// plumbing, and stands in for the real driver in tests.
pub struct NoDecoder;

impl WemDecoder for NoDecoder {
    fn decode(&self, _wem_path: &Path, _wav_path: &Path) -> Result<()> {
        anyhow::bail!("no audio decoder configured")
    }
}

pub struct DecodeJob {
    pub wem: Vec<u8>,
    /// Target for the decoded WAV.
    pub wav_dest: PathBuf,
    /// Where the original WEM goes if decoding fails.
    pub wem_dest: PathBuf,
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct DecodeTally {
    pub decoded: usize,
    /// Jobs that fell back to writing the WEM untouched.
    pub fallback: usize,
}

/// Decode a batch of WEMs in parallel (rayon's pool is bounded by the logical
/// processor count). Owns a scratch directory under `tmp_root` for the
/// lifetime of the batch and removes it afterwards.
pub fn decode_all(
    decoder: &dyn WemDecoder,
    jobs: Vec<DecodeJob>,
    tmp_root: &Path,
    rep: &dyn Reporter,
) -> Result<DecodeTally> {
    if jobs.is_empty() {
        return Ok(DecodeTally::default());
    }
    let tmp = tmp_root.join(format!(".wem-decode-{}", std::process::id()));
    std::fs::create_dir_all(&tmp).with_context(|| format!("create temp dir {:?}", tmp))?;

    let results: Vec<bool> = jobs
        .par_iter()
        .enumerate()
        .map(|(i, job)| {
            let wem_path = tmp.join(format!("{}.wem", i));
            let decoded = std::fs::write(&wem_path, &job.wem).is_ok()
                && write_parent(&job.wav_dest).is_ok()
                && decoder.decode(&wem_path, &job.wav_dest).is_ok()
                && job.wav_dest.is_file();
            if !decoded {
                let _ = write_with_parents(&job.wem_dest, &job.wem);
            }
            decoded
        })
        .collect();

    remove_dir_retries(&tmp, rep);

    let mut tally = DecodeTally::default();
    for (ok, job) in results.iter().zip(jobs.iter()) {
        if *ok {
            tally.decoded += 1;
            rep.verbose(&format!("decoded {:?}", job.wav_dest));
        } else {
            tally.fallback += 1;
            rep.verbose(&format!("decode fell back to {:?}", job.wem_dest));
        }
    }
    Ok(tally)
}

fn write_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(p) => std::fs::create_dir_all(p),
        None => Ok(()),
    }
}

/// Remove the scratch directory: three attempts 500 ms apart, then
/// best-effort per-file deletion.
fn remove_dir_retries(dir: &Path, rep: &dyn Reporter) {
    for attempt in 0..3 {
        if std::fs::remove_dir_all(dir).is_ok() || !dir.exists() {
            return;
        }
        if attempt < 2 {
            std::thread::sleep(Duration::from_millis(500));
        }
    }
    rep.verbose(&format!("could not remove {:?}; deleting contents individually", dir));
    if let Ok(entries) = std::fs::read_dir(dir) {
        for ent in entries.flatten() {
            let _ = std::fs::remove_file(ent.path());
        }
    }
    let _ = std::fs::remove_dir(dir);
}
