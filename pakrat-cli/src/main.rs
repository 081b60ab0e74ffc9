use anyhow::{bail, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use pakrat_core::audio::WemDecoder;
use pakrat_core::blocktype::BlockType;
use pakrat_core::namemap::NameMap;
use pakrat_core::pck::{self, PckRequest};
use pakrat_core::postprocess::Pipeline;
use pakrat_core::report::Reporter;
use pakrat_core::vfs::{self, VfsRequest};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pakrat", version, about = "Game VFS and Wwise PCK asset extractor")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Extract block types from a game directory's VFS tree
    Vfs(VfsArgs),
    /// Extract a Wwise PCK sound package
    Pck(PckArgs),
}

#[derive(Args)]
struct VfsArgs {
    /// Game directory; must contain a `VFS` folder
    #[arg(long)]
    input: PathBuf,
    /// Output directory
    #[arg(long)]
    output: PathBuf,
    /// Block types to extract, by name or numeric id (comma-separated)
    #[arg(long, value_delimiter = ',')]
    blocktype: Vec<String>,
    /// Base64 override for the 32-byte stream key
    #[arg(long)]
    key: Option<String>,
    /// Enumerate and describe all present blocks; no extraction
    #[arg(long)]
    debug: bool,
    #[arg(long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PckMode {
    /// Keep WEM payloads as extracted
    Raw,
    /// Decode WEM audio to WAV through the external decoder
    Wav,
}

#[derive(Args)]
struct PckArgs {
    /// Package file (.pck)
    #[arg(long)]
    input: PathBuf,
    /// Output directory
    #[arg(long)]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = PckMode::Raw)]
    mode: PckMode,
    /// Name-map catalogue translating Wwise ids to readable paths
    #[arg(long)]
    json: Option<PathBuf>,
    /// Keep payloads with unrecognized magic as `<id>.unknown`
    #[arg(long)]
    save_unknown: bool,
    /// Decoder executable used by `--mode wav`
    #[arg(long, default_value = "vgmstream-cli")]
    decoder: PathBuf,
    #[arg(long)]
    verbose: bool,
}

struct ConsoleReporter {
    verbose: bool,
}

impl Reporter for ConsoleReporter {
    fn info(&self, msg: &str) {
        println!("{}", msg);
    }
    fn verbose(&self, msg: &str) {
        if self.verbose {
            println!("{}", msg);
        }
    }
    fn error(&self, msg: &str) {
        eprintln!("{}", msg);
    }
}

/// Runs an external WEM-to-WAV converter per file (vgmstream-cli invocation
/// shape). A native in-process decoder would slot in the same way.
struct CommandDecoder {
    program: PathBuf,
}

impl WemDecoder for CommandDecoder {
    fn decode(&self, wem_path: &Path, wav_path: &Path) -> Result<()> {
        let status = std::process::Command::new(&self.program)
            .arg("-o")
            .arg(wav_path)
            .arg(wem_path)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .with_context(|| format!("spawn {:?}", self.program))?;
        if !status.success() {
            bail!("{:?} exited with {}", self.program, status);
        }
        Ok(())
    }
}

fn main() -> ExitCode {
    // Argument validation failures (and --help/--version) print and exit 0;
    // only errors surfaced from the extractors are fatal.
    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };
    let result = match cli.cmd {
        Cmd::Vfs(args) => run_vfs(args),
        Cmd::Pck(args) => run_pck(args),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_vfs(args: VfsArgs) -> Result<ExitCode> {
    let rep = ConsoleReporter { verbose: args.verbose };
    let vfs_root = args.input.join("VFS");
    if !vfs_root.is_dir() {
        bail!("{:?} does not contain a VFS directory", args.input);
    }
    let key = match &args.key {
        Some(b64) => vfs::parse_key(b64)?,
        None => vfs::default_key(),
    };

    if args.debug {
        let summaries = vfs::describe_blocks(&vfs_root, &key, &rep)?;
        for s in &summaries {
            println!(
                "{:18} {:>3}  {:30} v{}  {} chunks, {} files, {} bytes",
                s.block_type,
                s.block_type.id(),
                s.group_name,
                s.version,
                s.chunk_count,
                s.file_count,
                s.total_bytes
            );
            for m in &s.missing_chunks {
                println!("    missing chunk {}", m);
            }
            for m in &s.digest_mismatches {
                println!("    digest mismatch {}", m);
            }
        }
        println!("{} blocks present", summaries.len());
        return Ok(ExitCode::SUCCESS);
    }

    if args.blocktype.is_empty() {
        let _ = Cli::command().print_help();
        return Ok(ExitCode::SUCCESS);
    }
    let mut block_types = Vec::new();
    for raw in &args.blocktype {
        match raw.parse::<BlockType>() {
            Ok(bt) => block_types.push(bt),
            Err(e) => {
                eprintln!("{}", e);
                let _ = Cli::command().print_help();
                return Ok(ExitCode::SUCCESS);
            }
        }
    }

    rep.info(&format!("VFS {:?} -> {:?}", vfs_root, args.output));
    let pipeline = Pipeline::standard();
    let mut total = (0usize, 0usize, 0usize);
    for bt in block_types {
        let req = VfsRequest {
            vfs_root: &vfs_root,
            output: &args.output,
            block_type: bt,
            key,
        };
        let tally = vfs::extract_block(&req, &pipeline, &rep)?;
        rep.info(&format!(
            "{}: {} extracted ({} processed, {} raw), {} failed",
            bt,
            tally.written(),
            tally.handled,
            tally.raw,
            tally.failed
        ));
        total.0 += tally.handled;
        total.1 += tally.raw;
        total.2 += tally.failed;
    }
    rep.info(&format!(
        "Done: {} extracted ({} processed, {} raw), {} failed",
        total.0 + total.1,
        total.0,
        total.1,
        total.2
    ));
    Ok(ExitCode::SUCCESS)
}

fn run_pck(args: PckArgs) -> Result<ExitCode> {
    let rep = ConsoleReporter { verbose: args.verbose };
    let name_map = match &args.json {
        Some(p) => Some(NameMap::load(p)?),
        None => None,
    };
    let decoder: Option<CommandDecoder> = match args.mode {
        PckMode::Raw => None,
        PckMode::Wav => Some(CommandDecoder { program: args.decoder.clone() }),
    };

    rep.info(&format!("PCK {:?} -> {:?}", args.input, args.output));
    let req = PckRequest {
        input: &args.input,
        output: &args.output,
        save_unknown: args.save_unknown,
    };
    let tally = pck::extract(
        &req,
        name_map.as_ref(),
        decoder.as_ref().map(|d| d as &dyn WemDecoder),
        &rep,
    )?;
    rep.info(&format!(
        "Done: {} wems ({} decoded, {} fallback), {} banks, {} embedded, {} plugins, {} unknown, {} failed",
        tally.wems, tally.decoded, tally.fallback, tally.banks, tally.embedded, tally.plugins,
        tally.unknown, tally.failed
    ));
    Ok(ExitCode::SUCCESS)
}
