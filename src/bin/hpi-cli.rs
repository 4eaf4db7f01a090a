//! hpi-cli - Command-line interface for taforge
//!
//! Inspect and extract Total Annihilation archives and the assets inside them.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use taforge::gaf::FrameHeader;
use taforge::hpi::ArchiveFile;
use taforge::vfs::{BuildOptions, FileRead};
use taforge::{FileSystem, GafListing, HpiArchive, Script};

#[derive(Parser)]
#[command(name = "hpi-cli")]
#[command(about = "A CLI tool for Total Annihilation HPI archives and game assets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (only errors are logged)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every file with its size and compression
    List {
        /// Archive file or game directory
        source: PathBuf,
    },

    /// Extract a single file
    Extract {
        /// Archive file or game directory
        source: PathBuf,

        /// Path of the file inside the archive
        path: String,

        /// Output file (defaults to the file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract every file of an archive
    ExtractAll {
        /// Archive file
        archive: PathBuf,

        /// Output directory
        output: PathBuf,
    },

    /// Show archive version and counts
    Info {
        /// Archive file
        archive: PathBuf,
    },

    /// List the sequences and frames of a GAF file
    Gaf {
        /// Archive file or game directory
        source: PathBuf,

        /// Path of the GAF file
        path: String,
    },

    /// Show the modules and disassembly of a COB script
    Script {
        /// Archive file or game directory
        source: PathBuf,

        /// Path of the script file
        path: String,
    },
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level().as_str().to_lowercase(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::List { source } => list_files(&source),
        Commands::Extract {
            source,
            path,
            output,
        } => extract_file(&source, &path, output, cli.quiet),
        Commands::ExtractAll { archive, output } => extract_all(&archive, &output, cli.quiet),
        Commands::Info { archive } => show_info(&archive),
        Commands::Gaf { source, path } => show_gaf(&source, &path),
        Commands::Script { source, path } => show_script(&source, &path),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Open a game directory as a merged filesystem, or a single archive
fn open_source(source: &Path) -> Result<FileSystem, Box<dyn std::error::Error>> {
    if !source.exists() {
        return Err(format!("'{}' does not exist", source.display()).into());
    }
    let filesystem = if source.is_dir() {
        FileSystem::build(source, &BuildOptions::default())?
    } else {
        FileSystem::from_archive(source)?
    };
    Ok(filesystem)
}

fn list_files(source: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let filesystem = open_source(source)?;
    let mut count = 0;
    filesystem.walk(|path, file| {
        println!(
            "{:>10}  {:<5}  {}",
            file.size(),
            format!("{:?}", file.info.compression),
            path
        );
        count += 1;
    });
    println!("{} files", count);
    Ok(())
}

fn extract_file(
    source: &Path,
    path: &str,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let filesystem = open_source(source)?;
    let mut handle = filesystem.open_file(path)?;
    let data = handle.read_to_end_data()?;

    let output = output.unwrap_or_else(|| PathBuf::from(handle.file_name()));
    fs::write(&output, &data)?;

    if !quiet {
        println!("✓ Extracted {} ({} bytes) to '{}'", path, data.len(), output.display());
    }
    Ok(())
}

fn extract_all(archive: &Path, output: &Path, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();
    let archive = HpiArchive::open(archive)?;

    let mut files: Vec<(String, ArchiveFile)> = Vec::new();
    archive
        .root()
        .walk(|path, file| files.push((path.to_string(), file.clone())));

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    };

    let mut total = 0;
    for (path, file) in &files {
        progress.set_message(path.clone());
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
        {
            log::warn!("Skipping unsafe path {}", path);
            progress.inc(1);
            continue;
        }
        let data = archive.extract(file)?;
        let target = output.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &data)?;
        total += data.len();
        progress.inc(1);
    }
    progress.finish_with_message("Extraction complete");

    if !quiet {
        println!("✓ Extraction successful!");
        println!("  Files: {}", files.len());
        println!("  Bytes: {}", total);
        println!("  Time:  {:.2?}", start_time.elapsed());
    }
    Ok(())
}

fn show_info(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let archive = HpiArchive::open(path)?;
    let root = archive.root();

    let mut stored = 0u64;
    let mut extracted = 0u64;
    root.walk(|_, file| {
        extracted += file.size as u64;
        stored += if file.compressed_size > 0 {
            file.compressed_size as u64
        } else {
            file.size as u64
        };
    });

    println!("Archive:     {}", archive.path().display());
    println!("Version:     {:?}", archive.version());
    println!("Files:       {}", root.file_count());
    println!("Directories: {}", root.directory_count());
    println!("Size:        {} bytes", extracted);
    if stored > 0 && stored != extracted {
        println!("Stored:      {} bytes", stored);
    }
    Ok(())
}

fn show_gaf(source: &Path, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filesystem = open_source(source)?;
    let mut handle = filesystem.open_file(path)?;
    let listing = GafListing::load(&mut handle)?;

    for item in &listing.items {
        println!("{} ({} frames)", item.name, item.frames.len());
        for (index, entry) in item.frames.iter().enumerate() {
            let header = FrameHeader::read_at(&mut handle, entry.frame_offset)?;
            println!(
                "  {:>3}: {}x{} at ({}, {}) encoding {} sub-frames {}",
                index,
                header.width,
                header.height,
                header.x_offset,
                header.y_offset,
                header.encoding,
                header.sub_frame_count
            );
        }
    }
    Ok(())
}

fn show_script(source: &Path, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filesystem = open_source(source)?;
    let mut handle = filesystem.open_file(path)?;
    let script = Script::load(&mut handle)?;

    println!("Version: {}", script.version);
    println!("Statics: {}", script.static_count);
    println!("Pieces:  {}", script.pieces.join(", "));
    if !script.sounds.is_empty() {
        println!("Sounds:  {}", script.sounds.join(", "));
    }

    for (index, module) in script.modules.iter().enumerate() {
        println!();
        println!("{} (offset {}, {} locals)", module.name, module.offset, module.local_count);
        for line in script.disassemble(index)? {
            println!("{}", line);
        }
    }
    Ok(())
}
