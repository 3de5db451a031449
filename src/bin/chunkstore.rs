//! chunkstore Command Prompt
//!
//! Reads commands from stdin and runs each on its own thread.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chunkstore::command::Command;
use chunkstore::{Config, Engine, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// chunkstore prompt
#[derive(Parser, Debug)]
#[command(name = "chunkstore")]
#[command(about = "Local chunked-file storage with integrity verification")]
#[command(version)]
struct Args {
    /// YAML settings file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the parts directory
    #[arg(short, long)]
    parts_dir: Option<PathBuf>,

    /// Override the part size in bytes
    #[arg(long)]
    part_size: Option<usize>,

    /// Override the in-flight memory budget in bytes
    #[arg(short = 'm', long)]
    max_memory: Option<usize>,

    /// Override the number of I/O workers
    #[arg(short, long)]
    workers: Option<usize>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chunkstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("chunkstore v{}", chunkstore::VERSION);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let engine = match Engine::open(config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let mut pending: Vec<JoinHandle<()>> = Vec::new();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read command: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        if command == Command::Exit {
            break;
        }

        let engine = Arc::clone(&engine);
        pending.push(thread::spawn(move || run_command(&engine, command)));
        pending.retain(|handle| !handle.is_finished());
    }

    // Let outstanding commands finish before the pool shuts down
    for handle in pending {
        let _ = handle.join();
    }

    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.close(),
        Err(_) => tracing::warn!("Engine still shared at exit"),
    }
    tracing::info!("chunkstore stopped");
}

/// Settings file (if present) with command-line overrides applied
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.config.exists() {
        Config::from_yaml_file(&args.config)?
    } else {
        tracing::warn!(
            "Settings file {} not found, using defaults",
            args.config.display()
        );
        Config::default()
    };

    if let Some(dir) = &args.parts_dir {
        config.parts_directory = dir.clone();
    }
    if let Some(size) = args.part_size {
        config.part_size = size;
    }
    if let Some(bytes) = args.max_memory {
        config.max_memory = bytes;
    }
    if let Some(count) = args.workers {
        config.io_worker_count = count;
    }
    Ok(config)
}

fn run_command(engine: &Engine, command: Command) {
    let outcome = match command {
        Command::Put { path } => put(engine, &path),
        Command::Get { id, output } => get(engine, id, output),
        Command::Delete { id } => delete(engine, id),
        Command::List => list(engine),
        Command::Exit => Ok(String::new()),
    };

    let mut stdout = io::stdout().lock();
    let _ = match outcome {
        Ok(message) => writeln!(stdout, "{}", message),
        Err(e) => writeln!(stdout, "Error: {}", e),
    };
}

fn put(engine: &Engine, path: &Path) -> Result<String> {
    let file = fs::File::open(path)?;
    let name = path.display().to_string();
    let id = engine.put_reader(&name, io::BufReader::new(file))?;
    Ok(format!("Put: {} stored as file {}", name, id))
}

fn get(engine: &Engine, id: u64, output: Option<PathBuf>) -> Result<String> {
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(engine.file(id)?.name),
    };
    let written = engine.get_to_path(id, &output)?;
    Ok(format!(
        "Get: file {} ({} bytes) written to {}",
        id,
        written,
        output.display()
    ))
}

fn delete(engine: &Engine, id: u64) -> Result<String> {
    let report = engine.delete(id)?;
    let mut message = format!("Delete: file {} removed ({} parts)", id, report.parts_removed);
    for path in &report.orphaned {
        message.push_str(&format!("\n  left on disk: {}", path.display()));
    }
    Ok(message)
}

fn list(engine: &Engine) -> Result<String> {
    let mut table = format!("{:<8} {:<32} {:<8} {}", "ID", "NAME", "STATUS", "PARTS");
    for file in engine.list() {
        table.push_str(&format!(
            "\n{:<8} {:<32} {:<8} {}",
            file.id, file.name, file.status, file.part_count
        ));
    }
    Ok(table)
}
