use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use classc::codegen::decode::{decode_dense, decode_definition, decode_handlers, decode_sparse};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "classc")]
#[command(about = "Inspect tables emitted by the classc compiler core")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BlobKind {
    /// Dense dispatch table
    Dense,
    /// Sparse dispatch table
    Sparse,
    /// Exception handler table
    Handlers,
    /// Class definition stream
    Definition,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an encoded table and print it
    Inspect {
        #[arg(value_enum)]
        kind: BlobKind,

        /// File holding the raw blob
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match &cli.command {
        Commands::Inspect { kind, input } => inspect(*kind, input),
    }
}

fn inspect(kind: BlobKind, input: &PathBuf) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    log::debug!("read {} byte(s) from {}", bytes.len(), input.display());

    match kind {
        BlobKind::Dense => {
            let table = decode_dense(&bytes)?;
            println!("dense first_key={} cases={}", table.first_key, table.case_count);
            for (i, address) in table.addresses.iter().enumerate() {
                let key = table.first_key as i64 + i as i64;
                if *address < 0 {
                    println!("  {:>6} -> (gap)", key);
                } else {
                    println!("  {:>6} -> {}", key, address);
                }
            }
        }
        BlobKind::Sparse => {
            let table = decode_sparse(&bytes)?;
            println!("sparse default={} pairs={}", table.default_address, table.pairs.len());
            for (key, address) in &table.pairs {
                println!("  {:>6} -> {}", key, address);
            }
        }
        BlobKind::Handlers => {
            let entries = decode_handlers(&bytes)?;
            println!("handlers count={}", entries.len());
            for entry in entries {
                let types: Vec<String> = entry.type_indices.iter().map(|t| t.to_string()).collect();
                println!(
                    "  [{}, {}) -> {} types=[{}]",
                    entry.begin,
                    entry.end,
                    entry.handler,
                    types.join(", ")
                );
            }
        }
        BlobKind::Definition => {
            let stream = decode_definition(&bytes)?;
            println!("strings count={}", stream.strings.len());
            for (i, s) in stream.strings.iter().enumerate() {
                println!("  #{} {:?}", i, s);
            }
            for (opcode, operands) in &stream.instructions {
                let operands: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
                println!("  {} {}", opcode.mnemonic(), operands.join(" "));
            }
        }
    }
    Ok(())
}
