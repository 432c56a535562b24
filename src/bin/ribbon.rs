//! Driver for building and querying bumped ribbon retrieval tables.
//!
//! `build` reads newline-delimited `key,value` records and writes the
//! serialized structure; `lookup` loads it and resolves one key.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use sdict::bumped::{BumpedRibbon, RibbonConfig};
use sdict::codec::{AlignedBuf, ByteReader, ByteWriter};

#[derive(Parser)]
#[command(name = "sdict-ribbon", about = "Static key → value retrieval tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a retrieval table and serialize it.
    Build {
        /// Newline-delimited `key,value` records.
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Fixed build seed; omitted means fresh OS entropy per attempt.
        #[arg(short, long)]
        seed: Option<u64>,
        /// Band width in [2, 64].
        #[arg(short, default_value_t = 32)]
        w: usize,
        /// Slack factor on each layer's table size.
        #[arg(long, default_value_t = 0.0)]
        eps: f64,
        /// Time a lookup pass over the whole key set after building.
        #[arg(short = 'b', long = "benchmark")]
        benchmark: bool,
    },
    /// Resolve one key against a serialized table.
    Lookup {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        key: String,
    },
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Build {
            input,
            output,
            seed,
            w,
            eps,
            benchmark,
        } => build(&input, &output, seed, w, eps, benchmark),
        Command::Lookup { input, key } => {
            let buf = AlignedBuf::read_file(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let mut reader = ByteReader::new(buf.as_bytes())?;
            let ribbon = BumpedRibbon::read_from(&mut reader)?;
            println!("{key},{}", ribbon.lookup(key.as_str()));
            Ok(())
        }
    }
}

fn read_pairs(input: &PathBuf) -> Result<Vec<(String, u64)>> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let mut pairs = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(',')
            .with_context(|| format!("{}:{}: expected key,value", input.display(), lineno + 1))?;
        let value: u64 = value
            .trim()
            .parse()
            .with_context(|| format!("{}:{}: bad value", input.display(), lineno + 1))?;
        pairs.push((key.to_string(), value));
    }
    if pairs.is_empty() {
        bail!("{}: no records", input.display());
    }
    Ok(pairs)
}

fn build(
    input: &PathBuf,
    output: &PathBuf,
    seed: Option<u64>,
    w: usize,
    eps: f64,
    benchmark: bool,
) -> Result<()> {
    let pairs = read_pairs(input)?;
    let config = RibbonConfig {
        band_width: w,
        eps,
        ..RibbonConfig::default()
    };

    let t0 = Instant::now();
    let ribbon = match seed {
        Some(s) => BumpedRibbon::build_with_seed(&pairs, &config, s)?,
        None => BumpedRibbon::build(&pairs, &config)?,
    };
    let build_s = t0.elapsed().as_secs_f64();

    let mut writer = ByteWriter::new();
    ribbon.write_into(&mut writer);
    let bytes = writer.finish();
    fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;

    println!(
        "n = {}  layers = {}  size = {} bytes  {:.3} bits/key  build {:.3}s",
        pairs.len(),
        ribbon.num_layers(),
        bytes.len(),
        bytes.len() as f64 * 8.0 / pairs.len() as f64,
        build_s
    );

    if benchmark {
        let t0 = Instant::now();
        let mut acc = 0u64;
        for (key, _) in &pairs {
            acc ^= ribbon.lookup(std::hint::black_box(key.as_str()));
        }
        std::hint::black_box(acc);
        let per = t0.elapsed().as_secs_f64() * 1e9 / pairs.len() as f64;
        println!("lookup {per:.1} ns/key");
    }
    Ok(())
}
