//! Driver for building and querying minimal perfect hash functions.
//!
//! `build` reads newline-delimited records, takes the first space-separated
//! field of each line as the key, and writes the serialized function.
//! `lookup` loads a serialized function and resolves one key.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use sdict::codec::{AlignedBuf, ByteReader, ByteWriter};
use sdict::mphf::{Mphf, MphfConfig, PivotEncoding};
use sdict::packed::{DictArray, PackedArray};

#[derive(Parser)]
#[command(name = "sdict-mph", about = "Minimal perfect hash functions over text key files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an MPHF and serialize it.
    Build {
        /// Newline-delimited records; first space-separated field is the key.
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Fixed build seed; omitted means fresh OS entropy per attempt.
        #[arg(short, long)]
        seed: Option<u64>,
        /// Bucket density parameter.
        #[arg(short, default_value_t = 7)]
        c: u64,
        /// Load factor in (0, 1].
        #[arg(short = 'a', long = "alpha", default_value_t = 0.95)]
        alpha: f64,
        /// Store pivots dictionary-coded instead of plain packed.
        #[arg(short = 'd', long = "dict")]
        dict: bool,
        /// Time a lookup pass over the whole key set after building.
        #[arg(short = 'b', long = "benchmark")]
        benchmark: bool,
    },
    /// Resolve one key against a serialized MPHF.
    Lookup {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        key: String,
        /// The function was built with dictionary-coded pivots.
        #[arg(short = 'd', long = "dict")]
        dict: bool,
    },
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Build {
            input,
            output,
            seed,
            c,
            alpha,
            dict,
            benchmark,
        } => {
            let keys = read_keys(&input)?;
            let config = MphfConfig {
                c,
                alpha,
                ..MphfConfig::default()
            };
            if dict {
                build::<DictArray>(&keys, &config, seed, &output, benchmark)
            } else {
                build::<PackedArray>(&keys, &config, seed, &output, benchmark)
            }
        }
        Command::Lookup { input, key, dict } => {
            let buf = AlignedBuf::read_file(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let mut reader = ByteReader::new(buf.as_bytes())?;
            let index = if dict {
                Mphf::<DictArray>::read_from(&mut reader)?.index(key.as_str())
            } else {
                Mphf::<PackedArray>::read_from(&mut reader)?.index(key.as_str())
            };
            println!("{key} {index}");
            Ok(())
        }
    }
}

fn read_keys(input: &PathBuf) -> Result<Vec<String>> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let keys: Vec<String> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(' ').next().unwrap_or(line).to_string())
        .collect();
    if keys.is_empty() {
        bail!("{}: no keys", input.display());
    }
    Ok(keys)
}

fn build<E: PivotEncoding<'static>>(
    keys: &[String],
    config: &MphfConfig,
    seed: Option<u64>,
    output: &PathBuf,
    benchmark: bool,
) -> Result<()> {
    let t0 = Instant::now();
    let mphf: Mphf<'static, E> = match seed {
        Some(s) => Mphf::build_with_seed(keys, config, s)?,
        None => Mphf::build(keys, config)?,
    };
    let build_s = t0.elapsed().as_secs_f64();

    let mut writer = ByteWriter::new();
    mphf.write_into(&mut writer);
    let bytes = writer.finish();
    fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;

    println!(
        "n = {}  size = {} bytes  {:.3} bits/key  build {:.3}s",
        mphf.len(),
        bytes.len(),
        mphf.bits_per_key(),
        build_s
    );

    if benchmark {
        let t0 = Instant::now();
        let mut acc = 0u64;
        for key in keys {
            acc ^= mphf.index(std::hint::black_box(key.as_str()));
        }
        std::hint::black_box(acc);
        let per = t0.elapsed().as_secs_f64() * 1e9 / keys.len() as f64;
        println!("lookup {per:.1} ns/key");
    }
    Ok(())
}
