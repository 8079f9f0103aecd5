use chrono::Local;
use clap::Parser;
use merkle_engine::config::{DEFAULT_CAPACITY, DEFAULT_THRESHOLD};
use merkle_engine::{Error, FileStorage, HashTree, MerkleTree, Result, TreeConfig, Verifier, file_size, u64_to_rand_bytes};
use rand::Rng;
use std::fs::create_dir_all;
use std::path::PathBuf;
use std::time::Instant;
use tempfile::Builder;
use tracing_subscriber::EnvFilter;

mod stat;

const DEFAULT_SIZE: u64 = 1024 * 1024;
const DEFAULT_ROUNDS: usize = 100;

#[derive(Parser)]
#[command(name = "merkle-bench")]
#[command(about = "Benchmark appends, roots, proofs and verification of an append-only Merkle tree")]
struct Args {
  /// Leaf file of the benchmarked tree; existing leaves are reused. A temporary file in the output directory
  /// when omitted
  #[arg(long)]
  dbfile: Option<PathBuf>,

  /// Nr entries to consider
  #[arg(long, default_value_t = DEFAULT_SIZE)]
  size: u64,

  /// Base index for proof operations; the middle of the tree when omitted
  #[arg(long)]
  index: Option<u64>,

  /// Nr rounds per benchmark
  #[arg(long, default_value_t = DEFAULT_ROUNDS)]
  rounds: usize,

  /// Hash algorithm used by the tree
  #[arg(long, default_value = "sha256")]
  algorithm: String,

  /// Randomize function input per round
  #[arg(long)]
  randomize: bool,

  /// Use unoptimized versions of core operations
  #[arg(long)]
  disable_optimizations: bool,

  /// Disable subroot caching
  #[arg(long)]
  disable_cache: bool,

  /// Subroot cache threshold
  #[arg(long, value_name = "WIDTH", default_value_t = DEFAULT_THRESHOLD)]
  threshold: usize,

  /// Subroot cache capacity in bytes
  #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CAPACITY)]
  capacity: usize,

  /// JSON tree settings; replaces --algorithm, --threshold, --capacity and the disable flags
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Output directory for benchmark results and working temporary files
  #[arg(long, default_value = ".")]
  output: PathBuf,

  /// Identifier of this run, prefixed to the report file name
  #[arg(long)]
  session: Option<String>,
}

fn main() -> Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

  let args = Args::parse();
  if args.size == 0 {
    return Err(Error::EmptyTree);
  }
  let session = args.session.clone().unwrap_or_else(|| Local::now().format("%Y%m%d%H%M%S").to_string());

  let dir = &args.output;
  create_dir_all(dir)?;
  println!("Working directory: {:?}", dir);

  let config = match &args.config {
    Some(file) => TreeConfig::from_file(file)?,
    None => TreeConfig::default()
      .algorithm(&args.algorithm)
      .threshold(args.threshold)
      .capacity(args.capacity)
      .disable_cache(args.disable_cache)
      .disable_optimizations(args.disable_optimizations),
  };

  // the temporary leaf file lives until the end of the run
  let (path, _tf) = match &args.dbfile {
    Some(path) => (path.clone(), None),
    None => {
      let tf = Builder::new().prefix(".tmp-merkle-bench").suffix(".db").tempfile_in(dir)?;
      (tf.path().to_path_buf(), Some(tf))
    }
  };
  let tree = MerkleTree::<FileStorage>::on_file(&path, config)?;

  populate(&tree, args.size)?;
  let mut report = stat::Report::new("OPERATION");
  run_root(&tree, &args, &mut report)?;
  run_inclusion(&tree, &args, &mut report)?;
  run_consistency(&tree, &args, &mut report)?;
  run_append(&tree, &args, &mut report)?;

  let stats = tree.cache_stats()?;
  println!(
    "cache: {} hits, {} misses, {} evictions, {} entries, {} bytes",
    stats.hits, stats.misses, stats.evictions, stats.entries, stats.bytes
  );
  println!("leaf file: {} bytes", file_size(&path));

  let csv = dir.join(format!("{session}-merkle-bench.csv"));
  report.save_to_csv(&csv)?;
  println!("==> {}", csv.to_string_lossy());
  Ok(())
}

fn record(i: u64) -> [u8; 8] {
  let mut buffer = [0u8; 8];
  u64_to_rand_bytes(i, &mut buffer);
  buffer
}

fn populate<T: HashTree<Error = Error>>(tree: &T, size: u64) -> Result<()> {
  let n0 = tree.size();
  if n0 >= size {
    println!("[populate] {n0} leaves already present");
    return Ok(());
  }
  println!("[populate] {n0} -> {size} leaves");
  let t0 = Instant::now();
  for i in n0..size {
    tree.append(&record(i))?;
  }
  tree.sync()?;
  let elapsed = t0.elapsed();
  let per_leaf = elapsed.as_secs_f64() * 1_000_000.0 / (size - n0) as f64;
  println!("  {:.3}s; {per_leaf:.3}us per leaf", elapsed.as_secs_f64());
  Ok(())
}

fn base_index(args: &Args) -> u64 {
  args.index.unwrap_or(args.size.div_ceil(2)).clamp(1, args.size)
}

fn pick(args: &Args, rng: &mut impl Rng, low: u64) -> u64 {
  if args.randomize { rng.random_range(low..=args.size) } else { base_index(args).max(low) }
}

fn run_root<T: HashTree<Error = Error>>(tree: &T, args: &Args, report: &mut stat::Report<&'static str>) -> Result<()> {
  println!("[root]");
  let mut rng = rand::rng();
  for _ in 0..args.rounds {
    let size = pick(args, &mut rng, 1);
    let t0 = Instant::now();
    tree.root_at(size)?;
    report.add("root", t0.elapsed());
  }
  println!("  {}", report.single("root"));
  Ok(())
}

fn run_inclusion<T: HashTree<Error = Error>>(
  tree: &T,
  args: &Args,
  report: &mut stat::Report<&'static str>,
) -> Result<()> {
  println!("[inclusion]");
  let mut rng = rand::rng();
  for _ in 0..args.rounds {
    let index = pick(args, &mut rng, 1) - 1;
    let leaf = tree.leaf(index)?;
    let t0 = Instant::now();
    let mut proof = tree.prove_inclusion(index, args.size)?;
    let t1 = Instant::now();
    let verified = Verifier::verify(&mut proof, &leaf, None)?;
    let t2 = Instant::now();
    if !verified {
      return Err(Error::InvalidProof(format!("inclusion proof of {index} in {} did not verify", args.size)));
    }
    report.add("prove-inclusion", t1 - t0);
    report.add("verify-inclusion", t2 - t1);
  }
  println!("  prove:  {}", report.single("prove-inclusion"));
  println!("  verify: {}", report.single("verify-inclusion"));
  Ok(())
}

fn run_consistency<T: HashTree<Error = Error>>(
  tree: &T,
  args: &Args,
  report: &mut stat::Report<&'static str>,
) -> Result<()> {
  println!("[consistency]");
  let mut rng = rand::rng();
  for _ in 0..args.rounds {
    let size1 = pick(args, &mut rng, 1);
    let old = tree.root_at(size1)?;
    let t0 = Instant::now();
    let mut proof = tree.prove_consistency(size1, args.size)?;
    let t1 = Instant::now();
    let verified = Verifier::verify(&mut proof, &old, None)?;
    let t2 = Instant::now();
    if !verified {
      return Err(Error::InvalidProof(format!("consistency proof of {size1} in {} did not verify", args.size)));
    }
    report.add("prove-consistency", t1 - t0);
    report.add("verify-consistency", t2 - t1);
  }
  println!("  prove:  {}", report.single("prove-consistency"));
  println!("  verify: {}", report.single("verify-consistency"));
  Ok(())
}

fn run_append<T: HashTree<Error = Error>>(tree: &T, args: &Args, report: &mut stat::Report<&'static str>) -> Result<()> {
  println!("[append]");
  let mut rng = rand::rng();
  for _ in 0..args.rounds {
    let value = if args.randomize { rng.random::<u64>() } else { tree.size() };
    let t0 = Instant::now();
    tree.append(&record(value))?;
    report.add("append", t0.elapsed());
  }
  tree.sync()?;
  println!("  {}", report.single("append"));
  Ok(())
}
