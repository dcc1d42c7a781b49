use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::{Tensor, D};
use clap::Parser;
use convs2s::{Seq2Seq, Seq2SeqConfig};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("convs2s failed: {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Convolutional seq2seq forward pass", long_about = None)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to a TOML or JSON model config"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = 2, help = "Number of sequences in the batch")]
    batch: usize,

    #[arg(long = "src-len", default_value_t = 6, help = "Source sequence length")]
    src_len: usize,

    #[arg(long = "trg-len", default_value_t = 5, help = "Target sequence length")]
    trg_len: usize,

    #[arg(long, help = "Seed for sampled tokens and dropout, overriding the config")]
    seed: Option<u64>,

    #[arg(long, help = "Keep dropout active during the pass")]
    train: bool,
}

fn run() -> Result<()> {
    let args = Args::parse();
    if args.batch == 0 || args.src_len == 0 || args.trg_len == 0 {
        anyhow::bail!("--batch, --src-len and --trg-len must be greater than zero");
    }

    let mut config = Seq2SeqConfig::from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let model = Seq2Seq::from_config(&config)?;
    model.set_training(args.train);
    let device = model.encoder().config().device.clone();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let src = sample_tokens(&mut rng, args.batch, args.src_len, config.input_vocab_size, &device)?;
    let trg = sample_tokens(&mut rng, args.batch, args.trg_len, config.output_vocab_size, &device)?;

    let output = model.run(&src, &trg)?;
    log::info!(
        "logits {:?} attention {:?} (training={})",
        output.logits.dims(),
        output.attention.dims(),
        model.is_training()
    );

    let row_sums = output
        .attention
        .to_dtype(candle_core::DType::F32)?
        .sum(D::Minus1)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    let deviation = row_sums
        .iter()
        .map(|sum| (sum - 1.0).abs())
        .fold(0.0f32, f32::max);
    log::info!("max attention row-sum deviation: {deviation:.3e}");
    log::info!("parameters: {}", model.parameter_count());

    let greedy = output.logits.argmax(D::Minus1)?.to_vec2::<u32>()?;
    for (row, tokens) in greedy.iter().enumerate() {
        log::info!("greedy tokens [{row}]: {tokens:?}");
    }
    Ok(())
}

fn sample_tokens(
    rng: &mut StdRng,
    batch: usize,
    len: usize,
    vocab_size: usize,
    device: &candle_core::Device,
) -> Result<Tensor> {
    let ids: Vec<u32> = (0..batch * len)
        .map(|_| rng.gen_range(0..vocab_size as u32))
        .collect();
    Ok(Tensor::from_vec(ids, (batch, len), device)?)
}
