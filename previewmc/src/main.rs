use anyhow::{Context, Result};
use clap::Parser;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use noise::{NoiseFn, Perlin};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use previewmc_benchmark::PreviewMetrics;
use previewmc_storage::{
    ChannelFlag, ChunkPos, NO_DATA, PreviewStore, StoreConfig, Stride, quart_from_section,
};

#[derive(Parser)]
#[command(name = "previewmc", about = "Low-resolution world preview sampler with a band-sharded sample store")]
pub struct Args {
    /// Lowest block Y covered by the store
    #[arg(long, default_value = "-64", allow_hyphen_values = true)]
    pub y_min: i32,

    /// Highest block Y covered by the store
    #[arg(long, default_value = "320")]
    pub y_max: i32,

    /// Block Y at which the demo sampler probes the world
    #[arg(long, default_value = "64")]
    pub y_sample: i32,

    /// Quarts per stored cell: 1, 2 or 4
    #[arg(short, long, default_value = "4")]
    pub stride: u8,

    /// Disable the value-deduplicating section layout
    #[arg(long)]
    pub no_compression: bool,

    /// Sampling worker threads
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Radius of the sampled square, in chunks around the origin
    #[arg(short, long, default_value = "32")]
    pub radius: i32,

    /// World seed for the synthetic sampler
    #[arg(long, default_value = "0")]
    pub seed: u32,

    /// Where to save the store when sampling finishes
    #[arg(short, long, default_value = "preview.dat")]
    pub output: PathBuf,

    /// Restore a previously saved store before sampling
    #[arg(long)]
    pub load: Option<PathBuf>,

    /// Print diagnostics as JSON instead of the plain report
    #[arg(long)]
    pub stats_json: bool,
}

/// Stand-in for the engine's terrain sampler: deterministic noise keyed by
/// the world seed.
struct SyntheticSampler {
    temperature: Perlin,
    humidity: Perlin,
    terrain: Perlin,
    placement: Perlin,
}

impl SyntheticSampler {
    fn new(seed: u32) -> Self {
        Self {
            temperature: Perlin::new(seed),
            humidity: Perlin::new(seed.wrapping_add(1)),
            terrain: Perlin::new(seed.wrapping_add(2)),
            placement: Perlin::new(seed.wrapping_add(3)),
        }
    }

    fn biome(&self, quart_x: i32, quart_z: i32) -> i16 {
        let pos = [quart_x as f64 * 0.01, quart_z as f64 * 0.01];
        let temperature = self.temperature.get(pos);
        let humidity = self.humidity.get(pos);
        let bucket = |v: f64| ((v + 1.0) * 1.49) as i16; // 0..=2
        bucket(temperature) * 3 + bucket(humidity)
    }

    fn height(&self, quart_x: i32, quart_z: i32) -> i16 {
        let pos = [quart_x as f64 * 0.02, quart_z as f64 * 0.02];
        (64.0 + self.terrain.get(pos) * 96.0) as i16
    }

    /// Structure id placed in this chunk, if any.
    fn structure(&self, chunk: ChunkPos) -> Option<i16> {
        let value = self.placement.get([chunk.x as f64 * 0.7, chunk.z as f64 * 0.7]);
        (value > 0.78).then_some(1 + (value * 100.0) as i16 % 4)
    }
}

fn sample_chunk(
    store: &PreviewStore,
    sampler: &SyntheticSampler,
    chunk: ChunkPos,
    y_sample: i32,
    metrics: &PreviewMetrics,
) {
    let started = Instant::now();
    let base_x = quart_from_section(chunk.x);
    let base_z = quart_from_section(chunk.z);

    // Bulk path: fetch each section once, then write cells directly.
    let biomes = store.section_at_chunk(chunk, y_sample, ChannelFlag::Biome);
    let heights = store.section_at_chunk(chunk, y_sample, ChannelFlag::Height);
    let mut samples = 0;
    for dx in 0..4 {
        for dz in 0..4 {
            let qx = base_x + dx;
            let qz = base_z + dz;
            biomes.put(qx - biomes.quart_x(), qz - biomes.quart_z(), sampler.biome(qx, qz));
            heights.put(qx - heights.quart_x(), qz - heights.quart_z(), sampler.height(qx, qz));
            samples += 2;
        }
    }

    if let Some(structure) = sampler.structure(chunk) {
        let starts = store.section_at_chunk(chunk, y_sample, ChannelFlag::StructStart);
        starts.put(base_x - starts.quart_x(), base_z - starts.quart_z(), structure);
        metrics.record_structure();
        samples += 1;
    }

    metrics.record_chunk(started.elapsed(), samples);
}

#[derive(Serialize)]
struct DiagnosticsJson {
    bands: usize,
    sections_per_band: Vec<usize>,
    compressed_sections: usize,
    distinct_values: Vec<u16>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // An unsupported stride is a deployment error; abort before any work.
    let stride = Stride::from_quarts(args.stride).context("invalid --stride")?;
    let config = StoreConfig { stride, compression: !args.no_compression };
    let metrics = Arc::new(PreviewMetrics::new(format!(
        "stride={} compression={} threads={} radius={}",
        args.stride, config.compression, args.threads, args.radius,
    )));

    let mut store = PreviewStore::new(args.y_min, args.y_max, config);

    if let Some(path) = &args.load {
        let started = Instant::now();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut reader = GzDecoder::new(BufReader::new(file));
        store.load(&mut reader).with_context(|| format!("loading {}", path.display()))?;
        metrics.record_load(started.elapsed());
        log::info!(
            "restored {} sections from {}",
            store.section_counts().iter().sum::<usize>(),
            path.display(),
        );
    }

    let store = Arc::new(store);
    let sampler = Arc::new(SyntheticSampler::new(args.seed));

    let chunks: Vec<ChunkPos> = (-args.radius..args.radius)
        .flat_map(|x| (-args.radius..args.radius).map(move |z| ChunkPos::new(x, z)))
        .collect();
    log::info!("sampling {} chunks on {} threads", chunks.len(), args.threads);

    let handles: Vec<_> = (0..args.threads.max(1))
        .map(|worker| {
            let store = Arc::clone(&store);
            let sampler = Arc::clone(&sampler);
            let metrics = Arc::clone(&metrics);
            let chunks = chunks.clone();
            let threads = args.threads.max(1);
            let y_sample = args.y_sample;
            std::thread::spawn(move || {
                for chunk in chunks.into_iter().skip(worker).step_by(threads) {
                    sample_chunk(&store, &sampler, chunk, y_sample, &metrics);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("sampling worker panicked");
    }

    let total_sections: usize = store.section_counts().iter().sum();
    metrics
        .total_sections_created
        .fetch_add(total_sections, std::sync::atomic::Ordering::Relaxed);

    // Scattered point reads, the path renderers use for tooltips
    for probe in [-args.radius * 4, 0, args.radius * 4 + 17] {
        if store.sample(probe, args.y_sample >> 2, probe, ChannelFlag::Biome) == NO_DATA {
            metrics.record_query_miss();
        } else {
            metrics.record_query_hit();
        }
    }

    let started = Instant::now();
    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut writer = GzEncoder::new(BufWriter::new(file), Compression::default());
    store.save(&mut writer)?;
    writer.finish()?.into_inner().map_err(|e| anyhow::anyhow!("flushing output: {e}"))?;
    let bytes = std::fs::metadata(&args.output)?.len() as usize;
    metrics.record_save(started.elapsed(), bytes);
    log::info!("saved {} sections to {}", total_sections, args.output.display());

    println!("{}", metrics.generate_report());

    let stats = store.compression_statistics();
    if args.stats_json {
        let diagnostics = DiagnosticsJson {
            bands: store.band_count(),
            sections_per_band: store.section_counts(),
            compressed_sections: stats.len(),
            distinct_values: stats,
        };
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else if !stats.is_empty() {
        let max = stats.iter().copied().max().unwrap_or(0);
        let avg = stats.iter().map(|&v| v as usize).sum::<usize>() / stats.len();
        println!(
            "Compression: {} sections, {} distinct values avg, {} max",
            stats.len(),
            avg,
            max,
        );
    }

    Ok(())
}
