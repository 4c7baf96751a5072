//! Allocator stress workload.
//!
//! Registers batches of mixed-layout assets, removes a share of them every
//! round and checks after each round that the surviving vertex and index
//! data is intact. Runs on the host backend, so no GPU is needed.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p tessera-stress
//! cargo run -p tessera-stress -- --rounds 50 --assets 128 --packing interleaved
//! ```

use anyhow::{bail, Context as _};
use tessera_core::{Asset, AssetId};
use tessera_memory::{
    AllocatorConfig, BackendEvent, DescriptorCategory, GlobalUniforms, Section, VertexPacking,
};
use tessera_test::{mapped_2d, mapped_3d, ui_batch, unmapped_2d, unmapped_3d, HostHarness};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Workload parameters.
#[derive(Debug, Clone)]
struct Options {
    rounds: u32,
    assets: u64,
    frames: u32,
    packing: VertexPacking,
    asset_capacity: u64,
    /// Remove every n-th live asset each round
    remove_every: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rounds: 20,
            assets: 64,
            frames: 2,
            packing: VertexPacking::Separate,
            asset_capacity: 4096,
            remove_every: 3,
        }
    }
}

impl Options {
    fn from_args() -> anyhow::Result<Option<Self>> {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-r" | "--rounds" => {
                    options.rounds = arg_value(&args, i)?
                        .parse()
                        .context("invalid --rounds")?;
                    i += 1;
                }
                "-a" | "--assets" => {
                    options.assets = arg_value(&args, i)?
                        .parse()
                        .context("invalid --assets")?;
                    i += 1;
                }
                "-f" | "--frames" => {
                    options.frames = arg_value(&args, i)?
                        .parse()
                        .context("invalid --frames")?;
                    i += 1;
                }
                "-c" | "--capacity" => {
                    options.asset_capacity = arg_value(&args, i)?
                        .parse()
                        .context("invalid --capacity")?;
                    i += 1;
                }
                "-e" | "--remove-every" => {
                    options.remove_every = arg_value(&args, i)?
                        .parse()
                        .context("invalid --remove-every")?;
                    i += 1;
                }
                "-p" | "--packing" => {
                    options.packing = match arg_value(&args, i)?.as_str() {
                        "separate" => VertexPacking::Separate,
                        "interleaved" => VertexPacking::Interleaved,
                        other => bail!("unknown packing '{other}'"),
                    };
                    i += 1;
                }
                "-h" | "--help" => {
                    print_help();
                    return Ok(None);
                }
                other => bail!("unknown argument '{other}'"),
            }
            i += 1;
        }

        if options.frames == 0 {
            bail!("--frames must be at least 1");
        }
        Ok(Some(options))
    }
}

fn arg_value(args: &[String], i: usize) -> anyhow::Result<&String> {
    args.get(i + 1)
        .with_context(|| format!("{} expects a value", args[i]))
}

fn print_help() {
    eprintln!(
        "Tessera allocator stress workload

USAGE:
    cargo run -p tessera-stress -- [OPTIONS]

OPTIONS:
    -r, --rounds <N>        Rounds to run (default: 20)
    -a, --assets <N>        Assets registered per round (default: 64)
    -f, --frames <N>        Frames in flight (default: 2)
    -c, --capacity <BYTES>  Initial ASSET section capacity (default: 4096)
    -e, --remove-every <N>  Remove every N-th live asset per round (default: 3)
    -p, --packing <KIND>    separate | interleaved (default: separate)
    -h, --help              Show this help message"
    );
}

/// Asset of a layout and size derived from its id.
fn workload_asset(id: u64) -> Asset {
    let vertices = 4 + (id % 13) as usize * 3;
    let indices = vertices * 3 / 2;
    let build: fn(u64, usize, usize) -> Asset = match id % 4 {
        0 => mapped_3d,
        1 => unmapped_3d,
        2 => mapped_2d,
        _ => unmapped_2d,
    };
    build(id, vertices, indices)
}

fn run(options: &Options) -> anyhow::Result<()> {
    let config = AllocatorConfig::new()
        .with_capacities(options.asset_capacity, 1024, 1024)
        .with_frames_in_flight(options.frames)
        .with_packing(options.packing);
    let mut harness = HostHarness::new(config).context("failed to create render context")?;
    let globals = GlobalUniforms::default();
    let mut next_id = 0;

    for round in 0..options.rounds {
        let batch: Vec<Asset> = (next_id..next_id + options.assets)
            .map(workload_asset)
            .collect();
        next_id += options.assets;
        harness
            .register_all(batch)
            .with_context(|| format!("registration failed in round {round}"))?;

        let context = harness.context_mut();
        for frame in 0..options.frames {
            context.update_global_uniforms(frame, &globals)?;
        }
        context.set_ui_batches(vec![ui_batch(1 + round as usize % 4)])?;

        let mut snapshot = harness.snapshot()?;
        let doomed: Vec<AssetId> = harness
            .context()
            .assets()
            .iter()
            .map(Asset::id)
            .step_by(options.remove_every.max(1))
            .collect();
        for id in doomed {
            harness.context_mut().remove_asset(id)?;
            snapshot.forget(id);
        }
        harness
            .verify(&snapshot)
            .with_context(|| format!("data corrupted in round {round}"))?;

        info!(
            round,
            live = harness.context().assets().len(),
            reallocations = harness.reallocations(),
            "round complete"
        );
    }

    report(&harness);

    let backend = harness.finish()?;
    if backend.live_buffers() != 0 {
        bail!("{} buffers leaked", backend.live_buffers());
    }
    Ok(())
}

fn report(harness: &HostHarness) {
    let context = harness.context();
    for section in Section::ALL {
        let usage = context.section_usage(section);
        info!(?section, size = usage.size, cap = usage.cap, "section usage");
    }

    let log = harness.log();
    info!(
        live_assets = context.assets().len(),
        reallocations = harness.reallocations(),
        uniform_generation = context.uniforms().generation(),
        mapped_3d_sets = context
            .descriptor_sets()
            .pool_capacity(DescriptorCategory::Mapped3D),
        frame_waits = log.count(|e| *e == BackendEvent::WaitFrames),
        copies = log.count(|e| matches!(e, BackendEvent::Copy { .. })),
        uploads = log.count(|e| matches!(e, BackendEvent::Upload { .. })),
        "workload finished"
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(options) = Options::from_args()? else {
        return Ok(());
    };
    info!(?options, "starting stress workload");
    run(&options)
}
