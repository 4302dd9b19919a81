//! main.rs — Locus demo simulator entry point
//!
//! Wires a gateway, a set of ranging nodes, and (optionally) a dedicated
//! reference beacon onto one in-process airspace, walks the beacon along
//! the configured course, and prints the collect table the gateway hands
//! back — the same output the deployed host collector shows.

mod airspace;
mod demo;
mod host_bus;
mod scenario;

use clap::Parser;
use tracing::info;

use scenario::SimConfig;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "locus-sim", about = "Locus localization protocol demo simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Run a dedicated reference-beacon device instead of relaying beacon
    /// commands through the gateway
    #[arg(long)]
    split: bool,
    /// Emit the collect table as JSON instead of the host-tool text format
    #[arg(long)]
    json: bool,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locus_sim=info,locus_node=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = SimConfig::load(&args.config)?;

    info!(
        "📡 Locus demo starting — {} nodes, {} waypoints, threshold {} m",
        cfg.course.device_hw_ids.len(),
        cfg.course.waypoints.len(),
        cfg.protocol.threshold_m
    );

    let slots = demo::run(&cfg, args.split)?;

    if args.json {
        let rows: Vec<serde_json::Value> = slots
            .iter()
            .enumerate()
            .map(|(id, pos)| {
                if pos.is_empty() {
                    serde_json::json!({ "id": id, "estimated": null })
                } else {
                    serde_json::json!({ "id": id, "estimated": { "x": pos.x, "y": pos.y } })
                }
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", demo::render_table(&slots));
    }

    Ok(())
}
