//! Example: upload a volume into an in-memory store
//!
//! Run with: cargo run --example upload_stack [config.json]
//!
//! Without a config file a synthetic 100 x 256 x 256 volume is uploaded to
//! `bossdb://demo/synthetic/em`. Set `RUST_LOG=boss_ingest=debug` for
//! per-slab logging.

use anyhow::Context;
use boss_ingest::upload::LogProgress;
use boss_ingest::{MemoryRemote, SessionOutcome, UploadConfig, UploadSession};
use ndarray::Array3;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boss_ingest=info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => UploadConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => {
            let mut config = UploadConfig::new("bossdb://demo/synthetic/em");
            config.voxel_size = [30.0, 4.0, 4.0];
            config
        }
    };

    let remote = Arc::new(MemoryRemote::new());
    let session = UploadSession::new(Arc::clone(&remote), config.clone())
        .with_progress(Arc::new(LogProgress));

    // Ctrl-C stops the upload at the next slab boundary
    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = if config.data_dir.is_some() {
        session.upload_directory().await?
    } else {
        let volume = Array3::from_shape_fn((100, 256, 256), |(z, y, x)| (((z + y) ^ x) % 256) as u8);
        session.upload_array(volume).await?
    };

    match outcome {
        SessionOutcome::Completed(report) => {
            println!("Session {}", report.session_id);
            println!("  Volume:   {}", report.geometry.summary());
            println!("  Slabs:    {}", report.stats.slabs_written);
            println!("  Retries:  {}", report.stats.retries);
            println!("  Bytes:    {}", report.stats.bytes_written);
            println!(
                "  Elapsed:  {} ms",
                (report.finished_at - report.started_at).num_milliseconds()
            );
            println!("  Resources created: {}", remote.created().join(", "));
            println!("  View at:  {}", report.neuroglancer_url());
        }
        SessionOutcome::DestinationPopulated(uri) => {
            println!("{uri} already holds data; set \"overwrite\": true to replace it");
        }
    }

    Ok(())
}
