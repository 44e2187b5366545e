//! Sensor simulator (standalone, development/testing only)
//!
//! Runs the full loop in one process: a synthetic sensor pushes samples
//! through the window builder and publishes completed windows to the
//! sensor topic of an in-process hub, the edge pipeline consumes them, and
//! a logger subscription prints every training batch that reaches the
//! cloud topic. Missing model files are seeded with small demo fits so the
//! whole path is exercised out of the box.

use chrono::Utc;
use edgeflow::config::Config;
use edgeflow::pipeline::types::{timestamp_string, Sample, SensorMessage, CHANNELS};
use edgeflow::pipeline::{TrainingBatch, WindowBuilder};
use edgeflow::transport::loopback::{LoopbackHub, LoopbackTransport};
use edgeflow::transport::{ConnectionManager, InboundMessage, Transport};
use edgeflow::{models, run_edge, SCALER_MODEL};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Write a small demo fit for every model file the configured stages need,
/// leaving existing files untouched.
fn seed_demo_models(config: &Config) -> std::io::Result<()> {
    fs::create_dir_all(&config.model_dir)?;
    let width = CHANNELS.len();
    let reduced_width = 3;

    let write_if_absent = |name: &str, body: serde_json::Value| -> std::io::Result<()> {
        let path = models::model_path(&config.model_dir, name);
        if path.exists() {
            return Ok(());
        }
        log::info!("🔧 Seeding demo model file: {}", path.display());
        fs::write(path, serde_json::to_string_pretty(&body).unwrap())
    };

    write_if_absent(
        SCALER_MODEL,
        serde_json::json!({
            "mean": vec![0.0; width],
            "scale": vec![1.0; width],
        }),
    )?;

    write_if_absent(
        &config.outlier_model,
        serde_json::json!({
            "name": config.outlier_model,
            "center": vec![0.0; width],
            "scale": vec![1.0; width],
            "threshold": 4.0,
        }),
    )?;

    let mut components = vec![vec![0.0; width]; reduced_width];
    for (k, row) in components.iter_mut().enumerate() {
        row[k] = 1.0;
    }
    write_if_absent(
        &config.reduction_model,
        serde_json::json!({
            "kind": "projection",
            "mean": vec![0.0; width],
            "components": components,
        }),
    )?;

    let classes = 4;
    let input_width = config.window_size * reduced_width;
    let mut weights = vec![vec![0.0; input_width]; classes];
    for (i, row) in weights.iter_mut().enumerate() {
        for (j, w) in row.iter_mut().enumerate() {
            if j % classes == i {
                *w = 0.05;
            }
        }
    }
    write_if_absent(
        &config.inference_model,
        serde_json::json!({
            "layers": [{
                "weights": weights,
                "bias": vec![0.0; classes],
                "activation": "linear",
            }],
        }),
    )?;

    Ok(())
}

/// Synthetic channel readings: smooth per-channel oscillation shifted by the
/// current activity, small enough to stay inside the demo outlier envelope.
fn synth_sample(tick: u64, activity: i64) -> Sample {
    let values = (0..CHANNELS.len())
        .map(|c| {
            let phase = (tick as f64 * 0.25) + c as f64;
            0.5 * phase.sin() + activity as f64 * 0.1
        })
        .collect();

    Sample {
        at: Utc::now(),
        values,
        label: Some(activity),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    let sensor_name = std::env::var("SENSOR_NAME").unwrap_or_else(|_| "sensor01".to_string());
    let sampling_rate: u64 = env_parse("SAMPLING_RATE", 50);
    let work_minutes: u64 = env_parse("WORK_TIME", 1);
    let work_time = Duration::from_secs(work_minutes * 60);

    log::info!("📡 Sensor simulator activated");
    log::info!("   Device: {}", sensor_name);
    log::info!("   Window size: {}", config.window_size);
    log::info!("   Sampling rate: {} Hz", sampling_rate);
    log::info!("   Runtime: {} min", work_minutes);

    seed_demo_models(&config)?;

    let hub = LoopbackHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Edge pipeline on the same hub
    let subscriber = ConnectionManager::new(
        format!("{}_Subscriber", config.client_id),
        config.sensor_broker.clone(),
        Arc::new(LoopbackTransport::new(hub.clone())),
    );
    let publisher = ConnectionManager::new(
        format!("{}_Publisher", config.client_id),
        config.cloud_broker.clone(),
        Arc::new(LoopbackTransport::new(hub.clone())),
    );
    let edge = tokio::spawn(run_edge(
        config.clone(),
        subscriber,
        publisher,
        shutdown_rx.clone(),
    ));

    // Print every training batch that reaches the cloud topic
    let cloud_tap = LoopbackTransport::new(hub.clone());
    let (batch_tx, mut batch_rx) = mpsc::channel::<InboundMessage>(100);
    cloud_tap
        .subscribe(&config.cloud_broker.topic, batch_tx)
        .await?;
    tokio::spawn(async move {
        while let Some(msg) = batch_rx.recv().await {
            match serde_json::from_slice::<TrainingBatch>(&msg.payload) {
                Ok(batch) => log::info!(
                    "☁️ Training batch from {}: {} records",
                    batch.edge_id,
                    batch.data.len()
                ),
                Err(e) => log::warn!("⚠️ Undecodable training batch: {}", e),
            }
        }
    });

    // Sensor loop: accumulate, publish one message per completed window
    let sensor_conn = ConnectionManager::new(
        format!("{}_Sensor", sensor_name),
        config.sensor_broker.clone(),
        Arc::new(LoopbackTransport::new(hub.clone())),
    );
    {
        let mut shutdown = shutdown_rx.clone();
        sensor_conn.connect_with_retry(&mut shutdown).await?;
    }

    let started = Instant::now();
    let mut builder = WindowBuilder::new(config.window_size);
    let mut tick = 0u64;

    loop {
        if started.elapsed() >= work_time {
            log::info!(
                "🔴 {} is done, runtime was {} min",
                sensor_name,
                work_minutes
            );
            break;
        }
        let activity = 1 + ((started.elapsed().as_secs() / 10) % 4) as i64;
        if let Some(window) = builder.push(synth_sample(tick, activity)) {
            let msg = SensorMessage {
                device: Some(sensor_name.clone()),
                date: window.captured_at().map(timestamp_string),
                window_size: Some(config.window_size),
                data: Some(window.to_channel_data()),
                label: window.label(),
                ..SensorMessage::default()
            };
            sensor_conn.publish(serde_json::to_vec(&msg)?).await?;
            log::info!(
                "📡 {} published window (label {})",
                sensor_name,
                activity
            );
        }

        tick += 1;
        sleep(Duration::from_millis(1000 / sampling_rate.max(1))).await;
    }

    let _ = shutdown_tx.send(true);
    match edge.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!("❌ Edge pipeline error: {}", e),
        Err(e) => log::error!("❌ Edge pipeline task failed: {}", e),
    }

    Ok(())
}
