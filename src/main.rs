
pub mod config;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod sync;
pub mod transport;

use {
    config::Config,
    models::classifier::ClassifierModel,
    models::outlier::OutlierModel,
    models::reduction::ReductionModel,
    models::scaler::ScalerModel,
    models::{model_path, OutlierScorer, Reducer},
    pipeline::{run_ingestion, IngestionRouter, Predictor, Validator},
    std::sync::Arc,
    store::{sqlite::SqliteRecordStore, RecordStore},
    sync::Synchronizer,
    tokio::sync::{mpsc, watch},
    transport::{
        loopback::{LoopbackHub, LoopbackTransport},
        ConnectionManager, InboundMessage,
    },
};

/// Scaler file name under the model directory (fixed, not selectable).
pub const SCALER_MODEL: &str = "Scaler";

/// Inbound delivery channel depth.
const INBOUND_BUFFER: usize = 1000;

/// Pre-fitted model handles loaded once at startup. A missing or corrupt
/// file leaves its slot empty and only disables the dependent stage.
pub struct LoadedModels {
    pub scaler: Option<Arc<ScalerModel>>,
    pub outlier: Option<Arc<OutlierModel>>,
    pub reduction: Option<Arc<ReductionModel>>,
    pub classifier: Option<Arc<ClassifierModel>>,
}

/// Load every model the enabled stages need, logging per-stage outcome.
pub fn load_models(config: &Config) -> LoadedModels {
    let scaler = if config.inference_enable {
        match ScalerModel::load(&model_path(&config.model_dir, SCALER_MODEL)) {
            Ok(model) => {
                log::info!("✅ Scaler model loaded");
                Some(Arc::new(model))
            }
            Err(e) => {
                log::error!("❌ Scaler model unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    // The outlier model backs both the router's validator and the
    // predictor's gate.
    let outlier = if config.outlier_enable {
        match OutlierModel::load(&model_path(&config.model_dir, &config.outlier_model)) {
            Ok(model) => {
                log::info!("✅ Outlier model '{}' loaded", config.outlier_model);
                Some(Arc::new(model))
            }
            Err(e) => {
                log::error!("❌ Outlier model '{}' unavailable: {}", config.outlier_model, e);
                None
            }
        }
    } else {
        None
    };

    let reduction = if config.reduction_enable {
        match ReductionModel::load(&model_path(&config.model_dir, &config.reduction_model)) {
            Ok(model) => {
                log::info!("✅ Reduction model '{}' loaded", config.reduction_model);
                Some(Arc::new(model))
            }
            Err(e) => {
                log::error!(
                    "❌ Reduction model '{}' unavailable: {}",
                    config.reduction_model,
                    e
                );
                None
            }
        }
    } else {
        None
    };

    let classifier = if config.inference_enable {
        match ClassifierModel::load(&model_path(&config.model_dir, &config.inference_model)) {
            Ok(model) => {
                log::info!("✅ Inference model '{}' loaded", config.inference_model);
                Some(Arc::new(model))
            }
            Err(e) => {
                log::error!(
                    "❌ Inference model '{}' unavailable: {}",
                    config.inference_model,
                    e
                );
                None
            }
        }
    } else {
        None
    };

    LoadedModels {
        scaler,
        outlier,
        reduction,
        classifier,
    }
}

/// Assemble and run the edge pipeline against the given transports until
/// shutdown is signalled, then disconnect cleanly.
///
/// Each stage checks its own enablement: a missing model degrades that stage
/// only, never the process.
pub async fn run_edge(
    config: Config,
    subscriber: ConnectionManager,
    publisher: ConnectionManager,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let models = load_models(&config);

    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::open(
        &config.db_path,
        &config.db_collection,
    )?);

    let predictor = if config.inference_enable {
        match (
            &models.scaler,
            &models.outlier,
            &models.reduction,
            &models.classifier,
        ) {
            (Some(scaler), Some(outlier), Some(reduction), Some(classifier)) => {
                let gate = Arc::new(Validator::new(
                    outlier.clone() as Arc<dyn OutlierScorer>,
                    config.window_size,
                    config.outlier_drop_rate,
                ));
                log::info!(
                    "✅ Inference enabled with model '{}'",
                    config.inference_model
                );
                Some(Predictor::new(
                    scaler.clone(),
                    gate,
                    reduction.clone() as Arc<dyn Reducer>,
                    classifier.clone() as Arc<dyn models::Classifier>,
                ))
            }
            _ => {
                log::warn!("⚠️ Inference unavailable: required models missing");
                None
            }
        }
    } else {
        log::warn!("⚠️ Inference is disabled");
        None
    };

    let validator = match (config.outlier_enable, &models.outlier) {
        (true, Some(outlier)) => {
            log::info!(
                "✅ Outlier validation enabled with model '{}' (drop rate {}%)",
                config.outlier_model,
                config.outlier_drop_rate
            );
            Some(Validator::new(
                outlier.clone() as Arc<dyn OutlierScorer>,
                config.window_size,
                config.outlier_drop_rate,
            ))
        }
        (true, None) => {
            log::warn!("⚠️ Outlier validation unavailable, records stored unchecked");
            None
        }
        (false, _) => {
            log::warn!("⚠️ Outlier validation is disabled, records stored unchecked");
            None
        }
    };
    let outlier_model_name = validator.as_ref().map(|_| config.outlier_model.clone());

    // Both directions must be up before delivery starts; backoff never
    // blocks the delivery loop once connected.
    subscriber.connect_with_retry(&mut shutdown).await?;
    publisher.connect_with_retry(&mut shutdown).await?;

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_BUFFER);
    subscriber.subscribe(inbound_tx).await?;

    let router = IngestionRouter::new(
        config.window_size,
        predictor,
        validator,
        outlier_model_name,
        store.clone(),
    );
    let ingestion = tokio::spawn(run_ingestion(router, inbound_rx, shutdown.clone()));

    let publisher = Arc::new(publisher);
    let reducer = models.reduction.clone().map(|m| m as Arc<dyn Reducer>);
    let synchronizer = Synchronizer::new(
        config.client_id.clone(),
        config.sync_period_minutes,
        config.window_size,
        store.clone(),
        reducer,
        publisher.clone(),
    );
    let sync_task = tokio::spawn(synchronizer.run(shutdown.clone()));

    let _ = shutdown.changed().await;

    let _ = ingestion.await;
    let _ = sync_task.await;

    subscriber.disconnect().await;
    publisher.disconnect().await;
    log::info!("✅ Clean shutdown completed");
    Ok(())
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!("🚀 Starting edge data processing pipeline...");
    log::info!("📊 Configuration:");
    log::info!("   Client: {}", config.client_id);
    log::info!("   Window size: {}", config.window_size);
    log::info!(
        "   Inference: {} ({})",
        config.inference_enable,
        config.inference_model
    );
    log::info!(
        "   Outlier: {} ({}, drop rate {}%)",
        config.outlier_enable,
        config.outlier_model,
        config.outlier_drop_rate
    );
    log::info!(
        "   Reduction: {} ({})",
        config.reduction_enable,
        config.reduction_model
    );
    log::info!(
        "   Sensor broker: {}:{} [{}]",
        config.sensor_broker.host,
        config.sensor_broker.port,
        config.sensor_broker.topic
    );
    log::info!(
        "   Cloud broker: {}:{} [{}]",
        config.cloud_broker.host,
        config.cloud_broker.port,
        config.cloud_broker.topic
    );
    log::info!("   Sync period: {} min", config.sync_period_minutes);
    log::info!("   Store: {} [{}]", config.db_path, config.db_collection);

    // In-process hub wiring; a production deployment injects broker-backed
    // Transport implementations here instead.
    let hub = LoopbackHub::new();
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

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut edge = tokio::spawn(run_edge(config, subscriber, publisher, shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("👋 [EXITING] Disconnecting...");
            let _ = shutdown_tx.send(true);
            match (&mut edge).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("❌ Pipeline error during shutdown: {}", e),
                Err(e) => log::error!("❌ Pipeline task failed: {}", e),
            }
        }
        result = &mut edge => {
            match result {
                Ok(Ok(())) => log::info!("✅ Pipeline exited"),
                Ok(Err(e)) => log::error!("❌ Pipeline error: {}", e),
                Err(e) => log::error!("❌ Pipeline task failed: {}", e),
            }
        }
    }

    Ok(())
}
