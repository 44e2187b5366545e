//! Ingestion router - the per-message entry point
//!
//! One delivered payload runs decode -> device tagging -> predictor ->
//! validator -> store, each stage with an explicit short-circuit. Errors are
//! handled where they originate; nothing here stops the delivery loop.

use super::predictor::Predictor;
use super::types::{
    channel_matrix, timestamp_string, Record, SensorMessage, Validation, UNKNOWN_DEVICE,
};
use super::validator::{Validator, Verdict};
use crate::store::RecordStore;
use crate::transport::InboundMessage;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub struct IngestionRouter {
    window_size: usize,
    /// None when inference is disabled or its models failed to load.
    predictor: Option<Predictor>,
    /// None when outlier detection is disabled or its model failed to load.
    validator: Option<Validator>,
    outlier_model_name: Option<String>,
    store: Arc<dyn RecordStore>,
    /// Devices seen since startup; drives the one-shot new-device log.
    known_devices: HashSet<String>,
}

impl IngestionRouter {
    pub fn new(
        window_size: usize,
        predictor: Option<Predictor>,
        validator: Option<Validator>,
        outlier_model_name: Option<String>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            window_size,
            predictor,
            validator,
            outlier_model_name,
            store,
            known_devices: HashSet::new(),
        }
    }

    /// Process one delivered payload end to end.
    pub async fn handle_payload(&mut self, payload: &[u8]) {
        // Step 1: decode. Non-JSON payloads are wrapped so the data
        // extraction below rejects them gracefully; malformed JSON is
        // discarded outright (retrying identical input cannot succeed).
        let text = String::from_utf8_lossy(payload);
        let msg: SensorMessage = if text.trim_start().starts_with('{') {
            match serde_json::from_str(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    log::warn!("⚠️ Discarding undecodable message: {}", e);
                    return;
                }
            }
        } else {
            SensorMessage {
                raw_data: Some(text.into_owned()),
                ..SensorMessage::default()
            }
        };

        // Step 2: device tagging and one-shot new-device announcement.
        let device = msg.device.unwrap_or_else(|| UNKNOWN_DEVICE.to_string());
        if self.known_devices.insert(device.clone()) {
            log::info!("🆕 New device started publishing: {}", device);
        }

        let data = match msg.data {
            Some(data) => data,
            None => {
                log::warn!("⚠️ Message from {} carries no window data, discarding", device);
                return;
            }
        };

        let rows = match channel_matrix(&data, self.window_size) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("⚠️ Discarding message from {}: {}", device, e);
                return;
            }
        };

        // Step 3: local inference. Failures are non-fatal; the sensor's own
        // label survives unless a fresh prediction replaces it.
        let mut label = msg.label;
        if let Some(predictor) = &self.predictor {
            if let Some(predicted) = predictor.predict(&rows) {
                label = Some(predicted);
            }
        }

        // Step 4: validation. A failed window is dropped, never stored.
        let (validation, outlier_model) = match &self.validator {
            Some(validator) => match validator.validate(&rows) {
                Verdict::Pass => (Validation::Checked, self.outlier_model_name.clone()),
                Verdict::Fail => {
                    log::warn!("❌ Window from {} failed validation, discarded", device);
                    return;
                }
            },
            None => (Validation::Unchecked, None),
        };

        let record = Record {
            device,
            date: msg.date.unwrap_or_else(|| timestamp_string(Utc::now())),
            data: Some(data),
            label,
            validation,
            outlier_model,
            processed: false,
        };

        // Step 5: persist. Insert failures are logged and swallowed; the
        // storage edge is at-most-once with no retry queue.
        if let Err(e) = self.store.insert(&record).await {
            log::error!("❌ Failed to store record: {}", e);
        }
    }
}

/// Delivery loop: feed every inbound message through the router until the
/// channel closes or shutdown is signalled. Messages are handled one at a
/// time, preserving per-device arrival order.
pub async fn run_ingestion(
    mut router: IngestionRouter,
    mut rx: mpsc::Receiver<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("📡 Ingestion loop started");

    loop {
        tokio::select! {
            delivered = rx.recv() => {
                match delivered {
                    Some(msg) => router.handle_payload(&msg.payload).await,
                    None => {
                        log::warn!("⚠️ Inbound channel closed, stopping ingestion");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                log::info!("👋 Ingestion loop shutting down");
                break;
            }
        }
    }
}
