//! Configuration loaded from environment variables
//!
//! Every field has a default, so the pipeline starts in a degraded but
//! functional mode on a bare environment. `.env` files are honored via
//! dotenv in `main`.

use std::env;

/// One broker endpoint: where to reach it, and which topic to use there.
#[derive(Debug, Clone)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub topic: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Edge node identifier stamped on outbound batches.
    pub client_id: String,

    /// Local inference stage enable flag.
    pub inference_enable: bool,
    pub inference_model: String,
    pub window_size: usize,

    /// Outlier validation stage enable flag.
    pub outlier_enable: bool,
    pub outlier_model: String,
    /// Minimum inlier share, integer percent. A window at exactly this
    /// share passes.
    pub outlier_drop_rate: u32,

    /// Dimensionality reduction enable flag (required for cloud sync).
    pub reduction_enable: bool,
    pub reduction_model: String,

    /// Directory holding the pre-fitted model files.
    pub model_dir: String,

    /// Sensor-facing broker (incoming windows).
    pub sensor_broker: BrokerEndpoint,
    /// Cloud-facing broker (outgoing training batches).
    pub cloud_broker: BrokerEndpoint,

    /// Minutes between sync cycles; also the fetch look-back horizon.
    pub sync_period_minutes: u64,

    pub db_path: String,
    pub db_collection: String,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables and defaults:
    /// - `CLIENT_ID` (Edge_UB01)
    /// - `INFERENCE_ENABLE` (false), `INFERENCE_MODEL` (CNN_LSTM)
    /// - `SLIDING_WINDOW_SIZE` (25)
    /// - `OUTLIER_ENABLE` (true), `OUTLIER_MODEL` (IsolationForest),
    ///   `OUTLIER_DROP_RATE` (80)
    /// - `REDUCTION_ENABLE` (true), `REDUCTION_MODEL` (PCA)
    /// - `MODEL_DIR` (models)
    /// - `SENSOR_MQTT_BROKER` / `SENSOR_MQTT_PORT` / `SENSOR_MQTT_TOPIC`
    ///   (intec-emqx-broker / 1883 / prediction)
    /// - `CLOUD_MQTT_BROKER` / `CLOUD_MQTT_PORT` / `TRAINING_MQTT_TOPIC`
    ///   (intec-emqx-broker / 1883 / cloud/training_data)
    /// - `CLOUD_SYNC_PERIOD` (1, minutes)
    /// - `DB_PATH` (edgeflow.db), `DB_COLLECTION` (sensors)
    pub fn from_env() -> Self {
        Self {
            client_id: env_or("CLIENT_ID", "Edge_UB01"),

            inference_enable: env_flag("INFERENCE_ENABLE", false),
            inference_model: env_or("INFERENCE_MODEL", "CNN_LSTM"),
            window_size: env_parse("SLIDING_WINDOW_SIZE", 25),

            outlier_enable: env_flag("OUTLIER_ENABLE", true),
            outlier_model: env_or("OUTLIER_MODEL", "IsolationForest"),
            outlier_drop_rate: env_parse("OUTLIER_DROP_RATE", 80),

            reduction_enable: env_flag("REDUCTION_ENABLE", true),
            reduction_model: env_or("REDUCTION_MODEL", "PCA"),

            model_dir: env_or("MODEL_DIR", "models"),

            sensor_broker: BrokerEndpoint {
                host: env_or("SENSOR_MQTT_BROKER", "intec-emqx-broker"),
                port: env_parse("SENSOR_MQTT_PORT", 1883),
                topic: env_or("SENSOR_MQTT_TOPIC", "prediction"),
            },
            cloud_broker: BrokerEndpoint {
                host: env_or("CLOUD_MQTT_BROKER", "intec-emqx-broker"),
                port: env_parse("CLOUD_MQTT_PORT", 1883),
                topic: env_or("TRAINING_MQTT_TOPIC", "cloud/training_data"),
            },

            sync_period_minutes: env_parse("CLOUD_SYNC_PERIOD", 1),

            db_path: env_or("DB_PATH", "edgeflow.db"),
            db_collection: env_or("DB_COLLECTION", "sensors"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so concurrent env mutation cannot race.
    #[test]
    fn test_defaults_and_overrides() {
        let vars = [
            "CLIENT_ID",
            "INFERENCE_ENABLE",
            "SLIDING_WINDOW_SIZE",
            "OUTLIER_DROP_RATE",
            "REDUCTION_MODEL",
            "SENSOR_MQTT_TOPIC",
            "CLOUD_SYNC_PERIOD",
            "DB_COLLECTION",
        ];
        for var in vars {
            env::remove_var(var);
        }

        let config = Config::from_env();
        assert_eq!(config.client_id, "Edge_UB01");
        assert!(!config.inference_enable);
        assert!(config.outlier_enable);
        assert_eq!(config.window_size, 25);
        assert_eq!(config.outlier_drop_rate, 80);
        assert_eq!(config.reduction_model, "PCA");
        assert_eq!(config.sensor_broker.topic, "prediction");
        assert_eq!(config.cloud_broker.topic, "cloud/training_data");
        assert_eq!(config.sync_period_minutes, 1);
        assert_eq!(config.db_collection, "sensors");

        env::set_var("CLIENT_ID", "Edge_TEST");
        env::set_var("INFERENCE_ENABLE", "True");
        env::set_var("SLIDING_WINDOW_SIZE", "50");
        env::set_var("OUTLIER_DROP_RATE", "90");
        env::set_var("REDUCTION_MODEL", "AE");
        env::set_var("SENSOR_MQTT_TOPIC", "sensor/data");
        env::set_var("CLOUD_SYNC_PERIOD", "5");
        env::set_var("DB_COLLECTION", "windows");

        let config = Config::from_env();
        assert_eq!(config.client_id, "Edge_TEST");
        assert!(config.inference_enable);
        assert_eq!(config.window_size, 50);
        assert_eq!(config.outlier_drop_rate, 90);
        assert_eq!(config.reduction_model, "AE");
        assert_eq!(config.sensor_broker.topic, "sensor/data");
        assert_eq!(config.sync_period_minutes, 5);
        assert_eq!(config.db_collection, "windows");

        for var in vars {
            env::remove_var(var);
        }
    }
}
