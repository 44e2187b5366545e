//! Edge pipeline stages
//!
//! One arriving window runs through the ingestion router: decode, device
//! tagging, optional local inference, optional outlier validation, then
//! persistence. The window builder lives on the sensor side of the wire and
//! is used by capture sources and the simulator.
//!
//! ## Module organization
//!
//! - `types` - samples, windows, records, wire shapes
//! - `window` - fixed-size window accumulation
//! - `validator` - outlier-based pass/fail gate
//! - `predictor` - scale / gate / reduce / classify
//! - `router` - the per-message entry point

pub mod predictor;
pub mod router;
pub mod types;
pub mod validator;
pub mod window;

pub use predictor::Predictor;
pub use router::{run_ingestion, IngestionRouter};
pub use types::{Record, Sample, SensorMessage, TrainingBatch, Validation, Window};
pub use validator::{Validator, Verdict};
pub use window::WindowBuilder;
