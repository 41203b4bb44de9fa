pub mod config;
pub mod data;
pub mod error;
pub mod loop_;
pub mod metrics;
pub mod observer;
pub mod progress;
pub mod state;
pub mod synthetic;
pub mod validator;

pub use config::{Hyperparameters, TrainingConfig};
pub use data::{BatchLoader, DataLoader, Dataset, Mosaic, Sample};
pub use error::{Result, TrainErr};
pub use loop_::{Phase, TrainingLoop};
pub use metrics::TrainMetrics;
pub use observer::{BatchReport, NoopObserver, TrainObserver};
pub use state::StepState;
pub use validator::Validator;
