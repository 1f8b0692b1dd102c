//! examscore-judges: Rubric judge implementations.
//!
//! Implements the `RubricJudge` trait for pre-recorded human score sheets
//! and for a remote reviewer service, and loads examscore configuration.

pub mod config;
pub mod error;
pub mod manual;
pub mod remote;

pub use config::{create_judge, load_config, ExamscoreConfig, JudgeConfig};
pub use error::JudgeError;
pub use manual::ManualJudge;
pub use remote::RemoteJudge;
