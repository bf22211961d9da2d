pub mod client;
pub mod config;
pub mod session;
pub mod uploads;

pub use client::{GenerationError, GoogleGenerationClient, ImageProvider};
pub use config::EngineConfig;
pub use session::{Session, Submission};
