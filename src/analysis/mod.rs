//! Periodic scene description through an external vision model.

pub mod client;
pub mod pacing;
pub mod service;
pub mod state;
pub mod text;

pub use client::{OllamaClient, VisionModel};
pub use service::{AnalysisService, Cycle};
pub use state::{AnalysisSnapshot, AnalysisState};
