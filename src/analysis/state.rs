//! Latest analysis result, shared between the analysis loop and the HTTP
//! handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::error::InferenceError;

/// Point-in-time copy of [`AnalysisState`], serialized as-is by `/analysis`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSnapshot {
    pub enabled: bool,
    pub description: String,
    pub timestamp: Option<String>,
    /// Seconds spent on the last successful cycle
    pub processing_time: Option<f64>,
    pub error: Option<String>,
    pub frame_count: u64,
}

#[derive(Default)]
struct AnalysisResult {
    description: String,
    timestamp: Option<String>,
    processing_time: Option<f64>,
    error: Option<String>,
    frame_count: u64,
}

/// Each cycle's result is applied under one lock, so readers see whole
/// results. `enabled` lives outside the lock.
pub struct AnalysisState {
    result: Mutex<AnalysisResult>,
    enabled: AtomicBool,
}

impl AnalysisState {
    pub fn new(enabled: bool) -> Self {
        Self {
            result: Mutex::new(AnalysisResult::default()),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        let result = self.lock();
        AnalysisSnapshot {
            enabled: self.is_enabled(),
            description: result.description.clone(),
            timestamp: result.timestamp.clone(),
            processing_time: result.processing_time,
            error: result.error.clone(),
            frame_count: result.frame_count,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Flip the enabled flag and return the new value.
    pub fn toggle(&self) -> bool {
        !self.enabled.fetch_xor(true, Ordering::SeqCst)
    }

    /// Store a successful description; clears any previous error. Returns
    /// the new frame count.
    pub fn record_success(&self, description: String, processing_time: Duration) -> u64 {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut result = self.lock();
        result.description = description;
        result.timestamp = Some(timestamp);
        result.processing_time = Some((processing_time.as_secs_f64() * 100.0).round() / 100.0);
        result.error = None;
        result.frame_count += 1;
        result.frame_count
    }

    /// Keep the last description, only replace the error.
    pub fn record_failure(&self, error: &InferenceError) {
        self.lock().error = Some(error.to_string());
    }

    fn lock(&self) -> MutexGuard<'_, AnalysisResult> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
