//! Background analysis loop.
//!
//! Every cycle checks the enabled flag, snapshots the frame bus, shrinks and
//! encodes the frame, asks the vision model for a description and stores the
//! outcome in [`AnalysisState`]. An in-flight request is never cancelled;
//! toggling only affects the next cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::client::VisionModel;
use crate::analysis::pacing::{Backoff, Pacing};
use crate::analysis::state::AnalysisState;
use crate::analysis::text::clean_response;
use crate::capture::encoder::encode_frame_scaled;
use crate::capture::Frame;
use crate::error::InferenceError;
use crate::pipeline::FrameBus;
use crate::AnalysisConfig;

/// What a single cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Disabled,
    WaitingForFrame,
    Analyzed,
    Failed,
}

pub struct AnalysisService<M> {
    model: M,
    config: AnalysisConfig,
    bus: Arc<FrameBus>,
    state: Arc<AnalysisState>,
    backoff: Backoff,
}

impl<M: VisionModel> AnalysisService<M> {
    pub fn new(
        model: M,
        config: AnalysisConfig,
        bus: Arc<FrameBus>,
        state: Arc<AnalysisState>,
    ) -> Self {
        let backoff = Backoff::new(Pacing::from(&config));
        Self {
            model,
            config,
            bus,
            state,
            backoff,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.backoff.consecutive_errors()
    }

    /// Run one cycle and return what happened plus how long to sleep before
    /// the next one.
    pub async fn run_cycle(&mut self) -> (Cycle, Duration) {
        if !self.state.is_enabled() {
            return (Cycle::Disabled, self.config.poll_interval());
        }

        let Some(published) = self.bus.snapshot() else {
            debug!("No frame yet, waiting");
            return (Cycle::WaitingForFrame, self.config.poll_interval());
        };

        let started = Instant::now();
        let outcome = self.analyze(published.frame.clone()).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(description) => {
                let frame_count = self.state.record_success(description, elapsed);
                metrics::counter!("analysis_cycles_total", "outcome" => "success").increment(1);
                info!(
                    frame_count,
                    version = published.version,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Analysis updated"
                );
                (Cycle::Analyzed, self.backoff.on_success(elapsed))
            }
            Err(err) => {
                self.state.record_failure(&err);
                metrics::counter!("analysis_cycles_total", "outcome" => "failure").increment(1);
                let delay = self.backoff.on_failure();
                warn!(
                    error = %err,
                    consecutive_errors = self.backoff.consecutive_errors(),
                    retry_in_ms = delay.as_millis() as u64,
                    "Analysis failed"
                );
                (Cycle::Failed, delay)
            }
        }
    }

    async fn analyze(&self, frame: Frame) -> Result<String, InferenceError> {
        let (max_width, quality) = (self.config.max_width, self.config.jpeg_quality);
        let jpeg = tokio::task::spawn_blocking(move || encode_frame_scaled(&frame, max_width, quality))
            .await
            .map_err(|e| InferenceError::Other(format!("Snapshot encode task failed: {e}")))?
            .map_err(|e| InferenceError::Other(format!("Snapshot encode failed: {e}")))?;

        let raw = self.model.describe(jpeg).await?;
        Ok(clean_response(&raw))
    }

    /// Loop forever; the task lives as long as the process.
    pub async fn run(mut self) {
        info!(
            model = %self.config.model,
            endpoint = %self.config.endpoint,
            interval_ms = self.config.interval_ms,
            enabled = self.state.is_enabled(),
            "Analysis loop started"
        );
        loop {
            let (_, delay) = self.run_cycle().await;
            tokio::time::sleep(delay).await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()>
    where
        M: 'static,
    {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedModel {
        calls: AtomicUsize,
        replies: Mutex<VecDeque<Result<String, InferenceError>>>,
    }

    impl ScriptedModel {
        fn with_replies(replies: Vec<Result<String, InferenceError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                replies: Mutex::new(replies.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn describe(&self, jpeg: Bytes) -> Result<String, InferenceError> {
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("A quiet room.".into()))
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            interval_ms: 5_000,
            backoff_cap_ms: 30_000,
            min_delay_ms: 500,
            poll_interval_ms: 1_000,
            ..crate::Config::default().analysis
        }
    }

    fn service(
        model: Arc<ScriptedModel>,
        enabled: bool,
        with_frame: bool,
    ) -> (AnalysisService<Arc<ScriptedModel>>, Arc<AnalysisState>) {
        let bus = Arc::new(FrameBus::new());
        if with_frame {
            bus.publish(Frame::rgb24(1, 8, 8, vec![90u8; 8 * 8 * 3]));
        }
        let state = Arc::new(AnalysisState::new(enabled));
        (AnalysisService::new(model, config(), bus, state.clone()), state)
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_cycle_never_submits() {
        let model = ScriptedModel::with_replies(vec![]);
        let (mut service, _) = service(model.clone(), false, true);

        for _ in 0..3 {
            assert_eq!(service.run_cycle().await, (Cycle::Disabled, Duration::from_secs(1)));
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bus_waits_without_submitting() {
        let model = ScriptedModel::with_replies(vec![]);
        let (mut service, _) = service(model.clone(), true, false);

        assert_eq!(service.run_cycle().await.0, Cycle::WaitingForFrame);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_publishes_cleaned_description() {
        let model = ScriptedModel::with_replies(vec![Ok(
            "<think>hmm</think>Cat sitting on a chair.\n\n  \nNo other objects.".into(),
        )]);
        let (mut service, state) = service(model.clone(), true, true);

        let (cycle, delay) = service.run_cycle().await;
        assert_eq!(cycle, Cycle::Analyzed);
        assert_eq!(delay, Duration::from_secs(5));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.description, "Cat sitting on a chair.\nNo other objects.");
        assert_eq!(snapshot.frame_count, 1);
        assert_eq!(snapshot.error, None);
        assert!(snapshot.timestamp.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_and_success_resets() {
        let model = ScriptedModel::with_replies(vec![
            Err(InferenceError::Timeout(Duration::from_secs(60))),
            Err(InferenceError::ConnectionUnavailable("http://localhost:11434".into())),
            Err(InferenceError::Other("HTTP 500".into())),
        ]);
        let (mut service, state) = service(model.clone(), true, true);

        let mut delays = Vec::new();
        for _ in 0..3 {
            let (cycle, delay) = service.run_cycle().await;
            assert_eq!(cycle, Cycle::Failed);
            delays.push(delay.as_secs());
        }
        assert_eq!(delays, [5, 10, 15]);
        assert_eq!(service.consecutive_errors(), 3);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("HTTP 500"));
        assert_eq!(snapshot.frame_count, 0);

        let (cycle, delay) = service.run_cycle().await;
        assert_eq!(cycle, Cycle::Analyzed);
        assert_eq!(delay, Duration::from_secs(5));
        assert_eq!(service.consecutive_errors(), 0);
        assert_eq!(state.snapshot().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn toggling_back_on_resumes_next_cycle() {
        let model = ScriptedModel::with_replies(vec![]);
        let (mut service, state) = service(model.clone(), false, true);

        assert_eq!(service.run_cycle().await.0, Cycle::Disabled);
        assert!(state.toggle());
        assert_eq!(service.run_cycle().await.0, Cycle::Analyzed);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_pauses_while_disabled() {
        let model = ScriptedModel::with_replies(vec![]);
        let (service, state) = service(model.clone(), true, true);
        let handle = service.spawn();

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        let while_enabled = model.calls();
        assert!(while_enabled >= 2, "only {while_enabled} submissions");

        state.set_enabled(false);
        // Let any cycle scheduled before the flag flipped drain
        tokio::time::sleep(Duration::from_secs(6)).await;
        let drained = model.calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(model.calls(), drained);

        state.set_enabled(true);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(model.calls() > drained);

        handle.abort();
    }
}
