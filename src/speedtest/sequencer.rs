//! The ordered, single-pass test run.

use crate::config::SpeedTestConfig;
use crate::i18n::{Translator, SHOW_MORE_KEY};
use crate::speedtest::{DisplaySink, PhaseError, SimulatedLink, TestResult, TestState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, warn};

const MIN_SAMPLE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1);

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// `Done` or `Error`
    pub state: TestState,
    pub result: TestResult,
    /// The phase failure that ended the run, if any
    pub error: Option<PhaseError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == TestState::Done
    }
}

/// Drives the simulated phases and reports through a `DisplaySink`.
///
/// Phases run strictly one after another: unloaded latency, download,
/// upload, loaded latency. `run` and `restart` take `&mut self`, so a new
/// run can never start while another is in flight.
pub struct Sequencer {
    link: SimulatedLink,
    state: TestState,
    result: TestResult,
    runs: u64,
}

impl Sequencer {
    pub fn new(config: SpeedTestConfig) -> Self {
        Self {
            link: SimulatedLink::new(config),
            state: TestState::Idle,
            result: TestResult::default(),
            runs: 0,
        }
    }

    pub fn state(&self) -> TestState {
        self.state
    }

    pub fn result(&self) -> TestResult {
        self.result
    }

    /// Completed or failed runs so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn config(&self) -> &SpeedTestConfig {
        self.link.config()
    }

    /// Run the full sequence once. Failures end in `TestState::Error` and are
    /// reported in the outcome, never raised.
    pub async fn run<S: DisplaySink>(&mut self, sink: &mut S) -> RunOutcome {
        if self.state != TestState::Idle {
            self.reset(sink);
        }
        self.execute(sink).await
    }

    /// Zero everything, collapse the more-info panel and run again.
    pub async fn restart<S: DisplaySink>(
        &mut self,
        sink: &mut S,
        translator: &Translator,
    ) -> RunOutcome {
        self.prepare_restart(sink, translator);
        self.execute(sink).await
    }

    /// The synchronous half of `restart`: back to `Idle` with zeroed fields
    /// and a collapsed panel. A following `run` starts straight away.
    pub fn prepare_restart<S: DisplaySink>(&mut self, sink: &mut S, translator: &Translator) {
        info!("Restarting speed test");
        self.reset(sink);
        sink.collapse_more_info(translator.lookup(SHOW_MORE_KEY));
    }

    fn reset<S: DisplaySink>(&mut self, sink: &mut S) {
        self.result = TestResult::default();
        sink.reset();
        sink.show_loading();
        self.enter(TestState::Idle, sink);
    }

    fn enter<S: DisplaySink>(&mut self, state: TestState, sink: &mut S) {
        if !self.state.can_transition_to(state) {
            warn!("Unexpected transition {} -> {}", self.state, state);
        }
        debug!("Speed test state: {} -> {}", self.state, state);
        self.state = state;
        sink.state_changed(state);
    }

    async fn execute<S: DisplaySink>(&mut self, sink: &mut S) -> RunOutcome {
        self.runs += 1;
        info!("Starting speed test run #{}", self.runs);

        match self.run_phases(sink).await {
            Ok(()) => {
                self.enter(TestState::Done, sink);
                info!(
                    "Speed test finished: {:.1} Mbps down, {:.1} Mbps up, {:.0}/{:.0} ms latency",
                    self.result.download_mbps,
                    self.result.upload_mbps,
                    self.result.latency_unloaded_ms,
                    self.result.latency_loaded_ms
                );
                RunOutcome {
                    state: TestState::Done,
                    result: self.result,
                    error: None,
                }
            }
            Err(e) => {
                error!("Speed test error: {}", e);
                self.enter(TestState::Error, sink);

                // Only the download figure is shown after a failure.
                let partial = TestResult {
                    download_mbps: self.result.download_mbps,
                    ..TestResult::default()
                };
                sink.show_error(&partial);

                RunOutcome {
                    state: TestState::Error,
                    result: self.result,
                    error: Some(e),
                }
            }
        }
    }

    async fn run_phases<S: DisplaySink>(&mut self, sink: &mut S) -> Result<(), PhaseError> {
        self.enter(TestState::MeasuringLatencyUnloaded, sink);
        self.measure_latency(false, sink).await?;

        self.enter(TestState::MeasuringDownload, sink);
        self.measure_download(sink).await?;

        self.enter(TestState::ResultVisible, sink);
        sink.show_result();

        self.enter(TestState::MeasuringUpload, sink);
        self.measure_upload(sink).await?;

        self.enter(TestState::MeasuringLatencyLoaded, sink);
        self.measure_latency(true, sink).await?;

        sink.set_download(self.result.download_mbps);
        sink.set_upload(self.result.upload_mbps);
        sink.set_latency_unloaded(self.result.latency_unloaded_ms);
        sink.set_latency_loaded(self.result.latency_loaded_ms);
        Ok(())
    }

    /// Average of the successful pings; fails only if every ping is lost.
    async fn measure_latency<S: DisplaySink>(
        &mut self,
        loaded: bool,
        sink: &mut S,
    ) -> Result<f64, PhaseError> {
        let attempted = self.link.config().latency_ping_count;
        let mut total = 0.0;
        let mut successful = 0usize;

        for attempt in 1..=attempted {
            match self.link.ping(loaded).await {
                Ok(latency) => {
                    total += latency;
                    successful += 1;
                }
                Err(e) => debug!("Ping {}/{} failed: {}", attempt, attempted, e),
            }
        }

        if successful == 0 {
            return Err(PhaseError::LatencyFailed { loaded, attempted });
        }

        let average = total / successful as f64;
        if loaded {
            self.result.latency_loaded_ms = average;
            sink.set_latency_loaded(average);
        } else {
            self.result.latency_unloaded_ms = average;
            sink.set_latency_unloaded(average);
        }
        Ok(average)
    }

    /// Parallel simulated connections sampled at a fixed interval until the
    /// phase duration elapses.
    async fn measure_download<S: DisplaySink>(&mut self, sink: &mut S) -> Result<f64, PhaseError> {
        let config = self.link.config().clone();
        let count = config.effective_connections();
        let bytes = Arc::new(AtomicU64::new(0));

        let mut connections = JoinSet::new();
        for id in 0..count {
            let connection = self.link.open_connection(id);
            connections.spawn(connection.run(Arc::clone(&bytes)));
        }
        debug!("Opened {} simulated download connections", count);

        let start = Instant::now();
        let deadline = sleep(config.download_duration);
        tokio::pin!(deadline);
        let period = config.sample_interval.max(MIN_SAMPLE_INTERVAL);
        let mut sampler = interval_at(start + period, period);
        let mut last_sample = start;
        let mut ended = 0usize;

        loop {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    // Bytes since the last tick still count toward the result.
                    if ended < count {
                        self.sample_download(&bytes, &mut last_sample, sink);
                    }
                    break;
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    match joined {
                        Ok(Err(e)) => debug!("Download connection ended: {}", e),
                        Ok(Ok(())) => {}
                        Err(e) => warn!("Download connection task failed: {}", e),
                    }
                    ended += 1;
                    if ended == count {
                        break;
                    }
                }

                _ = sampler.tick() => {
                    self.sample_download(&bytes, &mut last_sample, sink);
                }
            }
        }

        drop(sampler);
        connections.abort_all();

        if ended == count {
            self.result.download_mbps = 0.0;
            return Err(PhaseError::AllConnectionsFailed(count));
        }

        if self.result.download_mbps < config.download_floor_mbps {
            self.result.download_mbps = config.download_floor_mbps;
            sink.set_download(self.result.download_mbps);
        }
        Ok(self.result.download_mbps)
    }

    /// Throughput over the bytes accumulated since `last_sample`.
    fn sample_download<S: DisplaySink>(
        &mut self,
        bytes: &AtomicU64,
        last_sample: &mut Instant,
        sink: &mut S,
    ) {
        let now = Instant::now();
        let elapsed = now.duration_since(*last_sample).as_secs_f64();
        if elapsed > 0.0 {
            let sampled = bytes.swap(0, Ordering::Relaxed);
            let mbps = sampled as f64 * 8.0 / (elapsed * 1_000_000.0);
            self.result.download_mbps = mbps;
            sink.set_download(mbps);
            *last_sample = now;
        }
    }

    async fn measure_upload<S: DisplaySink>(&mut self, sink: &mut S) -> Result<f64, PhaseError> {
        let floor = self.link.config().upload_floor_mbps;
        let speed = self
            .link
            .upload()
            .await
            .map_err(PhaseError::UploadFailed)?
            .max(floor);

        self.result.upload_mbps = speed;
        sink.set_upload(speed);
        Ok(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FaultPlan;
    use crate::i18n::EmbeddedCatalogSource;
    use crate::page::Page;
    use crate::speedtest::{DisplayEvent, RecordingSink};
    use crate::storage::MemoryPreferenceStore;
    use std::time::Duration;

    fn config(faults: FaultPlan) -> SpeedTestConfig {
        SpeedTestConfig {
            download_duration: Duration::from_secs(2),
            seed: Some(7),
            faults,
            ..SpeedTestConfig::default()
        }
    }

    fn translator() -> Translator {
        Translator::new(
            Arc::new(EmbeddedCatalogSource::bundled()),
            Arc::new(MemoryPreferenceStore::new()),
        )
    }

    async fn english_translator() -> Translator {
        let mut translator = translator();
        translator.select_locale("en", &mut Page::standard()).await;
        translator
    }

    // ==================== Happy Path Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_full_run_fills_every_field() {
        let mut sequencer = Sequencer::new(config(FaultPlan::none()));
        let mut sink = RecordingSink::new();

        let outcome = sequencer.run(&mut sink).await;

        assert!(outcome.is_success());
        assert!(outcome.error.is_none());
        assert!(outcome.result.is_complete());
        assert!(outcome.result.download_mbps >= 0.1);
        assert_eq!(sequencer.state(), TestState::Done);
        assert_eq!(sequencer.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_states_visited_in_order() {
        let mut sequencer = Sequencer::new(config(FaultPlan::none()));
        let mut sink = RecordingSink::new();

        sequencer.run(&mut sink).await;

        assert_eq!(
            sink.states(),
            vec![
                TestState::MeasuringLatencyUnloaded,
                TestState::MeasuringDownload,
                TestState::ResultVisible,
                TestState::MeasuringUpload,
                TestState::MeasuringLatencyLoaded,
                TestState::Done,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_shown_before_upload() {
        let mut sequencer = Sequencer::new(config(FaultPlan::none()));
        let mut sink = RecordingSink::new();

        sequencer.run(&mut sink).await;

        let shown = sink
            .position(|e| *e == DisplayEvent::ShowResult)
            .unwrap();
        let upload = sink
            .position(|e| matches!(e, DisplayEvent::Upload(_)))
            .unwrap();
        let last_download = sink
            .events()
            .iter()
            .take(shown)
            .rposition(|e| matches!(e, DisplayEvent::Download(_)));
        assert!(last_download.is_some());
        assert!(shown < upload);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_sampled_repeatedly() {
        let mut sequencer = Sequencer::new(config(FaultPlan::none()));
        let mut sink = RecordingSink::new();

        sequencer.run(&mut sink).await;

        let samples = sink
            .events()
            .iter()
            .filter(|e| matches!(e, DisplayEvent::Download(_)))
            .count();
        // 2 s at 200 ms is 9 samples before the deadline, plus the final write
        assert!(samples >= 9, "only {} download samples", samples);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_phase_lasts_configured_duration() {
        let mut sequencer = Sequencer::new(config(FaultPlan::none()));
        let mut sink = RecordingSink::new();

        let start = Instant::now();
        sequencer.measure_download(&mut sink).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_download_is_floored() {
        let mut sequencer = Sequencer::new(SpeedTestConfig {
            per_connection_mbps: 0.000_001,
            ..config(FaultPlan::none())
        });
        let mut sink = RecordingSink::new();

        let mbps = sequencer.measure_download(&mut sink).await.unwrap();

        assert_eq!(mbps, 0.1);
        assert_eq!(sink.events().last(), Some(&DisplayEvent::Download(0.1)));
    }

    // ==================== Failure Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_all_connections_failing_stops_the_run() {
        let mut sequencer = Sequencer::new(config(FaultPlan {
            download_connection_failure_rate: 1.0,
            ..FaultPlan::none()
        }));
        let mut sink = RecordingSink::new();

        let outcome = sequencer.run(&mut sink).await;

        assert_eq!(outcome.state, TestState::Error);
        assert_eq!(outcome.error, Some(PhaseError::AllConnectionsFailed(4)));
        assert_eq!(outcome.result.download_mbps, 0.0);
        assert!(outcome.result.latency_unloaded_ms > 0.0);
        assert!(!sink.states().contains(&TestState::MeasuringUpload));
        assert!(!sink.states().contains(&TestState::MeasuringLatencyLoaded));
        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, DisplayEvent::Upload(_) | DisplayEvent::LatencyLoaded(_))));
        assert_eq!(
            sink.events().last(),
            Some(&DisplayEvent::ShowError(TestResult::default()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_keeps_download() {
        let mut sequencer = Sequencer::new(config(FaultPlan {
            upload_failure_rate: 1.0,
            ..FaultPlan::none()
        }));
        let mut sink = RecordingSink::new();

        let outcome = sequencer.run(&mut sink).await;

        assert_eq!(outcome.state, TestState::Error);
        assert!(matches!(outcome.error, Some(PhaseError::UploadFailed(_))));
        match sink.events().last() {
            Some(DisplayEvent::ShowError(partial)) => {
                assert!(partial.download_mbps > 0.0);
                assert_eq!(partial.upload_mbps, 0.0);
                assert_eq!(partial.latency_unloaded_ms, 0.0);
            }
            other => panic!("expected ShowError, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_pings_lost_fails_latency() {
        let mut sequencer = Sequencer::new(config(FaultPlan {
            unloaded_ping_failure_rate: 1.0,
            ..FaultPlan::none()
        }));
        let mut sink = RecordingSink::new();

        let outcome = sequencer.run(&mut sink).await;

        assert_eq!(
            outcome.error,
            Some(PhaseError::LatencyFailed {
                loaded: false,
                attempted: 5
            })
        );
        assert_eq!(sink.states().last(), Some(&TestState::Error));
        assert!(!sink.states().contains(&TestState::MeasuringDownload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loaded_latency_failure_after_upload() {
        let mut sequencer = Sequencer::new(config(FaultPlan {
            loaded_ping_failure_rate: 1.0,
            ..FaultPlan::none()
        }));
        let mut sink = RecordingSink::new();

        let outcome = sequencer.run(&mut sink).await;

        assert_eq!(
            outcome.error,
            Some(PhaseError::LatencyFailed {
                loaded: true,
                attempted: 5
            })
        );
        let states = sink.states();
        assert_eq!(
            &states[states.len() - 2..],
            &[TestState::MeasuringLatencyLoaded, TestState::Error]
        );
        assert!(outcome.result.upload_mbps > 0.0);

        // Upload was on screen before the failure; the error view keeps download only
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, DisplayEvent::Upload(_))));
        match sink.events().last() {
            Some(DisplayEvent::ShowError(partial)) => {
                assert_eq!(partial.download_mbps, outcome.result.download_mbps);
                assert!(partial.download_mbps > 0.0);
                assert_eq!(partial.upload_mbps, 0.0);
                assert_eq!(partial.latency_loaded_ms, 0.0);
            }
            other => panic!("expected ShowError, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_surviving_connections_finish_download() {
        let mut sequencer = Sequencer::new(config(FaultPlan {
            dropped_connections: 3,
            ..FaultPlan::none()
        }));
        let mut sink = RecordingSink::new();

        let start = Instant::now();
        let mbps = sequencer.measure_download(&mut sink).await.unwrap();

        // One connection at 50 Mbps x 0.7..1.3
        assert!(mbps > 20.0 && mbps < 80.0, "got {} Mbps", mbps);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_survivor_is_floored() {
        let mut sequencer = Sequencer::new(SpeedTestConfig {
            per_connection_mbps: 0.000_001,
            ..config(FaultPlan {
                dropped_connections: 3,
                ..FaultPlan::none()
            })
        });
        let mut sink = RecordingSink::new();

        let mbps = sequencer.measure_download(&mut sink).await.unwrap();
        assert_eq!(mbps, 0.1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_connection_dropped_fails_download() {
        let mut sequencer = Sequencer::new(config(FaultPlan {
            dropped_connections: 4,
            ..FaultPlan::none()
        }));
        let mut sink = RecordingSink::new();

        let result = sequencer.measure_download(&mut sink).await;

        assert_eq!(result, Err(PhaseError::AllConnectionsFailed(4)));
        assert_eq!(sequencer.result().download_mbps, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_first_tick_still_measures() {
        let mut sequencer = Sequencer::new(SpeedTestConfig {
            download_duration: Duration::from_millis(1000),
            sample_interval: Duration::from_millis(1500),
            ..config(FaultPlan::none())
        });
        let mut sink = RecordingSink::new();

        let mbps = sequencer.measure_download(&mut sink).await.unwrap();

        // Four connections at 35-65 Mbps each
        assert!(mbps > 100.0, "got {} Mbps", mbps);
        assert_eq!(sink.events(), &[DisplayEvent::Download(mbps)]);
    }

    // ==================== Restart Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_before_first_write() {
        let translator = english_translator().await;
        let mut sequencer = Sequencer::new(config(FaultPlan::none()));
        let mut sink = RecordingSink::new();

        sequencer.run(&mut sink).await;
        sink.clear();

        let outcome = sequencer.restart(&mut sink, &translator).await;
        assert!(outcome.is_success());
        assert_eq!(sequencer.runs(), 2);

        let reset = sink.position(|e| *e == DisplayEvent::Reset).unwrap();
        let first_write = sink
            .position(|e| {
                matches!(
                    e,
                    DisplayEvent::Download(_)
                        | DisplayEvent::Upload(_)
                        | DisplayEvent::LatencyUnloaded(_)
                        | DisplayEvent::LatencyLoaded(_)
                )
            })
            .unwrap();
        assert!(reset < first_write);

        let idle = sink
            .position(|e| *e == DisplayEvent::State(TestState::Idle))
            .unwrap();
        assert!(idle < first_write);
        assert!(sink
            .events()
            .contains(&DisplayEvent::CollapseMoreInfo("SHOW MORE INFO".to_string())));
        assert!(sink.events().contains(&DisplayEvent::ShowLoading));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_label_falls_back_to_key() {
        let translator = translator();
        let mut sequencer = Sequencer::new(config(FaultPlan::none()));
        let mut sink = RecordingSink::new();

        sequencer.prepare_restart(&mut sink, &translator);

        assert_eq!(sequencer.state(), TestState::Idle);
        assert_eq!(
            sink.events(),
            &[
                DisplayEvent::Reset,
                DisplayEvent::ShowLoading,
                DisplayEvent::State(TestState::Idle),
                DisplayEvent::CollapseMoreInfo("show-more".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_error_recovers() {
        let translator = translator();
        let mut sequencer = Sequencer::new(config(FaultPlan {
            upload_failure_rate: 1.0,
            ..FaultPlan::none()
        }));
        let mut sink = RecordingSink::new();

        sequencer.run(&mut sink).await;
        assert_eq!(sequencer.state(), TestState::Error);

        sequencer.restart(&mut sink, &translator).await;
        assert_eq!(sequencer.state(), TestState::Error);
        assert_eq!(sequencer.runs(), 2);
    }
}
