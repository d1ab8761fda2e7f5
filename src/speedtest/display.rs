//! The seam between the sequencer and whatever shows its results.

use crate::speedtest::{TestResult, TestState};
use tokio::sync::mpsc;

/// Receives every visible effect of a test run.
///
/// Implementations only render; they never feed anything back into the
/// sequencer.
pub trait DisplaySink {
    fn set_download(&mut self, mbps: f64);
    fn set_upload(&mut self, mbps: f64);
    fn set_latency_unloaded(&mut self, ms: f64);
    fn set_latency_loaded(&mut self, ms: f64);

    /// Zero all four metric displays.
    fn reset(&mut self);

    /// Result panel hidden, loading indicator shown.
    fn show_loading(&mut self);

    /// Loading indicator hidden, result panel shown.
    fn show_result(&mut self);

    /// Reveal the result panel with whatever was measured; unmeasured fields read 0.
    fn show_error(&mut self, partial: &TestResult);

    /// Collapse the auxiliary metrics panel and relabel its toggle.
    fn collapse_more_info(&mut self, label: &str);

    fn state_changed(&mut self, _state: TestState) {}
}

/// Everything a `RecordingSink` observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Download(f64),
    Upload(f64),
    LatencyUnloaded(f64),
    LatencyLoaded(f64),
    Reset,
    ShowLoading,
    ShowResult,
    ShowError(TestResult),
    CollapseMoreInfo(String),
    State(TestState),
}

impl DisplayEvent {
    /// Replay this event on another sink.
    pub fn apply_to<S: DisplaySink>(self, sink: &mut S) {
        match self {
            DisplayEvent::Download(mbps) => sink.set_download(mbps),
            DisplayEvent::Upload(mbps) => sink.set_upload(mbps),
            DisplayEvent::LatencyUnloaded(ms) => sink.set_latency_unloaded(ms),
            DisplayEvent::LatencyLoaded(ms) => sink.set_latency_loaded(ms),
            DisplayEvent::Reset => sink.reset(),
            DisplayEvent::ShowLoading => sink.show_loading(),
            DisplayEvent::ShowResult => sink.show_result(),
            DisplayEvent::ShowError(partial) => sink.show_error(&partial),
            DisplayEvent::CollapseMoreInfo(label) => sink.collapse_more_info(&label),
            DisplayEvent::State(state) => sink.state_changed(state),
        }
    }
}

/// Forwards every call as a `DisplayEvent` so a run can report to a page it
/// does not borrow.
///
/// Once the receiver is gone, events are dropped silently.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DisplayEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: DisplayEvent) {
        let _ = self.tx.send(event);
    }
}

impl DisplaySink for ChannelSink {
    fn set_download(&mut self, mbps: f64) {
        self.send(DisplayEvent::Download(mbps));
    }

    fn set_upload(&mut self, mbps: f64) {
        self.send(DisplayEvent::Upload(mbps));
    }

    fn set_latency_unloaded(&mut self, ms: f64) {
        self.send(DisplayEvent::LatencyUnloaded(ms));
    }

    fn set_latency_loaded(&mut self, ms: f64) {
        self.send(DisplayEvent::LatencyLoaded(ms));
    }

    fn reset(&mut self) {
        self.send(DisplayEvent::Reset);
    }

    fn show_loading(&mut self) {
        self.send(DisplayEvent::ShowLoading);
    }

    fn show_result(&mut self) {
        self.send(DisplayEvent::ShowResult);
    }

    fn show_error(&mut self, partial: &TestResult) {
        self.send(DisplayEvent::ShowError(*partial));
    }

    fn collapse_more_info(&mut self, label: &str) {
        self.send(DisplayEvent::CollapseMoreInfo(label.to_string()));
    }

    fn state_changed(&mut self, state: TestState) {
        self.send(DisplayEvent::State(state));
    }
}

/// A sink that keeps a log of calls, for headless front-ends and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<DisplayEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[DisplayEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// States entered, in order.
    pub fn states(&self) -> Vec<TestState> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DisplayEvent::State(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Position of the first event matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&DisplayEvent) -> bool) -> Option<usize> {
        self.events.iter().position(predicate)
    }
}

impl DisplaySink for RecordingSink {
    fn set_download(&mut self, mbps: f64) {
        self.events.push(DisplayEvent::Download(mbps));
    }

    fn set_upload(&mut self, mbps: f64) {
        self.events.push(DisplayEvent::Upload(mbps));
    }

    fn set_latency_unloaded(&mut self, ms: f64) {
        self.events.push(DisplayEvent::LatencyUnloaded(ms));
    }

    fn set_latency_loaded(&mut self, ms: f64) {
        self.events.push(DisplayEvent::LatencyLoaded(ms));
    }

    fn reset(&mut self) {
        self.events.push(DisplayEvent::Reset);
    }

    fn show_loading(&mut self) {
        self.events.push(DisplayEvent::ShowLoading);
    }

    fn show_result(&mut self) {
        self.events.push(DisplayEvent::ShowResult);
    }

    fn show_error(&mut self, partial: &TestResult) {
        self.events.push(DisplayEvent::ShowError(*partial));
    }

    fn collapse_more_info(&mut self, label: &str) {
        self.events
            .push(DisplayEvent::CollapseMoreInfo(label.to_string()));
    }

    fn state_changed(&mut self, state: TestState) {
        self.events.push(DisplayEvent::State(state));
    }
}
