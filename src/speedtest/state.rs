use std::fmt;

/// Where a test run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestState {
    Idle,
    MeasuringLatencyUnloaded,
    MeasuringDownload,
    ResultVisible,
    MeasuringUpload,
    MeasuringLatencyLoaded,
    Done,
    Error,
}

impl TestState {
    /// The state a successful step leads to. `Done` and `Error` are terminal.
    pub fn next(self) -> Option<TestState> {
        use TestState::*;
        match self {
            Idle => Some(MeasuringLatencyUnloaded),
            MeasuringLatencyUnloaded => Some(MeasuringDownload),
            MeasuringDownload => Some(ResultVisible),
            ResultVisible => Some(MeasuringUpload),
            MeasuringUpload => Some(MeasuringLatencyLoaded),
            MeasuringLatencyLoaded => Some(Done),
            Done | Error => None,
        }
    }

    pub fn is_measuring(self) -> bool {
        matches!(
            self,
            TestState::MeasuringLatencyUnloaded
                | TestState::MeasuringDownload
                | TestState::MeasuringUpload
                | TestState::MeasuringLatencyLoaded
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TestState::Done | TestState::Error)
    }

    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition_to(self, to: TestState) -> bool {
        match to {
            TestState::Error => self.is_measuring(),
            TestState::Idle => true,
            _ => self.next() == Some(to),
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TestState::Idle => "idle",
            TestState::MeasuringLatencyUnloaded => "measuring unloaded latency",
            TestState::MeasuringDownload => "measuring download",
            TestState::ResultVisible => "result visible",
            TestState::MeasuringUpload => "measuring upload",
            TestState::MeasuringLatencyLoaded => "measuring loaded latency",
            TestState::Done => "done",
            TestState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Measured values. Zero means "not measured yet".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TestResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_unloaded_ms: f64,
    pub latency_loaded_ms: f64,
}

impl TestResult {
    pub fn is_complete(&self) -> bool {
        self.download_mbps > 0.0
            && self.upload_mbps > 0.0
            && self.latency_unloaded_ms > 0.0
            && self.latency_loaded_ms > 0.0
    }
}
