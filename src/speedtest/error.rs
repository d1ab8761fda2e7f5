use thiserror::Error;

/// A single simulated network operation failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("connection dropped")]
    ConnectionDropped,

    #[error("ping lost")]
    PingLost,

    #[error("upload rejected")]
    UploadRejected,
}

/// A measurement phase that could not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("All {attempted} {kind} latency pings failed", kind = load_label(.loaded))]
    LatencyFailed { loaded: bool, attempted: usize },

    #[error("All {0} download connections failed")]
    AllConnectionsFailed(usize),

    #[error("Upload error: {0}")]
    UploadFailed(LinkError),
}

fn load_label(loaded: &bool) -> &'static str {
    if *loaded {
        "loaded"
    } else {
        "unloaded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_error_messages() {
        let err = PhaseError::LatencyFailed {
            loaded: true,
            attempted: 5,
        };
        assert_eq!(err.to_string(), "All 5 loaded latency pings failed");
        assert_eq!(
            PhaseError::AllConnectionsFailed(4).to_string(),
            "All 4 download connections failed"
        );
        assert_eq!(
            PhaseError::UploadFailed(LinkError::UploadRejected).to_string(),
            "Upload error: upload rejected"
        );
    }
}
