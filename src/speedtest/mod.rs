//! Simulated speed test.
//!
//! - `state`: run states and the measured values
//! - `link`: the fake network every delay and value comes from
//! - `sequencer`: phase ordering, download sampling, restart
//! - `display`: the sink results are written to

mod display;
mod error;
mod link;
mod sequencer;
mod state;

pub use display::{ChannelSink, DisplayEvent, DisplaySink, RecordingSink};
pub use error::{LinkError, PhaseError};
pub use link::{SimulatedConnection, SimulatedLink};
pub use sequencer::{RunOutcome, Sequencer};
pub use state::{TestResult, TestState};
