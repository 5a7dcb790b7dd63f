pub mod error;
pub mod outcome;
pub mod protocol;
pub mod stimulus;
pub mod trial;

pub use error::{Result, TaskError};
pub use outcome::{Outcome, RawOutcome, StateVisits};
pub use protocol::ProtocolKind;
pub use stimulus::{StimulusMessage, RENDERER_FIELDS};
pub use trial::{ResponseSide, TrialOutcome, TrialRecord, TrialState};
