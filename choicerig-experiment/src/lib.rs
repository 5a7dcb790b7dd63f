pub mod block;
pub mod config;
pub mod datalog;
pub mod draw;
pub mod protocol;
pub mod reward;
pub mod rig;
pub mod sim;
pub mod state;
pub mod stats;
pub mod stimulus;
pub mod stopping;
pub mod trial;
pub mod valve;

pub use block::BlockState;
pub use config::{ContrastProbabilityType, TaskParameters};
pub use datalog::{JsonlTrialLog, LogEntry, MemoryTrialLog, PreviousSession, TrialLog};
pub use protocol::{
    AdvancedProtocol, AnyProtocol, BiasedProtocol, HabituationProtocol, Protocol, TrainingProtocol,
};
pub use reward::{RewardSchedule, compute_adaptive_reward_volume};
pub use rig::Rig;
pub use sim::{SimulatedSubject, SimulatedTrial};
pub use state::{Session, TrialCompletion};
pub use stats::SessionAggregates;
pub use stimulus::{
    NullStimulusChannel, RecordingStimulusChannel, StimulusChannel, UdpStimulusChannel,
};
pub use stopping::{StopReason, StoppingCriteria, should_stop};
pub use trial::{PsychometricPoint, TrialTable};
pub use valve::{CalibratedValve, ManualValve, Valve};
