use crate::datalog::{MemoryTrialLog, TrialLog};
use crate::stimulus::{NullStimulusChannel, StimulusChannel};
use crate::valve::{ManualValve, Valve};

/// Manual calibration of the bench rig: 0.1 s for 3 µl.
const BENCH_CALIBRATION_VALUE: f64 = 0.1;

/// Hardware a session talks to, injected at construction.
pub struct Rig {
    pub stimulus: Box<dyn StimulusChannel + Send>,
    pub valve: Box<dyn Valve + Send>,
    pub log: Box<dyn TrialLog + Send>,
}

impl Rig {
    pub fn new(
        stimulus: impl StimulusChannel + Send + 'static,
        valve: impl Valve + Send + 'static,
        log: impl TrialLog + Send + 'static,
    ) -> Self {
        Self {
            stimulus: Box::new(stimulus),
            valve: Box::new(valve),
            log: Box::new(log),
        }
    }

    pub fn with_stimulus(mut self, stimulus: impl StimulusChannel + Send + 'static) -> Self {
        self.stimulus = Box::new(stimulus);
        self
    }

    pub fn with_valve(mut self, valve: impl Valve + Send + 'static) -> Self {
        self.valve = Box::new(valve);
        self
    }

    pub fn with_log(mut self, log: impl TrialLog + Send + 'static) -> Self {
        self.log = Box::new(log);
        self
    }
}

/// No renderer, a bench valve and an in-memory log.
impl Default for Rig {
    fn default() -> Self {
        Self::new(
            NullStimulusChannel,
            ManualValve {
                calibration_value: BENCH_CALIBRATION_VALUE,
            },
            MemoryTrialLog::new(),
        )
    }
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig").finish_non_exhaustive()
    }
}
