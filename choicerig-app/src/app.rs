use anyhow::{Context, Result};
use choicerig_experiment::{
    AnyProtocol, JsonlTrialLog, PreviousSession, Rig, Session, SimulatedSubject, TaskParameters,
    UdpStimulusChannel, compute_adaptive_reward_volume,
};
use choicerig_core::ProtocolKind;
use choicerig_timing::ManualTimer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::cli::RunArgs;

pub struct App {
    args: RunArgs,
    params: TaskParameters,
    seed: u64,
}

impl App {
    pub fn new(args: RunArgs) -> Result<Self> {
        let mut params = match &args.settings {
            Some(path) => TaskParameters::from_path(path)
                .with_context(|| format!("loading task settings {}", path.display()))?,
            None => TaskParameters::default(),
        };
        if let Some(n) = args.trials {
            params.ntrials = n;
        }

        let previous = match &args.previous_log {
            Some(path) => Some(
                PreviousSession::load(path)
                    .with_context(|| format!("reading previous session {}", path.display()))?,
            ),
            None => None,
        };
        if let Some(phase) = args
            .training_phase
            .or_else(|| previous.as_ref().and_then(|p| p.last_training_phase))
        {
            params.training_phase = phase;
        }
        if let Some(previous) = &previous {
            match args.subject_weight {
                Some(weight) => {
                    params.reward_amount =
                        Self::adaptive_reward(previous, weight, params.reward_amount)
                }
                None => warn!("no subject weight, keeping {} µl reward", params.reward_amount),
            }
        }
        if args.protocol == ProtocolKind::Training {
            params.stim_gain = previous
                .as_ref()
                .map_or(params.ag_init_value, |p| p.adaptive_gain(&params));
            info!(
                training_phase = params.training_phase,
                stim_gain = params.stim_gain,
                "training level"
            );
        }
        params.validate().context("invalid task settings")?;

        let seed = args.seed.unwrap_or_else(|| rand::rng().random());
        Ok(Self { args, params, seed })
    }

    fn adaptive_reward(previous: &PreviousSession, weight: f64, current: f64) -> f64 {
        let Some(last_reward) = previous.last_reward_amount else {
            warn!("previous session delivered no reward, keeping {current} µl");
            return current;
        };
        let volume = compute_adaptive_reward_volume(
            weight,
            last_reward,
            previous.water_delivered,
            previous.ntrials,
        );
        info!(
            previous_ntrials = previous.ntrials,
            previous_water = previous.water_delivered,
            last_reward,
            reward_amount = volume,
            "adaptive reward"
        );
        volume
    }

    #[cfg(test)]
    pub fn params(&self) -> &TaskParameters {
        &self.params
    }

    fn build_rig(&self) -> Result<Rig> {
        let mut rig = Rig::default();
        if let Some(addr) = &self.args.stimulus_udp {
            let channel = UdpStimulusChannel::connect(addr.as_str())
                .with_context(|| format!("connecting stimulus channel to {addr}"))?;
            rig = rig.with_stimulus(channel);
        }
        if let Some(path) = &self.args.log {
            let log = JsonlTrialLog::open(path)
                .with_context(|| format!("opening trial log {}", path.display()))?;
            rig = rig.with_log(log);
        }
        Ok(rig)
    }

    pub fn run(self) -> Result<()> {
        println!("=== CHOICE WORLD SESSION ===");
        println!("Protocol: {}", self.args.protocol);
        println!("Trials:   {}", self.params.ntrials);
        println!("Seed:     {}\n", self.seed);

        let protocol = AnyProtocol::from_kind(self.args.protocol, &self.params)?;
        let timer = ManualTimer::new();
        let rng = StdRng::seed_from_u64(self.seed);
        let mut session = Session::new(
            self.params.clone(),
            protocol,
            timer.clone(),
            rng,
            self.build_rig()?,
        )?;

        let subject = SimulatedSubject::default();
        let mut subject_rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));

        for _ in 0..self.params.ntrials {
            let record = session.next_trial()?.clone();
            let trial = subject.perform(&record, &mut subject_rng)?;
            timer.advance(trial.duration);
            let done = session.record_outcome(&trial.raw)?;
            if let Some(reason) = done.stop.filter(|_| self.args.stop_on_recommendation) {
                info!(trial_num = done.trial_num, "ending session: {reason}");
                break;
            }
        }

        let agg = session.aggregates().clone();
        let curve = session.psychometric_curve();
        let stop = session.stop_recommendation();
        let elapsed = session.elapsed();
        session.finish();

        println!("\n{:>8} {:>6} {:>8} {:>8} {:>8}", "contrast", "n", "p_right", "perf", "rt (s)");
        for p in &curve {
            let rt = p
                .mean_response_time
                .map_or_else(|| "-".to_string(), |rt| format!("{rt:.3}"));
            println!(
                "{:>8.4} {:>6} {:>8.3} {:>8.3} {:>8}",
                p.signed_contrast, p.count, p.fraction_right, p.performance, rt
            );
        }
        println!(
            "\n{} trials, {} correct ({:.1}%), {} no-go, {:.1} µl in {:.1} min",
            agg.ntrials,
            agg.ntrials_correct,
            agg.performance() * 100.0,
            agg.ntrials_no_go,
            agg.water_delivered,
            elapsed.as_secs_f64() / 60.0
        );
        if let Some(reason) = stop {
            println!("Recommendation: {reason}");
        }
        Ok(())
    }
}
