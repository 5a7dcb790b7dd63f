use std::path::PathBuf;

use choicerig_core::ProtocolKind;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "choicerig")]
#[command(version)]
#[command(about = "Choice-world trial generation and session bookkeeping", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter when RUST_LOG is unset (e.g. "info", "choicerig_experiment=debug")
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a session against a simulated subject
    Run(RunArgs),
    /// Print the default task parameters as JSON
    Defaults,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// biased, training, habituation or advanced
    #[arg(long, default_value = "biased")]
    pub protocol: ProtocolKind,

    /// Number of trials; overrides NTRIALS from the settings file
    #[arg(long)]
    pub trials: Option<usize>,

    /// RNG seed for trial generation; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Task settings JSON
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Append trials to this JSON-lines file
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Previous session's trial log; restores the training phase, stimulus
    /// gain and, with --subject-weight, the adaptive reward
    #[arg(long)]
    pub previous_log: Option<PathBuf>,

    /// Subject weight in grams
    #[arg(long, requires = "previous_log")]
    pub subject_weight: Option<f64>,

    /// Overrides TRAINING_PHASE
    #[arg(long)]
    pub training_phase: Option<u8>,

    /// Send stimulus messages to this UDP address (host:port)
    #[arg(long)]
    pub stimulus_udp: Option<String>,

    /// End the session at the first stop recommendation
    #[arg(long)]
    pub stop_on_recommendation: bool,
}
