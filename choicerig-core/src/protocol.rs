use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Task protocol selected at session construction.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Blocks of alternating left/right bias.
    #[default]
    Biased,
    /// Contrast set unlocked by training phase, with debiasing repeats.
    Training,
    /// Full-contrast stimuli only, unbiased sides.
    Habituation,
    /// Fixed side probability and configured contrasts, no blocks.
    Advanced,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 4] = [
        ProtocolKind::Biased,
        ProtocolKind::Training,
        ProtocolKind::Habituation,
        ProtocolKind::Advanced,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolKind::Biased => "biased",
            ProtocolKind::Training => "training",
            ProtocolKind::Habituation => "habituation",
            ProtocolKind::Advanced => "advanced",
        }
    }

    /// Whether the protocol sequences finite blocks of trials.
    pub fn uses_blocks(&self) -> bool {
        matches!(self, ProtocolKind::Biased)
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtocolKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TaskError::invalid(format!("unknown protocol '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names() {
        for kind in ProtocolKind::ALL {
            assert_eq!(kind.name().parse::<ProtocolKind>().unwrap(), kind);
        }
        assert_eq!("Biased".parse::<ProtocolKind>().unwrap(), ProtocolKind::Biased);
        assert!("ephys".parse::<ProtocolKind>().is_err());
    }
}
