use anyhow::{Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::circuit::Network;

/// Upper bound on post-clipping stages in one layout.
pub const MAX_POST_STAGES: usize = 6;

/// Canonical arrangements of the pedal's filter networks.
#[derive(ValueEnum, Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Topology {
    /// Active drive network with the full tone stack after the clipper.
    #[default]
    Classic,
    /// Single-pole drive, passive recovery lowpass and a parallel tone branch.
    Split,
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classic => write!(f, "Classic"),
            Self::Split => write!(f, "Split"),
        }
    }
}

impl Topology {
    pub fn layout(self) -> Layout {
        match self {
            Self::Classic => Layout {
                drive: Some(DriveSpec {
                    network: Network::ActiveDrive,
                    recombine: Recombine::AddDry,
                }),
                post: vec![
                    PostStage::Filter(Network::ToneStack),
                    PostStage::Gain,
                    PostStage::Filter(Network::OutputCoupling),
                ],
            },
            Self::Split => Layout {
                drive: Some(DriveSpec {
                    network: Network::SinglePoleDrive,
                    recombine: Recombine::AddDry,
                }),
                post: vec![
                    PostStage::Filter(Network::Recovery),
                    PostStage::ParallelSum(Network::ToneBranch),
                    PostStage::Gain,
                    PostStage::Filter(Network::OutputCoupling),
                ],
            },
        }
    }

    pub const fn default_oversampling(self) -> usize {
        match self {
            Self::Classic => 2,
            Self::Split => 1,
        }
    }
}

/// How the clipped modulation signal re-enters the main path.
#[derive(ValueEnum, Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recombine {
    /// `U + dry`, the op-amp's non-inverting input adds the clean signal back.
    #[default]
    AddDry,
    /// `U` alone.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveSpec {
    pub network: Network,
    pub recombine: Recombine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostStage {
    /// Filters the signal in place.
    Filter(Network),
    /// Filters a copy of the signal and adds it back: `x + H(x)`.
    ParallelSum(Network),
    /// Linear output level.
    Gain,
}

/// Ordered description of a signal path: an optional drive section that
/// runs at the oversampled rate, followed by base-rate stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub drive: Option<DriveSpec>,
    pub post: Vec<PostStage>,
}

impl Layout {
    /// No filtering and no gain, the input is copied straight to every
    /// output channel.
    pub const fn passthrough() -> Self {
        Self {
            drive: None,
            post: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(drive) = &self.drive
            && !drive.network.is_drive()
        {
            bail!("{} network cannot feed the clipper", drive.network);
        }

        if self.post.len() > MAX_POST_STAGES {
            bail!(
                "layout has {} post stages, at most {MAX_POST_STAGES} are supported",
                self.post.len()
            );
        }

        for stage in &self.post {
            if let PostStage::Filter(network) | PostStage::ParallelSum(network) = stage
                && network.is_drive()
            {
                bail!("{network} network is only valid in front of the clipper");
            }
        }

        Ok(())
    }

    pub fn has_gain(&self) -> bool {
        self.post.contains(&PostStage::Gain)
    }
}
