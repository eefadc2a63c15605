//! Per-run configuration. Mirrors the teacher crate's `Optimizer::set_cut_width` /
//! `set_random_seed` chained-builder style, but kept as a plain value (`Constraints` is a
//! per-run parameter, not baked into a rebuilt engine - see `DESIGN.md`).

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Material-loss constraints applied uniformly for the duration of one optimization.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Constraints {
    /// Material consumed by the blade between two adjacent cuts on the same bar, in millimeters.
    pub cutting_loss: f64,

    /// Material reserved at the leading end of each stock bar, in millimeters.
    pub front_end_loss: f64,

    /// Material reserved at the trailing end of each stock bar, in millimeters.
    pub back_end_loss: f64,

    /// Maximum angle difference, in degrees, for two mitre angles to be considered shareable.
    pub angle_tolerance: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            cutting_loss: 3.0,
            front_end_loss: 10.0,
            back_end_loss: 10.0,
            angle_tolerance: 5.0,
        }
    }
}

/// Tunable configuration for one optimization run.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Config {
    /// Loss constraints (kerf, end losses) and the angle tolerance.
    pub constraints: Constraints,

    /// Whether to build mixed-part-type chains (Chain Builder Phase B) in addition to same-part
    /// chains. Skipped automatically when no part has a non-zero corner angle.
    pub prioritize_mixed_chains: bool,

    /// Maximum number of part instances in a single chain.
    pub max_chain_length: usize,

    /// Upper bound on savings attributed to a single shared cut, in millimeters.
    pub savings_cap: f64,

    /// How many new stock instances to allocate, per miss, for an unlimited-supply stock type.
    pub unlimited_batch_size: u32,

    /// Maximum number of instances to allocate for an unlimited-supply stock type in response to
    /// a single placement miss.
    pub unlimited_batch_cap: u32,

    /// If the population of non-zero corner-angle slots exceeds this, the matcher samples down
    /// to this many before pairing.
    pub sample_cap_for_matching: usize,

    /// Seed for the deterministic sampler used when the matcher's working set is capped.
    pub random_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            constraints: Constraints::default(),
            prioritize_mixed_chains: true,
            max_chain_length: 20,
            savings_cap: 50.0,
            unlimited_batch_size: 5,
            unlimited_batch_cap: 10,
            sample_cap_for_matching: 500,
            random_seed: 0,
        }
    }
}

impl Config {
    /// Creates a new `Config` with the documented defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the loss constraints.
    pub fn set_constraints(&mut self, constraints: Constraints) -> &mut Self {
        self.constraints = constraints;
        self
    }

    /// Sets whether mixed-part-type chains are built.
    pub fn set_prioritize_mixed_chains(&mut self, prioritize: bool) -> &mut Self {
        self.prioritize_mixed_chains = prioritize;
        self
    }

    /// Sets the maximum chain length.
    pub fn set_max_chain_length(&mut self, max_chain_length: usize) -> &mut Self {
        self.max_chain_length = max_chain_length;
        self
    }

    /// Sets the random seed used by the matcher's bounded sampler.
    pub fn set_random_seed(&mut self, seed: u64) -> &mut Self {
        self.random_seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.constraints.cutting_loss < 0.0
            || self.constraints.front_end_loss < 0.0
            || self.constraints.back_end_loss < 0.0
            || self.constraints.angle_tolerance < 0.0
        {
            return Err(crate::error::Error::InvalidConfig {
                reason: "cutting_loss, front_end_loss, back_end_loss and angle_tolerance must be non-negative".into(),
            });
        }
        if self.max_chain_length == 0 {
            return Err(crate::error::Error::InvalidConfig {
                reason: "max_chain_length must be at least 1".into(),
            });
        }
        Ok(())
    }
}
