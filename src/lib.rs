//! bar-cut-optimizer is an optimizer library for 1D cutting-stock layout of mitred steel and
//! aluminum bars, with shared-cut (共刀) chaining: pairs (or longer runs) of parts whose mitre
//! angles match closely enough can be cut from adjacent stock with a single oblique blade pass
//! instead of two square cuts, saving the material the kerf would otherwise waste.
//!
//! The pipeline is a facade over three stages: the Angle Matcher finds candidate shared cuts
//! across the part population, the Chain Builder assembles matches into same-part and mixed-type
//! chains, and the Placer runs a First-Fit-Decreasing pack of chains and loose instances onto
//! stock, growing unlimited-supply stock on demand and falling back to a fabricated "virtual"
//! stock instance as a last resort so every part is always accounted for.

#![deny(missing_docs)]

mod chain;
mod config;
mod error;
mod matcher;
mod model;
mod placer;
mod rng;

#[cfg(test)]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use fnv::FnvHashMap;

pub use config::{Config, Constraints};
pub use error::{Error, Result};
pub use model::{
    Angles, Corner, Flip, Part, Placement, PlacementResult, RunStats, SharedCutInfo, Stock,
    UnplacedPart, UsedStock,
};

use model::{InstanceRef, PartInstance};

/// Which stage of the pipeline a progress callback's percentage belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Angle Matcher: enumerating shared-cut candidates (0-10%).
    Matching,
    /// Chain Builder: assembling matches into chains (10-20%).
    ChainBuilding,
    /// Placer: packing chains and loose instances onto stock (20-100%).
    Placing,
}

/// Builds up the part and stock population for one optimization, then runs it.
///
/// Mirrors the teacher crate's `Optimizer` builder: parts and stock are accumulated with
/// `add_part`/`add_stock` before a single `optimize` call consumes them.
#[derive(Clone, Debug, Default)]
pub struct Optimizer {
    parts: Vec<Part>,
    stocks: Vec<Stock>,
    config: Config,
}

impl Optimizer {
    /// Creates a new, empty optimizer with default [`Config`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one part to the population.
    pub fn add_part(&mut self, part: Part) -> &mut Self {
        self.parts.push(part);
        self
    }

    /// Adds several parts to the population.
    pub fn add_parts<I: IntoIterator<Item = Part>>(&mut self, parts: I) -> &mut Self {
        self.parts.extend(parts);
        self
    }

    /// Adds one stock type. If a stock with the same `id` was already added, quantities are
    /// summed; if either is unlimited (`quantity == 0`), the merged entry is unlimited.
    pub fn add_stock(&mut self, stock: Stock) -> &mut Self {
        if let Some(existing) = self.stocks.iter_mut().find(|s| s.id == stock.id) {
            existing.quantity = if existing.is_unlimited() || stock.is_unlimited() {
                0
            } else {
                existing.quantity + stock.quantity
            };
        } else {
            self.stocks.push(stock);
        }
        self
    }

    /// Adds several stock types, see [`Optimizer::add_stock`].
    pub fn add_stocks<I: IntoIterator<Item = Stock>>(&mut self, stocks: I) -> &mut Self {
        for stock in stocks {
            self.add_stock(stock);
        }
        self
    }

    /// Replaces the run configuration.
    pub fn set_config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }

    /// The current run configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the optimization with no way to cancel it partway through.
    pub fn optimize_without_cancellation(
        &self,
        progress: impl FnMut(u8, Stage),
    ) -> Result<(PlacementResult, RunStats)> {
        self.optimize(Arc::new(AtomicBool::new(false)), progress)
    }

    /// Runs the optimization, reporting 0-100% progress per [`Stage`] and honoring `cancel`.
    ///
    /// Returns `Err` only for input or configuration problems discovered before placement
    /// begins. Once placement has started, every other adverse condition (a part longer than any
    /// stock, finite stock exhaustion, cancellation) is downgraded into `unplaced_parts`, a
    /// warning string, or `success = false` on the returned [`PlacementResult`] - the engine never
    /// aborts mid-run.
    pub fn optimize(
        &self,
        cancel: Arc<AtomicBool>,
        mut progress: impl FnMut(u8, Stage),
    ) -> Result<(PlacementResult, RunStats)> {
        let started = Instant::now();
        self.config.validate()?;
        for stock in &self.stocks {
            validate_stock(stock)?;
        }
        for part in &self.parts {
            validate_part(part)?;
        }

        let instances = expand_parts(&self.parts);
        let angled_instances = instances
            .iter()
            .filter(|i| !i.angles.all_zero())
            .count();

        if instances.is_empty() {
            return Ok((
                PlacementResult {
                    success: true,
                    placed_parts: Vec::new(),
                    unplaced_parts: Vec::new(),
                    used_stock: Vec::new(),
                    chains_built: 0,
                    mixed_chains: 0,
                    total_savings: 0.0,
                    warnings: Vec::new(),
                },
                RunStats {
                    total_instances: 0,
                    angled_instances: 0,
                    stock_types: self.stocks.len(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    chains_built: 0,
                },
            ));
        }

        let constraints = self.config.constraints;
        let tolerance = constraints.angle_tolerance;
        let savings_cap = self.config.savings_cap;
        let sample_cap = self.config.sample_cap_for_matching;
        let seed = self.config.random_seed;

        progress(0, Stage::Matching);
        let potential = matcher::evaluate_potential(&instances, tolerance, savings_cap, sample_cap, seed);
        let run_mixed = self.config.prioritize_mixed_chains && potential.match_count > 0;
        progress(5, Stage::Matching);

        let matches = matcher::find_matches(&instances, tolerance, savings_cap, sample_cap, seed);
        progress(10, Stage::Matching);

        let (chains, loose) = chain::build(
            &instances,
            &matches,
            self.config.max_chain_length,
            run_mixed,
            savings_cap,
        );
        progress(20, Stage::ChainBuilding);

        let chains_built = chains.len() as u32;
        let mixed_chains = chains.iter().filter(|c| c.is_mixed()).count() as u32;

        let mut lengths: FnvHashMap<InstanceRef, f64> = FnvHashMap::default();
        for instance in &instances {
            lengths.insert(instance.instance_ref(), instance.length as f64);
        }
        let loose_refs: Vec<InstanceRef> = loose.iter().map(|i| i.instance_ref()).collect();

        let placer = placer::Placer::new(&self.stocks, &self.config, lengths, cancel);
        let output = placer.place(&chains, &loose_refs, |p| {
            progress(20 + (p as u32 * 80 / 100) as u8, Stage::Placing)
        });

        let total_savings: f64 = output
            .placements
            .iter()
            .filter_map(|p| p.shared_cut_info.map(|s| s.savings))
            .sum();

        let mut warnings = output.warnings;
        if output.cancelled {
            warnings.push(format!("{} before all parts were placed", Error::Cancelled));
        }

        let result = PlacementResult {
            // Cancellation always aborts a run early, but a run that ran to completion is only
            // a full success if every part instance actually landed somewhere - the core
            // contract is "every part placed", so a non-empty `unplaced_parts` is a failure too.
            success: !output.cancelled && output.unplaced.is_empty(),
            placed_parts: output.placements,
            unplaced_parts: output.unplaced,
            used_stock: output.used_stock,
            chains_built,
            mixed_chains,
            total_savings,
            warnings,
        };

        let stats = RunStats {
            total_instances: instances.len(),
            angled_instances,
            stock_types: self.stocks.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            chains_built,
        };

        Ok((result, stats))
    }
}

fn validate_part(part: &Part) -> Result<()> {
    if part.length == 0 {
        return Err(Error::InvalidPart {
            part_id: part.id,
            reason: "length must be positive".into(),
        });
    }
    if part.quantity == 0 {
        return Err(Error::InvalidPart {
            part_id: part.id,
            reason: "quantity must be at least 1".into(),
        });
    }
    for corner in Corner::ALL {
        if part.angles.get(corner) > 89 {
            return Err(Error::InvalidPart {
                part_id: part.id,
                reason: "corner angles must be in [0, 89] degrees".into(),
            });
        }
    }
    if !part.angles.is_valid() {
        return Err(Error::InvalidPart {
            part_id: part.id,
            reason: "at most one of the two corners on each side may carry a mitre angle".into(),
        });
    }
    Ok(())
}

fn validate_stock(stock: &Stock) -> Result<()> {
    if stock.length == 0 {
        return Err(Error::InvalidStock {
            stock_id: stock.id,
            reason: "length must be positive".into(),
        });
    }
    Ok(())
}

/// Materializes `quantity` copies of each part, computing a default thickness for any part that
/// didn't supply one.
fn expand_parts(parts: &[Part]) -> Vec<PartInstance> {
    let mut instances = Vec::new();
    for part in parts {
        let thickness = part
            .thickness
            .unwrap_or_else(|| default_thickness_for(part));
        for instance_id in 0..part.quantity {
            instances.push(PartInstance {
                part_id: part.id,
                instance_id,
                length: part.length,
                angles: part.angles,
                thickness,
                flipped: Flip::None,
            });
        }
    }
    instances
}

fn default_thickness_for(part: &Part) -> u32 {
    // The steepest contributing mitre is the *smallest* non-zero corner angle - `sin` shrinks as
    // the angle does, so a shallower corner needs the larger thickness bump, not a bigger one.
    let steepest = Corner::ALL
        .iter()
        .map(|&c| part.angles.get(c))
        .filter(|&a| a > 0)
        .min()
        .unwrap_or(0);
    matcher::default_thickness(part.length, steepest as f64)
}
