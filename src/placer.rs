//! Placer: First-Fit-Decreasing packing of Chains and loose PartInstances onto StockInstances
//! (§4.3), growing unlimited-supply stock on demand and falling back to virtual stock as a last
//! resort so that every part is always accounted for.
//!
//! Grounded in the teacher crate's `Optimizer::optimize_guillotine` outer loop (sort pieces
//! descending, scan existing free rectangles, grow the stock list on miss) generalized from 2D
//! rectangle placement to a single 1D running offset per stock instance.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use fnv::FnvHashMap;

use crate::chain::Chain;
use crate::config::Config;
use crate::error::Error;
use crate::model::{Flip, InstanceRef, Placement, SharedCutInfo, Stock, UnplacedPart, UsedStock};

/// Maximum number of evict-and-replace swaps attempted per outer miss during repacking fallback.
const MAX_REPACK_SWAPS: u32 = 32;

/// A unit of work for the placer: either an atomically-placed chain or a single loose instance.
enum Item<'a> {
    Chain(&'a Chain),
    Loose(InstanceRef),
}

impl<'a> Item<'a> {
    fn required_length(&self, lengths: &FnvHashMap<InstanceRef, f64>) -> f64 {
        match self {
            Item::Chain(c) => c.total_length,
            Item::Loose(r) => lengths[r],
        }
    }

    fn savings(&self) -> f64 {
        match self {
            Item::Chain(c) => c.total_savings,
            Item::Loose(_) => 0.0,
        }
    }

    fn sort_id(&self) -> (u8, InstanceRef) {
        match self {
            Item::Chain(c) => (0, c.instances[0].0),
            Item::Loose(r) => (1, *r),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fullness {
    Empty,
    PartiallyFilled,
    Full,
}

struct StockInstance {
    stock_id: u32,
    instance_index: u32,
    capacity: f64,
    used_length: f64,
    placements: Vec<Placement>,
    virtual_stock: bool,
    state: Fullness,
}

impl StockInstance {
    fn new(stock_id: u32, instance_index: u32, capacity: f64, virtual_stock: bool) -> Self {
        Self {
            stock_id,
            instance_index,
            capacity,
            used_length: 0.0,
            placements: Vec::new(),
            virtual_stock,
            state: Fullness::Empty,
        }
    }

    fn effective_capacity(&self, cutting_loss: f64) -> f64 {
        let kerf = if self.used_length > 0.0 { cutting_loss } else { 0.0 };
        (self.capacity - self.used_length - kerf).max(0.0)
    }

    fn mark_state(&mut self, smallest_remaining: f64, cutting_loss: f64) {
        if self.used_length <= 0.0 {
            self.state = Fullness::Empty;
        } else if self.effective_capacity(cutting_loss) < smallest_remaining {
            self.state = Fullness::Full;
        } else {
            self.state = Fullness::PartiallyFilled;
        }
    }
}

/// Working state for one placement run: owns the growing list of stock instances and emits
/// progress as placement proceeds.
pub(crate) struct Placer<'a> {
    stocks: &'a [Stock],
    config: &'a Config,
    lengths: FnvHashMap<InstanceRef, f64>,
    instances: Vec<StockInstance>,
    cancel: Arc<AtomicBool>,
    warnings: Vec<String>,
    /// Every instance ref that belongs to a chain already placed atomically. `shared_cut_info`
    /// alone can't tell a chain's first member from a loose item (both carry `None`), so the
    /// repacking fallback consults this set instead of trying to infer membership from the
    /// `Placement` shape.
    chain_members: std::collections::HashSet<InstanceRef>,
}

/// Result of a placement run, prior to the Engine Facade's final tally.
pub(crate) struct PlacerOutput {
    pub(crate) placements: Vec<Placement>,
    pub(crate) unplaced: Vec<UnplacedPart>,
    pub(crate) used_stock: Vec<UsedStock>,
    pub(crate) warnings: Vec<String>,
    pub(crate) cancelled: bool,
}

impl<'a> Placer<'a> {
    pub(crate) fn new(
        stocks: &'a [Stock],
        config: &'a Config,
        lengths: FnvHashMap<InstanceRef, f64>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let mut instances = Vec::new();
        let mut sorted_finite: Vec<&Stock> =
            stocks.iter().filter(|s| !s.is_unlimited()).collect();
        sorted_finite.sort_by(|a, b| b.length.cmp(&a.length));
        for stock in sorted_finite {
            let capacity = stock.usable_length(&config.constraints);
            for idx in 0..stock.quantity {
                instances.push(StockInstance::new(stock.id, idx, capacity, false));
            }
        }
        for stock in stocks.iter().filter(|s| s.is_unlimited()) {
            let capacity = stock.usable_length(&config.constraints);
            instances.push(StockInstance::new(stock.id, 0, capacity, false));
        }

        Self {
            stocks,
            config,
            lengths,
            instances,
            cancel,
            warnings: Vec::new(),
            chain_members: std::collections::HashSet::new(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(AtomicOrdering::Relaxed)
    }

    /// Places every chain and loose instance, reporting `progress` (0-100, pre-scaled into the
    /// caller's stage window by the Engine Facade) as the outer loop advances.
    #[tracing::instrument(skip(self, chains, loose, progress))]
    pub(crate) fn place(
        mut self,
        chains: &'a [Chain],
        loose: &[InstanceRef],
        mut progress: impl FnMut(u8),
    ) -> PlacerOutput {
        let mut items: Vec<Item<'a>> = Vec::with_capacity(chains.len() + loose.len());
        items.extend(chains.iter().map(Item::Chain));
        items.extend(loose.iter().map(|r| Item::Loose(*r)));

        items.sort_by(|a, b| {
            let len_a = a.required_length(&self.lengths);
            let len_b = b.required_length(&self.lengths);
            len_b
                .partial_cmp(&len_a)
                .unwrap()
                .then_with(|| a.sort_id().0.cmp(&b.sort_id().0))
                .then_with(|| b.savings().partial_cmp(&a.savings()).unwrap())
                .then_with(|| a.sort_id().1.cmp(&b.sort_id().1))
        });

        let mut unplaced = Vec::new();
        let total = items.len().max(1);

        for (i, item) in items.into_iter().enumerate() {
            if self.is_cancelled() {
                return self.finish(unplaced, true);
            }

            match item {
                Item::Chain(chain) => self.place_chain(chain, &mut unplaced),
                Item::Loose(r) => self.place_loose(r, &mut unplaced),
            }

            progress(((i + 1) * 100 / total).min(100) as u8);
        }

        self.finish(unplaced, false)
    }

    fn finish(self, unplaced: Vec<UnplacedPart>, cancelled: bool) -> PlacerOutput {
        let mut placements = Vec::new();
        let mut used_stock = Vec::new();
        for inst in &self.instances {
            if inst.placements.is_empty() {
                continue;
            }
            let utilization = if inst.capacity > 0.0 {
                (inst.used_length / inst.capacity).min(1.0)
            } else {
                0.0
            };
            used_stock.push(UsedStock {
                stock_id: inst.stock_id,
                instance_index: inst.instance_index,
                utilization,
                virtual_stock: inst.virtual_stock,
            });
            placements.extend(inst.placements.iter().copied());
        }
        placements.sort_by(|a, b| {
            a.stock_id
                .cmp(&b.stock_id)
                .then_with(|| a.stock_instance_index.cmp(&b.stock_instance_index))
                .then_with(|| a.start_position.partial_cmp(&b.start_position).unwrap())
        });

        PlacerOutput {
            placements,
            unplaced,
            used_stock,
            warnings: self.warnings,
            cancelled,
        }
    }

    fn smallest_remaining_hint(&self) -> f64 {
        1.0
    }

    /// Attempts to fit a chain atomically into an existing instance, growing unlimited stock or
    /// falling back to repacking/splitting/virtual stock as described in §4.3 steps 4-7.
    fn place_chain(&mut self, chain: &'a Chain, unplaced: &mut Vec<UnplacedPart>) {
        let required = chain.total_length;

        if let Some(idx) = self.find_fit(required) {
            self.append_chain(idx, chain);
            return;
        }

        if self.grow_unlimited_for(required) {
            if let Some(idx) = self.find_fit(required) {
                self.append_chain(idx, chain);
                return;
            }
        }

        if chain.connections.len() >= 1 {
            let (left, right) = chain.split_at_weakest(&self.lengths);
            let msg = format!(
                "chain {} split at its weakest connection to fit available stock",
                chain.id
            );
            tracing::warn!("{}", msg);
            self.warnings.push(msg);
            self.place_chain_halves(left, right, unplaced);
            return;
        }

        if self.try_repack(required) {
            if let Some(idx) = self.find_fit(required) {
                self.append_chain(idx, chain);
                return;
            }
        }

        self.allocate_virtual(required);
        if let Some(idx) = self.find_fit(required) {
            self.append_chain(idx, chain);
        } else {
            for (r, _) in &chain.instances {
                unplaced.push(UnplacedPart {
                    part_id: r.0,
                    instance_id: r.1,
                    reason: "no stock instance (including virtual) could fit this chain".into(),
                });
            }
        }
    }

    /// A split chain's halves no longer need to be placed atomically; each is retried as its own
    /// chain (falling further back to per-instance placement if a half is itself a single item).
    fn place_chain_halves(&mut self, left: Chain, right: Chain, unplaced: &mut Vec<UnplacedPart>) {
        for half in [left, right] {
            if half.instances.len() <= 1 {
                for (r, _) in &half.instances {
                    self.place_loose(*r, unplaced);
                }
            } else {
                self.place_chain_owned(half, unplaced);
            }
        }
    }

    /// Like `place_chain` but for an owned `Chain` produced by a split (no further re-splitting,
    /// to keep the fallback bounded).
    fn place_chain_owned(&mut self, chain: Chain, unplaced: &mut Vec<UnplacedPart>) {
        let required = chain.total_length;
        if let Some(idx) = self.find_fit(required) {
            self.append_chain_owned(idx, &chain);
            return;
        }
        if self.grow_unlimited_for(required) {
            if let Some(idx) = self.find_fit(required) {
                self.append_chain_owned(idx, &chain);
                return;
            }
        }
        if self.try_repack(required) {
            if let Some(idx) = self.find_fit(required) {
                self.append_chain_owned(idx, &chain);
                return;
            }
        }
        self.allocate_virtual(required);
        if let Some(idx) = self.find_fit(required) {
            self.append_chain_owned(idx, &chain);
        } else {
            for (r, _) in &chain.instances {
                unplaced.push(UnplacedPart {
                    part_id: r.0,
                    instance_id: r.1,
                    reason: "no stock instance (including virtual) could fit this chain half"
                        .into(),
                });
            }
        }
    }

    fn place_loose(&mut self, r: InstanceRef, unplaced: &mut Vec<UnplacedPart>) {
        let length = self.lengths[&r];

        if length > self.longest_any_stock() {
            unplaced.push(UnplacedPart {
                part_id: r.0,
                instance_id: r.1,
                reason: Error::PartTooLong {
                    part_id: r.0,
                    instance_id: r.1,
                    length,
                }
                .to_string(),
            });
            return;
        }

        if let Some(idx) = self.find_fit(length) {
            self.append_loose(idx, r, length);
            return;
        }

        if self.grow_unlimited_for(length) {
            if let Some(idx) = self.find_fit(length) {
                self.append_loose(idx, r, length);
                return;
            }
        }

        if self.try_repack(length) {
            if let Some(idx) = self.find_fit(length) {
                self.append_loose(idx, r, length);
                return;
            }
        }

        self.allocate_virtual(length);
        if let Some(idx) = self.find_fit(length) {
            self.append_loose(idx, r, length);
        } else {
            unplaced.push(UnplacedPart {
                part_id: r.0,
                instance_id: r.1,
                reason: "no stock instance (including virtual) could fit this part".into(),
            });
        }
    }

    fn longest_any_stock(&self) -> f64 {
        self.stocks
            .iter()
            .map(|s| s.usable_length(&self.config.constraints))
            .fold(0.0, f64::max)
            .max(
                self.instances
                    .iter()
                    .map(|i| i.capacity)
                    .fold(0.0, f64::max),
            )
    }

    fn find_fit(&self, required: f64) -> Option<usize> {
        let cutting_loss = self.config.constraints.cutting_loss;
        self.instances
            .iter()
            .position(|inst| inst.effective_capacity(cutting_loss) >= required)
    }

    fn append_chain(&mut self, idx: usize, chain: &Chain) {
        self.append_chain_owned(idx, chain);
    }

    fn append_chain_owned(&mut self, idx: usize, chain: &Chain) {
        let cutting_loss = self.config.constraints.cutting_loss;
        let front_end_loss = self.config.constraints.front_end_loss;
        let smallest_remaining = self.smallest_remaining_hint();
        let mut prev: Option<InstanceRef> = None;

        for (i, (r, flip)) in chain.instances.iter().enumerate() {
            let inst = &mut self.instances[idx];
            let length = self.lengths[r];

            let connection_savings = if i > 0 {
                chain.connections.get(i - 1).map(|c| c.savings)
            } else {
                None
            };

            // A shared cut replaces the normal kerf gap entirely: the two mitred ends are parted
            // by one blade pass instead of two, so the next instance starts `savings` mm earlier
            // than a plain kerf gap would put it, rather than `cutting_loss` mm later.
            let start = match connection_savings {
                Some(savings) => (front_end_loss + inst.used_length) - savings,
                None => {
                    let kerf = if inst.used_length > 0.0 { cutting_loss } else { 0.0 };
                    front_end_loss + inst.used_length + kerf
                }
            };

            let shared_cut_info = match (prev, connection_savings) {
                (Some(p), Some(savings)) => Some(SharedCutInfo {
                    paired_part_id: p.0,
                    paired_instance_id: p.1,
                    savings,
                }),
                _ => None,
            };

            inst.placements.push(Placement {
                part_id: r.0,
                instance_id: r.1,
                stock_id: inst.stock_id,
                stock_instance_index: inst.instance_index,
                start_position: start,
                length,
                flipped: *flip,
                shared_cut_info,
            });
            inst.used_length = start + length - front_end_loss;
            inst.mark_state(smallest_remaining, cutting_loss);
            self.chain_members.insert(*r);
            prev = Some(*r);
        }
    }

    fn append_loose(&mut self, idx: usize, r: InstanceRef, length: f64) {
        let cutting_loss = self.config.constraints.cutting_loss;
        let front_end_loss = self.config.constraints.front_end_loss;
        let smallest_remaining = self.smallest_remaining_hint();
        let inst = &mut self.instances[idx];
        let kerf = if inst.used_length > 0.0 { cutting_loss } else { 0.0 };
        let start = front_end_loss + inst.used_length + kerf;

        inst.placements.push(Placement {
            part_id: r.0,
            instance_id: r.1,
            stock_id: inst.stock_id,
            stock_instance_index: inst.instance_index,
            start_position: start,
            length,
            flipped: Flip::None,
            shared_cut_info: None,
        });
        inst.used_length = start + length - front_end_loss;
        inst.mark_state(smallest_remaining, cutting_loss);
    }

    /// Grows an unlimited-supply stock type whose capacity suffices, preferring the shortest such
    /// type (least waste). Returns whether at least one new instance was allocated.
    ///
    /// `unlimited_batch_cap` bounds a single miss's growth, not the stock type's lifetime total
    /// across the run - `quantity == 0` means genuinely unlimited supply, so each miss
    /// independently gets up to `min(unlimited_batch_size, unlimited_batch_cap)` fresh instances.
    fn grow_unlimited_for(&mut self, required: f64) -> bool {
        let mut candidates: Vec<&Stock> = self
            .stocks
            .iter()
            .filter(|s| s.is_unlimited() && s.usable_length(&self.config.constraints) >= required)
            .collect();
        candidates.sort_by(|a, b| a.length.cmp(&b.length));

        let Some(stock) = candidates.into_iter().next() else {
            return false;
        };

        let batch = self.config.unlimited_batch_size.min(self.config.unlimited_batch_cap);
        let capacity = stock.usable_length(&self.config.constraints);
        let existing_count = self
            .instances
            .iter()
            .filter(|i| i.stock_id == stock.id)
            .count() as u32;

        for offset in 0..batch {
            self.instances.push(StockInstance::new(
                stock.id,
                existing_count + offset,
                capacity,
                false,
            ));
        }
        true
    }

    /// Bounded eviction search: frees room in an instance by moving out smaller placements and
    /// re-placing them, up to `MAX_REPACK_SWAPS` attempts. Never evicts a member of an
    /// already-placed chain - not even its first instance, whose `shared_cut_info` is `None` just
    /// like a loose item's - so a placed chain can never be silently split apart by repacking.
    fn try_repack(&mut self, required: f64) -> bool {
        let cutting_loss = self.config.constraints.cutting_loss;
        let mut swaps = 0;

        while swaps < MAX_REPACK_SWAPS {
            let candidate = self.instances.iter().enumerate().find_map(|(idx, inst)| {
                let slack = inst.effective_capacity(cutting_loss);
                if slack >= required {
                    return None;
                }
                inst.placements
                    .iter()
                    .enumerate()
                    .find(|(_, p)| {
                        p.length + slack >= required
                            && p.shared_cut_info.is_none()
                            && !self.chain_members.contains(&(p.part_id, p.instance_id))
                    })
                    .map(|(pidx, _)| (idx, pidx))
            });

            let Some((inst_idx, pidx)) = candidate else {
                return false;
            };

            let evicted = self.instances[inst_idx].placements.remove(pidx);
            self.recompute_instance(inst_idx, cutting_loss);
            swaps += 1;

            let evictee_ref = (evicted.part_id, evicted.instance_id);
            let evictee_len = evicted.length;
            if let Some(idx) = self.find_fit(evictee_len) {
                self.append_loose(idx, evictee_ref, evictee_len);
            } else {
                // Re-queue at its original spot; the outer caller retries `required` next.
                self.instances[inst_idx].placements.push(evicted);
                self.recompute_instance(inst_idx, cutting_loss);
                continue;
            }

            if self.instances[inst_idx].effective_capacity(cutting_loss) >= required {
                return true;
            }
        }
        false
    }

    fn recompute_instance(&mut self, idx: usize, cutting_loss: f64) {
        let inst = &mut self.instances[idx];
        let front_end_loss = self.config.constraints.front_end_loss;
        let mut used = 0.0;
        for (i, p) in inst.placements.iter().enumerate() {
            let kerf = if i > 0 { cutting_loss } else { 0.0 };
            used += p.length + kerf;
        }
        inst.used_length = used;
        inst.mark_state(1.0, cutting_loss);
        let _ = front_end_loss;
    }

    /// Allocates a virtual (fabricated) stock instance as a last resort. Its length is the larger
    /// of the required length (plus end losses) and the longest real stock length, so it is never
    /// suspiciously undersized relative to the rest of the run.
    fn allocate_virtual(&mut self, required: f64) {
        let front_end_loss = self.config.constraints.front_end_loss;
        let back_end_loss = self.config.constraints.back_end_loss;
        let smallest_stock_len = self
            .stocks
            .iter()
            .map(|s| s.length as f64)
            .fold(f64::INFINITY, f64::min);
        let smallest_stock_len = if smallest_stock_len.is_finite() {
            smallest_stock_len
        } else {
            0.0
        };

        let total_len = (required + front_end_loss + back_end_loss).max(smallest_stock_len);
        let capacity = (total_len - front_end_loss - back_end_loss).max(required);

        let virtual_stock_id = self
            .stocks
            .iter()
            .map(|s| s.id)
            .max()
            .unwrap_or(0)
            .saturating_add(1_000_000);
        let existing_count = self
            .instances
            .iter()
            .filter(|i| i.stock_id == virtual_stock_id)
            .count() as u32;

        self.instances.push(StockInstance::new(
            virtual_stock_id,
            existing_count,
            capacity,
            true,
        ));
        let msg = format!(
            "{}: allocated virtual stock instance (capacity {:.1}mm) to place a part with no fitting real stock",
            Error::ExhaustedFiniteStock,
            capacity
        );
        tracing::warn!("{}", msg);
        self.warnings.push(msg);
    }
}
