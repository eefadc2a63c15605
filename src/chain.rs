//! Chain Builder: assembles `AngleMatch`es into linear chains of part instances joined by shared
//! cuts, under identity, uniqueness and length-cap invariants (§4.2).

use std::collections::{HashMap, HashSet};

use crate::matcher::{savings_for, AngleMatch};
use crate::model::{Angles, Corner, Flip, InstanceRef, PartInstance, Side};

/// Whether a chain consists of instances of a single part type or mixes more than one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChainStructure {
    Linear,
    Mixed,
}

/// A connection between two adjacent instances in a chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Connection {
    pub(crate) from: InstanceRef,
    pub(crate) from_side: Side,
    pub(crate) to: InstanceRef,
    pub(crate) to_side: Side,
    pub(crate) shared_angle: f64,
    pub(crate) savings: f64,
}

/// An ordered sequence of part instances joined by shared cuts, each carrying the flip (if any)
/// its connection required.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Chain {
    pub(crate) id: u32,
    pub(crate) instances: Vec<(InstanceRef, Flip)>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) total_length: f64,
    pub(crate) total_savings: f64,
    pub(crate) structure: ChainStructure,
}

impl Chain {
    pub(crate) fn is_mixed(&self) -> bool {
        self.structure == ChainStructure::Mixed
    }

    pub(crate) fn instance_refs(&self) -> impl Iterator<Item = InstanceRef> + '_ {
        self.instances.iter().map(|(r, _)| *r)
    }

    /// Splits this chain at its lowest-savings connection, returning the two halves. Used by the
    /// Placer's cross-instance repacking fallback (§4.3 step 6).
    pub(crate) fn split_at_weakest(&self, lengths: &HashMap<InstanceRef, f64>) -> (Chain, Chain) {
        debug_assert!(!self.connections.is_empty(), "cannot split a chain with no connections");

        let (weakest_idx, _) = self
            .connections
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.savings.partial_cmp(&b.savings).unwrap())
            .expect("chain with connections has a weakest one");

        let left_instances = self.instances[..=weakest_idx].to_vec();
        let right_instances = self.instances[weakest_idx + 1..].to_vec();
        let left_connections = self.connections[..weakest_idx].to_vec();
        let right_connections = self.connections[weakest_idx + 1..].to_vec();

        let build_half = |id: u32, instances: Vec<(InstanceRef, Flip)>, connections: Vec<Connection>| {
            let total_savings: f64 = connections.iter().map(|c| c.savings).sum();
            let total_length: f64 =
                instances.iter().map(|(r, _)| lengths[r]).sum::<f64>() - total_savings;
            Chain {
                id,
                instances,
                connections,
                total_length,
                total_savings,
                structure: self.structure,
            }
        };

        (
            build_half(self.id * 2, left_instances, left_connections),
            build_half(self.id * 2 + 1, right_instances, right_connections),
        )
    }
}

struct IdGen(u32);
impl IdGen {
    fn next(&mut self) -> u32 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// Builds same-part chains (Phase A) and, if `prioritize_mixed_chains`, mixed chains (Phase B).
/// Returns the built chains plus the instances that remain loose (unclaimed by any chain).
#[tracing::instrument(skip(parts, matches))]
pub(crate) fn build(
    parts: &[PartInstance],
    matches: &[AngleMatch],
    max_chain_length: usize,
    prioritize_mixed_chains: bool,
    savings_cap: f64,
) -> (Vec<Chain>, Vec<PartInstance>) {
    let mut claimed: HashSet<InstanceRef> = HashSet::new();
    let mut ids = IdGen(0);
    let mut chains =
        phase_a_same_part_chains(parts, max_chain_length, savings_cap, &mut claimed, &mut ids);

    if prioritize_mixed_chains {
        let mixed = phase_b_mixed_chains(parts, matches, max_chain_length, &mut claimed, &mut ids);
        chains.extend(mixed);
    }

    let loose: Vec<PartInstance> = parts
        .iter()
        .filter(|p| !claimed.contains(&p.instance_ref()))
        .cloned()
        .collect();

    (chains, loose)
}

fn phase_a_same_part_chains(
    parts: &[PartInstance],
    max_chain_length: usize,
    savings_cap: f64,
    claimed: &mut HashSet<InstanceRef>,
    ids: &mut IdGen,
) -> Vec<Chain> {
    let mut by_part: HashMap<u32, Vec<&PartInstance>> = HashMap::new();
    for p in parts {
        by_part.entry(p.part_id).or_default().push(p);
    }

    let mut chains = Vec::new();
    let mut part_ids: Vec<u32> = by_part.keys().copied().collect();
    part_ids.sort_unstable();

    for part_id in part_ids {
        let mut instances = by_part.remove(&part_id).unwrap();
        instances.sort_by_key(|p| p.instance_id);

        if instances.len() < 2 {
            continue;
        }
        let sample = instances[0];
        if sample.angles.all_zero() {
            continue;
        }

        let thickness = sample.thickness as f64;
        let chosen_angle = match best_shared_angle(sample.angles, thickness, savings_cap) {
            Some(angle) => angle,
            None => continue,
        };
        let savings = savings_for(chosen_angle, thickness, savings_cap);
        if savings <= 0.0 {
            continue;
        }

        let mut offset = 0;
        for size in balanced_batch_sizes(instances.len(), max_chain_length) {
            let batch = &instances[offset..offset + size];
            offset += size;

            if batch.len() < 2 {
                // A lone leftover instance stays loose, not a degenerate chain - unavoidable when
                // the instance count can't be partitioned into parts of at least 2 that are each
                // no larger than `max_chain_length` (e.g. 5 instances, a cap of 2).
                continue;
            }

            let mut chain_instances = Vec::with_capacity(batch.len());
            let mut connections = Vec::with_capacity(batch.len() - 1);

            for (i, p) in batch.iter().enumerate() {
                // Each instance has one fixed mitred corner, so meeting a neighbor on alternating
                // sides along the chain requires flipping every other member to bring that corner
                // to face the shared cut.
                let flip = if i % 2 == 1 { Flip::Horizontal } else { Flip::None };
                chain_instances.push((p.instance_ref(), flip));
                claimed.insert(p.instance_ref());
                if i > 0 {
                    connections.push(Connection {
                        from: batch[i - 1].instance_ref(),
                        from_side: Side::R,
                        to: p.instance_ref(),
                        to_side: Side::L,
                        shared_angle: chosen_angle,
                        savings,
                    });
                }
            }

            let total_savings = savings * connections.len() as f64;
            let total_length = batch.iter().map(|p| p.length as f64).sum::<f64>() - total_savings;

            chains.push(Chain {
                id: ids.next(),
                instances: chain_instances,
                connections,
                total_length,
                total_savings,
                structure: ChainStructure::Linear,
            });
        }
    }

    chains
}

/// Splits `total` instances into batches no larger than `max_len`, distributing the remainder as
/// evenly as possible across batches instead of dumping it all into a short trailing batch - e.g.
/// 7 instances with `max_len = 3` yields `[3, 2, 2]` rather than `[3, 3, 1]`. A singleton batch is
/// still possible when `total` can't be partitioned into parts of at least 2 within the cap (5
/// instances, `max_len = 2` forces `[2, 2, 1]`); that remainder stays loose, not a degenerate
/// chain, per the caller's own handling.
fn balanced_batch_sizes(total: usize, max_len: usize) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    let num_batches = (total + max_len - 1) / max_len;
    let base = total / num_batches;
    let remainder = total % num_batches;
    (0..num_batches)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Picks the mode of `angles`' non-zero values, tie-broken by largest savings.
fn best_shared_angle(angles: Angles, thickness: f64, savings_cap: f64) -> Option<f64> {
    let mut counts: HashMap<u8, usize> = HashMap::new();
    for corner in Corner::ALL {
        let a = angles.get(corner);
        if a > 0 {
            *counts.entry(a).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(a_angle, a_count), (b_angle, b_count)| {
            a_count.cmp(b_count).then_with(|| {
                let a_savings = savings_for(*a_angle as f64, thickness, savings_cap);
                let b_savings = savings_for(*b_angle as f64, thickness, savings_cap);
                a_savings.partial_cmp(&b_savings).unwrap()
            })
        })
        .map(|(angle, _)| angle as f64)
}

fn phase_b_mixed_chains(
    parts: &[PartInstance],
    matches: &[AngleMatch],
    max_chain_length: usize,
    claimed: &mut HashSet<InstanceRef>,
    ids: &mut IdGen,
) -> Vec<Chain> {
    let lengths: HashMap<InstanceRef, f64> =
        parts.iter().map(|p| (p.instance_ref(), p.length as f64)).collect();

    let mut used_match = vec![false; matches.len()];
    let mut chains = Vec::new();

    for seed_idx in 0..matches.len() {
        if used_match[seed_idx] {
            continue;
        }
        let seed = matches[seed_idx];
        if claimed.contains(&seed.instance1) || claimed.contains(&seed.instance2) {
            continue;
        }
        used_match[seed_idx] = true;

        let (from, from_corner, to, to_corner) = orient(seed);
        claimed.insert(from);
        claimed.insert(to);

        let mut flips: HashMap<InstanceRef, Flip> = HashMap::new();
        record_flip(&mut flips, from, corner_flip(from_corner, Side::R));
        record_flip(&mut flips, to, corner_flip(to_corner, Side::L));

        let mut instances: Vec<InstanceRef> = vec![from, to];
        let mut connections = vec![Connection {
            from,
            from_side: Side::R,
            to,
            to_side: Side::L,
            shared_angle: seed.representative_angle,
            savings: raw_savings(&seed),
        }];

        loop {
            if instances.len() >= max_chain_length {
                break;
            }
            let left_end = *instances.first().unwrap();
            let right_end = *instances.last().unwrap();

            let mut best: Option<(usize, bool, InstanceRef, Corner, Corner)> = None;
            for (idx, m) in matches.iter().enumerate() {
                if used_match[idx] {
                    continue;
                }
                if let Some(candidate) = extension_for(m, left_end, right_end, claimed) {
                    let better = match best {
                        None => true,
                        Some((best_idx, ..)) => m.score > matches[best_idx].score,
                    };
                    if better {
                        best = Some((idx, candidate.0, candidate.1, candidate.2, candidate.3));
                    }
                }
            }

            let (idx, extend_right, new_instance, new_corner, end_corner) = match best {
                Some(v) => v,
                None => break,
            };

            used_match[idx] = true;
            claimed.insert(new_instance);
            let m = matches[idx];
            let savings = raw_savings(&m);

            if extend_right {
                record_flip(&mut flips, right_end, corner_flip(end_corner, Side::R));
                record_flip(&mut flips, new_instance, corner_flip(new_corner, Side::L));
                connections.push(Connection {
                    from: right_end,
                    from_side: Side::R,
                    to: new_instance,
                    to_side: Side::L,
                    shared_angle: m.representative_angle,
                    savings,
                });
                instances.push(new_instance);
            } else {
                record_flip(&mut flips, left_end, corner_flip(end_corner, Side::L));
                record_flip(&mut flips, new_instance, corner_flip(new_corner, Side::R));
                connections.insert(
                    0,
                    Connection {
                        from: new_instance,
                        from_side: Side::R,
                        to: left_end,
                        to_side: Side::L,
                        shared_angle: m.representative_angle,
                        savings,
                    },
                );
                instances.insert(0, new_instance);
            }
        }

        let total_savings: f64 = connections.iter().map(|c| c.savings).sum();
        let total_length: f64 = instances.iter().map(|r| lengths[r]).sum::<f64>() - total_savings;

        let instances_with_flips: Vec<(InstanceRef, Flip)> = instances
            .iter()
            .map(|r| (*r, flips.get(r).copied().unwrap_or(Flip::None)))
            .collect();

        chains.push(Chain {
            id: ids.next(),
            instances: instances_with_flips,
            connections,
            total_length,
            total_savings,
            structure: ChainStructure::Mixed,
        });
    }

    chains
}

fn record_flip(flips: &mut HashMap<InstanceRef, Flip>, instance: InstanceRef, flip: Flip) {
    if flip != Flip::None {
        flips.entry(instance).or_insert(flip);
    }
}

/// The material savings a match contributes, independent of the rarity/penalty term folded into
/// its ranking `score`.
fn raw_savings(m: &AngleMatch) -> f64 {
    m.score + m.angle_diff * 0.5
}

/// Orients a seed match into `(from_instance, from_corner, to_instance, to_corner)` so that
/// `from`'s matched corner is on its right side and `to`'s matched corner is on its left side
/// whenever the match geometry already provides that; otherwise keeps the arbitrary instance1 /
/// instance2 order and lets `corner_flip` record whichever flips are needed.
fn orient(m: AngleMatch) -> (InstanceRef, Corner, InstanceRef, Corner) {
    match (m.slot1.side(), m.slot2.side()) {
        (Side::R, Side::L) => (m.instance1, m.slot1, m.instance2, m.slot2),
        (Side::L, Side::R) => (m.instance2, m.slot2, m.instance1, m.slot1),
        _ => (m.instance1, m.slot1, m.instance2, m.slot2),
    }
}

/// Whether placing the instance so its `corner` faces `needed_side` requires a flip.
fn corner_flip(corner: Corner, needed_side: Side) -> Flip {
    if corner.side() == needed_side {
        Flip::None
    } else {
        Flip::Horizontal
    }
}

/// If `m` connects one of `left_end`/`right_end` to a free instance, returns
/// `(extends_right, new_instance, new_corner, matched_end_corner)`.
fn extension_for(
    m: &AngleMatch,
    left_end: InstanceRef,
    right_end: InstanceRef,
    claimed: &HashSet<InstanceRef>,
) -> Option<(bool, InstanceRef, Corner, Corner)> {
    let (a_ref, a_corner, b_ref, b_corner) = (m.instance1, m.slot1, m.instance2, m.slot2);

    if a_ref == right_end && !claimed.contains(&b_ref) {
        return Some((true, b_ref, b_corner, a_corner));
    }
    if b_ref == right_end && !claimed.contains(&a_ref) {
        return Some((true, a_ref, a_corner, b_corner));
    }
    if a_ref == left_end && !claimed.contains(&b_ref) {
        return Some((false, b_ref, b_corner, a_corner));
    }
    if b_ref == left_end && !claimed.contains(&a_ref) {
        return Some((false, a_ref, a_corner, b_corner));
    }
    None
}
