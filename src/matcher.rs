//! Angle Matcher: enumerates shared-cut candidates across a `PartInstance` population.
//!
//! Grounded in the teacher crate's bucketed free-rectangle scoring (`guillotine::score_by_heuristic`)
//! generalized from 2D rectangle scoring to 1D angle-bucket scoring, and in its `FnvHashSet`
//! usage for fast, low-overhead set membership.

use fnv::FnvHashMap;
use std::cmp::Ordering;

use crate::model::{Corner, InstanceRef, PartInstance};
use crate::rng::Sampler;

/// A candidate shared cut between two corner-angle slots on two distinct part instances.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AngleMatch {
    pub(crate) instance1: InstanceRef,
    pub(crate) slot1: Corner,
    pub(crate) instance2: InstanceRef,
    pub(crate) slot2: Corner,
    pub(crate) representative_angle: f64,
    pub(crate) exact: bool,
    pub(crate) angle_diff: f64,
    pub(crate) score: f64,
}

/// Cheap probe over a population of parts, used by the facade to decide whether building mixed
/// chains (Chain Builder Phase B) is worth the extra pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MatchPotential {
    pub(crate) match_count: usize,
    pub(crate) total_potential_savings: f64,
    pub(crate) average_savings_per_match: f64,
}

/// `SAVINGS_CAP` default, in millimeters - the most a single shared cut can save.
pub(crate) const DEFAULT_SAVINGS_CAP: f64 = 50.0;

/// Penalty subtracted from a match's score per degree of angle difference, so that closer
/// matches are preferred even when their raw savings are equal.
const PENALTY_PER_DEGREE: f64 = 0.5;

/// `thickness / sin(angle)`, clamped to `savings_cap`. Undefined/zero at `0°` or `90°`.
pub(crate) fn savings_for(angle: f64, thickness: f64, savings_cap: f64) -> f64 {
    if angle <= 0.0 || angle >= 90.0 {
        return 0.0;
    }
    let raw = thickness / angle.to_radians().sin();
    raw.min(savings_cap)
}

/// Length- and angle-dependent default thickness (mm) when a `Part` doesn't specify one.
///
/// Short parts (< 500 mm) default toward the low end of 10-15 mm, long parts (>= 2000 mm) toward
/// the high end of 25-30 mm, everything else to 20 mm. The default is then bumped for steep
/// mitres: x1.5 if any contributing angle is below 30°, else x1.2 if below 45°. The two
/// multipliers don't stack - the steepest applicable bump wins.
pub(crate) fn default_thickness(length: u32, angle: f64) -> u32 {
    let base: f64 = if length < 500 {
        12.0
    } else if length >= 2000 {
        27.0
    } else {
        20.0
    };

    let bumped = if angle > 0.0 && angle < 30.0 {
        base * 1.5
    } else if angle > 0.0 && angle < 45.0 {
        base * 1.2
    } else {
        base
    };

    bumped.round() as u32
}

fn penalty(angle_diff: f64) -> f64 {
    angle_diff * PENALTY_PER_DEGREE
}

/// True iff `a` and `b` are both non-zero mitre angles within `tolerance` of each other. A `0°`
/// slot has no mitre and can never contribute to a shared cut.
pub(crate) fn can_share(a: f64, b: f64, tolerance: f64) -> bool {
    a > 0.0 && b > 0.0 && (a - b).abs() <= tolerance
}

#[derive(Clone, Copy)]
struct Slot {
    instance_ref: InstanceRef,
    corner: Corner,
    angle: f64,
    thickness: f64,
}

fn collect_slots(parts: &[PartInstance]) -> Vec<Slot> {
    let mut slots = Vec::with_capacity(parts.len() * 2);
    for part in parts {
        for corner in Corner::ALL {
            let angle = part.angles.get(corner) as f64;
            if angle > 0.0 {
                slots.push(Slot {
                    instance_ref: part.instance_ref(),
                    corner,
                    angle,
                    thickness: part.thickness as f64,
                });
            }
        }
    }
    slots
}

fn bucket_key(angle: f64, tolerance: f64) -> i64 {
    if tolerance <= 0.0 {
        // tolerance = 0 => only exact matches; one bucket per distinct integer degree.
        (angle * 1000.0).round() as i64
    } else {
        (angle / tolerance).floor() as i64
    }
}

fn bucketize(slots: &[Slot], tolerance: f64) -> FnvHashMap<i64, Vec<usize>> {
    let mut buckets: FnvHashMap<i64, Vec<usize>> = FnvHashMap::default();
    for (i, slot) in slots.iter().enumerate() {
        buckets
            .entry(bucket_key(slot.angle, tolerance))
            .or_default()
            .push(i);
    }
    buckets
}

fn build_match(slots: &[Slot], i: usize, j: usize, savings_cap: f64) -> Option<AngleMatch> {
    let a = slots[i];
    let b = slots[j];
    if a.instance_ref == b.instance_ref {
        return None;
    }
    let representative_angle = (a.angle + b.angle) / 2.0;
    let angle_diff = (a.angle - b.angle).abs();
    let thickness = a.thickness.min(b.thickness);
    let score = savings_for(representative_angle, thickness, savings_cap) - penalty(angle_diff);

    Some(AngleMatch {
        instance1: a.instance_ref,
        slot1: a.corner,
        instance2: b.instance_ref,
        slot2: b.corner,
        representative_angle,
        exact: angle_diff == 0.0,
        angle_diff,
        score,
    })
}

/// Enumerates shared-cut candidates across `parts`, sorted by descending score (ties broken by
/// exactness, then smaller angle difference, then lower endpoint ids for full determinism).
#[tracing::instrument(skip(parts))]
pub(crate) fn find_matches(
    parts: &[PartInstance],
    tolerance: f64,
    savings_cap: f64,
    sample_cap: usize,
    seed: u64,
) -> Vec<AngleMatch> {
    let mut slots = collect_slots(parts);

    if slots.len() > sample_cap {
        let mut sampler = Sampler::new(seed);
        let indices = sampler.sample_indices(slots.len(), sample_cap);
        slots = indices.into_iter().map(|i| slots[i]).collect();
    }

    let buckets = bucketize(&slots, tolerance);
    let mut bucket_keys: Vec<i64> = buckets.keys().copied().collect();
    bucket_keys.sort_unstable();

    let mut matches = Vec::new();
    let mut seen_pairs: std::collections::HashSet<(usize, usize)> = std::collections::HashSet::new();

    for &key in &bucket_keys {
        let same = &buckets[&key];
        for a in 0..same.len() {
            for b in (a + 1)..same.len() {
                try_add_match(&slots, same[a], same[b], tolerance, savings_cap, &mut seen_pairs, &mut matches);
            }
        }

        if let Some(next) = buckets.get(&(key + 1)) {
            for &i in same {
                for &j in next {
                    try_add_match(&slots, i, j, tolerance, savings_cap, &mut seen_pairs, &mut matches);
                }
            }
        }
    }

    // Rarity tie-break: prefer matches touching a part instance with fewer other matches.
    let mut touch_count: FnvHashMap<InstanceRef, usize> = FnvHashMap::default();
    for m in &matches {
        *touch_count.entry(m.instance1).or_insert(0) += 1;
        *touch_count.entry(m.instance2).or_insert(0) += 1;
    }
    let rarity = |m: &AngleMatch| -> usize {
        touch_count[&m.instance1].min(touch_count[&m.instance2])
    };

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.exact.cmp(&a.exact))
            .then_with(|| a.angle_diff.partial_cmp(&b.angle_diff).unwrap_or(Ordering::Equal))
            .then_with(|| rarity(a).cmp(&rarity(b)))
            .then_with(|| a.instance1.cmp(&b.instance1))
            .then_with(|| a.instance2.cmp(&b.instance2))
    });

    matches
}

fn try_add_match(
    slots: &[Slot],
    i: usize,
    j: usize,
    tolerance: f64,
    savings_cap: f64,
    seen_pairs: &mut std::collections::HashSet<(usize, usize)>,
    matches: &mut Vec<AngleMatch>,
) {
    if !can_share(slots[i].angle, slots[j].angle, tolerance) {
        return;
    }
    let key = if i < j { (i, j) } else { (j, i) };
    if !seen_pairs.insert(key) {
        return;
    }
    if let Some(m) = build_match(slots, i, j, savings_cap) {
        matches.push(m);
    }
}

/// Cheap, side-effect-free probe: same pipeline as [`find_matches`] but only aggregate counters
/// are computed. Idempotent - safe to call repeatedly with the same inputs.
#[tracing::instrument(skip(parts))]
pub(crate) fn evaluate_potential(
    parts: &[PartInstance],
    tolerance: f64,
    savings_cap: f64,
    sample_cap: usize,
    seed: u64,
) -> MatchPotential {
    let total_slots = collect_slots(parts).len();
    let matches = find_matches(parts, tolerance, savings_cap, sample_cap, seed);

    let scale = if total_slots > sample_cap && sample_cap > 0 {
        total_slots as f64 / sample_cap as f64
    } else {
        1.0
    };

    let match_count = matches.len();
    let raw_savings: f64 = matches
        .iter()
        .map(|m| (m.score + penalty(m.angle_diff)).max(0.0))
        .sum();
    let total_potential_savings = raw_savings * scale;
    let average_savings_per_match = if match_count > 0 {
        total_potential_savings / match_count as f64
    } else {
        0.0
    };

    MatchPotential {
        match_count,
        total_potential_savings,
        average_savings_per_match,
    }
}
