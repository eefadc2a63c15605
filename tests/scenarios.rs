use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bar_cut_optimizer::{Angles, Config, Constraints, Optimizer, Part, Stock};

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

fn square_part(id: u32, length: u32, quantity: u32) -> Part {
    Part {
        id,
        length,
        quantity,
        angles: Angles::default(),
        thickness: None,
    }
}

#[test]
fn identical_parts_savings() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(Part {
            id: 1,
            length: 1000,
            quantity: 4,
            angles: Angles { tl: 33, tr: 0, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_stock(Stock { id: 1, length: 6000, quantity: 0 });

    let (result, _) = optimizer.optimize_without_cancellation(|_, _| {}).unwrap();

    assert!(result.success);
    assert_eq!(result.placed_parts.len(), 4);
    assert!(result.unplaced_parts.is_empty());
    assert_eq!(result.used_stock.len(), 1);
    assert_eq!(result.chains_built, 1);

    let expected_savings = 20.0 / (33f64.to_radians().sin());
    assert!((result.total_savings - 3.0 * expected_savings).abs() < 0.5);

    let mut placements = result.placed_parts.clone();
    placements.sort_by(|a, b| a.start_position.partial_cmp(&b.start_position).unwrap());
    assert!((placements[0].start_position - 10.0).abs() < 1e-6);
    assert!((placements[1].start_position - (1010.0 - expected_savings)).abs() < 0.5);
}

#[test]
fn mixed_chain_across_two_types() {
    // Each part type has only one instance, so the same-part Chain Builder pass (which needs at
    // least two instances of the same part to form a chain) has nothing to claim, leaving both
    // instances free for the mixed-type pass to pair across types.
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(Part {
            id: 1,
            length: 1000,
            quantity: 1,
            angles: Angles { tl: 33, tr: 0, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_part(Part {
            id: 2,
            length: 1000,
            quantity: 1,
            angles: Angles { tl: 0, tr: 33, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_stock(Stock { id: 1, length: 4000, quantity: 1 });

    let (result, _) = optimizer.optimize_without_cancellation(|_, _| {}).unwrap();

    assert!(result.success);
    assert_eq!(result.placed_parts.len(), 2);
    assert!(result.unplaced_parts.is_empty());
    assert!(result.chains_built >= 1);
    assert!(result.mixed_chains >= 1);

    let has_cross_type_connection = result.placed_parts.iter().any(|p| {
        p.shared_cut_info
            .map(|s| s.paired_part_id != p.part_id)
            .unwrap_or(false)
    });
    assert!(has_cross_type_connection);
}

#[test]
fn tolerance_bridges_unequal_angles() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(Part {
            id: 1,
            length: 1000,
            quantity: 1,
            angles: Angles { tl: 32, tr: 0, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_part(Part {
            id: 2,
            length: 1000,
            quantity: 1,
            angles: Angles { tl: 0, tr: 35, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_stock(Stock { id: 1, length: 4000, quantity: 1 });
    optimizer.set_config({
        let mut config = Config::default();
        config.set_constraints(Constraints {
            angle_tolerance: 5.0,
            ..Constraints::default()
        });
        config
    });

    let (result, _) = optimizer.optimize_without_cancellation(|_, _| {}).unwrap();
    assert!(result.success);
    let shared = result
        .placed_parts
        .iter()
        .find_map(|p| p.shared_cut_info)
        .expect("expected a shared cut between the two mismatched angles");

    let expected_savings = 20.0 / (33.5f64.to_radians().sin());
    assert!((shared.savings - expected_savings).abs() < 0.5);
}

#[test]
fn unlimited_stock_allocates_on_demand() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 4000, 10))
        .add_stock(Stock { id: 1, length: 6000, quantity: 0 });

    let (result, _) = optimizer.optimize_without_cancellation(|_, _| {}).unwrap();
    assert!(result.success);
    assert_eq!(result.placed_parts.len(), 10);
    assert_eq!(result.used_stock.len(), 10);
    assert!(result.used_stock.iter().all(|u| !u.virtual_stock));
    for used in &result.used_stock {
        assert!((used.utilization - (4000.0 + 20.0) / 6000.0).abs() < 0.01);
    }
}

#[test]
fn part_too_long_is_unplaced_and_unsuccessful_for_that_part() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 7000, 1))
        .add_stock(Stock { id: 1, length: 6000, quantity: 0 });

    let (result, _) = optimizer.optimize_without_cancellation(|_, _| {}).unwrap();
    assert!(!result.success);
    assert!(result.placed_parts.is_empty());
    assert_eq!(result.unplaced_parts.len(), 1);
    assert!(result.unplaced_parts[0].reason.contains("length") || result.unplaced_parts[0].reason.contains("7000"));
}

#[test]
fn cancellation_midway_yields_partial_nonoverlapping_result() {
    let mut optimizer = Optimizer::new();
    optimizer.add_parts((0..2000).map(|i| square_part(i, 500 + (i % 7), 1)));
    optimizer.add_stock(Stock { id: 1, length: 3000, quantity: 0 });

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_for_callback = cancel.clone();
    let mut reached_40 = false;
    let mut max_seen = 0u8;

    let (result, _) = optimizer
        .optimize(cancel.clone(), |p, _| {
            assert!(p >= max_seen);
            max_seen = p;
            if p >= 40 {
                reached_40 = true;
                cancel_for_callback.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        })
        .unwrap();

    assert!(reached_40);
    assert!(!result.success);
    assert!(result.warnings.iter().any(|w| w.contains("cancelled")));

    // No two placements within the same stock instance may overlap, and every gap must honor
    // the configured kerf.
    use std::collections::HashMap;
    let mut by_instance: HashMap<(u32, u32), Vec<(f64, f64)>> = HashMap::new();
    for placement in &result.placed_parts {
        by_instance
            .entry((placement.stock_id, placement.stock_instance_index))
            .or_default()
            .push((placement.start_position, placement.length));
    }
    for spans in by_instance.values() {
        let mut spans = spans.clone();
        spans.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for window in spans.windows(2) {
            let (start_a, len_a) = window[0];
            let (start_b, _) = window[1];
            assert!(start_b >= start_a + len_a - 1e-6);
        }
    }
}

#[test]
fn square_corners_single_part_places_at_front_end_loss() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 1000, 1))
        .add_stock(Stock { id: 1, length: 3000, quantity: 1 });

    let (result, _) = optimizer.optimize_without_cancellation(|_, _| {}).unwrap();
    assert_eq!(result.placed_parts.len(), 1);
    assert_eq!(result.chains_built, 0);
    assert!((result.placed_parts[0].start_position - 10.0).abs() < 1e-6);
}
