use super::*;

fn square_part(id: u32, length: u32, quantity: u32) -> Part {
    Part {
        id,
        length,
        quantity,
        angles: Angles::default(),
        thickness: None,
    }
}

fn run(optimizer: &Optimizer) -> (PlacementResult, RunStats) {
    optimizer
        .optimize_without_cancellation(|_, _| {})
        .expect("valid input should never error")
}

#[test]
fn empty_population_returns_empty_success() {
    let optimizer = Optimizer::new();
    let (result, stats) = run(&optimizer);
    assert!(result.success);
    assert!(result.placed_parts.is_empty());
    assert_eq!(stats.total_instances, 0);
}

#[test]
fn places_square_parts_onto_finite_stock() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 1000, 2))
        .add_part(square_part(2, 1500, 1))
        .add_stock(Stock { id: 1, length: 3000, quantity: 2 });

    let (result, stats) = run(&optimizer);
    assert!(result.success);
    assert_eq!(result.placed_parts.len(), 3);
    assert!(result.unplaced_parts.is_empty());
    assert_eq!(stats.total_instances, 3);
    assert_eq!(stats.angled_instances, 0);
}

#[test]
fn identical_mitred_parts_share_cuts_and_report_savings() {
    // Every instance shares the same corner angle, so the Chain Builder should chain all four
    // together and the Placer should report savings on every non-leading placement.
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(Part {
            id: 1,
            length: 1000,
            quantity: 4,
            angles: Angles { tl: 0, tr: 45, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_stock(Stock { id: 1, length: 5000, quantity: 1 });

    let (result, _) = run(&optimizer);
    assert!(result.success);
    assert_eq!(result.placed_parts.len(), 4);
    assert!(result.chains_built >= 1);
    assert!(result.total_savings > 0.0);
    let shared_count = result
        .placed_parts
        .iter()
        .filter(|p| p.shared_cut_info.is_some())
        .count();
    assert!(shared_count >= 3);
}

#[test]
fn mixed_part_types_can_chain_across_each_other() {
    // Two part types with matching corner angles should be eligible to chain together even
    // though they have different ids and lengths (spec scenario: mixed-type chaining).
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(Part {
            id: 1,
            length: 1200,
            quantity: 1,
            angles: Angles { tl: 0, tr: 30, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_part(Part {
            id: 2,
            length: 900,
            quantity: 1,
            angles: Angles { tl: 30, tr: 0, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_stock(Stock { id: 1, length: 5000, quantity: 1 });

    let (result, _) = run(&optimizer);
    assert!(result.success);
    assert_eq!(result.placed_parts.len(), 2);
    assert!(result.mixed_chains >= 1);
}

#[test]
fn angle_tolerance_bridges_close_but_unequal_angles() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(Part {
            id: 1,
            length: 1000,
            quantity: 1,
            angles: Angles { tl: 0, tr: 32, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_part(Part {
            id: 2,
            length: 1000,
            quantity: 1,
            angles: Angles { tl: 35, tr: 0, bl: 0, br: 0 },
            thickness: Some(20),
        })
        .add_stock(Stock { id: 1, length: 5000, quantity: 1 });
    optimizer.set_config({
        let mut config = Config::default();
        config.set_constraints(Constraints {
            angle_tolerance: 5.0,
            ..Constraints::default()
        });
        config
    });

    let (result, _) = run(&optimizer);
    assert!(result.success);
    let shared_count = result
        .placed_parts
        .iter()
        .filter(|p| p.shared_cut_info.is_some())
        .count();
    assert_eq!(shared_count, 1);
}

#[test]
fn unlimited_stock_grows_on_demand() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 400, 12))
        .add_stock(Stock { id: 1, length: 1000, quantity: 0 });

    let (result, _) = run(&optimizer);
    assert!(result.success);
    assert_eq!(result.placed_parts.len(), 12);
    assert!(result.used_stock.len() > 1);
    assert!(result.used_stock.iter().all(|u| !u.virtual_stock));
}

#[test]
fn part_longer_than_any_stock_is_reported_unplaced() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 5000, 1))
        .add_stock(Stock { id: 1, length: 500, quantity: 1 });

    let (result, _) = run(&optimizer);
    assert!(!result.success);
    assert!(result.placed_parts.is_empty());
    assert_eq!(result.unplaced_parts.len(), 1);
    assert_eq!(result.unplaced_parts[0].part_id, 1);
}

#[test]
fn cancellation_before_placement_yields_unsuccessful_result() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 500, 5))
        .add_stock(Stock { id: 1, length: 3000, quantity: 5 });

    let cancel = Arc::new(AtomicBool::new(true));
    let (result, _) = optimizer.optimize(cancel, |_, _| {}).unwrap();
    assert!(!result.success);
}

#[test]
fn invalid_part_length_is_rejected_before_placement() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 0, 1))
        .add_stock(Stock { id: 1, length: 3000, quantity: 1 });

    let err = optimizer.optimize_without_cancellation(|_, _| {}).unwrap_err();
    assert!(matches!(err, Error::InvalidPart { .. }));
}

#[test]
fn invalid_angles_on_same_side_are_rejected() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(Part {
            id: 1,
            length: 1000,
            quantity: 1,
            angles: Angles { tl: 20, tr: 0, bl: 20, br: 0 },
            thickness: None,
        })
        .add_stock(Stock { id: 1, length: 3000, quantity: 1 });

    let err = optimizer.optimize_without_cancellation(|_, _| {}).unwrap_err();
    assert!(matches!(err, Error::InvalidPart { .. }));
}

#[test]
fn invalid_stock_length_is_rejected_before_placement() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 500, 1))
        .add_stock(Stock { id: 1, length: 0, quantity: 1 });

    let err = optimizer.optimize_without_cancellation(|_, _| {}).unwrap_err();
    assert!(matches!(err, Error::InvalidStock { .. }));
}

#[test]
fn invalid_config_negative_tolerance_is_rejected() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 500, 1))
        .add_stock(Stock { id: 1, length: 3000, quantity: 1 });
    optimizer.set_config({
        let mut config = Config::default();
        config.set_constraints(Constraints {
            angle_tolerance: -1.0,
            ..Constraints::default()
        });
        config
    });

    let err = optimizer.optimize_without_cancellation(|_, _| {}).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
}

#[test]
fn add_stock_with_matching_id_sums_finite_quantities() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_stock(Stock { id: 1, length: 3000, quantity: 2 })
        .add_stock(Stock { id: 1, length: 3000, quantity: 3 });
    assert_eq!(optimizer.stocks.len(), 1);
    assert_eq!(optimizer.stocks[0].quantity, 5);
}

#[test]
fn add_stock_with_unlimited_quantity_wins_merge() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_stock(Stock { id: 1, length: 3000, quantity: 2 })
        .add_stock(Stock { id: 1, length: 3000, quantity: 0 });
    assert_eq!(optimizer.stocks.len(), 1);
    assert!(optimizer.stocks[0].is_unlimited());
}

#[test]
fn progress_callback_reaches_100_and_never_decreases() {
    let mut optimizer = Optimizer::new();
    optimizer
        .add_part(square_part(1, 500, 4))
        .add_stock(Stock { id: 1, length: 3000, quantity: 2 });

    let mut last = 0u8;
    let mut saw_100 = false;
    optimizer
        .optimize_without_cancellation(|p, _| {
            assert!(p >= last);
            last = p;
            if p == 100 {
                saw_100 = true;
            }
        })
        .unwrap();
    assert!(saw_100);
}
