use super::*;

#[test]
fn steady_improvement_never_converges() {
    let mut t = ConvergenceTracker::new(ConvergenceConfig::default());
    let mut cost = 1000.0;
    for _ in 0..50 {
        assert!(!t.update(cost));
        cost *= 0.95;
    }
    assert_eq!(t.stale_count(), 0);
}

#[test]
fn converges_on_the_patience_th_stale_update() {
    let cfg = ConvergenceConfig::default().with_patience(3);
    let mut t = ConvergenceTracker::new(cfg);
    assert!(!t.update(100.0));
    assert!(!t.update(99.99));
    assert_eq!(t.stale_count(), 1);
    assert!(!t.update(99.98));
    assert_eq!(t.stale_count(), 2);
    assert!(t.update(99.97));
    assert_eq!(t.stale_count(), 3);
}

#[test]
fn significant_step_resets_stale_count() {
    let mut t = ConvergenceTracker::new(ConvergenceConfig::default().with_patience(2));
    t.update(100.0);
    assert!(!t.update(100.0));
    assert!(!t.update(50.0));
    assert_eq!(t.stale_count(), 0);
    assert!(!t.update(50.0));
    assert!(t.update(49.99));
}

#[test]
fn stale_updates_compare_against_last_significant_cost() {
    // Many tiny improvements add up to a significant one.
    let mut t = ConvergenceTracker::new(
        ConvergenceConfig::default()
            .with_patience(10)
            .with_threshold(0.01),
    );
    t.update(100.0);
    for c in [99.7, 99.4] {
        assert!(!t.update(c));
    }
    assert_eq!(t.stale_count(), 2);
    assert!(!t.update(98.9));
    assert_eq!(t.stale_count(), 0);
}

#[test]
fn disabled_never_converges_but_tracks_best() {
    let mut t = ConvergenceTracker::new(ConvergenceConfig::disabled());
    for c in [5.0, 5.0, 5.0, 5.0, 5.0, 2.0, 7.0] {
        assert!(!t.update(c));
    }
    assert_eq!(t.best_cost(), 2.0);
    assert_eq!(t.history().len(), 7);
}

#[test]
fn best_cost_is_running_minimum() {
    let mut t = ConvergenceTracker::new(ConvergenceConfig::default().with_patience(100));
    assert_eq!(t.best_cost(), f64::INFINITY);
    let seq = [9.0, 3.0, 4.0, 1.5, 8.0, 1.5, 2.0];
    let mut min = f64::INFINITY;
    for c in seq {
        t.update(c);
        min = min.min(c);
        assert_eq!(t.best_cost(), min);
    }
    assert_eq!(t.history(), &seq);
}

#[test]
fn reset_restores_initial_state() {
    let mut t = ConvergenceTracker::new(ConvergenceConfig::default().with_patience(1));
    t.update(10.0);
    assert!(t.update(10.0));
    t.reset();
    assert_eq!(t.best_cost(), f64::INFINITY);
    assert_eq!(t.stale_count(), 0);
    assert!(t.history().is_empty());
    assert!(!t.update(10.0));
}

#[test]
fn config_round_trips_through_json_with_defaults() {
    let cfg: ConvergenceConfig = serde_json::from_str(r#"{"patience": 7}"#).unwrap();
    assert_eq!(cfg.patience, 7);
    assert!(cfg.enabled);
    assert_eq!(cfg.threshold, 0.001);
}
