use super::*;

fn sphere(target: &[f64]) -> impl FnMut(&[f64]) -> f64 + '_ {
    move |x: &[f64]| x.iter().zip(target).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[test]
fn stays_inside_bounds() {
    let lower = [0.0, -1.0, 5.0];
    let upper = [1.0, 1.0, 5.0];
    let mut opt = RandomSearch::new(RandomSearchOpts::default().with_iterations(20));
    let mut objective = |x: &[f64]| {
        for i in 0..3 {
            assert!(x[i] >= lower[i] && x[i] <= upper[i], "slot {i}: {}", x[i]);
        }
        x[0] + x[1]
    };
    let (best, cost) = opt.run(&mut objective, &lower, &upper);
    assert_eq!(best.len(), 3);
    assert_eq!(best[2], 5.0);
    assert_eq!(cost, best[0] + best[1]);
}

#[test]
fn improves_on_a_smooth_objective() {
    let target = [0.3, 0.7, 0.1, 0.9];
    let lower = [0.0; 4];
    let upper = [1.0; 4];
    let mut opt = RandomSearch::new(
        RandomSearchOpts::default()
            .with_iterations(200)
            .with_population(8),
    );
    let mut f = sphere(&target);
    let (_, cost) = opt.run(&mut f, &lower, &upper);
    assert!(cost < 1e-2, "cost {cost}");
}

#[test]
fn same_seed_same_result() {
    let target = [0.5; 6];
    let run = |seed| {
        let mut opt = RandomSearch::new(RandomSearchOpts::default().with_seed(seed));
        let mut f = sphere(&target);
        opt.run(&mut f, &[0.0; 6], &[1.0; 6])
    };
    assert_eq!(run(7), run(7));
    assert_ne!(run(7).0, run(8).0);
}

#[test]
fn counts_every_evaluation() {
    let mut opt = RandomSearch::new(
        RandomSearchOpts::default()
            .with_iterations(5)
            .with_population(3),
    );
    let mut calls = 0u64;
    let mut f = |_: &[f64]| {
        calls += 1;
        1.0
    };
    let _ = opt.run(&mut f, &[0.0; 2], &[1.0; 2]);
    assert_eq!(calls, 1 + 5 * 3);
    assert_eq!(opt.evaluations(), calls);
}

#[test]
fn warm_start_seeds_incumbent() {
    let mut opt = RandomSearch::new(RandomSearchOpts::default().with_iterations(0));
    assert!(opt.warm_start(&WarmStart {
        params: vec![0.25, 2.0],
        cost: 0.0,
    }));
    let mut f = |x: &[f64]| x[0];
    let (best, cost) = opt.run(&mut f, &[0.0; 2], &[1.0; 2]);
    assert_eq!(best, vec![0.25, 1.0]);
    assert_eq!(cost, 0.25);
}

#[test]
fn warm_start_with_wrong_length_is_ignored() {
    let mut opt = RandomSearch::new(RandomSearchOpts::default().with_iterations(0));
    opt.warm_start(&WarmStart {
        params: vec![0.5],
        cost: 0.0,
    });
    let mut f = |_: &[f64]| 0.0;
    let (best, _) = opt.run(&mut f, &[0.0; 3], &[1.0; 3]);
    assert_eq!(best.len(), 3);
}

#[test]
fn mismatched_warm_start_is_consumed_by_the_run_that_drops_it() {
    let mut opt = RandomSearch::new(RandomSearchOpts::default().with_iterations(0));
    assert!(opt.warm_start(&WarmStart {
        params: vec![0.5],
        cost: 0.0,
    }));
    let mut f = |_: &[f64]| 0.0;
    let _ = opt.run(&mut f, &[0.0; 3], &[1.0; 3]);

    // Same dimension as the stale seed: a leftover seed would pin the incumbent to 0.5.
    let mut hits = Vec::new();
    for _ in 0..4 {
        let (best, _) = opt.run(&mut f, &[0.0], &[1.0]);
        hits.push(best[0]);
    }
    assert!(hits.iter().any(|&v| v != 0.5), "{hits:?}");
}

#[test]
fn default_optimizer_ignores_warm_start() {
    struct Fixed;
    impl Optimizer for Fixed {
        fn run(
            &mut self,
            objective: &mut dyn FnMut(&[f64]) -> f64,
            lower: &[f64],
            _upper: &[f64],
        ) -> (Vec<f64>, f64) {
            let c = objective(lower);
            (lower.to_vec(), c)
        }
    }
    let seed = WarmStart {
        params: vec![],
        cost: 1.0,
    };
    assert!(!Fixed.warm_start(&seed));
}
