use super::*;

fn sample() -> Circle {
    Circle {
        x: 12.5,
        y: -3.0,
        r: 7.25,
        color_r: 0.1,
        color_g: 0.2,
        color_b: 0.3,
        opacity: 0.75,
    }
}

#[test]
fn encode_decode_roundtrip_at_every_slot() {
    let mut data = vec![0.0; 4 * PARAMS_PER_CIRCLE];
    for i in 0..4 {
        let mut c = sample();
        c.x += i as f64;
        encode(&mut data, i, c);
        assert_eq!(decode(&data, i), c);
    }
    assert_eq!(circle_count(&data), 4);
    assert_eq!(data[PARAMS_PER_CIRCLE * 2], 14.5);
}

#[test]
#[should_panic(expected = "out of range")]
fn decode_out_of_range_panics() {
    let data = vec![0.0; PARAMS_PER_CIRCLE];
    let _ = decode(&data, 1);
}

#[test]
fn circle_count_ignores_partial_tail() {
    assert_eq!(circle_count(&[0.0; 13]), 1);
    assert_eq!(circle_count(&[]), 0);
}

#[test]
fn param_vector_rejects_partial_circles() {
    assert!(ParamVector::from_vec(vec![0.0; 8]).is_err());
    let pv = ParamVector::from_circles(&[sample(), sample()]);
    assert_eq!(pv.len_circles(), 2);
    assert_eq!(pv.circles().count(), 2);
    assert_eq!(pv.decode(1), sample());
}

#[test]
fn bounds_for_single_circle() {
    let b = Bounds::new(1, 100, 100);
    assert_eq!(b.lower, vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    assert_eq!(b.upper, vec![100.0, 100.0, 100.0, 1.0, 1.0, 1.0, 1.0]);
    b.validate().unwrap();
}

#[test]
fn bounds_radius_uses_longer_side() {
    let b = Bounds::new(2, 40, 90);
    assert_eq!(b.dim(), 14);
    assert_eq!(b.upper[2], 90.0);
    assert_eq!(b.upper[9], 90.0);
    assert_eq!(b.upper[7], 40.0);
}

#[test]
fn truncate_keeps_prefix() {
    let b = Bounds::new(3, 10, 20).truncate(1);
    assert_eq!(b, Bounds::new(1, 10, 20));
}

#[test]
fn validate_rejects_inverted_and_nan() {
    let mut b = Bounds::new(1, 10, 10);
    b.lower[0] = 11.0;
    assert!(b.validate().is_err());
    let mut b = Bounds::new(1, 10, 10);
    b.upper[3] = f64::NAN;
    assert!(b.validate().is_err());
}

#[test]
fn clamp_vector_is_elementwise() {
    let b = Bounds::new(1, 10, 10);
    let mut v = vec![-1.0, 11.0, 0.0, 2.0, f64::NAN, 0.5, -0.2];
    b.clamp_vector(&mut v);
    assert_eq!(v, vec![0.0, 10.0, 1.0, 1.0, 0.0, 0.5, 0.0]);
}

#[test]
fn clamp_circle_uses_slot_limits() {
    let b = Bounds::new(2, 10, 10);
    let c = b.clamp_circle(1, sample());
    assert_eq!(c.y, 0.0);
    assert_eq!(c.x, 10.0);
    assert_eq!(c.r, 7.25);
}

#[test]
fn fingerprint_is_bit_exact_and_order_sensitive() {
    let a = [1.0, 2.0, 3.0];
    let b = [2.0, 1.0, 3.0];
    assert_eq!(fingerprint(&a), fingerprint(&a));
    assert_ne!(fingerprint(&a), fingerprint(&b));
    assert_ne!(fingerprint(&[0.0]), fingerprint(&[-0.0]));
    assert_ne!(fingerprint(&[]), fingerprint(&[0.0]));
}
