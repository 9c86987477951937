use approx::abs_diff_eq;
use emd_sift::{is_imf, sift, IsImfOptions, SiftOptions};
use proptest::prelude::*;

fn arb_signal() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-10.0f64..10.0, 16..160)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sift_is_always_complete(x in arb_signal()) {
        let opts = SiftOptions {
            max_imfs: Some(6),
            ..SiftOptions::default()
        };
        let stack = sift(&x, &opts).unwrap();
        prop_assert!(stack.n_imfs() <= 6);
        prop_assert_eq!(stack.n_samples(), x.len());
        for (r, v) in stack.reconstruct().iter().zip(x.iter()) {
            prop_assert!(abs_diff_eq!(*r, *v, epsilon = 1e-8), "{} != {}", r, v);
        }
    }

    #[test]
    fn monotonic_signals_are_never_imfs(start in -5.0f64..5.0, slope in 0.01f64..3.0, len in 8usize..200) {
        let x: Vec<f64> = (0..len).map(|i| start + slope * i as f64).collect();
        prop_assert!(is_imf(&x, &IsImfOptions::default()).none());
    }
}
