use proptest::prelude::*;
use xisort::codec::{decode, encode};
use xisort::prelude::*;

proptest! {
    #[test]
    fn codec_roundtrips_every_bit_pattern(bits: u64) {
        let v = f64::from_bits(bits);
        let decoded = decode(encode(v));
        prop_assert_eq!(decoded.to_bits(), v.to_bits());
    }

    #[test]
    fn codec_is_monotone_on_ordered_finite_pairs(a in -1.0e300f64..1.0e300, b in -1.0e300f64..1.0e300) {
        if a <= b {
            prop_assert!(encode(a) <= encode(b));
        } else {
            prop_assert!(encode(a) >= encode(b));
        }
    }

    #[test]
    fn sort_output_is_totally_ordered(mut values in prop::collection::vec(any::<u64>().prop_map(f64::from_bits), 0..500)) {
        xi_sort(&mut values, &Config::default()).unwrap();
        for w in values.windows(2) {
            prop_assert!(encode(w[0]) <= encode(w[1]));
        }
    }

    #[test]
    fn sort_preserves_the_input_multiset(values in prop::collection::vec(any::<u64>().prop_map(f64::from_bits), 0..500)) {
        let mut sorted = values.clone();
        xi_sort(&mut sorted, &Config::default()).unwrap();

        let mut original_bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
        let mut sorted_bits: Vec<u64> = sorted.iter().map(|v| v.to_bits()).collect();
        original_bits.sort_unstable();
        sorted_bits.sort_unstable();
        prop_assert_eq!(original_bits, sorted_bits);
    }

    #[test]
    fn sort_is_idempotent(values in prop::collection::vec(any::<u64>().prop_map(f64::from_bits), 0..300)) {
        let mut once = values.clone();
        xi_sort(&mut once, &Config::default()).unwrap();
        let mut twice = once.clone();
        xi_sort(&mut twice, &Config::default()).unwrap();
        prop_assert_eq!(
            once.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            twice.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn parallel_and_sequential_modes_agree(values in prop::collection::vec(any::<u64>().prop_map(f64::from_bits), 0..2000)) {
        let mut sequential = values.clone();
        xi_sort(&mut sequential, &Config::default()).unwrap();

        let parallel_config = Config { parallel: true, ..Config::default() };
        let mut parallel = values.clone();
        xi_sort(&mut parallel, &parallel_config).unwrap();

        prop_assert_eq!(
            sequential.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            parallel.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }
}
