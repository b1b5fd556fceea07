use cortex::avl::Avl;
use cortex::{Bfi, Engine, Truth};
use proptest::prelude::*;

fn seg_list() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..200, 1i64..40), 0..12)
}

fn build(domain: (i64, i64), segs: &[(i64, i64)]) -> Bfi {
    let mut f = Bfi::new(domain.0, domain.1);
    for (start, len) in segs {
        f.insert(*start, start + len);
    }
    f
}

proptest! {
    #[test]
    fn avl_matches_a_sorted_set(ops in prop::collection::vec((0u16..500, prop::bool::ANY), 1..200)) {
        let mut tree = Avl::new();
        let mut model = std::collections::BTreeMap::new();
        for (key, insert) in ops {
            if insert {
                prop_assert_eq!(tree.insert(key, key), model.insert(key, key));
            } else {
                prop_assert_eq!(tree.remove(&key), model.remove(&key));
            }
            prop_assert_eq!(tree.len(), model.len());
        }
        let keys: Vec<u16> = tree.iter().map(|(k, _)| *k).collect();
        let expect: Vec<u16> = model.keys().copied().collect();
        prop_assert_eq!(keys, expect);
    }

    #[test]
    fn avl_height_stays_within_the_avl_bound(keys in prop::collection::vec(0u32..10_000, 1..400)) {
        let mut tree = Avl::new();
        for k in keys {
            tree.insert(k, ());
        }
        let n = tree.len() as f64;
        prop_assert!((tree.height() as f64) <= 1.44 * (n + 2.0).log2());
    }

    #[test]
    fn bfi_double_negation_holds_within_the_domain(segs in seg_list()) {
        let f = build((0, 250), &segs);
        prop_assert_eq!(f.not_().not_(), f.or_());
    }

    #[test]
    fn bfi_and_or_are_idempotent(segs in seg_list()) {
        let f = build((0, 250), &segs);
        prop_assert_eq!(f.and(&f), f.or_());
        prop_assert_eq!(f.or(&f), f.or_());
    }

    #[test]
    fn bfi_and_or_agree_with_pointwise_truth(a in seg_list(), b in seg_list()) {
        let f = build((0, 250), &a);
        let g = build((0, 250), &b);
        let and = f.and(&g);
        let or = f.or(&g);
        for i in 0..250 {
            let fi = f.eval(i) == Truth::True;
            let gi = g.eval(i) == Truth::True;
            prop_assert_eq!(and.eval(i) == Truth::True, fi && gi, "and at {}", i);
            prop_assert_eq!(or.eval(i) == Truth::True, fi || gi, "or at {}", i);
        }
    }

    #[test]
    fn bfi_parse_display_round_trip(segs in seg_list()) {
        let f = build((0, 250), &segs).or_();
        let text = f.to_string();
        let back = match Bfi::parse(&text) {
            Ok(b) => b,
            Err(e) => panic!("reparse {text:?}: {e}"),
        };
        prop_assert_eq!(back, f);
    }

    #[test]
    fn interning_reals_is_stable(values in prop::collection::vec(-1e9f64..1e9, 1..50)) {
        let mut e = Engine::new();
        for v in values {
            prop_assert_eq!(e.intern_real(v), e.intern_real(v));
        }
    }
}
