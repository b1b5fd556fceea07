use cortex::{CellId, CondOp, Engine, Truth};

fn term(e: &mut Engine, name: &str, def: CellId) -> CellId {
    let root = e.root();
    match e.define_term(root, name, def) {
        Ok(t) => t,
        Err(err) => panic!("define {name}: {err}"),
    }
}

#[test]
fn equality_fanout_flips_exactly_the_matching_condition() {
    let mut e = Engine::new();
    let root = e.root();
    let state = term(&mut e, "state", CellId::UNKNOWN);
    let names = ["idle", "busy", "down", "maint"];
    let conds: Vec<CellId> = names
        .iter()
        .map(|n| {
            let s = e.intern_string(n);
            let c = e.make_condition(CondOp::Eq, state, s);
            e.enable(c, None);
            c
        })
        .collect();
    for c in &conds {
        assert_eq!(e.value(*c).truth(), Truth::Unknown);
    }

    let busy = e.intern_string("busy");
    e.assert(root, &[("state", busy)]).expect("assert");
    for (name, c) in names.iter().zip(&conds) {
        assert_eq!(e.value(*c).is_truthy(), *name == "busy", "state={name}");
    }

    let down = e.intern_string("down");
    e.assert(root, &[("state", down)]).expect("assert");
    for (name, c) in names.iter().zip(&conds) {
        assert_eq!(e.value(*c).is_truthy(), *name == "down", "state={name}");
    }

    // a value nobody watches turns the previous match off
    let other = e.intern_string("other");
    e.assert(root, &[("state", other)]).expect("assert");
    for c in &conds {
        assert!(e.value(*c).is_false());
    }
}

#[test]
fn equality_fanout_handles_unknown_gaps() {
    let mut e = Engine::new();
    let root = e.root();
    let state = term(&mut e, "state", CellId::UNKNOWN);
    let a = e.intern_string("a");
    let c = e.make_condition(CondOp::Eq, state, a);
    e.enable(c, None);

    let av = e.intern_string("a");
    e.assert(root, &[("state", av)]).expect("assert");
    assert!(e.value(c).is_truthy());

    e.assert(root, &[("state", CellId::UNKNOWN)]).expect("assert");
    assert_eq!(e.value(c).truth(), Truth::Unknown);

    let b = e.intern_string("b");
    e.assert(root, &[("state", b)]).expect("assert");
    assert!(e.value(c).is_false());
}

#[test]
fn threshold_walk_touches_only_the_crossed_band() {
    let mut e = Engine::new();
    let root = e.root();
    let load = term(&mut e, "load", CellId::UNKNOWN);
    let thresholds = [10.0, 20.0, 30.0, 40.0];
    let under: Vec<CellId> = thresholds
        .iter()
        .map(|t| {
            let k = e.intern_real(*t);
            let c = e.make_condition(CondOp::Lt, load, k);
            e.enable(c, None);
            c
        })
        .collect();
    let over: Vec<CellId> = thresholds
        .iter()
        .map(|t| {
            let k = e.intern_real(*t);
            let c = e.make_condition(CondOp::Gt, load, k);
            e.enable(c, None);
            c
        })
        .collect();

    let v5 = e.intern_real(5.0);
    e.assert(root, &[("load", v5)]).expect("assert");
    assert!(under.iter().all(|c| e.value(*c).is_truthy()));
    assert!(over.iter().all(|c| e.value(*c).is_false()));

    let v25 = e.intern_real(25.0);
    e.assert(root, &[("load", v25)]).expect("assert");
    let lt: Vec<bool> = under.iter().map(|c| e.value(*c).is_truthy()).collect();
    let gt: Vec<bool> = over.iter().map(|c| e.value(*c).is_truthy()).collect();
    assert_eq!(lt, vec![false, false, true, true]);
    assert_eq!(gt, vec![true, true, false, false]);

    // landing exactly on a threshold: x<30 stays true, x>30 stays false
    let v30 = e.intern_real(30.0);
    e.assert(root, &[("load", v30)]).expect("assert");
    let lt: Vec<bool> = under.iter().map(|c| e.value(*c).is_truthy()).collect();
    let gt: Vec<bool> = over.iter().map(|c| e.value(*c).is_truthy()).collect();
    assert_eq!(lt, vec![false, false, false, true]);
    assert_eq!(gt, vec![true, true, false, false]);

    // falling back down reverses the band
    let v15 = e.intern_real(15.0);
    e.assert(root, &[("load", v15)]).expect("assert");
    let lt: Vec<bool> = under.iter().map(|c| e.value(*c).is_truthy()).collect();
    let gt: Vec<bool> = over.iter().map(|c| e.value(*c).is_truthy()).collect();
    assert_eq!(lt, vec![false, true, true, true]);
    assert_eq!(gt, vec![true, false, false, false]);
}

#[test]
fn string_thresholds_order_lexicographically() {
    let mut e = Engine::new();
    let root = e.root();
    let name = term(&mut e, "name", CellId::UNKNOWN);
    let m = e.intern_string("m");
    let lt_m = e.make_condition(CondOp::Lt, name, m);
    let gt_m = e.make_condition(CondOp::Gt, name, m);
    e.enable(lt_m, None);
    e.enable(gt_m, None);

    let alpha = e.intern_string("alpha");
    e.assert(root, &[("name", alpha)]).expect("assert");
    assert!(e.value(lt_m).is_truthy());
    assert!(e.value(gt_m).is_false());

    let zulu = e.intern_string("zulu");
    e.assert(root, &[("name", zulu)]).expect("assert");
    assert!(e.value(lt_m).is_false());
    assert!(e.value(gt_m).is_truthy());
}

#[test]
fn leaving_the_numeric_domain_turns_thresholds_unknown() {
    let mut e = Engine::new();
    let root = e.root();
    let load = term(&mut e, "load", CellId::UNKNOWN);
    let ten = e.intern_real(10.0);
    let c = e.make_condition(CondOp::Lt, load, ten);
    e.enable(c, None);

    let v5 = e.intern_real(5.0);
    e.assert(root, &[("load", v5)]).expect("assert");
    assert!(e.value(c).is_truthy());

    let text = e.intern_string("n/a");
    e.assert(root, &[("load", text)]).expect("assert");
    assert_eq!(e.value(c).truth(), Truth::Unknown);
}

#[test]
fn disabling_the_last_dependent_retires_the_axon() {
    let mut e = Engine::new();
    let root = e.root();
    let x = term(&mut e, "x", CellId::UNKNOWN);
    let k = e.intern_real(1.0);
    let c = e.make_condition(CondOp::Eq, x, k);
    e.enable(c, None);
    assert_eq!(e.subscriber_count(x), 1, "the axon is x's only subscriber");

    e.disable(c, None);
    assert_eq!(e.subscriber_count(x), 0);
    assert!(e.value(c).is_disabled());

    // re-enabling builds a fresh axon and still evaluates correctly
    e.enable(c, None);
    let one = e.intern_real(1.0);
    e.assert(root, &[("x", one)]).expect("assert");
    assert!(e.value(c).is_truthy());
}
