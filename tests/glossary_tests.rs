use std::io::Write;

use cortex::{CellId, CondOp, Engine, Value};

#[test]
fn qualified_names_create_intermediate_terms() {
    let mut e = Engine::new();
    let root = e.root();
    let load = e.intern_real(0.7);
    let leaf = e.define_term(root, "net.router.load", load).expect("define");

    assert_eq!(e.find_term(root, "net.router.load"), Some(leaf));
    assert_eq!(e.term_name(leaf), "net.router.load");

    let net = e.find_term(root, "net").expect("intermediate exists");
    assert_eq!(e.definition(net), Some(CellId::PLACEHOLDER));
    assert_eq!(e.find_down(net, "router.load"), Some(leaf));
}

#[test]
fn lookup_walks_up_the_context_hierarchy() {
    let mut e = Engine::new();
    let root = e.root();
    let one = e.intern_real(1.0);
    let global = e.define_term(root, "threshold", one).expect("define");
    e.define_node(root, "site", None).expect("node");
    let site = e.find_term(root, "site").expect("site");

    assert_eq!(e.find_in_scope(site, "threshold"), Some(global));
    assert_eq!(e.find_here(site, "threshold"), None);

    // a local binding shadows the outer one
    let two = e.intern_real(2.0);
    let local = e.define_term(site, "threshold", two).expect("define");
    assert_eq!(e.find_in_scope(site, "threshold"), Some(local));
    assert_eq!(e.find_in_scope(root, "threshold"), Some(global));
}

#[test]
fn prefixes_pin_the_starting_context() {
    let mut e = Engine::new();
    let root = e.root();
    let one = e.intern_real(1.0);
    let top = e.define_term(root, "x", one).expect("define");
    e.define_node(root, "a", None).expect("node");
    let a = e.find_term(root, "a").expect("a");
    let two = e.intern_real(2.0);
    let inner = e.define_term(a, "x", two).expect("define");

    assert_eq!(e.find_term(a, "x"), Some(inner));
    assert_eq!(e.find_term(a, "_.x"), Some(top));
    assert_eq!(e.find_term(a, "@x"), Some(top));
    assert_eq!(e.find_term(a, ".x"), Some(inner), "single dot stays local");
    assert_eq!(e.find_term(a, "..x"), Some(top), "double dot goes up");
    assert_eq!(e.find_term(root, "a.x"), Some(inner));
}

#[test]
fn reassigning_the_same_definition_publishes_nothing() {
    let mut e = Engine::new();
    let root = e.root();
    let a = e.define_term(root, "a", CellId::UNKNOWN).expect("define");
    let watch = e.make_condition(CondOp::Change, a, CellId::UNKNOWN);
    e.enable(watch, None);
    e.drain_change_list();
    assert!(e.value(watch).is_false());

    let five = e.intern_real(5.0);
    e.assert(root, &[("a", five)]).expect("assert");
    assert!(e.value(watch).is_truthy(), "first assignment publishes");
    e.drain_change_list();

    e.assert(root, &[("a", five)]).expect("assert");
    assert!(
        e.value(watch).is_false(),
        "rebinding the same definition is a no-op"
    );
}

#[test]
fn assignment_raises_dependent_levels() {
    let mut e = Engine::new();
    let root = e.root();
    let a = e.define_term(root, "a", CellId::UNKNOWN).expect("define");
    let b = e.define_term(root, "b", CellId::UNKNOWN).expect("define");
    let c = e.make_condition(CondOp::And, a, b);
    e.enable(c, None);
    assert!(e.level(c) > e.level(a));

    // rebinding b to a taller expression pushes b and c upward
    let deep = e.make_condition(CondOp::ToTrue, c, CellId::UNKNOWN);
    let d = e.define_term(root, "d", CellId::UNKNOWN).expect("define");
    e.enable(deep, None);
    e.assign_term(d, deep);
    assert!(e.level(d) > e.level(deep));
    assert!(e.level(deep) > e.level(c));
}

#[test]
fn undefine_refuses_referenced_terms_and_removes_free_ones() {
    let mut e = Engine::new();
    let root = e.root();
    let one = e.intern_real(1.0);
    let a = e.define_term(root, "a", one).expect("define");
    let b = e.define_term(root, "b", one).expect("define");
    let both = e.make_condition(CondOp::And, a, b);
    e.grab(both);

    assert!(e.undefine(a).is_err(), "a is an operand of a live condition");

    e.drop_ref(both);
    e.undefine(a).expect("now unreferenced");
    assert_eq!(e.find_term(root, "a"), None);
    assert_eq!(e.find_term(root, "b"), Some(b));
}

#[test]
fn undefine_takes_the_subtree_along() {
    let mut e = Engine::new();
    let root = e.root();
    let one = e.intern_real(1.0);
    e.define_term(root, "app.db.pool", one).expect("define");
    let app = e.find_term(root, "app").expect("app");

    e.undefine(app).expect("undefine subtree");
    assert_eq!(e.find_term(root, "app"), None);
    assert_eq!(e.find_term(root, "app.db.pool"), None);
}

#[test]
fn unknown_terms_resolve_through_a_file_source() {
    let mut dir = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(dir, "sys.cpu=42").expect("write");
    writeln!(dir, "sys.disk=busy").expect("write");
    dir.flush().expect("flush");

    let mut e = Engine::new();
    let root = e.root();
    let source = format!("<{}", dir.path().display());
    e.define_node(root, "sys", Some(source)).expect("node");
    let sys = e.find_term(root, "sys").expect("sys");
    let cpu = e.define_term(sys, "cpu", CellId::UNKNOWN).expect("define");
    let disk = e.define_term(sys, "disk", CellId::UNKNOWN).expect("define");
    assert!(e.value(cpu).is_unknown());

    let v = e.solve(cpu);
    assert!(matches!(v, Value::Real(r) if r == 42.0));
    let v = e.solve(disk);
    assert!(matches!(v, Value::Str(s) if &*s == "busy"));
}

#[test]
fn unresolvable_terms_stay_unknown() {
    let mut e = Engine::new();
    let root = e.root();
    let t = e.define_term(root, "orphan", CellId::UNKNOWN).expect("define");
    assert!(e.solve(t).is_unknown());
}

#[test]
fn term_definitions_can_be_expressions() {
    let mut e = Engine::new();
    let root = e.root();
    let a = e.define_term(root, "a", CellId::UNKNOWN).expect("define");
    let b = e.define_term(root, "b", CellId::UNKNOWN).expect("define");
    let both = e.make_condition(CondOp::And, a, b);
    let c = e.define_term(root, "c", both).expect("define");
    let watch = e.make_condition(CondOp::ToTrue, c, CellId::UNKNOWN);
    e.enable(watch, None);

    let one = e.intern_real(1.0);
    e.assert(root, &[("a", one), ("b", one)]).expect("assert");
    assert!(e.value(watch).is_truthy());
    assert!(e.value(c).is_truthy());
}
