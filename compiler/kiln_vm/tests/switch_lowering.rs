//! Every switch lowering must dispatch exactly like a plain key lookup.

#![allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]

use kiln_emit::emit_utils::{string_switch, StringSwitchCallback};
use kiln_emit::{CodeEmitter, EmitError, Label, SwitchCallback, SwitchStrategy, TypeEmitter};
use kiln_ir::{Access, MethodDesc, Signature, Type};
use kiln_vm::{new_string, ModuleScope, Value};
use proptest::prelude::*;

/// Each case returns its key's position; the default returns -1.
struct IndexOf {
    keys: Vec<i32>,
}

impl SwitchCallback for IndexOf {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: i32,
        _end: Label,
    ) -> Result<(), EmitError> {
        let index = self.keys.iter().position(|&k| k == key).unwrap();
        e.push_int(i32::try_from(index).unwrap());
        e.return_value();
        Ok(())
    }

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError> {
        e.push_int(-1);
        e.return_value();
        Ok(())
    }
}

fn run_switch(keys: &[i32], strategy: SwitchStrategy, probes: &[i32]) -> Vec<i32> {
    let sig = Signature::new("dispatch", MethodDesc::new([Type::Int], Type::Int));
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Switch", None, vec![], None);
    let mut e = te.begin_method(Access::PUBLIC | Access::STATIC, &sig, &[]);
    e.load_arg(0);
    let mut callback = IndexOf {
        keys: keys.to_vec(),
    };
    e.process_switch_with(keys, strategy, &mut callback).unwrap();
    e.end_method().unwrap();
    let unit = te.end_type().unwrap();

    let scope = ModuleScope::new("switch");
    let class = scope.define_unit(&unit.to_bytes().unwrap()).unwrap();
    probes
        .iter()
        .map(|&probe| {
            class
                .invoke_static("dispatch", "(I)I", vec![Value::Int(probe)])
                .unwrap()
                .and_then(|v| v.as_int())
                .unwrap()
        })
        .collect()
}

fn expected(keys: &[i32], probes: &[i32]) -> Vec<i32> {
    probes
        .iter()
        .map(|p| {
            keys.iter()
                .position(|k| k == p)
                .map_or(-1, |i| i32::try_from(i).unwrap())
        })
        .collect()
}

#[test]
fn empty_switch_takes_the_default() {
    for strategy in [SwitchStrategy::Table, SwitchStrategy::Lookup, SwitchStrategy::Binary] {
        assert_eq!(run_switch(&[], strategy, &[0, 5]), vec![-1, -1]);
    }
}

#[test]
fn extreme_keys_do_not_overflow() {
    let keys = [i32::MIN, -1, 0, i32::MAX];
    let probes = [i32::MIN, i32::MIN + 1, -1, 0, 1, i32::MAX];
    for strategy in [SwitchStrategy::Table, SwitchStrategy::Lookup, SwitchStrategy::Binary] {
        assert_eq!(run_switch(&keys, strategy, &probes), expected(&keys, &probes));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn lowerings_agree_with_lookup(
        keys in prop::collection::btree_set(-40i32..40, 0..12),
        probes in prop::collection::vec(-45i32..45, 1..16),
    ) {
        let keys: Vec<i32> = keys.into_iter().collect();
        let want = expected(&keys, &probes);
        for strategy in [SwitchStrategy::Table, SwitchStrategy::Lookup, SwitchStrategy::Binary] {
            prop_assert_eq!(&run_switch(&keys, strategy, &probes), &want, "{:?}", strategy);
        }
        prop_assert_eq!(
            run_switch(&keys, SwitchStrategy::choose(&keys), &probes),
            want
        );
    }
}

struct StringIndex {
    keys: Vec<&'static str>,
}

impl StringSwitchCallback for StringIndex {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: &str,
        end: Label,
    ) -> Result<(), EmitError> {
        let index = self.keys.iter().position(|&k| k == key).unwrap();
        e.push_int(i32::try_from(index).unwrap());
        e.goto(end);
        Ok(())
    }

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError> {
        e.push_int(-1);
        Ok(())
    }
}

#[test]
fn string_switch_separates_hash_collisions() {
    // "Aa" and "BB" share a hash code.
    let keys = vec!["Aa", "BB", "name", "value"];
    let sig = Signature::new("dispatch", MethodDesc::new([Type::string()], Type::Int));
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/StringSwitch", None, vec![], None);
    let mut e = te.begin_method(Access::PUBLIC | Access::STATIC, &sig, &[]);
    e.load_arg(0);
    let mut callback = StringIndex { keys: keys.clone() };
    string_switch(&mut e, &keys, &mut callback).unwrap();
    e.return_value();
    e.end_method().unwrap();
    let unit = te.end_type().unwrap();

    let scope = ModuleScope::new("string-switch");
    let class = scope.define_unit(&unit.to_bytes().unwrap()).unwrap();
    let dispatch = |s: &str| {
        class
            .invoke_static("dispatch", "(Lcore/String;)I", vec![Value::object(new_string(s))])
            .unwrap()
    };
    assert_eq!(dispatch("Aa"), Some(Value::Int(0)));
    assert_eq!(dispatch("BB"), Some(Value::Int(1)));
    assert_eq!(dispatch("value"), Some(Value::Int(3)));
    assert_eq!(dispatch("missing"), Some(Value::Int(-1)));
}
