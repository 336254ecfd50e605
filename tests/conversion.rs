mod common;

use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;
use pybridge::{BridgeError, HostFunction, Proxy, Value};

fn round_trip(value: &Value) -> Value {
    let session = common::session();
    let owned = session.convert(value).expect("convert");
    session.value_of(owned.handle()).expect("value_of")
}

#[test]
fn scalars_round_trip() {
    for value in [
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Int(0),
        Value::Int(i64::MIN),
        Value::Int(i64::MAX),
        Value::Float(-2.5),
        Value::from(""),
        Value::from("héllo wörld"),
        Value::from("nul\0inside"),
    ] {
        assert_eq!(round_trip(&value), value);
    }
}

#[test]
fn list_bridging_preserves_order() {
    let value = Value::List(vec![Value::Int(1), Value::from("a"), Value::Bool(true)]);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn dict_bridging_yields_map() {
    let mut fields = BTreeMap::new();
    fields.insert("x".to_string(), Value::Int(1));

    let back = round_trip(&Value::Record(fields));
    assert_eq!(back, Value::Map(vec![(Value::from("x"), Value::Int(1))]));
    assert_eq!(back.get(&Value::from("x")), Some(&Value::Int(1)));
}

#[test]
fn maps_keep_non_string_keys() {
    let value = Value::Map(vec![
        (Value::Int(1), Value::from("one")),
        (Value::Null, Value::List(vec![Value::Float(0.5)])),
        (Value::from("nested"), Value::Map(vec![(Value::Bool(false), Value::Int(0))])),
    ]);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn unhashable_map_key_is_a_foreign_error() {
    let session = common::session();
    let value = Value::Map(vec![(Value::List(vec![]), Value::Int(1))]);
    let err = session.convert(&value).unwrap_err();
    assert!(matches!(err, BridgeError::Foreign { .. }), "{err:?}");
    assert!(err.message().contains("unhashable"), "{}", err.message());
}

#[test]
fn booleans_are_not_ints() {
    let session = common::session();
    let one = session.eval("1").unwrap();
    assert_eq!(one.value_of().unwrap(), Value::Int(1));
    let yes = session.eval("1 == 1").unwrap();
    assert_eq!(yes.value_of().unwrap(), Value::Bool(true));
    let no = session.eval("bool(0)").unwrap();
    assert_eq!(no.value_of().unwrap(), Value::Bool(false));
}

#[test]
fn interpreter_booleans_read_back_as_bools() {
    let session = common::session();
    let truth = session.eval("True").unwrap();
    let falsity = session.eval("False").unwrap();
    assert_eq!(truth.value_of().unwrap(), Value::Bool(true));
    assert_eq!(falsity.value_of().unwrap(), Value::Bool(false));

    // Converting a Rust bool yields the interpreter's own singletons.
    let converted = session.convert(&Value::Bool(true)).unwrap();
    assert_eq!(converted.handle(), truth.handle());
    let converted = session.convert(&Value::Bool(false)).unwrap();
    assert_eq!(converted.handle(), falsity.handle());
    assert_eq!(
        session.value_of(converted.handle()).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn self_referential_list_stops_at_the_cycle() {
    let session = common::session();
    session
        .run("bridge_cycle = [1]\nbridge_cycle.append(bridge_cycle)\n")
        .unwrap();
    let cycle = session.eval("bridge_cycle").unwrap();

    let Value::List(items) = cycle.value_of().unwrap() else {
        panic!("the outer list is still read");
    };
    assert_eq!(items[0], Value::Int(1));
    let Value::Object(inner) = &items[1] else {
        panic!("the repeated list comes back as an object, got {:?}", items[1]);
    };
    assert_eq!(inner.handle(), cycle.handle());
}

#[test]
fn mutually_referencing_dicts_stop_at_the_cycle() {
    let session = common::session();
    session
        .run("bridge_a = {}\nbridge_b = {'a': bridge_a}\nbridge_a['b'] = bridge_b\n")
        .unwrap();
    let a = session.eval("bridge_a").unwrap();

    let value = a.value_of().unwrap();
    let b = value.get(&Value::from("b")).expect("b is read");
    match b.get(&Value::from("a")) {
        Some(Value::Object(back)) => assert_eq!(back.handle(), a.handle()),
        other => panic!("expected the outer dict as an object, got {other:?}"),
    }
}

#[test]
fn shared_containers_are_not_cycles() {
    let session = common::session();
    let shared = session.eval("(lambda s: [s, s])([1, 2])").unwrap();
    let inner = Value::List(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(
        shared.value_of().unwrap(),
        Value::List(vec![inner.clone(), inner])
    );
}

#[test]
fn very_deep_nesting_does_not_overflow() {
    let session = common::session();
    session
        .run("bridge_deep = []\nfor _ in range(100000):\n    bridge_deep = [bridge_deep]\n")
        .unwrap();
    let deep = session.eval("bridge_deep").unwrap();

    let mut value = deep.value_of().unwrap();
    let mut levels = 0;
    while let Value::List(mut items) = value {
        levels += 1;
        value = items.pop().expect("each level holds one list");
    }
    assert!(levels >= 64, "{levels}");
    assert!(matches!(value, Value::Object(_)), "{value:?}");
}

#[test]
fn dict_values_survive_keys_that_refuse_comparison() {
    let session = common::session();
    session
        .run(
            "class BridgeTouchyKey:\n\
             \x20   armed = False\n\
             \x20   def __hash__(self):\n\
             \x20       return 7\n\
             \x20   def __eq__(self, other):\n\
             \x20       if BridgeTouchyKey.armed:\n\
             \x20           raise RuntimeError('compared while armed')\n\
             \x20       return self is other\n\
             bridge_touchy = {BridgeTouchyKey(): 1, BridgeTouchyKey(): 2}\n\
             BridgeTouchyKey.armed = True\n",
        )
        .unwrap();
    let touchy = session.eval("bridge_touchy").unwrap();

    let Value::Map(pairs) = touchy.value_of().unwrap() else {
        panic!("a dict reads back as a map");
    };
    let values: Vec<_> = pairs.iter().map(|(_, v)| v.clone()).collect();
    assert_eq!(values, vec![Value::Int(1), Value::Int(2)]);
    assert!(pairs.iter().all(|(k, _)| matches!(k, Value::Object(_))));

    // Nothing was left pending by the read.
    assert_eq!(
        session.eval("1 + 1").unwrap().value_of().unwrap(),
        Value::Int(2)
    );
}

#[test]
fn none_is_absent() {
    let session = common::session();
    let none = Proxy::from(session.convert(&Value::Null).unwrap());
    assert!(none.is_absent());
    assert_eq!(none.handle(), session.none());
    assert_eq!(none.value_of().unwrap(), Value::Null);

    let zero = Proxy::from(session.convert(&Value::Int(0)).unwrap());
    assert!(!zero.is_absent());
}

#[test]
fn huge_ints_degrade_to_float() {
    let session = common::session();
    let big = session.eval("2 ** 70").unwrap();
    assert_eq!(big.value_of().unwrap(), Value::Float(2f64.powi(70)));
}

#[test]
fn existing_objects_pass_through_unchanged() {
    let session = common::session();
    let list = Proxy::from(session.convert(&Value::List(vec![])).unwrap());
    let again = session.convert(&Value::Object(list.clone())).unwrap();
    assert_eq!(again.handle(), list.handle());

    // Nested objects are shared, not copied.
    list.call_method("append", &[Value::Int(9)], &[]).unwrap();
    let outer = Proxy::from(
        session
            .convert(&Value::List(vec![Value::Object(list.clone())]))
            .unwrap(),
    );
    assert_eq!(
        outer.value_of().unwrap(),
        Value::List(vec![Value::List(vec![Value::Int(9)])])
    );
}

#[test]
fn host_functions_cannot_cross() {
    let session = common::session();
    let f: HostFunction = Rc::new(|_| Value::Null);
    let err = session.convert(&Value::Function(f)).unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedConversion(_)));
}

#[test]
fn json_input_round_trips_as_map() {
    let value = Value::from(serde_json::json!({"name": "probe", "tags": ["a", "b"], "n": 3}));
    let back = round_trip(&value);
    assert_eq!(back.get(&Value::from("name")), Some(&Value::from("probe")));
    assert_eq!(
        back.get(&Value::from("tags")),
        Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
    );
    assert_eq!(
        back.to_json().unwrap(),
        serde_json::json!({"name": "probe", "tags": ["a", "b"], "n": 3})
    );
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1e12f64..1e12).prop_map(Value::Float),
        ".{0,12}".prop_map(Value::Str),
    ]
}

fn nested() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::vec((any::<i64>().prop_map(Value::Int), inner), 0..4).prop_map(
                |pairs| {
                    // Duplicate keys collapse in a dict; keep the first.
                    let mut seen = Vec::new();
                    Value::Map(
                        pairs
                            .into_iter()
                            .filter(|(k, _)| {
                                let fresh = !seen.contains(k);
                                seen.push(k.clone());
                                fresh
                            })
                            .collect(),
                    )
                }
            ),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn values_round_trip(value in nested()) {
        prop_assert_eq!(round_trip(&value), value);
    }
}
