use jsbind_core::{SlotId, Tag, Value};

#[test]
fn tags_round_trip_through_bits() {
    let cases = [
        (Value::from_i32(-5), Tag::Int),
        (Value::TRUE, Tag::Bool),
        (Value::NULL, Tag::Null),
        (Value::UNDEFINED, Tag::Undefined),
        (Value::EXCEPTION, Tag::Exception),
        (Value::from_f64(1.5), Tag::Float64),
        (Value::string(SlotId(3)), Tag::String),
        (Value::object(SlotId(9)), Tag::Object),
    ];
    for (v, tag) in cases {
        assert_eq!(v.tag(), tag, "{v:?}");
        assert_eq!(Value::from_bits(v.to_bits()), v);
    }
}

#[test]
fn special_floats_stay_floats() {
    for f in [f64::NEG_INFINITY, f64::INFINITY, -0.0, f64::MIN, f64::MAX] {
        let v = Value::from_f64(f);
        assert!(v.is_f64(), "{f} should stay a float");
        assert_eq!(v.as_f64().to_bits(), f.to_bits());
    }
    let nan = Value::from_f64(-f64::NAN);
    assert!(nan.is_f64());
    assert!(nan.as_f64().is_nan());
}

#[test]
fn equality_is_identity_not_structure() {
    let a = Value::object(SlotId(1));
    let b = Value::object(SlotId(2));
    assert_ne!(a, b);
    assert_eq!(a, Value::object(SlotId(1)));
    assert_ne!(Value::string(SlotId(1)), Value::object(SlotId(1)));
    assert_eq!(a.slot(), Some(SlotId(1)));
    assert_eq!(Value::from_i32(1).slot(), None);
}

#[test]
fn from_number_prefers_int() {
    assert!(Value::from_number(3.0).is_int());
    assert_eq!(Value::from_number(3.0).as_i32(), 3);
    assert!(Value::from_number(3.5).is_f64());
    assert!(Value::from_number(-0.0).is_f64());
    assert!(Value::from_number(4_294_967_296.0).is_f64());
    assert_eq!(Value::from_i32(i32::MIN).as_i32(), i32::MIN);
}
