//! Integration tests for counted references and value operations

mod common;

use std::rc::Rc;

use wapi_core::{BridgeError, RefId, Status, Value, ValueType};

#[test]
fn test_reference_count_transitions() {
    let (runtime, env) = common::modern();
    let object = env.create_object().unwrap();
    let id = object.as_object().unwrap();

    let reference = env.create_reference(&object, 1).unwrap();
    assert_eq!(env.reference_ref(reference).unwrap(), 2);
    assert_eq!(env.reference_unref(reference).unwrap(), 1);

    // Strong while the count is positive.
    runtime.collect_garbage();
    assert!(runtime.is_alive(id));

    assert_eq!(env.reference_unref(reference).unwrap(), 0);
    assert_eq!(env.get_reference_value(reference).unwrap(), Some(object));

    let err = env.reference_unref(reference).unwrap_err();
    assert_eq!(err, BridgeError::Status(Status::GenericFailure));
    assert_eq!(env.last_error().status, Status::GenericFailure);

    // Weak at zero.
    runtime.collect_garbage();
    assert!(!runtime.is_alive(id));
    assert_eq!(env.get_reference_value(reference).unwrap(), None);

    // Re-counting a collected reference does not resurrect it.
    assert_eq!(env.reference_ref(reference).unwrap(), 1);
    assert_eq!(env.get_reference_value(reference).unwrap(), None);
    env.delete_reference(reference).unwrap();
}

#[test]
fn test_ref_from_zero_makes_target_strong_again() {
    let (runtime, env) = common::modern();
    let object = env.create_object().unwrap();
    let id = object.as_object().unwrap();

    let reference = env.create_reference(&object, 0).unwrap();
    assert_eq!(env.reference_ref(reference).unwrap(), 1);
    runtime.collect_garbage();
    assert!(runtime.is_alive(id));

    env.delete_reference(reference).unwrap();
    runtime.collect_garbage();
    assert!(!runtime.is_alive(id));
}

#[test]
fn test_zero_count_reference_stays_strong_without_weak_refs() {
    let (runtime, env) = common::legacy();
    let object = env.create_object().unwrap();
    let id = object.as_object().unwrap();

    let reference = env.create_reference(&object, 0).unwrap();
    runtime.collect_garbage();
    assert!(runtime.is_alive(id));
    assert_eq!(env.get_reference_value(reference).unwrap(), Some(object.clone()));

    assert_eq!(env.reference_ref(reference).unwrap(), 1);
    assert_eq!(env.reference_unref(reference).unwrap(), 0);
    runtime.collect_garbage();
    assert!(runtime.is_alive(id));

    env.delete_reference(reference).unwrap();
    runtime.collect_garbage();
    assert!(!runtime.is_alive(id));
}

#[test]
fn test_reference_argument_errors() {
    let (_runtime, env) = common::modern();

    let err = env.create_reference(&Value::from(1u32), 1).unwrap_err();
    assert_eq!(err.status(), Status::ObjectExpected);

    let bogus = RefId(9999);
    assert_eq!(env.reference_ref(bogus).unwrap_err().status(), Status::InvalidArg);
    assert_eq!(env.get_reference_value(bogus).unwrap_err().status(), Status::InvalidArg);
    assert_eq!(env.delete_reference(bogus).unwrap_err().status(), Status::InvalidArg);
}

#[test]
fn test_dropping_context_releases_strong_references() {
    let (runtime, env) = common::modern();
    let object = env.create_object().unwrap();
    let id = object.as_object().unwrap();
    env.create_reference(&object, 3).unwrap();

    runtime.collect_garbage();
    assert!(runtime.is_alive(id));

    drop(env);
    runtime.collect_garbage();
    assert!(!runtime.is_alive(id));
}

#[test]
fn test_value_round_trips_through_conversions() {
    let (_runtime, env) = common::modern();

    let n = env.create_int32(-7).unwrap();
    assert_eq!(env.get_value_int32(&n).unwrap(), -7);
    assert_eq!(env.get_value_uint32(&n).unwrap(), 4294967289);
    assert_eq!(env.get_value_double(&n).unwrap(), -7.0);

    let s = env.create_string("hello").unwrap();
    assert_eq!(env.get_value_string(&s).unwrap(), "hello");
    assert_eq!(env.type_of(&s).unwrap(), ValueType::String);

    let b = env.create_bool(false).unwrap();
    assert!(!env.get_value_bool(&b).unwrap());

    assert_eq!(env.type_of(&env.get_null().unwrap()).unwrap(), ValueType::Null);
    assert_eq!(env.type_of(&env.get_undefined().unwrap()).unwrap(), ValueType::Undefined);
    assert_eq!(env.type_of(&env.create_uint32(1).unwrap()).unwrap(), ValueType::Number);
}

#[test]
fn test_properties() {
    let (_runtime, env) = common::modern();
    let object = env.create_object().unwrap();

    env.set_property(&object, "answer", Value::from(42u32)).unwrap();
    assert_eq!(env.get_property(&object, "answer").unwrap(), Value::Number(42.0));
    assert_eq!(env.get_property(&object, "missing").unwrap(), Value::Undefined);

    let err = env.set_property(&Value::Null, "x", Value::Null).unwrap_err();
    assert_eq!(err.status(), Status::ObjectExpected);
}

#[test]
fn test_call_function_reports_throws_as_pending() {
    let (_runtime, env) = common::modern();
    let thrower = env
        .define_class(
            "thrower",
            std::rc::Rc::new(|env, _info| {
                env.throw_error(None, "thrown from native")?;
                env.get_undefined()
            }),
            &[],
        )
        .unwrap();

    let err = env.call_function(&Value::Undefined, &thrower, &[]).unwrap_err();
    assert_eq!(err.status(), Status::PendingException);
    assert_eq!(env.get_and_clear_last_exception().unwrap().message, "thrown from native");

    let err = env.call_function(&Value::Undefined, &Value::Null, &[]).unwrap_err();
    assert_eq!(err.status(), Status::FunctionExpected);
}

#[test]
fn test_failed_ref_keeps_the_count() {
    let host = Rc::new(common::FlakyHost::default());
    let env = host.env();
    let object = env.create_object().unwrap();
    let id = object.as_object().unwrap();
    host.inner.set_global("kept", object.clone());

    let reference = env.create_reference(&object, 0).unwrap();
    host.fail_retain.set(true);
    let err = env.reference_ref(reference).unwrap_err();
    assert_eq!(err.status(), Status::GenericFailure);
    // Still at zero.
    assert_eq!(env.reference_unref(reference).unwrap_err().status(), Status::GenericFailure);

    host.fail_retain.set(false);
    assert_eq!(env.reference_ref(reference).unwrap(), 1);
    host.inner.delete_global("kept");
    host.inner.collect_garbage();
    assert!(host.inner.is_alive(id));
    assert_eq!(env.get_reference_value(reference).unwrap(), Some(object));
}
