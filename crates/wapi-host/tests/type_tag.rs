//! Integration tests for object type tags

mod common;

use std::ptr;

use wapi_core::{RawPtr, Status, TypeTag, Value};

const COUNTER_TAG: TypeTag = TypeTag::new(0x1edf_75a3_8336_4f12, 0xa3ed_a0cd_55ea_de86);
const BUFFER_TAG: TypeTag = TypeTag::new(0x9c73_317f_9fad_44a3, 0x93c3_920b_f3b0_ad6a);

#[test]
fn test_tag_then_check() {
    let (_runtime, env) = common::modern();
    let object = env.create_object().unwrap();
    let other = env.create_object().unwrap();

    env.type_tag_object(&object, &COUNTER_TAG).unwrap();
    assert!(env.check_object_type_tag(&object, &COUNTER_TAG).unwrap());
    assert!(!env.check_object_type_tag(&object, &BUFFER_TAG).unwrap());
    // Untagged objects never match.
    assert!(!env.check_object_type_tag(&other, &COUNTER_TAG).unwrap());
    assert!(env.last_error().is_clear());
}

#[test]
fn test_tagging_twice_is_invalid() {
    let (_runtime, env) = common::modern();
    let object = env.create_object().unwrap();

    env.type_tag_object(&object, &COUNTER_TAG).unwrap();
    let err = env.type_tag_object(&object, &BUFFER_TAG).unwrap_err();
    assert_eq!(err.status(), Status::InvalidArg);
    assert_eq!(env.last_error().status, Status::InvalidArg);
    // The first tag stands.
    assert!(env.check_object_type_tag(&object, &COUNTER_TAG).unwrap());
}

#[test]
fn test_tags_need_objects() {
    let (_runtime, env) = common::modern();

    let err = env.type_tag_object(&Value::Number(1.0), &COUNTER_TAG).unwrap_err();
    assert_eq!(err.status(), Status::ObjectExpected);
    let err = env.check_object_type_tag(&Value::from("x"), &COUNTER_TAG).unwrap_err();
    assert_eq!(err.status(), Status::ObjectExpected);
}

#[test]
fn test_tag_guards_unwrap() {
    let (_runtime, env) = common::modern();
    common::define_counter(&env).unwrap();
    let counter = common::new_counter(&env, Value::from(2u32)).unwrap();
    env.type_tag_object(&counter, &COUNTER_TAG).unwrap();

    let impostor = env.create_object().unwrap();
    env.wrap(&impostor, 0x40usize as RawPtr, None, ptr::null_mut(), false).unwrap();

    for (instance, expected) in [(&counter, true), (&impostor, false)] {
        assert_eq!(env.check_object_type_tag(instance, &COUNTER_TAG).unwrap(), expected);
    }
    assert_eq!(common::counter_value(&env, &counter), 2);
}

#[test]
fn test_tag_is_dropped_with_its_object() {
    let (runtime, env) = common::modern();
    let object = env.create_object().unwrap();
    env.type_tag_object(&object, &COUNTER_TAG).unwrap();
    assert_eq!(env.pending_finalizer_count(), 1);

    runtime.collect_garbage();
    // Dropping a tag is not a finalizer callback.
    assert_eq!(env.run_pending_finalizers(), 0);
    assert_eq!(env.pending_finalizer_count(), 0);
    assert_eq!(
        env.check_object_type_tag(&object, &COUNTER_TAG).unwrap_err().status(),
        Status::ObjectExpected
    );
}

#[test]
fn test_tags_without_weak_references() {
    let (_runtime, env) = common::legacy();
    let object = env.create_object().unwrap();

    env.type_tag_object(&object, &BUFFER_TAG).unwrap();
    assert_eq!(env.pending_finalizer_count(), 0);
    assert!(env.check_object_type_tag(&object, &BUFFER_TAG).unwrap());
}

#[test]
fn test_pending_exception_blocks_tagging() {
    let (_runtime, env) = common::modern();
    let object = env.create_object().unwrap();
    env.throw_error(None, "pending").unwrap();

    let err = env.type_tag_object(&object, &COUNTER_TAG).unwrap_err();
    assert_eq!(err.status(), Status::PendingException);
    env.get_and_clear_last_exception();
    assert!(!env.check_object_type_tag(&object, &COUNTER_TAG).unwrap());
}
