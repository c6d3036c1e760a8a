//! Value creation, conversion, property access and exceptions

use crate::env::Env;
use crate::error::{BridgeError, BridgeResult, Exception, HostError};
use crate::status::Status;
use crate::value::{ObjectKind, Value, ValueType};

/// ECMAScript `ToInt32` for an already-numeric value
fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ECMAScript `ToUint32` for an already-numeric value
fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4294967296.0) as u32
}

impl Env {
    // ========================================================================
    // Creation
    // ========================================================================

    pub fn get_undefined(&self) -> BridgeResult<Value> {
        self.track(Ok(Value::Undefined))
    }

    pub fn get_null(&self) -> BridgeResult<Value> {
        self.track(Ok(Value::Null))
    }

    pub fn create_bool(&self, value: bool) -> BridgeResult<Value> {
        self.track(Ok(Value::Bool(value)))
    }

    pub fn create_int32(&self, value: i32) -> BridgeResult<Value> {
        self.track(Ok(Value::from(value)))
    }

    pub fn create_uint32(&self, value: u32) -> BridgeResult<Value> {
        self.track(Ok(Value::from(value)))
    }

    pub fn create_double(&self, value: f64) -> BridgeResult<Value> {
        self.track(Ok(Value::Number(value)))
    }

    pub fn create_string(&self, value: &str) -> BridgeResult<Value> {
        self.track(Ok(Value::string(value)))
    }

    pub fn create_bigint_i64(&self, value: i64) -> BridgeResult<Value> {
        let result = if self.supports_bigint() {
            Ok(Value::BigInt(value))
        } else {
            Err(BridgeError::BigIntUnsupported {
                api: "napi_create_bigint_int64",
                detail: "This API is unavailable",
            })
        };
        self.track(result)
    }

    pub fn create_object(&self) -> BridgeResult<Value> {
        let result = self
            .host()
            .create_object()
            .map(Value::Object)
            .map_err(|err| self.host_failure("napi_create_object", err));
        self.track(result)
    }

    // ========================================================================
    // Conversion
    // ========================================================================

    pub fn get_value_bool(&self, value: &Value) -> BridgeResult<bool> {
        let result = match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(Status::BooleanExpected.into()),
        };
        self.track(result)
    }

    pub fn get_value_int32(&self, value: &Value) -> BridgeResult<i32> {
        let result = match value {
            Value::Number(n) => Ok(to_int32(*n)),
            _ => Err(Status::NumberExpected.into()),
        };
        self.track(result)
    }

    pub fn get_value_uint32(&self, value: &Value) -> BridgeResult<u32> {
        let result = match value {
            Value::Number(n) => Ok(to_uint32(*n)),
            _ => Err(Status::NumberExpected.into()),
        };
        self.track(result)
    }

    pub fn get_value_double(&self, value: &Value) -> BridgeResult<f64> {
        let result = match value {
            Value::Number(n) => Ok(*n),
            _ => Err(Status::NumberExpected.into()),
        };
        self.track(result)
    }

    pub fn get_value_string(&self, value: &Value) -> BridgeResult<String> {
        let result = match value {
            Value::String(s) => Ok(s.to_string()),
            _ => Err(Status::StringExpected.into()),
        };
        self.track(result)
    }

    pub fn get_value_bigint_i64(&self, value: &Value) -> BridgeResult<i64> {
        let result = match value {
            Value::BigInt(n) => Ok(*n),
            _ => Err(Status::BigintExpected.into()),
        };
        self.track(result)
    }

    pub fn type_of(&self, value: &Value) -> BridgeResult<ValueType> {
        let value_type = match value {
            Value::Undefined => ValueType::Undefined,
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(_) => ValueType::Number,
            Value::BigInt(_) => ValueType::BigInt,
            Value::String(_) => ValueType::String,
            Value::Object(id) => match self.host().object_kind(*id) {
                Some(ObjectKind::Function) => ValueType::Function,
                _ => ValueType::Object,
            },
        };
        self.track(Ok(value_type))
    }

    // ========================================================================
    // Properties and calls
    // ========================================================================

    pub fn get_property(&self, object: &Value, name: &str) -> BridgeResult<Value> {
        let result = (|| -> BridgeResult<Value> {
            self.check_no_pending_exception()?;
            let object = self.expect_object(object)?;
            self.host()
                .get_property(object, name)
                .map_err(|err| self.host_failure("napi_get_named_property", err))
        })();
        self.track(result)
    }

    pub fn set_property(&self, object: &Value, name: &str, value: Value) -> BridgeResult<()> {
        let result = (|| -> BridgeResult<()> {
            self.check_no_pending_exception()?;
            let object = self.expect_object(object)?;
            self.host()
                .set_property(object, name, value)
                .map_err(|err| self.host_failure("napi_set_named_property", err))
        })();
        self.track(result)
    }

    /// `function.call(this, ...args)`. A throw is left pending and reported
    /// as `pending-exception`.
    pub fn call_function(&self, this: &Value, function: &Value, args: &[Value]) -> BridgeResult<Value> {
        let result = (|| -> BridgeResult<Value> {
            self.check_no_pending_exception()?;
            let function = self.expect_function(function)?;
            match self.host().call(self, function, this.clone(), args) {
                Ok(value) => Ok(value),
                Err(HostError::Exception(exception)) => Err(exception.into()),
                Err(other) => Err(self.host_failure("napi_call_function", other)),
            }
        })();
        self.track(result)
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Throw an `Error` with `message` (and optional `code`) into managed code
    pub fn throw_error(&self, code: Option<&str>, message: &str) -> BridgeResult<()> {
        let result = self.check_no_pending_exception().map(|()| {
            let mut exception = Exception::new(message);
            if let Some(code) = code {
                exception = exception.with_code(code);
            }
            *self.pending_exception.borrow_mut() = Some(exception);
        });
        self.track(result)
    }

    pub fn is_exception_pending(&self) -> bool {
        self.clear_last_error();
        self.pending_exception.borrow().is_some()
    }

    /// Take the pending exception, if any
    pub fn get_and_clear_last_exception(&self) -> Option<Exception> {
        self.clear_last_error();
        self.pending_exception.borrow_mut().take()
    }
}
