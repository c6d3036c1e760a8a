//! Status codes and the fixed diagnostic message table
//!
//! Ordinals are part of the C ABI and must never be renumbered.

/// Number of defined status codes (length of the message table)
pub const STATUS_COUNT: usize = 22;

/// Outcome of a bridge operation
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Ok = 0,
    InvalidArg = 1,
    ObjectExpected = 2,
    StringExpected = 3,
    /// A string or symbol was expected
    NameExpected = 4,
    FunctionExpected = 5,
    NumberExpected = 6,
    BooleanExpected = 7,
    ArrayExpected = 8,
    GenericFailure = 9,
    PendingException = 10,
    /// Reserved for asynchronous work items; never raised by the bridge core
    Cancelled = 11,
    EscapeCalledTwice = 12,
    HandleScopeMismatch = 13,
    CallbackScopeMismatch = 14,
    QueueFull = 15,
    Closing = 16,
    BigintExpected = 17,
    DateExpected = 18,
    ArraybufferExpected = 19,
    DetachableArraybufferExpected = 20,
    WouldDeadlock = 21,
}

/// Message table indexed by status ordinal. Index 0 (`Ok`) has no message.
static ERROR_MESSAGES: [Option<&str>; STATUS_COUNT] = [
    None,
    Some("Invalid argument"),
    Some("An object was expected"),
    Some("A string was expected"),
    Some("A string or symbol was expected"),
    Some("A function was expected"),
    Some("A number was expected"),
    Some("A boolean was expected"),
    Some("An array was expected"),
    Some("Unknown failure"),
    Some("An exception is pending"),
    Some("The async work item was cancelled"),
    Some("napi_escape_handle already called on scope"),
    Some("Invalid handle scope usage"),
    Some("Invalid callback scope usage"),
    Some("Thread-safe function queue is full"),
    Some("Thread-safe function handle is closing"),
    Some("A bigint was expected"),
    Some("A date was expected"),
    Some("An arraybuffer was expected"),
    Some("A detachable arraybuffer was expected"),
    Some("Main thread would deadlock"),
];

impl Status {
    /// Every status, in ordinal order
    pub const ALL: [Status; STATUS_COUNT] = [
        Status::Ok,
        Status::InvalidArg,
        Status::ObjectExpected,
        Status::StringExpected,
        Status::NameExpected,
        Status::FunctionExpected,
        Status::NumberExpected,
        Status::BooleanExpected,
        Status::ArrayExpected,
        Status::GenericFailure,
        Status::PendingException,
        Status::Cancelled,
        Status::EscapeCalledTwice,
        Status::HandleScopeMismatch,
        Status::CallbackScopeMismatch,
        Status::QueueFull,
        Status::Closing,
        Status::BigintExpected,
        Status::DateExpected,
        Status::ArraybufferExpected,
        Status::DetachableArraybufferExpected,
        Status::WouldDeadlock,
    ];

    /// Convert a raw ordinal back into a status
    pub fn from_raw(raw: u32) -> Option<Status> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Reverse lookup through the message table
    pub fn from_message(message: &str) -> Option<Status> {
        ERROR_MESSAGES
            .iter()
            .position(|m| *m == Some(message))
            .map(|idx| Self::ALL[idx])
    }

    /// Ordinal as seen across the C ABI
    #[inline]
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Diagnostic message, `None` for `Ok`
    #[inline]
    pub fn message(self) -> Option<&'static str> {
        ERROR_MESSAGES[self as usize]
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message().unwrap_or("No error"))
    }
}

/// The fixed message table, for host tooling that renders diagnostics
pub fn error_messages() -> &'static [Option<&'static str>; STATUS_COUNT] {
    &ERROR_MESSAGES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_total() {
        assert_eq!(error_messages().len(), STATUS_COUNT);
        assert_eq!(Status::ALL.len(), STATUS_COUNT);

        for status in Status::ALL {
            if status == Status::Ok {
                assert!(status.message().is_none());
            } else {
                assert!(status.message().is_some(), "{:?} has no message", status);
            }
        }
    }

    #[test]
    fn test_message_round_trip() {
        for status in Status::ALL.iter().copied().filter(|s| !s.is_ok()) {
            let message = status.message().unwrap();
            assert_eq!(Status::from_message(message), Some(status));
        }
        assert_eq!(Status::from_message("not a real message"), None);
    }

    #[test]
    fn test_ordinals_match_table_index() {
        for (idx, status) in Status::ALL.iter().enumerate() {
            assert_eq!(status.as_raw() as usize, idx);
            assert_eq!(Status::from_raw(idx as u32), Some(*status));
        }
        assert_eq!(Status::from_raw(STATUS_COUNT as u32), None);
    }

    #[test]
    fn test_known_messages() {
        assert_eq!(Status::InvalidArg.message(), Some("Invalid argument"));
        assert_eq!(Status::WouldDeadlock.message(), Some("Main thread would deadlock"));
        assert_eq!(Status::NameExpected.to_string(), "A string or symbol was expected");
        assert_eq!(Status::Ok.to_string(), "No error");
    }
}
