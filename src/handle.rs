//! Render handles - opaque identifiers for native rendering contexts
//!
//! A handle crosses the JNI boundary as a `jlong`. The value `0` is reserved
//! to mean "no active context" and is what a failed `create` returns.

use std::fmt;

/// Opaque identifier for a live native rendering context, or [`RenderHandle::NONE`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RenderHandle(i64);

impl RenderHandle {
    /// Sentinel for "no active context"
    pub const NONE: RenderHandle = RenderHandle(0);

    pub const fn from_raw(raw: i64) -> Self {
        RenderHandle(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// True for any non-zero handle
    pub const fn is_live(self) -> bool {
        self.0 != 0
    }

    /// `None` for the sentinel, `Some(self)` otherwise
    pub fn live(self) -> Option<RenderHandle> {
        if self.is_live() {
            Some(self)
        } else {
            None
        }
    }
}

impl From<i64> for RenderHandle {
    fn from(raw: i64) -> Self {
        RenderHandle(raw)
    }
}

impl From<RenderHandle> for i64 {
    fn from(handle: RenderHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_live() {
            write!(f, "#{:x}", self.0)
        } else {
            write!(f, "none")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_not_live() {
        assert!(!RenderHandle::NONE.is_live());
        assert_eq!(RenderHandle::default(), RenderHandle::NONE);
        assert_eq!(RenderHandle::NONE.live(), None);
    }

    #[test]
    fn test_raw_conversion() {
        let handle = RenderHandle::from(42);
        assert!(handle.is_live());
        assert_eq!(i64::from(handle), 42);
        assert_eq!(handle.live(), Some(handle));
        assert_eq!(handle.to_string(), "#2a");
        assert_eq!(RenderHandle::NONE.to_string(), "none");
    }
}
