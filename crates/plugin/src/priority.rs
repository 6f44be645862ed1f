//! Hook priority system for controlling execution order

/// Priority level for hook execution (lower value = earlier execution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookPriority(pub i32);

impl HookPriority {
    /// First to execute
    pub const FIRST: HookPriority = HookPriority(-1000);

    /// Early processing hooks (body capture before any rewriting)
    pub const EARLY: HookPriority = HookPriority(-100);

    /// Normal priority (default)
    pub const NORMAL: HookPriority = HookPriority(0);

    /// Late processing hooks (logging)
    pub const LATE: HookPriority = HookPriority(100);

    /// Last to execute (sees the body as sent to the client)
    pub const LAST: HookPriority = HookPriority(1000);

    /// Create a custom priority
    pub fn custom(value: i32) -> Self {
        HookPriority(value)
    }
}

impl Default for HookPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for HookPriority {
    fn from(value: i32) -> Self {
        HookPriority(value)
    }
}
