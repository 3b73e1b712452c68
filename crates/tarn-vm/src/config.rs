//! VM configuration

/// Limits and arithmetic policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Calls nested deeper than this trap with `StackOverflow`
    pub max_call_depth: usize,
    /// Trap on integer overflow instead of wrapping
    pub checked_arithmetic: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self { max_call_depth: 1024, checked_arithmetic: true }
    }
}
