//! Change types controlling how mutations propagate.

use serde::{Deserialize, Serialize};

/// How a mutation is propagated to observers and over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttributeChange {
    /// Resolved at the call site from the owner's update mode and replication
    /// status.
    #[default]
    Default,
    /// No notification at all. Used while bulk-constructing content.
    Disconnected,
    /// Local notification only, never sent over the network.
    LocalOnly,
    /// Local notification and network propagation.
    Replicate,
}

impl AttributeChange {
    /// Replace `Default` with `fallback`, leaving explicit values untouched.
    #[inline]
    pub fn or(self, fallback: AttributeChange) -> AttributeChange {
        match self {
            AttributeChange::Default => fallback,
            other => other,
        }
    }

    /// Resolve `Default` to `Replicate` or `LocalOnly`.
    #[inline]
    pub fn resolve(self, replicated: bool) -> AttributeChange {
        self.or(if replicated {
            AttributeChange::Replicate
        } else {
            AttributeChange::LocalOnly
        })
    }

    #[inline]
    pub fn is_disconnected(self) -> bool {
        self == AttributeChange::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolves_by_replication() {
        assert_eq!(AttributeChange::Default.resolve(true), AttributeChange::Replicate);
        assert_eq!(AttributeChange::Default.resolve(false), AttributeChange::LocalOnly);
        assert_eq!(AttributeChange::LocalOnly.resolve(true), AttributeChange::LocalOnly);
        assert_eq!(
            AttributeChange::Disconnected.resolve(true),
            AttributeChange::Disconnected
        );
    }
}
