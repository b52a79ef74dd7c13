//! Cross-context share group state

/// Context priority unification
pub mod priority;

pub use priority::{ContextInfo, ContextPriority, ContextPriorityState, ProtectionType, ProtectionTypes};
