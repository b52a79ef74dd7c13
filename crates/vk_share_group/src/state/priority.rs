//! Context priority unification
//!
//! Every context in a share group submits at the same queue priority. When a
//! context with a strictly higher priority joins an unlocked group, the whole
//! group is raised. The raise is preceded by a priority dependency
//! submission, made inside an exclusive queue ordering scope, so that all
//! work already submitted at the old priority is ordered before anything
//! submitted at the new one.

use bitflags::bitflags;

use crate::backend::error::VulkanResult;
use crate::backend::renderer::{Renderer, ScopedQueueSerialIndex};
use crate::foundation::collections::{ContextKey, SlotMap};

/// Queue submission priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextPriority {
    /// Background work
    Low,
    /// Default priority
    Medium,
    /// Latency sensitive work
    High,
}

impl ContextPriority {
    /// The priority a group is locked to
    pub const DEFAULT: Self = Self::Medium;
}

/// Memory protection mode a context submits with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionType {
    /// Regular memory
    Unprotected,
    /// Protected memory
    Protected,
}

bitflags! {
    /// Set of protection types touched by one submission
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProtectionTypes: u32 {
        /// Regular memory
        const UNPROTECTED = 1 << 0;
        /// Protected memory
        const PROTECTED = 1 << 1;
    }
}

impl From<ProtectionType> for ProtectionTypes {
    fn from(protection: ProtectionType) -> Self {
        match protection {
            ProtectionType::Unprotected => Self::UNPROTECTED,
            ProtectionType::Protected => Self::PROTECTED,
        }
    }
}

/// Per-context state the share group tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextInfo {
    /// Priority the context currently submits at
    pub priority: ContextPriority,
    /// Protection mode of the context's submissions
    pub protection: ProtectionType,
    /// Whether the context shares textures display-wide
    pub has_display_texture_share_group: bool,
}

impl ContextInfo {
    /// Describe an unprotected context without display-level texture sharing
    pub fn new(priority: ContextPriority) -> Self {
        Self {
            priority,
            protection: ProtectionType::Unprotected,
            has_display_texture_share_group: false,
        }
    }
}

/// Unified priority of a share group
///
/// `priority` is `None` until the first context joins.
#[derive(Debug, Clone, Default)]
pub struct ContextPriorityState {
    priority: Option<ContextPriority>,
    locked: bool,
    transitions: u64,
}

impl ContextPriorityState {
    /// Create an unset, unlocked state
    pub fn new() -> Self {
        Self::default()
    }

    /// The group priority, if any context has joined yet
    pub fn priority(&self) -> Option<ContextPriority> {
        self.priority
    }

    /// Whether the group has been locked to the default priority
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of priority dependencies submitted so far
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Reconcile a joining context with the group
    ///
    /// `contexts` holds the current members; the joining context is not yet
    /// among them. On return `joining.priority` equals the group priority.
    pub fn unify(
        &mut self,
        renderer: &dyn Renderer,
        contexts: &mut SlotMap<ContextKey, ContextInfo>,
        joining: &mut ContextInfo,
    ) -> VulkanResult<()> {
        let Some(current) = self.priority else {
            debug_assert!(!self.locked);
            debug_assert!(contexts.is_empty());
            self.priority = Some(joining.priority);
            return Ok(());
        };

        if current >= joining.priority || self.locked {
            joining.priority = current;
            return Ok(());
        }

        self.update(renderer, contexts, joining.protection.into(), joining.priority)?;
        debug_assert_eq!(self.priority, Some(joining.priority));
        Ok(())
    }

    /// Permanently pin the group to [`ContextPriority::DEFAULT`]
    ///
    /// Only the first call can submit a transition.
    pub fn lock_default(
        &mut self,
        renderer: &dyn Renderer,
        contexts: &mut SlotMap<ContextKey, ContextInfo>,
        caller_protection: ProtectionType,
    ) -> VulkanResult<()> {
        if !self.locked {
            if self.priority != Some(ContextPriority::DEFAULT) {
                self.update(renderer, contexts, caller_protection.into(), ContextPriority::DEFAULT)?;
            }
            self.locked = true;
        }
        debug_assert_eq!(self.priority, Some(ContextPriority::DEFAULT));
        Ok(())
    }

    fn update(
        &mut self,
        renderer: &dyn Renderer,
        contexts: &mut SlotMap<ContextKey, ContextInfo>,
        caller_protection: ProtectionTypes,
        new_priority: ContextPriority,
    ) -> VulkanResult<()> {
        debug_assert!(!self.locked);
        debug_assert_ne!(self.priority, Some(new_priority));

        let Some(old_priority) = self.priority else {
            debug_assert!(contexts.is_empty());
            self.priority = Some(new_priority);
            return Ok(());
        };

        let protection_types = contexts
            .values()
            .fold(caller_protection, |types, ctx| types | ProtectionTypes::from(ctx.protection));

        {
            let scope = ScopedQueueSerialIndex::allocate(renderer)?;
            renderer.submit_priority_dependency(
                protection_types,
                old_priority,
                new_priority,
                scope.index(),
            )?;
        }

        log::debug!(
            "Share group priority {:?} -> {:?} ({} contexts, {:?})",
            old_priority,
            new_priority,
            contexts.len(),
            protection_types
        );

        for ctx in contexts.values_mut() {
            debug_assert_eq!(ctx.priority, old_priority);
            ctx.priority = new_priority;
        }
        self.priority = Some(new_priority);
        self.transitions += 1;
        Ok(())
    }
}
