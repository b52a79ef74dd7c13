//! Generation-checked handle types
//!
//! Every object the share group refers to without owning it is named through a
//! slot map key. A key whose slot was removed no longer resolves, so a stale
//! handle can never reach a destroyed object.

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to a context registered with a share group
    pub struct ContextKey;

    /// Handle to a texture owned by the frontend
    pub struct TextureKey;

    /// Handle to a backing memory block inside a buffer pool
    pub struct BlockKey;
}
