//! 缓存模块：工具参数模式缓存、工具名映射与思维签名缓存。
//!
//! # Caches
//!
//! Three key-value stores shared by every call that uses the same [`SharedCaches`]:
//!
//! | Cache | Key | Value | Bound |
//! |-------|-----|-------|-------|
//! | [`ToolSchemaCache`] (schemas) | tool name | parameter descriptors | unbounded |
//! | [`ToolSchemaCache`] (names) | sanitized name | original name | unbounded |
//! | [`ThoughtSignatureCache`] | sha256(family:session:text) | signature | LRU |
//!
//! Concurrent calls may race on writes. Writes for the same key carry the same value
//! in practice, so plain short-lived locks are enough.
//!
//! Use [`SharedCaches::global`] for process lifetime (the default of
//! [`crate::ProviderClient`]) or [`SharedCaches::isolated`] for a scoped instance,
//! e.g. in tests.

mod key;
mod signature;
mod tool_schema;

pub use key::{normalize_reasoning, signature_key};
pub use signature::ThoughtSignatureCache;
pub use tool_schema::{
    sanitized_tool_name, SchemaDescriptor, ToolParams, ToolSchemaCache, SANITIZED_PREFIX,
    UNKNOWN_TYPE,
};

use once_cell::sync::Lazy;
use std::sync::Arc;

pub const DEFAULT_SIGNATURE_CAPACITY: usize = 10_000;

static GLOBAL: Lazy<SharedCaches> =
    Lazy::new(|| SharedCaches::with_capacity(DEFAULT_SIGNATURE_CAPACITY));

#[derive(Clone)]
pub struct SharedCaches {
    pub tools: Arc<ToolSchemaCache>,
    pub signatures: Arc<ThoughtSignatureCache>,
}

impl SharedCaches {
    /// Process-wide instance.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Fresh instance with the default signature capacity.
    pub fn isolated() -> Self {
        Self::with_capacity(DEFAULT_SIGNATURE_CAPACITY)
    }

    pub fn with_capacity(signature_capacity: usize) -> Self {
        Self {
            tools: Arc::new(ToolSchemaCache::new()),
            signatures: Arc::new(ThoughtSignatureCache::new(signature_capacity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelFamily;

    #[test]
    fn global_handles_share_state_isolated_do_not() {
        let a = SharedCaches::global();
        let b = SharedCaches::global();
        a.tools.sanitize_name("7zip_shared");
        assert_eq!(b.tools.resolve_original_name("t_7zip_shared"), "7zip_shared");

        let scoped = SharedCaches::isolated();
        scoped
            .signatures
            .record_signature(ModelFamily::Claude, "iso", "text", "sig");
        assert!(SharedCaches::global()
            .signatures
            .lookup_signature(ModelFamily::Claude, "iso", "text")
            .is_none());
    }
}
