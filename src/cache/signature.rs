use super::key::{normalize_reasoning, signature_key};
use crate::types::ModelFamily;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// (family, session, reasoning text) → upstream thought signature.
///
/// Bounded LRU; the capacity is large enough that eviction only happens in very long
/// sessions with highly varied reasoning.
pub struct ThoughtSignatureCache {
    entries: Mutex<LruCache<String, String>>,
}

impl ThoughtSignatureCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn record_signature(
        &self,
        family: ModelFamily,
        session_id: &str,
        reasoning: &str,
        signature: &str,
    ) {
        if normalize_reasoning(reasoning).is_empty() || signature.is_empty() {
            return;
        }
        let key = signature_key(family, session_id, reasoning);
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.put(key, signature.to_string());
    }

    pub fn lookup_signature(
        &self,
        family: ModelFamily,
        session_id: &str,
        reasoning: &str,
    ) -> Option<String> {
        let key = signature_key(family, session_id, reasoning);
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
