use crate::core::config::MessageKindSets;
use crate::core::traits::ResponseStore;
use crate::core::types::{MessageKind, Request, Response};
use std::fmt;
use std::sync::Arc;

/// Last response per message kind, consulted before sending cacheable
/// requests. Cloning shares the underlying store.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn ResponseStore>,
    kinds: Arc<MessageKindSets>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn ResponseStore>, kinds: Arc<MessageKindSets>) -> Self {
        Self { store, kinds }
    }

    /// Record an inbound response; the newest one of each kind wins
    pub fn store(&self, response: &Response) {
        self.store.set(&response.msg_type, response.clone());
    }

    pub fn get(&self, kind: &MessageKind) -> Option<Response> {
        self.store.get(kind)
    }

    /// Cached answer for a reply-bearing request, if its kind is eligible for
    /// the cache-first short-circuit
    pub fn lookup(&self, request: &Request) -> Option<Response> {
        let kind = request.kind();
        if self.kinds.is_cacheable(kind) {
            self.store.get(kind)
        } else {
            None
        }
    }

    pub fn kinds(&self) -> &MessageKindSets {
        &self.kinds
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory::MemoryResponseStore;
    use serde_json::{json, Map};

    fn cache() -> ResponseCache {
        ResponseCache::new(
            Arc::new(MemoryResponseStore::new()),
            Arc::new(MessageKindSets::default()),
        )
    }

    fn response(kind: MessageKind, payload: serde_json::Value) -> Response {
        let mut fields = Map::new();
        fields.insert(kind.as_str().to_string(), payload);
        Response {
            msg_type: kind,
            req_id: None,
            error: None,
            echo_req: None,
            fields,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let cache = cache();
        cache.store(&response(MessageKind::GetAccountStatus, json!({"status": ["a"]})));
        cache.store(&response(MessageKind::GetAccountStatus, json!({"status": ["b"]})));

        let cached = cache.get(&MessageKind::GetAccountStatus).unwrap();
        assert_eq!(cached.payload(), Some(&json!({"status": ["b"]})));
    }

    #[test]
    fn test_lookup_only_for_cacheable_kinds() {
        let cache = cache();
        let login_list = MessageKind::Other("login_list".to_string());
        cache.store(&response(login_list.clone(), json!([])));
        cache.store(&response(MessageKind::GetFinancialAssessment, json!({})));

        assert!(cache.get(&login_list).is_some());
        assert!(cache.lookup(&Request::new(login_list, 1)).is_none());
        assert!(cache
            .lookup(&Request::new(MessageKind::GetFinancialAssessment, 1))
            .is_some());
    }

    #[test]
    fn test_clones_share_the_store() {
        let cache = cache();
        let other = cache.clone();
        cache.store(&response(MessageKind::WebsiteStatus, json!({})));
        assert!(other
            .lookup(&Request::new(MessageKind::WebsiteStatus, 1))
            .is_some());
    }
}
