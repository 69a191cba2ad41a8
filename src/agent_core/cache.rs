//! Bounded LRU caches for pure tool results.
//!
//! - `BoundedCache`: fixed-capacity key → value store, least-recently-used eviction
//! - `ToolResultCache`: one `BoundedCache` per cacheable tool kind, keyed by the
//!   argument that determines the result (SQL text, table name)
//!
//! Side-effecting tools (approval prompts, searches against a live store) are
//! never listed in `CACHEABLE_TOOLS` and always bypass the cache.

use std::num::NonZeroUsize;

use lru::LruCache;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default capacity of the query-result cache.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 256;

/// Default capacity of the schema-description cache.
pub const DEFAULT_SCHEMA_CACHE_CAPACITY: usize = 64;

/// Key prefix for schema lookups.
const SCHEMA_KEY_PREFIX: &str = "describe:";

// ─── BoundedCache ───────────────────────────────────────────────────────────

/// Fixed-capacity string-keyed LRU cache.
///
/// `get` and `put` both count as a touch. Once `capacity` keys are present,
/// inserting a new key evicts exactly the least recently touched one.
pub struct BoundedCache<V> {
    inner: LruCache<String, V>,
}

impl<V: Clone> BoundedCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    /// Look up `key`, promoting it to most recently used on a hit.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.inner.get(key).cloned()
    }

    /// Insert or update `key`, promoting it to most recently used.
    ///
    /// Returns the evicted `(key, value)` when a new key pushed out the LRU entry.
    pub fn put(&mut self, key: impl Into<String>, value: V) -> Option<(String, V)> {
        let key = key.into();
        if self.inner.contains(&key) {
            self.inner.put(key, value);
            return None;
        }
        self.inner.push(key, value)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    /// Whether `key` is present. Does not touch recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }
}

// ─── Cacheable Tools ────────────────────────────────────────────────────────

/// Which cache instance a tool result lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Bulk query execution, keyed by trimmed SQL text.
    Query,
    /// Schema description, keyed by `describe:<table>`.
    Schema,
}

/// A tool whose result is pure with respect to one argument within a session.
#[derive(Debug, Clone, Copy)]
pub struct CacheableTool {
    pub tool: &'static str,
    pub key_field: &'static str,
    pub kind: CacheKind,
}

/// Tools exposed by the MySQL MCP server that are safe to memoize.
pub const CACHEABLE_TOOLS: &[CacheableTool] = &[
    CacheableTool {
        tool: "query",
        key_field: "sql",
        kind: CacheKind::Query,
    },
    CacheableTool {
        tool: "describe_table",
        key_field: "table",
        kind: CacheKind::Schema,
    },
];

/// Cache slot for one tool call: which instance and under which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSlot {
    pub kind: CacheKind,
    pub key: String,
}

/// Derive the cache slot for a call, or `None` if the call is not cacheable.
///
/// A cacheable tool whose arguments lack the key field (or carry a non-string
/// or blank value) is treated as non-cacheable.
pub fn cache_slot(tool_name: &str, arguments: &serde_json::Value) -> Option<CacheSlot> {
    let tool = CACHEABLE_TOOLS.iter().find(|c| c.tool == tool_name)?;
    let raw = arguments.get(tool.key_field)?.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    let key = match tool.kind {
        CacheKind::Query => raw.to_string(),
        CacheKind::Schema => format!("{SCHEMA_KEY_PREFIX}{raw}"),
    };
    Some(CacheSlot {
        kind: tool.kind,
        key,
    })
}

// ─── ToolResultCache ────────────────────────────────────────────────────────

/// Per-session tool result memo, one bounded cache per tool kind.
pub struct ToolResultCache {
    query: BoundedCache<String>,
    schema: BoundedCache<String>,
}

impl Default for ToolResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_CACHE_CAPACITY, DEFAULT_SCHEMA_CACHE_CAPACITY)
    }
}

impl ToolResultCache {
    pub fn new(query_capacity: usize, schema_capacity: usize) -> Self {
        Self {
            query: BoundedCache::new(query_capacity),
            schema: BoundedCache::new(schema_capacity),
        }
    }

    fn instance(&mut self, kind: CacheKind) -> &mut BoundedCache<String> {
        match kind {
            CacheKind::Query => &mut self.query,
            CacheKind::Schema => &mut self.schema,
        }
    }

    pub fn get(&mut self, slot: &CacheSlot) -> Option<String> {
        self.instance(slot.kind).get(&slot.key)
    }

    pub fn put(&mut self, slot: &CacheSlot, value: String) {
        if let Some((evicted, _)) = self.instance(slot.kind).put(slot.key.clone(), value) {
            tracing::debug!(kind = ?slot.kind, evicted = %evicted, "tool cache eviction");
        }
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.schema.clear();
    }

    /// Total entries across both instances.
    pub fn size(&self) -> usize {
        self.query.size() + self.schema.size()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_then_get_round_trip() {
        let mut cache = BoundedCache::new(2);
        cache.put("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = BoundedCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        // Touch "a" so "b" becomes the LRU entry.
        assert_eq!(cache.get("a"), Some(1));

        let evicted = cache.put("c", 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_put_existing_updates_and_promotes() {
        let mut cache = BoundedCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.put("a", 10), None);

        cache.put("c", 3);
        assert_eq!(cache.get("a"), Some(10));
        assert!(!cache.contains("b"));
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut cache = BoundedCache::new(3);
        for i in 0..50 {
            cache.put(format!("k{}", i % 7), i);
            if i % 3 == 0 {
                let _ = cache.get(&format!("k{}", (i + 1) % 7));
            }
            assert!(cache.size() <= 3);
        }
    }

    #[test]
    fn test_victim_matches_reference_order() {
        // Reference model: a Vec ordered oldest → newest touch.
        let mut cache = BoundedCache::new(3);
        let mut order: Vec<String> = Vec::new();
        let ops = [
            ("put", "a"), ("put", "b"), ("get", "a"), ("put", "c"),
            ("put", "d"), ("get", "c"), ("put", "e"), ("get", "a"), ("put", "b"),
        ];

        for (op, key) in ops {
            match op {
                "get" => {
                    if cache.get(key).is_some() {
                        order.retain(|k| k != key);
                        order.push(key.to_string());
                    }
                }
                _ => {
                    let expected_victim = if !order.iter().any(|k| k == key) && order.len() == 3 {
                        Some(order.remove(0))
                    } else {
                        None
                    };
                    order.retain(|k| k != key);
                    order.push(key.to_string());
                    let victim = cache.put(key, 0).map(|(k, _)| k);
                    assert_eq!(victim, expected_victim, "victim mismatch on put {key}");
                }
            }
        }
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = BoundedCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_clear() {
        let mut cache = BoundedCache::new(4);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_cache_slot_trims_sql() {
        let slot = cache_slot("query", &json!({"sql": "  SELECT * FROM 商品报价表 \n"})).unwrap();
        assert_eq!(slot.kind, CacheKind::Query);
        assert_eq!(slot.key, "SELECT * FROM 商品报价表");
    }

    #[test]
    fn test_cache_slot_schema_prefix() {
        let slot = cache_slot("describe_table", &json!({"table": "尺寸表"})).unwrap();
        assert_eq!(slot.kind, CacheKind::Schema);
        assert_eq!(slot.key, "describe:尺寸表");
    }

    #[test]
    fn test_cache_slot_not_cacheable() {
        assert!(cache_slot("ask_supervisor_approval", &json!({"application_details": "x"})).is_none());
        assert!(cache_slot("query", &json!({"statement": "SELECT 1"})).is_none());
        assert!(cache_slot("query", &json!({"sql": "   "})).is_none());
        assert!(cache_slot("query", &json!({"sql": 42})).is_none());
    }

    #[test]
    fn test_tool_cache_kinds_do_not_collide() {
        let mut cache = ToolResultCache::new(4, 4);
        let q = CacheSlot { kind: CacheKind::Query, key: "x".into() };
        let s = CacheSlot { kind: CacheKind::Schema, key: "x".into() };
        cache.put(&q, "rows".into());
        assert_eq!(cache.get(&s), None);
        cache.put(&s, "schema".into());
        assert_eq!(cache.get(&q).as_deref(), Some("rows"));
        assert_eq!(cache.get(&s).as_deref(), Some("schema"));
        assert_eq!(cache.size(), 2);
    }
}
