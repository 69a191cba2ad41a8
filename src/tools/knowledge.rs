//! Knowledge search tools over the local vector store.
//!
//! Search failures are returned to the model as result text rather than
//! tool errors, so the model can tell the user what went wrong.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent_core::errors::AgentError;
use crate::config::EMBEDDING_KEY_ENV;
use crate::inference::types::ToolDefinition;
use crate::knowledge::{Embedder, Hit, KnowledgeError, Modality, VectorStore, QA_COLLECTION};

use super::args::{optional_str, required_str};
use super::LocalTool;

// ─── KnowledgeIndex ─────────────────────────────────────────────────────────

/// The store plus the embedder used to embed queries.
///
/// `embedder` is `None` when no embedding key is configured; searches then
/// fail with `MissingApiKey`.
pub struct KnowledgeIndex {
    store: Mutex<VectorStore>,
    embedder: Option<Box<dyn Embedder>>,
}

impl KnowledgeIndex {
    pub fn new(store: VectorStore, embedder: Option<Box<dyn Embedder>>) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            embedder,
        })
    }

    fn with_store<T>(&self, f: impl FnOnce(&VectorStore) -> Result<T, KnowledgeError>) -> Result<T, KnowledgeError> {
        let store = self.store.lock().map_err(|_| KnowledgeError::StoreError {
            reason: "store lock poisoned".into(),
        })?;
        f(&store)
    }

    pub fn count(&self, collection: &str) -> Result<usize, KnowledgeError> {
        self.with_store(|store| store.count(collection))
    }

    /// Embed `query` and return the `top_k` closest rows of `collection`.
    pub async fn search(&self, collection: &str, query: &str, top_k: usize) -> Result<Vec<Hit>, KnowledgeError> {
        let embedder = self.embedder.as_ref().ok_or(KnowledgeError::MissingApiKey {
            var: EMBEDDING_KEY_ENV.to_string(),
        })?;
        let embedding = embedder.embed_one(query).await?;
        self.with_store(|store| store.query(collection, &embedding, top_k))
    }
}

// ─── search_local_knowledge ─────────────────────────────────────────────────

pub struct SearchLocalKnowledge {
    index: Arc<KnowledgeIndex>,
    top_k: usize,
}

impl SearchLocalKnowledge {
    const NAME: &'static str = "search_local_knowledge";

    pub fn new(index: Arc<KnowledgeIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    async fn search(&self, query: &str) -> Result<String, KnowledgeError> {
        if self.index.count(QA_COLLECTION)? == 0 {
            return Ok("知识库为空，请先构建：运行 sales-agent build-kb".into());
        }
        let hits = self.index.search(QA_COLLECTION, query, self.top_k).await?;
        if hits.is_empty() {
            return Ok("未在知识库中找到相关信息。".into());
        }
        Ok(hits
            .iter()
            .map(|hit| format!("--- Source: {} ---\n{}\n\n", hit.meta_str("source"), hit.document))
            .collect())
    }
}

#[async_trait]
impl LocalTool for SearchLocalKnowledge {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            Self::NAME,
            "Search for answers in the local knowledge base (RAG) using semantic search. \
             Useful for answering general questions about product features, common issues, and opening requirements.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query string."}
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&mut self, arguments: &Value) -> Result<String, AgentError> {
        let query = required_str(Self::NAME, arguments, "query")?;
        match self.search(query).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(error = %e, "knowledge search failed");
                Ok(format!("Error searching knowledge base: {e}{}", credential_hint(&e)))
            }
        }
    }
}

fn credential_hint(err: &KnowledgeError) -> &'static str {
    if err.is_credential_error() {
        "；请检查 DASHSCOPE_API_KEY 是否正确配置"
    } else {
        ""
    }
}

// ─── search_media ───────────────────────────────────────────────────────────

pub struct SearchMedia {
    index: Arc<KnowledgeIndex>,
    top_k: usize,
}

impl SearchMedia {
    const NAME: &'static str = "search_media";

    pub fn new(index: Arc<KnowledgeIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    async fn search(&self, query: &str, modalities: &[Modality]) -> Result<String, KnowledgeError> {
        let mut populated = Vec::new();
        for &modality in modalities {
            if self.index.count(modality.collection())? > 0 {
                populated.push(modality);
            }
        }
        if populated.is_empty() {
            return Ok("媒体库为空，请先构建：运行 sales-agent build-media-kb".into());
        }

        let mut hits = Vec::new();
        for modality in populated {
            hits.extend(self.index.search(modality.collection(), query, self.top_k).await?);
        }
        if hits.is_empty() {
            return Ok("未在媒体库中找到相关内容。".into());
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(self.top_k);

        Ok(hits.iter().map(format_media_hit).collect())
    }
}

fn format_media_hit(hit: &Hit) -> String {
    let tags = hit
        .metadata
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("，"))
        .unwrap_or_default();
    format!(
        "--- {} ({}) ---\n路径: {}\n标签: {}\n\n",
        hit.meta_str("title"),
        hit.meta_str("modality"),
        hit.meta_str("path"),
        tags
    )
}

#[async_trait]
impl LocalTool for SearchMedia {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            Self::NAME,
            "Search the local image and video library by description. \
             Returns file paths and tags of product photos and demo videos to share with the customer.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What the media should show."},
                    "modality": {
                        "type": "string",
                        "enum": ["image", "video"],
                        "description": "Restrict to images or videos; omit to search both."
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn call(&mut self, arguments: &Value) -> Result<String, AgentError> {
        let query = required_str(Self::NAME, arguments, "query")?;
        let modalities = match optional_str(arguments, "modality") {
            None => vec![Modality::Image, Modality::Video],
            Some(raw) => match Modality::parse(raw) {
                Some(m) => vec![m],
                None => {
                    return Err(AgentError::InvalidArguments {
                        tool: Self::NAME.into(),
                        reason: format!("unknown modality '{raw}' (expected image or video)"),
                    })
                }
            },
        };

        match self.search(query, &modalities).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!(error = %e, "media search failed");
                Ok(format!("Error searching media library: {e}{}", credential_hint(&e)))
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::text_kb::tests::FakeEmbedder;
    use crate::knowledge::Record;

    fn record(id: &str, doc: &str, metadata: Value, embedding: Vec<f32>) -> Record {
        Record {
            id: id.into(),
            document: doc.into(),
            metadata,
            embedding,
        }
    }

    fn index_with(collection: &str, records: &[Record]) -> Arc<KnowledgeIndex> {
        let mut store = VectorStore::open_in_memory().unwrap();
        if !records.is_empty() {
            store.add(collection, records).unwrap();
        }
        KnowledgeIndex::new(store, Some(Box::new(FakeEmbedder::new())))
    }

    #[tokio::test]
    async fn test_empty_knowledge_base_hint() {
        let mut tool = SearchLocalKnowledge::new(index_with(QA_COLLECTION, &[]), 3);
        let out = tool.call(&json!({"query": "价格"})).await.unwrap();
        assert_eq!(out, "知识库为空，请先构建：运行 sales-agent build-kb");
    }

    #[tokio::test]
    async fn test_hits_formatted_with_source() {
        let index = index_with(
            QA_COLLECTION,
            &[
                record("faq.txt_0", "价格价格说明", json!({"source": "faq.txt"}), vec![1.0, 2.0]),
                record("faq.txt_1", "安装说明", json!({"source": "install.txt"}), vec![1.0, 0.0]),
            ],
        );
        let mut tool = SearchLocalKnowledge::new(index, 1);
        let out = tool.call(&json!({"query": "价格"})).await.unwrap();
        assert_eq!(out, "--- Source: faq.txt ---\n价格价格说明\n\n");
    }

    #[tokio::test]
    async fn test_missing_key_reported_as_text() {
        let mut store = VectorStore::open_in_memory().unwrap();
        store
            .add(QA_COLLECTION, &[record("a", "doc", json!({"source": "a.txt"}), vec![1.0])])
            .unwrap();
        let mut tool = SearchLocalKnowledge::new(KnowledgeIndex::new(store, None), 3);
        let out = tool.call(&json!({"query": "x"})).await.unwrap();
        assert!(out.starts_with("Error searching knowledge base: DASHSCOPE_API_KEY is required"));
        assert!(out.ends_with("；请检查 DASHSCOPE_API_KEY 是否正确配置"));
    }

    #[tokio::test]
    async fn test_media_search() {
        let index = index_with(
            "kb_video",
            &[record(
                "vid:1",
                "视频 双系统切换\n标签：一体机，双系统",
                json!({"path": "/m/video/双系统切换.mp4", "modality": "video", "title": "视频 双系统切换", "tags": ["一体机", "双系统"]}),
                vec![1.0, 0.0],
            )],
        );
        let mut tool = SearchMedia::new(index.clone(), 3);
        let out = tool.call(&json!({"query": "双系统"})).await.unwrap();
        assert_eq!(
            out,
            "--- 视频 双系统切换 (video) ---\n路径: /m/video/双系统切换.mp4\n标签: 一体机，双系统\n\n"
        );

        let out = tool.call(&json!({"query": "x", "modality": "image"})).await.unwrap();
        assert_eq!(out, "媒体库为空，请先构建：运行 sales-agent build-media-kb");

        assert!(tool.call(&json!({"query": "x", "modality": "audio"})).await.is_err());
    }
}
