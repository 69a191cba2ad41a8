//! Knowledge Base — local semantic search over Q&A text and media files.
//!
//! This module handles:
//! - Embedding texts through the hosted embeddings endpoint
//! - A SQLite vector store with named collections
//! - Building the Q&A collection from `QA_txt/*.txt`
//! - Building the image/video collections with layered tag rules

pub mod embedding;
pub mod errors;
pub mod media_kb;
pub mod media_tags;
pub mod store;
pub mod text_kb;

// Re-exports for convenience
pub use embedding::{Embedder, EmbeddingClient};
pub use errors::KnowledgeError;
pub use media_kb::{build_media_kb, MediaBuildReport};
pub use media_tags::{MediaTagConfig, Modality};
pub use store::{Hit, Record, VectorStore};
pub use text_kb::{build_text_kb, TextBuildReport, QA_COLLECTION};
