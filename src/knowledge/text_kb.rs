//! Text knowledge base: Q&A `.txt` files chunked on blank lines.

use std::path::Path;

use super::embedding::Embedder;
use super::errors::KnowledgeError;
use super::store::{Record, VectorStore};

/// Collection holding the Q&A chunks.
pub const QA_COLLECTION: &str = "qa_knowledge_base";

/// One chunk of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub id: String,
    pub text: String,
    pub source: String,
}

/// Outcome of a `build-kb` run.
#[derive(Debug, Clone, PartialEq)]
pub enum TextBuildReport {
    /// No chunks were found under the source directory.
    NoDocuments,
    /// The collection already had rows; nothing was written.
    AlreadyBuilt { existing: usize },
    Added { chunks: usize },
}

/// Split a file into trimmed, non-empty chunks separated by blank lines.
///
/// The chunk index counts empty pieces too, so ids stay stable when a file
/// has stray blank lines.
pub fn chunk_text(file_name: &str, content: &str) -> Vec<TextChunk> {
    content
        .split("\n\n")
        .enumerate()
        .filter_map(|(i, piece)| {
            let text = piece.trim();
            (!text.is_empty()).then(|| TextChunk {
                id: format!("{file_name}_{i}"),
                text: text.to_string(),
                source: file_name.to_string(),
            })
        })
        .collect()
}

/// Every chunk of every `*.txt` file in `dir`, files in name order.
///
/// A missing directory yields no chunks.
pub fn load_documents(dir: &Path) -> Result<Vec<TextChunk>, KnowledgeError> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "Q&A directory does not exist");
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| KnowledgeError::io(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();

    let mut chunks = Vec::new();
    for path in files {
        let content = std::fs::read_to_string(&path).map_err(|e| KnowledgeError::io(&path, e))?;
        let content = content.replace("\r\n", "\n");
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        chunks.extend(chunk_text(&name, &content));
    }
    Ok(chunks)
}

/// Embed and store the Q&A chunks unless the collection is already populated.
pub async fn build_text_kb(
    qa_dir: &Path,
    store: &mut VectorStore,
    embedder: &dyn Embedder,
) -> Result<TextBuildReport, KnowledgeError> {
    let chunks = load_documents(qa_dir)?;
    tracing::info!(dir = %qa_dir.display(), chunks = chunks.len(), "loaded Q&A documents");
    if chunks.is_empty() {
        return Ok(TextBuildReport::NoDocuments);
    }

    let existing = store.count(QA_COLLECTION)?;
    if existing > 0 {
        tracing::info!(existing, "knowledge base already built, skipping");
        return Ok(TextBuildReport::AlreadyBuilt { existing });
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts).await?;

    let records: Vec<Record> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| Record {
            id: chunk.id,
            document: chunk.text,
            metadata: serde_json::json!({ "source": chunk.source }),
            embedding,
        })
        .collect();

    let added = store.add(QA_COLLECTION, &records)?;
    tracing::info!(added, "knowledge base built");
    Ok(TextBuildReport::Added { chunks: added })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
