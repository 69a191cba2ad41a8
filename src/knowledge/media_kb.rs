//! Media knowledge base: images and videos indexed by title and tags.
//!
//! Files are not analysed; each one is represented by a short proxy document
//! (`图片 <stem>` plus its tags) so text queries can find it.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use super::embedding::Embedder;
use super::errors::KnowledgeError;
use super::media_tags::{MediaTagConfig, Modality};
use super::store::{Record, VectorStore};

/// One media file ready to be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: String,
    pub path: PathBuf,
    pub modality: Modality,
    pub title: String,
    pub tags: Vec<String>,
}

impl MediaItem {
    /// The proxy document embedded for this file.
    pub fn document(&self) -> String {
        format!("{}\n标签：{}", self.title, self.tags.join("，"))
    }

    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "path": self.path.display().to_string(),
            "modality": self.modality.as_str(),
            "title": self.title,
            "tags": self.tags,
        })
    }
}

/// Counts from a `build-media-kb` run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaBuildReport {
    pub images: usize,
    pub videos: usize,
}

/// Every file under `root` whose extension belongs to `modality`, sorted.
pub fn list_media(root: &Path, modality: Modality) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk(root, modality, &mut found);
    found.sort();
    found
}

fn walk(dir: &Path, modality: Modality, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, modality, found);
        } else if has_extension(&path, modality.extensions()) {
            found.push(path);
        }
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| extensions.contains(&ext.as_str()))
}

/// `<prefix>:<sha256(path|size|mtime)>`; stable until the file changes.
pub fn stable_id(prefix: &str, path: &Path) -> String {
    let raw = match std::fs::metadata(path) {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("{}|{}|{}", path.display(), meta.len(), mtime)
        }
        Err(_) => format!("{}|{}", path.display(), uuid::Uuid::new_v4()),
    };
    let digest = Sha256::digest(raw.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}:{hex}")
}

/// Describe every media file of `modality` under `root`.
pub fn collect_items(root: &Path, modality: Modality, tags: &MediaTagConfig) -> Vec<MediaItem> {
    list_media(root, modality)
        .into_iter()
        .map(|path| {
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            MediaItem {
                id: stable_id(modality.id_prefix(), &path),
                title: modality.title(&stem),
                tags: tags.resolve(modality, root, &path),
                modality,
                path,
            }
        })
        .collect()
}

async fn index_items(
    items: Vec<MediaItem>,
    modality: Modality,
    store: &mut VectorStore,
    embedder: &dyn Embedder,
) -> Result<usize, KnowledgeError> {
    if items.is_empty() {
        return Ok(0);
    }
    let documents: Vec<String> = items.iter().map(MediaItem::document).collect();
    let embeddings = embedder.embed(&documents).await?;

    let records: Vec<Record> = items
        .iter()
        .zip(documents)
        .zip(embeddings)
        .map(|((item, document), embedding)| Record {
            id: item.id.clone(),
            document,
            metadata: item.metadata(),
            embedding,
        })
        .collect();

    store.upsert(modality.collection(), &records)?;
    tracing::info!(modality = modality.as_str(), count = records.len(), "media indexed");
    Ok(records.len())
}

/// Index the image and video directories into `kb_image` / `kb_video`.
pub async fn build_media_kb(
    image_dir: &Path,
    video_dir: &Path,
    tags: &MediaTagConfig,
    store: &mut VectorStore,
    embedder: &dyn Embedder,
) -> Result<MediaBuildReport, KnowledgeError> {
    let images = collect_items(image_dir, Modality::Image, tags);
    let videos = collect_items(video_dir, Modality::Video, tags);
    tracing::info!(images = images.len(), videos = videos.len(), "media files found");

    Ok(MediaBuildReport {
        images: index_items(images, Modality::Image, store, embedder).await?,
        videos: index_items(videos, Modality::Video, store, embedder).await?,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::text_kb::tests::FakeEmbedder;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"bytes").unwrap();
    }

    #[test]
    fn test_list_media_recursive_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.PNG"));
        touch(&dir.path().join("sub/a.jpg"));
        touch(&dir.path().join("sub/readme.txt"));
        touch(&dir.path().join("clip.mp4"));

        let images = list_media(dir.path(), Modality::Image);
        let names: Vec<String> = images
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["b.PNG", "sub/a.jpg"]);
        assert_eq!(list_media(dir.path(), Modality::Video).len(), 1);
        assert!(list_media(&dir.path().join("missing"), Modality::Video).is_empty());
    }

    #[test]
    fn test_stable_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        touch(&path);
        let id = stable_id("img", &path);
        assert!(id.starts_with("img:"));
        assert_eq!(id.len(), "img:".len() + 64);
        assert_eq!(id, stable_id("img", &path));
    }

    #[test]
    fn test_item_document_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("会议室.jpg");
        touch(&path);
        let items = collect_items(dir.path(), Modality::Image, &MediaTagConfig::default());
        assert_eq!(items[0].title, "图片 会议室");
        assert_eq!(items[0].document(), "图片 会议室\n标签：一体机，图片");
        assert_eq!(items[0].metadata()["modality"], "image");
        assert_eq!(items[0].metadata()["tags"][1], "图片");
    }

    #[tokio::test]
    async fn test_build_upserts_both_collections() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("img");
        let vid = dir.path().join("video");
        touch(&img.join("正面.jpg"));
        touch(&vid.join("双系统切换.mp4"));
        touch(&vid.join("开机.mov"));

        let mut store = VectorStore::open_in_memory().unwrap();
        let embedder = FakeEmbedder::new();
        let config = MediaTagConfig::default();

        let report = build_media_kb(&img, &vid, &config, &mut store, &embedder).await.unwrap();
        assert_eq!(report, MediaBuildReport { images: 1, videos: 2 });

        // Rebuilding replaces rows instead of duplicating them.
        build_media_kb(&img, &vid, &config, &mut store, &embedder).await.unwrap();
        assert_eq!(store.count("kb_image").unwrap(), 1);
        assert_eq!(store.count("kb_video").unwrap(), 2);
    }
}
