//! Media tag configuration (`media_tags.yaml`) and tag resolution.
//!
//! Tags for a media file are layered: the modality's `default` tags, then
//! each ancestor folder (`a`, then `a/b`), then the file name. When nothing
//! is configured the tags are inferred from the file name.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::KnowledgeError;

// ─── Modality ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Video,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Collection holding this modality.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Image => "kb_image",
            Self::Video => "kb_video",
        }
    }

    /// Prefix of stable record ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Image => "img",
            Self::Video => "vid",
        }
    }

    /// Lowercase extensions indexed for this modality.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => &["jpg", "jpeg", "png", "webp"],
            Self::Video => &["mp4", "mov", "mkv", "avi"],
        }
    }

    /// Human title for a file stem, e.g. `图片 展厅`.
    pub fn title(self, stem: &str) -> String {
        match self {
            Self::Image => format!("图片 {stem}"),
            Self::Video => format!("视频 {stem}"),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "img" | "图片" => Some(Self::Image),
            "video" | "vid" | "视频" => Some(Self::Video),
            _ => None,
        }
    }
}

// ─── Config ─────────────────────────────────────────────────────────────────

/// Tag rules for one modality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityTags {
    pub default: Vec<String>,
    /// Relative folder path (`a` or `a/b`) → tags.
    pub folders: HashMap<String, Vec<String>>,
    /// File name → tags.
    pub files: HashMap<String, Vec<String>>,
}

/// Contents of `media_tags.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaTagConfig {
    pub image: ModalityTags,
    pub video: ModalityTags,
}

impl Default for MediaTagConfig {
    fn default() -> Self {
        let tags = |list: &[&str]| list.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        Self {
            image: ModalityTags {
                default: tags(&["一体机", "图片"]),
                ..ModalityTags::default()
            },
            video: ModalityTags {
                default: tags(&["一体机", "视频", "演示"]),
                folders: HashMap::new(),
                files: HashMap::from([(
                    "双系统切换.mp4".to_string(),
                    tags(&["一体机", "视频", "演示", "双系统", "切换"]),
                )]),
            },
        }
    }
}

impl MediaTagConfig {
    /// Load from `path`, falling back to the built-in defaults when absent.
    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no media tag config, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| KnowledgeError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|e| KnowledgeError::TagConfigError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn for_modality(&self, modality: Modality) -> &ModalityTags {
        match modality {
            Modality::Image => &self.image,
            Modality::Video => &self.video,
        }
    }

    /// Tags for `file` found under `root`.
    pub fn resolve(&self, modality: Modality, root: &Path, file: &Path) -> Vec<String> {
        let rules = self.for_modality(modality);
        let file_name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        let mut tags = merge_tags(&[], &rules.default);

        let rel_dir = file
            .parent()
            .and_then(|dir| dir.strip_prefix(root).ok())
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut current = String::new();
        for part in rel_dir {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(&part);
            if let Some(extra) = rules.folders.get(&current) {
                tags = merge_tags(&tags, extra);
            }
        }

        if let Some(extra) = rules.files.get(&file_name) {
            tags = merge_tags(&tags, extra);
        }

        if tags.is_empty() {
            return infer_tags(modality, &file_name);
        }
        tags
    }
}

/// `base` followed by `extra`, de-duplicated in first-seen order, empties dropped.
pub fn merge_tags(base: &[String], extra: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(base.len() + extra.len());
    for tag in base.iter().chain(extra) {
        if !tag.is_empty() && !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out
}

/// Name-based fallback when no rule matched.
pub fn infer_tags(modality: Modality, file_name: &str) -> Vec<String> {
    let mut tags: Vec<&str> = match modality {
        Modality::Image => vec!["一体机", "图片"],
        Modality::Video => vec!["一体机", "视频", "演示"],
    };
    match modality {
        Modality::Image => {
            if file_name.contains("会议") {
                tags.push("会议场景");
            }
            if file_name.contains("教学") {
                tags.push("教学场景");
            }
        }
        Modality::Video => {
            if file_name.contains("双系统") {
                tags.extend(["双系统", "切换"]);
            }
        }
    }
    tags.into_iter().map(String::from).collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn s(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = MediaTagConfig::default();
        let root = PathBuf::from("/media/video");
        assert_eq!(
            config.resolve(Modality::Video, &root, &root.join("双系统切换.mp4")),
            s(&["一体机", "视频", "演示", "双系统", "切换"])
        );
        assert_eq!(
            config.resolve(Modality::Video, &root, &root.join("开机.mp4")),
            s(&["一体机", "视频", "演示"])
        );
    }

    #[test]
    fn test_folder_inheritance_then_file() {
        let config: MediaTagConfig = serde_yaml::from_str(
            r#"
image:
  default: [一体机]
  folders:
    展厅: [展厅, 一体机]
    展厅/北京: [北京]
  files:
    正面.jpg: [正面, 展厅]
"#,
        )
        .unwrap();
        let root = PathBuf::from("/m/img");
        let tags = config.resolve(Modality::Image, &root, &root.join("展厅/北京/正面.jpg"));
        assert_eq!(tags, s(&["一体机", "展厅", "北京", "正面"]));

        // Video section absent from the file keeps the built-in rules.
        let vroot = PathBuf::from("/m/video");
        assert_eq!(
            config.resolve(Modality::Video, &vroot, &vroot.join("双系统切换.mp4")),
            s(&["一体机", "视频", "演示", "双系统", "切换"])
        );
    }

    #[test]
    fn test_empty_rules_fall_back_to_inference() {
        let config: MediaTagConfig = serde_yaml::from_str("video:\n  default: []\n").unwrap();
        let root = PathBuf::from("/m/video");
        assert_eq!(
            config.resolve(Modality::Video, &root, &root.join("双系统演示.mp4")),
            s(&["一体机", "视频", "演示", "双系统", "切换"])
        );
    }

    #[test]
    fn test_inference_for_images() {
        assert_eq!(infer_tags(Modality::Image, "会议教学.png"), s(&["一体机", "图片", "会议场景", "教学场景"]));
        assert_eq!(infer_tags(Modality::Image, "x.png"), s(&["一体机", "图片"]));
    }

    #[test]
    fn test_merge_dedups_and_drops_empty() {
        assert_eq!(merge_tags(&s(&["a", "b"]), &s(&["", "b", "c", "a"])), s(&["a", "b", "c"]));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MediaTagConfig::load(&dir.path().join("media_tags.yaml")).unwrap();
        assert_eq!(config.image.default, s(&["一体机", "图片"]));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media_tags.yaml");
        std::fs::write(&path, "image: [unterminated").unwrap();
        assert!(matches!(MediaTagConfig::load(&path), Err(KnowledgeError::TagConfigError { .. })));
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!(Modality::parse("Image"), Some(Modality::Image));
        assert_eq!(Modality::parse("视频"), Some(Modality::Video));
        assert_eq!(Modality::parse("audio"), None);
    }
}
