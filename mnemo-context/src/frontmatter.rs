//! Note metadata: YAML frontmatter, titles and PARA categories.
//!
//! A note may open with a YAML block fenced by `---` lines. The block supplies an
//! optional `title`, `tags` and `aliases`; tags and aliases may each be written as a
//! single string or as a list. The block is stripped before chunking, and
//! [`split_frontmatter`] reports where the body starts so chunk offsets stay
//! relative to the whole file.
//!
//! ```
//! use mnemo_context::frontmatter::{DocumentMetadata, ParaCategory};
//!
//! let note = "---\ntags: [astro, sky]\naliases: blue sky\n---\n# Sky\nThe sky is blue.";
//! let meta = DocumentMetadata::extract("Areas/weather/sky.md", note);
//!
//! assert_eq!(meta.title, "Sky");
//! assert_eq!(meta.tags, vec!["astro", "sky"]);
//! assert_eq!(meta.aliases, vec!["blue sky"]);
//! assert_eq!(meta.category, Some(ParaCategory::Areas));
//! ```
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A---\r?\n([\s\S]*?)\r?\n---[ \t]*(?:\r?\n|\z)").expect("valid frontmatter regex")
});

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*$").expect("valid heading regex"));

/// PARA organisation bucket, derived from a note's top-level folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParaCategory {
    Projects,
    Areas,
    Resources,
    Archives,
}

impl ParaCategory {
    /// Classifies a vault-relative path by its first component. Numeric prefixes
    /// such as `1. Projects` or `02-Areas` are ignored, and so is case.
    pub fn from_relative_path(relative_path: &str) -> Option<Self> {
        let normalized = relative_path.replace('\\', "/");
        let top = normalized.split('/').next()?;
        if top == normalized {
            // A file at the vault root has no folder.
            return None;
        }
        let name = top
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | '_' | ' '))
            .to_lowercase();
        match name.as_str() {
            "projects" | "project" => Some(Self::Projects),
            "areas" | "area" => Some(Self::Areas),
            "resources" | "resource" => Some(Self::Resources),
            "archives" | "archive" => Some(Self::Archives),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Areas => "areas",
            Self::Resources => "resources",
            Self::Archives => "archives",
        }
    }
}

impl fmt::Display for ParaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParaCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "projects" => Ok(Self::Projects),
            "areas" => Ok(Self::Areas),
            "resources" => Ok(Self::Resources),
            "archives" => Ok(Self::Archives),
            _ => Err(format!("Invalid PARA category: {s}")),
        }
    }
}

/// A note split into its frontmatter and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitNote<'a> {
    /// Raw YAML between the fences, if the note has a frontmatter block.
    pub frontmatter: Option<&'a str>,
    /// Everything after the closing fence.
    pub body: &'a str,
    /// Byte offset of `body` within the note.
    pub body_offset: usize,
    /// Number of lines consumed by the frontmatter block.
    pub body_line_offset: usize,
}

/// Separates a leading `---` fenced YAML block from the rest of the note.
pub fn split_frontmatter(content: &str) -> SplitNote<'_> {
    match FRONTMATTER.captures(content) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let yaml = caps.get(1).map(|m| m.as_str());
            let consumed = &content[..whole];
            SplitNote {
                frontmatter: yaml,
                body: &content[whole..],
                body_offset: whole,
                body_line_offset: consumed.bytes().filter(|&b| b == b'\n').count(),
            }
        }
        None => SplitNote {
            frontmatter: None,
            body: content,
            body_offset: 0,
            body_line_offset: 0,
        },
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFrontmatter {
    title: Option<String>,
    #[serde(default)]
    tags: StringOrList,
    #[serde(default, alias = "alias")]
    aliases: StringOrList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    #[default]
    Missing,
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            Self::Missing => Vec::new(),
            Self::One(s) => s.split(',').map(str::to_string).collect(),
            Self::Many(v) => v,
        };
        items
            .into_iter()
            .map(|s| s.trim().trim_start_matches('#').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Title, tags, aliases and category for one note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
    pub category: Option<ParaCategory>,
}

impl DocumentMetadata {
    /// Extracts metadata for the note at `relative_path`.
    ///
    /// The title comes from frontmatter, then the first `# ` heading, then the file
    /// stem. Malformed YAML is treated as an absent block rather than an error.
    pub fn extract(relative_path: &str, content: &str) -> Self {
        let split = split_frontmatter(content);
        let raw: RawFrontmatter = split
            .frontmatter
            .and_then(|yaml| serde_yaml::from_str(yaml).ok())
            .unwrap_or_default();

        let title = raw
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| {
                HEADING
                    .captures(split.body)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .unwrap_or_else(|| file_stem(relative_path));

        Self {
            title,
            tags: raw.tags.into_vec(),
            aliases: raw.aliases.into_vec(),
            category: ParaCategory::from_relative_path(relative_path),
        }
    }

    /// Bracketed prefix prepended to chunk text before embedding, e.g.
    /// `[Title: Sky] [Area: areas] [Tags: astro, sky]`. Empty fields are omitted.
    pub fn embedding_prefix(&self) -> String {
        let mut parts = Vec::new();
        if !self.title.is_empty() {
            parts.push(format!("[Title: {}]", self.title));
        }
        if let Some(category) = self.category {
            parts.push(format!("[Area: {category}]"));
        }
        if !self.tags.is_empty() {
            parts.push(format!("[Tags: {}]", self.tags.join(", ")));
        }
        if !self.aliases.is_empty() {
            parts.push(format!("[Aliases: {}]", self.aliases.join(", ")));
        }
        parts.join(" ")
    }

    /// Text actually sent to the embedder for a chunk of this note.
    pub fn embedding_input(&self, chunk_text: &str) -> String {
        let prefix = self.embedding_prefix();
        if prefix.is_empty() {
            chunk_text.to_string()
        } else {
            format!("{prefix}\n{chunk_text}")
        }
    }
}

fn file_stem(relative_path: &str) -> String {
    Path::new(relative_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| relative_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_without_frontmatter() {
        let split = split_frontmatter("# Heading\nbody");
        assert_eq!(split.frontmatter, None);
        assert_eq!(split.body, "# Heading\nbody");
        assert_eq!(split.body_offset, 0);
        assert_eq!(split.body_line_offset, 0);
    }

    #[test]
    fn split_reports_body_offsets() {
        let note = "---\ntitle: Sky\ntags: a\n---\nThe sky is blue.";
        let split = split_frontmatter(note);
        assert_eq!(split.frontmatter, Some("title: Sky\ntags: a"));
        assert_eq!(split.body, "The sky is blue.");
        assert_eq!(&note[split.body_offset..], split.body);
        assert_eq!(split.body_line_offset, 4);
    }

    #[test]
    fn title_falls_back_to_heading_then_stem() {
        let with_heading = DocumentMetadata::extract("notes/sky.md", "intro\n# Blue Sky\ntext");
        assert_eq!(with_heading.title, "Blue Sky");

        let bare = DocumentMetadata::extract("notes/sky.md", "just text");
        assert_eq!(bare.title, "sky");

        let explicit =
            DocumentMetadata::extract("sky.md", "---\ntitle: Heavens\n---\n# Ignored\n");
        assert_eq!(explicit.title, "Heavens");
    }

    #[test]
    fn tags_and_aliases_accept_strings_or_lists() {
        let meta = DocumentMetadata::extract(
            "x.md",
            "---\ntags: \"#one, two\"\naliases:\n  - First\n  - Second\n---\n",
        );
        assert_eq!(meta.tags, vec!["one", "two"]);
        assert_eq!(meta.aliases, vec!["First", "Second"]);
    }

    #[test]
    fn malformed_yaml_is_ignored() {
        let meta = DocumentMetadata::extract("bad.md", "---\ntags: [unclosed\n---\nbody");
        assert_eq!(meta.title, "bad");
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn para_category_from_folder() {
        assert_eq!(
            ParaCategory::from_relative_path("1. Projects/launch.md"),
            Some(ParaCategory::Projects)
        );
        assert_eq!(
            ParaCategory::from_relative_path("02-areas/health/run.md"),
            Some(ParaCategory::Areas)
        );
        assert_eq!(
            ParaCategory::from_relative_path("Archives\\old.md"),
            Some(ParaCategory::Archives)
        );
        assert_eq!(ParaCategory::from_relative_path("Inbox/todo.md"), None);
        assert_eq!(ParaCategory::from_relative_path("Projects.md"), None);
    }

    #[test]
    fn embedding_input_carries_metadata() {
        let meta = DocumentMetadata {
            title: "Sky".to_string(),
            tags: vec!["astro".to_string()],
            aliases: vec![],
            category: Some(ParaCategory::Resources),
        };
        assert_eq!(
            meta.embedding_input("the sky is blue"),
            "[Title: Sky] [Area: resources] [Tags: astro]\nthe sky is blue"
        );

        let empty = DocumentMetadata::default();
        assert_eq!(empty.embedding_input("plain"), "plain");
    }
}
