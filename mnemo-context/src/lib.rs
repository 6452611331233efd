//! mnemo-context: turns notes into retrieval passages.
//!
//! - [`text`]: deterministic, overlapping token-window chunking
//! - [`frontmatter`]: YAML frontmatter, title and PARA category extraction
pub mod frontmatter;
pub mod text;

pub use frontmatter::{DocumentMetadata, ParaCategory, SplitNote, split_frontmatter};
pub use text::{ChunkIter, TextChunk, TextChunker, chunk, content_hash};
