use clap::Parser;
use mnemo_context::text::{DEFAULT_OVERLAP_TOKENS, DEFAULT_TARGET_TOKENS, TextChunk, TextChunker};
use mnemo_context::{DocumentMetadata, split_frontmatter};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// A CLI tool to chunk a note into JSON output using mnemo-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input note. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Vault-relative path used for title and PARA category extraction.
    #[arg(short, long, default_value = "note.md")]
    path: String,

    /// Maximum tokens per chunk.
    #[arg(short, long, default_value_t = DEFAULT_TARGET_TOKENS)]
    tokens: usize,

    /// Tokens shared between consecutive chunks.
    #[arg(short, long, default_value_t = DEFAULT_OVERLAP_TOKENS)]
    overlap: usize,
}

#[derive(Serialize)]
struct ChunkedNote<'a> {
    path: &'a str,
    metadata: DocumentMetadata,
    chunks: Vec<TextChunk>,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let split = split_frontmatter(&content);
    let chunks = TextChunker::new(args.tokens, args.overlap)
        .chunks_at(split.body, split.body_offset, split.body_line_offset)
        .collect();

    let output = ChunkedNote {
        path: &args.path,
        metadata: DocumentMetadata::extract(&args.path, &content),
        chunks,
    };

    let json_output = serde_json::to_string_pretty(&output)?;
    println!("{json_output}");

    Ok(())
}
