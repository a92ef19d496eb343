use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::DocumentsConfig;
use crate::retrieval::RetrievedDocument;

use super::chunker::TextChunker;

/// Loads and chunks every `.txt`/`.md` file under the configured data
/// path. Each chunk carries the file name as `source` and its 1-based
/// ordinal as `page`. A missing directory yields an empty corpus so the
/// service can still answer simple-conversation turns.
pub fn load_corpus(config: &DocumentsConfig) -> Result<Vec<RetrievedDocument>> {
    let dir = Path::new(&config.data_path);
    if !dir.is_dir() {
        warn!(
            "Document path {} does not exist, starting with an empty corpus",
            config.data_path
        );
        return Ok(Vec::new());
    }

    let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap);

    let mut paths: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read document directory {}", config.data_path))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("txt") | Some("md")
            )
        })
        .collect();
    paths.sort();

    let mut corpus = Vec::new();
    for path in paths {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        for (i, chunk) in chunker.chunk(&text).into_iter().enumerate() {
            corpus.push(RetrievedDocument::new(
                chunk,
                Some(name.clone()),
                Some(i as u32 + 1),
            ));
        }
    }

    info!("Loaded {} chunks from {}", corpus.len(), config.data_path);
    Ok(corpus)
}
