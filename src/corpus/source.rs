// Document enumeration in a stable, reproducible order.
//
// Files are sorted by the raw bytes of their file name, so the order never
// depends on the platform's directory listing or on locale collation.
// Every call to `documents()` re-reads the files from disk and yields the
// same sequence.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{PipelineError, ReadFailure};

/// One input document. `ordinal` is its index in the sorted file list.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub ordinal: usize,
    pub text: String,
    /// Set when the file could not be read; `text` is empty in that case
    pub read_failure: Option<ReadFailure>,
}

/// A directory of documents with a fixed processing order.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    dir: PathBuf,
    paths: Vec<PathBuf>,
}

impl DocumentSource {
    /// List `*.{extension}` files of `dir` in byte-wise file name order.
    pub fn open(dir: &Path, extension: &str) -> Result<Self, PipelineError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            PipelineError::config(format!(
                "cannot read corpus directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext == extension)
                    .unwrap_or(false)
            })
            .collect();

        paths.sort_by(|a, b| {
            let a = a.file_name().map(|n| n.as_encoded_bytes()).unwrap_or_default();
            let b = b.file_name().map(|n| n.as_encoded_bytes()).unwrap_or_default();
            a.cmp(b)
        });

        info!(dir = %dir.display(), documents = paths.len(), "Opened document source");

        Ok(Self {
            dir: dir.to_path_buf(),
            paths,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Document identities (file stems) in processing order.
    pub fn names(&self) -> Vec<String> {
        self.paths.iter().map(|p| stem(p)).collect()
    }

    /// Read every document, in order. Can be called any number of times.
    pub fn documents(&self) -> impl Iterator<Item = Document> + '_ {
        self.paths
            .iter()
            .enumerate()
            .map(|(ordinal, path)| read_document(path, ordinal))
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read one file as UTF-8. Failures are logged and recorded, never raised,
/// so the document keeps its ordinal position with an empty body.
fn read_document(path: &Path, ordinal: usize) -> Document {
    let name = stem(path);
    match fs::read_to_string(path) {
        Ok(text) => Document {
            name,
            ordinal,
            text,
            read_failure: None,
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read document, using empty text");
            Document {
                read_failure: Some(ReadFailure {
                    name: name.clone(),
                    reason: e.to_string(),
                }),
                name,
                ordinal,
                text: String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_file_name_bytes() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "B.txt", "a10.txt", "a2.txt", "notes.md"] {
            fs::write(dir.path().join(name), name).unwrap();
        }

        let source = DocumentSource::open(dir.path(), "txt").unwrap();
        // Uppercase sorts before lowercase; "a10" before "a2"
        assert_eq!(source.names(), vec!["B", "a10", "a2", "b"]);
    }

    #[test]
    fn invalid_utf8_degrades_to_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hola").unwrap();
        fs::write(dir.path().join("b.txt"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        fs::write(dir.path().join("c.txt"), "adios").unwrap();

        let source = DocumentSource::open(dir.path(), "txt").unwrap();
        let docs: Vec<Document> = source.documents().collect();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[1].ordinal, 1);
        assert!(docs[1].text.is_empty());
        assert!(docs[1].read_failure.is_some());
        assert_eq!(docs[2].text, "adios");
        assert!(docs[2].read_failure.is_none());
    }

    #[test]
    fn missing_directory_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = DocumentSource::open(&missing, "txt").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }
}
