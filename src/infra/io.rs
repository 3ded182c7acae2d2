use memchr::{memchr, memchr_iter};
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{DedupError, Result};

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// Raw bytes of a file, mapped or buffered depending on size
pub enum FileContent {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl AsRef<[u8]> for FileContent {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileContent::Mapped(mmap) => &mmap[..],
            FileContent::Buffered(buf) => buf.as_slice(),
        }
    }
}

/// Encoding that successfully decoded a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// A decoded input file. Immutable once read.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path as discovered on disk
    pub path: PathBuf,
    /// Path relative to the input root, used in reports and bucket names
    pub relative: PathBuf,
    /// Decoded text
    pub text: String,
    /// Size of the raw bytes on disk
    pub size: u64,
    /// Newline count plus one
    pub line_count: usize,
    pub encoding: TextEncoding,
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> std::io::Result<FileContent> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)?;

    if metadata.len() > MMAP_THRESHOLD {
        let file = File::open(path)?;

        // Safety: read-only map; inputs are not modified while a run is active
        let mmap = unsafe { Mmap::map(&file) }?;

        Ok(FileContent::Mapped(mmap))
    } else {
        Ok(FileContent::Buffered(std::fs::read(path)?))
    }
}

/// Read and decode one document.
///
/// UTF-8 is tried first, then Latin-1 which maps every byte to a char.
/// Content with NUL bytes is rejected as binary before either is attempted.
pub fn read_document(path: &Path, root: &Path) -> Result<Document> {
    let content = read_file_smart(path).map_err(|e| DedupError::FileRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let bytes = content.as_ref();

    if memchr(0, bytes).is_some() {
        return Err(DedupError::FileRead {
            path: path.to_path_buf(),
            reason: "binary content (NUL byte)".to_string(),
        });
    }

    let (text, encoding) = decode_text(bytes);
    let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();

    Ok(Document {
        path: path.to_path_buf(),
        relative,
        size: bytes.len() as u64,
        line_count: count_lines(bytes),
        text,
        encoding,
    })
}

/// Decode as UTF-8, falling back to Latin-1
pub fn decode_text(bytes: &[u8]) -> (String, TextEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_owned(), TextEncoding::Utf8),
        Err(_) => (
            bytes.iter().map(|&b| b as char).collect(),
            TextEncoding::Latin1,
        ),
    }
}

/// '\n' count plus one, so a file without newlines has one line
pub fn count_lines(bytes: &[u8]) -> usize {
    memchr_iter(b'\n', bytes).count() + 1
}
