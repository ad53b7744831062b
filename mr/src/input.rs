use std::path::{Path, PathBuf};

use crate::error::{MrError, MrResult};

/// One readable text source, loaded whole.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        InputFile {
            name: name.into(),
            data: data.into(),
        }
    }
}

pub trait InputSource: Send + Sync {
    fn read(&self) -> MrResult<Vec<InputFile>>;
}

/// Files on the local filesystem. A directory contributes every visible
/// regular file directly inside it.
#[derive(Debug, Clone)]
pub struct FileInput {
    paths: Vec<PathBuf>,
}

impl FileInput {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        FileInput { paths }
    }

    fn expand(path: &Path) -> MrResult<Vec<PathBuf>> {
        let metadata = std::fs::metadata(path).map_err(|_| MrError::InputNotFound {
            location: path.display().to_string(),
        })?;
        if !metadata.is_dir() {
            return Ok(vec![path.to_path_buf()]);
        }

        let mut files = vec![];
        let entries = std::fs::read_dir(path)
            .map_err(|e| MrError::io(format!("listing {}", path.display()), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| MrError::io(format!("listing {}", path.display()), e))?;
            let file = entry.path();
            if file.is_file() && !is_hidden(&file) {
                files.push(file);
            }
        }
        files.sort();
        Ok(files)
    }
}

// `_SUCCESS`, `_temporary` and dotfiles are bookkeeping, not data.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_') || n.starts_with('.'))
}

impl InputSource for FileInput {
    fn read(&self) -> MrResult<Vec<InputFile>> {
        let mut files = vec![];
        for path in &self.paths {
            for file in Self::expand(path)? {
                let data = std::fs::read(&file).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => MrError::InputNotFound {
                        location: file.display().to_string(),
                    },
                    _ => MrError::io(format!("reading {}", file.display()), e),
                })?;
                tracing::debug!("read input {} ({} bytes)", file.display(), data.len());
                files.push(InputFile::new(file.display().to_string(), data));
            }
        }
        Ok(files)
    }
}

/// In-memory texts, mostly for tests and for embedding the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryInput {
    files: Vec<InputFile>,
}

impl MemoryInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, name: &str, text: &str) -> Self {
        self.files.push(InputFile::new(name, text.as_bytes()));
        self
    }

    pub fn with_bytes(mut self, name: &str, data: &[u8]) -> Self {
        self.files.push(InputFile::new(name, data));
        self
    }
}

impl InputSource for MemoryInput {
    fn read(&self) -> MrResult<Vec<InputFile>> {
        Ok(self.files.clone())
    }
}
