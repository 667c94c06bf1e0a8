use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use miette::Result;

use crate::error;

/// Locates program files by name, for the entry file and `inc` directives.
pub trait SourceLoader {
    fn load(&self, name: &str) -> Result<String>;
}

/// Files resolved relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsRoot {
    root: PathBuf,
}

impl FsRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsRoot { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceLoader for FsRoot {
    fn load(&self, name: &str) -> Result<String> {
        let path = self.root.join(name);
        fs::read_to_string(&path).map_err(|e| error::io_read(name, &path, e))
    }
}

/// Named in-memory files.
#[derive(Debug, Default, Clone)]
pub struct MemorySources {
    files: HashMap<String, String>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(name.into(), contents.into());
        self
    }
}

impl SourceLoader for MemorySources {
    fn load(&self, name: &str) -> Result<String> {
        self.files.get(name).cloned().ok_or_else(|| {
            let e = std::io::Error::from(std::io::ErrorKind::NotFound);
            error::io_read(name, Path::new(name), e)
        })
    }
}
