use std::path::PathBuf;

/// Directory program files are resolved against, unless overridden.
pub const DEFAULT_ROOT: &str = "./fs_root";
/// Bootstrap file loaded from the root.
pub const DEFAULT_ENTRY: &str = "boot.nla";
/// Memory cells available to a machine.
pub const DEFAULT_MEMORY_SIZE: usize = 1024;

/// Everything needed to boot a machine from disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub root: PathBuf,
    pub entry: String,
    pub memory_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: PathBuf::from(DEFAULT_ROOT),
            entry: DEFAULT_ENTRY.to_string(),
            memory_size: DEFAULT_MEMORY_SIZE,
        }
    }
}
