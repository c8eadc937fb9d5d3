//! Library path resolution.
//!
//! Maps a declared library name (`libc.so.6`) to the file it names on this system by
//! probing a fixed, ordered list of directories and following symlink chains to their
//! final target.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::ResolverConfig;
use crate::error::{ProvError, Result};

pub struct LibraryResolver {
    config: ResolverConfig,
}

impl LibraryResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolves `name` to the final target of the first existing candidate, or `None`.
    ///
    /// Loops and over-long chains are logged and reported as unresolved.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(name) {
            tracing::debug!("not probing library name {:?}", name);
            return None;
        }
        let candidate = self
            .config
            .search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.exists())?;

        match self.follow_links(&candidate) {
            Ok(path) => {
                tracing::debug!("resolved {} -> {}", name, path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("{} left unresolved: {}", name, e);
                None
            }
        }
    }

    /// Follows `path` through symlinks until a non-link is reached.
    pub fn follow_links(&self, path: &Path) -> Result<PathBuf> {
        let mut current = path.to_path_buf();
        let mut visited = HashSet::new();

        loop {
            // The starting path is not a followed link.
            if !visited.insert(current.clone()) || visited.len() > self.config.max_symlink_depth + 1
            {
                return Err(ProvError::SymlinkLoop {
                    path: path.to_path_buf(),
                });
            }
            let target = match fs::read_link(&current) {
                Ok(target) => target,
                // Not a symlink: the chain ends here.
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => return Ok(current),
                Err(source) => {
                    return Err(ProvError::Io {
                        path: current,
                        source,
                    })
                }
            };
            current = match current.parent() {
                Some(dir) if target.is_relative() => dir.join(target),
                _ => target,
            };
        }
    }
}

impl Default for LibraryResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

/// True for a single normal path component such as `libm.so.6`.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('/')
}
