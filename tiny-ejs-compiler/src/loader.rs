//! Filesystem template loading
//!
//! Templates addressed by keys relative to a root directory, with include
//! paths resolved relative to the including template. Keys use forward
//! slashes on every platform so they stay stable as cache keys.

use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Reads templates from a directory tree and resolves include paths
/// relative to the including template
pub struct DirLoader {
    root: PathBuf,
}

impl DirLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reader closure for [`crate::Options::read`].
    pub fn reader(&self) -> impl Fn(&str) -> io::Result<String> + Send + Sync + 'static {
        let root = self.root.clone();
        move |key: &str| std::fs::read_to_string(root.join(key))
    }

    /// Resolver closure for [`crate::Options::resolve`]: requested paths
    /// are interpreted relative to the directory of the parent key.
    pub fn resolver(&self) -> impl Fn(Option<&str>, &str) -> String + Send + Sync + 'static {
        |parent, requested| resolve_key(parent, requested)
    }

    /// All `*.ejs` files under the root, as keys relative to it.
    pub fn templates(&self) -> Vec<String> {
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "ejs") {
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    found.push(normalize(relative));
                }
            }
        }
        found.sort();
        found
    }
}

fn resolve_key(parent: Option<&str>, requested: &str) -> String {
    let mut base = match parent {
        Some(parent) => Path::new(parent)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        None => PathBuf::new(),
    };
    for part in Path::new(requested).components() {
        match part {
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir => {}
            Component::Normal(segment) => base.push(segment),
            _ => {}
        }
    }
    normalize(&base)
}

fn normalize(path: &Path) -> String {
    let segments: Vec<&str> = path
        .components()
        .filter_map(|part| match part {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect();
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_paths_resolve_into_parent_directory() {
        assert_eq!(
            resolve_key(Some("pages/home.ejs"), "side.ejs"),
            "pages/side.ejs"
        );
    }

    #[test]
    fn parent_relative_paths_pop_segments() {
        assert_eq!(
            resolve_key(Some("pages/home.ejs"), "../partials/head.ejs"),
            "partials/head.ejs"
        );
        assert_eq!(
            resolve_key(Some("a/b/c.ejs"), "../../top.ejs"),
            "top.ejs"
        );
    }

    #[test]
    fn missing_parent_resolves_from_the_root() {
        assert_eq!(resolve_key(None, "head.ejs"), "head.ejs");
        assert_eq!(resolve_key(None, "./head.ejs"), "head.ejs");
    }
}
