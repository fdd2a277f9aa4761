//! Directory layout, discovery and file output.
//!
//! ```text
//! <base>/
//! ├── template/<snake(template)>.rs
//! └── <project>/
//!     ├── transform.toml
//!     ├── *.rs ...                      project inputs (staleness only)
//!     └── generated/<snake(output)>.rs  outputs
//! <interfaces>/**/*.rs                  bound with every template
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::front::SourceText;

pub const CONFIG_FILE: &str = "transform.toml";
pub const TEMPLATE_DIR: &str = "template";
pub const GENERATED_DIR: &str = "generated";

#[derive(Clone, Debug)]
pub struct Layout {
    pub base: PathBuf,
    pub interfaces: PathBuf,
    pub project: String,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>, interfaces: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Layout {
            base: base.into(),
            interfaces: interfaces.into(),
            project: project.into(),
        }
    }

    pub fn project_dir(&self) -> PathBuf {
        self.base.join(&self.project)
    }

    pub fn config_path(&self) -> PathBuf {
        self.project_dir().join(CONFIG_FILE)
    }

    pub fn template_path(&self, template: &str) -> PathBuf {
        self.base
            .join(TEMPLATE_DIR)
            .join(format!("{}.rs", snake_case(template)))
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.project_dir().join(GENERATED_DIR)
    }

    pub fn output_path(&self, output: &str) -> PathBuf {
        self.generated_dir().join(format!("{}.rs", snake_case(output)))
    }

    /// Every `.rs` file below the interfaces directory, sorted.
    pub fn interface_files(&self) -> Result<Vec<PathBuf>> {
        rust_files(&self.interfaces)
    }

    /// Project sources. Generated outputs count only when listed in `do_not_unload`.
    pub fn project_files(&self, do_not_unload: &[String]) -> Result<Vec<PathBuf>> {
        let generated = self.generated_dir();
        Ok(rust_files(&self.project_dir())?
            .into_iter()
            .filter(|path| {
                !path.starts_with(&generated)
                    || path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| do_not_unload.iter().any(|keep| keep == name))
            })
            .collect())
    }
}

fn rust_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| Error::io(dir, e.into()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// `SplayTreeArrayMap` -> `splay_tree_array_map`, `AVLTree` -> `avl_tree`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Whether `path` sits directly in a `generated` directory.
pub fn is_generated(path: &Path) -> bool {
    path.parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.eq_ignore_ascii_case(GENERATED_DIR))
}

pub fn read_source(path: &Path, name: impl Into<String>) -> Result<SourceText> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(SourceText::new(name, text))
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| Error::io(path, e))
}

/// An output is stale unless it is strictly newer than every input and the running executable.
pub fn is_stale(output: &Path, inputs: &[PathBuf]) -> Result<bool> {
    if !output.exists() {
        return Ok(true);
    }
    let target = modified(output)?;
    let mut newest = SystemTime::UNIX_EPOCH;
    for input in inputs {
        newest = newest.max(modified(input)?);
    }
    if let Some(exe) = std::env::current_exe().ok().filter(|exe| exe.exists()) {
        newest = newest.max(modified(&exe)?);
    }
    Ok(target <= newest)
}

/// Replaces `path` with `text` in one step; a failed write leaves the previous file intact.
pub fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    file.write_all(text.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| Error::io(file.path(), e))?;
    file.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Writes the partially specialized text of a failed target to a kept temporary file.
pub fn dump_partial(output: &str, text: &str) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("facetgen-{}-", snake_case(output)))
        .suffix(".rs")
        .tempfile()
        .map_err(|e| Error::io(std::env::temp_dir(), e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| Error::io(file.path(), e))?;
    let (_, path) = file.keep().map_err(|e| Error::io(std::env::temp_dir(), e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("SplayTreeArrayMap"), "splay_tree_array_map");
        assert_eq!(snake_case("EntryMultiRankMap"), "entry_multi_rank_map");
        assert_eq!(snake_case("AVLTree"), "avl_tree");
        assert_eq!(snake_case("Range2Map"), "range2_map");
        assert_eq!(snake_case("tree"), "tree");
    }

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new("/work", "/work/interface", "collections");
        assert_eq!(layout.config_path(), Path::new("/work/collections/transform.toml"));
        assert_eq!(layout.template_path("SplayTree"), Path::new("/work/template/splay_tree.rs"));
        assert_eq!(
            layout.output_path("SplayTreeArrayMap"),
            Path::new("/work/collections/generated/splay_tree_array_map.rs")
        );
        assert!(is_generated(&layout.output_path("X")));
        assert!(!is_generated(&layout.template_path("X")));
    }

    #[test]
    fn test_project_files_skip_generated_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path(), dir.path().join("interface"), "proj");
        fs::create_dir_all(layout.generated_dir()).unwrap();
        fs::write(layout.project_dir().join("lib.rs"), "").unwrap();
        fs::write(layout.project_dir().join("notes.txt"), "").unwrap();
        fs::write(layout.generated_dir().join("tree_array_map.rs"), "").unwrap();
        fs::write(layout.generated_dir().join("entry_map.rs"), "").unwrap();

        let files = layout.project_files(&["entry_map.rs".to_string()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["entry_map.rs", "lib.rs"]);
        assert!(layout.interface_files().unwrap().is_empty());
    }

    #[test]
    fn test_write_atomic_and_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated").join("out.rs");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        let dump = dump_partial("TreeObjectMap", "partial").unwrap();
        assert_eq!(fs::read_to_string(&dump).unwrap(), "partial");
        let name = dump.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("facetgen-tree_object_map-") && name.ends_with(".rs"));
        fs::remove_file(dump).unwrap();
    }

    #[test]
    fn test_missing_output_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_stale(&dir.path().join("absent.rs"), &[]).unwrap());
    }
}
