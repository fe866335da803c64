//! Writes into the project tree. Each one lands whole or not at all: data
//! is staged in a tempfile next to the target and renamed into place.

use crate::error::Result;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// What [`seed_file`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeded {
    Created,
    Kept,
}

impl Seeded {
    pub fn label(self) -> &'static str {
        match self {
            Seeded::Created => "created:",
            Seeded::Kept => "exists: ",
        }
    }
}

/// Replace `path` with `data`, creating parent directories.
pub fn replace_file(path: &Path, data: &[u8]) -> Result<()> {
    let staged = stage(path, data)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `data` to `path` unless something is already there. An existing
/// file is never touched, even if it appears between the check and the write.
pub fn seed_file(path: &Path, data: &[u8]) -> Result<Seeded> {
    let staged = stage(path, data)?;
    match staged.persist_noclobber(path) {
        Ok(_) => Ok(Seeded::Created),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(Seeded::Kept),
        Err(e) => Err(e.error.into()),
    }
}

/// Make sure `root/.gitignore` lists every entry. Returns the entries that
/// had to be added.
pub fn ignore_in_git(root: &Path, entries: &[&str]) -> Result<Vec<String>> {
    let path = root.join(".gitignore");
    let mut content = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let missing: Vec<String> = entries
        .iter()
        .filter(|entry| !content.lines().any(|line| line.trim_end() == **entry))
        .map(|entry| entry.to_string())
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for entry in &missing {
        content.push_str(entry);
        content.push('\n');
    }
    replace_file(&path, content.as_bytes())?;
    Ok(missing)
}

fn stage(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    Ok(staged)
}
