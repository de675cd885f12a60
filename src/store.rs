//! File Store (§4.5). Local on-disk files with up to `V` historical
//! versions per name. Grounded on `file_sys.go`'s `PutFile`/`GetFile`/
//! `DeleteFile`/`GetVersions`/`ReceiveFile`, reworked into Rust idioms:
//! `std::fs` for the actual I/O (the teacher's `storage::disk` module is
//! page-oriented and doesn't fit a name-keyed blob store, so this follows
//! the original's simpler on-disk layout instead), errors surfaced through
//! `SdfsError::Storage`/`Io` per §7.
//!
//! Per §5, rotation and write are not coordinated across concurrent callers
//! on the same name — no locking is attempted here, matching the spec's
//! accepted limitation (§9).

use crate::error::{Result, SdfsError};
use std::path::{Path, PathBuf};

/// Slashes in an SDFS name are replaced with this glyph so names can't
/// escape the data directory or collide with the version separator.
const SLASH_SUBSTITUTE: char = '∕';
const VERSION_SEP: char = '~';

pub struct FileStore {
    root: PathBuf,
    /// V: total versions retained per name, including current.
    versions: usize,
}

impl FileStore {
    /// Creates (and, per §6 "Persistent state", wipes) the data directory.
    pub fn init(root: impl Into<PathBuf>, versions: usize) -> Result<Self> {
        let root = root.into();
        if root.exists() {
            std::fs::remove_dir_all(&root)?;
        }
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, versions })
    }

    fn sanitize(name: &str) -> String {
        name.replace('/', &SLASH_SUBSTITUTE.to_string())
    }

    fn current_path(&self, name: &str) -> PathBuf {
        self.root.join(Self::sanitize(name))
    }

    fn version_path(&self, name: &str, i: usize) -> PathBuf {
        self.root
            .join(format!("{}{}{}", Self::sanitize(name), VERSION_SEP, i))
    }

    /// §4.5 `put`: rotate existing versions, then write the new current.
    pub fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        // Shift version i -> i+1 for i = versions-1 down to 1, dropping the
        // version that would fall past `versions - 1` historical slots.
        let last_kept = self.versions.saturating_sub(1);
        if last_kept > 0 {
            let overflow = self.version_path(name, last_kept);
            if overflow.exists() {
                std::fs::remove_file(&overflow)?;
            }
            for i in (1..last_kept).rev() {
                let from = self.version_path(name, i);
                if from.exists() {
                    std::fs::rename(&from, self.version_path(name, i + 1))?;
                }
            }
            let current = self.current_path(name);
            if current.exists() {
                std::fs::rename(&current, self.version_path(name, 1))?;
            }
        }
        std::fs::write(self.current_path(name), bytes)?;
        Ok(())
    }

    /// §4.5 `get`.
    pub fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.current_path(name);
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SdfsError::NotFound(name.to_string()),
            _ => SdfsError::Io(e),
        })
    }

    /// §4.5 `delete`: removes current and every numbered predecessor.
    /// Returns whether the current file was present beforehand.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let current = self.current_path(name);
        let was_present = current.exists();
        if was_present {
            std::fs::remove_file(&current)?;
        }
        let last_kept = self.versions.saturating_sub(1);
        for i in 1..=last_kept {
            let p = self.version_path(name, i);
            if p.exists() {
                std::fs::remove_file(&p)?;
            }
        }
        Ok(was_present)
    }

    /// §4.5 `list`.
    pub fn list(&self, name: &str) -> bool {
        self.current_path(name).exists()
    }

    /// §4.5 `get-versions`: concatenates up to `k` most recent contents,
    /// each prefixed by a separator line naming the (0-based) version
    /// index. Index 0 is current.
    pub fn get_versions(&self, name: &str, k: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut any = false;
        for i in 0..k {
            let path = if i == 0 {
                self.current_path(name)
            } else {
                self.version_path(name, i)
            };
            let Ok(contents) = std::fs::read(&path) else {
                continue;
            };
            any = true;
            out.extend_from_slice(format!("\n----- version {i} -----\n").as_bytes());
            out.extend_from_slice(&contents);
        }
        if !any {
            return Err(SdfsError::NotFound(name.to_string()));
        }
        Ok(out)
    }

    /// §4.5 `receive`: overwrite current without rotation (replication
    /// shipping).
    pub fn receive(&self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::write(self.current_path(name), bytes)?;
        Ok(())
    }

    /// Names of every file currently held locally (current versions only,
    /// version-suffixed siblings are not separately reported). Used by the
    /// replication controller to enumerate what might need rebalancing.
    pub fn local_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !is_version_sibling(&file_name) {
                names.push(file_name.replace(SLASH_SUBSTITUTE, "/"));
            }
        }
        Ok(names)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A version-suffixed sibling is `<name>~<int>`; only the trailing `~<int>`
/// marks one, since `~` is otherwise a legal SDFS-name character (only `/`
/// is escaped per §3).
fn is_version_sibling(file_name: &str) -> bool {
    file_name
        .rsplit_once(VERSION_SEP)
        .is_some_and(|(_, suffix)| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::init(dir.path().join("sdfs"), 4).unwrap();
        store.put("f.txt", b"hello").unwrap();
        assert_eq!(store.get("f.txt").unwrap(), b"hello");
    }

    #[test]
    fn versioning_scenario_5() {
        let dir = tempdir().unwrap();
        let store = FileStore::init(dir.path().join("sdfs"), 4).unwrap();
        for v in ["v1", "v2", "v3", "v4", "v5"] {
            store.put("f.txt", v.as_bytes()).unwrap();
        }
        let blob = store.get_versions("f.txt", 4).unwrap();
        let text = String::from_utf8(blob).unwrap();
        assert!(text.contains("version 0"));
        assert!(text.contains("v5"));
        assert!(text.contains("v4"));
        assert!(text.contains("v3"));
        assert!(text.contains("v2"));
        assert!(
            !text.contains("v1"),
            "version 1 payload must have been discarded"
        );
    }

    #[test]
    fn delete_removes_all_versions() {
        let dir = tempdir().unwrap();
        let store = FileStore::init(dir.path().join("sdfs"), 4).unwrap();
        for v in ["v1", "v2", "v3"] {
            store.put("f.txt", v.as_bytes()).unwrap();
        }
        assert!(store.delete("f.txt").unwrap());
        assert!(!store.list("f.txt"));
        assert!(store.get_versions("f.txt", 4).is_err());
    }

    #[test]
    fn delete_absent_returns_false() {
        let dir = tempdir().unwrap();
        let store = FileStore::init(dir.path().join("sdfs"), 4).unwrap();
        assert!(!store.delete("missing").unwrap());
    }

    #[test]
    fn receive_overwrites_without_rotation() {
        let dir = tempdir().unwrap();
        let store = FileStore::init(dir.path().join("sdfs"), 4).unwrap();
        store.put("f.txt", b"v1").unwrap();
        store.receive("f.txt", b"v2").unwrap();
        assert_eq!(store.get("f.txt").unwrap(), b"v2");
        // receive must not push v1 into a numbered version slot.
        let versions = store.get_versions("f.txt", 2).unwrap();
        assert!(!String::from_utf8_lossy(&versions).contains("v1"));
    }

    #[test]
    fn slash_in_name_is_escaped() {
        let dir = tempdir().unwrap();
        let store = FileStore::init(dir.path().join("sdfs"), 4).unwrap();
        store.put("a/b.txt", b"x").unwrap();
        assert_eq!(store.get("a/b.txt").unwrap(), b"x");
        assert_eq!(store.local_names().unwrap(), vec!["a/b.txt".to_string()]);
    }

    #[test]
    fn tilde_in_name_is_not_mistaken_for_a_version_suffix() {
        let dir = tempdir().unwrap();
        let store = FileStore::init(dir.path().join("sdfs"), 4).unwrap();
        store.put("report~2024.txt", b"x").unwrap();
        store.put("a~b.txt", b"y").unwrap();
        let mut names = store.local_names().unwrap();
        names.sort();
        assert_eq!(
            names,
            vec!["a~b.txt".to_string(), "report~2024.txt".to_string()]
        );
    }
}
