//! Bundle manifest: an index of every artifact file and its content hash.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::digest::ContentDigest;
use crate::error::AttestError;
use crate::fsio::write_json_atomic;
use crate::Result;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_RECEIPT_FILE: &str = "manifest.receipt.json";

const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// One file recorded in a manifest. `path` is bundle-relative with `/`
/// separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub path: String,
    pub sha256: ContentDigest,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub schema_version: u32,
    pub artifacts: Vec<ArtifactEntry>,
}

/// Files dropped by desktop file managers; never part of a bundle.
pub(crate) fn is_os_noise(file_name: &str) -> bool {
    matches!(file_name, ".DS_Store" | "Thumbs.db" | "desktop.ini") || file_name.starts_with("._")
}

/// Files that describe the bundle rather than belong to it.
pub(crate) fn is_manifest_file(rel: &str) -> bool {
    rel == MANIFEST_FILE || rel == MANIFEST_RECEIPT_FILE
}

/// True when `rel` names a file strictly inside the bundle: relative, no
/// `..`, no root or prefix components.
pub(crate) fn is_bundle_relative(rel: &str) -> bool {
    let path = Path::new(rel);
    !rel.is_empty()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

/// Walk `root` and return bundle-relative paths of every regular file,
/// sorted, excluding OS noise.
pub(crate) fn list_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            AttestError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop in bundle")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_os_noise(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| AttestError::Io(std::io::Error::other(e.to_string())))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((rel, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

impl BundleManifest {
    /// Hash every file under `root` except the manifest itself and its receipt.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut artifacts = Vec::new();
        for (rel, abs) in list_files(root)? {
            if is_manifest_file(&rel) {
                continue;
            }
            let bytes = fs::read(&abs)?;
            artifacts.push(ArtifactEntry {
                path: rel,
                sha256: ContentDigest::from_bytes(&bytes),
                bytes: bytes.len() as u64,
            });
        }
        Ok(Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            artifacts,
        })
    }

    /// Write `manifest.json` into `root`.
    pub fn write(&self, root: &Path) -> Result<()> {
        write_json_atomic(&root.join(MANIFEST_FILE), self)
    }

    /// Read `manifest.json` from `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| AttestError::MalformedManifest {
            path,
            reason: e.to_string(),
        })
    }

    /// Linear lookup; a loaded manifest is not trusted to be sorted.
    pub fn get(&self, path: &str) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_sorts_and_skips_noise() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("matches/m1")).expect("mkdir");
        fs::write(root.join("standings.json"), b"{}").expect("write");
        fs::write(root.join("matches/m1/events.jsonl"), b"line\n").expect("write");
        fs::write(root.join(".DS_Store"), b"junk").expect("write");
        fs::write(root.join("matches/._events.jsonl"), b"junk").expect("write");
        fs::write(root.join(MANIFEST_FILE), b"{}").expect("write");

        let manifest = BundleManifest::scan(root).expect("scan");
        let paths: Vec<&str> = manifest.artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["matches/m1/events.jsonl", "standings.json"]);
        assert_eq!(manifest.artifacts[0].bytes, 5);
        assert!(manifest.get("standings.json").is_some());
        assert!(manifest.get("missing.json").is_none());
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), b"a").expect("write");
        let manifest = BundleManifest::scan(dir.path()).expect("scan");
        manifest.write(dir.path()).expect("write manifest");
        assert_eq!(BundleManifest::load(dir.path()).expect("load"), manifest);
    }

    #[test]
    fn get_does_not_rely_on_order() {
        let entry = |path: &str| ArtifactEntry {
            path: path.to_string(),
            sha256: ContentDigest::from_bytes(path.as_bytes()),
            bytes: 1,
        };
        let manifest = BundleManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            artifacts: vec![entry("z.json"), entry("b.json"), entry("a.json")],
        };
        assert!(manifest.get("a.json").is_some());
        assert!(manifest.get("b.json").is_some());
        assert!(manifest.get("c.json").is_none());
    }

    #[test]
    fn bundle_relative_paths() {
        assert!(is_bundle_relative("matches/m1/events.jsonl"));
        assert!(!is_bundle_relative("../outside.json"));
        assert!(!is_bundle_relative("matches/../../etc/passwd"));
        assert!(!is_bundle_relative("/etc/passwd"));
        assert!(!is_bundle_relative("./a.json"));
        assert!(!is_bundle_relative(""));
    }

    #[test]
    fn noise_names() {
        assert!(is_os_noise(".DS_Store"));
        assert!(is_os_noise("._foo"));
        assert!(is_os_noise("Thumbs.db"));
        assert!(!is_os_noise("events.jsonl"));
    }
}
