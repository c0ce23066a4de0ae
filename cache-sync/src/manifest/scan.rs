//! Scan-only workflow: record local files in the manifest without uploading.
//!
//! Used when the files are published out of band (e.g. attached to a
//! release by hand). Only the manifest is written, once, at the end.

use super::diff::{diff, DiffState};
use super::{save_manifest, FileEntry, Manifest};
use crate::utils::errors::Result;
use std::path::Path;
use tracing::{debug, info};

/// Record every new (and, with `force`, every changed) local file.
///
/// `url_for` maps a cache key to the URL it will be served from. Returns
/// the recorded keys in diff order.
pub fn scan_into_manifest<F>(
    manifest: &mut Manifest,
    data_dir: &Path,
    force: bool,
    url_for: F,
) -> Result<Vec<String>>
where
    F: Fn(&str) -> String,
{
    let mut updates = Vec::new();

    for entry in diff(manifest, data_dir)? {
        let entry = entry?;
        let eligible = match entry.state {
            DiffState::OnlyLocal => true,
            DiffState::Sha256Mismatch => force,
            DiffState::OnlyRemote | DiffState::Matching => false,
        };
        if !eligible {
            debug!("scan: skipping {} ({})", entry.file, entry.state);
            continue;
        }
        if let Some(sha256) = entry.local_sha256 {
            updates.push((entry.file, sha256));
        }
    }

    let mut recorded = Vec::with_capacity(updates.len());
    for (file, sha256) in updates {
        info!("scan: recording {} (sha256 {})", file, sha256);
        let url = url_for(&file);
        manifest.record(file.clone(), FileEntry { sha256, url });
        recorded.push(file);
    }

    Ok(recorded)
}

/// Scan and persist the manifest at `manifest_path`.
pub fn scan_and_save<F>(
    manifest: &mut Manifest,
    data_dir: &Path,
    manifest_path: &Path,
    force: bool,
    url_for: F,
) -> Result<Vec<String>>
where
    F: Fn(&str) -> String,
{
    let recorded = scan_into_manifest(manifest, data_dir, force, url_for)?;
    save_manifest(manifest, manifest_path)?;
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::hash::hash_bytes;
    use crate::manifest::{load_manifest, manifest_path_for};
    use std::fs;
    use tempfile::TempDir;

    const NEW: &str = "cache/v1/20241001T000000Z/20241101T000000Z/downloads/data.parquet";
    const CHANGED: &str = "cache/v1/20241001T000000Z/20241101T000000Z/downloads/stats.json";

    fn setup() -> (TempDir, Manifest) {
        let temp_dir = TempDir::new().unwrap();
        for (key, content) in [(NEW, "new"), (CHANGED, "changed")] {
            let path = temp_dir.path().join(key);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let mut manifest = Manifest::default();
        manifest.record(
            CHANGED,
            FileEntry {
                sha256: hash_bytes(b"original"),
                url: "https://example.com/old".to_string(),
            },
        );
        (temp_dir, manifest)
    }

    #[test]
    fn test_scan_records_only_new_files() -> Result<()> {
        let (temp_dir, mut manifest) = setup();

        let recorded = scan_into_manifest(&mut manifest, temp_dir.path(), false, |k| {
            format!("https://example.com/{k}")
        })?;

        assert_eq!(recorded, vec![NEW.to_string()]);
        assert_eq!(manifest.get_file_entry(NEW)?.sha256, hash_bytes(b"new"));
        assert_eq!(manifest.get_file_entry(CHANGED)?.sha256, hash_bytes(b"original"));
        Ok(())
    }

    #[test]
    fn test_scan_force_records_changed_files() -> Result<()> {
        let (temp_dir, mut manifest) = setup();
        let manifest_path = manifest_path_for(temp_dir.path());

        let recorded = scan_and_save(&mut manifest, temp_dir.path(), &manifest_path, true, |k| {
            format!("https://example.com/{k}")
        })?;

        assert_eq!(recorded.len(), 2);
        let saved = load_manifest(&manifest_path)?;
        assert_eq!(saved.get_file_entry(CHANGED)?.sha256, hash_bytes(b"changed"));
        assert_eq!(
            saved.get_file_entry(CHANGED)?.url,
            format!("https://example.com/{CHANGED}")
        );
        Ok(())
    }
}
