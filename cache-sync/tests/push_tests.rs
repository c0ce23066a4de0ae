mod common;

use cache_sync::config::{RemoteConfig, TransferConfig};
use cache_sync::fs::hash::hash_bytes;
use cache_sync::manifest::diff::diff;
use cache_sync::manifest::{load_manifest, manifest_path_for, save_manifest, FileEntry, Manifest};
use cache_sync::transfer::{select_push_targets, Pusher};
use cache_sync::Result;
use common::{spawn_store, stats_key, write_local, FakeStore};
use tempfile::TempDir;

const PUBLIC_BASE: &str = "https://public.example.org";

fn remote_config(endpoint: &str, token: Option<&str>) -> RemoteConfig {
    RemoteConfig {
        endpoint: endpoint.to_string(),
        public_base_url: Some(PUBLIC_BASE.to_string()),
        bucket: "test-bucket".to_string(),
        token: token.map(str::to_string),
    }
}

#[tokio::test]
async fn test_push_uploads_and_records_each_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FakeStore::default();
    let base = spawn_store(store.clone()).await;
    let manifest_path = manifest_path_for(temp_dir.path());

    write_local(temp_dir.path(), &stats_key("alpha"), b"alpha");
    write_local(temp_dir.path(), &stats_key("beta"), b"beta");

    let manifest = load_manifest(&manifest_path)?;
    let targets = select_push_targets(diff(&manifest, temp_dir.path())?, false)?;
    assert_eq!(targets.len(), 2);

    let pusher = Pusher::new(temp_dir.path(), &remote_config(&base, None), &TransferConfig::default())?;
    let (manifest, report) = pusher.push(manifest, &manifest_path, targets).await;

    assert!(report.is_success());
    assert_eq!(report.summary().split(" in ").next(), Some("Uploaded 2/2 file(s)"));
    assert_eq!(
        store.object(&format!("test-bucket/{}", stats_key("alpha"))),
        Some(b"alpha".to_vec())
    );

    // Saved manifest matches the returned one
    let saved = load_manifest(&manifest_path)?;
    assert_eq!(saved, manifest);
    let entry = saved.get_file_entry(&stats_key("beta"))?;
    assert_eq!(entry.sha256, hash_bytes(b"beta"));
    assert_eq!(entry.url, format!("{PUBLIC_BASE}/test-bucket/{}", stats_key("beta")));

    let remaining = select_push_targets(diff(&saved, temp_dir.path())?, false)?;
    assert!(remaining.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_upload_is_not_recorded() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FakeStore::default();
    let base = spawn_store(store.clone()).await;
    let manifest_path = manifest_path_for(temp_dir.path());

    write_local(temp_dir.path(), &stats_key("alpha"), b"alpha");
    write_local(temp_dir.path(), &stats_key("beta"), b"beta");
    store.fail(&format!("test-bucket/{}", stats_key("beta")));

    let manifest = Manifest::default();
    let targets = select_push_targets(diff(&manifest, temp_dir.path())?, false)?;
    let pusher = Pusher::new(temp_dir.path(), &remote_config(&base, None), &TransferConfig::default())?;
    let (manifest, report) = pusher.push(manifest, &manifest_path, targets).await;

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].file, stats_key("beta"));
    assert!(report.failures[0].reason.contains("upload failed: HTTP 500"));
    assert_eq!(report.failure_lines().unwrap()[0], "1 upload(s) failed:");

    let saved = load_manifest(&manifest_path)?;
    assert_eq!(saved, manifest);
    assert!(saved.get_file_entry(&stats_key("alpha")).is_ok());
    assert!(saved.get_file_entry(&stats_key("beta")).is_err());
    Ok(())
}

#[tokio::test]
async fn test_push_sends_bearer_token() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FakeStore::default();
    let base = spawn_store(store.clone()).await;
    let manifest_path = manifest_path_for(temp_dir.path());

    write_local(temp_dir.path(), &stats_key("alpha"), b"alpha");

    let manifest = Manifest::default();
    let targets = select_push_targets(diff(&manifest, temp_dir.path())?, false)?;
    let pusher = Pusher::new(
        temp_dir.path(),
        &remote_config(&base, Some("s3cret")),
        &TransferConfig::default(),
    )?;
    let (_, report) = pusher.push(manifest, &manifest_path, targets).await;

    assert!(report.is_success());
    assert_eq!(store.authorizations(), vec![Some("Bearer s3cret".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_modified_files_are_reuploaded_with_force() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FakeStore::default();
    let base = spawn_store(store.clone()).await;
    let manifest_path = manifest_path_for(temp_dir.path());
    let key = stats_key("alpha");

    let mut manifest = Manifest::default();
    manifest.record(
        key.clone(),
        FileEntry {
            sha256: hash_bytes(b"old"),
            url: format!("{PUBLIC_BASE}/test-bucket/{key}"),
        },
    );
    save_manifest(&manifest, &manifest_path)?;
    write_local(temp_dir.path(), &key, b"new");

    assert!(select_push_targets(diff(&manifest, temp_dir.path())?, false)?.is_empty());

    let targets = select_push_targets(diff(&manifest, temp_dir.path())?, true)?;
    let pusher = Pusher::new(temp_dir.path(), &remote_config(&base, None), &TransferConfig::default())?;
    let (_, report) = pusher.push(manifest, &manifest_path, targets).await;

    assert!(report.is_success());
    assert_eq!(store.object(&format!("test-bucket/{key}")), Some(b"new".to_vec()));
    assert_eq!(load_manifest(&manifest_path)?.get_file_entry(&key)?.sha256, hash_bytes(b"new"));
    Ok(())
}
