// ABOUTME: Integration tests for credential resolution from key files on disk.
// ABOUTME: Uses the ed25519 fixture key copied into temporary directories.

use remotebox::ssh::{AuthResolver, Credential, Error};
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_key() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/test_key")
}

#[tokio::test]
async fn first_usable_candidate_wins() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing_key");
    let directory = dir.path().join("a_directory");
    fs::create_dir(&directory).unwrap();
    let valid = dir.path().join("valid_key");
    fs::copy(fixture_key(), &valid).unwrap();

    let resolver = AuthResolver::new(None, None);
    let credential = resolver
        .resolve(&[missing, directory, valid.clone()])
        .await
        .unwrap();

    match credential {
        Credential::Key { path, .. } => assert_eq!(path, valid),
        other => panic!("expected key credential, got {other:?}"),
    }
}

#[tokio::test]
async fn default_keys_under_home_are_the_last_resort() {
    let home = tempfile::tempdir().unwrap();
    let ssh_dir = home.path().join(".ssh");
    fs::create_dir(&ssh_dir).unwrap();
    fs::copy(fixture_key(), ssh_dir.join("id_rsa")).unwrap();

    let resolver = AuthResolver::new(Some(home.path().to_path_buf()), None);
    let credential = resolver
        .resolve(&[home.path().join("nope")])
        .await
        .unwrap();

    match credential {
        Credential::Key { path, .. } => assert_eq!(path, ssh_dir.join("id_rsa")),
        other => panic!("expected key credential, got {other:?}"),
    }
}

#[tokio::test]
async fn valid_key_after_garbage_still_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage");
    fs::write(&garbage, "-----BEGIN NONSENSE-----\n").unwrap();
    let valid = dir.path().join("valid_key");
    fs::copy(fixture_key(), &valid).unwrap();

    let resolver = AuthResolver::new(None, None);
    let credential = resolver.resolve(&[garbage, valid.clone()]).await.unwrap();
    assert!(matches!(credential, Credential::Key { path, .. } if path == valid));
}

#[tokio::test]
async fn only_garbage_is_fallbackable() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("garbage");
    fs::write(&garbage, "not a key").unwrap();

    let err = AuthResolver::new(None, None)
        .resolve(&[garbage])
        .await
        .unwrap_err();
    assert!(err.is_fallbackable());
    assert!(err.to_string().contains("garbage"), "{err}");
    assert!(!matches!(err, Error::AuthenticationExhausted));
}
