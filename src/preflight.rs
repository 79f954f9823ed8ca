//! Preflight checks run before any shard is dispatched.
//!
//! Validates openability of a source/destination path before committing to
//! a transfer, generalized here to also cover snapshot completeness and object-store
//! ACL grants.

use std::fs::OpenOptions;
use std::path::Path;

use crate::client::{AclPermission, ObjectStoreClient, SnapshotHandle};
use crate::error::PreflightError;

/// Requires `state == completed && progress == 100` for a source snapshot.
pub fn check_snapshot_readable(handle: &SnapshotHandle) -> Result<(), PreflightError> {
    if handle.is_readable() {
        Ok(())
    } else {
        Err(PreflightError::SnapshotNotReady {
            snapshot_id: handle.id.clone(),
            state: handle.state.to_string(),
            progress_percent: handle.progress_percent,
        })
    }
}

/// Validates that `path` can be opened for writing and seeking.
///
/// On platforms where creating a new raw device node isn't permitted, a
/// write-only open without `O_CREAT` is attempted instead — a device must
/// already exist as a node, unlike a regular file destination.
pub fn check_sink_writable(path: &Path) -> Result<(), PreflightError> {
    let is_existing_non_regular = path
        .metadata()
        .map(|m| !m.is_file())
        .unwrap_or(false);

    let opened = if is_existing_non_regular {
        OpenOptions::new().write(true).open(path)
    } else {
        OpenOptions::new().write(true).create(true).open(path)
    };

    opened
        .map(|_| ())
        .map_err(|e| PreflightError::SinkNotWritable { path: path.display().to_string(), detail: e.to_string() })
}

/// Validates that `path` can be opened for reading and seeking.
pub fn check_source_readable(path: &Path) -> Result<(), PreflightError> {
    OpenOptions::new()
        .read(true)
        .open(path)
        .map(|_| ())
        .map_err(|e| PreflightError::SourceNotReadable { path: path.display().to_string(), detail: e.to_string() })
}

/// Validates that the calling identity has `required` permission on
/// `bucket`. Skips silently (returns `Ok`) if the object-store
/// implementation does not expose ACL metadata.
pub fn check_bucket_acl(
    store: &dyn ObjectStoreClient,
    bucket: &str,
    required: AclPermission,
) -> Result<(), PreflightError> {
    let Some(acl) = store.bucket_acl(bucket) else {
        return Ok(());
    };
    if acl.grants(required) {
        Ok(())
    } else {
        let required_label = match required {
            AclPermission::Read => "READ",
            AclPermission::Write => "WRITE",
            AclPermission::FullControl => "FULL_CONTROL",
        };
        Err(PreflightError::BucketPermissionDenied { bucket: bucket.to_owned(), required: required_label })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BucketAcl, ObjectBytes, SnapshotState};
    use crate::error::RpcError;
    use tempfile::tempdir;

    fn handle(state: SnapshotState, progress: u8) -> SnapshotHandle {
        SnapshotHandle { id: "snap-1".into(), volume_size_gib: 1, state, progress_percent: progress }
    }

    #[test]
    fn snapshot_readable_passes_only_when_complete_and_full_progress() {
        assert!(check_snapshot_readable(&handle(SnapshotState::Completed, 100)).is_ok());
        assert!(check_snapshot_readable(&handle(SnapshotState::Completed, 99)).is_err());
        assert!(check_snapshot_readable(&handle(SnapshotState::Pending, 100)).is_err());
    }

    #[test]
    fn sink_writable_creates_missing_regular_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dest.img");
        assert!(check_sink_writable(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn source_readable_fails_for_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.img");
        assert!(check_source_readable(&path).is_err());
    }

    struct StubStore {
        acl: Option<BucketAcl>,
    }

    impl ObjectStoreClient for StubStore {
        fn put_object(&self, _: &str, _: &str, _: &[u8]) -> Result<(), RpcError> {
            unreachable!()
        }
        fn get_object(&self, _: &str, _: &str) -> Result<ObjectBytes, RpcError> {
            unreachable!()
        }
        fn list_objects(&self, _: &str, _: &str) -> Result<Vec<String>, RpcError> {
            unreachable!()
        }
        fn bucket_acl(&self, _: &str) -> Option<BucketAcl> {
            self.acl
        }
    }

    #[test]
    fn bucket_acl_check_skips_silently_when_unsupported() {
        let store = StubStore { acl: None };
        assert!(check_bucket_acl(&store, "bucket", AclPermission::Write).is_ok());
    }

    #[test]
    fn bucket_acl_check_rejects_insufficient_grant() {
        let store = StubStore { acl: Some(BucketAcl { read: true, write: false, full_control: false }) };
        assert!(check_bucket_acl(&store, "bucket", AclPermission::Write).is_err());
        assert!(check_bucket_acl(&store, "bucket", AclPermission::Read).is_ok());
    }
}
