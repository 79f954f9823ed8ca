//! Client-facing data types and the three trait surfaces this crate talks
//! to: the Block API, the control plane (describe/start/complete snapshot),
//! and the object store.
//!
//! Constructing real implementations of these traits — discovering
//! credentials, building an SDK client pinned to a region — is explicitly
//! out of scope: callers hand this crate an already-built
//! `Arc<dyn BlockApiClient>` and friends. `mock` (under `e2e/support.rs` in
//! the test tree) provides in-memory implementations used by the test suite.

pub mod retry;

use std::fmt;

/// A single block's addressing metadata, as returned by a list/diff RPC.
///
/// `index` is in units of [`crate::chunk::CHUNK_SIZE`]. `peer_read_token` is
/// only ever populated for blocks produced by a differential listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u32,
    pub read_token: String,
    pub peer_read_token: Option<String>,
}

/// One page of a paginated list/diff RPC response.
#[derive(Debug, Clone)]
pub struct BlockPage {
    pub blocks: Vec<Block>,
    pub next_cursor: Option<String>,
}

/// Lifecycle state of a snapshot, as returned by `describe_snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Pending,
    Completed,
    Error,
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotState::Pending => "pending",
            SnapshotState::Completed => "completed",
            SnapshotState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A snapshot's identity and lifecycle metadata.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    pub id: String,
    pub volume_size_gib: u64,
    pub state: SnapshotState,
    pub progress_percent: u8,
}

impl SnapshotHandle {
    /// `true` when the snapshot can be read from.
    pub fn is_readable(&self) -> bool {
        self.state == SnapshotState::Completed && self.progress_percent == 100
    }
}

/// Required permission level for an object-store ACL check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclPermission {
    Read,
    Write,
    FullControl,
}

/// Bucket ACL summary for the calling identity, or `None` if the bucket
/// implementation does not expose ACL metadata (in which case preflight
/// skips the check silently).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketAcl {
    pub read: bool,
    pub write: bool,
    pub full_control: bool,
}

impl BucketAcl {
    pub fn grants(&self, required: AclPermission) -> bool {
        self.full_control
            || match required {
                AclPermission::Read => self.read,
                AclPermission::Write => self.write,
                AclPermission::FullControl => false,
            }
    }
}

/// One downloaded object-store object: its raw (still compressed) bytes.
#[derive(Debug, Clone)]
pub struct ObjectBytes(pub Vec<u8>);

/// Block-level RPC surface of the cloud snapshot service.
///
/// Every method here is expected to be wrapped in [`retry::RetryingRpc`]
/// before use by the engine; callers should not invoke these directly from
/// `executor`/`engine` code.
pub trait BlockApiClient: Send + Sync {
    fn get_block(
        &self,
        snapshot_id: &str,
        index: u32,
        read_token: &str,
    ) -> Result<(Vec<u8>, String), crate::error::RpcError>;

    fn put_block(
        &self,
        snapshot_id: &str,
        index: u32,
        data: &[u8],
        checksum: &str,
    ) -> Result<(), crate::error::RpcError>;

    fn list_blocks(
        &self,
        snapshot_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockPage, crate::error::RpcError>;

    fn list_changed_blocks(
        &self,
        snapshot_a: &str,
        snapshot_b: &str,
        cursor: Option<&str>,
    ) -> Result<BlockPage, crate::error::RpcError>;
}

/// Control-plane surface: snapshot lifecycle and region metadata.
pub trait ControlPlaneClient: Send + Sync {
    fn describe_snapshot(&self, snapshot_id: &str) -> Result<SnapshotHandle, crate::error::RpcError>;

    fn describe_regions(&self) -> Result<Vec<String>, crate::error::RpcError>;

    /// Starts a new, writable destination snapshot. Returns its id.
    fn start_snapshot(
        &self,
        region: &str,
        volume_size_gib: u64,
        parent_snapshot_id: Option<&str>,
    ) -> Result<String, crate::error::RpcError>;

    /// Finalizes a destination snapshot. `changed_blocks_count` must equal
    /// the number of non-elided successful puts.
    fn complete_snapshot(
        &self,
        snapshot_id: &str,
        changed_blocks_count: u64,
    ) -> Result<(), crate::error::RpcError>;
}

/// Object-store surface used by the archive (`movetos3`/`getfroms3`) path.
pub trait ObjectStoreClient: Send + Sync {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), crate::error::RpcError>;

    fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBytes, crate::error::RpcError>;

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, crate::error::RpcError>;

    /// Returns `None` when the implementation doesn't expose ACL metadata.
    fn bucket_acl(&self, bucket: &str) -> Option<BucketAcl>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_readable_only_when_completed_and_full_progress() {
        let h = SnapshotHandle {
            id: "snap-1".into(),
            volume_size_gib: 1,
            state: SnapshotState::Completed,
            progress_percent: 100,
        };
        assert!(h.is_readable());

        let mut pending = h.clone();
        pending.state = SnapshotState::Pending;
        assert!(!pending.is_readable());

        let mut partial = h;
        partial.progress_percent = 42;
        assert!(!partial.is_readable());
    }

    #[test]
    fn bucket_acl_full_control_grants_everything() {
        let acl = BucketAcl { read: false, write: false, full_control: true };
        assert!(acl.grants(AclPermission::Read));
        assert!(acl.grants(AclPermission::Write));
    }

    #[test]
    fn bucket_acl_checks_specific_permission() {
        let acl = BucketAcl { read: true, write: false, full_control: false };
        assert!(acl.grants(AclPermission::Read));
        assert!(!acl.grants(AclPermission::Write));
    }
}
