//! Error taxonomy for the Block API, the object store, and the transfer
//! engine.
//!
//! Hand-written enums with manual `Display` impls rather than a derive-macro
//! error crate: each variant here carries exactly the data a caller needs to
//! classify and react, nothing more.
//! `anyhow` is reserved for the `cli` boundary, where the only thing that
//! matters is "attach context and pick an exit code".

use std::fmt;

/// Errors surfaced by a single Block API / object-store / control-plane call,
/// before any retry classification is applied.
#[derive(Debug, Clone)]
pub enum RpcError {
    /// A transport-level failure with no more specific classification
    /// (connection reset, timeout, 5xx, malformed response, ...).
    Transient { detail: String },
    /// Account-level request throttling. Carries the quota handle the
    /// service reported, so the diagnostic can name which quota was hit.
    AccountThrottle { quota_handle: String },
    /// Snapshot-level request throttling (distinct quota pool from account
    /// throttling, e.g. per-snapshot concurrent-read limits).
    SnapshotThrottle { quota_handle: String },
    /// The caller lacks a required permission. Never retried.
    AccessDenied { hint: String },
    /// `start_snapshot` rejected the request (bad parent id, bad volume
    /// size, ...). Never retried; the caller must fix its inputs.
    Validation { detail: String },
}

impl RpcError {
    /// `true` for errors the retry wrapper should retry indefinitely.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Transient { .. }
                | RpcError::AccountThrottle { .. }
                | RpcError::SnapshotThrottle { .. }
        )
    }

    /// Short, lowercase, log-friendly label used in diagnostic lines
    /// (`<block-ref> <operation> <error-kind> retry=<n>`).
    pub fn kind_label(&self) -> &'static str {
        match self {
            RpcError::Transient { .. } => "transient",
            RpcError::AccountThrottle { .. } => "account-throttle",
            RpcError::SnapshotThrottle { .. } => "snapshot-throttle",
            RpcError::AccessDenied { .. } => "access-denied",
            RpcError::Validation { .. } => "validation",
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Transient { detail } => write!(f, "transient error: {detail}"),
            RpcError::AccountThrottle { quota_handle } => {
                write!(f, "account throttled (quota={quota_handle})")
            }
            RpcError::SnapshotThrottle { quota_handle } => {
                write!(f, "snapshot throttled (quota={quota_handle})")
            }
            RpcError::AccessDenied { hint } => write!(f, "access denied: {hint}"),
            RpcError::Validation { detail } => write!(f, "validation error: {detail}"),
        }
    }
}

impl std::error::Error for RpcError {}

/// Errors surfaced by `chunk::compress`/`chunk::decompress`.
#[derive(Debug, Clone)]
pub enum ChunkError {
    /// Decompression failed: the zstd frame is malformed or truncated.
    CorruptSegment { detail: String },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::CorruptSegment { detail } => write!(f, "corrupt segment: {detail}"),
        }
    }
}

impl std::error::Error for ChunkError {}

/// Fatal conditions detected before any transfer begins.
#[derive(Debug, Clone)]
pub enum PreflightError {
    SnapshotNotReady { snapshot_id: String, state: String, progress_percent: u8 },
    SinkNotWritable { path: String, detail: String },
    SourceNotReadable { path: String, detail: String },
    BucketPermissionDenied { bucket: String, required: &'static str },
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreflightError::SnapshotNotReady { snapshot_id, state, progress_percent } => write!(
                f,
                "snapshot {snapshot_id} is not ready for transfer (state={state}, progress={progress_percent}%)"
            ),
            PreflightError::SinkNotWritable { path, detail } => {
                write!(f, "{path}: not writable/seekable: {detail}")
            }
            PreflightError::SourceNotReadable { path, detail } => {
                write!(f, "{path}: not readable/seekable: {detail}")
            }
            PreflightError::BucketPermissionDenied { bucket, required } => write!(
                f,
                "bucket {bucket}: caller lacks required {required} permission"
            ),
        }
    }
}

impl std::error::Error for PreflightError {}

/// Errors surfaced by a `TransferEngine` operation as a whole.
#[derive(Debug, Clone)]
pub enum EngineError {
    Preflight(PreflightError),
    /// A non-retryable RPC error cancelled the operation.
    Rpc(RpcError),
    /// Local file/device I/O failed in a way that cannot be retried
    /// (permission error mid-transfer, disk full, device removed, ...).
    LocalIo { detail: String },
    /// One or more object-store segments failed hash verification on read.
    /// The operation still completes; this reports the ranges
    /// that were skipped.
    CorruptSegments { first_indices: Vec<u32> },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Preflight(e) => write!(f, "preflight failed: {e}"),
            EngineError::Rpc(e) => write!(f, "{e}"),
            EngineError::LocalIo { detail } => write!(f, "local I/O error: {detail}"),
            EngineError::CorruptSegments { first_indices } => write!(
                f,
                "{} segment(s) failed verification, first indices: {:?}",
                first_indices.len(),
                first_indices
            ),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<PreflightError> for EngineError {
    fn from(e: PreflightError) -> Self {
        EngineError::Preflight(e)
    }
}

impl From<RpcError> for EngineError {
    fn from(e: RpcError) -> Self {
        EngineError::Rpc(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_throttle_errors_are_retryable() {
        assert!(RpcError::Transient { detail: "x".into() }.is_retryable());
        assert!(RpcError::AccountThrottle { quota_handle: "q".into() }.is_retryable());
        assert!(RpcError::SnapshotThrottle { quota_handle: "q".into() }.is_retryable());
    }

    #[test]
    fn access_denied_and_validation_are_not_retryable() {
        assert!(!RpcError::AccessDenied { hint: "x".into() }.is_retryable());
        assert!(!RpcError::Validation { detail: "x".into() }.is_retryable());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(RpcError::Transient { detail: "x".into() }.kind_label(), "transient");
        assert_eq!(
            RpcError::AccountThrottle { quota_handle: "q".into() }.kind_label(),
            "account-throttle"
        );
    }
}
