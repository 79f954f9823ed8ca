//! `RetryingRpc` — wraps a [`BlockApiClient`] and retries every
//! transport-classified failure indefinitely, logging a one-line
//! diagnostic on every retry past the first.
//!
//! No local backoff is introduced: the Block API's own throttling response
//! cadence supplies pacing.

use std::sync::Arc;

use crate::chunk;
use crate::client::{Block, BlockApiClient, BlockPage};
use crate::diagnostics::{retry_line, DiagnosticSink};
use crate::error::RpcError;

/// Wraps any [`BlockApiClient`] implementation, retrying indefinitely on
/// retryable errors and classifying `AccessDenied` as fatal.
pub struct RetryingRpc {
    inner: Arc<dyn BlockApiClient>,
    sink: Arc<dyn DiagnosticSink>,
}

impl RetryingRpc {
    pub fn new(inner: Arc<dyn BlockApiClient>, sink: Arc<dyn DiagnosticSink>) -> Self {
        RetryingRpc { inner, sink }
    }

    fn block_ref(snapshot_id: &str, index: u32) -> String {
        format!("{snapshot_id}#{index}")
    }

    fn retry_until_success<T>(
        &self,
        block_ref: &str,
        operation: &str,
        mut attempt: impl FnMut() -> Result<T, RpcError>,
    ) -> Result<T, RpcError> {
        let mut retry: u32 = 0;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if retry > 0 {
                        self.sink.emit(&retry_line(block_ref, operation, e.kind_label(), retry));
                    }
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetches one block's data and the server-reported checksum, retrying
    /// indefinitely on transient/throttle failures.
    pub fn get_block(
        &self,
        snapshot_id: &str,
        index: u32,
        read_token: &str,
    ) -> Result<(Vec<u8>, String), RpcError> {
        let block_ref = Self::block_ref(snapshot_id, index);
        self.retry_until_success(&block_ref, "get_block", || {
            self.inner.get_block(snapshot_id, index, read_token)
        })
    }

    /// Writes one block, retrying indefinitely on transient/throttle
    /// failures. The checksum advertised is always `SHA256`.
    pub fn put_block(
        &self,
        snapshot_id: &str,
        index: u32,
        data: &[u8],
        checksum: &str,
    ) -> Result<(), RpcError> {
        let block_ref = Self::block_ref(snapshot_id, index);
        self.retry_until_success(&block_ref, "put_block", || {
            self.inner.put_block(snapshot_id, index, data, checksum)
        })
    }

    /// Fetches one block, retrying indefinitely — beyond the transport
    /// retries already performed by [`Self::get_block`] — whenever the
    /// locally recomputed checksum doesn't match the server-reported one.
    pub fn get_verified_block(
        &self,
        snapshot_id: &str,
        index: u32,
        read_token: &str,
    ) -> Result<Vec<u8>, RpcError> {
        let mut mismatches = 0u32;
        loop {
            let (data, checksum) = self.get_block(snapshot_id, index, read_token)?;
            if chunk::hash(&data) == checksum {
                return Ok(data);
            }
            if mismatches > 0 {
                self.sink.emit(&retry_line(
                    &Self::block_ref(snapshot_id, index),
                    "get_block",
                    "checksum-mismatch",
                    mismatches,
                ));
            }
            mismatches += 1;
        }
    }

    /// Fetches one page of a full-snapshot block listing, retrying
    /// indefinitely on transient/throttle failures. Pagination itself is
    /// [`crate::index::BlockIndexSource`]'s job, not this wrapper's.
    pub fn list_blocks(
        &self,
        snapshot_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockPage, RpcError> {
        self.retry_until_success(snapshot_id, "list_blocks", || {
            self.inner.list_blocks(snapshot_id, cursor)
        })
    }

    /// Fetches one page of a differential listing between two snapshots.
    pub fn list_changed_blocks(
        &self,
        snapshot_a: &str,
        snapshot_b: &str,
        cursor: Option<&str>,
    ) -> Result<BlockPage, RpcError> {
        self.retry_until_success(snapshot_a, "list_changed_blocks", || {
            self.inner.list_changed_blocks(snapshot_a, snapshot_b, cursor)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BlockApiClient;
    use crate::diagnostics::CapturingSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A mock client that fails a configurable number of times per block
    /// before succeeding, used to exercise the retry loop in isolation.
    struct FlakyClient {
        fail_times: usize,
        attempts: Mutex<std::collections::HashMap<u32, usize>>,
        calls: AtomicUsize,
    }

    impl BlockApiClient for FlakyClient {
        fn get_block(
            &self,
            _snapshot_id: &str,
            index: u32,
            _read_token: &str,
        ) -> Result<(Vec<u8>, String), RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(index).or_insert(0);
            if *n < self.fail_times {
                *n += 1;
                return Err(RpcError::AccountThrottle { quota_handle: "q1".into() });
            }
            Ok((vec![index as u8; 4], "checksum".into()))
        }

        fn put_block(
            &self,
            _snapshot_id: &str,
            _index: u32,
            _data: &[u8],
            _checksum: &str,
        ) -> Result<(), RpcError> {
            Ok(())
        }

        fn list_blocks(
            &self,
            _snapshot_id: &str,
            _cursor: Option<&str>,
        ) -> Result<BlockPage, RpcError> {
            Ok(BlockPage { blocks: vec![], next_cursor: None })
        }

        fn list_changed_blocks(
            &self,
            _snapshot_a: &str,
            _snapshot_b: &str,
            _cursor: Option<&str>,
        ) -> Result<BlockPage, RpcError> {
            Ok(BlockPage { blocks: vec![], next_cursor: None })
        }
    }

    #[test]
    fn get_block_retries_until_success() {
        let flaky = Arc::new(FlakyClient {
            fail_times: 2,
            attempts: Mutex::new(Default::default()),
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(CapturingSink::new());
        let rpc = RetryingRpc::new(flaky.clone(), sink.clone());
        let (data, checksum) = rpc.get_block("snap-1", 7, "tok").unwrap();
        assert_eq!(data, vec![7u8; 4]);
        assert_eq!(checksum, "checksum");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_diagnostic_is_silent_on_first_attempt() {
        let flaky = Arc::new(FlakyClient {
            fail_times: 2,
            attempts: Mutex::new(Default::default()),
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(CapturingSink::new());
        let rpc = RetryingRpc::new(flaky, sink.clone());
        rpc.get_block("snap-1", 1, "tok").unwrap();
        // First failure (retry==0) is silent; second failure (retry==1) logs
        // once before the third attempt succeeds.
        assert_eq!(sink.lines().len(), 1);
        assert!(sink.lines()[0].contains("retry=1"));
    }

    #[test]
    fn access_denied_is_not_retried() {
        struct DeniedClient;
        impl BlockApiClient for DeniedClient {
            fn get_block(
                &self,
                _snapshot_id: &str,
                _index: u32,
                _read_token: &str,
            ) -> Result<(Vec<u8>, String), RpcError> {
                Err(RpcError::AccessDenied { hint: "missing ebs:GetSnapshotBlock".into() })
            }
            fn put_block(
                &self,
                _: &str,
                _: u32,
                _: &[u8],
                _: &str,
            ) -> Result<(), RpcError> {
                unreachable!()
            }
            fn list_blocks(&self, _: &str, _: Option<&str>) -> Result<BlockPage, RpcError> {
                unreachable!()
            }
            fn list_changed_blocks(
                &self,
                _: &str,
                _: &str,
                _: Option<&str>,
            ) -> Result<BlockPage, RpcError> {
                unreachable!()
            }
        }

        let sink = Arc::new(CapturingSink::new());
        let rpc = RetryingRpc::new(Arc::new(DeniedClient), sink.clone());
        let err = rpc.get_block("snap-1", 0, "tok").unwrap_err();
        assert!(matches!(err, RpcError::AccessDenied { .. }));
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn list_blocks_retries_a_single_page() {
        struct OnceFlakyList {
            failed: AtomicUsize,
        }
        impl BlockApiClient for OnceFlakyList {
            fn get_block(&self, _: &str, _: u32, _: &str) -> Result<(Vec<u8>, String), RpcError> {
                unreachable!()
            }
            fn put_block(&self, _: &str, _: u32, _: &[u8], _: &str) -> Result<(), RpcError> {
                unreachable!()
            }
            fn list_blocks(&self, _: &str, _: Option<&str>) -> Result<BlockPage, RpcError> {
                if self.failed.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(RpcError::Transient { detail: "timeout".into() });
                }
                Ok(BlockPage {
                    blocks: vec![Block { index: 0, read_token: "t".into(), peer_read_token: None }],
                    next_cursor: None,
                })
            }
            fn list_changed_blocks(
                &self,
                _: &str,
                _: &str,
                _: Option<&str>,
            ) -> Result<BlockPage, RpcError> {
                unreachable!()
            }
        }

        let client = Arc::new(OnceFlakyList { failed: AtomicUsize::new(0) });
        let sink = Arc::new(CapturingSink::new());
        let rpc = RetryingRpc::new(client, sink);
        let page = rpc.list_blocks("snap-a", None).unwrap();
        assert_eq!(page.blocks.len(), 1);
    }
}
