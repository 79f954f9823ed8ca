//! The validated, immutable configuration record threaded through every
//! operation and every shard worker.
//!
//! There is no process-wide mutable configuration state anywhere in this
//! crate: the `cli` layer builds exactly one `Config` from parsed arguments
//! and callers pass `&Config` down into `engine`, `executor`, and
//! `preflight`.

use std::num::NonZeroUsize;

/// Default shard/worker count when source and destination regions match.
pub const JOBS_DEFAULT_SAME_REGION: usize = 16;

/// Default shard/worker count when source and destination regions differ.
pub const JOBS_DEFAULT_CROSS_REGION: usize = 27;

/// Fixed outer shard count for the object-store segment-upload path.
///
/// Chosen to exploit the 64-block aggregation granularity of `SegmentCodec`:
/// enough outer shards that segment uploads, not per-block RPCs, become the
/// concurrency unit.
pub const SEGMENT_UPLOAD_JOBS: usize = 128;

/// Immutable, validated configuration shared by every operation.
#[derive(Debug, Clone)]
pub struct Config {
    pub account_id: String,
    pub user_id: String,
    pub canonical_user_id: String,
    pub source_region: String,
    pub dest_region: String,
    pub jobs: NonZeroUsize,
    pub full_copy: bool,
    pub bucket: Option<String>,
    pub object_store_endpoint_url: Option<String>,
    pub object_store_profile: Option<String>,
    pub verbosity: i32,
    pub dry_run: bool,
    pub nodeps: bool,
}

impl Config {
    /// Returns the shard/worker count to use for a same-region operation
    /// when the caller hasn't overridden `jobs` explicitly.
    pub fn default_jobs_same_region() -> NonZeroUsize {
        NonZeroUsize::new(JOBS_DEFAULT_SAME_REGION).expect("nonzero constant")
    }

    /// Returns the shard/worker count to use for a cross-region operation
    /// when the caller hasn't overridden `jobs` explicitly.
    pub fn default_jobs_cross_region() -> NonZeroUsize {
        NonZeroUsize::new(JOBS_DEFAULT_CROSS_REGION).expect("nonzero constant")
    }

    /// `true` when `source_region` and `dest_region` name the same region.
    pub fn same_region(&self) -> bool {
        self.source_region == self.dest_region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            account_id: "111122223333".into(),
            user_id: "AIDAEXAMPLE".into(),
            canonical_user_id: "canonical-example".into(),
            source_region: "us-east-1".into(),
            dest_region: "us-east-1".into(),
            jobs: Config::default_jobs_same_region(),
            full_copy: false,
            bucket: None,
            object_store_endpoint_url: None,
            object_store_profile: None,
            verbosity: 1,
            dry_run: false,
            nodeps: false,
        }
    }

    #[test]
    fn same_region_true_when_regions_match() {
        assert!(base_config().same_region());
    }

    #[test]
    fn same_region_false_when_regions_differ() {
        let mut cfg = base_config();
        cfg.dest_region = "eu-west-1".into();
        assert!(!cfg.same_region());
    }

    #[test]
    fn default_job_counts_are_16_same_region_27_cross_region() {
        assert_eq!(Config::default_jobs_same_region().get(), 16);
        assert_eq!(Config::default_jobs_cross_region().get(), 27);
    }
}
