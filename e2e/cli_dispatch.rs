//! Exercises `cli::dispatch::run`'s exit-code contract end to end, through
//! a parsed [`Cli`] and a test [`ClientProvider`], without a real binary.

#[path = "support.rs"]
mod support;

use std::sync::Arc;

use clap::Parser;
use snapblock::chunk::CHUNK_SIZE;
use snapblock::cli::args::Cli;
use snapblock::cli::dispatch::{self, ClientBundle, ClientProvider, RegionalClients};
use snapblock::client::{BlockApiClient, ControlPlaneClient, SnapshotHandle};
use snapblock::config::Config;
use snapblock::error::RpcError;

use support::MockCloud;

struct OkProvider(Arc<MockCloud>);

impl ClientProvider for OkProvider {
    fn build(&self, _config: &Config) -> anyhow::Result<ClientBundle> {
        let block_api: Arc<dyn BlockApiClient> = self.0.clone();
        let control: Arc<dyn ControlPlaneClient> = self.0.clone();
        Ok(ClientBundle { block_api, control, object_store: None })
    }

    fn build_regional(&self, _config: &Config, _regions: &[String]) -> anyhow::Result<Vec<RegionalClients>> {
        unreachable!("not exercised by these tests")
    }
}

/// A control-plane client whose `describe_snapshot` always reports the
/// caller lacks permission, to drive the access-denied exit path.
struct DeniedControl;

impl ControlPlaneClient for DeniedControl {
    fn describe_snapshot(&self, _snapshot_id: &str) -> Result<SnapshotHandle, RpcError> {
        Err(RpcError::AccessDenied { hint: "missing blockapi:DescribeSnapshot".into() })
    }
    fn describe_regions(&self) -> Result<Vec<String>, RpcError> {
        unreachable!()
    }
    fn start_snapshot(&self, _: &str, _: u64, _: Option<&str>) -> Result<String, RpcError> {
        unreachable!()
    }
    fn complete_snapshot(&self, _: &str, _: u64) -> Result<(), RpcError> {
        unreachable!()
    }
}

struct DeniedProvider(Arc<MockCloud>);

impl ClientProvider for DeniedProvider {
    fn build(&self, _config: &Config) -> anyhow::Result<ClientBundle> {
        let block_api: Arc<dyn BlockApiClient> = self.0.clone();
        Ok(ClientBundle { block_api, control: Arc::new(DeniedControl), object_store: None })
    }

    fn build_regional(&self, _config: &Config, _regions: &[String]) -> anyhow::Result<Vec<RegionalClients>> {
        unreachable!("not exercised by these tests")
    }
}

fn base_args() -> Vec<&'static str> {
    vec![
        "snapblock",
        "--account-id", "111122223333",
        "--user-id", "AIDAEXAMPLE",
        "--canonical-user-id", "canon-1",
        "--source-region", "us-east-1",
    ]
}

#[test]
fn list_on_a_readable_snapshot_exits_success() {
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_snapshot("snap-1", 1, vec![(0, vec![1u8; CHUNK_SIZE])]);

    let mut args = base_args();
    args.extend(["list", "snap-1"]);
    let cli = Cli::try_parse_from(&args).unwrap();

    let code = dispatch::run(cli, &OkProvider(cloud));
    assert_eq!(code, dispatch::EXIT_SUCCESS);
}

#[test]
fn download_on_a_not_ready_snapshot_exits_invalid() {
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_pending_snapshot("snap-pending", 1, 40);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dest.img");

    let mut args = base_args();
    let dest_str = dest.to_str().unwrap().to_owned();
    args.extend(["download", "snap-pending", &dest_str]);
    let cli = Cli::try_parse_from(&args).unwrap();

    let code = dispatch::run(cli, &OkProvider(cloud));
    assert_eq!(code, dispatch::EXIT_INVALID);
}

#[test]
fn access_denied_exits_permission_denied() {
    let cloud = Arc::new(MockCloud::new());

    let mut args = base_args();
    args.extend(["list", "snap-1"]);
    let cli = Cli::try_parse_from(&args).unwrap();

    let code = dispatch::run(cli, &DeniedProvider(cloud));
    assert_eq!(code, dispatch::EXIT_PERMISSION_DENIED);
}

#[test]
fn dry_run_list_performs_preflight_only_and_exits_success() {
    let cloud = Arc::new(MockCloud::new());
    cloud.seed_snapshot("snap-1", 1, vec![(0, vec![1u8; CHUNK_SIZE])]);

    let mut args = base_args();
    args.extend(["--dry-run", "list", "snap-1"]);
    let cli = Cli::try_parse_from(&args).unwrap();

    let code = dispatch::run(cli, &OkProvider(Arc::clone(&cloud)));
    assert_eq!(code, dispatch::EXIT_SUCCESS);
    // dry-run never writes blocks.
    assert_eq!(cloud.blocks_written("snap-1"), 1);
}

#[test]
fn unknown_subcommand_is_rejected_by_parsing() {
    let mut args = base_args();
    args.push("frobnicate");
    let err = Cli::try_parse_from(&args).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
}
