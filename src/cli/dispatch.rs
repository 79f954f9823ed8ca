//! Maps a parsed [`Cli`] into a [`Config`] and a `TransferEngine` call,
//! handling dry-run and the process exit-code contract.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::cli::args::{Cli, Command, GlobalArgs};
use crate::client::retry::RetryingRpc;
use crate::client::{AclPermission, BlockApiClient, ControlPlaneClient, ObjectStoreClient};
use crate::config::Config;
use crate::diagnostics::{DiagnosticSink, StderrSink};
use crate::engine::{self, FanoutDestination, OperationReport};
use crate::error::{EngineError, RpcError};
use crate::index::BlockIndexSource;
use crate::preflight;

/// Success.
pub const EXIT_SUCCESS: i32 = 0;
/// Invalid parameters, or a preflight failure that isn't a permission denial.
pub const EXIT_INVALID: i32 = 1;
/// A permission check (bucket ACL, access-denied RPC) failed.
pub const EXIT_PERMISSION_DENIED: i32 = 77;
/// No subcommand matched.
pub const EXIT_UNKNOWN_COMMAND: i32 = 127;

/// Already-constructed client handles the engine needs beyond [`Config`].
///
/// Building these — discovering credentials, pinning an SDK client to a
/// region — is out of scope for this crate: see [`ClientProvider`].
pub struct ClientBundle {
    pub block_api: Arc<dyn BlockApiClient>,
    pub control: Arc<dyn ControlPlaneClient>,
    pub object_store: Option<Arc<dyn ObjectStoreClient>>,
}

/// One region's client bundle, for operations that talk to more than one
/// region at once (`fanout`).
pub struct RegionalClients {
    pub region: String,
    pub block_api: Arc<dyn BlockApiClient>,
    pub control: Arc<dyn ControlPlaneClient>,
}

/// Supplies client handles for a validated [`Config`].
///
/// The default binary entry point has no real implementation: discovering
/// credentials and constructing an SDK client pinned to a region is
/// explicitly out of scope for this crate (see the top-level crate
/// documentation). Callers embedding this crate as a library provide their
/// own `ClientProvider`.
pub trait ClientProvider {
    fn build(&self, config: &Config) -> anyhow::Result<ClientBundle>;

    /// Builds one bundle per region named in `regions`, for `fanout`.
    fn build_regional(&self, config: &Config, regions: &[String]) -> anyhow::Result<Vec<RegionalClients>>;
}

/// Runs the parsed command to completion, printing the operation's final
/// report line to stdout and any retry diagnostics to stderr, and returns
/// the process exit code.
pub fn run(cli: Cli, provider: &dyn ClientProvider) -> i32 {
    match run_inner(cli, provider) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("snapblock: {e:#}");
            exit_code_for(&e)
        }
    }
}

/// Every `PreflightFailure` is exit 1, including an absent bucket
/// permission (spec.md §7 is explicit about this) — only a non-retryable
/// `AccessDenied` surfaced from an actual RPC call earns exit 77. Dry-run
/// paths propagate a bare `RpcError`/`PreflightError` (no enclosing
/// `EngineError`), so both shapes are checked.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    let access_denied = matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::Rpc(RpcError::AccessDenied { .. }))
    ) || matches!(err.downcast_ref::<RpcError>(), Some(RpcError::AccessDenied { .. }));

    if access_denied {
        EXIT_PERMISSION_DENIED
    } else {
        EXIT_INVALID
    }
}

fn run_inner(cli: Cli, provider: &dyn ClientProvider) -> anyhow::Result<i32> {
    let (config, extra) = build_config(&cli.global, &cli.command)?;
    let sink: Arc<dyn DiagnosticSink> = Arc::new(StderrSink::new(config.verbosity));

    if config.dry_run {
        let report = dry_run_report(&cli.command, &config, provider, &extra)?;
        print_report(&report);
        return Ok(EXIT_SUCCESS);
    }

    let report = match &cli.command {
        Command::Fanout { device_path, regions_path } => {
            let regions = read_lines(regions_path)?;
            let clients = provider.build_regional(&config, &regions)?;
            let destinations = clients
                .into_iter()
                .map(|c| FanoutDestination {
                    region: c.region,
                    control: c.control,
                    rpc: Arc::new(RetryingRpc::new(c.block_api, Arc::clone(&sink))),
                })
                .collect();
            engine::fanout(&config, device_path, destinations)?
        }
        other => {
            let bundle = provider.build(&config)?;
            let rpc = Arc::new(RetryingRpc::new(Arc::clone(&bundle.block_api), Arc::clone(&sink)));
            let control = bundle.control.as_ref();
            let index = BlockIndexSource::new(Arc::clone(&rpc));
            run_operation(other, &config, rpc, control, bundle.object_store.as_ref(), &index, Arc::clone(&sink))?
        }
    };

    print_report(&report);
    Ok(EXIT_SUCCESS)
}

fn run_operation(
    command: &Command,
    config: &Config,
    rpc: Arc<RetryingRpc>,
    control: &dyn ControlPlaneClient,
    object_store: Option<&Arc<dyn ObjectStoreClient>>,
    index: &BlockIndexSource,
    sink: Arc<dyn DiagnosticSink>,
) -> anyhow::Result<OperationReport> {
    let report = match command {
        Command::List { snapshot_id } => engine::list(index, control, snapshot_id)?,
        Command::Diff { snapshot_a, snapshot_b } => engine::diff(index, control, snapshot_a, snapshot_b)?,
        Command::Download { snapshot_id, path } => {
            engine::download(config, rpc, control, index, snapshot_id, path)?
        }
        Command::DeltaDownload { snapshot_a, snapshot_b, path } => {
            engine::deltadownload(config, rpc, control, index, snapshot_a, snapshot_b, path)?
        }
        Command::Upload { path, parent_snapshot_id } => {
            engine::upload(config, rpc, control, path, parent_snapshot_id.as_deref())?
        }
        Command::Copy { snapshot_id, .. } => engine::copy(config, rpc, control, index, snapshot_id)?,
        Command::Sync { snapshot_a, snapshot_b, dest_parent, .. } => {
            engine::sync(config, rpc, control, index, snapshot_a, snapshot_b, dest_parent)?
        }
        Command::MoveToS3 { snapshot_id, bucket, .. } => {
            let store = object_store.context("movetos3 requires an object-store client")?;
            engine::move_to_s3(rpc, control, Arc::clone(store), index, snapshot_id, bucket)?
        }
        Command::GetFromS3 { prefix, bucket, .. } => {
            let store = object_store.context("getfroms3 requires an object-store client")?;
            engine::get_from_s3(config, rpc, control, Arc::clone(store), sink, bucket, prefix)?
        }
        Command::MultiClone { snapshot_id, list_path } => {
            let paths = read_lines(list_path)?.into_iter().map(PathBuf::from).collect::<Vec<_>>();
            engine::multiclone(config, rpc, control, index, snapshot_id, &paths)?
        }
        Command::Fanout { .. } => unreachable!("fanout is dispatched in run_inner"),
    };
    Ok(report)
}

/// Runs preflight only and returns a synthetic report without calling the
/// engine or performing any RPC beyond the `describe_snapshot`/`describe_regions`
/// calls preflight itself needs.
fn dry_run_report(
    command: &Command,
    config: &Config,
    provider: &dyn ClientProvider,
    extra: &Extra,
) -> anyhow::Result<OperationReport> {
    match command {
        Command::Fanout { device_path, regions_path } => {
            preflight::check_source_readable(device_path)?;
            let regions = read_lines(regions_path)?;
            let _ = regions;
            Ok(OperationReport::Completed { id: format!("dry-run: {}", device_path.display()), blocks_written: 0 })
        }
        _ => {
            let bundle = provider.build(config)?;
            match command {
                Command::List { snapshot_id } | Command::Download { snapshot_id, .. } => {
                    let handle = bundle.control.describe_snapshot(snapshot_id)?;
                    preflight::check_snapshot_readable(&handle)?;
                }
                Command::Diff { snapshot_a, snapshot_b } => {
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_a)?)?;
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_b)?)?;
                }
                Command::DeltaDownload { snapshot_a, snapshot_b, path } => {
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_a)?)?;
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_b)?)?;
                    preflight::check_sink_writable(path)?;
                }
                Command::Upload { path, .. } => preflight::check_source_readable(path)?,
                Command::Copy { snapshot_id, .. } => {
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_id)?)?;
                }
                Command::Sync { snapshot_a, snapshot_b, .. } => {
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_a)?)?;
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_b)?)?;
                }
                Command::MoveToS3 { snapshot_id, .. } => {
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_id)?)?;
                    if let Some(store) = &bundle.object_store {
                        preflight::check_bucket_acl(store.as_ref(), &extra.bucket.clone().unwrap_or_default(), AclPermission::Write)?;
                    }
                }
                Command::GetFromS3 { .. } => {
                    if let Some(store) = &bundle.object_store {
                        preflight::check_bucket_acl(store.as_ref(), &extra.bucket.clone().unwrap_or_default(), AclPermission::Read)?;
                    }
                }
                Command::MultiClone { snapshot_id, list_path } => {
                    preflight::check_snapshot_readable(&bundle.control.describe_snapshot(snapshot_id)?)?;
                    for line in read_lines(list_path)? {
                        preflight::check_sink_writable(Path::new(&line))?;
                    }
                }
                Command::Fanout { .. } => unreachable!(),
            }
            Ok(OperationReport::Completed { id: "dry-run: preflight passed".to_owned(), blocks_written: 0 })
        }
    }
}

fn print_report(report: &OperationReport) {
    match report {
        OperationReport::Metadata { block_count, byte_count } => {
            println!("{block_count} {byte_count}");
        }
        OperationReport::Completed { id, .. } => {
            println!("{id}");
        }
        OperationReport::Fanout { snapshot_ids } => {
            println!("{}", serde_json::to_string(snapshot_ids).expect("BTreeMap<String,String> always serializes"));
        }
    }
}

/// Fields that don't belong on [`Config`] itself but are still needed to
/// build it or to run preflight for a specific subcommand.
struct Extra {
    bucket: Option<String>,
}

/// Maps `--quiet`/`--verbose` to spec.md §6's `verbosity ∈ {-1..3}` range:
/// `-q` is -1, otherwise the repeated `-v` count capped at 3.
fn verbosity_for(global: &GlobalArgs) -> i32 {
    if global.quiet {
        -1
    } else {
        global.verbose.min(3) as i32
    }
}

fn build_config(global: &GlobalArgs, command: &Command) -> anyhow::Result<(Config, Extra)> {
    let (dest_region, full_copy, bucket, endpoint_url, profile) = match command {
        Command::Copy { dest_region, .. } => (dest_region.clone(), false, None, None, None),
        Command::Sync { dest_region, full_copy, .. } => (dest_region.clone(), *full_copy, None, None, None),
        Command::MoveToS3 { dest_region, endpoint_url, profile, full_copy, bucket, .. } => {
            (dest_region.clone(), *full_copy, Some(bucket.clone()), endpoint_url.clone(), profile.clone())
        }
        Command::GetFromS3 { dest_region, endpoint_url, profile, full_copy, bucket, .. } => {
            (dest_region.clone(), *full_copy, Some(bucket.clone()), endpoint_url.clone(), profile.clone())
        }
        _ => (None, false, None, None, None),
    };

    let dest_region = dest_region.unwrap_or_else(|| global.source_region.clone());
    let same_region = dest_region == global.source_region;
    let jobs = match global.jobs {
        Some(j) => NonZeroUsize::new(j).context("--jobs must be nonzero")?,
        None if same_region => Config::default_jobs_same_region(),
        None => Config::default_jobs_cross_region(),
    };

    let config = Config {
        account_id: global.account_id.clone(),
        user_id: global.user_id.clone(),
        canonical_user_id: global.canonical_user_id.clone(),
        source_region: global.source_region.clone(),
        dest_region,
        jobs,
        full_copy,
        bucket: bucket.clone(),
        object_store_endpoint_url: endpoint_url,
        object_store_profile: profile,
        verbosity: verbosity_for(global),
        dry_run: global.dry_run,
        nodeps: global.nodeps,
    };
    Ok((config, Extra { bucket }))
}

fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(content.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::Cli;
    use clap::Parser;

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "snapblock",
            "--account-id", "111122223333",
            "--user-id", "AIDAEXAMPLE",
            "--canonical-user-id", "canon-1",
            "--source-region", "us-east-1",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn same_region_copy_uses_default_same_region_jobs() {
        let cli = parse(&["copy", "snap-1"]);
        let (config, _) = build_config(&cli.global, &cli.command).unwrap();
        assert_eq!(config.dest_region, "us-east-1");
        assert_eq!(config.jobs.get(), 16);
    }

    #[test]
    fn cross_region_copy_uses_default_cross_region_jobs() {
        let cli = parse(&["copy", "snap-1", "-d", "eu-west-1"]);
        let (config, _) = build_config(&cli.global, &cli.command).unwrap();
        assert_eq!(config.dest_region, "eu-west-1");
        assert_eq!(config.jobs.get(), 27);
    }

    #[test]
    fn explicit_jobs_override_wins_over_default() {
        let cli = parse(&["--jobs", "4", "copy", "snap-1", "-d", "eu-west-1"]);
        let (config, _) = build_config(&cli.global, &cli.command).unwrap();
        assert_eq!(config.jobs.get(), 4);
    }

    #[test]
    fn movetos3_carries_bucket_into_config() {
        let cli = parse(&["movetos3", "snap-1", "my-bucket"]);
        let (config, extra) = build_config(&cli.global, &cli.command).unwrap();
        assert_eq!(config.bucket.as_deref(), Some("my-bucket"));
        assert_eq!(extra.bucket.as_deref(), Some("my-bucket"));
    }
}
