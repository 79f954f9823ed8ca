//! Command-line argument parsing.
//!
//! Eleven subcommands, one per `TransferEngine` operation, plus a handful of
//! global options threaded into every [`crate::config::Config`]. Built on
//! `clap`'s derive API.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "snapblock", version, about = "Parallel block-transfer client for a cloud snapshot service")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Calling account id, used for display and object-store ACL evaluation.
    #[arg(long, env = "SNAPBLOCK_ACCOUNT_ID")]
    pub account_id: String,

    /// Calling IAM user id.
    #[arg(long, env = "SNAPBLOCK_USER_ID")]
    pub user_id: String,

    /// Calling canonical user id (used for bucket-owner ACL grants).
    #[arg(long, env = "SNAPBLOCK_CANONICAL_USER_ID")]
    pub canonical_user_id: String,

    /// Region the source snapshot/device lives in.
    #[arg(long, env = "SNAPBLOCK_SOURCE_REGION")]
    pub source_region: String,

    /// Outer/inner shard degree. Defaults to 16 same-region, 27 cross-region.
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Increase diagnostic verbosity; repeatable, capped at -vvv.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all diagnostics below fatal errors (verbosity -1).
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Run preflight checks and print the planned operation without
    /// performing any RPC.
    #[arg(long)]
    pub dry_run: bool,

    /// Accepted for CLI compatibility with the original tool's dependency
    /// auto-install bypass flag. Recorded in `Config`, has no runtime effect.
    #[arg(long)]
    pub nodeps: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enumerate a snapshot's block metadata without transferring data.
    List { snapshot_id: String },

    /// Enumerate the blocks that differ between two snapshots.
    Diff { snapshot_a: String, snapshot_b: String },

    /// Read a snapshot to a local file or raw device.
    Download { snapshot_id: String, path: PathBuf },

    /// Apply the differential between two snapshots on top of a local copy
    /// of the first.
    DeltaDownload { snapshot_a: String, snapshot_b: String, path: PathBuf },

    /// Upload a local file or raw device as a new snapshot.
    Upload {
        path: PathBuf,
        #[arg(long)]
        parent_snapshot_id: Option<String>,
    },

    /// Copy a snapshot to a freshly started snapshot, optionally in another
    /// region.
    Copy {
        snapshot_id: String,
        #[arg(short = 'd', long)]
        dest_region: Option<String>,
    },

    /// Write the differential between two snapshots into a new destination
    /// snapshot parented in the destination region.
    Sync {
        snapshot_a: String,
        snapshot_b: String,
        dest_parent: String,
        #[arg(short = 'd', long)]
        dest_region: Option<String>,
        #[arg(short = 'f', long)]
        full_copy: bool,
    },

    /// Pack a snapshot's blocks into compressed segments and upload them to
    /// an object-store bucket.
    MoveToS3 {
        snapshot_id: String,
        bucket: String,
        #[arg(short = 'd', long)]
        dest_region: Option<String>,
        #[arg(short = 'e', long)]
        endpoint_url: Option<String>,
        #[arg(short = 'p', long)]
        profile: Option<String>,
        #[arg(short = 'f', long)]
        full_copy: bool,
    },

    /// Reconstruct a snapshot from object-store segments under a key prefix.
    GetFromS3 {
        prefix: String,
        bucket: String,
        #[arg(short = 'd', long)]
        dest_region: Option<String>,
        #[arg(short = 'e', long)]
        endpoint_url: Option<String>,
        #[arg(short = 'p', long)]
        profile: Option<String>,
        #[arg(short = 'f', long)]
        full_copy: bool,
    },

    /// Download a snapshot to every path named in `list_path` (one per
    /// line).
    MultiClone { snapshot_id: String, list_path: PathBuf },

    /// Upload a local device to every region named in `regions_path` (one
    /// per line), producing one destination snapshot per region.
    Fanout { device_path: PathBuf, regions_path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn base_globals() -> Vec<&'static str> {
        vec![
            "snapblock",
            "--account-id", "111122223333",
            "--user-id", "AIDAEXAMPLE",
            "--canonical-user-id", "canon-1",
            "--source-region", "us-east-1",
        ]
    }

    #[test]
    fn download_parses_positional_snapshot_and_path() {
        let mut args = base_globals();
        args.extend(["download", "snap-1", "/mnt/dest.img"]);
        let cli = parse(&args);
        match cli.command {
            Command::Download { snapshot_id, path } => {
                assert_eq!(snapshot_id, "snap-1");
                assert_eq!(path, PathBuf::from("/mnt/dest.img"));
            }
            other => panic!("expected Download, got {other:?}"),
        }
    }

    #[test]
    fn sync_parses_dest_region_and_full_copy_flags() {
        let mut args = base_globals();
        args.extend(["sync", "snap-a", "snap-b", "parent-1", "-d", "eu-west-1", "-f"]);
        let cli = parse(&args);
        match cli.command {
            Command::Sync { dest_region, full_copy, .. } => {
                assert_eq!(dest_region.as_deref(), Some("eu-west-1"));
                assert!(full_copy);
            }
            other => panic!("expected Sync, got {other:?}"),
        }
    }

    #[test]
    fn repeated_verbose_flag_counts_occurrences() {
        let mut args = base_globals();
        args.extend(["-vv", "list", "snap-1"]);
        let cli = parse(&args);
        assert_eq!(cli.global.verbose, 2);
    }

    #[test]
    fn missing_subcommand_is_a_parse_error() {
        let args = base_globals();
        assert!(Cli::try_parse_from(&args).is_err());
    }

    #[test]
    fn unknown_subcommand_is_a_parse_error() {
        let mut args = base_globals();
        args.push("frobnicate");
        assert!(Cli::try_parse_from(&args).is_err());
    }
}
