//! Binary entry point for `snapblock`.
//!
//! Parses arguments, maps a parse failure to the right exit code (clap's own
//! `parse()` always exits 2, which doesn't match the contract below), then
//! hands the parsed command to [`dispatch::run`].
//!
//! Exit codes: `0` success, `1` invalid parameters or a non-permission
//! preflight failure, `77` permission denied, `127` unknown subcommand.

use clap::error::ErrorKind;
use clap::Parser;

use snapblock::cli::args::Cli;
use snapblock::cli::clients::UnimplementedClientProvider;
use snapblock::cli::dispatch;

fn main() {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            ErrorKind::InvalidSubcommand | ErrorKind::MissingSubcommand => {
                eprint!("{e}");
                std::process::exit(dispatch::EXIT_UNKNOWN_COMMAND);
            }
            _ => {
                eprint!("{e}");
                std::process::exit(dispatch::EXIT_INVALID);
            }
        },
    };

    let provider = UnimplementedClientProvider;
    std::process::exit(dispatch::run(cli, &provider));
}
