//! The default [`ClientProvider`](crate::cli::dispatch::ClientProvider).
//!
//! Discovering credentials and pinning an SDK client to a region is
//! explicitly out of scope for this crate (see the crate-level
//! documentation): the binary's own provider always fails with a clear
//! message naming the gap, rather than half-implementing a credential
//! chain. Callers embedding this crate as a library supply their own
//! `ClientProvider` backed by a real Block API / control-plane / object-store
//! client.

use anyhow::bail;

use crate::cli::dispatch::{ClientBundle, ClientProvider, RegionalClients};
use crate::config::Config;

/// Always fails: client construction is out of scope for this crate.
pub struct UnimplementedClientProvider;

impl ClientProvider for UnimplementedClientProvider {
    fn build(&self, _config: &Config) -> anyhow::Result<ClientBundle> {
        bail!(
            "snapblock has no built-in Block API / control-plane / object-store client; \
             construct one and implement `cli::dispatch::ClientProvider` yourself"
        )
    }

    fn build_regional(&self, _config: &Config, _regions: &[String]) -> anyhow::Result<Vec<RegionalClients>> {
        bail!(
            "snapblock has no built-in regional client set for fanout; \
             implement `cli::dispatch::ClientProvider::build_regional` yourself"
        )
    }
}
