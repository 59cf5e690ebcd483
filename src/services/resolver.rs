//! Identity resolution: turn an opaque resource locator into container,
//! object name, and application, and pick the destination container.
//!
//! Resolution is a pure function of the input string. A locator that
//! does not match the pattern, or a container/name-prefix pair outside
//! the lookup table, resolves to `Application::Unknown`; the driver
//! short-circuits on that with a wrong-name-format diagnostic instead
//! of proceeding.

use crate::config::AppConfig;
use crate::models::blob::{Application, BlobDescriptor, BlobStatus};
use regex::Regex;

/// Locator grammar: `.../containers/<container>/blobs/<name>` where the
/// container is a recognized application prefix, optionally followed by
/// a dash-separated suffix.
const URI_PATTERN: &str = r"^.*containers/((ade|rtd|wallet)(?:-[a-z0-9-]+)?)/blobs/(.+)$";

pub struct Resolver {
    pattern: Regex,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            // The pattern is a literal constant; it always compiles.
            pattern: Regex::new(URI_PATTERN).expect("locator pattern is valid"),
        }
    }

    /// Resolve the locator carried by `blob.uri`.
    ///
    /// On a match the descriptor gains container, name, application,
    /// target container, and advances to `Received`. On a miss the
    /// descriptor is left in `Init` with
    /// `Application::Unknown`; this is a normal, reportable outcome,
    /// never an error.
    pub fn resolve(&self, blob: &mut BlobDescriptor, config: &AppConfig) {
        let Some(captures) = self.pattern.captures(&blob.uri) else {
            tracing::warn!(uri = %blob.uri, "locator does not match container/blob pattern");
            return;
        };
        let container = captures[1].to_string();
        let prefix = captures[2].to_string();
        let name = captures[3].to_string();

        let application = application_for(&prefix, &name);
        if application == Application::Unknown {
            tracing::warn!(
                container = %container,
                blob = %name,
                "container prefix and blob name prefix do not map to an application"
            );
            return;
        }

        blob.container = container;
        blob.name = name.clone();
        blob.original_name = name;
        blob.application = application;
        blob.target_container = config.target_container_for(application).to_string();
        blob.advance(BlobStatus::Received);
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed lookup from container prefix and object-name prefix to the
/// resolved application. Both must agree.
fn application_for(container_prefix: &str, blob_name: &str) -> Application {
    match container_prefix {
        "ade" if blob_name.starts_with("ADE.") => Application::Aggregates,
        "rtd" if blob_name.starts_with("CSTAR.") => Application::Transactions,
        "wallet" if blob_name.starts_with("WALLET.") => Application::Contracts,
        _ => Application::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn resolve(uri: &str) -> BlobDescriptor {
        let mut blob = BlobDescriptor::new(uri);
        Resolver::new().resolve(&mut blob, &AppConfig::for_tests());
        blob
    }

    #[test]
    fn resolves_aggregates() {
        let blob = resolve(
            "/blobServices/default/containers/ade-transactions-decrypted/blobs/ADE.12345.TRNLOG.20220503.174947.001.01.csv.pgp",
        );
        assert_eq!(blob.application, Application::Aggregates);
        assert_eq!(blob.container, "ade-transactions-decrypted");
        assert_eq!(blob.name, "ADE.12345.TRNLOG.20220503.174947.001.01.csv.pgp");
        assert_eq!(blob.status, BlobStatus::Received);
        assert_eq!(blob.target_container, "ade-target");
    }

    #[test]
    fn resolves_transactions() {
        let blob = resolve(
            "/blobServices/default/containers/rtd-transactions/blobs/CSTAR.12345.TRNLOG.20220503.174947.001.csv.pgp",
        );
        assert_eq!(blob.application, Application::Transactions);
        assert_eq!(blob.target_container, "rtd-target");
    }

    #[test]
    fn resolves_contracts() {
        let blob = resolve(
            "/blobServices/default/containers/wallet-contracts/blobs/WALLET.12345.TRNLOG.20220503.174947.001.json.pgp",
        );
        assert_eq!(blob.application, Application::Contracts);
    }

    #[test]
    fn mismatched_prefix_pair_is_unknown() {
        // An aggregates-style blob name under a transactions container
        // must not resolve.
        let blob = resolve(
            "/blobServices/default/containers/rtd-transactions/blobs/ADE.12345.TRNLOG.20220503.174947.001.csv.pgp",
        );
        assert_eq!(blob.application, Application::Unknown);
        assert_eq!(blob.status, BlobStatus::Init);
    }

    #[test]
    fn unmatched_pattern_is_unknown() {
        let blob = resolve("not-a-locator");
        assert_eq!(blob.application, Application::Unknown);
        assert_eq!(blob.status, BlobStatus::Init);
    }

    #[test]
    fn resolution_ignores_the_name_body() {
        // The table keys on prefixes only; segment parsing is a
        // separate concern of the driver.
        let blob = resolve("/blobServices/default/containers/ade-transactions/blobs/ADE.foo");
        assert_eq!(blob.application, Application::Aggregates);
        assert_eq!(blob.status, BlobStatus::Received);
    }

    #[test]
    fn resolution_is_pure() {
        let uri = "/blobServices/default/containers/ade-x/blobs/ADE.12345.TRNLOG.20220503.174947.001.csv.pgp";
        let a = resolve(uri);
        let b = resolve(uri);
        assert_eq!(a.application, b.application);
        assert_eq!(a.container, b.container);
        assert_eq!(a.name, b.name);
    }
}
