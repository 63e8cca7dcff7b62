//! Collaborator interfaces consumed by the controller.
//!
//! Concrete search providers (Shodan, Fofa, ZoomEye, …) and OAST services
//! (Interactsh, CEye) live outside this crate; the controller only needs
//! these trait surfaces.

use async_trait::async_trait;

use crate::errors::Result;

/// External target search provider, queried with a dork string.
#[async_trait]
pub trait TargetEnumerator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider is configured (credentials present, quota
    /// remaining) and can be queried.
    fn is_available(&self) -> bool;

    /// Search for targets, returning URLs. `resource_kind` selects the
    /// provider's notion of an asset ("host", "service", …).
    async fn search(
        &self,
        dork: &str,
        max_pages: usize,
        resource_kind: &str,
    ) -> Result<Vec<String>>;
}

/// Out-of-band interaction service for blind vulnerability detection.
///
/// The controller injects `get_domain()` / `get_url()` into the template
/// environment as `oast_domain` / `oast_url` before each execution.
#[async_trait]
pub trait OASTProvider: Send + Sync {
    fn is_available(&self) -> bool;

    fn get_domain(&self) -> String;

    fn get_url(&self) -> String;

    /// Whether the side channel observed an interaction since the last
    /// poll.
    async fn check_interaction(&self) -> bool;
}
