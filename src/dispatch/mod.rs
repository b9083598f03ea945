pub mod http;
pub mod registry;

use std::future::Future;
use std::time::Instant;

use crate::error::CouncilError;

/// Internal request type for one attempt against a backend.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub prompt: String,
    pub model: String,
    pub deadline: Instant,
    /// Ask the backend for a JSON-only reply where the wire format supports it.
    pub structured: bool,
}

/// Internal result type, shared by every backend.
#[derive(Debug)]
pub struct ProviderResult {
    pub text: String,
    pub model: String,
    pub provider: String,
}

/// A backend able to answer one attempt.
///
/// Implementations map transport failures into `CouncilError` at the source so
/// callers only ever match on typed variants.
pub trait Generate: Send + Sync {
    fn generate(
        &self,
        req: &ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResult, CouncilError>> + Send;
}
