//! Sanitization gate for untrusted fetched markup.
//!
//! A [`SanitizePolicy`] turns raw response text into markup that is safe to
//! parse into live nodes. The process-wide policy is installed with
//! [`set_policy`] by a trusted configurer; elements only ever read it.
//! With no policy the gate is the identity transform.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

use crate::fetch::FragmentResponse;
use crate::types::FragmentError;

/// Transforms raw fetched markup before it is parsed.
///
/// Returning an error rejects the content; the error's message is carried in
/// [`FragmentError::Sanitization`].
#[async_trait]
pub trait SanitizePolicy: Send + Sync {
    async fn transform(&self, markup: String, response: &FragmentResponse) -> Result<String>;
}

static POLICY: RwLock<Option<Arc<dyn SanitizePolicy>>> = RwLock::new(None);

/// Install (or clear with `None`) the process-wide policy.
pub fn set_policy(policy: Option<Arc<dyn SanitizePolicy>>) {
    let installed = policy.is_some();
    *POLICY.write().unwrap_or_else(PoisonError::into_inner) = policy;
    tracing::debug!(installed, "sanitization policy updated");
}

/// The currently installed process-wide policy.
pub fn policy() -> Option<Arc<dyn SanitizePolicy>> {
    POLICY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Which policy a pipeline consults.
#[derive(Clone, Default)]
pub enum SanitizeGate {
    /// Read the process-wide slot at sanitization time.
    #[default]
    Global,
    /// Always use this policy (or the identity transform for `None`).
    Fixed(Option<Arc<dyn SanitizePolicy>>),
}

impl SanitizeGate {
    /// A gate pinned to `policy`.
    pub fn fixed(policy: impl SanitizePolicy + 'static) -> Self {
        Self::Fixed(Some(Arc::new(policy)))
    }

    /// A gate that never transforms.
    pub fn identity() -> Self {
        Self::Fixed(None)
    }

    fn resolve(&self) -> Option<Arc<dyn SanitizePolicy>> {
        match self {
            Self::Global => policy(),
            Self::Fixed(p) => p.clone(),
        }
    }

    /// Run the policy over `raw`. Invoked once per validated response.
    pub async fn apply(
        &self,
        raw: String,
        response: &FragmentResponse,
    ) -> Result<String, FragmentError> {
        let Some(policy) = self.resolve() else {
            return Ok(raw);
        };
        policy
            .transform(raw, response)
            .await
            .map_err(|e| FragmentError::Sanitization {
                reason: format!("{e:#}"),
            })
    }
}

impl std::fmt::Debug for SanitizeGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "SanitizeGate::Global"),
            Self::Fixed(Some(_)) => write!(f, "SanitizeGate::Fixed(policy)"),
            Self::Fixed(None) => write!(f, "SanitizeGate::Fixed(identity)"),
        }
    }
}

/// Adapts a synchronous closure into a [`SanitizePolicy`].
pub struct PolicyFn<F>(pub F);

#[async_trait]
impl<F> SanitizePolicy for PolicyFn<F>
where
    F: Fn(String, &FragmentResponse) -> Result<String> + Send + Sync,
{
    async fn transform(&self, markup: String, response: &FragmentResponse) -> Result<String> {
        (self.0)(markup, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    fn response() -> FragmentResponse {
        FragmentResponse::ok("text/html", "<p>raw</p>")
    }

    #[tokio::test]
    async fn test_identity_without_policy() {
        let gate = SanitizeGate::identity();
        let out = gate.apply("<p>raw</p>".into(), &response()).await.unwrap();
        assert_eq!(out, "<p>raw</p>");
    }

    #[tokio::test]
    async fn test_rewriting_policy() {
        let rewrite = |_: String, _: &FragmentResponse| -> Result<String> {
            Ok("<b>replacement</b>".to_string())
        };
        let gate = SanitizeGate::fixed(PolicyFn(rewrite));
        let out = gate.apply("<p>raw</p>".into(), &response()).await.unwrap();
        assert_eq!(out, "<b>replacement</b>");
    }

    #[tokio::test]
    async fn test_rejection_keeps_reason() {
        let reject = |_: String, _: &FragmentResponse| -> Result<String> {
            bail!("Rejected data!")
        };
        let gate = SanitizeGate::fixed(PolicyFn(reject));
        let err = gate.apply("<p>raw</p>".into(), &response()).await.unwrap_err();
        assert_eq!(
            err,
            FragmentError::Sanitization {
                reason: "Rejected data!".into()
            }
        );
        assert!(err.to_string().contains("Rejected data!"));
    }

    #[tokio::test]
    async fn test_policy_sees_response_headers() {
        let require_marker = |markup: String, resp: &FragmentResponse| -> Result<String> {
            if resp.header("X-Server-Sanitized") != Some("sanitized=true") {
                bail!("Rejecting HTML that was not marked by the server as sanitized.");
            }
            Ok(markup)
        };
        let gate = SanitizeGate::fixed(PolicyFn(require_marker));
        assert!(gate.apply("x".into(), &response()).await.is_err());

        let marked = response().with_header("X-Server-Sanitized", "sanitized=true");
        assert_eq!(gate.apply("x".into(), &marked).await.unwrap(), "x");
    }
}
