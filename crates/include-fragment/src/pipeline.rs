//! Load pipeline: request → validate → sanitize.
//!
//! One external network call per run and no retries. Every failure maps to
//! exactly one [`FragmentError`] variant and is terminal for the activation
//! that produced it.

use std::sync::Arc;

use crate::fetch::{Fetch, FragmentRequest};
use crate::negotiate;
use crate::sanitize::SanitizeGate;
use crate::types::{ActivationRequest, FragmentError, LoadOutcome};

/// Orchestrates a single fragment load.
#[derive(Clone)]
pub struct LoadPipeline {
    fetcher: Arc<dyn Fetch>,
    gate: SanitizeGate,
}

impl LoadPipeline {
    /// A pipeline that consults the process-wide sanitization policy.
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            gate: SanitizeGate::Global,
        }
    }

    /// Replace the sanitization gate.
    pub fn with_gate(mut self, gate: SanitizeGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &SanitizeGate {
        &self.gate
    }

    /// Build the outgoing request for an activation.
    pub fn request_for(request: &ActivationRequest) -> FragmentRequest {
        FragmentRequest::get(&request.locator)
            .with_header("Accept", negotiate::accept_header(&request.accept))
    }

    /// Run the pipeline once. Failures are logged before being returned.
    pub async fn run(&self, request: ActivationRequest) -> LoadOutcome {
        let outcome = self.run_inner(&request).await;
        match &outcome {
            Ok(markup) => {
                tracing::debug!("loaded {} ({} bytes)", request.locator, markup.len());
            }
            Err(FragmentError::NoSource) => {
                tracing::debug!("fragment load skipped: no src configured");
            }
            Err(e) => {
                tracing::warn!(src = %request.locator, kind = e.kind(), "fragment load failed: {e}");
            }
        }
        outcome
    }

    async fn run_inner(&self, request: &ActivationRequest) -> LoadOutcome {
        if request.locator.trim().is_empty() {
            return Err(FragmentError::NoSource);
        }

        let response = self
            .fetcher
            .fetch(Self::request_for(request))
            .await
            .map_err(|e| FragmentError::Network {
                reason: format!("{e:#}"),
            })?;

        if !response.is_success() {
            return Err(FragmentError::HttpStatus {
                code: response.status,
            });
        }

        negotiate::validate(&request.accept, response.content_type())?;

        let raw = response.body.clone();
        self.gate.apply(raw, &response).await
    }
}

impl std::fmt::Debug for LoadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadPipeline")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}
