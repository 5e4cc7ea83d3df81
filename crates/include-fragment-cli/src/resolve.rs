//! Headless expansion of `<include-fragment>` placeholders.
//!
//! A headless host has no viewport, so every placeholder is activated
//! explicitly, lazy ones included. Fragments may themselves contain
//! placeholders; those are picked up in later rounds, up to the configured
//! depth.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use include_fragment::{
    Fetch, FragmentError, HostDocument, HttpFetcher, IncludeFragment, LifecycleState,
    LoadPipeline, Status, TAG_NAME,
};

use crate::config::ResolveConfig;

/// Outcome for one placeholder.
#[derive(Debug, Clone, Serialize)]
pub struct ElementReport {
    /// Expansion round the placeholder was found in, starting at 1.
    pub round: usize,
    pub src: String,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FragmentError>,
}

/// Result of resolving a document.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub html: String,
    pub elements: Vec<ElementReport>,
    /// Rounds that found at least one placeholder.
    pub rounds: usize,
    /// Placeholders left untouched because the depth limit was reached.
    pub unresolved: usize,
}

impl Resolution {
    pub fn errored(&self) -> usize {
        self.elements
            .iter()
            .filter(|e| e.state == LifecycleState::Errored)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.errored() > 0
    }
}

/// Expands placeholders in HTML documents.
pub struct Resolver {
    config: ResolveConfig,
    fetcher: Arc<dyn Fetch>,
}

impl Resolver {
    /// A resolver fetching over HTTP.
    pub fn new(config: ResolveConfig) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(config.timeout_ms));
        Self::with_fetcher(config, fetcher)
    }

    pub fn with_fetcher(config: ResolveConfig, fetcher: Arc<dyn Fetch>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    /// Resolve every placeholder in `markup`.
    pub async fn resolve(&self, markup: &str) -> Resolution {
        let host = HostDocument::parse(markup);
        host.set_base_url(self.config.base_url.clone());
        let pipeline = LoadPipeline::new(self.fetcher.clone());

        // Elements stay alive for the whole run so failed placeholders are
        // not upgraded (and fetched) again in later rounds.
        let mut live: Vec<IncludeFragment> = Vec::new();
        let mut reports = Vec::new();
        let mut rounds = 0;

        for round in 1..=self.config.max_depth {
            self.apply_default_accept(&host);
            let elements = IncludeFragment::upgrade_all_with(&host, pipeline.clone());
            if elements.is_empty() {
                break;
            }
            rounds = round;
            tracing::info!("round {round}: {} placeholder(s)", elements.len());

            for el in &elements {
                if el.status() == Status::default() {
                    el.load();
                }
            }
            for el in &elements {
                let state = el.settled().await;
                let error = el.data().await.err();
                if let Some(e) = &error {
                    tracing::warn!("{} failed: {e}", el.src());
                }
                reports.push(ElementReport {
                    round,
                    src: el.src(),
                    state,
                    error,
                });
            }
            live.extend(elements);
        }

        let unresolved = host
            .elements_by_tag(TAG_NAME)
            .into_iter()
            .filter(|node| !host.is_observed(*node))
            .count();
        if unresolved > 0 {
            tracing::warn!(
                "{unresolved} placeholder(s) left after {} round(s)",
                self.config.max_depth
            );
        }

        Resolution {
            html: host.to_html(),
            elements: reports,
            rounds,
            unresolved,
        }
    }

    fn apply_default_accept(&self, host: &HostDocument) {
        if self.config.accept == include_fragment::negotiate::DEFAULT_ACCEPT {
            return;
        }
        let accept = self.config.accept.as_str();
        host.mutate(|d| {
            for node in d.elements_by_tag(TAG_NAME) {
                if d.attribute(node, "accept").is_none() {
                    d.set_attribute(node, "accept", accept);
                }
            }
        });
    }
}

/// Read the input document from a file, or stdin for `None` / `-`.
pub async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("failed to read {}", p.display())),
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Write the output document to a file, or stdout for `None`.
pub async fn write_output(path: Option<&Path>, html: &str) -> Result<()> {
    match path {
        Some(p) => tokio::fs::write(p, html)
            .await
            .with_context(|| format!("failed to write {}", p.display())),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(html.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
            Ok(())
        }
    }
}
