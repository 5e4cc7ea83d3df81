//! The `<include-fragment>` lifecycle controller.
//!
//! An [`IncludeFragment`] is bound to one element node in a
//! [`HostDocument`]. Attaching it, changing its `src` or `loading`
//! attributes, visibility, and the explicit `load()`/`refetch()` operations
//! all funnel into a single activation path:
//!
//! ```text
//! idle ──activate──▶ loading ──Ok──▶ loaded   (start → pre-replace? → load → post-replace? → end)
//!                            └─Err─▶ errored  (start → error → end)
//! ```
//!
//! `load-start` fires synchronously inside the call that activates. The rest
//! runs on a spawned Tokio task once the cached settlement resolves, so every
//! method that can activate must be called from within a Tokio runtime.
//!
//! The element only splices into the document if it is still connected when
//! its settlement resolves. Otherwise the outcome stays in the cache, the
//! activation ends quietly, and the next attach starts a fresh activation.

use futures::FutureExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{broadcast, watch};

use crate::cache::{FragmentCache, Lookup, Settlement};
use crate::dom::{ConnectionReactions, Fragment, HostDocument, NodeId};
use crate::events::{EventBus, FragmentEvent, ListenerId, ReplaceEvent};
use crate::fetch::Fetch;
use crate::pipeline::LoadPipeline;
use crate::types::{ActivationRequest, LifecycleState, LoadingMode};
use crate::visibility::VisibilityGate;

/// Tag name of upgradable elements.
pub const TAG_NAME: &str = "include-fragment";

/// Class reflected while the element is in the `errored` state.
pub const ERROR_CLASS: &str = "is-error";

const SRC_ATTR: &str = "src";
const ACCEPT_ATTR: &str = "accept";
const LOADING_ATTR: &str = "loading";

/// Observable lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    pub state: LifecycleState,
    /// Whether an activation is between `load-start` and `load-end`.
    pub in_flight: bool,
}

/// What caused an activation. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Attached,
    SourceChanged,
    ModeChanged,
    Visible,
    Explicit,
    Refetch,
}

/// Identifies one activation and the cache generation it is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    id: u64,
    generation: u64,
}

#[derive(Default)]
struct Controller {
    gate: Option<VisibilityGate>,
    activation: Option<Ticket>,
    next_id: u64,
}

struct Inner {
    this: Weak<Inner>,
    document: HostDocument,
    node: NodeId,
    pipeline: LoadPipeline,
    cache: FragmentCache,
    events: EventBus,
    controller: Mutex<Controller>,
    status: watch::Sender<Status>,
}

/// A live include-fragment element.
///
/// Cheap to clone; clones share one element.
#[derive(Clone)]
pub struct IncludeFragment {
    inner: Arc<Inner>,
}

impl IncludeFragment {
    /// Create a new, detached `<include-fragment>` in `document`.
    pub fn new(document: &HostDocument, fetcher: Arc<dyn Fetch>) -> Self {
        let node = document.create_element(TAG_NAME);
        Self::with_pipeline(document, node, LoadPipeline::new(fetcher))
    }

    /// Turn an existing node into a live element. If the node is already
    /// connected this behaves like attaching it.
    ///
    /// The document only holds a weak reference to the element. Keep the
    /// returned handle alive for as long as the element should react to
    /// attachment, attribute or visibility changes; dropping it tears down
    /// any pending visibility gate.
    pub fn upgrade(document: &HostDocument, node: NodeId, fetcher: Arc<dyn Fetch>) -> Self {
        Self::with_pipeline(document, node, LoadPipeline::new(fetcher))
    }

    /// Upgrade every connected `<include-fragment>` node that is not live yet.
    /// The same lifetime rule as [`IncludeFragment::upgrade`] applies to
    /// every returned handle.
    pub fn upgrade_all(document: &HostDocument, fetcher: Arc<dyn Fetch>) -> Vec<Self> {
        Self::upgrade_all_with(document, LoadPipeline::new(fetcher))
    }

    pub fn upgrade_all_with(document: &HostDocument, pipeline: LoadPipeline) -> Vec<Self> {
        document
            .elements_by_tag(TAG_NAME)
            .into_iter()
            .filter(|node| !document.is_observed(*node))
            .map(|node| Self::with_pipeline(document, node, pipeline.clone()))
            .collect()
    }

    /// Bind `node` to an explicit pipeline.
    pub fn with_pipeline(document: &HostDocument, node: NodeId, pipeline: LoadPipeline) -> Self {
        let (status, _) = watch::channel(Status::default());
        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            document: document.clone(),
            node,
            pipeline,
            cache: FragmentCache::new(),
            events: EventBus::default(),
            controller: Mutex::new(Controller::default()),
            status,
        });

        let reactions: Weak<Inner> = Arc::downgrade(&inner);
        document.observe_connection(node, reactions);

        if document.is_connected(node) {
            inner.on_connected();
        }
        Self { inner }
    }

    pub fn node(&self) -> NodeId {
        self.inner.node
    }

    pub fn document(&self) -> &HostDocument {
        &self.inner.document
    }

    pub fn is_connected(&self) -> bool {
        self.inner.document.is_connected(self.inner.node)
    }

    /// Append the element to `parent`.
    pub fn attach_to(&self, parent: NodeId) -> bool {
        self.inner.document.append_child(parent, self.inner.node)
    }

    /// Detach the element from its parent.
    pub fn remove(&self) {
        self.inner.document.remove(self.inner.node)
    }

    // ── Attributes ──────────────────────────────────────────

    /// Raw `src` attribute.
    pub fn src_attribute(&self) -> Option<String> {
        self.inner.attribute(SRC_ATTR)
    }

    /// The locator, resolved against the document's base URL. Empty when
    /// no `src` is set.
    pub fn src(&self) -> String {
        self.inner.src()
    }

    pub fn set_src(&self, value: &str) {
        self.inner.set_attribute(SRC_ATTR, value);
        self.inner.on_src_changed();
    }

    /// Raw `accept` attribute, or empty.
    pub fn accept(&self) -> String {
        self.inner.attribute(ACCEPT_ATTR).unwrap_or_default()
    }

    pub fn set_accept(&self, value: &str) {
        self.inner.set_attribute(ACCEPT_ATTR, value);
    }

    pub fn loading(&self) -> LoadingMode {
        self.inner.loading()
    }

    pub fn set_loading(&self, mode: LoadingMode) {
        self.set_loading_attribute(mode.as_str());
    }

    /// Set the raw `loading` attribute. Unrecognized values read as eager.
    pub fn set_loading_attribute(&self, value: &str) {
        let old = self.inner.loading();
        self.inner.set_attribute(LOADING_ATTR, value);
        self.inner.on_loading_changed(old, self.inner.loading());
    }

    // ── State ───────────────────────────────────────────────

    pub fn state(&self) -> LifecycleState {
        self.inner.status.borrow().state
    }

    pub fn status(&self) -> Status {
        *self.inner.status.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<Status> {
        self.inner.status.subscribe()
    }

    /// Wait until no activation is in flight and report the state.
    pub async fn settled(&self) -> LifecycleState {
        let mut rx = self.inner.status.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if !status.in_flight {
                return status.state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    // ── Operations ──────────────────────────────────────────

    /// The current fragment data: the markup on success, the failure reason
    /// otherwise. Reading never emits signals.
    ///
    /// The returned handle is a copy; replacing or dropping it has no effect
    /// on what later reads observe.
    pub fn data(&self) -> Settlement {
        let request = self.inner.activation_request();
        self.inner.lookup(&request).settlement
    }

    /// Explicitly activate. Tears down any pending visibility gate, so a
    /// later visibility change cannot activate a second time. On a detached
    /// element this only reads the data.
    pub fn load(&self) -> Settlement {
        if self.is_connected() {
            self.inner.activate(Trigger::Explicit)
        } else {
            self.data()
        }
    }

    /// Drop the cached outcome and run the pipeline again, even for an
    /// unchanged locator.
    pub fn refetch(&self) {
        self.inner.cache.invalidate();
        if self.is_connected() {
            self.inner.activate(Trigger::Refetch);
        } else {
            let settlement = self.data();
            tokio::spawn(async move {
                let _ = settlement.await;
            });
        }
    }

    // ── Signals ─────────────────────────────────────────────

    pub fn listen(&self, f: impl Fn(&FragmentEvent) + Send + Sync + 'static) -> ListenerId {
        self.inner.events.listen(f)
    }

    pub fn listen_replace(
        &self,
        f: impl Fn(&mut ReplaceEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.listen_replace(f)
    }

    pub fn unlisten(&self, id: ListenerId) -> bool {
        self.inner.events.unlisten(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FragmentEvent> {
        self.inner.events.subscribe()
    }
}

impl std::fmt::Debug for IncludeFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeFragment")
            .field("node", &self.inner.node)
            .field("src", &self.src())
            .field("loading", &self.loading())
            .field("status", &self.status())
            .finish()
    }
}

impl Inner {
    fn controller(&self) -> MutexGuard<'_, Controller> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.document.attribute(self.node, name)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        let node = self.node;
        self.document.mutate(|d| d.set_attribute(node, name, value));
    }

    fn src(&self) -> String {
        self.attribute(SRC_ATTR)
            .map(|raw| self.document.resolve_url(raw.trim()))
            .unwrap_or_default()
    }

    fn loading(&self) -> LoadingMode {
        self.attribute(LOADING_ATTR)
            .map(|v| LoadingMode::parse(&v))
            .unwrap_or_default()
    }

    fn activation_request(&self) -> ActivationRequest {
        ActivationRequest::new(self.src(), self.attribute(ACCEPT_ATTR).unwrap_or_default())
    }

    fn lookup(&self, request: &ActivationRequest) -> Lookup {
        let pipeline = self.pipeline.clone();
        let req = request.clone();
        self.cache.get_or_start(&request.locator, move || {
            async move { pipeline.run(req).await }.boxed()
        })
    }

    fn is_connected(&self) -> bool {
        self.document.is_connected(self.node)
    }

    // ── Reactions ───────────────────────────────────────────

    fn on_connected(self: &Arc<Self>) {
        match self.loading() {
            LoadingMode::Eager => {
                if !self.src().is_empty() {
                    self.activate(Trigger::Attached);
                }
            }
            LoadingMode::Lazy => self.defer(),
        }
    }

    fn on_src_changed(self: &Arc<Self>) {
        if !self.is_connected() {
            return;
        }
        match self.loading() {
            LoadingMode::Eager => {
                self.activate(Trigger::SourceChanged);
            }
            LoadingMode::Lazy => self.defer(),
        }
    }

    fn on_loading_changed(self: &Arc<Self>, old: LoadingMode, new: LoadingMode) {
        if old == new || new != LoadingMode::Eager || !self.is_connected() {
            return;
        }
        let deferred = self
            .controller()
            .gate
            .as_ref()
            .is_some_and(VisibilityGate::is_armed);
        if deferred {
            self.activate(Trigger::ModeChanged);
        }
    }

    /// Register a visibility gate unless one is already pending.
    fn defer(self: &Arc<Self>) {
        let mut ctl = self.controller();
        if ctl.gate.as_ref().is_some_and(VisibilityGate::is_armed) {
            return;
        }
        let weak = Arc::downgrade(self);
        ctl.gate = Some(VisibilityGate::observe(
            self.document.clone(),
            self.node,
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_visible();
                }
            },
        ));
        tracing::debug!("{:?} deferred until visible", self.node);
    }

    fn on_visible(self: &Arc<Self>) {
        self.controller().gate = None;
        if self.loading() != LoadingMode::Lazy {
            return;
        }
        if self.src().is_empty() {
            tracing::debug!("{:?} visible without src; waiting for one", self.node);
            return;
        }
        self.activate(Trigger::Visible);
    }

    // ── Activation ──────────────────────────────────────────

    fn activate(self: &Arc<Self>, trigger: Trigger) -> Settlement {
        let request = self.activation_request();
        let (ticket, settlement, cached) = {
            let mut ctl = self.controller();
            if let Some(mut gate) = ctl.gate.take() {
                gate.disarm();
            }

            let lookup = self.lookup(&request);
            if ctl
                .activation
                .is_some_and(|active| active.generation == lookup.generation)
            {
                tracing::debug!(src = %request.locator, ?trigger, "activation already in flight");
                return lookup.settlement;
            }

            ctl.next_id += 1;
            let ticket = Ticket {
                id: ctl.next_id,
                generation: lookup.generation,
            };
            ctl.activation = Some(ticket);
            self.status.send_modify(|s| {
                s.state = LifecycleState::Loading;
                s.in_flight = true;
            });
            (ticket, lookup.settlement, !lookup.started)
        };

        let node = self.node;
        self.document.mutate(|d| d.remove_class(node, ERROR_CLASS));

        tracing::debug!(src = %request.locator, ?trigger, cached, "activation started");
        self.events.emit(FragmentEvent::LoadStart {
            src: request.locator.clone(),
        });

        let this = self.clone();
        let pending = settlement.clone();
        tokio::spawn(async move {
            this.complete(ticket, request.locator, pending).await;
        });
        settlement
    }

    async fn complete(self: Arc<Self>, ticket: Ticket, src: String, settlement: Settlement) {
        let outcome = settlement.await;

        // A lazy element can change its locator without starting a lookup,
        // so the generation alone does not catch every superseded result.
        if !self.cache.is_current(ticket.generation) || self.src() != src {
            tracing::debug!(src = %src, "discarding stale result");
            self.finish(ticket, Some(LifecycleState::Idle), src);
            return;
        }

        if !self.is_connected() {
            tracing::debug!(src = %src, "settled while detached; replacement suppressed");
            self.finish(ticket, Some(LifecycleState::Idle), src);
            return;
        }

        match outcome {
            Ok(markup) => {
                let mut event = ReplaceEvent::new(src.clone(), Fragment::parse(&markup));
                let proceed = self.events.dispatch_replace(&mut event);

                let node = self.node;
                let replaced = proceed
                    && self
                        .document
                        .mutate(|d| d.replace_with(node, &event.fragment))
                        .is_some();

                if replaced {
                    tracing::info!(src = %src, nodes = event.fragment.len(), "fragment replaced");
                } else if !proceed {
                    tracing::debug!(src = %src, "replacement canceled by listener");
                }

                self.set_state(ticket, LifecycleState::Loaded);
                self.events.emit(FragmentEvent::Load { src: src.clone() });
                if replaced {
                    self.events.emit(FragmentEvent::PostReplace { src: src.clone() });
                }
                self.finish(ticket, Some(LifecycleState::Loaded), src);
            }
            Err(error) => {
                let node = self.node;
                self.document.mutate(|d| d.add_class(node, ERROR_CLASS));
                self.set_state(ticket, LifecycleState::Errored);
                self.events.emit(FragmentEvent::Error {
                    src: src.clone(),
                    reason: error.to_string(),
                });
                self.finish(ticket, Some(LifecycleState::Errored), src);
            }
        }
    }

    /// Set the state if `ticket` is still the current activation.
    fn set_state(&self, ticket: Ticket, state: LifecycleState) {
        let ctl = self.controller();
        if ctl.activation == Some(ticket) {
            self.status.send_modify(|s| s.state = state);
        }
    }

    /// Emit `load-end` and release the activation slot.
    fn finish(&self, ticket: Ticket, state: Option<LifecycleState>, src: String) {
        self.events.emit(FragmentEvent::LoadEnd { src });

        let mut ctl = self.controller();
        if ctl.activation != Some(ticket) {
            return;
        }
        ctl.activation = None;
        self.status.send_modify(|s| {
            if let Some(state) = state {
                s.state = state;
            }
            s.in_flight = false;
        });
    }
}

impl ConnectionReactions for Inner {
    fn connected(&self) {
        if let Some(this) = self.this.upgrade() {
            this.on_connected();
        }
    }

    fn disconnected(&self) {
        if let Some(mut gate) = self.controller().gate.take() {
            gate.disarm();
        }
    }
}
