//! include-fragment — a self-loading content placeholder that fetches a markup
//! fragment and splices it into its host document in place of itself.

pub mod cache;
pub mod dom;
pub mod element;
pub mod events;
pub mod fetch;
pub mod negotiate;
pub mod pipeline;
pub mod sanitize;
pub mod types;
pub mod visibility;

pub use cache::{FragmentCache, Settlement};
pub use dom::{Document, Fragment, HostDocument, NodeId};
pub use element::{IncludeFragment, Status, ERROR_CLASS, TAG_NAME};
pub use events::{EventBus, FragmentEvent, ListenerId, ReplaceEvent};
pub use fetch::{Fetch, FetchFn, FragmentRequest, FragmentResponse, HttpFetcher};
pub use pipeline::LoadPipeline;
pub use sanitize::{set_policy, PolicyFn, SanitizeGate, SanitizePolicy};
pub use types::*;
