//! include-fragment CLI — expand `<include-fragment>` placeholders in static HTML.

pub mod config;
pub mod resolve;

pub use config::{Flags, ResolveConfig};
pub use resolve::{read_input, write_output, ElementReport, Resolution, Resolver};
