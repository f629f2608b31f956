pub mod capability;
pub mod documents;
pub mod kinds;
pub mod registry;
pub mod text_index;
pub mod toolset;
pub(crate) mod http;

// Re-exports for convenience.
pub use capability::{
    Capability, CapabilityKind, ParameterSource, ParameterSpec, ResolvedParams, Tool, ToolOutput,
};
pub use documents::{DocumentHit, DocumentIndex, DocumentLookupTool};
pub use registry::{CapabilityRegistry, CommandOutcome, ResolvedCapabilities, SkippedCapability};
pub use toolset::ToolSet;
