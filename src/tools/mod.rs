//! Tools the assistant's agent can call.

pub mod pubmed;

pub use pubmed::{render_summaries, PubmedSearchTool};

use crate::config::PubmedConfig;
use crate::tool::ToolRegistry;

/// The single lookup capability offered to the agent.
pub fn literature_toolkit(cfg: &PubmedConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(PubmedSearchTool::from_config(cfg));
    registry
}
