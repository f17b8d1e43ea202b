//! Tool trait and registry
//!
//! Tools are named, schema-described procedures the model may select
//! instead of answering directly. Every invocation is a two-stage
//! producer: a `Pending` placeholder first, then exactly one `Terminal`
//! display.

use crate::error::ChatError;
use crate::llm::ToolDeclaration;
use crate::market::DataResolver;
use crate::presentation::DisplayUnit;
use crate::Result;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub mod crypto;
pub mod schema;

pub use crypto::{ListTopCryptosTool, ShowCryptoDetailTool};
pub use schema::{ParameterField, ParameterKind, ParameterSchema, ToolParameters};

/// One observable stage of a tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolStage {
    Pending,
    Terminal(DisplayUnit),
}

impl ToolStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolStage::Terminal(_))
    }
}

/// Stream yielding `Pending` and then exactly one `Terminal`
pub type StagedOutput = BoxStream<'static, ToolStage>;

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Stable name; the model references tools by it turn after turn
    fn name(&self) -> &'static str;
    fn description(&self) -> &str;
    fn parameters(&self) -> &ParameterSchema;

    /// Do the work and produce the terminal display. Never fails: error
    /// conditions are terminal displays too.
    async fn resolve(&self, params: &ToolParameters) -> DisplayUnit;
}

/// Tool registry for looking up and dispatching tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Declarations advertised to the model
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .values()
            .map(|tool| ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().to_json_schema(),
            })
            .collect()
    }

    /// Look up the tool by name, validate the arguments against its schema,
    /// and start the staged output. Unknown tools and invalid arguments
    /// fail before anything is emitted.
    pub fn invoke(&self, name: &str, arguments: &serde_json::Value) -> Result<StagedOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| ChatError::ToolNotFound(name.to_string()))?;

        let params = tool.parameters().validate(arguments)?;

        info!(tool_name = %name, "Dispatching tool");

        let pending = stream::once(async { ToolStage::Pending });
        let terminal = stream::once(async move {
            let display = tool.resolve(&params).await;
            debug!(tool_name = %tool.name(), "Tool reached terminal state");
            ToolStage::Terminal(display)
        });

        Ok(pending.chain(terminal).boxed())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the registry with the two market data tools.
pub fn create_default_registry(resolver: Arc<DataResolver>, top_list_size: u32) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ListTopCryptosTool::new(
        resolver.clone(),
        top_list_size,
    )));
    registry.register(Arc::new(ShowCryptoDetailTool::new(resolver)));

    registry
}
