//! Tool trait and registry.
//!
//! Conversational engines discover tools by name, description and JSON
//! Schema, then invoke them with a JSON argument object. The HTTP server
//! ([`crate::server`]) and the MCP endpoint ([`crate::mcp`]) both dispatch
//! through a [`ToolRegistry`].
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         ToolRegistry         │
//! │  ┌────────────────────────┐  │
//! │  │ search_knowledge_base  │──┼──▶ KnowledgeBaseBridge
//! │  └────────────────────────┘  │
//! └──────────────┬───────────────┘
//!                ▼
//!      POST /tools/{name}  ·  MCP tools/call
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::bridge::KnowledgeBaseBridge;
use crate::models::ToolCallRequest;

/// Name under which the knowledge-base tool is registered.
pub const SEARCH_TOOL_NAME: &str = "search_knowledge_base";

/// A tool that agents can discover and call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use knowledge_bridge::traits::{Tool, ToolContext};
///
/// pub struct EchoTool;
///
/// #[async_trait]
/// impl Tool for EchoTool {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Echo the arguments back" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {}, "required": [] })
///     }
///
///     async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
///         Ok(params)
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores; used as the route path
    /// (`POST /tools/{name}`) and the MCP tool name.
    fn name(&self) -> &str;

    /// One-line description agents use to decide whether to call the tool.
    fn description(&self) -> &str;

    /// OpenAI function-calling JSON Schema for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the raw JSON arguments.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Per-invocation context handed to [`Tool::execute`].
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    cancel: CancellationToken,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Fires when the host abandons the call.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Serializable tool descriptor for `GET /tools/list` and `kb tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// The knowledge-base search tool. Delegates to [`KnowledgeBaseBridge`].
///
/// Never returns `Err`: every outcome, including a missing query, is a
/// serialized [`ToolCallResult`](crate::models::ToolCallResult).
pub struct SearchKnowledgeBaseTool {
    bridge: KnowledgeBaseBridge,
}

impl SearchKnowledgeBaseTool {
    pub fn new(bridge: KnowledgeBaseBridge) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeBaseTool {
    fn name(&self) -> &str {
        SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search and retrieve information from the knowledge base. Use this for any questions \
         about claims, claim IDs, tickets, policy information, or general inquiries."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question, search query, claim ID, or ticket number to search for. \
                                    Can be numbers like '1234', '3456', or questions like 'what is a claim?'"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request = ToolCallRequest::from_arguments(&params);
        let result = self
            .bridge
            .handle_cancellable(request, ctx.cancellation().clone())
            .await;
        Ok(serde_json::to_value(&result)?)
    }
}

/// Registry of callable tools.
///
/// # Example
///
/// ```rust
/// use knowledge_bridge::traits::ToolRegistry;
///
/// let mut tools = ToolRegistry::new();
/// // tools.register(Box::new(MyTool::new()));
/// assert!(tools.is_empty());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding only the knowledge-base search tool.
    pub fn with_knowledge_base(bridge: KnowledgeBaseBridge) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchKnowledgeBaseTool::new(bridge)));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Descriptors for every registered tool, in registration order.
    pub fn describe(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo::from_tool(t.as_ref()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
