//! Conversation orchestrator - one turn at a time
//!
//! INPUT → HISTORY → MODEL → (TEXT | TOOL: PENDING → TERMINAL) → COMMIT
//!
//! Every call produces exactly one `TurnResult`. Failures never reach the
//! caller: they become the generic failure display and leave the history
//! without an assistant entry for that turn.

use crate::config::AppConfig;
use crate::error::ChatError;
use crate::llm::gemini::GeminiClient;
use crate::llm::{LanguageModel, ModelRequest, ModelResponse, TextChunk, TextStream, SYSTEM_PROMPT};
use crate::market::cache::CachedMarketApi;
use crate::market::coingecko::CoinGeckoClient;
use crate::market::DataResolver;
use crate::memory::ConversationHistory;
use crate::models::{new_turn_id, ToolCall, TurnResult, TurnUpdate};
use crate::presentation::DisplayUnit;
use crate::tools::{create_default_registry, ToolRegistry, ToolStage};
use crate::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// What a successful turn shows and what it commits to history
struct TurnOutcome {
    display: DisplayUnit,
    history_text: String,
}

/// Sink for intermediate displays of the running turn
struct Updates<'a> {
    turn_id: &'a str,
    sender: Option<&'a mpsc::Sender<TurnUpdate>>,
}

impl Updates<'_> {
    async fn emit(&self, display: DisplayUnit) {
        if let Some(sender) = self.sender {
            // A caller that stopped listening does not fail the turn
            let _ = sender
                .send(TurnUpdate {
                    turn_id: self.turn_id.to_string(),
                    display,
                })
                .await;
        }
    }
}

/// Owns one conversation session: its history, the model and the tools
pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    history: ConversationHistory,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            registry,
            history: ConversationHistory::new(),
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Run one turn. Never fails.
    ///
    /// Empty input is not rejected here; surfaces are expected to filter it.
    pub async fn continue_conversation(&mut self, input: &str) -> TurnResult {
        self.run_turn(input, None).await
    }

    /// Run one turn, also sending every intermediate display (growing text,
    /// tool placeholder) to `updates` before the result is returned.
    pub async fn continue_conversation_streaming(
        &mut self,
        input: &str,
        updates: mpsc::Sender<TurnUpdate>,
    ) -> TurnResult {
        self.run_turn(input, Some(&updates)).await
    }

    async fn run_turn(
        &mut self,
        input: &str,
        sender: Option<&mpsc::Sender<TurnUpdate>>,
    ) -> TurnResult {
        let turn_id = new_turn_id();
        let start_time = Instant::now();

        info!(
            turn_id = %turn_id,
            history_len = self.history.len(),
            "Orchestrator: starting turn"
        );

        self.history.push_user(input);

        let updates = Updates {
            turn_id: &turn_id,
            sender,
        };

        match self.execute(&updates).await {
            Ok(outcome) => {
                self.history.push_assistant(outcome.history_text);

                info!(
                    turn_id = %turn_id,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Turn complete"
                );

                TurnResult::assistant(turn_id, outcome.display)
            }
            Err(e) => {
                error!(turn_id = %turn_id, error = %e, "Turn failed");
                TurnResult::assistant(turn_id, DisplayUnit::turn_failed())
            }
        }
    }

    async fn execute(&self, updates: &Updates<'_>) -> Result<TurnOutcome> {
        let request = ModelRequest {
            system_prompt: self.system_prompt.clone(),
            history: self.history.entries().to_vec(),
            tools: self.registry.declarations(),
        };

        match self.model.respond(&request).await? {
            ModelResponse::Text(stream) => {
                debug!(turn_id = %updates.turn_id, "Model answered with text");
                collect_text(stream, updates).await
            }
            ModelResponse::ToolCall(call) => {
                debug!(turn_id = %updates.turn_id, tool_name = %call.name, "Model selected a tool");
                self.run_tool(call, updates).await
            }
        }
    }

    async fn run_tool(&self, call: ToolCall, updates: &Updates<'_>) -> Result<TurnOutcome> {
        let mut staged = self.registry.invoke(&call.name, &call.arguments)?;
        let mut terminal = None;

        while let Some(stage) = staged.next().await {
            match stage {
                ToolStage::Pending => updates.emit(DisplayUnit::Loading).await,
                ToolStage::Terminal(display) => terminal = Some(display),
            }
        }

        let display = terminal.ok_or_else(|| {
            ChatError::ToolError(format!("{} ended without a result", call.name))
        })?;

        Ok(TurnOutcome {
            history_text: display.to_markdown(),
            display,
        })
    }
}

/// Accumulate streamed text until `Done`, skipping empty fragments.
async fn collect_text(mut stream: TextStream, updates: &Updates<'_>) -> Result<TurnOutcome> {
    let mut full_text = String::new();

    while let Some(chunk) = stream.next().await {
        match chunk? {
            TextChunk::Delta(fragment) if fragment.is_empty() => continue,
            TextChunk::Delta(fragment) => {
                full_text.push_str(&fragment);
                updates.emit(DisplayUnit::text(full_text.clone())).await;
            }
            TextChunk::Done => break,
        }
    }

    if full_text.is_empty() {
        return Err(ChatError::LlmError("model returned an empty answer".to_string()));
    }

    Ok(TurnOutcome {
        display: DisplayUnit::text(full_text.clone()),
        history_text: full_text,
    })
}

/// Builds sessions that share one model client and one tool registry
#[derive(Clone)]
pub struct SessionFactory {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
}

impl SessionFactory {
    pub fn new(model: Arc<dyn LanguageModel>, registry: Arc<ToolRegistry>) -> Self {
        Self { model, registry }
    }

    /// Wire the production stack: Gemini for the model, CoinGecko behind
    /// the response cache for market data.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let coingecko = CoinGeckoClient::new(&config.market, config.http_timeout)?;
        let market = CachedMarketApi::from_config(Arc::new(coingecko), &config.market);
        let resolver = Arc::new(DataResolver::new(Arc::new(market)));
        let registry = create_default_registry(resolver, config.market.top_list_size);

        let model = GeminiClient::new(&config.llm, config.http_timeout)?;

        info!(
            model = %config.llm.model,
            tools = ?registry.list(),
            "Session factory ready"
        );

        Ok(Self::new(Arc::new(model), Arc::new(registry)))
    }

    pub fn create(&self) -> Orchestrator {
        Orchestrator::new(self.model.clone(), self.registry.clone())
    }
}
