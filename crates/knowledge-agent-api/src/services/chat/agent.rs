use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::models::chat::ChatMessage;
use crate::services::llm::ChatModel;

use super::tools::ToolRegistry;

/// Upper bound on model/tool rounds for one request.
const MAX_AGENT_ROUNDS: usize = 8;

/// Drives the model in a tool-calling conversation until it produces a
/// final assistant message. The model decides when to stop; the loop only
/// executes the calls it issues and bounds the number of rounds.
pub struct ChatAgent<'a> {
    model: &'a dyn ChatModel,
    registry: &'a ToolRegistry,
}

impl<'a> ChatAgent<'a> {
    pub fn new(model: &'a dyn ChatModel, registry: &'a ToolRegistry) -> Self {
        Self { model, registry }
    }

    pub async fn run(&self, mut transcript: Vec<ChatMessage>) -> Result<String> {
        let definitions = self.registry.definitions();

        for round in 0..MAX_AGENT_ROUNDS {
            let turn = self.model.complete(&transcript, &definitions).await?;

            if turn.tool_calls.is_empty() {
                debug!(round, "agent produced final answer");
                return Ok(turn.content.unwrap_or_default());
            }

            transcript.push(ChatMessage {
                role: "assistant".to_string(),
                content: turn.content.clone().unwrap_or_default(),
                tool_calls: Some(turn.tool_calls.clone()),
                tool_call_id: None,
            });

            // All calls of one assistant turn run concurrently; results are
            // appended in the order the calls were issued.
            let results = join_all(turn.tool_calls.iter().map(|call| async {
                let output = self
                    .registry
                    .dispatch(&call.function.name, &call.function.arguments)
                    .await;
                (call.id.clone(), output)
            }))
            .await;

            for (call_id, output) in results {
                transcript.push(ChatMessage::tool_result(call_id, output));
            }
            debug!(round, calls = turn.tool_calls.len(), "agent round executed tools");
        }

        warn!("agent exhausted its tool rounds without a final answer");
        Ok("I wasn't able to finish researching this question. Please try asking it \
            again, perhaps more specifically."
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{FunctionCall, ToolCall};
    use crate::services::llm::{AssistantTurn, MockChatModel};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl super::super::tools::AgentTool for CountingTool {
        fn name(&self) -> &'static str {
            "lookup"
        }
        fn description(&self) -> &'static str {
            "test lookup"
        }
        fn parameters(&self) -> serde_json::Value {
            json!({ "type": "object", "properties": {} })
        }
        async fn call(&self, _arguments: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("lookup result".to_string())
        }
    }

    fn tool_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: "lookup".to_string(),
                arguments: "{}".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn returns_content_when_model_stops() {
        let mut model = MockChatModel::new();
        model.expect_complete().times(1).returning(|_, _| {
            Ok(AssistantTurn {
                content: Some("done".to_string()),
                tool_calls: vec![],
            })
        });

        let registry = ToolRegistry::new();
        let agent = ChatAgent::new(&model, &registry);
        let answer = agent
            .run(vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(answer, "done");
    }

    #[tokio::test]
    async fn executes_tools_then_finishes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool {
            calls: calls.clone(),
        }));

        let mut model = MockChatModel::new();
        let mut round = 0;
        model.expect_complete().times(2).returning(move |transcript, _| {
            round += 1;
            if round == 1 {
                Ok(AssistantTurn {
                    content: None,
                    tool_calls: vec![tool_call("call-1"), tool_call("call-2")],
                })
            } else {
                // both tool results must be in the transcript by round two
                let tool_messages = transcript
                    .iter()
                    .filter(|m| m.role == "tool")
                    .count();
                assert_eq!(tool_messages, 2);
                Ok(AssistantTurn {
                    content: Some("answered".to_string()),
                    tool_calls: vec![],
                })
            }
        });

        let agent = ChatAgent::new(&model, &registry);
        let answer = agent
            .run(vec![ChatMessage::user("question")])
            .await
            .unwrap();

        assert_eq!(answer, "answered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn round_exhaustion_yields_fallback_answer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool {
            calls: calls.clone(),
        }));

        let mut model = MockChatModel::new();
        model.expect_complete().returning(|_, _| {
            Ok(AssistantTurn {
                content: None,
                tool_calls: vec![tool_call("again")],
            })
        });

        let agent = ChatAgent::new(&model, &registry);
        let answer = agent.run(vec![ChatMessage::user("loop")]).await.unwrap();
        assert!(answer.contains("wasn't able to finish"));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_AGENT_ROUNDS);
    }
}
