//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；工具调用走原生
//! function calling：响应携带 tool_calls 时映射为 Action::ToolCall，否则取文本。
//! thought / confidence 为一次带 JSON 指令的补全调用，因此 supports_deliberation 为 true。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionMessageToolCalls, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{
    Action, ConfidenceAssessment, ConfidenceRecommendation, ReasoningClient, Thought,
    ToolDefinition,
};
use crate::session::{Message, Role, ToolCallRequest};

/// OpenAI 兼容客户端：持有 Client，model 由每次调用传入（随会话持久化）
pub struct OpenAiReasoningClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiReasoningClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
        }
    }

    /// 会话消息转 API 格式；对话未以 system 开头时补上 system_prompt
    fn to_openai_messages(
        &self,
        system_prompt: &str,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if messages.first().map(|m| m.role != Role::System).unwrap_or(true) {
            out.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| e.to_string())?,
            ));
        }
        for m in messages {
            let converted = match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
                Role::Assistant => match &m.tool_call {
                    // 工具调用以文本形式回放（请求侧不重建 tool_calls 结构，
                    // 对应的 tool 消息紧随其后，端点按普通上下文理解）
                    Some(call) => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(format!(
                                "Tool call: {} with arguments {}",
                                call.name, call.arguments
                            ))
                            .build()
                            .map_err(|e| e.to_string())?,
                    ),
                    None => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(|e| e.to_string())?,
                    ),
                },
                Role::Tool => ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
            };
            out.push(converted);
        }
        Ok(out)
    }

    fn to_openai_tools(&self, tools: &[ToolDefinition]) -> Result<Vec<ChatCompletionTools>, String> {
        tools
            .iter()
            .map(|t| {
                let function = FunctionObjectArgs::default()
                    .name(t.name.clone())
                    .description(t.description.clone())
                    .parameters(t.parameters.clone())
                    .build()
                    .map_err(|e| e.to_string())?;
                Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
            })
            .collect()
    }

    /// 单轮无工具补全，thought / confidence 阶段共用
    async fn complete_once(&self, model: &str, prompt: String) -> Result<String, String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(|e| e.to_string())?,
            )])
            .build()
            .map_err(|e| e.to_string())?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

/// 从模型回复中提取 JSON 块（```json 围栏或首尾大括号）
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start <= end).then(|| &trimmed[start..=end])
}

#[async_trait]
impl ReasoningClient for OpenAiReasoningClient {
    async fn generate_action(
        &self,
        model: &str,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Action, String> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(model)
            .messages(self.to_openai_messages(system_prompt, messages)?);
        if !tools.is_empty() {
            builder.tools(self.to_openai_tools(tools)?);
        }
        let request = builder.build().map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;
        let message = response
            .choices
            .first()
            .map(|c| c.message.clone())
            .ok_or_else(|| "empty completion response".to_string())?;

        if let Some(ChatCompletionMessageToolCalls::Function(call)) =
            message.tool_calls.as_ref().and_then(|c| c.first())
        {
            // 参数解析失败时保留原文交给执行器拒绝，走调用层失败路径
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::String(call.function.arguments.clone()));
            return Ok(Action::ToolCall(ToolCallRequest {
                name: call.function.name.clone(),
                arguments,
                id: call.id.clone(),
            }));
        }
        Ok(Action::Text(message.content.unwrap_or_default()))
    }

    async fn generate_thought(
        &self,
        model: &str,
        goal: &str,
        messages: &[Message],
    ) -> Result<Thought, String> {
        let transcript_tail: Vec<String> = messages
            .iter()
            .rev()
            .take(6)
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect();
        let prompt = format!(
            "Goal: {goal}\nRecent context (newest first):\n{}\n\n\
             Think about the next step. Respond with only a JSON object: \
             {{\"thought\": \"...\", \"confidence\": 0.0-1.0, \"suggested_action\": \"...\"}}",
            transcript_tail.join("\n")
        );
        let reply = self.complete_once(model, prompt).await?;
        let json = extract_json(&reply).ok_or_else(|| format!("no JSON in thought reply: {reply}"))?;
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
        Ok(Thought {
            content: value["thought"].as_str().unwrap_or_default().to_string(),
            confidence: value["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
            suggested_action: value["suggested_action"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn assess_confidence(
        &self,
        model: &str,
        goal: &str,
        action_summary: &str,
    ) -> Result<ConfidenceAssessment, String> {
        let prompt = format!(
            "Goal: {goal}\nJust taken: {action_summary}\n\n\
             Assess whether this action moves the goal forward. Respond with only a JSON object: \
             {{\"score\": 0.0-1.0, \"recommendation\": \"proceed\"|\"abort\", \"rationale\": \"...\"}}"
        );
        let reply = self.complete_once(model, prompt).await?;
        let json =
            extract_json(&reply).ok_or_else(|| format!("no JSON in confidence reply: {reply}"))?;
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
        let recommendation = match value["recommendation"].as_str().unwrap_or("proceed") {
            "abort" => ConfidenceRecommendation::Abort,
            _ => ConfidenceRecommendation::Proceed,
        };
        Ok(ConfidenceAssessment {
            score: value["score"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
            recommendation,
            rationale: value["rationale"].as_str().unwrap_or_default().to_string(),
        })
    }

    fn supports_deliberation(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_fenced() {
        let text = "Sure.\n```json\n{\"thought\": \"x\"}\n```";
        assert_eq!(extract_json(text), Some("{\"thought\": \"x\"}"));
    }

    #[test]
    fn test_extract_json_bare() {
        let text = "prefix {\"a\": 1} suffix";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
        assert_eq!(extract_json("no json here"), None);
    }
}
