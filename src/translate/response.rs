//!
//! Response translators (C3, non-streaming): Google → Anthropic, Anthropic → OpenAI.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use rand::Rng;

use crate::model::google::GoogleResponse;
use crate::model::openai::{
    OpenAiChoice, OpenAiResponse, OpenAiResponseFunctionCall, OpenAiResponseMessage, OpenAiResponseToolCall,
    OpenAiUsage,
};
use crate::model::{Block, Response, Role, StopReason, Usage};

/* --- Google -> Anthropic ---------------------------------------------------------------------- */

///
/// Convert a non-streaming Google response into the Anthropic pivot shape
/// per §4.3: `candidates[0]` only (see Open Question (a)).
pub fn google_to_anthropic(id: String, model: String, response: GoogleResponse) -> Response {
    let candidate = response.candidates.into_iter().next();

    let mut content = Vec::new();
    let mut has_tool_use = false;
    if let Some(candidate) = &candidate {
        if let Some(google_content) = &candidate.content {
            for part in &google_content.parts {
                if let Some(function_call) = &part.function_call {
                    has_tool_use = true;
                    content.push(Block::ToolUse {
                        id: function_call.id.clone().unwrap_or_else(|| format!("toolu_{}", rand::thread_rng().r#gen::<u32>())),
                        name: function_call.name.clone(),
                        input: function_call.args.clone(),
                        thought_signature: part.thought_signature.clone(),
                    });
                } else if let Some(text) = &part.text {
                    if part.thought == Some(true) {
                        content.push(Block::Thinking { thinking: text.clone(), signature: part.thought_signature.clone() });
                    } else {
                        content.push(Block::Text { text: text.clone() });
                    }
                }
            }
        }
    }

    let stop_reason = if has_tool_use {
        StopReason::ToolUse
    } else {
        match candidate.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            Some("SAFETY") | Some("RECITATION") => {
                tracing::warn!("upstream finish reason indicates content policy intervention");
                StopReason::EndTurn
            }
            _ => StopReason::EndTurn,
        }
    };

    let usage_metadata = response.usage_metadata.unwrap_or_default();
    let usage = Usage {
        input_tokens: usage_metadata.prompt_token_count.saturating_sub(usage_metadata.cached_content_token_count),
        output_tokens: usage_metadata.candidates_token_count,
        cache_read_input_tokens: usage_metadata.cached_content_token_count,
        cache_creation_input_tokens: 0,
    };

    Response {
        id,
        model,
        role: Role::Assistant,
        content,
        stop_reason,
        stop_sequence: None,
        usage,
        kind: "message".to_string(),
    }
}

/* --- Anthropic -> OpenAI ---------------------------------------------------------------------- */

///
/// Convert the Anthropic pivot response into an OpenAI chat-completions
/// response per §4.3.
pub fn anthropic_to_openai(created: i64, response: Response) -> OpenAiResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in &response.content {
        match block {
            Block::Text { text } => text_parts.push(text.clone()),
            Block::ToolUse { id, name, input, .. } => {
                tool_calls.push(OpenAiResponseToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: OpenAiResponseFunctionCall {
                        name: name.clone(),
                        arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                    },
                });
            }
            _ => {}
        }
    }

    let content = if tool_calls.is_empty() { Some(text_parts.join("")) } else { None };

    let finish_reason = match response.stop_reason {
        StopReason::ToolUse => "tool_calls",
        StopReason::MaxTokens => "length",
        StopReason::EndTurn | StopReason::StopSequence => "stop",
    };

    OpenAiResponse {
        id: format!("chatcmpl-{}", random_hex(16)),
        object: "chat.completion".to_string(),
        created,
        model: response.model,
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant".to_string(),
                content,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: OpenAiUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        },
        system_fingerprint: Some(format!("fp_{}", random_hex(8))),
    }
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes).map(|_| format!("{:02x}", rng.r#gen::<u8>())).collect()
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::google::{GoogleCandidate, GoogleContent, GoogleFunctionCall, GooglePart, GoogleUsageMetadata};
    use serde_json::json;

    #[test]
    fn google_to_anthropic_maps_usage_arithmetic() {
        let response = GoogleResponse {
            candidates: vec![GoogleCandidate {
                content: Some(GoogleContent { role: "model".to_string(), parts: vec![GooglePart { text: Some("hi".to_string()), ..Default::default() }] }),
                finish_reason: Some("STOP".to_string()),
            }],
            usage_metadata: Some(GoogleUsageMetadata { prompt_token_count: 100, candidates_token_count: 20, cached_content_token_count: 30 }),
        };
        let out = google_to_anthropic("msg_1".to_string(), "gemini-2.5-pro".to_string(), response);
        assert_eq!(out.usage.input_tokens, 70);
        assert_eq!(out.usage.output_tokens, 20);
        assert_eq!(out.usage.cache_read_input_tokens, 30);
        assert_eq!(out.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn tool_use_overrides_stop_finish_reason() {
        let response = GoogleResponse {
            candidates: vec![GoogleCandidate {
                content: Some(GoogleContent {
                    role: "model".to_string(),
                    parts: vec![GooglePart {
                        function_call: Some(GoogleFunctionCall { id: Some("call_1".to_string()), name: "lookup".to_string(), args: json!({}) }),
                        ..Default::default()
                    }],
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            usage_metadata: None,
        };
        let out = google_to_anthropic("msg_1".to_string(), "gemini-2.5-pro".to_string(), response);
        assert_eq!(out.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn anthropic_to_openai_sets_null_content_for_tool_only_response() {
        let response = Response {
            id: "msg_1".to_string(),
            model: "gpt-4o".to_string(),
            role: Role::Assistant,
            content: vec![Block::ToolUse { id: "call_1".to_string(), name: "lookup".to_string(), input: json!({"q": "x"}), thought_signature: None }],
            stop_reason: StopReason::ToolUse,
            stop_sequence: None,
            usage: Usage { input_tokens: 10, output_tokens: 5, cache_read_input_tokens: 0, cache_creation_input_tokens: 0 },
            kind: "message".to_string(),
        };
        let out = anthropic_to_openai(0, response);
        assert!(out.choices[0].message.content.is_none());
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(out.choices[0].message.tool_calls.as_ref().unwrap()[0].function.arguments, "{\"q\":\"x\"}");
    }

    #[test]
    fn anthropic_to_openai_maps_finish_reasons() {
        let base = Response {
            id: "msg_1".to_string(),
            model: "gpt-4o".to_string(),
            role: Role::Assistant,
            content: vec![Block::Text { text: "hi".to_string() }],
            stop_reason: StopReason::MaxTokens,
            stop_sequence: None,
            usage: Usage::default(),
            kind: "message".to_string(),
        };
        let out = anthropic_to_openai(0, base);
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("length"));
        assert_eq!(out.choices[0].message.content, Some("hi".to_string()));
    }
}
