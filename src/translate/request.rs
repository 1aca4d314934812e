//!
//! Request translators (C2): OpenAI → Anthropic, and Anthropic → Google.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{json, Value};

use crate::cache::SignatureCache;
use crate::config::LogLevel;
use crate::error::{ProxyError, Result};
use crate::model::google::{
    GenerationConfig, GoogleContent, GoogleFunctionCall, GoogleFunctionCallingConfig,
    GoogleFunctionDeclaration, GoogleFunctionResponse, GoogleInlineData, GooglePart, GoogleRequest,
    GoogleSystemInstruction, GoogleThinkingConfig, GoogleTool, GoogleToolConfig,
};
use crate::model::openai::{
    OpenAiContent, OpenAiMessage, OpenAiRequest, OpenAiStop, OpenAiTool, OpenAiToolChoice,
    OpenAiToolFunction,
};
use crate::model::{
    Block, Content, ImageSource, Message, Request, Role, Thinking, Tool, ToolChoice,
    DEFAULT_THINKING_BUDGET,
};
use crate::schema;

/* --- constants --------------------------------------------------------------------------------*/

/** `max_tokens` applied when the client supplies neither `max_tokens` nor `max_completion_tokens`. */
const DEFAULT_MAX_TOKENS: u32 = 4096;

/* --- OpenAI -> Anthropic ---------------------------------------------------------------------- */

///
/// Converts an inbound OpenAI chat-completions request into the Anthropic
/// pivot shape, lifting `system` messages to a top-level field and re-rolling
/// tool/function messages per §4.2.
pub struct OpenAiToAnthropicConverter {
    log_level: LogLevel,
}

impl OpenAiToAnthropicConverter {
    pub fn new(log_level: LogLevel) -> Self {
        Self { log_level }
    }

    pub fn convert(&self, request: OpenAiRequest, enable_thinking: bool) -> Result<Request> {
        self.debug(&format!("converting {} OpenAI message(s)", request.messages.len()));

        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for message in request.messages {
            if message.role == "system" {
                if let Some(text) = Self::content_to_text(message.content) {
                    system_parts.push(text);
                }
                continue;
            }
            messages.push(self.convert_message(message)?);
        }

        let system = if system_parts.is_empty() { None } else { Some(system_parts.join("\n\n")) };

        let max_tokens = request.max_completion_tokens.or(request.max_tokens).unwrap_or(DEFAULT_MAX_TOKENS);

        let stop_sequences = request.stop.map(|stop| match stop {
            OpenAiStop::One(s) => vec![s],
            OpenAiStop::Many(v) => v,
        });

        let tools = self.convert_tools(request.tools, request.functions)?;
        let tool_choice = self.convert_tool_choice(request.tool_choice.or(request.function_call));

        let thinking = if enable_thinking {
            Some(Thinking { kind: "enabled".to_string(), budget_tokens: DEFAULT_THINKING_BUDGET })
        } else {
            None
        };

        Ok(Request {
            model: request.model,
            messages,
            system,
            max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences,
            tools,
            tool_choice,
            thinking,
            stream: request.stream.unwrap_or(false),
        })
    }

    fn convert_message(&self, message: OpenAiMessage) -> Result<Message> {
        match message.role.as_str() {
            "tool" | "function" => {
                let tool_use_id = message
                    .tool_call_id
                    .or(message.name)
                    .unwrap_or_else(|| format!("toolu_{}", rand::random::<u32>()));
                let content = Self::content_to_text(message.content).unwrap_or_default();
                Ok(Message {
                    role: Role::User,
                    content: Content::Blocks(vec![Block::ToolResult { tool_use_id, content }]),
                })
            }
            "assistant" => {
                let mut blocks = Vec::new();
                if let Some(text) = Self::content_to_text(message.content) {
                    if !text.is_empty() {
                        blocks.push(Block::Text { text });
                    }
                }
                if let Some(tool_calls) = message.tool_calls {
                    for call in tool_calls {
                        let id = call.id.unwrap_or_else(|| format!("toolu_{}", rand::random::<u32>()));
                        let input = Self::parse_tool_arguments(call.function.arguments)?;
                        blocks.push(Block::ToolUse {
                            id,
                            name: call.function.name,
                            input,
                            thought_signature: None,
                        });
                    }
                }
                Ok(Message { role: Role::Assistant, content: Content::Blocks(blocks) })
            }
            _ => {
                let images = message.content_images();
                let text = Self::content_to_text(message.content).unwrap_or_default();
                let blocks = Self::image_blocks(images);
                let mut content_blocks = Vec::new();
                if !text.is_empty() {
                    content_blocks.push(Block::Text { text });
                }
                content_blocks.extend(blocks);
                Ok(Message { role: Role::User, content: Content::Blocks(content_blocks) })
            }
        }
    }

    /// Parse OpenAI tool-call arguments: a JSON string is parsed, a value passes through.
    fn parse_tool_arguments(arguments: Value) -> Result<Value> {
        match arguments {
            Value::String(s) => {
                serde_json::from_str(&s).map_err(|_| ProxyError::BadRequest("invalid_tool_arguments".to_string()))
            }
            other => Ok(other),
        }
    }

    fn content_to_text(content: Option<OpenAiContent>) -> Option<String> {
        match content {
            Some(OpenAiContent::String(s)) => Some(s),
            Some(OpenAiContent::Array(blocks)) => {
                let text: String = blocks
                    .into_iter()
                    .filter(|b| b.block_type == "text")
                    .filter_map(|b| b.text)
                    .collect::<Vec<_>>()
                    .join("");
                Some(text)
            }
            None => None,
        }
    }

    fn image_blocks(images: Vec<String>) -> Vec<Block> {
        images.into_iter().map(|url| Block::Image { source: Self::image_source_from_url(url) }).collect()
    }

    fn image_source_from_url(url: String) -> ImageSource {
        if let Some(rest) = url.strip_prefix("data:") {
            if let Some((media_type, data)) = rest.split_once(";base64,") {
                return ImageSource::Base64 { media_type: media_type.to_string(), data: data.to_string() };
            }
        }
        ImageSource::Url { url }
    }

    fn convert_tools(&self, tools: Option<Vec<OpenAiTool>>, functions: Option<Vec<OpenAiToolFunction>>) -> Result<Option<Vec<Tool>>> {
        let mut out = Vec::new();
        if let Some(tools) = tools {
            for tool in tools {
                out.push(Tool {
                    name: tool.function.name,
                    description: tool.function.description,
                    input_schema: schema::sanitize(&tool.function.parameters),
                });
            }
        }
        if let Some(functions) = functions {
            for function in functions {
                out.push(Tool {
                    name: function.name,
                    description: function.description,
                    input_schema: schema::sanitize(&function.parameters),
                });
            }
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    fn convert_tool_choice(&self, choice: Option<OpenAiToolChoice>) -> Option<ToolChoice> {
        match choice {
            None => None,
            Some(OpenAiToolChoice::String(s)) => match s.as_str() {
                "none" => None,
                "required" => Some(ToolChoice::Any),
                _ => Some(ToolChoice::Auto),
            },
            Some(OpenAiToolChoice::Object(obj)) => {
                let name = obj.function.map(|f| f.name).or(obj.name);
                name.map(|name| ToolChoice::Tool { name })
            }
        }
    }

    fn debug(&self, msg: &str) {
        if self.log_level.is_trace_enabled() {
            tracing::debug!("[TRACE] {}", msg);
        }
    }
}

/* content_images helper lives on OpenAiMessage to keep conversion free functions small */
impl OpenAiMessage {
    fn content_images(&self) -> Vec<String> {
        match &self.content {
            Some(OpenAiContent::Array(blocks)) => blocks
                .iter()
                .filter(|b| b.block_type == "image_url")
                .filter_map(|b| b.image_url.as_ref().map(|u| u.url.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/* --- Anthropic -> Google ---------------------------------------------------------------------- */

///
/// Converts the Anthropic pivot into the upstream Google request shape,
/// re-injecting thinking signatures from C1 when a `tool_use` block lacks one.
pub struct AnthropicToGoogleConverter<'a> {
    cache: &'a SignatureCache,
    model_family: String,
}

impl<'a> AnthropicToGoogleConverter<'a> {
    pub fn new(cache: &'a SignatureCache, model_family: impl Into<String>) -> Self {
        Self { cache, model_family: model_family.into() }
    }

    pub fn convert(&self, request: Request) -> Result<GoogleRequest> {
        let mut contents = Vec::new();
        let mut seen_tool_uses = std::collections::HashMap::new();
        for message in request.messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            let blocks = message.content.blocks();
            for block in &blocks {
                if let Block::ToolUse { id, name, .. } = block {
                    seen_tool_uses.insert(id.clone(), name.clone());
                }
            }
            let parts = self.convert_blocks(blocks, &seen_tool_uses)?;
            contents.push(GoogleContent { role: role.to_string(), parts });
        }

        let system_instruction = request
            .system
            .map(|text| GoogleSystemInstruction { parts: vec![GooglePart { text: Some(text), ..Default::default() }] });

        let tools = request.tools.map(|tools| {
            vec![GoogleTool {
                function_declarations: tools
                    .into_iter()
                    .map(|tool| GoogleFunctionDeclaration {
                        name: tool.name,
                        description: tool.description,
                        parameters: schema::sanitize(&tool.input_schema),
                    })
                    .collect(),
            }]
        });

        let tool_config = request.tool_choice.map(|choice| match choice {
            ToolChoice::Auto => GoogleToolConfig {
                function_calling_config: GoogleFunctionCallingConfig { mode: "AUTO".to_string(), allowed_function_names: None },
            },
            ToolChoice::Any => GoogleToolConfig {
                function_calling_config: GoogleFunctionCallingConfig { mode: "ANY".to_string(), allowed_function_names: None },
            },
            ToolChoice::Tool { name } => GoogleToolConfig {
                function_calling_config: GoogleFunctionCallingConfig {
                    mode: "ANY".to_string(),
                    allowed_function_names: Some(vec![name]),
                },
            },
        });

        let thinking_config = request.thinking.as_ref().filter(|t| t.kind == "enabled").map(|t| GoogleThinkingConfig {
            thinking_budget: t.budget_tokens,
        });

        let generation_config = GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop_sequences,
            thinking_config,
        };

        Ok(GoogleRequest { contents, system_instruction, tools, tool_config, generation_config })
    }

    fn convert_blocks(&self, blocks: Vec<Block>, seen_tool_uses: &std::collections::HashMap<String, String>) -> Result<Vec<GooglePart>> {
        let mut parts = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block {
                Block::Text { text } => parts.push(GooglePart { text: Some(text), ..Default::default() }),
                Block::ToolUse { id, name, input, thought_signature } => {
                    let signature = thought_signature.or_else(|| self.cache.resolve(&id, &self.model_family));
                    parts.push(GooglePart {
                        function_call: Some(GoogleFunctionCall { id: Some(id), name, args: input }),
                        thought_signature: signature,
                        ..Default::default()
                    });
                }
                Block::ToolResult { tool_use_id, content } => {
                    let Some(tool_name) = seen_tool_uses.get(&tool_use_id) else {
                        return Err(ProxyError::BadRequest("dangling_tool_result".to_string()));
                    };
                    parts.push(GooglePart {
                        function_response: Some(GoogleFunctionResponse {
                            id: Some(tool_use_id),
                            name: tool_name.clone(),
                            response: json!({ "content": content }),
                        }),
                        ..Default::default()
                    });
                }
                Block::Image { source: ImageSource::Base64 { media_type, data } } => {
                    parts.push(GooglePart {
                        inline_data: Some(GoogleInlineData { mime_type: media_type, data }),
                        ..Default::default()
                    });
                }
                Block::Image { source: ImageSource::Url { .. } } => {
                    return Err(ProxyError::BadRequest("image_url_not_supported".to_string()));
                }
                Block::Thinking { .. } => {
                    tracing::warn!("dropping thinking block on request re-send");
                }
            }
        }
        Ok(parts)
    }
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use crate::model::openai::{OpenAiFunction, OpenAiMessage, OpenAiToolCall};

    fn converter() -> OpenAiToAnthropicConverter {
        OpenAiToAnthropicConverter::new(LogLevel::Info)
    }

    fn openai_request(messages: Vec<OpenAiMessage>) -> OpenAiRequest {
        OpenAiRequest {
            model: "gemini-2.5-pro".to_string(),
            messages,
            max_tokens: None,
            max_completion_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            stream: None,
            tools: None,
            tool_choice: None,
            functions: None,
            function_call: None,
        }
    }

    fn user_message(text: &str) -> OpenAiMessage {
        OpenAiMessage {
            role: "user".to_string(),
            content: Some(OpenAiContent::String(text.to_string())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn concatenates_system_messages() {
        let mut system = user_message("hi");
        system.role = "system".to_string();
        system.content = Some(OpenAiContent::String("one".to_string()));
        let mut system2 = user_message("hi");
        system2.role = "system".to_string();
        system2.content = Some(OpenAiContent::String("two".to_string()));
        let req = openai_request(vec![system, system2, user_message("hello")]);
        let out = converter().convert(req, false).unwrap();
        assert_eq!(out.system, Some("one\n\ntwo".to_string()));
        assert_eq!(out.messages.len(), 1);
    }

    #[test]
    fn max_tokens_falls_back_through_chain() {
        let mut req = openai_request(vec![user_message("hi")]);
        req.max_tokens = None;
        req.max_completion_tokens = None;
        let out = converter().convert(req, false).unwrap();
        assert_eq!(out.max_tokens, DEFAULT_MAX_TOKENS);

        let mut req = openai_request(vec![user_message("hi")]);
        req.max_completion_tokens = Some(777);
        req.max_tokens = Some(111);
        let out = converter().convert(req, false).unwrap();
        assert_eq!(out.max_tokens, 777);
    }

    #[test]
    fn tool_role_message_becomes_user_tool_result() {
        let msg = OpenAiMessage {
            role: "tool".to_string(),
            content: Some(OpenAiContent::String("42".to_string())),
            name: None,
            tool_calls: None,
            tool_call_id: Some("call_1".to_string()),
        };
        let out = converter().convert(openai_request(vec![msg]), false).unwrap();
        let message = &out.messages[0];
        assert_eq!(message.role, Role::User);
        match &message.content {
            Content::Blocks(blocks) => match &blocks[0] {
                Block::ToolResult { tool_use_id, content } => {
                    assert_eq!(tool_use_id, "call_1");
                    assert_eq!(content, "42");
                }
                other => panic!("expected tool_result, got {other:?}"),
            },
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[test]
    fn assistant_tool_calls_become_tool_use_blocks() {
        let msg = OpenAiMessage {
            role: "assistant".to_string(),
            content: Some(OpenAiContent::String("checking".to_string())),
            name: None,
            tool_calls: Some(vec![OpenAiToolCall {
                id: Some("call_1".to_string()),
                call_type: Some("function".to_string()),
                function: OpenAiFunction { name: "lookup".to_string(), arguments: json!({"q": "x"}) },
            }]),
            tool_call_id: None,
        };
        let out = converter().convert(openai_request(vec![msg]), false).unwrap();
        match &out.messages[0].content {
            Content::Blocks(blocks) => {
                assert!(matches!(blocks[0], Block::Text { .. }));
                assert!(matches!(blocks[1], Block::ToolUse { .. }));
            }
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[test]
    fn invalid_tool_arguments_string_fails() {
        let msg = OpenAiMessage {
            role: "assistant".to_string(),
            content: None,
            name: None,
            tool_calls: Some(vec![OpenAiToolCall {
                id: Some("call_1".to_string()),
                call_type: None,
                function: OpenAiFunction { name: "lookup".to_string(), arguments: Value::String("{not json".to_string()) },
            }]),
            tool_call_id: None,
        };
        let err = converter().convert(openai_request(vec![msg]), false).unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(m) if m == "invalid_tool_arguments"));
    }

    #[test]
    fn thinking_enabled_when_caller_passes_true() {
        let mut req = openai_request(vec![user_message("hi")]);
        req.model = "gemini-3-pro".to_string();
        let out = converter().convert(req, true).unwrap();
        assert!(out.thinking.is_some());
        assert_eq!(out.thinking.unwrap().budget_tokens, DEFAULT_THINKING_BUDGET);
    }

    #[test]
    fn thinking_disabled_when_caller_passes_false() {
        let mut req = openai_request(vec![user_message("hi")]);
        req.model = "gemini-3-pro".to_string();
        let out = converter().convert(req, false).unwrap();
        assert!(out.thinking.is_none());
    }

    #[test]
    fn data_uri_image_becomes_base64_source() {
        let msg = OpenAiMessage {
            role: "user".to_string(),
            content: Some(OpenAiContent::Array(vec![crate::model::openai::OpenAiContentBlock {
                block_type: "image_url".to_string(),
                text: None,
                image_url: Some(crate::model::openai::ImageUrl { url: "data:image/png;base64,QUJD".to_string() }),
            }])),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        };
        let out = converter().convert(openai_request(vec![msg]), false).unwrap();
        match &out.messages[0].content {
            Content::Blocks(blocks) => match &blocks[0] {
                Block::Image { source: ImageSource::Base64 { media_type, data } } => {
                    assert_eq!(media_type, "image/png");
                    assert_eq!(data, "QUJD");
                }
                other => panic!("expected base64 image, got {other:?}"),
            },
            other => panic!("expected blocks, got {other:?}"),
        }
    }

    #[test]
    fn anthropic_to_google_rejects_image_url() {
        let cache = SignatureCache::new();
        let request = Request {
            model: "gemini-2.5-pro".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: Content::Blocks(vec![Block::Image { source: ImageSource::Url { url: "https://x/y.png".to_string() } }]),
            }],
            system: None,
            max_tokens: 100,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: false,
        };
        let converter = AnthropicToGoogleConverter::new(&cache, "gemini-2.5");
        let err = converter.convert(request).unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(m) if m == "image_url_not_supported"));
    }

    #[test]
    fn anthropic_to_google_reinjects_cached_signature() {
        let cache = SignatureCache::new();
        cache.put_by_tool_id("call_1", "CACHEDSIGNATURE");
        let request = Request {
            model: "gemini-2.5-pro".to_string(),
            messages: vec![Message {
                role: Role::Assistant,
                content: Content::Blocks(vec![Block::ToolUse {
                    id: "call_1".to_string(),
                    name: "lookup".to_string(),
                    input: json!({}),
                    thought_signature: None,
                }]),
            }],
            system: None,
            max_tokens: 100,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: false,
        };
        let converter = AnthropicToGoogleConverter::new(&cache, "gemini-2.5");
        let google = converter.convert(request).unwrap();
        let part = &google.contents[0].parts[0];
        assert_eq!(part.thought_signature.as_deref(), Some("CACHEDSIGNATURE"));
    }

    #[test]
    fn anthropic_to_google_rejects_dangling_tool_result() {
        let cache = SignatureCache::new();
        let request = Request {
            model: "gemini-2.5-pro".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: Content::Blocks(vec![Block::ToolResult {
                    tool_use_id: "call_unknown".to_string(),
                    content: "42".to_string(),
                }]),
            }],
            system: None,
            max_tokens: 100,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: false,
        };
        let converter = AnthropicToGoogleConverter::new(&cache, "gemini-2.5");
        let err = converter.convert(request).unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(m) if m == "dangling_tool_result"));
    }

    #[test]
    fn anthropic_to_google_accepts_tool_result_referencing_prior_tool_use() {
        let cache = SignatureCache::new();
        let request = Request {
            model: "gemini-2.5-pro".to_string(),
            messages: vec![
                Message {
                    role: Role::Assistant,
                    content: Content::Blocks(vec![Block::ToolUse {
                        id: "call_1".to_string(),
                        name: "lookup".to_string(),
                        input: json!({}),
                        thought_signature: None,
                    }]),
                },
                Message {
                    role: Role::User,
                    content: Content::Blocks(vec![Block::ToolResult {
                        tool_use_id: "call_1".to_string(),
                        content: "42".to_string(),
                    }]),
                },
            ],
            system: None,
            max_tokens: 100,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            stream: false,
        };
        let converter = AnthropicToGoogleConverter::new(&cache, "gemini-2.5");
        let google = converter.convert(request).unwrap();
        let function_response = google.contents[1].parts[0].function_response.as_ref().unwrap();
        assert_eq!(function_response.name, "lookup");
        assert_eq!(function_response.id.as_deref(), Some("call_1"));
    }
}
