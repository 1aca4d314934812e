//!
//! SSE pipeline (C5): Google upstream chunks → Anthropic events, and an
//! optional secondary pass re-framing those events as OpenAI stream chunks.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use std::time::{Duration, Instant};

use crate::cache::{SignatureCache, MIN_SIGNATURE_LEN};
use crate::model::google::{GoogleResponse, GoogleUsageMetadata};
use crate::model::openai::{OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta, OpenAiStreamFunctionCall, OpenAiStreamToolCall};
use crate::model::{
    ContentBlockDelta, ContentBlockPayload, DeltaUsage, ErrorPayload, MessageDeltaPayload, MessageStartPayload, Role,
    StopReason, StreamEvent, Usage,
};

/* --- constants --------------------------------------------------------------------------------*/

/** Idle-timeout supervisor poll interval (§4.5). */
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);
/** Idle duration after which a warning is logged once. */
pub const IDLE_WARN_AFTER: Duration = Duration::from_secs(120);
/** Idle duration after which the upstream read is cancelled. */
pub const IDLE_CANCEL_AFTER: Duration = Duration::from_secs(180);

/* --- Anthropic event pipeline ------------------------------------------------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    ToolUse,
}

///
/// Per-stream state machine converting Google upstream chunks into the
/// Anthropic SSE event sequence. One instance per HTTP request.
pub struct AnthropicEventPipeline {
    message_id: String,
    model: String,
    model_family: String,
    has_emitted_start: bool,
    next_block_index: u32,
    current_block: Option<(OpenBlock, u32)>,
    pending_thinking_signature: Option<String>,
    input_tokens: u32,
    output_tokens: u32,
    cache_read_tokens: u32,
    stop_reason: Option<StopReason>,
}

impl AnthropicEventPipeline {
    pub fn new(message_id: String, model: String, model_family: String) -> Self {
        Self {
            message_id,
            model,
            model_family,
            has_emitted_start: false,
            next_block_index: 0,
            current_block: None,
            pending_thinking_signature: None,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            stop_reason: None,
        }
    }

    pub fn has_emitted_start(&self) -> bool {
        self.has_emitted_start
    }

    /// Process one upstream chunk (either `{response: ...}` or bare), returning the
    /// Anthropic events it produces.
    pub fn ingest_chunk(&mut self, chunk: GoogleResponse, cache: &SignatureCache) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        self.ingest_usage(chunk.usage_metadata);

        if let Some(candidate) = chunk.candidates.into_iter().next() {
            if let Some(content) = candidate.content {
                for part in content.parts {
                    self.ensure_message_start(&mut events);

                    if part.thought == Some(true) {
                        self.open_thinking_block(&mut events);
                        if let Some(signature) = part.thought_signature.as_deref() {
                            if signature.len() >= MIN_SIGNATURE_LEN {
                                self.pending_thinking_signature = Some(signature.to_string());
                                cache.put_by_model_family(&self.model_family, signature);
                            }
                        }
                        if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                            events.push(StreamEvent::ContentBlockDelta {
                                index: self.current_block.unwrap().1,
                                delta: ContentBlockDelta::ThinkingDelta { thinking: text },
                            });
                        }
                    } else if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
                        self.flush_pending_signature(&mut events);
                        self.open_text_block(&mut events);
                        events.push(StreamEvent::ContentBlockDelta {
                            index: self.current_block.unwrap().1,
                            delta: ContentBlockDelta::TextDelta { text },
                        });
                    }

                    if let Some(function_call) = part.function_call {
                        self.flush_pending_signature(&mut events);
                        self.close_open_block(&mut events);
                        let index = self.open_block(OpenBlock::ToolUse);
                        let signature = part.thought_signature.filter(|s| s.len() >= MIN_SIGNATURE_LEN);
                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlockPayload::ToolUse {
                                id: function_call.id.clone().unwrap_or_default(),
                                name: function_call.name.clone(),
                                input: serde_json::json!({}),
                                thought_signature: signature.clone(),
                            },
                        });
                        events.push(StreamEvent::ContentBlockDelta {
                            index,
                            delta: ContentBlockDelta::InputJsonDelta {
                                partial_json: serde_json::to_string(&function_call.args).unwrap_or_else(|_| "{}".to_string()),
                            },
                        });
                        if let Some(signature) = &signature {
                            cache.put_by_tool_id(&function_call.id.clone().unwrap_or_default(), signature);
                        }
                        self.stop_reason = Some(StopReason::ToolUse);
                    }

                    if let Some(inline_data) = part.inline_data {
                        self.flush_pending_signature(&mut events);
                        self.close_open_block(&mut events);
                        let index = self.next_block_index;
                        self.next_block_index += 1;
                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: ContentBlockPayload::Image {
                                source: crate::model::ImageSource::Base64 { media_type: inline_data.mime_type, data: inline_data.data },
                            },
                        });
                        events.push(StreamEvent::ContentBlockStop { index });
                    }
                }
            }

            if let Some(finish_reason) = candidate.finish_reason {
                if self.stop_reason != Some(StopReason::ToolUse) {
                    self.stop_reason = match finish_reason.as_str() {
                        "MAX_TOKENS" => Some(StopReason::MaxTokens),
                        "STOP" => Some(StopReason::EndTurn),
                        _ => self.stop_reason,
                    };
                }
            }
        }

        events
    }

    fn ingest_usage(&mut self, usage: Option<GoogleUsageMetadata>) {
        if let Some(usage) = usage {
            self.input_tokens = usage.prompt_token_count;
            self.output_tokens = usage.candidates_token_count;
            self.cache_read_tokens = usage.cached_content_token_count;
        }
    }

    fn ensure_message_start(&mut self, events: &mut Vec<StreamEvent>) {
        if self.has_emitted_start {
            return;
        }
        self.has_emitted_start = true;
        events.push(StreamEvent::MessageStart {
            message: MessageStartPayload {
                id: self.message_id.clone(),
                kind: "message".to_string(),
                role: Role::Assistant,
                model: self.model.clone(),
                content: Vec::new(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: self.input_tokens.saturating_sub(self.cache_read_tokens),
                    output_tokens: 0,
                    cache_read_input_tokens: self.cache_read_tokens,
                    cache_creation_input_tokens: 0,
                },
            },
        });
    }

    fn open_block(&mut self, kind: OpenBlock) -> u32 {
        let index = self.next_block_index;
        self.next_block_index += 1;
        self.current_block = Some((kind, index));
        index
    }

    fn open_thinking_block(&mut self, events: &mut Vec<StreamEvent>) {
        if self.current_block.map(|(k, _)| k) == Some(OpenBlock::Thinking) {
            return;
        }
        self.close_open_block(events);
        let index = self.open_block(OpenBlock::Thinking);
        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlockPayload::Thinking { thinking: String::new() },
        });
    }

    fn open_text_block(&mut self, events: &mut Vec<StreamEvent>) {
        if self.current_block.map(|(k, _)| k) == Some(OpenBlock::Text) {
            return;
        }
        self.close_open_block(events);
        let index = self.open_block(OpenBlock::Text);
        events.push(StreamEvent::ContentBlockStart { index, content_block: ContentBlockPayload::Text { text: String::new() } });
    }

    fn flush_pending_signature(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(signature) = self.pending_thinking_signature.take() {
            if let Some((OpenBlock::Thinking, index)) = self.current_block {
                events.push(StreamEvent::ContentBlockDelta { index, delta: ContentBlockDelta::SignatureDelta { signature } });
            }
        }
    }

    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some((_, index)) = self.current_block.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
    }

    /// Flush at stream end: close any open block, emit `message_delta` + `message_stop`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.flush_pending_signature(&mut events);
        self.close_open_block(&mut events);
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaPayload { stop_reason: Some(self.stop_reason.unwrap_or(StopReason::EndTurn)), stop_sequence: None },
            usage: DeltaUsage { output_tokens: self.output_tokens },
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    /// A terminal `{type: "error", error: {...}}` event emitted after `message_start` (§7).
    pub fn error_event(message: &str, error_type: &str) -> StreamEvent {
        StreamEvent::Error { error: ErrorPayload { kind: error_type.to_string(), message: message.to_string() } }
    }
}

/* --- idle-timeout supervisor -------------------------------------------------------------------*/

#[derive(Debug, PartialEq, Eq)]
pub enum IdleStatus {
    Active,
    Warn,
    TimedOut { idle_secs: u64, chunks: u64, bytes: u64 },
}

///
/// Tracks time since the last upstream byte arrived. Polled on a fixed
/// interval by the HTTP surface; does not itself own a timer task.
pub struct IdleMonitor {
    last_activity: Instant,
    warned: bool,
    chunks: u64,
    bytes: u64,
}

impl IdleMonitor {
    pub fn new() -> Self {
        Self { last_activity: Instant::now(), warned: false, chunks: 0, bytes: 0 }
    }

    pub fn record_activity(&mut self, bytes: usize) {
        self.last_activity = Instant::now();
        self.warned = false;
        self.chunks += 1;
        self.bytes += bytes as u64;
    }

    pub fn poll(&mut self) -> IdleStatus {
        let idle = self.last_activity.elapsed();
        if idle >= IDLE_CANCEL_AFTER {
            return IdleStatus::TimedOut { idle_secs: idle.as_secs(), chunks: self.chunks, bytes: self.bytes };
        }
        if idle >= IDLE_WARN_AFTER && !self.warned {
            self.warned = true;
            return IdleStatus::Warn;
        }
        IdleStatus::Active
    }
}

impl Default for IdleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/* --- OpenAI re-framing ---------------------------------------------------------------------- */

///
/// Secondary state machine (§4.5) replaying the Anthropic event sequence as
/// OpenAI stream chunks, for `/v1/chat/completions` streaming requests.
pub struct OpenAiStreamReframer {
    id: String,
    fingerprint: String,
    model: String,
    created: i64,
    tool_call_count: u32,
    in_thinking: bool,
}

impl OpenAiStreamReframer {
    pub fn new(model: String, created: i64) -> Self {
        Self {
            id: format!("chatcmpl-{}", rand_hex(16)),
            fingerprint: format!("fp_{}", rand_hex(8)),
            model,
            created,
            tool_call_count: 0,
            in_thinking: false,
        }
    }

    pub fn reframe(&mut self, event: &StreamEvent) -> Option<OpenAiStreamChunk> {
        match event {
            StreamEvent::MessageStart { .. } => Some(self.chunk(OpenAiStreamDelta {
                role: Some("assistant".to_string()),
                content: Some(String::new()),
                tool_calls: None,
            }, None)),

            StreamEvent::ContentBlockStart { content_block: ContentBlockPayload::Thinking { .. }, .. } => {
                self.in_thinking = true;
                None
            }

            StreamEvent::ContentBlockStart { content_block: ContentBlockPayload::ToolUse { id, name, .. }, index } => {
                self.tool_call_count += 1;
                Some(self.chunk(
                    OpenAiStreamDelta {
                        role: None,
                        content: None,
                        tool_calls: Some(vec![OpenAiStreamToolCall {
                            index: *index,
                            id: Some(id.clone()),
                            call_type: Some("function".to_string()),
                            function: Some(OpenAiStreamFunctionCall { name: Some(name.clone()), arguments: Some(String::new()) }),
                        }]),
                    },
                    None,
                ))
            }

            StreamEvent::ContentBlockDelta { delta: ContentBlockDelta::TextDelta { text }, .. } if !self.in_thinking => {
                Some(self.chunk(OpenAiStreamDelta { role: None, content: Some(text.clone()), tool_calls: None }, None))
            }

            StreamEvent::ContentBlockDelta { delta: ContentBlockDelta::InputJsonDelta { partial_json }, index } => {
                let call_index = self.tool_call_count.saturating_sub(1);
                let _ = index;
                Some(self.chunk(
                    OpenAiStreamDelta {
                        role: None,
                        content: None,
                        tool_calls: Some(vec![OpenAiStreamToolCall {
                            index: call_index,
                            id: None,
                            call_type: None,
                            function: Some(OpenAiStreamFunctionCall { name: None, arguments: Some(partial_json.clone()) }),
                        }]),
                    },
                    None,
                ))
            }

            StreamEvent::ContentBlockDelta { delta: ContentBlockDelta::TextDelta { .. }, .. } => None,

            StreamEvent::ContentBlockDelta { delta: ContentBlockDelta::ThinkingDelta { .. } | ContentBlockDelta::SignatureDelta { .. }, .. } => None,

            StreamEvent::ContentBlockStop { .. } => {
                self.in_thinking = false;
                None
            }

            StreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.map(|reason| match reason {
                    StopReason::ToolUse => "tool_calls",
                    StopReason::MaxTokens => "length",
                    StopReason::EndTurn | StopReason::StopSequence => "stop",
                });
                let _ = usage;
                Some(self.chunk(OpenAiStreamDelta::default(), finish_reason.map(str::to_string)))
            }

            StreamEvent::MessageStop | StreamEvent::Error { .. } | StreamEvent::ContentBlockStart { .. } => None,
        }
    }

    fn chunk(&self, delta: OpenAiStreamDelta, finish_reason: Option<String>) -> OpenAiStreamChunk {
        OpenAiStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            system_fingerprint: Some(self.fingerprint.clone()),
            choices: vec![OpenAiStreamChoice { index: 0, delta, finish_reason }],
        }
    }
}

fn rand_hex(bytes: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..bytes).map(|_| format!("{:02x}", rng.r#gen::<u8>())).collect()
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::google::{GoogleCandidate, GoogleContent, GoogleFunctionCall, GooglePart, GoogleUsageMetadata};

    fn cache() -> SignatureCache {
        SignatureCache::new()
    }

    fn chunk_with_parts(parts: Vec<GooglePart>, finish_reason: Option<&str>) -> GoogleResponse {
        GoogleResponse {
            candidates: vec![GoogleCandidate {
                content: Some(GoogleContent { role: "model".to_string(), parts }),
                finish_reason: finish_reason.map(str::to_string),
            }],
            usage_metadata: Some(GoogleUsageMetadata { prompt_token_count: 50, candidates_token_count: 1, cached_content_token_count: 0 }),
        }
    }

    #[test]
    fn first_part_emits_message_start() {
        let mut pipeline = AnthropicEventPipeline::new("msg_1".to_string(), "gemini-2.5-pro".to_string(), "gemini-2.5".to_string());
        let chunk = chunk_with_parts(vec![GooglePart { text: Some("hi".to_string()), ..Default::default() }], None);
        let events = pipeline.ingest_chunk(chunk, &cache());
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(pipeline.has_emitted_start());
    }

    #[test]
    fn block_indices_are_monotonic_across_transitions() {
        let mut pipeline = AnthropicEventPipeline::new("msg_1".to_string(), "gemini-2.5-pro".to_string(), "gemini-2.5".to_string());
        let chunk = chunk_with_parts(
            vec![
                GooglePart { text: Some("hello".to_string()), ..Default::default() },
                GooglePart {
                    function_call: Some(GoogleFunctionCall { id: Some("call_1".to_string()), name: "lookup".to_string(), args: serde_json::json!({}) }),
                    ..Default::default()
                },
            ],
            Some("STOP"),
        );
        let events = pipeline.ingest_chunk(chunk, &cache());
        let starts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockStart { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![0, 1]);
        let stops: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ContentBlockStop { index } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(stops, vec![0]);
    }

    #[test]
    fn tool_call_sets_stop_reason_overriding_stop() {
        let mut pipeline = AnthropicEventPipeline::new("msg_1".to_string(), "gemini-2.5-pro".to_string(), "gemini-2.5".to_string());
        let chunk = chunk_with_parts(
            vec![GooglePart {
                function_call: Some(GoogleFunctionCall { id: Some("call_1".to_string()), name: "lookup".to_string(), args: serde_json::json!({}) }),
                ..Default::default()
            }],
            Some("STOP"),
        );
        pipeline.ingest_chunk(chunk, &cache());
        let events = pipeline.finish();
        match &events[events.len() - 2] {
            StreamEvent::MessageDelta { delta, .. } => assert_eq!(delta.stop_reason, Some(StopReason::ToolUse)),
            other => panic!("expected message_delta, got {other:?}"),
        }
    }

    #[test]
    fn thinking_signature_flushed_before_closing_block() {
        let mut pipeline = AnthropicEventPipeline::new("msg_1".to_string(), "gemini-2.5-pro".to_string(), "gemini-2.5".to_string());
        let chunk = chunk_with_parts(
            vec![
                GooglePart { thought: Some(true), text: Some("reasoning".to_string()), thought_signature: Some("SIGNATURELONGENOUGH".to_string()), ..Default::default() },
                GooglePart { text: Some("answer".to_string()), ..Default::default() },
            ],
            None,
        );
        let events = pipeline.ingest_chunk(chunk, &cache());
        let has_signature_delta = events.iter().any(|e| matches!(e, StreamEvent::ContentBlockDelta { delta: ContentBlockDelta::SignatureDelta { .. }, .. }));
        assert!(has_signature_delta);
    }

    #[test]
    fn empty_stream_never_emits_start() {
        let pipeline = AnthropicEventPipeline::new("msg_1".to_string(), "gemini-2.5-pro".to_string(), "gemini-2.5".to_string());
        assert!(!pipeline.has_emitted_start());
    }

    #[test]
    fn idle_monitor_warns_then_times_out() {
        let mut monitor = IdleMonitor::new();
        monitor.last_activity = Instant::now() - Duration::from_secs(125);
        assert_eq!(monitor.poll(), IdleStatus::Warn);
        assert_eq!(monitor.poll(), IdleStatus::Active);
        monitor.last_activity = Instant::now() - Duration::from_secs(181);
        match monitor.poll() {
            IdleStatus::TimedOut { idle_secs, .. } => assert!(idle_secs >= 180),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn reframer_drops_thinking_deltas() {
        let mut reframer = OpenAiStreamReframer::new("gpt-4o".to_string(), 0);
        let start_event = StreamEvent::ContentBlockStart { index: 0, content_block: ContentBlockPayload::Thinking { thinking: String::new() } };
        assert!(reframer.reframe(&start_event).is_none());
        let delta_event = StreamEvent::ContentBlockDelta { index: 0, delta: ContentBlockDelta::ThinkingDelta { thinking: "reasoning".to_string() } };
        assert!(reframer.reframe(&delta_event).is_none());
    }

    #[test]
    fn reframer_emits_tool_call_chunks() {
        let mut reframer = OpenAiStreamReframer::new("gpt-4o".to_string(), 0);
        let start = StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlockPayload::ToolUse { id: "call_1".to_string(), name: "lookup".to_string(), input: serde_json::json!({}), thought_signature: None },
        };
        let chunk = reframer.reframe(&start).unwrap();
        assert_eq!(chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0].function.as_ref().unwrap().name.as_deref(), Some("lookup"));

        let delta = StreamEvent::ContentBlockDelta { index: 0, delta: ContentBlockDelta::InputJsonDelta { partial_json: "{\"q\":1}".to_string() } };
        let chunk = reframer.reframe(&delta).unwrap();
        assert_eq!(chunk.choices[0].delta.tool_calls.as_ref().unwrap()[0].function.as_ref().unwrap().arguments.as_deref(), Some("{\"q\":1}"));
    }
}
