//!
//! Google Generative-AI (Cloud Code) wire types.
//!
//! `GooglePart` is a flat struct with every field optional rather than a
//! tagged enum: that is how the real wire objects look, and matching that
//! shape keeps (de)serialization honest about which fields can co-occur on
//! a single part (e.g. `text` and `thought` together).
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::{Deserialize, Serialize};
use serde_json::Value;

/* --- request types ---------------------------------------------------------------------------*/

#[derive(Debug, Clone, Serialize)]
pub struct GoogleRequest {
    pub contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "systemInstruction")]
    pub system_instruction: Option<GoogleSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "toolConfig")]
    pub tool_config: Option<GoogleToolConfig>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleContent {
    pub role: String,
    pub parts: Vec<GooglePart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GooglePart {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thought: Option<bool>,
    #[serde(rename = "thoughtSignature", skip_serializing_if = "Option::is_none", default)]
    pub thought_signature: Option<String>,
    #[serde(rename = "functionCall", skip_serializing_if = "Option::is_none", default)]
    pub function_call: Option<GoogleFunctionCall>,
    #[serde(rename = "functionResponse", skip_serializing_if = "Option::is_none", default)]
    pub function_response: Option<GoogleFunctionResponse>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none", default)]
    pub inline_data: Option<GoogleInlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleFunctionCall {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleFunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleInlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleSystemInstruction {
    pub parts: Vec<GooglePart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleTool {
    #[serde(rename = "functionDeclarations")]
    pub function_declarations: Vec<GoogleFunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleFunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleToolConfig {
    #[serde(rename = "functionCallingConfig")]
    pub function_calling_config: GoogleFunctionCallingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleFunctionCallingConfig {
    pub mode: String,
    #[serde(rename = "allowedFunctionNames", skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(rename = "thinkingConfig", skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GoogleThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    pub thinking_budget: u32,
}

/* --- response types ---------------------------------------------------------------------------*/

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleResponse {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    #[serde(rename = "usageMetadata", default)]
    pub usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleCandidate {
    #[serde(default)]
    pub content: Option<GoogleContent>,
    #[serde(rename = "finishReason", default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GoogleUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    #[serde(rename = "cachedContentTokenCount", default)]
    pub cached_content_token_count: u32,
}

///
/// Streaming chunks arrive either bare, or wrapped as `{"response": {...}}`
/// depending on upstream transport; this envelope accepts both and always
/// yields a `GoogleResponse`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GoogleStreamEnvelope {
    Wrapped { response: GoogleResponse },
    Bare(GoogleResponse),
}

impl GoogleStreamEnvelope {
    pub fn into_response(self) -> GoogleResponse {
        match self {
            GoogleStreamEnvelope::Wrapped { response } => response,
            GoogleStreamEnvelope::Bare(response) => response,
        }
    }
}

/* --- tests ----------------------------------------------------------------------------------- */
