//!
//! Model router (C6).
//!
//! A static table mapping caller-facing model names to the upstream id,
//! model family, and thinking/context capability flags. The family string
//! also feeds the signature cache's fallback namespace.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

use std::sync::atomic::{AtomicBool, Ordering};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Resolved routing decision for one caller-facing model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub upstream_id: String,
    pub family: String,
    pub enable_thinking: bool,
    pub supports_1m_context: bool,
}

///
/// Looks up caller-facing model names against a static table, applying the
/// 1M-context toggle and the thinking-enablement heuristic.
pub struct ModelRouter {
    wide_context: AtomicBool,
}

/** Table entry: (caller-facing name, upstream id, family). */
const TABLE: &[(&str, &str, &str)] = &[
    ("gemini-3-pro", "gemini-3-pro-preview", "gemini-3"),
    ("gemini-3-flash", "gemini-3-flash-preview", "gemini-3"),
    ("gemini-3-pro-thinking", "gemini-3-pro-preview", "gemini-3"),
    ("gemini-2.5-pro", "gemini-2.5-pro", "gemini-2.5"),
    ("gemini-2.5-flash", "gemini-2.5-flash", "gemini-2.5"),
    ("gpt-4o", "gemini-2.5-pro", "gemini-2.5"),
    ("gpt-4o-mini", "gemini-2.5-flash", "gemini-2.5"),
    ("claude-opus-4", "gemini-3-pro-preview", "gemini-3"),
    ("claude-sonnet-4", "gemini-3-pro-preview", "gemini-3"),
];

/* --- start of code -------------------------------------------------------------------------- */

impl ModelRouter {
    pub fn new() -> Self {
        Self { wide_context: AtomicBool::new(false) }
    }

    /// Resolve a caller-facing model name. `None` if the name has no table entry.
    pub fn resolve(&self, caller_model: &str) -> Option<RouteEntry> {
        let (_, upstream_id, family) = TABLE.iter().find(|(name, _, _)| *name == caller_model)?;

        let enable_thinking = Self::enable_thinking_for(caller_model);
        let supports_1m_context = family.starts_with("gemini");

        let upstream_id = if supports_1m_context && self.wide_context.load(Ordering::Relaxed) {
            format!("{upstream_id}[1m]")
        } else {
            upstream_id.to_string()
        };

        Some(RouteEntry {
            upstream_id,
            family: family.to_string(),
            enable_thinking,
            supports_1m_context,
        })
    }

    /// Whether a model name signals thinking support (§4.2): contains "thinking" or "gemini-3".
    pub fn enable_thinking_for(model_name: &str) -> bool {
        let lower = model_name.to_lowercase();
        lower.contains("thinking") || lower.contains("gemini-3")
    }

    /// Set the global 1M-context widening toggle.
    pub fn set_wide_context(&self, enabled: bool) {
        self.wide_context.store(enabled, Ordering::Relaxed);
    }

    pub fn wide_context(&self) -> bool {
        self.wide_context.load(Ordering::Relaxed)
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new()
    }
}

/* --- tests ----------------------------------------------------------------------------------- */
