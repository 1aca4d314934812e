//!
//! Wire-dialect translation (C2, C3).
//!
//! `request` converts inbound OpenAI bodies into the Anthropic pivot and the
//! pivot into the upstream Google shape; `response` converts the other
//! direction for the non-streaming case. The streaming case lives in `sse`.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

pub mod request;
pub mod response;
