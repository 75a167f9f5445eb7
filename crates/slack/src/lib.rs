//! Slack integration - Events API and slash command bot interface
//!
//! This crate provides the Slack side of the imagine bot:
//! - **Signatures** (`signature`) - `X-Slack-Signature` verification for inbound webhooks
//! - **Payloads** (`payload`) - Events API JSON and slash command form decoding
//! - **Slash Commands** (`commands`) - `/imagine <prompt>` parsing
//! - **Events** (`events`) - Dispatcher plus the home tab, mention and `/imagine` handlers
//! - **Block Kit** (`blocks`) - Home view and message builders
//! - **Web API** (`api`) - `views.publish`, `chat.postMessage` and `response_url` calls
//!
//! # Architecture
//!
//! ```text
//! Slack HTTP callback → signature check → payload → EventDispatcher → Handlers
//!                                                                      ↓
//!                                         SlackClient ← Block Kit ← ImageGenerator
//! ```

pub mod api;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod payload;
pub mod signature;
