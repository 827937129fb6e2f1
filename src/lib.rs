//! # Knowledge Bridge
//!
//! Exposes an Amazon Bedrock knowledge base as a single callable tool,
//! `search_knowledge_base`, for conversational agents (voice or chat).
//!
//! An incoming tool call goes through a fixed pipeline: identifier-like
//! queries are rewritten, the knowledge base is searched (hybrid first,
//! semantic fallback on an empty result), and the top hits are rendered into
//! one response string the agent can read aloud. Every outcome, including
//! failures, is returned as a structured result; provider errors never reach
//! the caller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ HTTP / MCP   │──▶│  Bridge  │──▶│ Retriever │──▶│ Bedrock  │
//! │ ToolRegistry │   │ enhance  │   │ HYBRID →  │   │ Retrieve │
//! └──────────────┘   │ format   │   │ SEMANTIC  │   │ (SigV4)  │
//!                    └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=...
//! kb search 1234                 # one-off lookup
//! kb serve                       # start HTTP + MCP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`enhance`] | Identifier detection and query rewriting |
//! | [`retrieval`] | Two-stage retrieval and the client trait |
//! | [`bedrock`] | Bedrock Agent Runtime client |
//! | [`format`] | Response rendering |
//! | [`bridge`] | Tool-call handling |
//! | [`error`] | Error types |
//! | [`traits`] | Tool trait and registry |
//! | [`server`] | HTTP tool server |
//! | [`mcp`] | MCP protocol bridge |

pub mod bedrock;
pub mod bridge;
pub mod config;
pub mod enhance;
pub mod error;
pub mod format;
pub mod mcp;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod traits;
