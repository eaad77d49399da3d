//! # ARGO RAG
//!
//! Natural-language queries over ARGO float profiles.
//!
//! A query is classified as structured filtering, semantic search, or both;
//! the matching tools are called on the ARGO tool server; the results are
//! normalized into one record shape, merged by profile id, summarized, and
//! turned into prose by a language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Classifier  │──▶│  Dispatcher  │──▶│  Normalizer  │──▶│ Synthesizer │
//! │ patterns+LLM │   │ queryARGO /  │   │ merge by id  │   │  LLM prose  │
//! └──────────────┘   │ retrieveARGO │   │ + statistics │   └─────────────┘
//!                    └──────┬───────┘   └──────────────┘
//!                           ▼
//!                    ┌──────────────┐
//!                    │ tool server  │
//!                    │ POST /mcp    │
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! argo ask "Count all profiles with temperature > 25"
//! argo classify "Show me warm water profiles in the Arabian Sea"
//! argo call retrieveARGO --arg query="monsoon mixed layer"
//! argo chat
//! argo serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Boundary error types |
//! | [`models`] | Query context, profile records, responses |
//! | [`entities`] | Entity extraction |
//! | [`classifier`] | Intent classification |
//! | [`protocol`] | `TOOL_CALL:` wire format and extraction |
//! | [`retry`] | Timeouts and exponential backoff |
//! | [`backend`] | Tool server client |
//! | [`tools`] | Tool validation and dispatch |
//! | [`completion`] | Chat completion client |
//! | [`session`] | Conversation sessions |
//! | [`query_gen`] | SQL generation |
//! | [`normalize`] | Normalization, merge, statistics |
//! | [`dispatcher`] | Retrieval strategy execution |
//! | [`synth`] | Answer synthesis |
//! | [`agent`] | Tool-calling chat agent |
//! | [`pipeline`] | End-to-end query processing |
//! | [`server`] | HTTP API |

pub mod agent;
pub mod backend;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod entities;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod protocol;
pub mod query_gen;
pub mod retry;
pub mod server;
pub mod session;
pub mod synth;
pub mod tools;
