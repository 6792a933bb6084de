//! MCP server and client for a sectioned text knowledge base and a local
//! language model.
//!
//! The server exposes knowledge-base resources (`kb://main`,
//! `kb://section/{section_number}`) and tools (`query_kb`, `add_to_kb`,
//! `create_section`), a plain `query_llm` tool, or a small demo set, over
//! JSON-RPC 2.0 stdio transport compatible with any MCP-aware client.

pub mod client;
pub mod config;
pub mod handlers;
pub mod inference;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;

pub mod schema;
