//! JSON-RPC 2.0 tool server for Conexus (`spec.md` §4.8).
//!
//! Exposed as a library so `conexus-cli`'s `serve` subcommand can embed the
//! same server loop the `conexus-mcp` binary runs over stdio, rather than
//! duplicating the dispatch table.

pub mod rpc;
pub mod server;
pub mod tools;
