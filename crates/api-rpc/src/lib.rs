//! JSON-RPC Tool Surface
//!
//! Exposes job submission, queue/pool inspection and the server catalog
//! as JSON-RPC 2.0 methods.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{build_module, RpcServer, RpcServerConfig, TOOL_NAMES};
