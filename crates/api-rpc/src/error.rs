//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error objects carrying
//! `{toolName, errorCode, errorMessage}` as data.

use jsonrpsee::types::ErrorObjectOwned;
use orchestrator_core::error::AppError;
use serde::Serialize;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const UNAVAILABLE: i32 = 4003;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const PERSISTENCE_ERROR: i32 = 5001;
    pub const REMOTE_ERROR: i32 = 5002;
}

/// Error payload attached to every failed tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorData {
    pub tool_name: String,
    pub error_code: String,
    pub error_message: String,
}

fn rpc_code(err: &AppError) -> i32 {
    match err {
        AppError::Validation(_)
        | AppError::UnknownAlias(_)
        | AppError::Serialization(_)
        | AppError::AuthMissing(_) => code::VALIDATION_ERROR,
        AppError::JobNotFound(_) => code::NOT_FOUND,
        AppError::Domain(_) | AppError::InvalidState(_) | AppError::RetriesExhausted { .. } => {
            code::CONFLICT
        }
        AppError::QueueFull(_) | AppError::PoolTimeout { .. } => code::UNAVAILABLE,
        AppError::Connection(_)
        | AppError::CommandTimeout(_)
        | AppError::CommandFailed(_)
        | AppError::TransferPartialFailure { .. }
        | AppError::TransferFailure(_) => code::REMOTE_ERROR,
        AppError::Persistence(_) | AppError::Io(_) => code::PERSISTENCE_ERROR,
        AppError::Config(_) | AppError::Internal(_) => code::INTERNAL_ERROR,
    }
}

/// Convert AppError to a JSON-RPC ErrorObject for `tool`
pub fn to_rpc_error(tool: &str, err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    let data = ToolErrorData {
        tool_name: tool.to_string(),
        error_code: err.code().to_string(),
        error_message: message.clone(),
    };
    ErrorObjectOwned::owned(rpc_code(&err), message, Some(data))
}
