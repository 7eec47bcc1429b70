//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::db::DbClient;
use crate::error::{DbError, DbResult};
use crate::mcp::DbService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Stdio transport implementation.
///
/// This transport reads JSON-RPC messages from stdin and writes
/// responses to stdout, following the MCP protocol specification.
pub struct StdioTransport {
    client: Arc<DbClient>,
    custom_instructions: Option<String>,
}

impl StdioTransport {
    /// Create a new stdio transport.
    ///
    /// # Arguments
    ///
    /// * `client` - Shared database client
    /// * `custom_instructions` - Optional text appended to the server instructions
    pub fn new(client: Arc<DbClient>, custom_instructions: Option<String>) -> Self {
        Self {
            client,
            custom_instructions,
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = DbService::new(self.client.clone(), self.custom_instructions.as_deref());

        let running_service = match service.serve(stdio()).await {
            Ok(running) => running,
            Err(e) => {
                self.client.shutdown().await;
                return Err(DbError::internal(format!(
                    "Failed to start stdio transport: {}",
                    e
                )));
            }
        };

        let (shutdown_requested, outcome) = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => {
                        info!("Stdio transport completed normally");
                        (false, Ok(()))
                    }
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        (false, Err(DbError::internal(format!("Stdio transport error: {}", e))))
                    }
                }
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                (true, Ok(()))
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        self.client.shutdown().await;

        if shutdown_requested {
            // Stdin reads cannot be interrupted by select!, so leave explicitly.
            info!("Exiting process");
            std::process::exit(0);
        }

        outcome
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
