use std::sync::Arc;

use kb_mcp_server::config::ServerConfig;
use kb_mcp_server::handlers;
use kb_mcp_server::inference::{CompletionBackend, LlamaServerBackend};
use kb_mcp_server::server::McpServer;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // stdout carries JSON-RPC; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kb_mcp_server=info")),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("kb-mcp-server: configuration error: {e}");
            std::process::exit(1);
        }
    };
    info!(
        profile = %config.profile,
        kb = %config.kb_path.display(),
        header_mode = %config.header_mode,
        "starting"
    );

    let backend: Arc<dyn CompletionBackend> =
        Arc::new(LlamaServerBackend::new(config.inference.clone()));

    let registry = match handlers::build_registry(&config, Arc::clone(&backend)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("kb-mcp-server: registration error: {e}");
            std::process::exit(1);
        }
    };

    let mut server = McpServer::new(Arc::new(registry));
    let outcome = server.run().await;
    backend.shutdown();

    if let Err(e) = outcome {
        eprintln!("kb-mcp-server: fatal error: {e}");
        std::process::exit(1);
    }
}
