//! `dealflow server` — Start the Dealflow HTTP backend server.

pub async fn run(host: String, port: u16) -> Result<(), String> {
    let config = dealflow_server::ServerConfig {
        host: host.clone(),
        port,
    };

    println!("Starting Dealflow server on {}:{}...", host, port);

    let addr = dealflow_server::start_server(config).await?;
    println!("Dealflow server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
