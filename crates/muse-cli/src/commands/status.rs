//! Status command - bring the inference server up and report.

use muse_assist::{AssistConfig, AssistEngine};

pub(crate) async fn run(keep: bool) -> miette::Result<()> {
    let config = AssistConfig::from_env();
    let engine = AssistEngine::new(config);

    println!("Starting inference server...");
    let ready = engine.ensure_running().await;
    let status = engine.status().await;

    println!();
    println!("Server:");
    println!("  state:    {}", status.server.state);
    println!("  port:     {}", status.server.port);
    if let Some(pid) = status.server.pid {
        println!("  pid:      {}", pid);
    }
    if let Some(model) = &status.server.model {
        println!("  model:    {}", model);
    }
    println!("  restarts: {}", status.server.restart_count);
    if let Some(error) = &status.last_error {
        println!("  error:    {}", error);
    }

    if !ready {
        if !status.server.stderr_tail.is_empty() {
            println!();
            println!("Recent server output:");
            for line in &status.server.stderr_tail {
                println!("  {}", line);
            }
        }
        engine.dispose().await;
        return Err(miette::miette!("inference server is not available"));
    }

    if keep {
        println!();
        println!(
            "Server is running on port {}. Press Ctrl-C to stop.",
            status.server.port
        );
        tokio::signal::ctrl_c().await.ok();
        println!();
    }

    engine.dispose().await;
    Ok(())
}
