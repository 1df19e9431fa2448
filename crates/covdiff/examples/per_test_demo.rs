//! Example: Per-Test Coverage
//!
//! Demonstrates: an application with the agent embedded, driven by an
//! orchestrator that brackets two tests and collects their reports.
//!
//! Run from the workspace root with: `cargo run --example per_test_demo`

use covdiff::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn checkout(recorder: &LineRecorder, items: u32) -> u32 {
    trace_line!(recorder);
    let mut total = 0;
    for price in 1..=items {
        trace_line!(recorder);
        total += price;
    }
    total
}

fn refund(recorder: &LineRecorder, amount: u32) -> u32 {
    trace_line!(recorder);
    amount / 2
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> AgentResult<()> {
    println!("=== Per-Test Coverage Example ===\n");

    let sockets = std::env::temp_dir().join(format!("covdiff-demo-{}", std::process::id()));
    std::fs::create_dir_all(&sockets)?;
    let config = AgentConfig::builder()
        .app_root(env!("CARGO_MANIFEST_DIR"))
        .control_socket(sockets.join("control.sock"))
        .data_socket(sockets.join("data.sock"))
        .build()?;

    // 1. Orchestrator owns the data socket
    let listener = ReportListener::bind(&config.data_socket)?;

    // 2. Application starts the agent next to its own threads
    let recorder = Arc::new(LineRecorder::new());
    let agent = CoverageAgent::new(config.clone())
        .with_recorder(recorder.clone())
        .spawn()?;
    println!("1. Agent listening on {}", agent.control_socket().display());

    // 3. Two tests, each bracketed by START/END
    let client = ControlClient::new(&config.control_socket);
    let exercises: [(&str, fn(&LineRecorder) -> u32); 2] = [
        ("test_checkout", |r| checkout(r, 3)),
        ("test_refund", |r| refund(r, 10)),
    ];
    for (id, exercise) in exercises {
        client.start(id).await?;
        let _ = exercise(&recorder);
        client.end(id).await?;

        let report = listener.next_report_within(Duration::from_secs(5)).await?;
        println!("\n2. Report for {}:", report.id);
        for (file, lines) in &report.executed_lines_by_file {
            println!("   {file}: {lines:?}");
        }
    }

    agent.shutdown();
    drop(listener);
    let _ = std::fs::remove_dir(&sockets);
    println!("\n=== Example Complete ===");
    Ok(())
}
