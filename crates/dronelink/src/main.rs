//! `dronelink` - CLI for the drone telemetry ingestion server
//!
//! Runs the server and consumer, drives a simulated producer, or replays a
//! recorded flight.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use dronelink::cli::{Cli, Command, ConfigCommand, ReplayCommand, ServeCommand, SimulateCommand};
use dronelink::replay::{self, Replay};
use dronelink::simulator::Simulator;
use dronelink::storage;
use dronelink::viewer::{PlotFrame, Viewer};
use dronelink::{init_logging, Config, Consumer, IngestionServer, PipelineContext, StopReason};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    match cli.command {
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
        Command::Serve(serve_cmd) => {
            let config = Config::load_from(cli.config)?;
            handle_serve(config, &serve_cmd).await
        }
        Command::Simulate(simulate_cmd) => {
            let config = Config::load_from(cli.config)?;
            handle_simulate(config, &simulate_cmd).await
        }
        Command::Replay(replay_cmd) => {
            let config = Config::load_from(cli.config)?;
            handle_replay(&config, &replay_cmd).await
        }
    }
}

async fn handle_serve(mut config: Config, cmd: &ServeCommand) -> anyhow::Result<()> {
    cmd.apply(&mut config);
    config.validate()?;

    let (context, receiver) = PipelineContext::new();
    let sink = storage::open_sink(&config)?;
    let mut consumer = Consumer::new(receiver, sink, &context, &config.pipeline);

    let server = IngestionServer::new(config.server.clone(), context.clone());
    let listener = server.bind().await?;
    let stats = server.stats();
    let shutdown = context.shutdown().clone();

    let server_task = tokio::spawn(async move { server.serve(listener).await });

    let consumer_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if consumer.run().await == StopReason::EndOfStream {
                info!("end of stream; still accepting connections until interrupted");
                // Holding the consumer keeps the queue open for late producers
                shutdown.cancelled().await;
                let pending = consumer.pending();
                if pending > 0 {
                    warn!(pending, "discarding events received after END");
                }
            }
            consumer.stats()
        })
    };

    let viewer_task = config.viewer.enabled.then(|| {
        let viewer = Viewer::new(context.windows(), &config.viewer);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { viewer.run(&shutdown, log_frame).await })
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("interrupt received, shutting down");
    shutdown.cancel();

    server_task.await??;
    let consumed = consumer_task.await?;
    if let Some(task) = viewer_task {
        let frames = task.await?;
        debug!(frames, "viewer finished");
    }

    let served = stats.snapshot();
    info!(
        connections = served.connections_total,
        messages = served.messages_received,
        protocol_errors = served.protocol_errors,
        connection_errors = served.connection_errors,
        batches = consumed.batches,
        records = consumed.records,
        persist_errors = consumed.persist_errors,
        "shutdown complete"
    );
    Ok(())
}

fn log_frame(frame: &PlotFrame) {
    match frame.bounds {
        Some(bounds) => debug!(
            drones = frame.series.len(),
            points = frame.point_count(),
            x_min = bounds.x_min,
            x_max = bounds.x_max,
            y_min = bounds.y_min,
            y_max = bounds.y_max,
            "plot frame"
        ),
        None => debug!("plot frame (no points yet)"),
    }
}

async fn handle_simulate(mut config: Config, cmd: &SimulateCommand) -> anyhow::Result<()> {
    cmd.apply(&mut config);
    config.validate()?;

    let address = config.simulator.server_address();
    let sent = Simulator::new(config.simulator)
        .run()
        .await
        .with_context(|| format!("simulation against {address} failed"))?;
    println!("{sent} coordinate batches sent");
    Ok(())
}

async fn handle_replay(config: &Config, cmd: &ReplayCommand) -> anyhow::Result<()> {
    let rows = replay::read_rows(&cmd.file, &config.record_format())
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;

    let capacity = cmd.last.unwrap_or(config.pipeline.last_points_number);
    let mut replay = Replay::new(rows, capacity, config.viewer.plot_margin);
    if !cmd.no_delay {
        replay = replay.with_delay(config.viewer.update_interval());
    }

    let applied = replay
        .run(|frame| {
            for (drone, (x, y)) in frame.heads() {
                println!("drone {drone}: x={x:.3} y={y:.3}");
            }
            if let Some(b) = frame.bounds {
                println!(
                    "bounds: x [{:.1}, {:.1}] y [{:.1}, {:.1}]",
                    b.x_min, b.x_max, b.y_min, b.y_max
                );
            }
        })
        .await;

    println!("Replayed {applied} rows from {}", cmd.file.display());
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("[Server]");
    println!("  Bind address:       {}", config.server.bind_address());
    println!("  Max payload bytes:  {}", config.server.max_payload_bytes);
    println!();
    println!("[Pipeline]");
    println!("  Last points number: {}", config.pipeline.last_points_number);
    println!("  Poll interval (ms): {}", config.pipeline.poll_interval_ms);
    println!();
    println!("[Storage]");
    println!("  Backend:            {}", config.storage.backend);
    println!("  Output path:        {}", config.output_path().display());
    println!("  Field separator:    {:?}", config.storage.field_separator);
    println!("  Decimal separator:  {:?}", config.storage.decimal_separator);
    println!("  Precision:          {}", config.storage.precision);
    println!();
    println!("[Viewer]");
    println!("  Enabled:            {}", config.viewer.enabled);
    println!("  Update (ms):        {}", config.viewer.update_interval_ms);
    println!("  Plot margin:        {}", config.viewer.plot_margin);
    println!();
    println!("[Simulator]");
    println!("  Server:             {}", config.simulator.server_address());
    println!("  Drones:             {}", config.simulator.drones);
    println!("  Interval (ms):      {}", config.simulator.interval_ms);
    println!("  Run time (ms):      {}", config.simulator.run_time_ms);
    println!("  Noise limit:        {}", config.simulator.noise_limit);
}
