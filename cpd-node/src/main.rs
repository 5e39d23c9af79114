//! CPD Node - OCPP central system with an operator console
//!
//! Serves the OCPP-J WebSocket endpoint, calls SOAP charge points on their
//! stored addresses and dispatches operator commands typed on stdin.
//!
//! # Usage
//!
//! ```bash
//! # Charge points from a JSON file
//! cpd-node --charge-points charge_points.json
//!
//! # Ad-hoc charge points, 10 s deadline, no OCPP 1.2 over JSON
//! cpd-node --station CP-1=ocpp1.6J \
//!     --station CP-2=ocpp1.5S@http://10.0.0.2:8080/ocpp \
//!     --timeout 10 --disable ocpp1.2J
//! ```

mod console;

use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cpd_adapter_ocpp::{CentralSystem, CentralSystemConfig};
use cpd_core::{
    Command, DispatchConfig, DispatchError, InMemoryEndpointRepository, OcppProtocol, TaskHandle,
    TaskSnapshot,
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use console::{parse_station, ConsoleCommand, HELP};

/// OCPP central system node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address for the OCPP-J WebSocket listener
    #[arg(long, default_value = "0.0.0.0:8180")]
    listen: SocketAddr,

    /// WebSocket path prefix, charge points connect to <prefix>/<chargeBoxId>
    #[arg(long, default_value = "/steve/websocket/CentralSystemService")]
    ws_path: String,

    /// JSON file with charge point records
    #[arg(short, long)]
    charge_points: Option<String>,

    /// Extra charge point as ID=PROTOCOL[@ADDRESS] (can be repeated)
    #[arg(long)]
    station: Vec<String>,

    /// Task deadline in seconds
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    /// How long completed tasks stay visible, in seconds
    #[arg(long, default_value = "600")]
    retention: u64,

    /// SOAP request timeout in seconds
    #[arg(long, default_value = "30")]
    soap_timeout: u64,

    /// Protocol to disable, e.g. ocpp1.2S (can be repeated)
    #[arg(long)]
    disable: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Charge point records
    let repository = match &args.charge_points {
        Some(path) => InMemoryEndpointRepository::load_json(path)?,
        None => InMemoryEndpointRepository::new(),
    };
    for raw in &args.station {
        repository.upsert(parse_station(raw)?);
    }
    let station_count = repository.all().len();

    // Build configuration
    let dispatch = DispatchConfig::default()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_retention(Duration::from_secs(args.retention));
    let mut config = CentralSystemConfig::new(args.listen)
        .with_ws_path(&args.ws_path)
        .with_soap_timeout(Duration::from_secs(args.soap_timeout))
        .with_dispatch(dispatch);
    for raw in &args.disable {
        let protocol: OcppProtocol = raw.parse()?;
        config = config.without_protocol(protocol);
    }

    // Print banner
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              CPD Node - OCPP Command Dispatch                ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Listen:    {:<49} ║", args.listen);
    println!("║  WS path:   {:<49} ║", truncate(&args.ws_path, 49));
    println!("║  Stations:  {:<49} ║", station_count);
    println!("║  Timeout:   {:<49} ║", format!("{} s", args.timeout));
    println!("║  Protocols: {:<49} ║", truncate(&protocol_list(&config.protocols), 49));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let central = CentralSystem::builder(config)
        .repository(Arc::new(repository))
        .build()?;

    let server = central.bind().await?;
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("WebSocket listener stopped: {}", e);
        }
    });

    // Spawn stdin handler
    let (console_tx, mut console_rx) = tokio::sync::mpsc::channel::<ConsoleCommand>(16);
    std::thread::spawn(move || {
        println!("{}", HELP);

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match ConsoleCommand::parse(&line) {
                Ok(Some(command)) => {
                    if console_tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{}", e),
            }
        }
    });

    let retention = Duration::from_secs(args.retention);
    let mut prune_ticker = tokio::time::interval(Duration::from_secs(30));

    // Main event loop
    loop {
        tokio::select! {
            Some(command) = console_rx.recv() => {
                if command == ConsoleCommand::Quit {
                    break;
                }
                handle_command(&central, command).await;
            }

            _ = prune_ticker.tick() => {
                let (tasks, _) = central.prune(retention);
                if tasks > 0 {
                    info!("Node: pruned {} completed task(s)", tasks);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Node: interrupted");
                break;
            }
        }
    }

    info!("Node: shutting down");
    Ok(())
}

async fn handle_command(central: &CentralSystem, command: ConsoleCommand) {
    let service = central.service();

    let dispatched = match command {
        ConsoleCommand::Unlock {
            charge_box_id,
            connector_id,
        } => service.unlock_connector(&charge_box_id, connector_id).await,
        ConsoleCommand::Start {
            charge_box_id,
            connector_id,
            id_tag,
        } => {
            service
                .start_transaction(&charge_box_id, connector_id, &id_tag)
                .await
        }
        ConsoleCommand::Stop {
            charge_box_id,
            transaction_id,
        } => service.stop_transaction(&charge_box_id, transaction_id).await,
        ConsoleCommand::BroadcastUnlock {
            family,
            connector_id,
        } => {
            service
                .broadcast(Command::UnlockConnector { connector_id }, family)
                .await
        }
        ConsoleCommand::Status(task_id) => {
            match service.task_status(task_id) {
                Ok(snapshot) => print_json(&snapshot),
                Err(e) => println!("{}", e),
            }
            return;
        }
        ConsoleCommand::Cancel(task_id) => {
            match service.cancel_task(task_id) {
                Ok(n) => println!("Task {} cancelled ({} target(s) were pending)", task_id, n),
                Err(e) => println!("{}", e),
            }
            return;
        }
        ConsoleCommand::Tasks => {
            let tasks = service.list_tasks();
            if tasks.is_empty() {
                println!("No tasks");
            }
            for task in tasks {
                println!(
                    "  #{:<5} {:<10} {:<40} {}/{} done",
                    task.task_id,
                    task.status,
                    task.command.to_string(),
                    task.results.len() - task.pending_count(),
                    task.results.len()
                );
            }
            return;
        }
        ConsoleCommand::Stations => {
            let stations = central.connected_stations();
            if stations.is_empty() {
                println!("No JSON charge points connected");
            }
            for station in stations {
                println!(
                    "  {:<24} {:<8} since {}",
                    station.charge_box_id, station.version, station.connected_at
                );
            }
            return;
        }
        ConsoleCommand::Help => {
            println!("{}", HELP);
            return;
        }
        ConsoleCommand::Quit => return,
    };

    report(dispatched);
}

/// Print the task id now and its final results once it completes
fn report(dispatched: Result<TaskHandle, DispatchError>) {
    match dispatched {
        Ok(handle) => {
            println!("Task {} started", handle.id());
            tokio::spawn(async move {
                let snapshot = handle.wait().await;
                print_json(&snapshot);
            });
        }
        Err(e) => {
            warn!("Node: command rejected: {}", e);
            println!("Rejected: {}", e);
        }
    }
}

fn print_json(snapshot: &TaskSnapshot) {
    match serde_json::to_string_pretty(snapshot) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Node: could not render result: {}", e),
    }
}

fn protocol_list(protocols: &[OcppProtocol]) -> String {
    protocols
        .iter()
        .map(|p| p.composite_value())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate string with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
