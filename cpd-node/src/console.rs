//! Operator console commands read from stdin

use cpd_core::{Endpoint, ProtocolFamily, TaskId};

pub const HELP: &str = "\
Commands:
  unlock <chargeBoxId> <connectorId>              - Unlock a connector
  start <chargeBoxId> <connectorId> <idTag>       - Remote start a transaction
  stop <chargeBoxId> <transactionId>              - Remote stop a transaction
  broadcast-unlock <family> <connectorId>         - Unlock on every charge point of a family
                                                    (ocpp1.6J, ocpp1.5, SOAP, JSON, ...)
  status <taskId>                                 - Show a task
  cancel <taskId>                                 - Cancel a task
  tasks                                           - List retained tasks
  stations                                        - List connected JSON charge points
  quit                                            - Exit
";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Unlock {
        charge_box_id: String,
        connector_id: u32,
    },
    Start {
        charge_box_id: String,
        connector_id: u32,
        id_tag: String,
    },
    Stop {
        charge_box_id: String,
        transaction_id: i32,
    },
    BroadcastUnlock {
        family: ProtocolFamily,
        connector_id: u32,
    },
    Status(TaskId),
    Cancel(TaskId),
    Tasks,
    Stations,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse a console line; `Ok(None)` for blank lines
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = parts.split_first() else {
            return Ok(None);
        };

        let command = match (verb, args) {
            ("unlock", [id, connector]) => ConsoleCommand::Unlock {
                charge_box_id: id.to_string(),
                connector_id: number(connector, "connector id")?,
            },
            ("start", [id, connector, tag]) => ConsoleCommand::Start {
                charge_box_id: id.to_string(),
                connector_id: number(connector, "connector id")?,
                id_tag: tag.to_string(),
            },
            ("stop", [id, transaction]) => ConsoleCommand::Stop {
                charge_box_id: id.to_string(),
                transaction_id: number(transaction, "transaction id")?,
            },
            ("broadcast-unlock", [family, connector]) => ConsoleCommand::BroadcastUnlock {
                family: family.parse().map_err(|e| format!("{}", e))?,
                connector_id: number(connector, "connector id")?,
            },
            ("status", [task]) => ConsoleCommand::Status(number(task, "task id")?),
            ("cancel", [task]) => ConsoleCommand::Cancel(number(task, "task id")?),
            ("tasks", []) => ConsoleCommand::Tasks,
            ("stations", []) => ConsoleCommand::Stations,
            ("help", _) => ConsoleCommand::Help,
            ("quit" | "exit", _) => ConsoleCommand::Quit,
            _ => return Err(format!("Unknown or incomplete command: {}", line.trim())),
        };
        Ok(Some(command))
    }
}

fn number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, String> {
    raw.parse().map_err(|_| format!("Invalid {}: {}", what, raw))
}

/// `ID=PROTOCOL[@ADDRESS]` from the command line
pub fn parse_station(raw: &str) -> Result<Endpoint, String> {
    let (id, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected ID=PROTOCOL[@ADDRESS], got {}", raw))?;
    if id.is_empty() {
        return Err(format!("Missing charge box id in {}", raw));
    }

    let endpoint = match rest.split_once('@') {
        Some((protocol, address)) => Endpoint::new(id, protocol).with_address(address),
        None => Endpoint::new(id, rest),
    };
    Ok(endpoint)
}
