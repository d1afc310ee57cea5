//! Reports built from the recorded event stream
//!
//! - [`DropReport`]: one CSV row per message copy that left a buffer
//! - [`EventLogReport`]: one text line per event, replayable by external tools

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

use ferry_core::{DropMode, Message, MessageId, SimEvent};

/// A report rendered from a finished run
pub trait Report {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Render the whole report
    fn render(&self, events: &[SimEvent]) -> String;

    fn write_to<W: Write>(&self, events: &[SimEvent], out: &mut W) -> io::Result<()>
    where
        Self: Sized,
    {
        out.write_all(self.render(events).as_bytes())
    }

    fn save(&self, events: &[SimEvent], path: impl AsRef<Path>) -> io::Result<()>
    where
        Self: Sized,
    {
        let mut file = io::BufWriter::new(std::fs::File::create(path)?);
        self.write_to(events, &mut file)?;
        file.flush()
    }
}

// ============================================================================
// Drop report
// ============================================================================

pub const DROP_REPORT_HEADER: &str = "message_id,source,destination,dropping_node,priority,subscription_id,created_at,dropped_at,drop/delete,cause,delivered";

/// CSV listing of every deleted message copy
///
/// Rows are grouped per message in creation order. The last column says
/// whether the message ever reached a subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropReport;

impl DropReport {
    fn mode_label(mode: DropMode) -> &'static str {
        match mode {
            DropMode::Removed => "DELETE",
            DropMode::Dropped => "DROP",
            DropMode::Discarded => "DISCARD",
            DropMode::TtlExpiration => "TTL_EXPIRATION",
        }
    }
}

struct DropRow<'a> {
    message: &'a Message,
    node: String,
    time: f64,
    mode: DropMode,
    cause: &'a str,
}

impl Report for DropReport {
    fn name(&self) -> &'static str {
        "drop report"
    }

    fn render(&self, events: &[SimEvent]) -> String {
        let mut order: Vec<&MessageId> = Vec::new();
        let mut rows: BTreeMap<&MessageId, Vec<DropRow<'_>>> = BTreeMap::new();
        let mut delivered: BTreeSet<&MessageId> = BTreeSet::new();

        for event in events {
            match event {
                SimEvent::MessageCreated { message, .. } => {
                    if !rows.contains_key(&message.id) {
                        order.push(&message.id);
                        rows.insert(&message.id, Vec::new());
                    }
                }
                SimEvent::MessageTransferred {
                    message,
                    first_delivery: true,
                    final_target: true,
                    ..
                } => {
                    delivered.insert(&message.id);
                }
                SimEvent::MessageDeleted {
                    time,
                    message,
                    node,
                    mode,
                    cause,
                } => {
                    let entry = rows.entry(&message.id).or_insert_with(|| {
                        order.push(&message.id);
                        Vec::new()
                    });
                    entry.push(DropRow {
                        message,
                        node: node.to_string(),
                        time: *time,
                        mode: *mode,
                        cause,
                    });
                }
                _ => {}
            }
        }

        let mut out = String::new();
        out.push_str(DROP_REPORT_HEADER);
        out.push('\n');
        for id in order {
            let Some(drops) = rows.get(id) else {
                continue;
            };
            let delivered = if delivered.contains(id) { "YES" } else { "NO" };
            for row in drops {
                let m = row.message;
                let destination = m.to.map_or_else(|| "-".to_string(), |to| to.to_string());
                let topic = m.topic().map(|t| t.to_string()).unwrap_or_default();
                let _ = writeln!(
                    out,
                    "{},{},{},{},{},{},{:.4},{:.4},{},{},{}",
                    csv_field(m.id.as_str()),
                    m.from,
                    destination,
                    row.node,
                    m.priority.level(),
                    topic,
                    m.creation_time,
                    row.time,
                    Self::mode_label(row.mode),
                    csv_field(row.cause),
                    delivered
                );
            }
        }
        out
    }
}

/// Quote a CSV field if it needs it
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ============================================================================
// Event log
// ============================================================================

/// Plain text event log, one event per line
///
/// Line format: `time action host1 [host2] [message] [extra]`
#[derive(Debug, Clone, Copy, Default)]
pub struct EventLogReport;

impl EventLogReport {
    /// Action tag of a deletion
    fn deletion_action(mode: DropMode) -> &'static str {
        match mode {
            DropMode::Removed => "R",
            DropMode::Dropped => "DR",
            DropMode::Discarded => "DI",
            DropMode::TtlExpiration => "EX",
        }
    }

    /// Extra of a transfer line: delivered (D) or relayed (R), `A` when
    /// the arrival was not the first at that node
    fn transfer_extra(first_delivery: bool, final_target: bool) -> &'static str {
        match (final_target, first_delivery) {
            (true, true) => "D",
            (true, false) => "DA",
            (false, true) => "R",
            (false, false) => "RA",
        }
    }

    /// The log line of one event
    pub fn line(event: &SimEvent) -> String {
        let t = event.time();
        match event {
            SimEvent::HostsConnected { a, b, .. } => format!("{t:.4} CONN {a} {b} up"),
            SimEvent::HostsDisconnected { a, b, .. } => format!("{t:.4} CONN {a} {b} down"),
            SimEvent::MessageCreated { message, .. } => {
                format!("{t:.4} C {} {}", message.from, message.id)
            }
            SimEvent::TransmissionPerformed { message, source, .. } => {
                format!("{t:.4} T {source} {}", message.id)
            }
            SimEvent::TransferStarted { message, from, to, .. } => {
                format!("{t:.4} S {from} {to} {}", message.id)
            }
            SimEvent::TransferAborted { message, from, to, .. } => {
                format!("{t:.4} A {from} {to} {}", message.id)
            }
            SimEvent::TransmissionInterfered { message, from, to, .. } => {
                format!("{t:.4} I {from} {to} {}", message.id)
            }
            SimEvent::MessageTransferred {
                message,
                from,
                to,
                first_delivery,
                final_target,
                ..
            } => format!(
                "{t:.4} DE {from} {to} {} {}",
                message.id,
                Self::transfer_extra(*first_delivery, *final_target)
            ),
            SimEvent::MessageDeleted { message, node, mode, .. } => {
                format!("{t:.4} {} {node} {}", Self::deletion_action(*mode), message.id)
            }
        }
    }
}

impl Report for EventLogReport {
    fn name(&self) -> &'static str {
        "event log"
    }

    fn render(&self, events: &[SimEvent]) -> String {
        let mut out = String::new();
        for event in events {
            out.push_str(&Self::line(event));
            out.push('\n');
        }
        out
    }
}
