use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use rsvp_ledger::{Amendment, LedgerError, ReservationLedger};
use rsvp_store::{JournalReservationStore, StoreError};
use rsvp_types::{EventId, Reservation, UserId};

use crate::cli::*;
use crate::config::CliConfig;

/// What a successful command reports back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Report {
    Reserved { reservation: Reservation },
    Amended { amendment: Amendment },
    Released { event: EventId, user: UserId, released: Option<Reservation> },
    Total { event: EventId, reserved: u64 },
    Remaining { event: EventId, remaining: u64 },
    Guests { event: EventId, reservations: Vec<Reservation> },
    User { user: UserId, reservations: Vec<Reservation> },
    Compacted { rows: usize, bytes: u64 },
}

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(events) = &cli.events {
        config.merge_events_file(events)?;
    }
    if let Some(journal) = cli.journal {
        config.journal = journal;
    }
    debug!(journal = %config.journal.display(), events = config.events.len(), "configuration loaded");

    let store = Arc::new(
        JournalReservationStore::open(&config.journal, config.store.clone())
            .with_context(|| format!("opening journal {}", config.journal.display()))?,
    );
    let ledger = ReservationLedger::new(store.clone(), Arc::new(config.registry()), config.ledger.clone());

    let result = execute(&ledger, &store, cli.command);
    Ok(print_result(&result, cli.format))
}

pub fn execute(
    ledger: &ReservationLedger,
    store: &JournalReservationStore,
    command: Command,
) -> Result<Report, LedgerError> {
    match command {
        Command::Reserve(args) => ledger
            .reserve(args.event, args.user, args.seats)
            .map(|reservation| Report::Reserved { reservation }),
        Command::Amend(args) => ledger
            .amend(args.event, args.user, args.seats)
            .map(|amendment| Report::Amended { amendment }),
        Command::Release(args) => ledger
            .release(args.event, args.user)
            .map(|released| Report::Released {
                event: args.event,
                user: args.user,
                released,
            }),
        Command::Total(args) => ledger
            .total_reserved(args.event)
            .map(|reserved| Report::Total { event: args.event, reserved }),
        Command::Remaining(args) => ledger
            .remaining(args.event)
            .map(|remaining| Report::Remaining { event: args.event, remaining }),
        Command::Guests(args) => ledger
            .guests(args.event)
            .map(|reservations| Report::Guests { event: args.event, reservations }),
        Command::User(args) => ledger
            .reservations_for_user(args.user)
            .map(|reservations| Report::User { user: args.user, reservations }),
        Command::Compact => cmd_compact(store).map_err(|e| LedgerError::Store(e.to_string())),
    }
}

fn cmd_compact(store: &JournalReservationStore) -> Result<Report, StoreError> {
    store.compact()?;
    Ok(Report::Compacted {
        rows: store.len()?,
        bytes: store.offset()?,
    })
}

/// Exit status for a command result: 0 on success, 1 when the ledger
/// rejected the request, 2 when it could not be completed.
pub fn exit_code(result: &Result<Report, LedgerError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) if e.is_rejection() => 1,
        Err(_) => 2,
    }
}

fn print_result(result: &Result<Report, LedgerError>, format: OutputFormat) -> ExitCode {
    match (format, result) {
        (OutputFormat::Json, Ok(report)) => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{} {e}", "error:".red().bold()),
        },
        (OutputFormat::Json, Err(e)) => {
            println!("{}", serde_json::json!({ "error": e.to_string(), "retryable": e.is_retryable() }));
        }
        (OutputFormat::Text, Ok(report)) => println!("{}", render_text(report)),
        (OutputFormat::Text, Err(e)) if e.is_rejection() => {
            eprintln!("{} {e}", "✗".red().bold());
        }
        (OutputFormat::Text, Err(e)) => eprintln!("{} {e}", "error:".red().bold()),
    }
    ExitCode::from(exit_code(result))
}

pub fn render_text(report: &Report) -> String {
    match report {
        Report::Reserved { reservation } => format!(
            "{} Reserved {} seat(s) for {} on {}",
            "✓".green().bold(),
            reservation.seats.to_string().bold(),
            reservation.user.to_string().cyan(),
            reservation.event.to_string().yellow()
        ),
        Report::Amended { amendment } => format!(
            "{} {} on {}: {} → {} seat(s)",
            "✓".green().bold(),
            amendment.current.user.to_string().cyan(),
            amendment.current.event.to_string().yellow(),
            amendment.previous.seats,
            amendment.current.seats.to_string().bold()
        ),
        Report::Released { event, user, released: Some(r) } => format!(
            "{} Released {} seat(s) held by {} on {}",
            "✓".green().bold(),
            r.seats,
            user.to_string().cyan(),
            event.to_string().yellow()
        ),
        Report::Released { event, user, released: None } => format!(
            "No reservation for {} on {}; nothing to release.",
            user.to_string().cyan(),
            event.to_string().yellow()
        ),
        Report::Total { event, reserved } => {
            format!("{}: {} seat(s) reserved", event.to_string().yellow(), reserved.to_string().bold())
        }
        Report::Remaining { event, remaining } => {
            format!("{}: {} seat(s) available", event.to_string().yellow(), remaining.to_string().bold())
        }
        Report::Guests { event, reservations } => list(&event.to_string(), reservations, |r| {
            format!("  {:<16} {}", r.user.to_string().cyan(), r.seats)
        }),
        Report::User { user, reservations } => list(&user.to_string(), reservations, |r| {
            format!("  {:<16} {}", r.event.to_string().yellow(), r.seats)
        }),
        Report::Compacted { rows, bytes } => format!(
            "{} Journal compacted: {} row(s), {} bytes",
            "✓".green().bold(),
            rows,
            bytes
        ),
    }
}

fn list(owner: &str, rows: &[Reservation], line: impl Fn(&Reservation) -> String) -> String {
    if rows.is_empty() {
        return format!("{owner}: no reservations.");
    }
    let seats: u64 = rows.iter().map(|r| u64::from(r.seats.get())).sum();
    let mut out = format!("{owner}: {} reservation(s), {seats} seat(s)", rows.len());
    for row in rows {
        out.push('\n');
        out.push_str(&line(row));
    }
    out
}
