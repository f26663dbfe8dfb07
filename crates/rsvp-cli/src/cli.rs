use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rsvp_types::{EventId, UserId};

#[derive(Parser)]
#[command(
    name = "rsvp",
    about = "Reservation ledger: capacity-checked seat reservations for events",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Journal file, overriding the configured one
    #[arg(long, global = true)]
    pub journal: Option<PathBuf>,

    /// TOML file with `[[events]]` entries (id, capacity)
    #[arg(long, global = true)]
    pub events: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reserve seats for a user
    Reserve(SeatArgs),
    /// Change a user's seat count
    Amend(SeatArgs),
    /// Release a user's reservation
    Release(UserEventArgs),
    /// Show seats reserved for an event
    Total(EventArgs),
    /// Show seats still available for an event
    Remaining(EventArgs),
    /// List an event's reservations
    Guests(EventArgs),
    /// List a user's reservations
    User(UserArgs),
    /// Rewrite the journal to its live rows
    Compact,
}

#[derive(Args)]
pub struct SeatArgs {
    pub event: EventId,
    pub user: UserId,
    pub seats: u32,
}

#[derive(Args)]
pub struct UserEventArgs {
    pub event: EventId,
    pub user: UserId,
}

#[derive(Args)]
pub struct EventArgs {
    pub event: EventId,
}

#[derive(Args)]
pub struct UserArgs {
    pub user: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_prefixed_ids_and_global_flags() {
        let cli = Cli::try_parse_from([
            "rsvp", "reserve", "event:3", "7", "2", "--format", "json", "--journal", "x.journal",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.journal, Some(PathBuf::from("x.journal")));
        match cli.command {
            Command::Reserve(args) => {
                assert_eq!(args.event, EventId::new(3));
                assert_eq!(args.user, UserId::new(7));
                assert_eq!(args.seats, 2);
            }
            _ => panic!("expected reserve"),
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(Cli::try_parse_from(["rsvp", "total", "party"]).is_err());
    }
}
