use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use rsvp_ledger::{InMemoryEventRegistry, LedgerConfig};
use rsvp_store::JournalConfig;
use rsvp_types::{Capacity, EventId};

/// Contents of the `--config` file. Every section is optional.
///
/// ```toml
/// journal = "rsvp.journal"
///
/// [store]
/// sync_mode = "every-commit"
///
/// [ledger]
/// lock_timeout_ms = 250
///
/// [[events]]
/// id = 1
/// capacity = 10
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub journal: PathBuf,
    pub store: JournalConfig,
    pub ledger: LedgerConfig,
    pub events: Vec<EventEntry>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            journal: PathBuf::from("rsvp.journal"),
            store: JournalConfig::default(),
            ledger: LedgerConfig::default(),
            events: Vec::new(),
        }
    }
}

/// One event and its capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub id: EventId,
    pub capacity: Capacity,
}

/// Contents of the `--events` file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsFile {
    pub events: Vec<EventEntry>,
}

impl CliConfig {
    /// Read `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Append the entries of an `--events` file. Later entries win.
    pub fn merge_events_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading events {}", path.display()))?;
        let file: EventsFile =
            toml::from_str(&text).with_context(|| format!("parsing events {}", path.display()))?;
        self.events.extend(file.events);
        Ok(())
    }

    pub fn registry(&self) -> InMemoryEventRegistry {
        InMemoryEventRegistry::from_events(self.events.iter().map(|e| (e.id, e.capacity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsvp_ledger::EventRegistry;
    use rsvp_store::SyncMode;

    #[test]
    fn missing_file_means_defaults() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.journal, PathBuf::from("rsvp.journal"));
    }

    #[test]
    fn full_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsvp.toml");
        std::fs::write(
            &path,
            r#"
journal = "/var/lib/rsvp/ledger.journal"

[store]
sync_mode = "every-commit"

[ledger]
lock_timeout_ms = 500

[ledger.retry]
max_retries = 1

[[events]]
id = 1
capacity = 10

[[events]]
id = 2
capacity = 3
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.journal, PathBuf::from("/var/lib/rsvp/ledger.journal"));
        assert_eq!(config.store.sync_mode, SyncMode::EveryCommit);
        assert_eq!(config.ledger.lock_timeout_ms, 500);
        assert_eq!(config.ledger.retry.max_retries, 1);
        assert_eq!(config.events.len(), 2);

        let registry = config.registry();
        assert_eq!(
            registry.capacity_of(EventId::new(2)).unwrap(),
            Some(Capacity::new(3).unwrap())
        );
        assert_eq!(registry.capacity_of(EventId::new(9)).unwrap(), None);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let parsed: Result<EventsFile, _> = toml::from_str("[[events]]\nid = 1\ncapacity = 0\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn events_file_overrides_config_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.toml");
        std::fs::write(&path, "[[events]]\nid = 1\ncapacity = 4\n").unwrap();

        let mut config: CliConfig = toml::from_str("[[events]]\nid = 1\ncapacity = 10\n").unwrap();
        config.merge_events_file(&path).unwrap();

        let registry = config.registry();
        assert_eq!(
            registry.capacity_of(EventId::new(1)).unwrap(),
            Some(Capacity::new(4).unwrap())
        );
    }
}
