//! Keyed-record storage seam.
//!
//! Handlers stage writes during dispatch; the router commits after a
//! handler succeeds and rolls back after it fails, so a half-finished
//! handler never leaves partial records behind. The in-memory
//! implementation backs the binary and the test suites.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::room::RoomStatus;

pub type UserId = u32;
pub type RoomId = u32;
pub type SongId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub password: String,
    /// Rounds finished across all sessions.
    pub plays: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub kind: u8,
    pub password: Option<String>,
    pub status: RoomStatus,
    pub active_song: Option<SongId>,
    pub max_players: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    pub id: SongId,
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    pub plays: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    User(UserRecord),
    Room(RoomRecord),
    Song(SongRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::User(_) => RecordKind::User,
            Record::Room(_) => RecordKind::Room,
            Record::Song(_) => RecordKind::Song,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Record::User(u) => u.id,
            Record::Room(r) => r.id,
            Record::Song(s) => s.id,
        }
    }

    fn with_id(mut self, id: u32) -> Self {
        match &mut self {
            Record::User(u) => u.id = id,
            Record::Room(r) => r.id = id,
            Record::Song(s) => s.id = id,
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    User,
    Room,
    Song,
}

/// Lookup key within one record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Any,
    Id(u32),
    /// User name or room name, case-sensitive.
    Name(String),
    /// Song identity: the title/subtitle/artist triple.
    SongKey {
        title: String,
        subtitle: String,
        artist: String,
    },
}

impl Filter {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Any => true,
            Filter::Id(id) => record.id() == *id,
            Filter::Name(name) => match record {
                Record::User(u) => u.name == *name,
                Record::Room(r) => r.name == *name,
                Record::Song(s) => s.title == *name,
            },
            Filter::SongKey {
                title,
                subtitle,
                artist,
            } => match record {
                Record::Song(s) => {
                    s.title == *title && s.subtitle == *subtitle && s.artist == *artist
                }
                _ => false,
            },
        }
    }
}

/// Storage collaborator. Reads see staged writes, so a handler observes
/// its own uncommitted changes.
pub trait Store: Send + Sync {
    fn find(&self, kind: RecordKind, filter: &Filter) -> Option<Record>;
    fn list(&self, kind: RecordKind) -> Vec<Record>;
    /// Stages an insert or update. A zero id means "assign one"; the
    /// assigned id is returned.
    fn upsert(&self, record: Record) -> u32;
    fn commit(&self);
    fn rollback(&self);
}

#[derive(Default)]
struct Tables {
    committed: HashMap<RecordKind, Vec<Record>>,
    staged: Vec<Record>,
    next_id: u32,
}

/// In-memory store. Records live for the lifetime of the process.
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                committed: HashMap::new(),
                staged: Vec::new(),
                next_id: 1,
            }),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemStore {
    fn find(&self, kind: RecordKind, filter: &Filter) -> Option<Record> {
        let tables = self.guard();
        // Staged writes shadow committed rows, newest first.
        if let Some(record) = tables
            .staged
            .iter()
            .rev()
            .find(|r| r.kind() == kind && filter.matches(r))
        {
            return Some(record.clone());
        }
        tables
            .committed
            .get(&kind)
            .and_then(|rows| rows.iter().find(|r| filter.matches(r)))
            .cloned()
    }

    fn list(&self, kind: RecordKind) -> Vec<Record> {
        let tables = self.guard();
        let mut rows: Vec<Record> = tables
            .committed
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        for staged in tables.staged.iter().filter(|r| r.kind() == kind) {
            match rows.iter_mut().find(|r| r.id() == staged.id()) {
                Some(row) => *row = staged.clone(),
                None => rows.push(staged.clone()),
            }
        }
        rows
    }

    fn upsert(&self, record: Record) -> u32 {
        let mut tables = self.guard();
        let record = if record.id() == 0 {
            let id = tables.next_id;
            tables.next_id += 1;
            record.with_id(id)
        } else {
            record
        };
        let id = record.id();
        tables.staged.push(record);
        id
    }

    fn commit(&self) {
        let mut tables = self.guard();
        let staged = std::mem::take(&mut tables.staged);
        for record in staged {
            let rows = tables.committed.entry(record.kind()).or_default();
            match rows.iter_mut().find(|r| r.id() == record.id()) {
                Some(row) => *row = record,
                None => rows.push(record),
            }
        }
    }

    fn rollback(&self) {
        self.guard().staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> Record {
        Record::User(UserRecord {
            id: 0,
            name: name.into(),
            password: "pw".into(),
            plays: 0,
        })
    }

    #[test]
    fn staged_writes_are_visible_before_commit() {
        let store = MemStore::new();
        let id = store.upsert(user("alice"));
        assert_ne!(id, 0);
        let found = store.find(RecordKind::User, &Filter::Name("alice".into()));
        assert!(matches!(found, Some(Record::User(u)) if u.id == id));
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let store = MemStore::new();
        store.upsert(user("alice"));
        store.rollback();
        assert!(store
            .find(RecordKind::User, &Filter::Name("alice".into()))
            .is_none());
    }

    #[test]
    fn commit_then_rollback_keeps_committed_rows() {
        let store = MemStore::new();
        let id = store.upsert(user("alice"));
        store.commit();

        let mut updated = UserRecord {
            id,
            name: "alice".into(),
            password: "pw".into(),
            plays: 0,
        };
        updated.plays = 3;
        store.upsert(Record::User(updated));
        store.rollback();

        match store.find(RecordKind::User, &Filter::Id(id)) {
            Some(Record::User(u)) => assert_eq!(u.plays, 0),
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn list_merges_staged_over_committed() {
        let store = MemStore::new();
        let id = store.upsert(user("alice"));
        store.commit();
        store.upsert(Record::User(UserRecord {
            id,
            name: "alice".into(),
            password: "pw".into(),
            plays: 7,
        }));
        store.upsert(user("bob"));

        let rows = store.list(RecordKind::User);
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .any(|r| matches!(r, Record::User(u) if u.name == "alice" && u.plays == 7)));
    }

    #[test]
    fn song_key_matches_the_full_triple() {
        let store = MemStore::new();
        store.upsert(Record::Song(SongRecord {
            id: 0,
            title: "Max 300".into(),
            subtitle: "".into(),
            artist: "Omega".into(),
            plays: 0,
        }));
        let key = Filter::SongKey {
            title: "Max 300".into(),
            subtitle: "".into(),
            artist: "Someone Else".into(),
        };
        assert!(store.find(RecordKind::Song, &key).is_none());
    }
}
