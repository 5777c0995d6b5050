use std::rc::Rc;

use super::cache::{EntityCache, LoadState};
use super::{Link, StoreResult, require_text, user_of};
use crate::clock::Clock;
use crate::gateway::Gateway;
use crate::models::{JournalEntry, JournalEntryPatch, NewJournalEntry};
use crate::relay::Relay;

pub struct JournalManager {
    gateway: Rc<dyn Gateway>,
    clock: Rc<dyn Clock>,
    cache: EntityCache<JournalEntry>,
    link: Option<Link>,
}

impl JournalManager {
    pub fn new(gateway: Rc<dyn Gateway>, clock: Rc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            cache: EntityCache::with_order(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
            link: None,
        }
    }

    pub fn attach(&mut self, user_id: &str, relay: &Relay) {
        self.detach();
        let gateway = Rc::clone(&self.gateway);
        self.link = Some(Link::open(&mut self.cache, relay, user_id, || {
            gateway.list_journal_entries(user_id)
        }));
    }

    pub fn detach(&mut self) {
        if self.link.take().is_some() {
            self.cache.clear();
        }
    }

    pub fn state(&self) -> LoadState {
        self.cache.state()
    }

    /// Entries, newest first
    pub fn entries(&self) -> &[JournalEntry] {
        self.cache.items()
    }

    pub fn pump(&mut self) -> usize {
        match &self.link {
            Some(link) => link.pump(&mut self.cache),
            None => 0,
        }
    }

    pub fn add_entry(&mut self, content: &str) -> StoreResult<JournalEntry> {
        let user_id = user_of(&self.link)?;
        require_text(content, "journal entry")?;

        let entry = NewJournalEntry {
            created_at: self.clock.now(),
            content: content.to_string(),
        };
        let created = self.gateway.create_journal_entry(&entry, user_id)?;
        self.cache.upsert(created.clone());
        Ok(created)
    }

    pub fn update_entry(&mut self, id: i64, content: &str) -> StoreResult<JournalEntry> {
        let user_id = user_of(&self.link)?;
        require_text(content, "journal entry")?;

        let patch = JournalEntryPatch {
            content: Some(content.to_string()),
        };
        let updated = self.gateway.update_journal_entry(id, &patch, user_id)?;
        self.cache.upsert(updated.clone());
        Ok(updated)
    }

    pub fn delete_entry(&mut self, id: i64) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        self.gateway.delete_journal_entry(id, user_id)?;
        self.cache.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::database::Database;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_entries_newest_first() {
        let relay = Relay::new();
        let db = Rc::new(Database::open_in_memory(relay.clone()).unwrap());
        let clock = Rc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 10, 21, 0, 0).unwrap()));
        let mut manager = JournalManager::new(db, clock.clone());
        manager.attach("alice", &relay);

        let first = manager.add_entry("Long day.").unwrap();
        clock.advance(Duration::hours(12));
        manager.add_entry("Fresh start.").unwrap();
        manager.pump();

        let contents: Vec<_> = manager.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["Fresh start.", "Long day."]);

        manager.update_entry(first.id, "Long, good day.").unwrap();
        assert_eq!(manager.entries()[1].content, "Long, good day.");
        assert!(manager.add_entry("   ").is_err());
    }
}
