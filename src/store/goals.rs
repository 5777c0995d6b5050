use std::rc::Rc;

use super::cache::{EntityCache, LoadState};
use super::{Link, StoreResult, require_text, user_of};
use crate::clock::Clock;
use crate::gateway::Gateway;
use crate::models::{Goal, GoalPatch, NewGoal};
use crate::relay::Relay;

pub struct GoalManager {
    gateway: Rc<dyn Gateway>,
    clock: Rc<dyn Clock>,
    cache: EntityCache<Goal>,
    link: Option<Link>,
}

impl GoalManager {
    pub fn new(gateway: Rc<dyn Gateway>, clock: Rc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            cache: EntityCache::new(),
            link: None,
        }
    }

    pub fn attach(&mut self, user_id: &str, relay: &Relay) {
        self.detach();
        let gateway = Rc::clone(&self.gateway);
        self.link = Some(Link::open(&mut self.cache, relay, user_id, || gateway.list_goals(user_id)));
    }

    pub fn detach(&mut self) {
        if self.link.take().is_some() {
            self.cache.clear();
        }
    }

    pub fn state(&self) -> LoadState {
        self.cache.state()
    }

    pub fn goals(&self) -> &[Goal] {
        self.cache.items()
    }

    pub fn get(&self, id: i64) -> Option<&Goal> {
        self.cache.get(id)
    }

    pub fn pump(&mut self) -> usize {
        match &self.link {
            Some(link) => link.pump(&mut self.cache),
            None => 0,
        }
    }

    pub fn add_goal(&mut self, name: &str, description: &str) -> StoreResult<Goal> {
        let user_id = user_of(&self.link)?;
        require_text(name, "goal name")?;

        let goal = NewGoal {
            name: name.trim().to_string(),
            description: description.to_string(),
            created_at: self.clock.now(),
        };
        let created = self.gateway.create_goal(&goal, user_id)?;
        self.cache.upsert(created.clone());
        Ok(created)
    }

    pub fn update_goal(&mut self, id: i64, patch: &GoalPatch) -> StoreResult<Goal> {
        let user_id = user_of(&self.link)?;
        if let Some(name) = &patch.name {
            require_text(name, "goal name")?;
        }
        let updated = self.gateway.update_goal(id, patch, user_id)?;
        self.cache.upsert(updated.clone());
        Ok(updated)
    }

    /// Remove a goal. Its tasks are left alone and keep the dangling goal id.
    pub fn delete_goal(&mut self, id: i64) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        self.gateway.delete_goal(id, user_id)?;
        self.cache.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::database::Database;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_goal_crud() {
        let relay = Relay::new();
        let db = Rc::new(Database::open_in_memory(relay.clone()).unwrap());
        let clock = Rc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()));
        let mut manager = GoalManager::new(db, clock);
        manager.attach("alice", &relay);
        assert_eq!(manager.state(), LoadState::Ready);

        let first = manager.add_goal("Run a marathon", "").unwrap();
        let second = manager.add_goal("Learn Rust", "ownership first").unwrap();
        assert_eq!(manager.goals()[0].id, second.id);

        let renamed = manager
            .update_goal(first.id, &GoalPatch { name: Some("Run a half".into()), ..GoalPatch::default() })
            .unwrap();
        assert_eq!(renamed.name, "Run a half");

        manager.delete_goal(second.id).unwrap();
        manager.pump();
        assert_eq!(manager.goals().len(), 1);
        assert!(manager.add_goal("", "").is_err());
    }
}
