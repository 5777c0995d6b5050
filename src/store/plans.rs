use clap::ValueEnum;
use std::rc::Rc;

use super::cache::{EntityCache, LoadState};
use super::{Link, StoreError, StoreResult, require_text, user_of};
use crate::gateway::Gateway;
use crate::models::{DevelopmentPlan, DevelopmentPlanPatch, DevelopmentResource, NewDevelopmentPlan};
use crate::relay::{Collection, Relay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Book,
    YoutubeChannel,
    Podcast,
}

pub struct PlanManager {
    gateway: Rc<dyn Gateway>,
    cache: EntityCache<DevelopmentPlan>,
    link: Option<Link>,
}

impl PlanManager {
    pub fn new(gateway: Rc<dyn Gateway>) -> Self {
        Self {
            gateway,
            cache: EntityCache::new(),
            link: None,
        }
    }

    pub fn attach(&mut self, user_id: &str, relay: &Relay) {
        self.detach();
        let gateway = Rc::clone(&self.gateway);
        self.link = Some(Link::open(&mut self.cache, relay, user_id, || {
            gateway.list_development_plans(user_id)
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

    pub fn plans(&self) -> &[DevelopmentPlan] {
        self.cache.items()
    }

    pub fn get(&self, id: i64) -> Option<&DevelopmentPlan> {
        self.cache.get(id)
    }

    pub fn active_plans(&self) -> impl Iterator<Item = &DevelopmentPlan> {
        self.cache.items().iter().filter(|p| !p.archived)
    }

    pub fn archived_plans(&self) -> impl Iterator<Item = &DevelopmentPlan> {
        self.cache.items().iter().filter(|p| p.archived)
    }

    pub fn pump(&mut self) -> usize {
        match &self.link {
            Some(link) => link.pump(&mut self.cache),
            None => 0,
        }
    }

    pub fn create_plan(&mut self, plan: NewDevelopmentPlan) -> StoreResult<DevelopmentPlan> {
        let user_id = user_of(&self.link)?;
        require_text(&plan.goal, "plan goal")?;
        let created = self.gateway.create_development_plan(&plan, user_id)?;
        self.cache.upsert(created.clone());
        Ok(created)
    }

    pub fn set_archived(&mut self, id: i64, archived: bool) -> StoreResult<DevelopmentPlan> {
        let patch = DevelopmentPlanPatch {
            archived: Some(archived),
            ..DevelopmentPlanPatch::default()
        };
        self.update(id, &patch)
    }

    /// Swap one resource of a plan for an alternative.
    pub fn replace_resource(
        &mut self,
        id: i64,
        kind: ResourceKind,
        index: usize,
        replacement: DevelopmentResource,
    ) -> StoreResult<DevelopmentPlan> {
        let plan = self
            .cache
            .get(id)
            .ok_or(StoreError::NotFound { collection: Collection::DevelopmentPlans, id })?;

        let mut resources = match kind {
            ResourceKind::Book => plan.books.clone(),
            ResourceKind::YoutubeChannel => plan.youtube_channels.clone(),
            ResourceKind::Podcast => plan.podcasts.clone(),
        };
        let slot = resources.get_mut(index).ok_or_else(|| {
            StoreError::Validation(format!("plan {} has no {:?} at position {}", id, kind, index))
        })?;
        *slot = replacement;

        let mut patch = DevelopmentPlanPatch::default();
        match kind {
            ResourceKind::Book => patch.books = Some(resources),
            ResourceKind::YoutubeChannel => patch.youtube_channels = Some(resources),
            ResourceKind::Podcast => patch.podcasts = Some(resources),
        }
        self.update(id, &patch)
    }

    pub fn delete_plan(&mut self, id: i64) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        self.gateway.delete_development_plan(id, user_id)?;
        self.cache.remove(id);
        Ok(())
    }

    fn update(&mut self, id: i64, patch: &DevelopmentPlanPatch) -> StoreResult<DevelopmentPlan> {
        let user_id = user_of(&self.link)?;
        let updated = self.gateway.update_development_plan(id, patch, user_id)?;
        self.cache.upsert(updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn resource(title: &str) -> DevelopmentResource {
        DevelopmentResource {
            title: title.to_string(),
            author_or_channel: "someone".to_string(),
        }
    }

    #[test]
    fn test_archive_and_replace() {
        let relay = Relay::new();
        let db = Rc::new(Database::open_in_memory(relay.clone()).unwrap());
        let mut manager = PlanManager::new(db);
        manager.attach("alice", &relay);

        let plan = manager
            .create_plan(NewDevelopmentPlan {
                goal: "Public speaking".to_string(),
                books: vec![resource("Talk Like TED"), resource("Resonate")],
                youtube_channels: vec![resource("Charisma on Command")],
                podcasts: vec![],
            })
            .unwrap();

        let replaced = manager
            .replace_resource(plan.id, ResourceKind::Book, 1, resource("Confessions of a Public Speaker"))
            .unwrap();
        assert_eq!(replaced.books[1].title, "Confessions of a Public Speaker");
        assert_eq!(replaced.books[0].title, "Talk Like TED");

        assert!(matches!(
            manager.replace_resource(plan.id, ResourceKind::Podcast, 0, resource("x")),
            Err(StoreError::Validation(_))
        ));

        manager.set_archived(plan.id, true).unwrap();
        assert_eq!(manager.active_plans().count(), 0);
        assert_eq!(manager.archived_plans().count(), 1);

        manager.delete_plan(plan.id).unwrap();
        assert!(manager.plans().is_empty());
    }
}
