use chrono::Datelike;
use std::cmp::Ordering;
use std::rc::Rc;

use super::cache::{EntityCache, LoadState};
use super::{Link, StoreError, StoreResult, require_text, user_of};
use crate::clock::Clock;
use crate::gateway::Gateway;
use crate::models::{NewScheduleBlock, ScheduleBlock, ScheduleBlockPatch};
use crate::relay::{Collection, Relay};
use crate::utils;

fn by_day_then_start(a: &ScheduleBlock, b: &ScheduleBlock) -> Ordering {
    a.day_of_week
        .cmp(&b.day_of_week)
        .then_with(|| a.start_time.cmp(&b.start_time))
}

/// A named block on a weekday (0-6) with HH:MM times, ending after it starts.
pub(crate) fn check_block(block: &NewScheduleBlock) -> StoreResult<()> {
    require_text(&block.name, "block name")?;
    if block.day_of_week > 6 {
        return Err(StoreError::Validation(format!(
            "day of week must be 0-6, got {}",
            block.day_of_week
        )));
    }
    let start = utils::parse_time_of_day(&block.start_time)
        .map_err(|_| StoreError::Validation(format!("bad start time '{}'", block.start_time)))?;
    let end = utils::parse_time_of_day(&block.end_time)
        .map_err(|_| StoreError::Validation(format!("bad end time '{}'", block.end_time)))?;
    if end <= start {
        return Err(StoreError::Validation("a block must end after it starts".to_string()));
    }
    Ok(())
}

pub struct ScheduleManager {
    gateway: Rc<dyn Gateway>,
    clock: Rc<dyn Clock>,
    cache: EntityCache<ScheduleBlock>,
    link: Option<Link>,
}

impl ScheduleManager {
    pub fn new(gateway: Rc<dyn Gateway>, clock: Rc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            cache: EntityCache::with_order(by_day_then_start),
            link: None,
        }
    }

    pub fn attach(&mut self, user_id: &str, relay: &Relay) {
        self.detach();
        let gateway = Rc::clone(&self.gateway);
        self.link = Some(Link::open(&mut self.cache, relay, user_id, || {
            gateway.list_schedule_blocks(user_id)
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

    /// All blocks, ordered by weekday then start time
    pub fn blocks(&self) -> &[ScheduleBlock] {
        self.cache.items()
    }

    /// Blocks for one weekday (0 = Sunday), by start time
    pub fn blocks_for_day(&self, day_of_week: u8) -> Vec<&ScheduleBlock> {
        self.cache
            .items()
            .iter()
            .filter(|b| b.day_of_week == day_of_week)
            .collect()
    }

    pub fn todays_blocks(&self) -> Vec<&ScheduleBlock> {
        let weekday = self.clock.today().weekday().num_days_from_sunday() as u8;
        self.blocks_for_day(weekday)
    }

    /// (done, total) for today's blocks
    pub fn today_progress(&self) -> (usize, usize) {
        let today = self.clock.today();
        let blocks = self.todays_blocks();
        let done = blocks.iter().filter(|b| b.is_done_on(today)).count();
        (done, blocks.len())
    }

    pub fn pump(&mut self) -> usize {
        match &self.link {
            Some(link) => link.pump(&mut self.cache),
            None => 0,
        }
    }

    pub fn add_block(&mut self, block: NewScheduleBlock) -> StoreResult<ScheduleBlock> {
        let user_id = user_of(&self.link)?;
        check_block(&block)?;

        let created = self.gateway.create_schedule_block(&block, user_id)?;
        self.cache.upsert(created.clone());
        Ok(created)
    }

    pub fn delete_block(&mut self, id: i64) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        self.gateway.delete_schedule_block(id, user_id)?;
        self.cache.remove(id);
        Ok(())
    }

    /// Mark a block done for today, or undo that if it already is.
    pub fn toggle_block_completion(&mut self, id: i64) -> StoreResult<ScheduleBlock> {
        let user_id = user_of(&self.link)?;
        let block = self
            .cache
            .get(id)
            .ok_or(StoreError::NotFound { collection: Collection::ScheduleBlocks, id })?;

        let today = self.clock.today();
        let last_completed = if block.is_done_on(today) { None } else { Some(today) };
        let patch = ScheduleBlockPatch {
            last_completed: Some(last_completed),
            ..ScheduleBlockPatch::default()
        };

        let updated = self.gateway.update_schedule_block(id, &patch, user_id)?;
        self.cache.upsert(updated.clone());
        Ok(updated)
    }
}
