//! In-memory `PostStore` for tests.
//!
//! A transaction works on a snapshot of the tables taken at `begin` and swaps
//! it in on `commit`, so dropped or failed transactions leave nothing behind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::models::{
    DraftSummary, DuePost, NewPost, PostRecord, PostStatus, StoredMedia, ThreadUnit, TweetInput,
};
use super::store::{PostStore, PostTx};
use crate::domain::accounts::Credentials;

/// Operation that fails when armed with [`MemoryPostStore::fail_on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertPost,
    InsertSchedule,
    InsertDraft,
    InsertThread,
    UpsertThread,
    InsertMedia,
    DeleteMedia,
    Commit,
    SetStatus(PostStatus),
}

#[derive(Debug, Clone)]
pub struct ScheduleRow {
    pub account_id: i64,
    pub timestamp: i64,
    pub status: PostStatus,
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    next_id: i64,
    pub posts: BTreeMap<i64, NewPost>,
    pub schedules: BTreeMap<i64, ScheduleRow>,
    pub drafts: BTreeMap<i64, i64>,
    pub thread: BTreeMap<(i64, i32), String>,
    pub media: BTreeMap<(i64, i32, i32), String>,
    pub credentials: HashMap<i64, Credentials>,
    pub offsets: HashMap<i64, i32>,
    /// plug id -> (account id, content)
    pub plugs: HashMap<i64, (i64, String)>,
    /// category id -> creating user
    pub categories: HashMap<i64, i64>,
}

impl Tables {
    fn thread_of(&self, post_id: i64) -> Vec<ThreadUnit> {
        self.thread
            .range((post_id, i32::MIN)..=(post_id, i32::MAX))
            .map(|((_, order), tweet)| ThreadUnit {
                tweet: tweet.clone(),
                tweet_order: *order,
            })
            .collect()
    }

    fn media_of(&self, post_id: i64) -> Vec<StoredMedia> {
        self.media
            .range((post_id, i32::MIN, i32::MIN)..=(post_id, i32::MAX, i32::MAX))
            .map(|((_, tweet_order, media_order), key)| StoredMedia {
                tweet_order: *tweet_order,
                media_order: *media_order,
                key: key.clone(),
            })
            .collect()
    }

    /// Keys of the post outside `keep` that no other post references
    fn unshared_keys(&self, post_id: i64, keep: &[String]) -> Vec<String> {
        let mut keys: Vec<String> = self
            .media_of(post_id)
            .into_iter()
            .map(|m| m.key)
            .filter(|key| !keep.contains(key))
            .filter(|key| {
                !self
                    .media
                    .iter()
                    .any(|((id, _, _), other)| *id != post_id && other == key)
            })
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn record(&self, post_id: i64, timestamp: i64, status: PostStatus) -> Option<PostRecord> {
        self.posts.get(&post_id).map(|post| PostRecord {
            id: post_id,
            description: post.description.clone(),
            category_id: post.category_id,
            plug_id: post.plug_id,
            timestamp,
            status,
        })
    }
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    armed: Mutex<HashSet<FailPoint>>,
    status_log: Mutex<Vec<(i64, PostStatus)>>,
}

impl Shared {
    fn check(&self, point: FailPoint) -> Result<(), sqlx::Error> {
        if self.armed.lock().unwrap().contains(&point) {
            return Err(sqlx::Error::Protocol(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryPostStore {
    shared: Arc<Shared>,
}

impl MemoryPostStore {
    pub fn fail_on(&self, point: FailPoint) {
        self.shared.armed.lock().unwrap().insert(point);
    }

    pub fn connect(&self, account_id: i64, credentials: Credentials) {
        self.shared
            .tables
            .lock()
            .unwrap()
            .credentials
            .insert(account_id, credentials);
    }

    pub fn set_offset(&self, user_id: i64, offset_minutes: i32) {
        self.shared.tables.lock().unwrap().offsets.insert(user_id, offset_minutes);
    }

    pub fn add_plug(&self, plug_id: i64, account_id: i64, content: &str) {
        self.shared
            .tables
            .lock()
            .unwrap()
            .plugs
            .insert(plug_id, (account_id, content.to_string()));
    }

    pub fn add_category(&self, category_id: i64, user_id: i64) {
        self.shared
            .tables
            .lock()
            .unwrap()
            .categories
            .insert(category_id, user_id);
    }

    /// Committed state
    pub fn tables(&self) -> Tables {
        self.shared.tables.lock().unwrap().clone()
    }

    /// Edit committed state directly, bypassing the status log
    pub fn tables_mut(&self, edit: impl FnOnce(&mut Tables)) {
        edit(&mut self.shared.tables.lock().unwrap());
    }

    /// Every status write, in order
    pub fn status_log(&self) -> Vec<(i64, PostStatus)> {
        self.shared.status_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn begin(&self) -> Result<Box<dyn PostTx>, sqlx::Error> {
        let working = self.shared.tables.lock().unwrap().clone();
        Ok(Box::new(MemoryTx {
            shared: self.shared.clone(),
            working,
        }))
    }

    async fn has_credentials(&self, account_id: i64) -> Result<bool, sqlx::Error> {
        Ok(self.shared.tables.lock().unwrap().credentials.contains_key(&account_id))
    }

    async fn credentials(&self, account_id: i64) -> Result<Option<Credentials>, sqlx::Error> {
        Ok(self.shared.tables.lock().unwrap().credentials.get(&account_id).cloned())
    }

    async fn offset_minutes(&self, user_id: i64) -> Result<i32, sqlx::Error> {
        Ok(self
            .shared
            .tables
            .lock()
            .unwrap()
            .offsets
            .get(&user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn fetch_post(&self, account_id: i64, post_id: i64) -> Result<Option<PostRecord>, sqlx::Error> {
        let tables = self.shared.tables.lock().unwrap();
        Ok(tables
            .schedules
            .get(&post_id)
            .filter(|s| s.account_id == account_id)
            .and_then(|s| tables.record(post_id, s.timestamp, s.status)))
    }

    async fn fetch_draft(
        &self,
        account_id: i64,
        post_id: i64,
        pseudo_timestamp: i64,
    ) -> Result<Option<PostRecord>, sqlx::Error> {
        let tables = self.shared.tables.lock().unwrap();
        Ok(tables
            .drafts
            .get(&post_id)
            .filter(|owner| **owner == account_id)
            .and_then(|_| tables.record(post_id, pseudo_timestamp, PostStatus::Draft)))
    }

    async fn fetch_drafts(&self, account_id: i64) -> Result<Vec<DraftSummary>, sqlx::Error> {
        let tables = self.shared.tables.lock().unwrap();
        Ok(tables
            .drafts
            .iter()
            .rev()
            .filter(|(_, owner)| **owner == account_id)
            .filter_map(|(id, _)| {
                tables.posts.get(id).map(|post| DraftSummary {
                    id: *id,
                    description: post.description.clone(),
                    category_id: post.category_id,
                    plug_id: post.plug_id,
                })
            })
            .collect())
    }

    async fn fetch_thread(&self, post_id: i64) -> Result<Vec<ThreadUnit>, sqlx::Error> {
        Ok(self.shared.tables.lock().unwrap().thread_of(post_id))
    }

    async fn fetch_media(&self, post_id: i64) -> Result<Vec<StoredMedia>, sqlx::Error> {
        Ok(self.shared.tables.lock().unwrap().media_of(post_id))
    }

    async fn exclusive_media_keys(&self, post_id: i64) -> Result<Vec<String>, sqlx::Error> {
        Ok(self.shared.tables.lock().unwrap().unshared_keys(post_id, &[]))
    }

    async fn fetch_plug_content(&self, post_id: i64) -> Result<Option<String>, sqlx::Error> {
        let tables = self.shared.tables.lock().unwrap();
        Ok(tables.posts.get(&post_id).and_then(|post| {
            post.plug_id
                .and_then(|plug_id| tables.plugs.get(&plug_id))
                .filter(|(owner, _)| *owner == post.account_id)
                .map(|(_, content)| content.clone())
        }))
    }

    async fn scheduled_between(
        &self,
        account_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<PostRecord>, sqlx::Error> {
        let tables = self.shared.tables.lock().unwrap();
        let mut rows: Vec<PostRecord> = tables
            .schedules
            .iter()
            .filter(|(_, s)| {
                s.account_id == account_id
                    && s.status == PostStatus::Scheduled
                    && (start..=end).contains(&s.timestamp)
            })
            .filter_map(|(id, s)| tables.record(*id, s.timestamp, s.status))
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        Ok(rows)
    }

    async fn due_posts(&self, timestamp: i64) -> Result<Vec<DuePost>, sqlx::Error> {
        Ok(self
            .shared
            .tables
            .lock()
            .unwrap()
            .schedules
            .iter()
            .filter(|(_, s)| s.timestamp == timestamp && s.status == PostStatus::Scheduled)
            .map(|(id, s)| DuePost {
                post_id: *id,
                account_id: s.account_id,
            })
            .collect())
    }

    async fn claim_for_dispatch(&self, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error> {
        self.shared.check(FailPoint::SetStatus(PostStatus::Dispatching))?;
        let mut tables = self.shared.tables.lock().unwrap();
        match tables.schedules.get_mut(&post_id) {
            Some(schedule) if schedule.account_id == account_id && schedule.status == PostStatus::Scheduled => {
                schedule.status = PostStatus::Dispatching;
                self.shared
                    .status_log
                    .lock()
                    .unwrap()
                    .push((post_id, PostStatus::Dispatching));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_dispatch(&self, post_id: i64, outcome: PostStatus) -> Result<bool, sqlx::Error> {
        self.shared.check(FailPoint::SetStatus(outcome))?;
        let mut tables = self.shared.tables.lock().unwrap();
        match tables.schedules.get_mut(&post_id) {
            Some(schedule) if schedule.status == PostStatus::Dispatching => {
                schedule.status = outcome;
                self.shared.status_log.lock().unwrap().push((post_id, outcome));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<u64, sqlx::Error> {
        let mut tables = self.shared.tables.lock().unwrap();
        if tables.posts.get(&post_id).map(|p| p.user_id) != Some(user_id) {
            return Ok(0);
        }
        tables.posts.remove(&post_id);
        tables.schedules.remove(&post_id);
        tables.drafts.remove(&post_id);
        tables.thread.retain(|(id, _), _| *id != post_id);
        tables.media.retain(|(id, _, _), _| *id != post_id);
        Ok(1)
    }
}

struct MemoryTx {
    shared: Arc<Shared>,
    working: Tables,
}

fn unique_violation(constraint: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("duplicate key value violates unique constraint {}", constraint))
}

#[async_trait]
impl PostTx for MemoryTx {
    async fn insert_post(&mut self, post: &NewPost) -> Result<i64, sqlx::Error> {
        self.shared.check(FailPoint::InsertPost)?;
        self.working.next_id += 1;
        let id = self.working.next_id;
        self.working.posts.insert(id, post.clone());
        Ok(id)
    }

    async fn update_post(&mut self, post_id: i64, post: &NewPost) -> Result<bool, sqlx::Error> {
        match self.working.posts.get_mut(&post_id) {
            Some(existing) if existing.account_id == post.account_id => {
                existing.description = post.description.clone();
                existing.category_id = post.category_id;
                existing.plug_id = post.plug_id;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_schedule(
        &mut self,
        post_id: i64,
        account_id: i64,
        timestamp: i64,
        status: PostStatus,
    ) -> Result<(), sqlx::Error> {
        self.shared.check(FailPoint::InsertSchedule)?;
        if self.working.schedules.contains_key(&post_id) {
            return Err(unique_violation("schedules_pkey"));
        }
        self.working.schedules.insert(
            post_id,
            ScheduleRow {
                account_id,
                timestamp,
                status,
            },
        );
        Ok(())
    }

    async fn update_schedule_timestamp(
        &mut self,
        post_id: i64,
        account_id: i64,
        timestamp: i64,
    ) -> Result<bool, sqlx::Error> {
        match self.working.schedules.get_mut(&post_id) {
            Some(schedule) if schedule.account_id == account_id => {
                schedule.timestamp = timestamp;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_draft(&mut self, post_id: i64, account_id: i64) -> Result<(), sqlx::Error> {
        self.shared.check(FailPoint::InsertDraft)?;
        self.working.drafts.insert(post_id, account_id);
        Ok(())
    }

    async fn delete_draft(&mut self, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error> {
        if self.working.drafts.get(&post_id) == Some(&account_id) {
            self.working.drafts.remove(&post_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn insert_thread(&mut self, post_id: i64, tweets: &[TweetInput]) -> Result<(), sqlx::Error> {
        self.shared.check(FailPoint::InsertThread)?;
        for tweet in tweets {
            let key = (post_id, tweet.tweet_order);
            if self.working.thread.contains_key(&key) {
                return Err(unique_violation("unique_order_postid"));
            }
            self.working.thread.insert(key, tweet.tweet.clone());
        }
        Ok(())
    }

    async fn upsert_thread(&mut self, post_id: i64, tweets: &[TweetInput]) -> Result<(), sqlx::Error> {
        self.shared.check(FailPoint::UpsertThread)?;
        for tweet in tweets {
            self.working
                .thread
                .insert((post_id, tweet.tweet_order), tweet.tweet.clone());
        }
        Ok(())
    }

    async fn truncate_thread(&mut self, post_id: i64, len: i32) -> Result<u64, sqlx::Error> {
        let before = self.working.thread.len();
        self.working
            .thread
            .retain(|(id, order), _| *id != post_id || *order <= len);
        Ok((before - self.working.thread.len()) as u64)
    }

    async fn stale_media_keys(&mut self, post_id: i64, keep: &[String]) -> Result<Vec<String>, sqlx::Error> {
        Ok(self.working.unshared_keys(post_id, keep))
    }

    async fn owned_media_keys(&mut self, account_id: i64, keys: &[String]) -> Result<Vec<String>, sqlx::Error> {
        let mut owned: Vec<String> = self
            .working
            .media
            .iter()
            .filter(|((post_id, _, _), key)| {
                keys.contains(key)
                    && self.working.posts.get(post_id).map(|p| p.account_id) == Some(account_id)
            })
            .map(|(_, key)| key.clone())
            .collect();
        owned.sort();
        owned.dedup();
        Ok(owned)
    }

    async fn plug_belongs(&mut self, plug_id: i64, account_id: i64) -> Result<bool, sqlx::Error> {
        Ok(matches!(self.working.plugs.get(&plug_id), Some((owner, _)) if *owner == account_id))
    }

    async fn category_belongs(&mut self, category_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        Ok(self.working.categories.get(&category_id) == Some(&user_id))
    }

    async fn delete_media(&mut self, post_id: i64) -> Result<u64, sqlx::Error> {
        self.shared.check(FailPoint::DeleteMedia)?;
        let before = self.working.media.len();
        self.working.media.retain(|(id, _, _), _| *id != post_id);
        Ok((before - self.working.media.len()) as u64)
    }

    async fn insert_media(&mut self, post_id: i64, media: &[StoredMedia]) -> Result<(), sqlx::Error> {
        self.shared.check(FailPoint::InsertMedia)?;
        for item in media {
            let slot = (post_id, item.tweet_order, item.media_order);
            if self.working.media.contains_key(&slot) {
                return Err(unique_violation("twitter_media_slot"));
            }
            self.working.media.insert(slot, item.key.clone());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.shared.check(FailPoint::Commit)?;
        *self.shared.tables.lock().unwrap() = self.working;
        Ok(())
    }
}
