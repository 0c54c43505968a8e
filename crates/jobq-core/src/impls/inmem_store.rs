//! InMemoryStore - 開発用・テスト用の Store 実装
//!
//! # 実装詳細
//! - key/value は有効期限付き（get 時に遅延削除）
//! - sorted set は `BTreeSet<(score, seq, member)>` で管理、同点は挿入順（FIFO）
//! - すべての操作は 1 回のロックで完結するのでアトミック

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::ports::{Clock, Store, StoreError, SystemClock};
use crate::queue::Score;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct SortedSet {
    scores: HashMap<String, (Score, u64)>,
    ordered: BTreeSet<(Score, u64, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: Score, seq: u64, member: &str) {
        if let Some((old_score, old_seq)) = self.scores.remove(member) {
            self.ordered.remove(&(old_score, old_seq, member.to_string()));
        }
        self.scores.insert(member.to_string(), (score, seq));
        self.ordered.insert((score, seq, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some((score, seq)) => {
                self.ordered.remove(&(score, seq, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn pop_min(&mut self) -> Option<(String, Score)> {
        let (score, _, member) = self.ordered.pop_first()?;
        self.scores.remove(&member);
        Some((member, score))
    }

    fn range(&self, min: Score, max: Score) -> Vec<String> {
        if min > max {
            return Vec::new();
        }
        self.ordered
            .range((min, 0, String::new())..)
            .take_while(|(score, _, _)| *score <= max)
            .map(|(_, _, member)| member.clone())
            .collect()
    }
}

#[derive(Default)]
struct InMemoryState {
    values: HashMap<String, Entry>,
    sorted_sets: HashMap<String, SortedSet>,
    sets: HashMap<String, HashSet<String>>,
    next_seq: u64,
}

/// In-memory [`Store`].
///
/// # 使用例
/// ```ignore
/// let store = Arc::new(InMemoryStore::new());
/// let queue = JobQueue::<serde_json::Value>::new(store, QueueConfig::default())?;
/// ```
pub struct InMemoryStore {
    state: Mutex<InMemoryState>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Expiry is judged against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every operation fails with
    /// [`StoreError::Unavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Backend(format!("ttl out of range: {e}")))?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| StoreError::Backend("ttl out of range".into()))?;

        let mut state = self.state.lock().await;
        state
            .values
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        let now = self.clock.now();

        let mut state = self.state.lock().await;
        let expired = match state.values.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
        };
        if expired {
            state.values.remove(key);
        }
        Ok(None)
    }

    async fn sorted_set_add(
        &self,
        set: &str,
        score: Score,
        member: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .sorted_sets
            .entry(set.to_string())
            .or_default()
            .insert(score, seq, member);
        Ok(())
    }

    async fn sorted_set_pop_min(&self, set: &str) -> Result<Option<(String, Score)>, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.sorted_sets.get_mut(set).and_then(SortedSet::pop_min))
    }

    async fn sorted_set_range_by_score(
        &self,
        set: &str,
        min: Score,
        max: Score,
    ) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .sorted_sets
            .get(set)
            .map(|s| s.range(min, max))
            .unwrap_or_default())
    }

    async fn sorted_set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state
            .sorted_sets
            .get_mut(set)
            .is_some_and(|s| s.remove(member)))
    }

    async fn sorted_set_cardinality(&self, set: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.sorted_sets.get(set).map_or(0, |s| s.scores.len()))
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.sets.get_mut(set).is_some_and(|s| s.remove(member)))
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_cardinality(&self, set: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.sets.get(set).map_or(0, HashSet::len))
    }
}
