//! The store facade.
//!
//! Every public operation first waits for the store to finish loading, then
//! enters the queues for the resources it touches, in the fixed order
//! `update → insert/delete → index → page → write`. Engine state sits
//! behind one lock that is only held for synchronous work; callbacks from
//! the caller always run outside it.

use crate::cache::Record;
use crate::config::Config;
use crate::entry::Header;
use crate::error::{CoreError, CoreResult};
use crate::index::{matches_condition, normalize_properties, IndexHandle, IndexInfo};
use crate::query::{Collector, FilterOptions};
use crate::queue::{Queue, Turn};
use crate::sequence::{Sequence, SequenceOptions};
use crate::state::State;
use crate::stats::{StatsSnapshot, StoreStats};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use slotdb_storage::{FileBackend, StorageBackend};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Where a store is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// `load` has not finished; operations wait.
    Loading,
    /// Operations are admitted.
    Ready,
    /// Operations fail with [`CoreError::Closed`].
    Closed,
}

/// What a scan visitor decided about one record.
pub(crate) enum Step {
    Skip,
    Match,
    /// Matched, and nothing more is wanted.
    Stop,
}

/// A single-file record store.
pub struct Store {
    pub(crate) config: Config,
    pub(crate) state: Mutex<State>,
    pub(crate) write_queue: Queue,
    pub(crate) update_queue: Queue,
    pub(crate) insert_delete_queue: Queue,
    pub(crate) page_queue: Queue,
    lifecycle: watch::Sender<Lifecycle>,
    pub(crate) stats: Arc<StoreStats>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("lifecycle", &*self.lifecycle.borrow())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Creates a store over `backend`. Nothing is read until [`Store::load`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration cannot produce a
    /// valid header.
    pub fn new(backend: impl StorageBackend + 'static, config: Config) -> CoreResult<Self> {
        let stats = Arc::new(StoreStats::new());
        let state = State::new(Box::new(backend), &config, Arc::clone(&stats))?;
        let (lifecycle, _) = watch::channel(Lifecycle::Loading);
        Ok(Self {
            config,
            state: Mutex::new(state),
            write_queue: Queue::new("write"),
            update_queue: Queue::new("update"),
            insert_delete_queue: Queue::new("insert/delete"),
            page_queue: Queue::new("page"),
            lifecycle,
            stats,
        })
    }

    /// Reads the file (or initializes an empty one) and admits operations.
    ///
    /// A failed load closes the store.
    pub fn load(&self) -> CoreResult<()> {
        if *self.lifecycle.borrow() != Lifecycle::Loading {
            return Err(CoreError::invalid_argument("store is already loaded"));
        }
        let result = self.state.lock().load(&self.config);
        match result {
            Ok(()) => {
                self.lifecycle.send_replace(Lifecycle::Ready);
                Ok(())
            }
            Err(e) => {
                self.lifecycle.send_replace(Lifecycle::Closed);
                Err(e)
            }
        }
    }

    /// Opens the file at `path` and loads it.
    pub async fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let path = path.as_ref();
        if !config.create_if_missing && !path.exists() {
            return Err(CoreError::not_found("file", path.display().to_string()));
        }
        let backend = FileBackend::open_with_create_dirs(path)?;
        let store = Self::new(backend, config)?;
        store.load()?;
        Ok(store)
    }

    /// Opens a store that lives in memory only.
    pub async fn open_in_memory(config: Config) -> CoreResult<Self> {
        let store = Self::new(slotdb_storage::InMemoryBackend::new(), config)?;
        store.load()?;
        Ok(store)
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Waits for loading to finish and fails if the store is closed.
    pub(crate) async fn admit(&self) -> CoreResult<()> {
        let mut rx = self.lifecycle.subscribe();
        let stage = *rx
            .wait_for(|stage| *stage != Lifecycle::Loading)
            .await
            .map_err(|_| CoreError::Closed)?;
        match stage {
            Lifecycle::Ready => Ok(()),
            _ => Err(CoreError::Closed),
        }
    }

    /// Runs `f` against the engine state inside a write-queue turn.
    pub(crate) async fn commit<T>(
        &self,
        f: impl FnOnce(&mut State) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let _write = self.write_queue.enter().await;
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Enters the queue of every index, in creation order.
    pub(crate) async fn enter_indexes(indexes: &[Arc<IndexHandle>]) -> Vec<Turn<'_>> {
        let mut turns = Vec::with_capacity(indexes.len());
        for index in indexes {
            turns.push(index.queue.enter().await);
        }
        turns
    }

    /// Marks the store closed, waits for every queue to empty, then flushes
    /// the file. Closing twice is a no-op.
    pub async fn close(&self) -> CoreResult<()> {
        if self.lifecycle.send_replace(Lifecycle::Closed) == Lifecycle::Closed {
            return Ok(());
        }
        let indexes = self.state.lock().indexes.clone();
        let queues = [&self.update_queue, &self.insert_delete_queue]
            .into_iter()
            .chain(indexes.iter().map(|i| &i.queue))
            .chain([&self.page_queue, &self.write_queue]);
        for queue in queues {
            queue.drain().await;
            debug!(queue = queue.name(), "drained queue");
        }

        let mut state = self.state.lock();
        state.release(self.config.sync_on_close)?;
        info!(records = state.header.count, "closed store");
        Ok(())
    }

    // ---- sequences ----

    /// Creates a sequence that fills property `name` on every insert.
    ///
    /// # Errors
    ///
    /// `DuplicateDefinition` if a sequence with that name exists.
    pub async fn create_sequence(
        &self,
        name: &str,
        options: SequenceOptions,
    ) -> CoreResult<Sequence> {
        self.admit().await?;
        if self.state.lock().find_sequence(name).is_some() {
            return Err(CoreError::duplicate("sequence", name));
        }
        let _insert = self.insert_delete_queue.enter().await;
        let _page = self.page_queue.enter().await;
        self.commit(|state| {
            let sequence = state.create_sequence(name, options)?;
            state.rebalance_cache()?;
            Ok(sequence)
        })
        .await
    }

    /// Advances sequence `name` and returns the value it produced.
    pub async fn increment_sequence(&self, name: &str) -> CoreResult<Value> {
        self.admit().await?;
        let _insert = self.insert_delete_queue.enter().await;
        self.commit(|state| {
            let idx = state
                .find_sequence(name)
                .ok_or_else(|| CoreError::not_found("sequence", name))?;
            state.next_sequence_value(idx)
        })
        .await
    }

    /// All sequences, most recently created first.
    #[must_use]
    pub fn sequences(&self) -> Vec<Sequence> {
        self.state.lock().sequences.iter().map(Sequence::from).collect()
    }

    // ---- indexes ----

    /// Builds a hash index over `properties` and fills it from the records
    /// already stored. A `capacity` of zero uses the configured default.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty property list or an oversized table,
    /// `DuplicateDefinition` if the same property set is already indexed.
    pub async fn create_index<S: AsRef<str>>(
        &self,
        capacity: u64,
        properties: &[S],
    ) -> CoreResult<IndexInfo> {
        self.admit().await?;
        let properties = normalize_properties(properties);
        if properties.is_empty() {
            return Err(CoreError::invalid_argument("an index needs at least one property"));
        }
        let key = properties.join(";");
        if self.state.lock().find_index(&key).is_some() {
            return Err(CoreError::duplicate("index", key));
        }
        let capacity = if capacity == 0 {
            self.config.default_index_capacity
        } else {
            capacity
        };

        let _insert = self.insert_delete_queue.enter().await;
        let index = {
            let _page = self.page_queue.enter().await;
            self.commit(|state| {
                if state.find_index(&key).is_some() {
                    return Err(CoreError::duplicate("index", key.as_str()));
                }
                state.append_index_block(properties, capacity)
            })
            .await?
        };

        let _turn = index.queue.enter().await;
        let populated = self
            .commit(|state| {
                let n = state.populate_index(&index)?;
                state.rebalance_cache()?;
                Ok(n)
            })
            .await?;
        let info = index.info();
        info!(index = %key, buckets = info.buckets, records = populated, "created index");
        Ok(info)
    }

    /// Rebuilds the index over `properties` with a new capacity.
    pub async fn grow_index<S: AsRef<str>>(
        &self,
        capacity: u64,
        properties: &[S],
    ) -> CoreResult<IndexInfo> {
        self.delete_index(properties).await?;
        self.create_index(capacity, properties).await
    }

    /// Drops the index over `properties`.
    ///
    /// The bucket table is marked free but never reused, and its collision
    /// chain records stay in place.
    pub async fn delete_index<S: AsRef<str>>(&self, properties: &[S]) -> CoreResult<()> {
        self.admit().await?;
        let key = normalize_properties(properties).join(";");
        let index = self
            .state
            .lock()
            .find_index(&key)
            .ok_or_else(|| CoreError::not_found("index", key.as_str()))?;

        let _insert = self.insert_delete_queue.enter().await;
        let _turn = index.queue.enter().await;
        self.commit(|state| state.drop_index(&index)).await?;
        info!(index = %key, "deleted index");
        Ok(())
    }

    /// All indexes, in creation order.
    #[must_use]
    pub fn indexes(&self) -> Vec<IndexInfo> {
        self.state.lock().indexes.iter().map(|i| i.info()).collect()
    }

    // ---- insertion ----

    /// Stores `record` and returns it as written, sequence fields filled in.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `record` is not a JSON object.
    pub async fn add(&self, record: Value) -> CoreResult<Value> {
        self.admit().await?;
        let Value::Object(mut object) = record else {
            return Err(CoreError::invalid_argument("records must be JSON objects"));
        };

        let _insert = self.insert_delete_queue.enter().await;
        let indexes = self.state.lock().indexes.clone();
        let _index_turns = Self::enter_indexes(&indexes).await;
        let _page = self.page_queue.enter().await;
        let stored = self
            .commit(|state| {
                state.apply_sequences(&mut object)?;
                let value = Value::Object(object);
                let (placement, _) = state.insert_record(serde_json::to_vec(&value)?)?;
                let rel = state.relative(placement.page, placement.position)?;
                for index in &indexes {
                    state.index_insert(index, index.hash_of(&value), placement.page, rel, true)?;
                }
                state.touch_page(placement.page)?;
                state.rebalance_cache()?;
                Ok(value)
            })
            .await?;
        self.stats.record_add();
        Ok(stored)
    }

    // ---- queries ----

    /// Walks every live record in page-rank order, handing each one to
    /// `visit`. Pages with a match are stamped as used; the cache is
    /// re-ranked between pages and once more at the end.
    pub(crate) async fn scan<F>(&self, mut visit: F) -> CoreResult<usize>
    where
        F: FnMut(u32, &Arc<Record>) -> Step,
    {
        self.stats.record_scan();
        let order = self.state.lock().ranked_pages();
        let mut matched = 0;
        for number in order {
            let records = self.state.lock().page_records(number)?;
            let mut page_matched = false;
            let mut stop = false;
            for record in records.iter() {
                match visit(number, record) {
                    Step::Skip => continue,
                    Step::Match => {}
                    Step::Stop => stop = true,
                }
                page_matched = true;
                matched += 1;
                if stop {
                    break;
                }
            }
            if page_matched {
                self.commit(|state| {
                    state.touch_page(number)?;
                    state.rebalance_cache()
                })
                .await?;
            }
            if stop {
                break;
            }
        }
        self.commit(State::rebalance_cache).await?;
        Ok(matched)
    }

    /// Full scan. Records for which `predicate` holds are passed to
    /// `on_match`, which can end the search early. Returns the number of
    /// records delivered.
    pub async fn search<P, M>(&self, mut predicate: P, mut on_match: M) -> CoreResult<usize>
    where
        P: FnMut(&Value) -> bool,
        M: FnMut(&Value) -> ControlFlow<()>,
    {
        self.admit().await?;
        self.scan(|_, record| {
            if !predicate(&record.value) {
                return Step::Skip;
            }
            match on_match(&record.value) {
                ControlFlow::Continue(()) => Step::Match,
                ControlFlow::Break(()) => Step::Stop,
            }
        })
        .await
    }

    /// Passes every record to `on_match`.
    pub async fn for_each<M>(&self, on_match: M) -> CoreResult<usize>
    where
        M: FnMut(&Value) -> ControlFlow<()>,
    {
        self.search(|_| true, on_match).await
    }

    /// Full scan with skip, limit and sort.
    pub async fn filter<P>(&self, predicate: P, options: FilterOptions) -> CoreResult<Vec<Value>>
    where
        P: FnMut(&Value) -> bool,
    {
        let mut collector = Collector::new(options);
        self.search(predicate, |value| collector.offer(value)).await?;
        Ok(collector.finish())
    }

    /// Point lookup through the index whose properties are exactly the keys
    /// of `condition`. Candidates must equal `condition` field by field and
    /// satisfy `predicate` to reach `on_match`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `condition` is not a non-empty object,
    /// `NotFound` if no index covers its keys.
    pub async fn search_by_index<P, M>(
        &self,
        condition: &Value,
        mut predicate: P,
        mut on_match: M,
    ) -> CoreResult<usize>
    where
        P: FnMut(&Value) -> bool,
        M: FnMut(&Value) -> ControlFlow<()>,
    {
        self.admit().await?;
        let fields = condition_fields(condition)?;
        let key = normalize_properties(&fields.keys().collect::<Vec<_>>()).join(";");

        let hits = {
            let mut state = self.state.lock();
            let index = state
                .find_index(&key)
                .ok_or_else(|| CoreError::not_found("index", key.as_str()))?;
            self.stats.record_index_lookup();
            let candidates = state.index_candidates(&index, index.hash_of(condition))?;
            let mut hits = Vec::with_capacity(candidates.len());
            for (page, position) in candidates {
                if let Some(record) = state.record_at(page, position)? {
                    if matches_condition(fields, &record.value) {
                        hits.push((page, record));
                    }
                }
            }
            hits
        };
        debug!(index = %key, candidates = hits.len(), "index lookup");

        let mut delivered = 0;
        let mut touched = Vec::new();
        for (page, record) in &hits {
            if !predicate(&record.value) {
                continue;
            }
            delivered += 1;
            if !touched.contains(page) {
                touched.push(*page);
            }
            if on_match(&record.value).is_break() {
                break;
            }
        }
        if !touched.is_empty() {
            self.commit(|state| {
                for page in touched {
                    state.touch_page(page)?;
                }
                state.rebalance_cache()
            })
            .await?;
        }
        Ok(delivered)
    }

    /// Index lookup with skip, limit and sort.
    pub async fn filter_by_index<P>(
        &self,
        condition: &Value,
        predicate: P,
        options: FilterOptions,
    ) -> CoreResult<Vec<Value>>
    where
        P: FnMut(&Value) -> bool,
    {
        let mut collector = Collector::new(options);
        self.search_by_index(condition, predicate, |value| collector.offer(value))
            .await?;
        Ok(collector.finish())
    }

    // ---- introspection ----

    /// A copy of the in-memory header.
    #[must_use]
    pub fn header(&self) -> Header {
        self.state.lock().header.clone()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

fn condition_fields(condition: &Value) -> CoreResult<&Map<String, Value>> {
    match condition {
        Value::Object(fields) if !fields.is_empty() => Ok(fields),
        _ => Err(CoreError::invalid_argument(
            "an index condition must be a non-empty object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn close_drains_index_queues() {
        let store = Arc::new(Store::open_in_memory(Config::default()).await.unwrap());
        store.create_index(0, &["n"]).await.unwrap();
        let index = Arc::clone(&store.state.lock().indexes[0]);
        let turn = index.queue.enter().await;

        let add = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.add(json!({"n": 1})).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let close = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.close().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!add.is_finished());
        assert!(!close.is_finished());
        assert_eq!(store.lifecycle(), Lifecycle::Closed);

        drop(turn);
        add.await.unwrap().unwrap();
        close.await.unwrap().unwrap();
        assert_eq!(store.header().count, 1);
    }
}
