//! Update and delete.
//!
//! Both find their candidates with a full scan first, then mutate each one
//! in its own queue turn. A candidate is re-read inside the turn and only
//! touched if it is still the record the scan saw.

use crate::cache::Record;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexHandle;
use crate::query::merge;
use crate::state::State;
use crate::store::{Step, Store};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// A record picked by the candidate scan.
struct Hit {
    page: u32,
    record: Arc<Record>,
}

/// Outcome of the fast update path.
enum Fast {
    Done,
    Vanished,
    /// The record must move or an index must learn its new hash.
    Slow,
}

impl State {
    /// The current record at a hit, if it is still the one the scan saw.
    fn revalidate(&mut self, hit: &Hit) -> CoreResult<Option<Arc<Record>>> {
        Ok(self
            .record_at(hit.page, hit.record.position)?
            .filter(|r| r.total_size == hit.record.total_size && r.value == hit.record.value))
    }

    /// Rewrites in place when neither a move nor an index change is needed.
    fn update_fast(&mut self, hit: &Hit, patch: &Map<String, Value>) -> CoreResult<Fast> {
        let Some(current) = self.revalidate(hit)? else {
            return Ok(Fast::Vanished);
        };
        let value = merge(&current.value, patch);
        let payload = serde_json::to_vec(&value)?;
        let rehash = self
            .indexes
            .iter()
            .any(|i| i.hash_of(&current.value) != i.hash_of(&value));
        if rehash || payload.len() as u64 > current.capacity() {
            return Ok(Fast::Slow);
        }
        self.rewrite_in_place(&current, payload)?;
        self.touch_page(hit.page)?;
        self.rebalance_cache()?;
        Ok(Fast::Done)
    }

    /// Rewrites or relocates a record and points the indexes at it.
    fn update_slow(
        &mut self,
        hit: &Hit,
        patch: &Map<String, Value>,
        indexes: &[Arc<IndexHandle>],
    ) -> CoreResult<bool> {
        let Some(current) = self.revalidate(hit)? else {
            return Ok(false);
        };
        let value = merge(&current.value, patch);
        let payload = serde_json::to_vec(&value)?;

        let (page, position, moved) = if payload.len() as u64 <= current.capacity() {
            self.rewrite_in_place(&current, payload)?;
            (hit.page, current.position, false)
        } else {
            let placement = self.relocate(hit.page, &current, payload)?;
            debug!(from = current.position, to = placement.position, "relocated record");
            (placement.page, placement.position, true)
        };

        let rel = self.relative(page, position)?;
        for index in indexes {
            let hash = index.hash_of(&value);
            if moved || hash != index.hash_of(&current.value) {
                self.index_insert(index, hash, page, rel, true)?;
            }
        }
        self.touch_page(page)?;
        if page != hit.page {
            self.touch_page(hit.page)?;
        }
        self.rebalance_cache()?;
        Ok(true)
    }

    fn delete_hit(&mut self, hit: &Hit) -> CoreResult<bool> {
        let Some(current) = self.revalidate(hit)? else {
            return Ok(false);
        };
        self.remove_record(hit.page, &current)?;
        self.touch_page(hit.page)?;
        self.rebalance_cache()?;
        Ok(true)
    }
}

impl Store {
    async fn candidates<P>(&self, mut predicate: P, limit: Option<usize>) -> CoreResult<Vec<Hit>>
    where
        P: FnMut(&Value) -> bool,
    {
        let limit = limit.unwrap_or(usize::MAX);
        let mut hits = Vec::new();
        if limit == 0 {
            return Ok(hits);
        }
        self.scan(|page, record| {
            if !predicate(&record.value) {
                return Step::Skip;
            }
            hits.push(Hit {
                page,
                record: Arc::clone(record),
            });
            if hits.len() >= limit {
                Step::Stop
            } else {
                Step::Match
            }
        })
        .await?;
        Ok(hits)
    }

    /// Merges `patch` into up to `limit` records matching `predicate` and
    /// returns how many were updated.
    ///
    /// A record is rewritten in place when the new payload fits its slot;
    /// otherwise it is written elsewhere and its old slot freed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `patch` is not a JSON object.
    pub async fn update<P>(
        &self,
        patch: Value,
        predicate: P,
        limit: Option<usize>,
    ) -> CoreResult<usize>
    where
        P: FnMut(&Value) -> bool,
    {
        self.admit().await?;
        let Value::Object(patch) = patch else {
            return Err(CoreError::invalid_argument("an update patch must be a JSON object"));
        };
        let hits = self.candidates(predicate, limit).await?;

        let mut updated = 0;
        for hit in &hits {
            let _update = self.update_queue.enter().await;
            let done = match self.commit(|state| state.update_fast(hit, &patch)).await? {
                Fast::Done => true,
                Fast::Vanished => false,
                Fast::Slow => {
                    let _insert = self.insert_delete_queue.enter().await;
                    let indexes = self.state.lock().indexes.clone();
                    let _index_turns = Self::enter_indexes(&indexes).await;
                    let _page = self.page_queue.enter().await;
                    self.commit(|state| state.update_slow(hit, &patch, &indexes))
                        .await?
                }
            };
            if done {
                updated += 1;
                self.stats.record_update();
            } else {
                warn!(position = hit.record.position, "record changed before update, skipped");
            }
        }
        Ok(updated)
    }

    /// Deletes up to `limit` records matching `predicate` and returns how
    /// many were removed. Their slots go onto the free list.
    pub async fn delete<P>(&self, predicate: P, limit: Option<usize>) -> CoreResult<usize>
    where
        P: FnMut(&Value) -> bool,
    {
        self.admit().await?;
        let hits = self.candidates(predicate, limit).await?;

        let mut deleted = 0;
        for hit in &hits {
            let _insert = self.insert_delete_queue.enter().await;
            if self.commit(|state| state.delete_hit(hit)).await? {
                deleted += 1;
                self.stats.record_delete();
            } else {
                warn!(position = hit.record.position, "record changed before delete, skipped");
            }
        }
        Ok(deleted)
    }
}
