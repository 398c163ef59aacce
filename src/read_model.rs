//! Keyed current-state tables and the interface commands and queries use
//! to reach them.

use crate::domain::DomainEvent;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::model::{Record, Tables};
use crate::projector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// One page of a larger result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matching items before pagination.
    pub total: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Cut one page out of a fully materialized result set.
    pub fn paginate(all: Vec<T>, limit: usize, offset: usize) -> Self {
        let total = all.len();
        let items: Vec<T> = all.into_iter().skip(offset).take(limit).collect();
        let has_more = offset.saturating_add(items.len()) < total;
        Page {
            items,
            total,
            has_more,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

/// Filter, sort and pagination for [`ReadModelStore::list`].
///
/// Filters compare a record's serialized field with a JSON value for
/// equality. `search` is a case-insensitive substring match against the
/// record's display name. Without a sort, records come back in id order.
///
/// # Examples
///
/// ```
/// use kinfold::ListQuery;
/// use serde_json::json;
///
/// let query = ListQuery::default()
///     .filter("surname", json!("Smith"))
///     .sort_by("given_name")
///     .limit(10);
/// assert_eq!(query.limit, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    pub filters: Vec<(String, Value)>,
    pub search: Option<String>,
    pub sort: Option<Sort>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            filters: Vec::new(),
            search: None,
            sort: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl ListQuery {
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            descending: false,
        });
        self
    }

    /// Reverse the current sort (or the default id order).
    pub fn descending(mut self) -> Self {
        let field = self
            .sort
            .take()
            .map(|s| s.field)
            .unwrap_or_else(|| "id".to_string());
        self.sort = Some(Sort {
            field,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Current-state storage for every record kind.
///
/// Commands read through it to validate input; the projector writes
/// committed events into it. Readers must observe a committed batch either
/// entirely or not at all.
pub trait ReadModelStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no record exists under `id`.
    fn get<R: Record>(&self, id: Uuid) -> Result<R>;

    fn save<R: Record>(&self, record: R) -> Result<()>;

    /// Remove a record; returns whether it existed.
    fn delete<R: Record>(&self, id: Uuid) -> Result<bool>;

    fn list<R: Record>(&self, query: &ListQuery) -> Result<Page<R>>;

    /// Apply committed events, all under one write.
    fn project(&self, events: &[Event]) -> Result<()>;

    /// Run a read against a consistent view of every table.
    fn query<T>(&self, f: impl FnOnce(&Tables) -> T) -> T;

    /// Copy of every table.
    fn snapshot(&self) -> Tables {
        self.query(Tables::clone)
    }

    /// Replace every table.
    fn restore(&self, tables: Tables);
}

/// [`ReadModelStore`] holding every table in memory behind one `RwLock`.
///
/// The write lock is only taken to apply events that are already committed
/// to the log, so it is never held across validation or I/O.
#[derive(Debug, Default)]
pub struct MemoryReadModel {
    tables: RwLock<Tables>,
}

impl MemoryReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: Tables) -> Self {
        MemoryReadModel {
            tables: RwLock::new(tables),
        }
    }
}

impl ReadModelStore for MemoryReadModel {
    fn get<R: Record>(&self, id: Uuid) -> Result<R> {
        self.query(|tables| R::table(tables).get(&id).cloned())
            .ok_or_else(|| Error::not_found(R::KIND, id))
    }

    fn save<R: Record>(&self, record: R) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        R::table_mut(&mut tables).insert(record.id(), record);
        Ok(())
    }

    fn delete<R: Record>(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        Ok(R::table_mut(&mut tables).remove(&id).is_some())
    }

    fn list<R: Record>(&self, query: &ListQuery) -> Result<Page<R>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let needle = query.search.as_ref().map(|s| s.to_lowercase());

        let mut rows = Vec::new();
        for record in R::table(&tables).values() {
            let value = serde_json::to_value(record)?;
            let matches_filters = query
                .filters
                .iter()
                .all(|(field, want)| value.get(field) == Some(want));
            let matches_search = needle.as_ref().is_none_or(|n| {
                record.display_name(&tables).to_lowercase().contains(n.as_str())
            });
            if matches_filters && matches_search {
                rows.push((value, record));
            }
        }

        if let Some(sort) = &query.sort {
            rows.sort_by(|(a, _), (b, _)| {
                let ord = compare_json(a.get(&sort.field), b.get(&sort.field));
                if sort.descending { ord.reverse() } else { ord }
            });
        }

        let records = rows.into_iter().map(|(_, r)| r.clone()).collect();
        Ok(Page::paginate(records, query.limit, query.offset))
    }

    fn project(&self, events: &[Event]) -> Result<()> {
        let decoded = decode_batch(events);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        for (event, domain) in &decoded {
            projector::apply(&mut tables, event, domain);
        }
        log::debug!("projected {} event(s)", decoded.len());
        Ok(())
    }

    fn query<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&tables)
    }

    fn restore(&self, tables: Tables) {
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = tables;
    }
}

/// Decode a batch before touching any table.
///
/// Events that no longer decode (unknown types written by a newer version)
/// are skipped with a warning; they are already committed and cannot be
/// rejected here.
pub(crate) fn decode_batch(events: &[Event]) -> Vec<(&Event, DomainEvent)> {
    events
        .iter()
        .filter_map(|event| match DomainEvent::decode(event) {
            Ok(domain) => Some((event, domain)),
            Err(e) => {
                log::warn!(
                    "kinfold: skipping {} event v{} of {}: {e}",
                    event.event_type,
                    event.version,
                    event.aggregate_id
                );
                None
            }
        })
        .collect()
}

/// Order JSON values: missing/null, then booleans, numbers, strings, and
/// anything else last.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paginate_reports_has_more() {
        let page = Page::paginate((0..10).collect::<Vec<_>>(), 3, 6);
        assert_eq!(page.items, vec![6, 7, 8]);
        assert_eq!(page.total, 10);
        assert!(page.has_more);

        let last = Page::paginate((0..10).collect::<Vec<_>>(), 3, 9);
        assert_eq!(last.items, vec![9]);
        assert!(!last.has_more);
    }

    #[test]
    fn paginate_past_end_is_empty() {
        let page = Page::paginate(vec![1, 2], 5, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 2);
        assert!(!page.has_more);
    }

    #[test]
    fn json_ordering_puts_missing_first() {
        assert_eq!(compare_json(None, Some(&json!("a"))), Ordering::Less);
        assert_eq!(
            compare_json(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(
            compare_json(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }

    #[test]
    fn descending_without_field_sorts_by_id() {
        let query = ListQuery::default().descending();
        assert_eq!(
            query.sort,
            Some(Sort {
                field: "id".into(),
                descending: true
            })
        );
    }
}
