//! Fluent query builder over the punch store.
//!
//! Queries stream punch files lazily through
//! [PunchStore::iter_files](super::store::PunchStore::iter_files), so narrow
//! queries over a long history touch as few files as possible. A builder is
//! consumed by [Query::run]; starting another query means asking the store
//! for a fresh builder.

use std::cmp::Ordering;
use std::future;

use futures::{stream, Stream, StreamExt};
use serde_json::{Map, Value};

use super::entities::{Punch, PunchFile};
use super::store::PunchStore;

/// A record collection the query engine can scan: flattened punches or whole
/// punch files.
pub trait Queryable: Clone {
    /// Streams candidate records lazily from the store.
    fn scan(store: &PunchStore) -> impl Stream<Item = Self> + '_;

    /// JSON view of the record, used for field ordering and projection.
    fn to_value(&self) -> Value;
}

impl Queryable for Punch {
    fn scan(store: &PunchStore) -> impl Stream<Item = Self> + '_ {
        store
            .iter_files()
            .flat_map(|file| stream::iter(file.punches))
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Queryable for PunchFile {
    fn scan(store: &PunchStore) -> impl Stream<Item = Self> + '_ {
        store.iter_files()
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

enum Order<'s, T> {
    Field { name: String, direction: Direction },
    Comparator(Box<dyn Fn(&T, &T) -> Ordering + 's>),
}

pub struct Query<'s, T: Queryable> {
    store: &'s PunchStore,
    predicate: Option<Box<dyn Fn(&T) -> bool + 's>>,
    order: Option<Order<'s, T>>,
    limit: Option<usize>,
}

impl PunchStore {
    /// Query over individual punches, flattened across all files.
    pub fn punches(&self) -> Query<'_, Punch> {
        Query::new(self)
    }

    /// Query at whole-file granularity.
    pub fn punch_files(&self) -> Query<'_, PunchFile> {
        Query::new(self)
    }
}

impl<'s, T: Queryable> Query<'s, T> {
    fn new(store: &'s PunchStore) -> Self {
        Self {
            store,
            predicate: None,
            order: None,
            limit: None,
        }
    }

    /// Single predicate slot; a second call replaces the first. Callers fold
    /// any and/or composition into one closure.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + 's) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Orders by a field of the record's JSON view, descending. Descending
    /// is the default direction when only a field name is given.
    pub fn order_by(self, field: &str) -> Self {
        self.order_by_dir(field, Direction::Desc)
    }

    pub fn order_by_dir(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some(Order::Field {
            name: field.to_string(),
            direction,
        });
        self
    }

    /// Orders with a raw comparator, bypassing direction entirely.
    pub fn order_by_with(mut self, comparator: impl Fn(&T, &T) -> Ordering + 's) -> Self {
        self.order = Some(Order::Comparator(Box::new(comparator)));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restricts output to the named fields as JSON objects, filling fields
    /// absent on a record with `null` so consumers always see a stable key
    /// set. An empty list or `"*"` keeps full records.
    pub fn select<I, S>(self, fields: I) -> Projected<'s, T>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let fields = if fields.iter().any(|field| field == "*") {
            vec![]
        } else {
            fields
        };
        Projected {
            query: self,
            fields,
        }
    }

    /// Executes the query, consuming the builder. Scanning stops early at
    /// `limit` matches only when no ordering is requested; with an ordering
    /// the full candidate set is collected, sorted, and truncated, since the
    /// first `n` encountered are not the first `n` in sort order.
    pub async fn run(self) -> Vec<T> {
        let Query {
            store,
            predicate,
            order,
            limit,
        } = self;

        let filtered = T::scan(store)
            .filter(move |item| future::ready(predicate.as_ref().map_or(true, |p| p(item))));

        let mut rows: Vec<T> = match (&order, limit) {
            (None, Some(n)) => filtered.take(n).collect().await,
            _ => filtered.collect().await,
        };

        if let Some(order) = order {
            match order {
                Order::Field { name, direction } => {
                    let mut keyed: Vec<(Value, T)> = rows
                        .into_iter()
                        .map(|row| (field_value(&row, &name), row))
                        .collect();
                    keyed.sort_by(|a, b| {
                        let ordering = compare_values(&a.0, &b.0);
                        match direction {
                            Direction::Asc => ordering,
                            Direction::Desc => ordering.reverse(),
                        }
                    });
                    rows = keyed.into_iter().map(|(_, row)| row).collect();
                }
                Order::Comparator(comparator) => rows.sort_by(|a, b| comparator(a, b)),
            }
            if let Some(n) = limit {
                rows.truncate(n);
            }
        }
        rows
    }
}

/// A query whose output is projected to a fixed field set.
pub struct Projected<'s, T: Queryable> {
    query: Query<'s, T>,
    fields: Vec<String>,
}

impl<T: Queryable> Projected<'_, T> {
    pub async fn run(self) -> Vec<Value> {
        let Projected { query, fields } = self;
        let rows = query.run().await;
        rows.into_iter()
            .map(|row| project(row.to_value(), &fields))
            .collect()
    }
}

fn project(value: Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return value;
    }
    let source = value.as_object();
    let mut out = Map::new();
    for field in fields {
        let projected = source
            .and_then(|object| object.get(field))
            .cloned()
            .unwrap_or(Value::Null);
        out.insert(field.clone(), projected);
    }
    Value::Object(out)
}

fn field_value<T: Queryable>(row: &T, field: &str) -> Value {
    row.to_value()
        .get(field)
        .cloned()
        .unwrap_or(Value::Null)
}

/// Total order over the JSON values punch records contain. Differently-typed
/// values order by a fixed type rank so sorting never panics on mixed data.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Value;
    use tempfile::tempdir;

    use crate::config::Config;
    use crate::storage::entities::{Punch, PunchFile, PunchProps};
    use crate::storage::store::PunchStore;
    use crate::utils::logging::TEST_LOGGING;

    use super::Direction;

    fn test_config() -> Config {
        *TEST_LOGGING;
        Config::default().with_project("acme", "Acme Corp", 20.0)
    }

    fn closed_punch(project: &str, in_time: DateTime<Utc>, config: &Config) -> Punch {
        let mut props = PunchProps::new(project);
        props.in_time = Some(in_time);
        props.out_time = Some(in_time + Duration::hours(1));
        Punch::new(props, config).unwrap()
    }

    async fn store_with_day(punches: Vec<Punch>) -> Result<(tempfile::TempDir, PunchStore)> {
        let dir = tempdir()?;
        let store = PunchStore::new(dir.path().to_owned(), test_config())?;
        let mut file = PunchFile::empty(punches[0].local_date());
        file.punches = punches;
        store.save(&mut file).await?;
        Ok((dir, store))
    }

    #[tokio::test]
    async fn test_filter_keeps_file_order_without_order_by() -> Result<()> {
        let config = test_config();
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let first = closed_punch("a", t0, &config);
        let other = closed_punch("b", t0 + Duration::hours(2), &config);
        let second = closed_punch("a", t0 + Duration::hours(4), &config);
        let (_dir, store) =
            store_with_day(vec![first.clone(), other, second.clone()]).await?;

        let results = store.punches().filter(|p| p.project == "a").run().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, first.id);
        assert_eq!(results[1].id, second.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_applies_after_sort() -> Result<()> {
        let config = test_config();
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 6, 0, 0).unwrap();
        // File order deliberately disagrees with chronological order.
        let late = closed_punch("x", t0 + Duration::hours(6), &config);
        let earliest = closed_punch("x", t0, &config);
        let middle = closed_punch("x", t0 + Duration::hours(3), &config);
        let noise = closed_punch("y", t0 + Duration::hours(1), &config);
        let (_dir, store) = store_with_day(vec![
            late.clone(),
            earliest.clone(),
            noise,
            middle.clone(),
        ])
        .await?;

        let results = store
            .punches()
            .filter(|p| p.project == "x")
            .order_by_dir("in", Direction::Asc)
            .limit(2)
            .run()
            .await;

        // The two chronologically earliest matches, never the two
        // encountered first during the scan.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, earliest.id);
        assert_eq!(results[1].id, middle.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_order_by_defaults_to_descending() -> Result<()> {
        let config = test_config();
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 6, 0, 0).unwrap();
        let early = closed_punch("a", t0, &config);
        let late = closed_punch("a", t0 + Duration::hours(2), &config);
        let (_dir, store) = store_with_day(vec![early.clone(), late.clone()]).await?;

        let results = store.punches().order_by("in").run().await;
        assert_eq!(results[0].id, late.id);
        assert_eq!(results[1].id, early.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_order_by_with_comparator() -> Result<()> {
        let config = test_config();
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 6, 0, 0).unwrap();
        let banana = closed_punch("banana", t0, &config);
        let apple = closed_punch("apple", t0 + Duration::hours(2), &config);
        let (_dir, store) = store_with_day(vec![banana.clone(), apple.clone()]).await?;

        let results = store
            .punches()
            .order_by_with(|a, b| a.project.cmp(&b.project))
            .run()
            .await;
        assert_eq!(results[0].id, apple.id);
        assert_eq!(results[1].id, banana.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_without_sort_caps_results() -> Result<()> {
        let config = test_config();
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 6, 0, 0).unwrap();
        let punches: Vec<Punch> = (0..5)
            .map(|i| closed_punch("a", t0 + Duration::minutes(i * 10), &config))
            .collect();
        let expected: Vec<_> = punches.iter().take(2).map(|p| p.id).collect();
        let (_dir, store) = store_with_day(punches).await?;

        let results = store.punches().limit(2).run().await;
        let ids: Vec<_> = results.iter().map(|p| p.id).collect();
        assert_eq!(ids, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_projection_fills_missing_fields_with_null() -> Result<()> {
        let config = test_config();
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 6, 0, 0).unwrap();
        let (_dir, store) = store_with_day(vec![closed_punch("a", t0, &config)]).await?;

        let rows = store
            .punches()
            .select(["project", "nonexistent"])
            .run()
            .await;

        assert_eq!(rows.len(), 1);
        let row = rows[0].as_object().unwrap();
        assert_eq!(row["project"], Value::String("a".into()));
        assert_eq!(row["nonexistent"], Value::Null);
        assert_eq!(row.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_select_star_keeps_full_records() -> Result<()> {
        let config = test_config();
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 6, 0, 0).unwrap();
        let (_dir, store) = store_with_day(vec![closed_punch("a", t0, &config)]).await?;

        let rows = store.punches().select(["*"]).run().await;
        let row = rows[0].as_object().unwrap();
        assert!(row.contains_key("rate"));
        assert!(row.contains_key("comments"));
        Ok(())
    }

    #[tokio::test]
    async fn test_punch_file_collection() -> Result<()> {
        let config = test_config();
        let dir = tempdir()?;
        let store = PunchStore::new(dir.path().to_owned(), test_config())?;

        let day_one = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let day_two = Utc.with_ymd_and_hms(2020, 5, 6, 9, 0, 0).unwrap();
        store.save_punch(&closed_punch("a", day_one, &config)).await?;
        store.save_punch(&closed_punch("b", day_two, &config)).await?;

        let all = store.punch_files().run().await;
        assert_eq!(all.len(), 2);

        let with_b = store
            .punch_files()
            .filter(|file| file.punches.iter().any(|p| p.project == "b"))
            .run()
            .await;
        assert_eq!(with_b.len(), 1);
        Ok(())
    }
}
