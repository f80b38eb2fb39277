//! Forward-only schema migration for punch file documents.
//!
//! Migration operates on raw [serde_json::Value] documents before they are
//! deserialized into [PunchFile](super::entities::PunchFile), so that the
//! in-memory representation handed to callers is always the current schema.
//!
//! Version history:
//! - v1: file carries only `updated`; punches may have a single optional
//!   `comment` string.
//! - v2: file gains `created`; punch comments become a `[string]` array.
//! - v3: explicit `version` field; comments become `{comment, timestamp}`
//!   objects; punches gain `rate`, a stable `id` and bookkeeping timestamps.

use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{PunchError, PunchResult};

use super::entities::CURRENT_VERSION;

pub struct Migrator<'a> {
    config: &'a Config,
}

impl<'a> Migrator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Ordered version detection: an explicit `version` field always wins,
    /// then structural sniffing (`created` + `updated` means v2, `updated`
    /// alone means v1). Anything else is an error; migration must not guess.
    pub fn detect_version(doc: &Value) -> PunchResult<u32> {
        let object = doc.as_object().ok_or(PunchError::UnknownSchemaVersion)?;
        if let Some(version) = object.get("version").and_then(Value::as_u64) {
            return Ok(version as u32);
        }
        if object.contains_key("created") && object.contains_key("updated") {
            return Ok(2);
        }
        if object.contains_key("updated") {
            return Ok(1);
        }
        Err(PunchError::UnknownSchemaVersion)
    }

    /// Detects the document's version and migrates it to the current schema.
    pub fn to_current(&self, doc: Value) -> PunchResult<Value> {
        let from = Self::detect_version(&doc)?;
        if from > CURRENT_VERSION {
            return Err(PunchError::UnsupportedMigrationPath {
                from,
                to: CURRENT_VERSION,
            });
        }
        self.migrate(doc, from, CURRENT_VERSION)
    }

    /// Applies the fixed pipeline for `(from, to)`. Same-version requests
    /// run only the structural conform pass, which is a no-op on well-formed
    /// input. Backward requests fail loudly rather than truncating data.
    pub fn migrate(&self, doc: Value, from: u32, to: u32) -> PunchResult<Value> {
        let supported = 1..=CURRENT_VERSION;
        if !supported.contains(&from) || !supported.contains(&to) || to < from {
            return Err(PunchError::UnsupportedMigrationPath { from, to });
        }

        let mut doc = conform(doc, from);
        for step in from..to {
            doc = match step {
                1 => one_to_two(doc),
                2 => self.two_to_three(doc),
                _ => unreachable!("pipeline steps are bounded by CURRENT_VERSION"),
            };
        }
        Ok(doc)
    }

    /// v2 -> v3. Bare string comments become `{comment, timestamp}` objects;
    /// the backfilled timestamp is the file's `updated` value, falling back
    /// to the punch's `in` (the original records never stored one, so the
    /// default is a documented constant choice rather than a guess). `rate`
    /// is backfilled from the *current* configured rate, a one-time lossy
    /// step. Records also get a stable id here so upsert can match on the
    /// id alone.
    fn two_to_three(&self, mut doc: Value) -> Value {
        let file_updated = doc.get("updated").and_then(Value::as_i64);

        if let Some(punches) = punches_mut(&mut doc) {
            for punch in punches {
                let Some(punch) = punch.as_object_mut() else {
                    continue;
                };
                let in_ms = punch.get("in").and_then(Value::as_i64);
                let comment_timestamp = file_updated.or(in_ms).unwrap_or_default();

                let comments = match punch.remove("comments") {
                    Some(Value::Array(entries)) => entries
                        .into_iter()
                        .map(|entry| match entry {
                            Value::String(text) => json!({
                                "comment": text,
                                "timestamp": comment_timestamp,
                            }),
                            other => other,
                        })
                        .collect(),
                    _ => vec![],
                };
                punch.insert("comments".into(), Value::Array(comments));

                if !punch.contains_key("rate") || punch["rate"].is_null() {
                    let rate = punch
                        .get("project")
                        .and_then(Value::as_str)
                        .map(|project| self.config.hourly_rate(project))
                        .unwrap_or(0.0);
                    punch.insert("rate".into(), json!(rate));
                }
                if !punch.contains_key("id") {
                    punch.insert("id".into(), json!(Uuid::new_v4()));
                }
                if !punch.contains_key("created") {
                    if let Some(in_ms) = in_ms {
                        punch.insert("created".into(), json!(in_ms));
                    }
                }
                if !punch.contains_key("updated") {
                    punch.insert("updated".into(), json!(comment_timestamp));
                }
            }
        }

        if let Some(object) = doc.as_object_mut() {
            object.insert("version".into(), json!(CURRENT_VERSION));
        }
        doc
    }
}

/// v1 -> v2. Synthesizes the file's `created` from the earliest punch `in`
/// (left unset with zero punches; inventing one would corrupt history) and
/// turns each punch's single optional `comment` string into a `comments`
/// array.
fn one_to_two(mut doc: Value) -> Value {
    let earliest_in = punches(&doc)
        .iter()
        .filter_map(|punch| punch.get("in").and_then(Value::as_i64))
        .min();

    if let Some(punches) = punches_mut(&mut doc) {
        for punch in punches {
            let Some(punch) = punch.as_object_mut() else {
                continue;
            };
            let comments = match punch.remove("comment") {
                Some(Value::String(text)) => vec![Value::String(text)],
                _ => vec![],
            };
            punch.insert("comments".into(), Value::Array(comments));
        }
    }

    if let Some(object) = doc.as_object_mut() {
        if !object.contains_key("created") {
            if let Some(earliest_in) = earliest_in {
                object.insert("created".into(), json!(earliest_in));
            } else {
                warn!("v1 punch file has no punches, leaving `created` unset");
            }
        }
    }
    doc
}

/// Same-version structural conformance. Normalizes `null` comment slots the
/// older writers sometimes produced; a no-op on well-formed documents.
fn conform(mut doc: Value, version: u32) -> Value {
    if let Some(punches) = punches_mut(&mut doc) {
        for punch in punches {
            let Some(punch) = punch.as_object_mut() else {
                continue;
            };
            match version {
                1 => {
                    if punch.get("comment").is_some_and(Value::is_null) {
                        punch.remove("comment");
                    }
                }
                _ => {
                    if punch.get("comments").is_some_and(Value::is_null) {
                        punch.insert("comments".into(), Value::Array(vec![]));
                    }
                }
            }
        }
    }
    doc
}

fn punches(doc: &Value) -> &[Value] {
    doc.get("punches")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn punches_mut(doc: &mut Value) -> Option<&mut Vec<Value>> {
    doc.get_mut("punches").and_then(Value::as_array_mut)
}
