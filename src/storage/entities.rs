use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{PunchError, PunchResult};
use crate::utils::duration::WorkDuration;
use crate::utils::time::now_ms;

/// Schema version written by this build. Older files are migrated forward on
/// read, see [crate::storage::migrate].
pub const CURRENT_VERSION: u32 = 3;

/// One annotation attached to a punch. Comments are append-only and their
/// order is chronological by construction.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct Comment {
    pub comment: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(text, now_ms())
    }

    pub fn at(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            comment: text.into(),
            timestamp,
        }
    }
}

/// Construction input for [Punch::new]. Only `project` is required.
#[derive(Debug, Default, Clone)]
pub struct PunchProps {
    pub project: String,
    pub in_time: Option<DateTime<Utc>>,
    pub out_time: Option<DateTime<Utc>>,
    pub rate: Option<f64>,
}

impl PunchProps {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }
}

/// One work session: punched in on a project, possibly still open, annotated
/// with comments. `rate` is snapshotted from config at construction so that
/// historical pay stays stable if a project's rate changes later.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct Punch {
    pub id: Uuid,
    pub project: String,
    #[serde(rename = "in", with = "ts_milliseconds")]
    pub in_time: DateTime<Utc>,
    /// `None` means the session is still open. Serialized as an explicit
    /// `null`, never omitted.
    #[serde(rename = "out", default, with = "ts_milliseconds_option")]
    pub out_time: Option<DateTime<Utc>>,
    pub rate: f64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(with = "ts_milliseconds")]
    pub created: DateTime<Utc>,
    /// Bumped on every mutation. Remote sync uses this to decide which copy
    /// of a record is newer, so the contract must hold even though sync
    /// itself lives outside this crate.
    #[serde(with = "ts_milliseconds")]
    pub updated: DateTime<Utc>,
}

impl Punch {
    /// Creates a punch. `in` defaults to now, `out` stays unset unless the
    /// punch is backfilled with both ends. The rate defaults from the
    /// project's configured hourly rate, 0 when unknown.
    pub fn new(props: PunchProps, config: &Config) -> PunchResult<Self> {
        if props.project.trim().is_empty() {
            return Err(PunchError::InvalidArgument(
                "punch requires a non-empty project alias".into(),
            ));
        }
        let now = now_ms();
        let in_time = props.in_time.unwrap_or(now);
        if let Some(out_time) = props.out_time {
            if out_time < in_time {
                return Err(PunchError::InvalidTimeRange {
                    in_ms: in_time.timestamp_millis(),
                    out_ms: out_time.timestamp_millis(),
                });
            }
        }
        let rate = props
            .rate
            .unwrap_or_else(|| config.hourly_rate(&props.project));
        Ok(Self {
            id: Uuid::new_v4(),
            project: props.project,
            in_time,
            out_time: props.out_time,
            rate,
            comments: vec![],
            created: now,
            updated: now,
        })
    }

    pub fn is_open(&self) -> bool {
        self.out_time.is_none()
    }

    /// Local calendar day the punch belongs to, derived from `in`. The store
    /// names the punch file after this date at save time.
    pub fn local_date(&self) -> NaiveDate {
        self.in_time.with_timezone(&chrono::Local).date_naive()
    }

    /// Appends a comment stamped with the current time. Does not persist.
    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.comments.push(Comment::new(text));
        self.touch();
    }

    /// Closes the session at `time` (now when unset), optionally appending a
    /// comment. Closing an already-closed punch is not rejected here; the
    /// "already punched out" guard belongs to callers via
    /// [current_open_punch](crate::storage::store::PunchStore::current_open_punch).
    pub fn punch_out(
        &mut self,
        comment: Option<&str>,
        time: Option<DateTime<Utc>>,
    ) -> PunchResult<()> {
        let out_time = time.unwrap_or_else(now_ms);
        if out_time < self.in_time {
            return Err(PunchError::InvalidTimeRange {
                in_ms: self.in_time.timestamp_millis(),
                out_ms: out_time.timestamp_millis(),
            });
        }
        self.out_time = Some(out_time);
        if let Some(comment) = comment {
            self.comments.push(Comment::new(comment));
        }
        self.touch();
        Ok(())
    }

    /// Elapsed session time, `(out ?? now) - in`.
    pub fn duration(&self) -> WorkDuration {
        let end = self.out_time.unwrap_or_else(Utc::now);
        WorkDuration::from(end - self.in_time)
    }

    /// Earned pay for the session. 0 when the rate is unset.
    pub fn pay(&self) -> f64 {
        self.duration().total_hours() * self.rate
    }

    fn touch(&mut self) {
        self.updated = now_ms();
    }
}

/// All punches saved for one local calendar day.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct PunchFile {
    /// Derived from the file name, not part of the persisted document.
    #[serde(skip, default = "placeholder_date")]
    pub date: NaiveDate,
    pub version: u32,
    /// Unset only for files migrated from a v1 document that had no punches
    /// to synthesize it from; the migrator never invents one.
    #[serde(default, with = "ts_milliseconds_option")]
    pub created: Option<DateTime<Utc>>,
    #[serde(with = "ts_milliseconds")]
    pub updated: DateTime<Utc>,
    pub punches: Vec<Punch>,
}

fn placeholder_date() -> NaiveDate {
    NaiveDate::MIN
}

impl PunchFile {
    /// Fresh, not-yet-persisted file for a day with no records.
    pub fn empty(date: NaiveDate) -> Self {
        let now = now_ms();
        Self {
            date,
            version: CURRENT_VERSION,
            created: Some(now),
            updated: now,
            punches: vec![],
        }
    }

    /// Replaces the punch with the same `id`, or appends when none matches.
    /// Migration assigns every legacy record an id before it reaches typed
    /// code, so the id is the sole identity: two distinct punches on the
    /// same project at the same millisecond stay distinct. Repeated saves of
    /// a punch being edited must never duplicate it.
    pub fn upsert(&mut self, punch: Punch) {
        let existing = self
            .punches
            .iter()
            .position(|candidate| candidate.id == punch.id);
        match existing {
            Some(index) => self.punches[index] = punch,
            None => self.punches.push(punch),
        }
    }

    /// Most recent open punch in the file, optionally restricted to one
    /// project. The file never rejects multiple open punches; historical
    /// data may legitimately contain them.
    pub fn find_open(&self, project: Option<&str>) -> Option<&Punch> {
        self.punches
            .iter()
            .rev()
            .find(|punch| punch.is_open() && project.map_or(true, |p| punch.project == p))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Value;

    use crate::config::Config;
    use crate::errors::PunchError;

    use super::{Punch, PunchFile, PunchProps, CURRENT_VERSION};

    fn test_config() -> Config {
        Config::default().with_project("acme", "Acme Corp", 20.0)
    }

    #[test]
    fn test_requires_project() {
        let err = Punch::new(PunchProps::new("  "), &test_config()).unwrap_err();
        assert!(matches!(err, PunchError::InvalidArgument(_)));
    }

    #[test]
    fn test_out_before_in_is_rejected() {
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let mut props = PunchProps::new("acme");
        props.in_time = Some(t0);
        props.out_time = Some(t0 - Duration::seconds(1));
        let err = Punch::new(props, &test_config()).unwrap_err();
        assert!(matches!(err, PunchError::InvalidTimeRange { .. }));
    }

    #[test]
    fn test_zero_duration_session_is_valid() {
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let mut props = PunchProps::new("acme");
        props.in_time = Some(t0);
        props.out_time = Some(t0);
        let punch = Punch::new(props, &test_config()).unwrap();
        assert_eq!(punch.duration().total_millis(), 0);
    }

    #[test]
    fn test_rate_defaults_from_config_once() {
        let punch = Punch::new(PunchProps::new("acme"), &test_config()).unwrap();
        assert_eq!(punch.rate, 20.0);
        let unknown = Punch::new(PunchProps::new("mystery"), &test_config()).unwrap();
        assert_eq!(unknown.rate, 0.0);
    }

    #[test]
    fn test_ninety_minute_session_pay() {
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let mut props = PunchProps::new("acme");
        props.in_time = Some(t0);
        let mut punch = Punch::new(props, &test_config()).unwrap();

        punch
            .punch_out(Some("did work"), Some(t0 + Duration::milliseconds(5_400_000)))
            .unwrap();

        assert_eq!(punch.duration().total_minutes(), 90.0);
        assert_eq!(punch.pay(), 30.0);
        assert_eq!(punch.comments.len(), 1);
        assert_eq!(punch.comments[0].comment, "did work");
    }

    #[test]
    fn test_punch_out_rejects_time_before_in() {
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let mut props = PunchProps::new("acme");
        props.in_time = Some(t0);
        let mut punch = Punch::new(props, &test_config()).unwrap();
        let err = punch
            .punch_out(None, Some(t0 - Duration::minutes(1)))
            .unwrap_err();
        assert!(matches!(err, PunchError::InvalidTimeRange { .. }));
        assert!(punch.is_open());
    }

    #[test]
    fn test_serde_round_trip() {
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let mut props = PunchProps::new("acme");
        props.in_time = Some(t0);
        let mut punch = Punch::new(props, &test_config()).unwrap();
        punch.add_comment("first");
        punch.punch_out(Some("second"), Some(t0 + Duration::hours(2))).unwrap();

        let json = serde_json::to_string(&punch).unwrap();
        let restored: Punch = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, punch);
    }

    #[test]
    fn test_open_punch_serializes_null_out() {
        let punch = Punch::new(PunchProps::new("acme"), &test_config()).unwrap();
        let value = serde_json::to_value(&punch).unwrap();
        assert_eq!(value["out"], Value::Null);
    }

    #[test]
    fn test_mutations_bump_updated() {
        let mut punch = Punch::new(PunchProps::new("acme"), &test_config()).unwrap();
        let created = punch.updated;
        punch.add_comment("note");
        assert!(punch.updated >= created);
        assert_eq!(punch.comments.len(), 1);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let date = chrono::NaiveDate::from_ymd_opt(2020, 5, 4).unwrap();
        let mut file = PunchFile::empty(date);
        assert_eq!(file.version, CURRENT_VERSION);

        let mut punch = Punch::new(PunchProps::new("acme"), &test_config()).unwrap();
        file.upsert(punch.clone());
        punch.add_comment("halfway");
        file.upsert(punch.clone());
        punch.punch_out(None, None).unwrap();
        file.upsert(punch.clone());

        assert_eq!(file.punches.len(), 1);
        assert_eq!(file.punches[0], punch);
    }

    #[test]
    fn test_upsert_keeps_distinct_punches_sharing_project_and_in() {
        let date = chrono::NaiveDate::from_ymd_opt(2020, 5, 4).unwrap();
        let mut file = PunchFile::empty(date);

        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let mut props = PunchProps::new("acme");
        props.in_time = Some(t0);
        let first = Punch::new(props.clone(), &test_config()).unwrap();
        let second = Punch::new(props, &test_config()).unwrap();
        assert_ne!(first.id, second.id);

        file.upsert(first.clone());
        file.upsert(second.clone());

        assert_eq!(file.punches.len(), 2);
        assert_eq!(file.punches[0].id, first.id);
        assert_eq!(file.punches[1].id, second.id);
    }

    #[test]
    fn test_find_open_prefers_latest_and_filters_project() {
        let t0 = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
        let date = chrono::NaiveDate::from_ymd_opt(2020, 5, 4).unwrap();
        let mut file = PunchFile::empty(date);

        let mut closed = PunchProps::new("acme");
        closed.in_time = Some(t0);
        closed.out_time = Some(t0 + Duration::hours(1));
        file.upsert(Punch::new(closed, &test_config()).unwrap());

        let mut open = PunchProps::new("side-gig");
        open.in_time = Some(t0 + Duration::hours(2));
        let open = Punch::new(open, &test_config()).unwrap();
        file.upsert(open.clone());

        assert_eq!(file.find_open(None).unwrap().id, open.id);
        assert_eq!(file.find_open(Some("side-gig")).unwrap().id, open.id);
        assert!(file.find_open(Some("acme")).is_none());
    }
}
