use std::{
    future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, Stream, StreamExt};
use serde_json::Value;
use tokio::fs;
use tokio_stream::wrappers::ReadDirStream;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::{PunchError, PunchResult};
use crate::utils::time::{now_ms, parse_punch_file_name, punch_file_name};

use super::entities::{Punch, PunchFile};
use super::migrate::Migrator;

/// Plain-text marker next to the punch files recording the currently active
/// project alias (empty when punched out). Lets external tooling inspect
/// punch state without parsing JSON.
pub const ACTIVE_MARKER_FILE: &str = "current";

/// Durable, date-partitioned persistence for punches. The store exclusively
/// owns file naming, enumeration and overwrite semantics; everything else
/// reaches the punch directory through it, which is what lets
/// migration-on-read apply uniformly.
pub struct PunchStore {
    punch_dir: PathBuf,
    config: Config,
}

impl PunchStore {
    pub fn new(punch_dir: PathBuf, config: Config) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&punch_dir)?;

        Ok(Self { punch_dir, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Deterministic date-to-path mapping. The file does not have to exist.
    pub fn path_for_date(&self, date: NaiveDate) -> PathBuf {
        self.punch_dir.join(punch_file_name(date))
    }

    /// Loads the file for a date, migrating older schemas forward before
    /// returning; an absent file yields a fresh, not-yet-persisted empty
    /// file. Callers always see the current schema shape.
    pub async fn read_or_create(&self, date: NaiveDate) -> PunchResult<PunchFile> {
        let path = self.path_for_date(date);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PunchFile::empty(date)),
            Err(e) => return Err(storage_read(&path, e)),
        };
        debug!("Extracting {path:?}");

        let doc: Value = serde_json::from_slice(&bytes).map_err(|e| storage_read(&path, e))?;
        let doc = Migrator::new(&self.config).to_current(doc)?;
        let mut file: PunchFile =
            serde_json::from_value(doc).map_err(|e| storage_read(&path, e))?;
        file.date = date;
        Ok(file)
    }

    /// Bumps the file's `updated` stamp and overwrites it. The document is
    /// written to a sibling temp file and renamed into place so a subsequent
    /// read never observes a partial write. Last writer wins; no locking
    /// against concurrent external writers is provided or assumed.
    pub async fn save(&self, file: &mut PunchFile) -> PunchResult<()> {
        file.updated = now_ms();
        let path = self.path_for_date(file.date);
        let bytes = serde_json::to_vec_pretty(file).map_err(|e| storage_write(&path, e))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| storage_write(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_write(&path, e))?;
        Ok(())
    }

    /// Upserts the punch into the file for its `in` date and saves. Matched
    /// by id, so that saving a punch repeatedly while it is being edited
    /// never duplicates it.
    pub async fn save_punch(&self, punch: &Punch) -> PunchResult<()> {
        let mut file = self.read_or_create(punch.local_date()).await?;
        file.upsert(punch.clone());
        self.save(&mut file).await
    }

    /// Closes the punch and, with `autosave`, persists it immediately.
    pub async fn punch_out(
        &self,
        punch: &mut Punch,
        comment: Option<&str>,
        options: PunchOutOptions,
    ) -> PunchResult<()> {
        punch.punch_out(comment, options.time)?;
        if options.autosave {
            self.save_punch(punch).await?;
        }
        Ok(())
    }

    /// Dates of every persisted punch file, sorted ascending. File names use
    /// unpadded month and day numbers, so ordering comes from the parsed
    /// dates, never from the names themselves.
    pub async fn list_file_dates(&self) -> PunchResult<Vec<NaiveDate>> {
        let read_dir = fs::read_dir(&self.punch_dir)
            .await
            .map_err(|e| storage_read(&self.punch_dir, e))?;
        let mut entries = ReadDirStream::new(read_dir);

        let mut dates = vec![];
        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(|e| storage_read(&self.punch_dir, e))?;
            if let Some(date) = entry
                .file_name()
                .to_str()
                .and_then(parse_punch_file_name)
            {
                dates.push(date);
            }
        }
        dates.sort_unstable();
        Ok(dates)
    }

    /// Streams punch files one at a time in ascending date order, so narrow
    /// queries over a long history never hold every file in memory. Early
    /// termination is dropping the stream. A file that fails to parse is
    /// skipped with a warning; one corrupt day must not make the rest of
    /// history unreadable.
    pub fn iter_files(&self) -> impl Stream<Item = PunchFile> + '_ {
        stream::once(async move {
            match self.list_file_dates().await {
                Ok(dates) => dates,
                Err(e) => {
                    warn!("Failed to enumerate punch directory: {e}");
                    vec![]
                }
            }
        })
        .flat_map(stream::iter)
        .then(move |date| async move { (date, self.read_or_create(date).await) })
        .filter_map(|(date, result)| {
            future::ready(match result {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("Skipping unreadable punch file for {date}: {e}");
                    None
                }
            })
        })
    }

    pub async fn most_recent_date(&self) -> PunchResult<Option<NaiveDate>> {
        Ok(self.list_file_dates().await?.into_iter().max())
    }

    pub async fn most_recent_file(&self) -> PunchResult<Option<PunchFile>> {
        match self.most_recent_date().await? {
            Some(date) => Ok(Some(self.read_or_create(date).await?)),
            None => Ok(None),
        }
    }

    /// Scans backward from the most recent file until an open punch is
    /// found, crossing file boundaries so a stale open punch from days ago
    /// is still reported. The store itself never rejects multiple open
    /// punches; this query is the single authoritative check callers use
    /// before punching in.
    pub async fn current_open_punch(&self, project: Option<&str>) -> PunchResult<Option<Punch>> {
        let dates = self.list_file_dates().await?;
        for date in dates.into_iter().rev() {
            match self.read_or_create(date).await {
                Ok(file) => {
                    if let Some(punch) = file.find_open(project) {
                        return Ok(Some(punch.clone()));
                    }
                }
                Err(e) => warn!("Skipping unreadable punch file for {date}: {e}"),
            }
        }
        Ok(None)
    }

    /// Most recently updated punch, open or closed.
    pub async fn latest_punch(&self) -> PunchResult<Option<Punch>> {
        let dates = self.list_file_dates().await?;
        for date in dates.into_iter().rev() {
            match self.read_or_create(date).await {
                Ok(file) => {
                    if let Some(punch) = file.punches.iter().max_by_key(|p| p.updated) {
                        return Ok(Some(punch.clone()));
                    }
                }
                Err(e) => warn!("Skipping unreadable punch file for {date}: {e}"),
            }
        }
        Ok(None)
    }

    /// Rewrites the active-project marker. Called on every punch-in and
    /// punch-out.
    pub async fn write_active_marker(&self, project: &str) -> PunchResult<()> {
        let path = self.punch_dir.join(ACTIVE_MARKER_FILE);
        fs::write(&path, project)
            .await
            .map_err(|e| storage_write(&path, e))
    }
}

/// Options for [PunchStore::punch_out].
#[derive(Debug, Default, Clone, Copy)]
pub struct PunchOutOptions {
    pub time: Option<DateTime<Utc>>,
    pub autosave: bool,
}

fn storage_read(path: &Path, source: impl std::error::Error + Send + Sync + 'static) -> PunchError {
    PunchError::StorageRead {
        path: path.to_owned(),
        source: Box::new(source),
    }
}

fn storage_write(
    path: &Path,
    source: impl std::error::Error + Send + Sync + 'static,
) -> PunchError {
    PunchError::StorageWrite {
        path: path.to_owned(),
        source: Box::new(source),
    }
}
