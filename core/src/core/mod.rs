//! Core storage implementation combining database, file storage and sessions.

use crate::core::db::error::{CollisionField, DatabaseError};
use crate::core::db::{CollectionKind, Database};
use crate::core::file_storage::FileStorage;
use crate::core::file_storage::error::FileStorageError;
use crate::session::{LoginGuard, SessionCookie, SessionTracker};
use crate::types::{Config, IncreaseId, LifecycleState, Record, RecordId, RecordKind};
use error::{MultiError, RelayError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::slice;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

pub(crate) mod command;
pub(crate) mod db;
pub(crate) mod file_storage;

pub use command::{Command, CommandOutcome};
pub use db::Submission;

pub mod error {
    pub use crate::core::db::error::{CollisionField, DatabaseError};
    pub use crate::core::file_storage::error::FileStorageError;
    use crate::session::error::SessionError;
    use crate::types::ValidationError;
    use std::fmt;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RelayError {
        #[error("Database error: {0}")]
        Database(#[from] DatabaseError),

        #[error("File storage error: {0}")]
        FileStorage(#[from] FileStorageError),

        #[error("Invalid input: {0}")]
        Validation(#[from] ValidationError),

        #[error("Session error: {0}")]
        Session(#[from] SessionError),

        #[error("{0}")]
        Multi(#[from] MultiError),

        #[error("Unknown command: {0}")]
        UnknownCommand(String),
    }

    impl RelayError {
        pub fn is_not_found(&self) -> bool {
            matches!(self, RelayError::Database(DatabaseError::NotFound))
        }

        /// Whether the caller caused the error (bad input, full store, no
        /// such record) as opposed to a storage fault.
        pub fn is_user_error(&self) -> bool {
            match self {
                RelayError::Database(err) => matches!(
                    err,
                    DatabaseError::NotFound
                        | DatabaseError::Collision(_)
                        | DatabaseError::CapacityExceeded { .. }
                        | DatabaseError::Validation(_)
                ),
                RelayError::FileStorage(err) => matches!(
                    err,
                    FileStorageError::Image(_) | FileStorageError::UnsupportedFormat
                ),
                RelayError::Validation(_)
                | RelayError::Session(_)
                | RelayError::UnknownCommand(_) => true,
                RelayError::Multi(_) => false,
            }
        }
    }

    /// Failures of a step that attempts every sub-step before reporting.
    #[derive(Debug, Default)]
    pub struct MultiError {
        errors: Vec<RelayError>,
    }

    impl MultiError {
        pub fn push(&mut self, err: impl Into<RelayError>) {
            self.errors.push(err.into());
        }

        pub fn is_empty(&self) -> bool {
            self.errors.is_empty()
        }

        pub fn errors(&self) -> &[RelayError] {
            &self.errors
        }

        /// `Ok(value)` if nothing failed.
        pub fn into_result<T>(self, value: T) -> Result<T, MultiError> {
            if self.is_empty() {
                Ok(value)
            } else {
                Err(self)
            }
        }
    }

    impl<E: Into<RelayError>> FromIterator<E> for MultiError {
        fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
            Self {
                errors: iter.into_iter().map(Into::into).collect(),
            }
        }
    }

    impl fmt::Display for MultiError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (i, err) in self.errors.iter().enumerate() {
                if i > 0 {
                    f.write_str(" | ")?;
                }
                write!(f, "{err}")?;
            }
            Ok(())
        }
    }

    impl std::error::Error for MultiError {}
}

/// Base name of archives made by `zip-all-files`.
const ZIP_ARCHIVE_BASE: &str = "relay_all_files";

pub struct RelayCore {
    base_path: PathBuf,
    db: Database,
    file: FileStorage,
    sessions: SessionTracker,
    login: LoginGuard,
    password: String,
    /// Serializes multi-step writes. Reads run on redb snapshots.
    write_lock: Mutex<()>,
}

/// Capacity ledger snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used: u64,
    pub capacity: u64,
}

impl Usage {
    pub fn available(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub submission: Submission,
    /// Expired messages removed by the sweep that follows every upload.
    pub swept: Vec<RecordId>,
}

fn ids_of(records: Vec<Record>) -> Vec<RecordId> {
    records.into_iter().map(|r| r.id().clone()).collect()
}

/// Converts a lower-layer error, logging it unless the caller caused it.
fn fault<E: Into<RelayError>>(op: &'static str) -> impl Fn(E) -> RelayError {
    move |err| {
        let err = err.into();
        if !err.is_user_error() {
            error!(op, error = %err, "storage fault");
        }
        err
    }
}

impl RelayCore {
    pub fn open(config: Config) -> Result<Self, RelayError> {
        let base_path = config.base_path.clone();
        let db = Database::new(&config).map_err(fault("open"))?;
        let file = FileStorage::new(config.files_path()).map_err(fault("open"))?;

        info!(path = %base_path.display(), "opened relay store");
        Ok(Self {
            base_path,
            db,
            file,
            sessions: SessionTracker::new(config.saved.session_max_age),
            login: LoginGuard::default(),
            password: config.saved.password,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the base data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.base_path
    }

    pub fn blob_path(&self, id: &RecordId) -> PathBuf {
        self.file.blob_path(id)
    }

    pub fn thumbnail_path(&self, id: &RecordId) -> PathBuf {
        self.file.thumbnail_path(id)
    }

    pub fn usage(&self) -> Result<Usage, RelayError> {
        Ok(Usage {
            used: self.db.total_size().map_err(fault("usage"))?,
            capacity: self.db.capacity(),
        })
    }

    /// Last id issued to a message (count 0 before the first one).
    pub fn current_id(&self) -> Result<IncreaseId, RelayError> {
        self.db
            .current_id(CollectionKind::Messages)
            .map_err(fault("current_id"))
    }

    /// Rebuilds the capacity ledger from the stored records.
    pub fn recount(&self) -> Result<u64, RelayError> {
        let _guard = self.write_lock.lock();
        self.db.recount().map_err(fault("recount"))
    }
}

/// Message operations.
impl RelayCore {
    /// Allocates an id and builds an unsaved text record.
    ///
    /// Text that is already stored returns the stored record, so no id is
    /// consumed and a later [`insert`](Self::insert) refreshes it.
    pub fn new_text_record(&self, text: &str, now: SystemTime) -> Result<Record, RelayError> {
        Record::validate_text(text)?;
        if let Some(mut existing) = self
            .db
            .find_by_text(CollectionKind::Messages, text)
            .map_err(fault("new_text_record"))?
        {
            existing.touch(now);
            return Ok(existing);
        }
        let id = self
            .db
            .next_id(CollectionKind::Messages, now)
            .map_err(fault("new_text_record"))?;
        Ok(Record::text(id.to_record_id(), text, now)?)
    }

    /// Allocates an id and builds an unsaved file record.
    ///
    /// Returns `Err(Collision(FileName))` if a file of that name is stored.
    pub fn new_file_record(&self, file_name: &str, now: SystemTime) -> Result<Record, RelayError> {
        Record::validate_file_name(file_name)?;
        if self
            .db
            .find_by_file_name(CollectionKind::Messages, file_name.trim())
            .map_err(fault("new_file_record"))?
            .is_some()
        {
            return Err(DatabaseError::Collision(CollisionField::FileName).into());
        }
        let id = self
            .db
            .next_id(CollectionKind::Messages, now)
            .map_err(fault("new_file_record"))?;
        Ok(Record::file(id.to_record_id(), file_name, now)?)
    }

    /// Stores a record built by [`new_text_record`](Self::new_text_record)
    /// or [`new_file_record`](Self::new_file_record).
    ///
    /// Text that is already stored refreshes the stored record instead.
    pub fn insert(&self, record: &Record) -> Result<Submission, RelayError> {
        let _guard = self.write_lock.lock();
        self.db
            .insert(CollectionKind::Messages, record)
            .map_err(fault("insert"))
    }

    /// Stores a text message, or refreshes the identical one.
    pub fn submit_text(&self, text: &str, now: SystemTime) -> Result<Submission, RelayError> {
        Record::validate_text(text)?;
        let _guard = self.write_lock.lock();
        self.db
            .submit_text(CollectionKind::Messages, text, now)
            .map_err(fault("submit_text"))
    }

    /// Stores an uploaded file and sweeps expired messages.
    ///
    /// Content already stored under another record refreshes that record.
    /// Images that don't decode are rejected before anything is written.
    pub fn upload_file(
        &self,
        file_name: &str,
        bytes: &[u8],
        now: SystemTime,
    ) -> Result<UploadOutcome, RelayError> {
        Record::validate_file_name(file_name)?;
        FileStorage::check_image(file_name, bytes)?;

        let _guard = self.write_lock.lock();
        let submission = self
            .db
            .submit_file(file_name, bytes, now)
            .map_err(fault("upload_file"))?;

        if let Submission::Stored { record, .. } = &submission
            && let Err(err) = self.store_blob(record, bytes)
        {
            warn!(id = %record.id(), error = %err, "blob write failed, removing record");
            return Err(self.undo_upload(record, err));
        }

        let swept = self.sweep_locked(now)?;
        Ok(UploadOutcome { submission, swept })
    }

    fn store_blob(&self, record: &Record, bytes: &[u8]) -> Result<(), FileStorageError> {
        self.file.write_blob(record.id(), bytes)?;
        if FileStorage::is_supported_image(record.file_name()) {
            self.file.generate_thumbnail(record.id(), record.file_name())?;
        }
        Ok(())
    }

    /// Removes what an upload left behind after its blob failed.
    ///
    /// Returns the blob error, joined with the record rollback error if the
    /// record could not be removed either.
    fn undo_upload(&self, record: &Record, cause: FileStorageError) -> RelayError {
        let cause = fault("upload_file")(cause);
        self.log_removal_failures(slice::from_ref(record.id()));

        match self.db.delete(CollectionKind::Messages, record.id()) {
            Ok(_) => cause,
            Err(rollback) => {
                error!(id = %record.id(), error = %rollback, "failed to roll back upload");
                let mut failures = MultiError::default();
                failures.push(cause);
                failures.push(rollback);
                failures.into()
            }
        }
    }

    /// Updates `updated_at` only.
    pub fn touch(&self, id: &RecordId, now: SystemTime) -> Result<Record, RelayError> {
        let _guard = self.write_lock.lock();
        self.db
            .touch(CollectionKind::Messages, id, now)
            .map_err(fault("touch"))
    }

    /// Deletes a message together with its blob and thumbnail.
    pub fn delete(&self, id: &RecordId) -> Result<Record, RelayError> {
        let _guard = self.write_lock.lock();
        if self
            .db
            .get(CollectionKind::Messages, id)
            .map_err(fault("delete"))?
            .is_none()
        {
            return Err(DatabaseError::NotFound.into());
        }
        self.remove_blobs(slice::from_ref(id))?;
        self.db
            .delete(CollectionKind::Messages, id)
            .map_err(fault("delete"))
    }

    pub fn get(&self, id: &RecordId) -> Result<Option<Record>, RelayError> {
        self.db
            .get(CollectionKind::Messages, id)
            .map_err(fault("get"))
    }

    /// Contents of a file message's blob.
    ///
    /// Returns `Err(NotFound)` if `id` is not a stored file message.
    pub fn read_file(&self, id: &RecordId) -> Result<Vec<u8>, RelayError> {
        match self.get(id)? {
            Some(record) if record.is_file() => {
                self.file.read_blob(id).map_err(fault("read_file"))
            }
            _ => Err(DatabaseError::NotFound.into()),
        }
    }

    /// Every message, oldest `updated_at` first.
    pub fn all_messages(&self) -> Result<Vec<Record>, RelayError> {
        self.db
            .all_by_updated_at(CollectionKind::Messages)
            .map_err(fault("all_messages"))
    }

    pub fn all_files(&self) -> Result<Vec<Record>, RelayError> {
        self.db.all_files().map_err(fault("all_files"))
    }

    /// Most recently updated text message.
    pub fn last_text(&self) -> Result<Option<Record>, RelayError> {
        self.db
            .last_text(CollectionKind::Messages)
            .map_err(fault("last_text"))
    }

    /// The text message holding exactly `text`, if any.
    pub fn find_text(&self, text: &str) -> Result<Option<Record>, RelayError> {
        self.db
            .find_by_text(CollectionKind::Messages, text)
            .map_err(fault("find_text"))
    }

    pub fn message_count(&self) -> Result<u64, RelayError> {
        self.db
            .count(CollectionKind::Messages)
            .map_err(fault("message_count"))
    }

    pub fn checksum_exists(&self, checksum: &str) -> Result<bool, RelayError> {
        Ok(self
            .db
            .find_by_checksum(CollectionKind::Messages, checksum)
            .map_err(fault("checksum_exists"))?
            .is_some())
    }

    pub fn lifecycle_state(&self, record: &Record, now: SystemTime) -> LifecycleState {
        self.db.lifecycle().state_of(record, now)
    }
}

/// Clip operations.
impl RelayCore {
    /// Stores a clip, or refreshes the identical one. The oldest clips beyond
    /// the configured limit are dropped.
    pub fn submit_clip(&self, text: &str, now: SystemTime) -> Result<Submission, RelayError> {
        Record::validate_text(text)?;
        let _guard = self.write_lock.lock();
        self.db
            .submit_text(CollectionKind::Clips, text, now)
            .map_err(fault("submit_clip"))
    }

    pub fn touch_clip(&self, id: &RecordId, now: SystemTime) -> Result<Record, RelayError> {
        let _guard = self.write_lock.lock();
        self.db
            .touch(CollectionKind::Clips, id, now)
            .map_err(fault("touch_clip"))
    }

    pub fn delete_clip(&self, id: &RecordId) -> Result<Record, RelayError> {
        let _guard = self.write_lock.lock();
        self.db
            .delete(CollectionKind::Clips, id)
            .map_err(fault("delete_clip"))
    }

    pub fn delete_all_clips(&self) -> Result<Vec<RecordId>, RelayError> {
        let _guard = self.write_lock.lock();
        let removed = self
            .db
            .delete_all(CollectionKind::Clips)
            .map_err(fault("delete_all_clips"))?;
        info!(count = removed.len(), "deleted all clips");
        Ok(removed)
    }

    /// Every clip, oldest first.
    pub fn all_clips(&self) -> Result<Vec<Record>, RelayError> {
        self.db
            .all_by_updated_at(CollectionKind::Clips)
            .map_err(fault("all_clips"))
    }

    pub fn clip_count(&self) -> Result<u64, RelayError> {
        self.db
            .count(CollectionKind::Clips)
            .map_err(fault("clip_count"))
    }

    pub fn last_clip(&self) -> Result<Option<Record>, RelayError> {
        self.db
            .last_text(CollectionKind::Clips)
            .map_err(fault("last_clip"))
    }
}

/// Lifecycle operations.
impl RelayCore {
    /// Messages that are grey (or already expired) at `now`.
    pub fn find_grey(&self, now: SystemTime) -> Result<Vec<Record>, RelayError> {
        self.db.find_grey(now).map_err(fault("find_grey"))
    }

    /// Deletes expired messages. Returns the removed ids.
    pub fn sweep(&self, now: SystemTime) -> Result<Vec<RecordId>, RelayError> {
        let _guard = self.write_lock.lock();
        self.sweep_locked(now)
    }

    /// Deletes grey messages now.
    ///
    /// Returns `Err(NotFound)` when nothing is grey.
    pub fn delete_grey(&self, now: SystemTime) -> Result<Vec<RecordId>, RelayError> {
        let _guard = self.write_lock.lock();
        let grey = self.db.find_grey(now).map_err(fault("delete_grey"))?;
        if grey.is_empty() {
            return Err(DatabaseError::NotFound.into());
        }
        self.delete_messages_locked(ids_of(grey))
    }

    pub fn delete_oldest_files(&self, n: usize) -> Result<Vec<RecordId>, RelayError> {
        self.delete_oldest(Some(RecordKind::FileContent), n)
    }

    pub fn delete_oldest_items(&self, n: usize) -> Result<Vec<RecordId>, RelayError> {
        self.delete_oldest(None, n)
    }

    fn delete_oldest(
        &self,
        filter: Option<RecordKind>,
        n: usize,
    ) -> Result<Vec<RecordId>, RelayError> {
        let _guard = self.write_lock.lock();
        let oldest = self
            .db
            .oldest(CollectionKind::Messages, filter, n)
            .map_err(fault("delete_oldest"))?;
        self.delete_messages_locked(ids_of(oldest))
    }

    /// Empties the files directory and deletes every file message.
    ///
    /// Both steps are attempted; their failures are reported together.
    pub fn delete_all_files(&self) -> Result<Vec<RecordId>, RelayError> {
        let _guard = self.write_lock.lock();
        let mut failures = MultiError::default();

        if let Err(err) = self.file.reset() {
            error!(error = %err, "failed to reset files directory");
            failures.push(err);
        }

        let removed = match self.db.delete_all_files() {
            Ok(removed) => removed,
            Err(err) => {
                error!(error = %err, "failed to delete file records");
                failures.push(err);
                vec![]
            }
        };

        info!(count = removed.len(), "deleted all files");
        Ok(failures.into_result(removed)?)
    }

    /// Bundles every file message, except earlier bundles, into a new zip
    /// message named `relay_all_files_<id>.zip`.
    pub fn zip_all_files(&self, now: SystemTime) -> Result<Record, RelayError> {
        let _guard = self.write_lock.lock();

        let entries: Vec<(RecordId, String)> = self
            .db
            .all_files()
            .map_err(fault("zip_all_files"))?
            .into_iter()
            .filter(|record| !record.is_zip_archive())
            .map(|record| (record.id().clone(), record.file_name().to_string()))
            .collect();

        let id = self
            .db
            .next_id(CollectionKind::Messages, now)
            .map_err(fault("zip_all_files"))?;
        let mut record = Record::zip_archive(id.to_record_id(), ZIP_ARCHIVE_BASE, now);
        let size = self
            .file
            .zip_files(record.id(), &entries)
            .map_err(fault("zip_all_files"))?;
        record.set_file_size(size);

        if let Err(err) = self.db.insert(CollectionKind::Messages, &record) {
            warn!(id = %record.id(), error = %err, "archive insert failed, removing blob");
            self.log_removal_failures(slice::from_ref(record.id()));
            return Err(fault("zip_all_files")(err));
        }

        info!(id = %record.id(), files = entries.len(), size, "zipped all files");
        Ok(record)
    }

    /// Runs a maintenance command.
    pub fn execute(&self, command: Command, now: SystemTime) -> Result<CommandOutcome, RelayError> {
        debug!(%command, "executing command");
        match command {
            Command::ZipAllFiles => self.zip_all_files(now).map(CommandOutcome::Zipped),
            Command::DeleteAllFiles => self.delete_all_files().map(CommandOutcome::Deleted),
            Command::DeleteOldestFiles(n) => {
                self.delete_oldest_files(n).map(CommandOutcome::Deleted)
            }
            Command::DeleteOldestItems(n) => {
                self.delete_oldest_items(n).map(CommandOutcome::Deleted)
            }
            Command::DeleteGreyItems => self.delete_grey(now).map(CommandOutcome::Deleted),
        }
    }

    fn sweep_locked(&self, now: SystemTime) -> Result<Vec<RecordId>, RelayError> {
        let expired = self.db.find_expired(now).map_err(fault("sweep"))?;
        if expired.is_empty() {
            return Ok(vec![]);
        }
        let removed = self.delete_messages_locked(ids_of(expired))?;
        debug!(count = removed.len(), "swept expired messages");
        Ok(removed)
    }

    /// Removes blobs first; records are kept if any blob can't be removed.
    fn delete_messages_locked(&self, ids: Vec<RecordId>) -> Result<Vec<RecordId>, RelayError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.remove_blobs(&ids)?;
        let removed = self
            .db
            .delete_many(CollectionKind::Messages, &ids)
            .map_err(fault("delete_messages"))?;
        info!(count = removed.len(), "deleted messages");
        Ok(removed)
    }

    fn remove_blobs(&self, ids: &[RecordId]) -> Result<(), RelayError> {
        let failures: MultiError = self.file.remove(ids).into_iter().collect();
        if !failures.is_empty() {
            error!(error = %failures, "failed to remove blobs");
        }
        Ok(failures.into_result(())?)
    }

    /// Best-effort cleanup: every path is attempted, failures are logged.
    fn log_removal_failures(&self, ids: &[RecordId]) {
        for err in self.file.remove(ids) {
            error!(error = %err, "failed to clean up blob");
        }
    }
}

/// Session operations.
impl RelayCore {
    /// Issues a session cookie for the right password.
    ///
    /// After too many wrong passwords every session is dropped and logins
    /// fail until the process restarts.
    pub fn login(&self, password: &str) -> Result<SessionCookie, RelayError> {
        Ok(self.login.login(&self.sessions, &self.password, password)?)
    }

    /// Ends a session and returns the cookie that expires it.
    pub fn logout(&self, token: &str) -> SessionCookie {
        self.sessions.revoke(token)
    }

    pub fn is_logged_in(&self, token: &str) -> bool {
        self.sessions.is_valid(token)
    }
}
