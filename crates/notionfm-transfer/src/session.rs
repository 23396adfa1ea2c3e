//! Upload session - one file from session creation to attach
//!
//! ## State machine
//!
//! ```text
//! Pending -> Uploading -> (Retrying -> Uploading)*
//!         -> (RecoveringSession -> [CheckingSession ->] Uploading)*
//!         -> Completing -> (Retrying -> Completing)*
//!         -> Attaching  -> (Retrying -> Attaching)*  -> Completed
//! any -> Failed on a non-retryable, non-recoverable error
//! ```
//!
//! ## Recovery
//!
//! Every network step is retried on transient failure with the session's
//! [`RetryPolicy`]. A session-invalid answer while sending parts replaces the
//! remote session (unless a status check shows it is still usable) and
//! resumes at the first part not yet confirmed locally. The confirmed set is
//! a field of its own and survives the replacement. A session-invalid answer
//! while completing or attaching means the assembled upload is gone: the
//! confirmed set is cleared and the file is sent again on a fresh session.

use std::collections::BTreeSet;
use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error, info, warn};

use notionfm_core::config::UploadConfig;
use notionfm_core::domain::{
    FileUploadSpec, PageId, PartPlan, RetryDecision, RetryPolicy, TaskStatus, UploadId,
    UploadProgress,
};
use notionfm_core::ports::{IRemoteStore, RemoteError};

use crate::{Result, TransferError};

/// Callback receiving every progress event of a file
pub type ProgressCallback = Arc<dyn Fn(&UploadProgress) + Send + Sync>;

/// Retry and recovery knobs of an [`UploadSession`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Policy for every network step
    pub retry: RetryPolicy,
    /// Session replacements allowed before the file fails; `None` is unlimited
    pub max_session_recoveries: Option<u32>,
    /// Pause before a replacement session is created
    pub session_recovery_delay: Duration,
    /// Ask the remote whether a suspect session is still usable
    pub check_session_status: bool,
}

impl SessionOptions {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            retry: config.retry_policy(),
            max_session_recoveries: config.max_session_recoveries,
            session_recovery_delay: config.session_recovery_delay(),
            check_session_status: config.check_session_status,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

/// The remote session currently in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSessionState {
    pub id: UploadId,
    pub created_at: DateTime<Utc>,
    /// Declared part count; `None` for a single-shot upload
    pub part_count: Option<u32>,
}

/// Summary of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Session that was attached to the destination
    pub upload_id: UploadId,
    /// Bytes accepted by the remote, counting re-sends after a restart
    pub bytes_sent: u64,
    pub sessions_created: u32,
    pub retries: u32,
    pub recoveries: u32,
}

/// Upload of one file to one destination page
pub struct UploadSession {
    remote: Arc<dyn IRemoteStore>,
    spec: FileUploadSpec,
    plan: PartPlan,
    destination: PageId,
    options: SessionOptions,
    state: Option<UploadSessionState>,
    confirmed: BTreeSet<u32>,
    progress: UploadProgress,
    on_progress: Option<ProgressCallback>,
    bytes_sent: u64,
    sessions_created: u32,
    recoveries: u32,
    /// Session a status check last decided to keep
    kept_after_check: Option<UploadId>,
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("file", &self.spec.original_name())
            .field("destination", &self.destination)
            .field("state", &self.state)
            .field("confirmed", &self.confirmed)
            .field("status", &self.progress.status)
            .finish()
    }
}

impl UploadSession {
    pub fn new(
        remote: Arc<dyn IRemoteStore>,
        spec: FileUploadSpec,
        plan: PartPlan,
        destination: PageId,
        options: SessionOptions,
    ) -> Self {
        let progress = UploadProgress::new(spec.original_name(), plan.total_size(), plan.part_count());
        Self {
            remote,
            spec,
            plan,
            destination,
            options,
            state: None,
            confirmed: BTreeSet::new(),
            progress,
            on_progress: None,
            bytes_sent: 0,
            sessions_created: 0,
            recoveries: 0,
            kept_after_check: None,
        }
    }

    /// Registers a callback invoked on every phase and part transition
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn status(&self) -> TaskStatus {
        self.progress.status
    }

    pub fn progress(&self) -> &UploadProgress {
        &self.progress
    }

    /// Part numbers confirmed by the remote for this file
    pub fn confirmed_parts(&self) -> &BTreeSet<u32> {
        &self.confirmed
    }

    pub fn state(&self) -> Option<&UploadSessionState> {
        self.state.as_ref()
    }

    pub fn spec(&self) -> &FileUploadSpec {
        &self.spec
    }

    /// Runs the upload to a terminal status
    ///
    /// On error the status is `Failed` and a final progress event carries it.
    pub async fn run(&mut self) -> Result<UploadOutcome> {
        info!(
            file = %self.spec.original_name(),
            size = self.plan.total_size(),
            parts = self.plan.part_count(),
            multipart = self.plan.is_multipart(),
            destination = %self.destination,
            "Starting upload"
        );
        self.emit();

        match self.drive().await {
            Ok(upload_id) => {
                self.set_status(TaskStatus::Completed)?;
                let outcome = UploadOutcome {
                    upload_id,
                    bytes_sent: self.bytes_sent,
                    sessions_created: self.sessions_created,
                    retries: self.progress.retry_count,
                    recoveries: self.recoveries,
                };
                info!(
                    file = %self.spec.original_name(),
                    id = %outcome.upload_id,
                    sessions = outcome.sessions_created,
                    retries = outcome.retries,
                    "Upload completed"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(file = %self.spec.original_name(), error = %err, "Upload failed");
                if self.progress.status.can_transition_to(TaskStatus::Failed) {
                    self.progress.status = TaskStatus::Failed;
                    self.emit();
                }
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<UploadId> {
        self.set_status(TaskStatus::Uploading)?;
        loop {
            self.transfer_parts().await?;
            match self.finalize().await {
                Ok(id) => return Ok(id),
                Err(err) if is_session_invalid(&err) => self.restart_from_scratch(&err).await?,
                Err(err) => return Err(err),
            }
        }
    }

    /// Sends every unconfirmed part, replacing the session when it goes bad
    ///
    /// A refused session creation goes through the same recovery as a
    /// session lost mid-transfer.
    async fn transfer_parts(&mut self) -> Result<()> {
        loop {
            let id = match &self.state {
                Some(state) => Ok(state.id.clone()),
                None => self.open_session().await,
            };
            let sent = match id {
                Ok(id) => self.send_remaining(&id).await,
                Err(err) => Err(err),
            };
            match sent {
                Ok(()) => return Ok(()),
                Err(err) if is_session_invalid(&err) => self.recover_session(&err).await?,
                Err(err) => return Err(err),
            }
        }
    }

    async fn open_session(&mut self) -> Result<UploadId> {
        let remote = self.remote.clone();
        let remote = remote.as_ref();
        let name = self.spec.upload_name().to_string();
        let content_type = self.spec.content_type().to_string();
        let part_count = self.plan.is_multipart().then(|| self.plan.part_count());
        let (name, content_type) = (name.as_str(), content_type.as_str());

        let id = self
            .retry_step("create session", TaskStatus::Uploading, move || {
                remote.create_session(name, content_type, part_count)
            })
            .await?;

        self.sessions_created += 1;
        info!(
            file = %self.spec.original_name(),
            id = %id,
            ?part_count,
            resume_from = self.first_unconfirmed(),
            "Upload session created"
        );
        self.state = Some(UploadSessionState {
            id: id.clone(),
            created_at: Utc::now(),
            part_count,
        });
        Ok(id)
    }

    /// Lowest part number not yet confirmed
    fn first_unconfirmed(&self) -> u32 {
        (1..=self.plan.part_count())
            .find(|n| !self.confirmed.contains(n))
            .unwrap_or(self.plan.part_count() + 1)
    }

    async fn send_remaining(&mut self, id: &UploadId) -> Result<()> {
        if self.confirmed.len() as u32 == self.plan.part_count() {
            return Ok(());
        }

        let remote = self.remote.clone();
        let remote = remote.as_ref();
        let name = self.spec.upload_name().to_string();
        let content_type = self.spec.content_type().to_string();
        let (name, content_type) = (name.as_str(), content_type.as_str());

        let mut file = File::open(self.spec.path()).await?;
        for part in 1..=self.plan.part_count() {
            if self.confirmed.contains(&part) {
                continue;
            }
            self.check_unchanged(&file).await?;
            let data = read_part(&mut file, self.spec.path(), &self.plan, part).await?;
            let data = data.as_slice();
            let part_number = self.plan.is_multipart().then_some(part);

            self.progress.part_current = part;
            self.emit();
            debug!(id = %id, part, bytes = data.len(), "Sending part");

            self.retry_step("send part", TaskStatus::Uploading, move || {
                remote.send_part(id, part_number, name, content_type, data)
            })
            .await?;

            self.confirm(part, data.len() as u64);
        }
        Ok(())
    }

    async fn check_unchanged(&self, file: &File) -> Result<()> {
        let actual = file.metadata().await?.len();
        if actual != self.plan.total_size() {
            return Err(TransferError::FileChanged {
                path: self.spec.path().to_path_buf(),
                expected: self.plan.total_size(),
                actual,
            });
        }
        Ok(())
    }

    fn confirm(&mut self, part: u32, len: u64) {
        if self.confirmed.insert(part) {
            self.progress.bytes_confirmed += len;
        }
        self.bytes_sent += len;
        self.emit();
    }

    /// Completes (multi-part only) and attaches the upload
    async fn finalize(&mut self) -> Result<UploadId> {
        let id = match &self.state {
            Some(state) => state.id.clone(),
            None => return Err(TransferError::Remote(RemoteError::SessionInvalid(
                "no session to finalize".into(),
            ))),
        };
        let remote = self.remote.clone();
        let remote = remote.as_ref();
        let id_ref = &id;

        // Single-part uploads are assembled by the remote on send
        self.set_status(TaskStatus::Completing)?;
        if self.plan.is_multipart() {
            self.retry_step("complete session", TaskStatus::Completing, move || {
                remote.complete_session(id_ref)
            })
            .await?;
            debug!(id = %id, "Upload session completed");
        }

        self.set_status(TaskStatus::Attaching)?;
        let destination = self.destination.clone();
        let destination = &destination;
        let display_name = self.spec.original_name().to_string();
        let display_name = display_name.as_str();
        let category = self.spec.category();
        self.retry_step("attach", TaskStatus::Attaching, move || {
            remote.attach(destination, id_ref, display_name, category)
        })
        .await?;
        debug!(id = %id, destination = %self.destination, %category, "Upload attached");

        Ok(id)
    }

    /// Replaces (or keeps, after a status check) an invalidated session
    ///
    /// Only replacements count against `max_session_recoveries`.
    async fn recover_session(&mut self, cause: &TransferError) -> Result<()> {
        let Some(state) = self.state.clone() else {
            self.count_recovery()?;
            warn!(
                file = %self.spec.original_name(),
                error = %cause,
                "Session creation refused, trying a new session"
            );
            self.set_status(TaskStatus::RecoveringSession)?;
            tokio::time::sleep(self.options.session_recovery_delay).await;
            return self.set_status(TaskStatus::Uploading);
        };
        warn!(
            file = %self.spec.original_name(),
            id = %state.id,
            confirmed = self.confirmed.len(),
            error = %cause,
            "Upload session invalid, recovering"
        );
        self.set_status(TaskStatus::RecoveringSession)?;

        // A session kept by the previous check is replaced without asking again
        let checked_before = self.kept_after_check.as_ref() == Some(&state.id);
        if self.options.check_session_status && !checked_before {
            self.set_status(TaskStatus::CheckingSession)?;
            match self.remote.get_session_status(&state.id).await {
                Ok(status) if status.is_usable() => {
                    info!(id = %state.id, "Session still usable, resuming on it");
                    self.kept_after_check = Some(state.id);
                    self.set_status(TaskStatus::Uploading)?;
                    return Ok(());
                }
                Ok(status) => {
                    debug!(id = %state.id, status = %status.status, expired = status.expired, "Session not usable");
                }
                Err(err) => {
                    debug!(id = %state.id, error = %err, "Session status check failed");
                }
            }
        }

        self.count_recovery()?;
        tokio::time::sleep(self.options.session_recovery_delay).await;
        self.state = None;
        self.set_status(TaskStatus::Uploading)?;
        Ok(())
    }

    /// Drops all local progress and starts over on a new session
    async fn restart_from_scratch(&mut self, cause: &TransferError) -> Result<()> {
        self.count_recovery()?;
        warn!(
            file = %self.spec.original_name(),
            error = %cause,
            "Session lost after all parts were sent, restarting upload"
        );
        self.set_status(TaskStatus::RecoveringSession)?;
        self.confirmed.clear();
        self.progress.bytes_confirmed = 0;
        self.progress.part_current = 0;
        self.state = None;
        tokio::time::sleep(self.options.session_recovery_delay).await;
        self.set_status(TaskStatus::Uploading)
    }

    fn count_recovery(&mut self) -> Result<()> {
        self.recoveries += 1;
        match self.options.max_session_recoveries {
            Some(max) if self.recoveries > max => Err(TransferError::RecoveryLimit(max)),
            _ => Ok(()),
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the policy gives up
    ///
    /// Between attempts the status is `Retrying`, then back to `resume`.
    async fn retry_step<T, F, Fut>(
        &mut self,
        step: &'static str,
        resume: TaskStatus,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RemoteError>>,
    {
        let mut attempts = 0u32;
        loop {
            let err = match op().await {
                Ok(value) => {
                    if attempts > 0 {
                        info!(step, attempts = attempts + 1, "Step succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err.into()),
            };

            attempts += 1;
            let delay = match self.options.retry.next(attempts) {
                RetryDecision::RetryAfter(delay) => delay,
                RetryDecision::GiveUp => {
                    return Err(TransferError::RetriesExhausted {
                        step,
                        attempts,
                        last: err,
                    })
                }
            };

            warn!(
                file = %self.spec.original_name(),
                step,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );
            self.progress.retry_count += 1;
            self.set_status(TaskStatus::Retrying)?;
            tokio::time::sleep(delay).await;
            self.set_status(resume)?;
        }
    }

    fn set_status(&mut self, status: TaskStatus) -> Result<()> {
        self.progress.status = self.progress.status.transition_to(status)?;
        debug!(file = %self.spec.original_name(), %status, "Status changed");
        self.emit();
        Ok(())
    }

    fn emit(&self) {
        if let Some(callback) = &self.on_progress {
            callback(&self.progress);
        }
    }
}

fn is_session_invalid(err: &TransferError) -> bool {
    matches!(err, TransferError::Remote(e) if e.is_session_invalid())
}

/// Reads 1-based `part` of the planned file
async fn read_part(file: &mut File, path: &Path, plan: &PartPlan, part: u32) -> Result<Vec<u8>> {
    let range = plan.part_range(part)?;
    file.seek(SeekFrom::Start(range.start)).await?;
    let mut buf = vec![0u8; (range.end - range.start) as usize];
    file.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransferError::FileChanged {
                path: path.to_path_buf(),
                expected: plan.total_size(),
                actual: range.start,
            }
        } else {
            e.into()
        }
    })?;
    Ok(buf)
}
