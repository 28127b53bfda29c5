//! One reconciliation run against the remote indicator store.
//!
//! Lifecycle: `open` (load state, get token) -> `submit`* -> `close`
//! (flush, delete stale, persist). Dropping an unclosed session persists
//! what was learned so far but never deletes anything remotely.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::mem;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tis_audit::{
    AuditWriter, AUDIT_FILE_NAME, EVENT_DELETE, EVENT_SUBMIT_ERROR, EVENT_SUBMIT_OK, TOPIC_DELETE,
    TOPIC_SUBMIT,
};
use tis_config::SyncConfig;
use tis_graph::model::{EXPIRATION_DATE_TIME, REQUEST_HASH};
use tis_graph::{BearerToken, ClientCredentials, Indicator, IndicatorGateway, SubmitResult, TokenSource};
use tis_state::{KnownIndicatorMap, StateOrigin, StateStore, DATE_FORMAT};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::fingerprint::fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepting indicators.
    Active,
    /// A batch is in flight.
    Flushing,
    /// Final flush, deletions and persistence.
    Closing,
    /// State persisted; nothing left to do on drop.
    Closed,
}

/// Counters reported when a session closes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionReport {
    /// Items the remote accepted.
    pub success: u64,
    /// Items the remote rejected.
    pub error: u64,
    /// Stale indicators removed remotely (2xx or already gone).
    pub deleted: u64,
    /// Delete calls answered with any other status.
    pub delete_failed: u64,
    /// Submitted indicators already known remotely, plus repeats within the run.
    pub unchanged: u64,
    /// Caller's estimate of how many indicators the feed holds.
    pub total_expected: u64,
    /// Audit events that could not be written.
    pub audit_failed: u64,
    pub elapsed: std::time::Duration,
}

impl SessionReport {
    pub fn sent(&self) -> u64 {
        self.success + self.error
    }
}

pub struct ReconciliationSession<G: IndicatorGateway, T: TokenSource, C: Clock> {
    gateway: G,
    tokens: T,
    clock: C,
    credentials: ClientCredentials,
    store: StateStore,
    audit: AuditWriter,
    run_id: Uuid,

    verbose_log: bool,
    batch_size: usize,
    token_lifetime: Duration,
    token: BearerToken,
    token_expires_at: DateTime<Utc>,

    known: KnownIndicatorMap,
    /// Known fingerprints not yet seen this run. Whatever is left at close is stale.
    pending_deletion: KnownIndicatorMap,
    queued: HashSet<String>,
    expiration_date: NaiveDate,
    batch: Vec<Indicator>,

    report: SessionReport,
    phase: SessionPhase,
    started_at: DateTime<Utc>,
    last_flush_at: DateTime<Utc>,
}

impl<G: IndicatorGateway, T: TokenSource, C: Clock> ReconciliationSession<G, T, C> {
    /// Load persisted state (resetting it if expired) and obtain a token.
    ///
    /// State artifacts are not written here; an auth failure leaves them untouched.
    pub fn open(
        config: &SyncConfig,
        gateway: G,
        tokens: T,
        clock: C,
        total_expected: u64,
    ) -> Result<Self, SyncError> {
        let started_at = clock.now();
        let store = StateStore::from_config(config);
        let loaded = store
            .open(started_at.date_naive())
            .map_err(SyncError::State)?;

        if loaded.origin == StateOrigin::Expired {
            info!(
                expiration_date = %loaded.expiration_date.format(DATE_FORMAT),
                "remote indicators expired; starting from empty state"
            );
        }

        let audit_path = config.log_dir.join(AUDIT_FILE_NAME);
        let audit = match AuditWriter::resume(&audit_path, true) {
            Ok(writer) => writer,
            Err(e) => {
                warn!(
                    path = %audit_path.display(),
                    error = %format!("{e:#}"),
                    "cannot resume audit log; starting a new chain"
                );
                AuditWriter::new(&audit_path, true).map_err(SyncError::Audit)?
            }
        };

        let credentials = ClientCredentials::from_config(config);
        let token = tokens.fetch_token(&credentials)?;
        let token_lifetime = Duration::seconds(config.token_lifetime_secs);

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            known = loaded.known.len(),
            origin = ?loaded.origin,
            expiration_date = %loaded.expiration_date.format(DATE_FORMAT),
            total_expected,
            "sync session opened"
        );

        Ok(Self {
            gateway,
            tokens,
            credentials,
            store,
            audit,
            run_id,
            verbose_log: config.verbose_log,
            batch_size: config.batch_size.max(1),
            token_lifetime,
            token,
            token_expires_at: started_at + token_lifetime,
            pending_deletion: loaded.known.clone(),
            known: loaded.known,
            queued: HashSet::new(),
            expiration_date: loaded.expiration_date,
            batch: Vec::with_capacity(config.batch_size),
            report: SessionReport {
                total_expected,
                ..SessionReport::default()
            },
            phase: SessionPhase::Active,
            started_at,
            last_flush_at: started_at,
            clock,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn expiration_date(&self) -> NaiveDate {
        self.expiration_date
    }

    pub fn known(&self) -> &KnownIndicatorMap {
        &self.known
    }

    pub fn pending_deletion(&self) -> &KnownIndicatorMap {
        &self.pending_deletion
    }

    pub fn queued_len(&self) -> usize {
        self.batch.len()
    }

    /// Stamp, fingerprint and queue one indicator; flushes when the batch fills.
    ///
    /// Already-known indicators are only marked as seen.
    pub fn submit(&mut self, mut indicator: Indicator) -> Result<(), SyncError> {
        self.ensure_token()?;

        indicator.insert(
            EXPIRATION_DATE_TIME,
            self.expiration_date.format(DATE_FORMAT).to_string(),
        );
        let hash = fingerprint(&indicator);
        indicator.insert(REQUEST_HASH, hash.clone());

        self.pending_deletion.remove(&hash);
        if self.known.contains_key(&hash) || !self.queued.insert(hash) {
            self.report.unchanged += 1;
            return Ok(());
        }

        self.batch.push(indicator);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush, delete stale indicators, persist state.
    pub fn close(mut self) -> Result<SessionReport, SyncError> {
        self.phase = SessionPhase::Closing;
        self.flush()?;
        self.delete_stale()?;

        self.store
            .close(&self.known, self.expiration_date)
            .map_err(SyncError::State)?;
        self.phase = SessionPhase::Closed;

        self.report.elapsed = self.elapsed_since(self.started_at);
        info!(
            run_id = %self.run_id,
            success = self.report.success,
            error = self.report.error,
            deleted = self.report.deleted,
            delete_failed = self.report.delete_failed,
            unchanged = self.report.unchanged,
            audit_failed = self.report.audit_failed,
            known = self.known.len(),
            elapsed_secs = self.report.elapsed.as_secs_f64(),
            "sync session closed"
        );
        Ok(self.report.clone())
    }

    fn ensure_token(&mut self) -> Result<(), SyncError> {
        let now = self.clock.now();
        if now <= self.token_expires_at {
            return Ok(());
        }
        debug!("access token stale; refreshing");
        self.token = self.tokens.fetch_token(&self.credentials)?;
        self.token_expires_at = now + self.token_lifetime;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SyncError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let resume_phase = self.phase;
        self.phase = SessionPhase::Flushing;
        self.ensure_token()?;

        let batch = mem::take(&mut self.batch);
        let results = self.gateway.bulk_submit(&batch, &self.token)?;
        if results.len() != batch.len() {
            warn!(
                sent = batch.len(),
                returned = results.len(),
                "bulk submit returned a different number of items"
            );
        }

        let (mut batch_ok, mut batch_err) = (0u64, 0u64);
        for result in results {
            match result {
                SubmitResult::Accepted {
                    request_hash,
                    remote_id,
                    raw,
                } => {
                    batch_ok += 1;
                    self.known.insert(request_hash, remote_id);
                    if self.verbose_log {
                        self.record(TOPIC_SUBMIT, EVENT_SUBMIT_OK, raw);
                    }
                }
                SubmitResult::Rejected { request_hash, raw } => {
                    batch_err += 1;
                    warn!(request_hash = request_hash.as_deref().unwrap_or("-"), "indicator rejected");
                    self.record(TOPIC_SUBMIT, EVENT_SUBMIT_ERROR, raw);
                }
            }
        }
        self.report.success += batch_ok;
        self.report.error += batch_err;

        self.log_progress(batch_ok, batch_err);
        self.phase = resume_phase;
        Ok(())
    }

    /// Delete every known indicator not seen this run.
    ///
    /// Any HTTP answer drops the entry from the known map. A transport
    /// failure aborts and leaves the remaining entries for the next run.
    fn delete_stale(&mut self) -> Result<(), SyncError> {
        let stale = mem::take(&mut self.pending_deletion);
        if !stale.is_empty() {
            info!(count = stale.len(), "deleting stale indicators");
        }

        for (hash, remote_id) in stale {
            self.ensure_token()?;
            let outcome = self.gateway.delete(&remote_id, &self.token)?;
            self.known.remove(&hash);

            if outcome.is_deleted() {
                self.report.deleted += 1;
            } else {
                self.report.delete_failed += 1;
                warn!(remote_id = %remote_id, status = outcome.status, "delete not confirmed");
            }
            self.record(
                TOPIC_DELETE,
                EVENT_DELETE,
                json!({
                    "tiindicator_id": remote_id,
                    "response_status": outcome.status,
                    "response_content": outcome.body,
                }),
            );
        }
        Ok(())
    }

    /// Append to the audit log. A failed write is logged and the run goes on.
    fn record(&mut self, topic: &str, event_type: &str, payload: serde_json::Value) {
        if let Err(e) = self.audit.append(self.run_id, topic, event_type, payload) {
            self.report.audit_failed += 1;
            warn!(
                run_id = %self.run_id,
                event_type,
                error = %format!("{e:#}"),
                "audit write failed"
            );
        }
    }

    fn log_progress(&mut self, batch_ok: u64, batch_err: u64) {
        let now = self.clock.now();
        let batch_secs = seconds_between(self.last_flush_at, now);
        let total_secs = seconds_between(self.started_at, now);
        self.last_flush_at = now;

        let sent = self.report.sent();
        let per_sec = (total_secs > 0.0).then(|| sent as f64 / total_secs);
        let eta_secs = per_sec
            .filter(|r| *r > 0.0)
            .map(|r| self.report.total_expected.saturating_sub(sent) as f64 / r);

        info!(
            batch_success = batch_ok,
            batch_error = batch_err,
            success = self.report.success,
            error = self.report.error,
            sent,
            total_expected = self.report.total_expected,
            batch_secs,
            per_sec = per_sec.unwrap_or(0.0),
            eta_secs = eta_secs.unwrap_or(0.0),
            "batch flushed"
        );
    }

    fn elapsed_since(&self, from: DateTime<Utc>) -> std::time::Duration {
        (self.clock.now() - from).to_std().unwrap_or_default()
    }
}

impl<G: IndicatorGateway, T: TokenSource, C: Clock> Drop for ReconciliationSession<G, T, C> {
    fn drop(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        // Aborted run: keep what the remote confirmed, skip deletions.
        match self.store.close(&self.known, self.expiration_date) {
            Ok(()) => warn!(
                run_id = %self.run_id,
                phase = ?self.phase,
                known = self.known.len(),
                dropped_queued = self.batch.len(),
                "sync session aborted; state persisted without deletions"
            ),
            Err(e) => warn!(run_id = %self.run_id, error = %format!("{e:#}"), "failed to persist state on abort"),
        }
    }
}

/// Open a session, feed it `indicators`, and close it.
///
/// On error the session is dropped unclosed: state is persisted and no
/// deletions happen.
pub fn run_session<G, T, C, I>(
    config: &SyncConfig,
    gateway: G,
    tokens: T,
    clock: C,
    total_expected: u64,
    indicators: I,
) -> Result<SessionReport, SyncError>
where
    G: IndicatorGateway,
    T: TokenSource,
    C: Clock,
    I: IntoIterator<Item = Indicator>,
{
    let mut session = ReconciliationSession::open(config, gateway, tokens, clock, total_expected)?;
    for indicator in indicators {
        session.submit(indicator)?;
    }
    session.close()
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}
