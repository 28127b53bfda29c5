//! tis-audit
//!
//! Append-only audit trail for the sync: one JSON object per line in
//! `<log_dir>/audit.jsonl`, one line per rejected submit, per deletion, and
//! (when verbose) per accepted submit.
//!
//! With the hash chain enabled each event carries `hash_prev` + `hash_self`.
//! Every event also carries its `seq`, so [`AuditWriter::resume`] only needs
//! the last line of the log to pick the chain up again.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

pub const TOPIC_SUBMIT: &str = "submit";
pub const TOPIC_DELETE: &str = "delete";

pub const EVENT_SUBMIT_OK: &str = "SUBMIT_OK";
pub const EVENT_SUBMIT_ERROR: &str = "SUBMIT_ERROR";
pub const EVENT_DELETE: &str = "DELETE";

/// Namespace for deterministic event ids (UUIDv5).
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a7e_4b0d_4e55_9a63_1d2f_8c4b_7e10);

/// Bytes read from the end of the log per attempt when resuming.
const TAIL_WINDOW: u64 = 16 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub seq: u64,
    pub run_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub topic: String,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Appends events to one JSONL file.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    next_seq: u64,
}

impl AuditWriter {
    /// Starts a new chain at `path`, creating parent dirs.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            next_seq: 0,
        })
    }

    /// Continue the chain of the events already in `path`.
    ///
    /// A partial last line (an append cut short by a crash) is cut off with a
    /// warning. Complete lines that do not parse are skipped with a warning and
    /// the chain continues from the last event that does.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut writer = Self::new(path, hash_chain)?;
        let mut file = match OpenOptions::new().read(true).write(true).open(&writer.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(writer),
            Err(e) => return Err(e).with_context(|| format!("open audit log {:?}", writer.path)),
        };

        let tail = read_tail(&mut file)
            .with_context(|| format!("read audit log {:?}", writer.path))?;

        if tail.missing_newline {
            file.seek(SeekFrom::End(0))?;
            file.write_all(b"\n").context("terminate last audit line")?;
        } else if tail.partial_bytes > 0 {
            warn!(
                path = %writer.path.display(),
                bytes = tail.partial_bytes,
                "audit log ends with a partial line; truncating it"
            );
            file.set_len(tail.complete_len)
                .context("truncate partial audit line")?;
        }
        if tail.skipped > 0 {
            warn!(
                path = %writer.path.display(),
                lines = tail.skipped,
                "unparseable audit lines at the end of the log; chaining from the last valid event"
            );
        }

        if let Some(last) = tail.last {
            writer.last_hash = last.hash_self;
            writer.next_seq = last.seq + 1;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Sequence number the next event gets.
    pub fn seq(&self) -> u64 {
        self.next_seq
    }

    pub fn append(
        &mut self,
        run_id: Uuid,
        topic: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<AuditEvent> {
        let seq = self.next_seq;
        let mut ev = AuditEvent {
            event_id: derive_event_id(self.last_hash.as_deref(), &payload, seq)?,
            seq,
            run_id,
            ts_utc: Utc::now(),
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };
        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(event_hash(&ev)?);
        }

        let mut line = canonical_json(&ev)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append to audit log {:?}", self.path))?;

        // Only advance once the line is on disk.
        self.next_seq = seq + 1;
        if self.hash_chain {
            self.last_hash = ev.hash_self.clone();
        }
        Ok(ev)
    }
}

/// `event_id` = UUIDv5 over (previous hash, sequence, canonical payload).
/// No RNG: replaying the same log produces the same ids.
fn derive_event_id(prev_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let payload_json = serde_json::to_string(&sorted(payload.clone())).context("serialize payload")?;
    let name = format!("{}|{}|{}", prev_hash.unwrap_or("GENESIS"), seq, payload_json);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()))
}

/// Compact JSON with object keys sorted at every level.
fn canonical_json<T: Serialize>(v: &T) -> Result<String> {
    let value = serde_json::to_value(v).context("serialize audit event")?;
    serde_json::to_string(&sorted(value)).context("encode audit event")
}

fn sorted(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// SHA-256 of the event's canonical JSON with `hash_self` left out.
fn event_hash(ev: &AuditEvent) -> Result<String> {
    let unsealed = AuditEvent {
        hash_self: None,
        ..ev.clone()
    };
    let digest = Sha256::digest(canonical_json(&unsealed)?.as_bytes());
    Ok(hex::encode(digest))
}

fn parse_line(bytes: &[u8]) -> Option<AuditEvent> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

struct Tail {
    last: Option<AuditEvent>,
    /// File length up to and including the last newline.
    complete_len: u64,
    /// Bytes after the last newline that do not form an event.
    partial_bytes: u64,
    /// The unterminated remainder is a whole event; only its newline is missing.
    missing_newline: bool,
    /// Complete but unparseable lines after `last`.
    skipped: usize,
}

/// Find the last event by reading backwards from the end of the file,
/// widening the window until one parses or the start is reached.
fn read_tail(file: &mut File) -> Result<Tail> {
    let len = file.metadata()?.len();
    let mut window = TAIL_WINDOW;
    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        std::io::Read::by_ref(file).take(len - start).read_to_end(&mut buf)?;

        let complete = buf.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        let fragment = &buf[complete..];
        if let Some(ev) = parse_line(fragment) {
            return Ok(Tail {
                last: Some(ev),
                complete_len: len,
                partial_bytes: 0,
                missing_newline: true,
                skipped: 0,
            });
        }

        let mut lines: Vec<&[u8]> = buf[..complete].split(|b| *b == b'\n').collect();
        if start > 0 {
            // May begin mid-line.
            lines.remove(0);
        }
        let mut skipped = 0;
        let mut last = None;
        for line in lines.iter().rev() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match parse_line(line) {
                Some(ev) => {
                    last = Some(ev);
                    break;
                }
                None => skipped += 1,
            }
        }

        if last.is_some() || start == 0 {
            return Ok(Tail {
                last,
                complete_len: start + complete as u64,
                partial_bytes: fragment.len() as u64,
                missing_newline: false,
                skipped,
            });
        }
        window = window.saturating_mul(2);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

/// Walk the log from the top, checking every `hash_prev` link and `hash_self`.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("read audit log {:?}", path))?;

    let mut expected_prev: Option<String> = None;
    let mut events = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read audit log {:?}", path))?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let ev: AuditEvent = match serde_json::from_str(line.trim()) {
            Ok(ev) => ev,
            Err(e) => {
                return Ok(VerifyResult::Broken {
                    line: line_no,
                    reason: format!("unparseable event: {e}"),
                })
            }
        };
        events += 1;

        if ev.hash_prev != expected_prev {
            return Ok(VerifyResult::Broken {
                line: line_no,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    expected_prev, ev.hash_prev
                ),
            });
        }
        if let Some(claimed) = ev.hash_self.as_deref() {
            let actual = event_hash(&ev)?;
            if claimed != actual {
                return Ok(VerifyResult::Broken {
                    line: line_no,
                    reason: format!("hash_self mismatch: claimed {claimed}, computed {actual}"),
                });
            }
        }
        expected_prev = ev.hash_self;
    }

    Ok(VerifyResult::Valid { lines: events })
}
