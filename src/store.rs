//! Stream store (Component C).
//!
//! Five synchronous operations — `Create`, `Append`, `Delete`, `Head`,
//! `Read` — plus `Await`, which suspends. Concurrency comes from the
//! caller's scheduler (many tasks calling these methods at once), not
//! from anything internal to the store spawning work.
//!
//! Per-stream write serialization: each stream owns a [`parking_lot::Mutex`]
//! that a writer holds for the duration of its append (codec parse,
//! metadata persist, waiter wake). Reads never take that mutex — they
//! take a per-stream [`parking_lot::RwLock`] over the codec content,
//! which many concurrent readers can hold at once, and an [`AtomicU64`]
//! publishes the tail so a `Head`/up-to-date check never needs to touch
//! the content lock at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{Codec, CodecRegistry};
use crate::error::ErrorKind;
use crate::metadata::{MetadataError, MetadataStore};
use crate::types::{
    CreateOutcome, HeadSnapshot, ReadOutcome, StreamConfig, StreamLifecycleEvent, StreamMetadata,
    StreamUrl,
};

impl From<MetadataError> for ErrorKind {
    fn from(e: MetadataError) -> Self {
        ErrorKind::internal(e.to_string())
    }
}

/// Append/delete notification broadcast to `Await`ers.
#[derive(Debug, Clone)]
enum Notification {
    Appended { url: StreamUrl, tail: u64 },
    Deleted { url: StreamUrl },
}

/// In-process state for one stream: the content codec owns, a tail
/// counter readers can check lock-free, and the mutex writers serialize
/// on.
struct StreamSlot {
    write_lock: Mutex<()>,
    metadata: RwLock<StreamMetadata>,
    content: RwLock<crate::codec::CodecState>,
    codec: Arc<dyn Codec>,
    tail: AtomicU64,
    /// Earliest position still retained. Always `0` in this in-memory
    /// store (nothing is ever evicted), but `Read` still consults it so
    /// the `Gone` path is real code, not dead code, should retention
    /// ever be added.
    retained_from: AtomicU64,
}

/// The stream store. One per process, shared behind an `Arc`.
pub struct StreamStore {
    metadata_store: Arc<dyn MetadataStore>,
    codecs: CodecRegistry,
    slots: RwLock<HashMap<StreamUrl, Arc<StreamSlot>>>,
    notify_tx: broadcast::Sender<Notification>,
    on_lifecycle: Option<Box<dyn Fn(StreamLifecycleEvent) + Send + Sync>>,
}

impl StreamStore {
    pub fn new(metadata_store: Arc<dyn MetadataStore>, codecs: CodecRegistry) -> Arc<Self> {
        let (notify_tx, _) = broadcast::channel(4096);
        Arc::new(Self {
            metadata_store,
            codecs,
            slots: RwLock::new(HashMap::new()),
            notify_tx,
            on_lifecycle: None,
        })
    }

    pub fn with_lifecycle<F>(
        metadata_store: Arc<dyn MetadataStore>,
        codecs: CodecRegistry,
        on_lifecycle: F,
    ) -> Arc<Self>
    where
        F: Fn(StreamLifecycleEvent) + Send + Sync + 'static,
    {
        let (notify_tx, _) = broadcast::channel(4096);
        Arc::new(Self {
            metadata_store,
            codecs,
            slots: RwLock::new(HashMap::new()),
            notify_tx,
            on_lifecycle: Some(Box::new(on_lifecycle)),
        })
    }

    fn emit_lifecycle(&self, event: StreamLifecycleEvent) {
        if let Some(cb) = &self.on_lifecycle {
            cb(event);
        }
    }

    fn get_live_slot(&self, url: &str) -> Option<Arc<StreamSlot>> {
        let slot = self.slots.read().get(url).cloned()?;
        if slot.metadata.read().is_expired() {
            self.evict(url, true);
            return None;
        }
        Some(slot)
    }

    /// Remove a slot (and its metadata record), optionally because it
    /// expired rather than because the client asked for `Delete`.
    fn evict(&self, url: &str, expired: bool) {
        let removed = self.slots.write().remove(url);
        if removed.is_some() {
            if let Err(e) = self.metadata_store.delete(url) {
                warn!(path = %url, error = %e, "failed to remove metadata for evicted stream");
            }
            let _ = self.notify_tx.send(Notification::Deleted { url: url.to_string() });
            self.emit_lifecycle(if expired {
                StreamLifecycleEvent::Expired {
                    path: url.to_string(),
                    timestamp: chrono::Utc::now(),
                }
            } else {
                StreamLifecycleEvent::Deleted {
                    path: url.to_string(),
                    timestamp: chrono::Utc::now(),
                }
            });
        }
    }

    /// **Create**: idempotent if an unexpired stream with matching
    /// config already exists; `Conflict` if it exists with a different
    /// one; otherwise allocates a fresh stream.
    pub fn create(&self, url: &str, config: StreamConfig) -> Result<(CreateOutcome, u64), ErrorKind> {
        if config.ttl_seconds.is_some() && config.expires_at.is_some() {
            return Err(ErrorKind::BadRequest(
                "cannot specify both Stream-TTL and Stream-Expires-At".into(),
            ));
        }

        if let Some(slot) = self.get_live_slot(url) {
            let meta = slot.metadata.read();
            if meta.config_matches(&config) {
                return Ok((CreateOutcome::ExistsMatch, meta.next_offset));
            }
            return Err(ErrorKind::Conflict(
                "stream already exists with different configuration".into(),
            ));
        }

        let normalized_ct = config
            .content_type
            .as_deref()
            .map(crate::codec::normalize_content_type)
            .unwrap_or_default();
        let codec = self.codecs.resolve(&normalized_ct);
        let mut content = codec.create_empty();

        if let Some(body) = &config.initial_data {
            codec.apply_initial(&mut content, body)?;
        }

        let mut metadata = StreamMetadata::new(config.content_type.clone(), config.ttl_seconds, config.expires_at);
        metadata.next_offset = codec.size(&content);

        self.metadata_store.put(url, &metadata)?;

        let next_offset = metadata.next_offset;
        let slot = Arc::new(StreamSlot {
            write_lock: Mutex::new(()),
            metadata: RwLock::new(metadata),
            content: RwLock::new(content),
            codec,
            tail: AtomicU64::new(next_offset),
            retained_from: AtomicU64::new(0),
        });

        self.slots.write().insert(url.to_string(), slot);
        info!(path = %url, "created stream");
        self.emit_lifecycle(StreamLifecycleEvent::Created {
            path: url.to_string(),
            content_type: config.content_type,
            timestamp: chrono::Utc::now(),
        });

        Ok((CreateOutcome::Created, next_offset))
    }

    /// **Append**: fails closed on content-type mismatch, sequence
    /// regression, or an empty/malformed body, and serializes with every
    /// other writer on this stream via `write_lock`.
    pub fn append(
        &self,
        url: &str,
        content_type: Option<&str>,
        seq: Option<&str>,
        body: &[u8],
    ) -> Result<u64, ErrorKind> {
        let slot = self.get_live_slot(url).ok_or(ErrorKind::NotFound)?;
        let _guard = slot.write_lock.lock();

        // Re-check under the write lock: another writer may have deleted
        // the stream between our lookup and acquiring the lock.
        if self.slots.read().get(url).map(Arc::as_ptr) != Some(Arc::as_ptr(&slot)) {
            return Err(ErrorKind::NotFound);
        }

        {
            let meta = slot.metadata.read();
            if meta.is_expired() {
                drop(meta);
                self.evict(url, true);
                return Err(ErrorKind::NotFound);
            }

            if let Some(ct) = content_type {
                let requested = crate::codec::normalize_content_type(ct);
                if let Some(stored) = meta.normalized_content_type() {
                    if requested != stored {
                        return Err(ErrorKind::Conflict(format!(
                            "content-type mismatch: expected {stored}, got {requested}"
                        )));
                    }
                }
            }

            if let Some(s) = seq {
                if let Some(last_seq) = &meta.last_seq {
                    if s <= last_seq.as_str() {
                        return Err(ErrorKind::Conflict(format!(
                            "sequence {s} is not strictly greater than last sequence {last_seq}"
                        )));
                    }
                }
            }
        }

        {
            let mut content = slot.content.write();
            slot.codec.append(&mut content, body)?;
            let new_tail = slot.codec.size(&content);

            let mut meta = slot.metadata.write();
            meta.next_offset = new_tail;
            if let Some(s) = seq {
                meta.last_seq = Some(s.to_string());
            }
            self.metadata_store.put(url, &meta)?;

            slot.tail.store(new_tail, Ordering::SeqCst);
            debug!(path = %url, next_offset = new_tail, "appended to stream");

            let _ = self.notify_tx.send(Notification::Appended {
                url: url.to_string(),
                tail: new_tail,
            });

            Ok(new_tail)
        }
    }

    /// **Delete**: removes metadata and content, wakes every waiter with `false`.
    pub fn delete(&self, url: &str) -> bool {
        let existed = self.slots.read().contains_key(url);
        if existed {
            self.evict(url, false);
        }
        existed
    }

    /// **Head**: current snapshot, or `None` if absent/expired.
    pub fn head(&self, url: &str) -> Option<HeadSnapshot> {
        let slot = self.get_live_slot(url)?;
        let meta = slot.metadata.read();
        Some(HeadSnapshot {
            content_type: meta.content_type.clone(),
            next_offset: slot.tail.load(Ordering::SeqCst),
            ttl_seconds_remaining: meta.remaining_ttl_seconds(),
            expires_at: meta.expires_at,
        })
    }

    /// **Read**: `[start, start + max_chunk)`, clamped to the tail.
    pub fn read(&self, url: &str, start: u64, max_chunk: usize) -> Result<ReadOutcome, ErrorKind> {
        let slot = self.get_live_slot(url).ok_or(ErrorKind::NotFound)?;

        if start < slot.retained_from.load(Ordering::SeqCst) {
            return Err(ErrorKind::Gone);
        }

        let tail = slot.tail.load(Ordering::SeqCst);
        let clamped_start = start.min(tail);

        let content = slot.content.read();
        let (body, next_offset, up_to_date) = slot.codec.read(&content, clamped_start, max_chunk);
        let meta = slot.metadata.read();

        Ok(ReadOutcome {
            body,
            content_type: meta.content_type.clone(),
            next_offset,
            up_to_date,
            stream_id: meta.id,
        })
    }

    /// **Await**: resolves `true` as soon as the tail exceeds
    /// `start_position`, `false` on timeout or stream removal.
    pub async fn await_tail(&self, url: &str, start_position: u64, timeout: Duration) -> bool {
        let slot = match self.get_live_slot(url) {
            Some(s) => s,
            None => return false,
        };
        if slot.tail.load(Ordering::SeqCst) > start_position {
            return true;
        }

        let mut rx = self.notify_tx.subscribe();
        let url_owned = url.to_string();

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(Notification::Appended { url: u, tail }) if u == url_owned => {
                        if tail > start_position {
                            return true;
                        }
                    }
                    Ok(Notification::Deleted { url: u }) if u == url_owned => return false,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(slot) = self.get_live_slot(&url_owned) {
                            if slot.tail.load(Ordering::SeqCst) > start_position {
                                return true;
                            }
                        } else {
                            return false;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }

    /// List all non-expired stream URLs (diagnostics/testing aid).
    pub fn list(&self) -> Vec<StreamUrl> {
        let urls: Vec<StreamUrl> = self.slots.read().keys().cloned().collect();
        urls.into_iter().filter(|u| self.get_live_slot(u).is_some()).collect()
    }

    /// Scan for and evict expired streams. Intended to be driven by a
    /// background interval task so long-poll/SSE waiters on an about-to-
    /// expire stream don't have to wait out their full timeout.
    pub fn sweep_expired(&self) {
        let expired: Vec<StreamUrl> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.metadata.read().is_expired())
            .map(|(url, _)| url.clone())
            .collect();

        for url in expired {
            self.evict(&url, true);
        }
    }

    /// Spawn the background expiry sweeper on the current tokio runtime.
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }

    /// Internal id of a live stream, used by the engine to build ETags.
    pub fn stream_id(&self, url: &str) -> Option<Uuid> {
        self.get_live_slot(url).map(|s| s.metadata.read().id)
    }
}
