//! In-memory session recording.
//!
//! While active, the buffer's most recent sample is appended every 200 ms.
//! Only the latest 600 samples are kept. Nothing is persisted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::acquisition::SampleBuffer;
use crate::config::defaults::{RECORDER_MAX_SAMPLES, RECORDER_TICK_MS};
use crate::processing::{summary, SignalSummary};
use crate::shared::Shared;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedSession {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub duration_sec: u64,
    pub sample_count: usize,
    pub samples: Vec<f64>,
    pub summary: SignalSummary,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    samples: VecDeque<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecorderStatus {
    pub recording: bool,
    pub id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub sample_count: usize,
}

struct RecorderInner {
    buffer: Shared<SampleBuffer>,
    active: Mutex<Option<ActiveSession>>,
    sampler: Mutex<Option<CancellationToken>>,
    finished: Mutex<Vec<RecordedSession>>,
}

#[derive(Clone)]
pub struct SessionRecorder {
    inner: Arc<RecorderInner>,
}

impl SessionRecorder {
    pub fn new(buffer: Shared<SampleBuffer>) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                buffer,
                active: Mutex::new(None),
                sampler: Mutex::new(None),
                finished: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.inner.active).is_some()
    }

    pub fn status(&self) -> RecorderStatus {
        let active = lock(&self.inner.active);
        RecorderStatus {
            recording: active.is_some(),
            id: active.as_ref().map(|s| s.id),
            started_at: active.as_ref().map(|s| s.started_at),
            sample_count: active.as_ref().map_or(0, |s| s.samples.len()),
        }
    }

    /// Finished recordings, newest first.
    pub fn sessions(&self) -> Vec<RecordedSession> {
        lock(&self.inner.finished).clone()
    }

    /// Start recording. No-op when already active.
    pub fn start(&self) {
        {
            let mut active = lock(&self.inner.active);
            if active.is_some() {
                return;
            }
            let session = ActiveSession {
                id: Uuid::new_v4(),
                started_at: Utc::now(),
                samples: VecDeque::with_capacity(RECORDER_MAX_SAMPLES + 1),
            };
            info!(id = %session.id, "⏺️ Recording started");
            *active = Some(session);
        }

        let token = CancellationToken::new();
        if let Some(old) = lock(&self.inner.sampler).replace(token.clone()) {
            old.cancel();
        }
        let recorder = self.clone();
        let period = Duration::from_millis(RECORDER_TICK_MS);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => recorder.sample(),
                }
            }
        });
    }

    /// Append the buffer's latest sample to the active recording.
    pub fn sample(&self) {
        let last = self.inner.buffer.read().last_sample();
        if let Some(session) = lock(&self.inner.active).as_mut() {
            session.samples.push_back(last);
            while session.samples.len() > RECORDER_MAX_SAMPLES {
                session.samples.pop_front();
            }
        }
    }

    /// Finish the active recording. Duration is at least one second.
    pub fn stop(&self) -> Option<RecordedSession> {
        if let Some(token) = lock(&self.inner.sampler).take() {
            token.cancel();
        }
        let session = lock(&self.inner.active).take()?;
        let ended = Utc::now();
        let elapsed_ms = (ended - session.started_at).num_milliseconds().max(0);
        let duration_sec = ((elapsed_ms as f64 / 1000.0).round() as u64).max(1);
        let samples: Vec<f64> = session.samples.into_iter().collect();

        let recorded = RecordedSession {
            id: session.id,
            name: format!("Session {}", session.started_at.format("%Y-%m-%d %H:%M:%S")),
            started_at: session.started_at,
            duration_sec,
            sample_count: samples.len(),
            summary: summary(&samples),
            samples,
        };
        info!(
            id = %recorded.id,
            duration_sec,
            samples = recorded.sample_count,
            "⏹️ Recording stopped"
        );
        lock(&self.inner.finished).insert(0, recorded.clone());
        Some(recorded)
    }

    /// Start when idle, stop when recording. Returns the finished session
    /// on stop.
    pub fn toggle(&self) -> Option<RecordedSession> {
        if self.is_recording() {
            self.stop()
        } else {
            self.start();
            None
        }
    }
}
