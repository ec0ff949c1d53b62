//! Audio output seam for spotter cues.
//!
//! The crate never talks to an audio device. An [`AudioSink`] implementation does, and the
//! [`CuePlayer`] makes sure only one cue is in flight at a time.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::Result;

/// Parameters of one beep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioCue {
    /// 0.0 to 1.0
    pub volume: f64,
    /// 0.1 to 10.0
    pub playback_rate: f64,
    /// -1.0 left, 0.0 centre, 1.0 right
    pub pan: f64,
}

/// Something that can play a cue.
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    /// Play the cue to completion.
    async fn play(&self, cue: AudioCue) -> Result<()>;
}

/// Sink that only logs cues.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AudioSink for TracingSink {
    async fn play(&self, cue: AudioCue) -> Result<()> {
        debug!(volume = cue.volume, rate = cue.playback_rate, pan = cue.pan, "spotter beep");
        Ok(())
    }
}

/// Fire-and-forget playback with a single-flight guard.
#[derive(Clone)]
pub struct CuePlayer {
    sink: Arc<dyn AudioSink>,
    playing: Arc<AtomicBool>,
}

impl CuePlayer {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink, playing: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Start playing `cue` unless a cue is already playing.
    ///
    /// Returns `true` when playback was started. Must be called within a tokio runtime;
    /// outside one the cue is dropped.
    pub fn trigger(&self, cue: AudioCue) -> bool {
        let Ok(handle) = Handle::try_current() else {
            warn!("no runtime available, dropping spotter cue");
            return false;
        };

        if self.playing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let sink = Arc::clone(&self.sink);
        let playing = Arc::clone(&self.playing);
        handle.spawn(async move {
            if let Err(e) = sink.play(cue).await {
                warn!(error = %e, "spotter cue playback failed");
            }
            playing.store(false, Ordering::Release);
        });
        true
    }
}

impl std::fmt::Debug for CuePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CuePlayer").field("playing", &self.is_playing()).finish()
    }
}
