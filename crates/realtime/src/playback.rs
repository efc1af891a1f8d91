//! Playback of a chunk stream.
//!
//! The player is the only consumer of a [`Speech`](crate::Speech): it takes
//! chunks strictly in arrival order and stops pulling as soon as it is
//! interrupted. It never reaches into the session.

use crate::protocol::{Chunk, SynthesizedAudio};
use futures::{Stream, StreamExt};
use neuphonic_core::audio::{self, DEFAULT_SAMPLE_RATE};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;
use tracing::debug;

/// Destination for played audio.
pub trait AudioSink: Send {
    fn write(&mut self, chunk: &Chunk) -> io::Result<()>;
    /// Drops whatever has not been played yet.
    fn interrupt(&mut self);
    fn finish(&mut self) -> io::Result<()>;
}

/// Signal asking a player to stop consuming.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self {
            tx: Arc::new(watch::channel(false).0),
        }
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackReport {
    pub chunks: usize,
    pub bytes: usize,
    /// Assumes mono PCM16 at each chunk's sample rate.
    pub duration: Duration,
    pub interrupted: bool,
}

pub struct Player<S> {
    sink: S,
}

impl<S: AudioSink> Player<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Forwards chunks to the sink until the stream ends or `interrupt`
    /// fires. The sink is finished only when the stream ran to its end.
    pub async fn play<St>(&mut self, stream: St, interrupt: &Interrupt) -> io::Result<PlaybackReport>
    where
        St: Stream<Item = Chunk>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut report = PlaybackReport::default();

        loop {
            let chunk = tokio::select! {
                biased;
                _ = interrupt.triggered() => {
                    debug!(chunks = report.chunks, "Playback interrupted");
                    self.sink.interrupt();
                    report.interrupted = true;
                    break;
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };

            self.sink.write(&chunk)?;
            report.chunks += 1;
            report.bytes += chunk.audio.len();
            report.duration += audio::pcm16_duration(
                chunk.audio.len(),
                chunk.sampling_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            );
        }

        if !report.interrupted {
            self.sink.finish()?;
        }
        Ok(report)
    }
}

/// Keeps every chunk in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub chunks: Vec<Chunk>,
    pub interrupted: bool,
    pub finished: bool,
}

impl MemorySink {
    pub fn audio(&self) -> SynthesizedAudio {
        SynthesizedAudio::from_chunks(&self.chunks)
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, chunk: &Chunk) -> io::Result<()> {
        self.chunks.push(chunk.clone());
        Ok(())
    }

    fn interrupt(&mut self) {
        self.interrupted = true;
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Buffers PCM and writes a WAV file when playback finishes.
#[derive(Debug)]
pub struct WavSink {
    path: PathBuf,
    pcm: Vec<u8>,
    sampling_rate: Option<u32>,
}

impl WavSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pcm: Vec::new(),
            sampling_rate: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, chunk: &Chunk) -> io::Result<()> {
        self.pcm.extend_from_slice(&chunk.audio);
        self.sampling_rate = self.sampling_rate.or(chunk.sampling_rate);
        Ok(())
    }

    fn interrupt(&mut self) {
        self.pcm.clear();
    }

    fn finish(&mut self) -> io::Result<()> {
        let wav = audio::to_wav(
            &self.pcm,
            self.sampling_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
        );
        std::fs::write(&self.path, wav)
    }
}
