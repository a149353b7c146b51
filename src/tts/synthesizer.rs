//! The synthesis backend contract, analogous to [`crate::llm::Generator`]
//! but one-shot rather than streaming: a single sentence and its emotion in,
//! audio bytes and a per-token alignment out. Grounded in
//! `swarmclone/tts_cosyvoice/tts_cosyvoice.py`'s `generate_sentence`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::Result;
use crate::message::{AlignEntry, Emotion};

/// The successful result of one synthesis call.
#[derive(Debug, Clone)]
pub struct SynthResult {
    pub audio_data: Vec<u8>,
    pub align_data: Vec<AlignEntry>,
}

/// A synthesis backend. Implementations should return `Err` rather than
/// panic on failure — the module turns any `Err` (and any panicking task)
/// into the zero-length-audio placeholder described in §4.4.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;
    async fn synthesize(&self, content: &str, emotion: &Emotion) -> Result<SynthResult>;
}

/// Trivial reference synthesizer: produces one placeholder byte per
/// character (standing in for audio samples) and a flat per-word alignment
/// spanning an arbitrary, deterministic duration. Never fails.
pub struct DummySynthesizer {
    pub delay: Duration,
}

impl Default for DummySynthesizer {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(10),
        }
    }
}

#[async_trait]
impl Synthesizer for DummySynthesizer {
    fn name(&self) -> &str {
        "DummySynthesizer"
    }

    async fn synthesize(&self, content: &str, _emotion: &Emotion) -> Result<SynthResult> {
        sleep(self.delay).await;
        let words: Vec<&str> = content.split_whitespace().collect();
        let word_count = words.len().max(1);
        let per_word = 0.3;
        let align_data = words
            .iter()
            .map(|w| AlignEntry {
                token: w.to_string(),
                duration: per_word,
            })
            .collect::<Vec<_>>();
        let align_data = if align_data.is_empty() {
            vec![AlignEntry {
                token: content.to_string(),
                duration: per_word,
            }]
        } else {
            align_data
        };
        let audio_data = vec![0u8; word_count * 1024];
        Ok(SynthResult { audio_data, align_data })
    }
}
