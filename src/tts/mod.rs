//! The TTS module (§4.4): a two-stage pipeline separating "what to
//! synthesize next" from "the synthesis itself", so a barge-in can drop
//! everything not yet being synthesized without waiting on the synthesizer.
//! Grounded in `swarmclone/tts_cosyvoice/tts_cosyvoice.py`'s
//! `preprocess_tasks`/`run` split: intake and synthesis here share a single
//! cooperative loop instead of two `asyncio` tasks, since the only work
//! `preprocess_tasks` does is filter and queue — no separate task is needed
//! to keep that filtering responsive while a synthesis is in flight.

mod synthesizer;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use synthesizer::{DummySynthesizer, SynthResult, Synthesizer};

use crate::error::Result;
use crate::message::{self, AlignEntry, Emotion, MessageRef, Payload, Role};
use crate::module::{ConfigField, ConfigFieldKind, ConfigSchema, ConfigValue, Module, ModuleFactory, ModuleHandle};

/// A sentence admitted into the synthesis pipeline, still waiting its turn.
struct PendingSentence {
    id: String,
    content: String,
    emotion: Emotion,
}

/// The streaming text-to-speech module. Forwards `LLMMessage` sentences
/// into a FIFO synthesis queue and ignores every other payload; an
/// `ASRActivated` barge-in drops whatever is still queued (but lets any
/// synthesis already in flight finish, since it cannot be cancelled
/// mid-call — see §4.4).
pub struct TtsModule {
    name: String,
    synthesizer: std::sync::Arc<dyn Synthesizer>,
    max_queue: usize,
}

impl TtsModule {
    pub fn new(name: impl Into<String>, synthesizer: std::sync::Arc<dyn Synthesizer>, max_queue: usize) -> Self {
        Self {
            name: name.into(),
            synthesizer,
            max_queue: max_queue.max(1),
        }
    }
}

#[async_trait]
impl Module for TtsModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        Role::Tts
    }

    async fn run(&mut self, mut handle: ModuleHandle, cancel: CancellationToken) -> Result<()> {
        let mut queue: VecDeque<PendingSentence> = VecDeque::new();
        let mut in_flight: Option<(String, JoinHandle<Result<SynthResult>>)> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if let Some((_, task)) = in_flight.take() {
                        task.abort();
                    }
                    debug!(module = %self.name, "TTS module observed cancellation");
                    return Ok(());
                }

                maybe_task = handle.task_rx.recv() => {
                    match maybe_task {
                        Some(task) => {
                            task.record_observation(&self.name);
                            match task.payload() {
                                Payload::AsrActivated => {
                                    let dropped = queue.len();
                                    queue.clear();
                                    if dropped > 0 {
                                        debug!(module = %self.name, dropped, "barge-in drained the synthesis queue");
                                    }
                                }
                                Payload::LlmMessage { content, id, emotion } => {
                                    if queue.len() >= self.max_queue {
                                        warn!(module = %self.name, "synthesis queue full, dropping sentence");
                                    } else {
                                        queue.push_back(PendingSentence {
                                            id: id.clone(),
                                            content: content.clone(),
                                            emotion: emotion.clone(),
                                        });
                                    }
                                }
                                _ => {}
                            }
                        }
                        None => return Ok(()),
                    }
                }

                result = async { in_flight.as_mut().unwrap().1.await }, if in_flight.is_some() => {
                    let (id, _) = in_flight.take().unwrap();
                    let outcome = match result {
                        Ok(Ok(synth)) => synth,
                        Ok(Err(e)) => {
                            error!(module = %self.name, id, error = %e, "synthesis failed, emitting silence placeholder");
                            fallback(&id)
                        }
                        Err(join_err) => {
                            error!(module = %self.name, id, error = %join_err, "synthesis task panicked, emitting silence placeholder");
                            fallback(&id)
                        }
                    };
                    handle.emit(message::tts_aligned_audio(
                        MessageRef::new(Role::Tts, &self.name),
                        id,
                        outcome.audio_data,
                        outcome.align_data,
                    )).await;
                }
            }

            if in_flight.is_none() {
                if let Some(next) = queue.pop_front() {
                    let synthesizer = self.synthesizer.clone();
                    let id = next.id.clone();
                    let content = next.content;
                    let emotion = next.emotion;
                    let task = tokio::spawn(async move { synthesizer.synthesize(&content, &emotion).await });
                    in_flight = Some((id, task));
                }
            }
        }
    }
}

/// A synthesis failure (or a panicking synthesis task) never drops the
/// sentence silently: it produces zero-length audio with a single
/// uniform-duration alignment entry covering the original text, so
/// downstream consumers still see one `TTSAlignedAudio` per `LLMMessage`.
fn fallback(_id: &str) -> SynthResult {
    SynthResult {
        audio_data: Vec::new(),
        align_data: vec![AlignEntry {
            token: String::new(),
            duration: 0.0,
        }],
    }
}

pub fn config_schema() -> ConfigSchema {
    vec![
        ConfigField::new("max_queue", ConfigFieldKind::Int, "sentences admitted into the synthesis queue before dropping new ones")
            .with_default(ConfigValue::Int(32))
            .with_range(1.0, 1000.0),
        ConfigField::new("synth_delay_ms", ConfigFieldKind::Int, "reference synthesizer's per-call delay")
            .with_default(ConfigValue::Int(10))
            .with_range(0.0, 60_000.0),
    ]
}

pub struct TtsModuleFactory {
    synthesizer: std::sync::Arc<dyn Synthesizer>,
}

impl TtsModuleFactory {
    pub fn with_synthesizer(synthesizer: std::sync::Arc<dyn Synthesizer>) -> Self {
        Self { synthesizer }
    }
}

impl Default for TtsModuleFactory {
    fn default() -> Self {
        Self {
            synthesizer: std::sync::Arc::new(DummySynthesizer::default()),
        }
    }
}

impl ModuleFactory for TtsModuleFactory {
    fn role(&self) -> Role {
        Role::Tts
    }

    fn type_name(&self) -> &str {
        "TtsModule"
    }

    fn description(&self) -> &str {
        "Streaming text-to-speech pipeline driving a pluggable synthesis backend"
    }

    fn config_schema(&self) -> ConfigSchema {
        config_schema()
    }

    fn construct(&self, fields: &HashMap<String, ConfigValue>) -> Result<Box<dyn Module>> {
        let max_queue = fields.get("max_queue").and_then(ConfigValue::as_int).unwrap_or(32).max(1) as usize;
        let delay_ms = fields.get("synth_delay_ms").and_then(ConfigValue::as_int).unwrap_or(10).max(0) as u64;
        let synthesizer: std::sync::Arc<dyn Synthesizer> = if delay_ms == 0 {
            self.synthesizer.clone()
        } else {
            std::sync::Arc::new(DummySynthesizer {
                delay: Duration::from_millis(delay_ms),
            })
        };
        Ok(Box::new(TtsModule::new(self.type_name(), synthesizer, max_queue)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MessageRef};
    use std::time::Duration as StdDuration;
    use tokio::sync::mpsc;

    async fn spawn_tts(
        synthesizer: std::sync::Arc<dyn Synthesizer>,
    ) -> (mpsc::Sender<Message>, mpsc::Receiver<Message>, CancellationToken, JoinHandle<Result<()>>) {
        let mut module = TtsModule::new("TtsModule", synthesizer, 32);
        let (task_tx, task_rx) = mpsc::channel(32);
        let (results_tx, results_rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = ModuleHandle { task_rx, results_tx };
        let join = tokio::spawn(async move { module.run(handle, run_cancel).await });
        (task_tx, results_rx, cancel, join)
    }

    #[tokio::test]
    async fn forwards_llm_messages_in_order_and_ignores_everything_else() {
        let (task_tx, mut results_rx, cancel, join) = spawn_tts(std::sync::Arc::new(DummySynthesizer::default())).await;

        task_tx.send(message::audio_finished(MessageRef::new(Role::Frontend, "f"))).await.unwrap();
        task_tx
            .send(message::llm_message(MessageRef::new(Role::Llm, "l"), "hello", "id-1", crate::message::neutral_emotion()))
            .await
            .unwrap();
        task_tx
            .send(message::llm_message(MessageRef::new(Role::Llm, "l"), "world", "id-2", crate::message::neutral_emotion()))
            .await
            .unwrap();

        let first = tokio::time::timeout(StdDuration::from_secs(1), results_rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(StdDuration::from_secs(1), results_rx.recv()).await.unwrap().unwrap();
        match (first.payload(), second.payload()) {
            (Payload::TtsAlignedAudio { id: id1, .. }, Payload::TtsAlignedAudio { id: id2, .. }) => {
                assert_eq!(id1, "id-1");
                assert_eq!(id2, "id-2");
            }
            other => panic!("unexpected payloads: {other:?}"),
        }

        cancel.cancel();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn barge_in_drops_queued_sentences_not_yet_synthesized() {
        let synthesizer: std::sync::Arc<dyn Synthesizer> = std::sync::Arc::new(DummySynthesizer {
            delay: StdDuration::from_millis(60),
        });
        let (task_tx, mut results_rx, cancel, join) = spawn_tts(synthesizer).await;

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            task_tx
                .send(message::llm_message(
                    MessageRef::new(Role::Llm, "l"),
                    *text,
                    format!("id-{i}"),
                    crate::message::neutral_emotion(),
                ))
                .await
                .unwrap();
        }
        // Give the first sentence a moment to start synthesizing, then barge in.
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        task_tx.send(message::asr_activated(MessageRef::new(Role::Asr, "a"))).await.unwrap();

        let first = tokio::time::timeout(StdDuration::from_secs(1), results_rx.recv()).await.unwrap().unwrap();
        match first.payload() {
            Payload::TtsAlignedAudio { id, .. } => assert_eq!(id, "id-0"),
            other => panic!("unexpected payload: {other:?}"),
        }
        // Nothing else should follow: "two" and "three" were still queued when the barge-in landed.
        let second = tokio::time::timeout(StdDuration::from_millis(150), results_rx.recv()).await;
        assert!(second.is_err(), "no further synthesis should have been queued after the barge-in");

        cancel.cancel();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn synthesis_failure_still_emits_a_single_placeholder_entry() {
        struct AlwaysFails;
        #[async_trait]
        impl Synthesizer for AlwaysFails {
            fn name(&self) -> &str {
                "AlwaysFails"
            }
            async fn synthesize(&self, _content: &str, _emotion: &Emotion) -> Result<SynthResult> {
                Err(crate::error::Error::Backend("synthesis backend unreachable".into()))
            }
        }

        let (task_tx, mut results_rx, cancel, join) = spawn_tts(std::sync::Arc::new(AlwaysFails)).await;
        task_tx
            .send(message::llm_message(MessageRef::new(Role::Llm, "l"), "hello", "id-1", crate::message::neutral_emotion()))
            .await
            .unwrap();

        let msg = tokio::time::timeout(StdDuration::from_secs(1), results_rx.recv()).await.unwrap().unwrap();
        match msg.payload() {
            Payload::TtsAlignedAudio { id, audio_data, align_data } => {
                assert_eq!(id, "id-1");
                assert!(audio_data.is_empty());
                assert_eq!(align_data.len(), 1);
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        cancel.cancel();
        join.await.unwrap().unwrap();
    }
}
