//! The LLM module (§4.3): wraps the pure [`state::StateMachine`] in the
//! `Module` contract, owning the clock, the generation task, and message
//! emission. Grounded in `swarmclone/modules.py`'s `LLMBase.run` — the
//! `while True: task = queue.get_nowait(); ...; await sleep(0.1)` loop
//! becomes a `tokio::select!` over the task queue, the active generation
//! stream, and a scheduler tick, so a barge-in or a finished sentence is
//! handled the moment it arrives rather than waiting for the next poll.

pub mod generator;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::message::{self, Emotion, MessageRef, Payload, Role};
use crate::module::{ConfigField, ConfigFieldKind, ConfigSchema, ConfigValue, Module, ModuleFactory, ModuleHandle};

pub use generator::{DummyGenerator, Generator, HistoryRole, HistoryTurn};
pub use state::{AsrActivation, Decision, StateMachine, TurnConfig, TurnState};

fn str_field(fields: &HashMap<String, ConfigValue>, name: &str, default: &str) -> String {
    fields.get(name).and_then(ConfigValue::as_str).map(str::to_string).unwrap_or_else(|| default.to_string())
}

fn int_field(fields: &HashMap<String, ConfigValue>, name: &str, default: i64) -> i64 {
    fields.get(name).and_then(ConfigValue::as_int).unwrap_or(default)
}

fn bool_field(fields: &HashMap<String, ConfigValue>, name: &str, default: bool) -> bool {
    fields.get(name).and_then(ConfigValue::as_bool).unwrap_or(default)
}

fn float_field(fields: &HashMap<String, ConfigValue>, name: &str, default: f64) -> f64 {
    fields.get(name).and_then(ConfigValue::as_float).unwrap_or(default)
}

/// Resolved construction parameters for [`LlmModule`]: the turn-taking
/// knobs of §4.3 plus the scheduler tick and an optional RNG seed for
/// reproducible chat-admission tests (§8 scenario 3).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub turn: TurnConfig,
    pub scheduler_tick: Duration,
    pub rng_seed: Option<u64>,
    pub sentence_delay: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            turn: TurnConfig::default(),
            scheduler_tick: Duration::from_millis(100),
            rng_seed: None,
            sentence_delay: Duration::from_millis(10),
        }
    }
}

/// The class-level config schema (§4.1 `config_schema`), shared by
/// [`LlmModuleFactory`] and the field-wise parsing in [`parse_config`].
pub fn config_schema() -> ConfigSchema {
    vec![
        ConfigField::new("chat_maxsize", ConfigFieldKind::Int, "hard cap on pending chat backlog")
            .with_default(ConfigValue::Int(20))
            .with_range(1.0, 1000.0),
        ConfigField::new("chat_size_threshold", ConfigFieldKind::Int, "soft cap above which admission probability ramps down")
            .with_default(ConfigValue::Int(10))
            .with_range(1.0, 100.0),
        ConfigField::new("do_start_topic", ConfigFieldKind::Bool, "synthesize a topic when idle too long")
            .with_default(ConfigValue::Bool(false)),
        ConfigField::new("idle_timeout", ConfigFieldKind::Float, "seconds idle before starting a topic")
            .with_default(ConfigValue::Float(120.0))
            .with_range(0.0, 600.0)
            .with_step(1.0),
        ConfigField::new("asr_timeout", ConfigFieldKind::Int, "seconds to wait for ASR before giving up")
            .with_default(ConfigValue::Int(60))
            .with_range(1.0, 3600.0),
        ConfigField::new("tts_timeout", ConfigFieldKind::Int, "seconds to wait for audio playback before giving up")
            .with_default(ConfigValue::Int(60))
            .with_range(1.0, 3600.0),
        ConfigField::new("chat_role", ConfigFieldKind::Str, "conversation role assigned to chat turns")
            .with_default(ConfigValue::Str("user".into())),
        ConfigField::new("asr_role", ConfigFieldKind::Str, "conversation role assigned to ASR turns")
            .with_default(ConfigValue::Str("user".into())),
        ConfigField::new("chat_template", ConfigFieldKind::Str, "template used to format chat turns into history")
            .with_default(ConfigValue::Str("{user}: {content}".into())),
        ConfigField::new("asr_template", ConfigFieldKind::Str, "template used to format ASR turns into history")
            .with_default(ConfigValue::Str("{user}: {content}".into())),
        ConfigField::new("system_prompt", ConfigFieldKind::Str, "system prompt prepended to history at startup")
            .with_default(ConfigValue::Str(String::new()))
            .multiline(),
        ConfigField::new("sentence_delay_ms", ConfigFieldKind::Int, "reference generator's per-sentence pacing delay")
            .with_default(ConfigValue::Int(10))
            .with_range(0.0, 60_000.0),
        ConfigField::new("rng_seed", ConfigFieldKind::Int, "seed for the chat-admission RNG; negative means use OS entropy")
            .with_default(ConfigValue::Int(-1)),
    ]
}

pub fn parse_config(fields: &HashMap<String, ConfigValue>) -> LlmConfig {
    let seed = int_field(fields, "rng_seed", -1);
    LlmConfig {
        turn: TurnConfig {
            chat_maxsize: int_field(fields, "chat_maxsize", 20).max(1) as usize,
            chat_size_threshold: int_field(fields, "chat_size_threshold", 10).max(1) as usize,
            do_start_topic: bool_field(fields, "do_start_topic", false),
            idle_timeout: Duration::from_secs_f64(float_field(fields, "idle_timeout", 120.0)),
            asr_timeout: Duration::from_secs_f64(int_field(fields, "asr_timeout", 60) as f64),
            tts_timeout: Duration::from_secs_f64(int_field(fields, "tts_timeout", 60) as f64),
            chat_role: str_field(fields, "chat_role", "user"),
            asr_role: str_field(fields, "asr_role", "user"),
            chat_template: str_field(fields, "chat_template", "{user}: {content}"),
            asr_template: str_field(fields, "asr_template", "{user}: {content}"),
            system_prompt: {
                let s = str_field(fields, "system_prompt", "");
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            },
        },
        scheduler_tick: Duration::from_millis(100),
        rng_seed: if seed >= 0 { Some(seed as u64) } else { None },
        sentence_delay: Duration::from_millis(int_field(fields, "sentence_delay_ms", 10).max(0) as u64),
    }
}

/// The conversational turn controller (§4.3), running against a pluggable
/// [`Generator`] backend. The crate ships only [`DummyGenerator`]-backed
/// instances; a real backend (remote API, local model) is wired in by
/// constructing [`LlmModuleFactory::with_generator`] with its own
/// `Generator` implementation.
pub struct LlmModule {
    name: String,
    generator: Arc<dyn Generator>,
    config: LlmConfig,
    rng: StdRng,
}

impl LlmModule {
    pub fn new(name: impl Into<String>, generator: Arc<dyn Generator>, config: LlmConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            name: name.into(),
            generator,
            config,
            rng,
        }
    }
}

#[async_trait]
impl Module for LlmModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        Role::Llm
    }

    async fn run(&mut self, mut handle: ModuleHandle, cancel: CancellationToken) -> Result<()> {
        let mut sm = StateMachine::new(self.config.turn.clone(), Instant::now());
        let mut gen_cancel: Option<CancellationToken> = None;
        let mut gen_rx: Option<mpsc::Receiver<(String, Emotion)>> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if let Some(gc) = gen_cancel.take() {
                        gc.cancel();
                    }
                    debug!(module = %self.name, "LLM module observed cancellation");
                    return Ok(());
                }

                maybe_task = handle.task_rx.recv() => {
                    match maybe_task {
                        Some(task) => {
                            task.record_observation(&self.name);
                            match task.payload() {
                                Payload::AsrActivated => {
                                    let before = sm.state();
                                    let activation = sm.on_asr_activated(Instant::now());
                                    if activation == AsrActivation::CancelledGeneration {
                                        if let Some(gc) = gen_cancel.take() {
                                            gc.cancel();
                                        }
                                    }
                                    debug!(module = %self.name, ?before, after = ?sm.state(), "ASRActivated");
                                }
                                Payload::AsrMessage { speaker_name, message } => {
                                    sm.on_asr_message(speaker_name.clone(), message.clone());
                                }
                                Payload::ChatMessage { user, content } => {
                                    let roll: f64 = self.rng.gen();
                                    let admitted = sm.offer_chat(user.clone(), content.clone(), roll);
                                    debug!(module = %self.name, admitted, qsize = sm.chat_queue_len(), "ChatMessage offered");
                                }
                                Payload::SongInfo { song_id, .. } => {
                                    sm.note_song_info(song_id.clone());
                                }
                                Payload::AudioFinished => {
                                    sm.on_audio_finished(Instant::now());
                                }
                                Payload::FinishedSinging => {
                                    sm.on_finished_singing(Instant::now());
                                }
                                _ => {}
                            }
                        }
                        None => return Ok(()),
                    }
                }

                maybe_sentence = async { gen_rx.as_mut().unwrap().recv().await }, if gen_rx.is_some() => {
                    match maybe_sentence {
                        Some((text, emotion)) => {
                            if sm.state() == TurnState::Generating {
                                sm.push_generated_sentence(&text);
                                let id = Uuid::new_v4().to_string();
                                handle.emit(message::llm_message(
                                    MessageRef::new(Role::Llm, &self.name),
                                    text,
                                    id,
                                    emotion,
                                )).await;
                            }
                            // else: a barge-in already moved the state machine off
                            // GENERATING; this is the partial sentence buffered at
                            // the cancel point and is dropped (§4.3).
                        }
                        None => {
                            gen_rx = None;
                            gen_cancel = None;
                            sm.complete_generation(Instant::now());
                            info!(module = %self.name, "generation stream closed, emitting LLMEOS");
                            handle.emit(message::llm_eos(MessageRef::new(Role::Llm, &self.name))).await;
                        }
                    }
                }

                _ = sleep(self.config.scheduler_tick) => {}
            }

            match sm.evaluate(Instant::now()) {
                Decision::EnterGenerating => {
                    let token = CancellationToken::new();
                    let rx = self.generator.start(sm.history().to_vec(), token.clone());
                    gen_cancel = Some(token);
                    gen_rx = Some(rx);
                }
                Decision::EmitReadyToSing(song_id) => {
                    handle.emit(message::ready_to_sing(MessageRef::new(Role::Llm, &self.name), song_id)).await;
                }
                Decision::None => {}
            }

            // `evaluate` only returns `EnterGenerating` for the IDLE-origin
            // transitions; the WAITING4ASR -> GENERATING transition happens
            // inside `on_asr_message` once `asr_counter` drains to zero and
            // carries no `Decision` of its own. Catch that case here so the
            // generation task always gets spawned whenever the state machine
            // is GENERATING without one already running.
            if sm.state() == TurnState::Generating && gen_rx.is_none() {
                let token = CancellationToken::new();
                let rx = self.generator.start(sm.history().to_vec(), token.clone());
                gen_cancel = Some(token);
                gen_rx = Some(rx);
            }
        }
    }
}

/// The registrable class behind [`LlmModule`] (§4.1, §4.2). The controller
/// enforces "exactly one LLM module" at registration time (§4.2), not
/// here; this factory only describes how to build one instance.
pub struct LlmModuleFactory {
    generator: Arc<dyn Generator>,
}

impl LlmModuleFactory {
    pub fn with_generator(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

impl Default for LlmModuleFactory {
    fn default() -> Self {
        Self {
            generator: Arc::new(DummyGenerator::default()),
        }
    }
}

impl ModuleFactory for LlmModuleFactory {
    fn role(&self) -> Role {
        Role::Llm
    }

    fn type_name(&self) -> &str {
        "LlmModule"
    }

    fn description(&self) -> &str {
        "Conversational turn controller driving a pluggable sentence/emotion generator"
    }

    fn config_schema(&self) -> ConfigSchema {
        config_schema()
    }

    fn construct(&self, fields: &HashMap<String, ConfigValue>) -> Result<Box<dyn Module>> {
        let mut config = parse_config(fields);
        config.sentence_delay = Duration::from_millis(int_field(fields, "sentence_delay_ms", 10).max(0) as u64);
        Ok(Box::new(LlmModule::new(self.type_name(), self.generator.clone(), config)))
    }
}
