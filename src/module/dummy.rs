//! Trivial in-process reference modules so the controller, router and LLM
//! state machine are exercisable end-to-end without a real audio stack or
//! model (§1). Grounded in `swarmclone/modules.py`'s `FrontendDummy` /
//! `ControllerDummy`: pass-through modules that just acknowledge whatever
//! crosses their `task_queue`. Not meant to be production backends.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use crate::error::Result;
use crate::message::{self, MessageRef, Payload, Role};
use crate::module::{ConfigField, ConfigFieldKind, ConfigSchema, ConfigValue, Module, ModuleFactory, ModuleHandle};

fn reply_delay_field() -> ConfigField {
    ConfigField::new(
        "reply_delay_ms",
        ConfigFieldKind::Int,
        "milliseconds to wait before acknowledging playback, simulating real audio output",
    )
    .with_default(ConfigValue::Int(10))
    .with_range(0.0, 60_000.0)
}

fn reply_delay(fields: &HashMap<String, ConfigValue>) -> Duration {
    Duration::from_millis(
        fields
            .get("reply_delay_ms")
            .and_then(ConfigValue::as_int)
            .unwrap_or(10) as u64,
    )
}

/// Idles, acknowledging whatever it is handed. A real recognizer would
/// instead push `ASRActivated`/`ASRMessage` onto `results_queue` as speech
/// arrives; those are injected directly by the controller's `api`
/// operation (§6) for this dummy, so `run` has nothing to produce on its
/// own.
pub struct DummyAsr {
    name: String,
}

#[async_trait]
impl Module for DummyAsr {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        Role::Asr
    }

    async fn run(&mut self, mut handle: ModuleHandle, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    trace!(module = %self.name, "DummyAsr observed cancellation");
                    return Ok(());
                }
                maybe_task = handle.task_rx.recv() => {
                    match maybe_task {
                        Some(task) => task.record_observation(&self.name),
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

pub struct DummyAsrFactory;

impl ModuleFactory for DummyAsrFactory {
    fn role(&self) -> Role {
        Role::Asr
    }

    fn type_name(&self) -> &str {
        "DummyAsr"
    }

    fn description(&self) -> &str {
        "Reference ASR stub; real recognition events are injected via the `api` control-plane operation"
    }

    fn config_schema(&self) -> ConfigSchema {
        vec![]
    }

    fn construct(&self, _fields: &HashMap<String, ConfigValue>) -> Result<Box<dyn Module>> {
        Ok(Box::new(DummyAsr { name: self.type_name().to_string() }))
    }
}

/// Acknowledges generated speech and singing cues by emitting the
/// `AudioFinished` / `FinishedSinging` signals a real playback frontend
/// would send once it finishes rendering audio, after a configurable
/// delay. This closes the `WAITING4TTS` and `SINGING` loops in the LLM
/// state machine (§4.3) without any real audio device.
pub struct DummyFrontend {
    name: String,
    reply_delay: Duration,
}

#[async_trait]
impl Module for DummyFrontend {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> Role {
        Role::Frontend
    }

    async fn run(&mut self, mut handle: ModuleHandle, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    trace!(module = %self.name, "DummyFrontend observed cancellation");
                    return Ok(());
                }
                maybe_task = handle.task_rx.recv() => {
                    let task = match maybe_task {
                        Some(task) => task,
                        None => return Ok(()),
                    };
                    task.record_observation(&self.name);
                    match task.payload() {
                        Payload::LlmEos => {
                            info!(module = %self.name, "turn audio rendered, reporting AudioFinished");
                            sleep(self.reply_delay).await;
                            handle
                                .emit(message::audio_finished(MessageRef::new(Role::Frontend, &self.name)))
                                .await;
                        }
                        Payload::ReadyToSing { song_id } => {
                            info!(module = %self.name, song_id, "song rendered, reporting FinishedSinging");
                            sleep(self.reply_delay).await;
                            handle
                                .emit(message::finished_singing(MessageRef::new(Role::Frontend, &self.name)))
                                .await;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

pub struct DummyFrontendFactory;

impl ModuleFactory for DummyFrontendFactory {
    fn role(&self) -> Role {
        Role::Frontend
    }

    fn type_name(&self) -> &str {
        "DummyFrontend"
    }

    fn description(&self) -> &str {
        "Reference frontend stub; acknowledges turn completion without rendering anything"
    }

    fn config_schema(&self) -> ConfigSchema {
        vec![reply_delay_field()]
    }

    fn construct(&self, fields: &HashMap<String, ConfigValue>) -> Result<Box<dyn Module>> {
        Ok(Box::new(DummyFrontend {
            name: self.type_name().to_string(),
            reply_delay: reply_delay(fields),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn dummy_frontend_acks_eos_with_audio_finished() {
        let factory = DummyFrontendFactory;
        let mut fields = HashMap::new();
        fields.insert("reply_delay_ms".to_string(), ConfigValue::Int(0));
        let mut module = factory.construct(&fields).unwrap();

        let (task_tx, task_rx) = mpsc::channel(8);
        let (results_tx, mut results_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = ModuleHandle { task_rx, results_tx };

        let run_cancel = cancel.clone();
        let run_task = tokio::spawn(async move { module.run(handle, run_cancel).await });

        task_tx
            .send(message::llm_eos(MessageRef::new(Role::Llm, "llm-main")))
            .await
            .unwrap();

        let out = results_rx.recv().await.unwrap();
        assert_eq!(out.name(), "AudioFinished");

        cancel.cancel();
        run_task.await.unwrap().unwrap();
    }
}
