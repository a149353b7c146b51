//! The conversational turn-taking state machine (§4.3), kept free of any
//! async runtime so every transition is a plain synchronous function:
//! the [`crate::llm::LlmModule`] that wraps it owns the clock, the
//! generation task, and message emission; this type only owns `history`,
//! `state`, and the timers/counters the transitions depend on.
//!
//! Grounded directly in `swarmclone/modules.py`'s `LLMBase`/`LLMDummy`:
//! the `_switch_to_*` helpers become the `on_*`/`complete_*`/`cancel_*`
//! methods below, and the inline `match self.state` in `LLMBase.run`
//! becomes [`StateMachine::evaluate`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::llm::generator::{HistoryRole, HistoryTurn};

/// One of the five turn states (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Generating,
    WaitingForAsr,
    WaitingForTts,
    Singing,
}

/// What the asynchronous runner should do in response to an `ASRActivated`
/// message, depending on the state it found the machine in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrActivation {
    /// Entered `WAITING4ASR` fresh (from `IDLE` or `WAITING4TTS`).
    EnteredWaiting,
    /// Already in `WAITING4ASR`; `asr_counter` incremented.
    CounterIncremented,
    /// Was `GENERATING`; the runner must cancel the generation task. Any
    /// partial text has already been folded into `history` as an
    /// assistant turn.
    CancelledGeneration,
    /// `SINGING` defines no transition on `ASRActivated` (§4.3); ignored.
    Ignored,
}

/// What [`StateMachine::evaluate`] decided the runner should do this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    None,
    /// Entered `GENERATING`; the runner must spawn a generation task
    /// against the (already updated) `history`.
    EnterGenerating,
    /// Entered `SINGING`; the runner must emit `ReadyToSing(song_id)`.
    EmitReadyToSing(String),
}

/// The turn-taking knobs of §4.3, already resolved to native types
/// (durations rather than raw seconds).
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub chat_maxsize: usize,
    pub chat_size_threshold: usize,
    pub do_start_topic: bool,
    pub idle_timeout: Duration,
    pub asr_timeout: Duration,
    pub tts_timeout: Duration,
    pub chat_role: String,
    pub asr_role: String,
    pub chat_template: String,
    pub asr_template: String,
    pub system_prompt: Option<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            chat_maxsize: 20,
            chat_size_threshold: 10,
            do_start_topic: false,
            idle_timeout: Duration::from_secs(120),
            asr_timeout: Duration::from_secs(60),
            tts_timeout: Duration::from_secs(60),
            chat_role: "user".to_string(),
            asr_role: "user".to_string(),
            chat_template: "{user}: {content}".to_string(),
            asr_template: "{user}: {content}".to_string(),
            system_prompt: None,
        }
    }
}

/// Formats one chat/ASR turn into history text. `role` is the configured
/// `chat_role`/`asr_role` knob (§4.3 "Role/template strings"); `user` is the
/// per-message speaker name (`ChatMessage.user` / `ASRMessage.speaker_name`).
/// A template need not reference `{role}` at all, but it is available so a
/// provider-facing template can distinguish "this came in as chat" from
/// "this came in as ASR" independent of the speaker's display name.
fn apply_template(template: &str, role: &str, user: &str, content: &str) -> String {
    template
        .replace("{role}", role)
        .replace("{user}", user)
        .replace("{content}", content)
}

/// The admission probability for the chat fan-in policy (§4.3): 1.0 below
/// `threshold`, a linear ramp to 0.0 at `maxsize`, 0.0 at and beyond it.
pub fn admission_probability(qsize: usize, threshold: usize, maxsize: usize) -> f64 {
    if qsize < threshold {
        return 1.0;
    }
    let span = maxsize.saturating_sub(threshold);
    if span == 0 {
        return 0.0;
    }
    let over = (qsize - threshold) as f64;
    (1.0 - over / span as f64).clamp(0.0, 1.0)
}

pub struct StateMachine {
    state: TurnState,
    history: Vec<HistoryTurn>,
    generated_text: String,
    chat_queue: VecDeque<(String, String)>,
    cfg: TurnConfig,
    asr_counter: i64,
    about_to_sing: bool,
    song_id: String,
    idle_since: Instant,
    waiting_asr_since: Instant,
    waiting_tts_since: Instant,
}

impl StateMachine {
    pub fn new(cfg: TurnConfig, now: Instant) -> Self {
        let mut history = Vec::new();
        if let Some(prompt) = &cfg.system_prompt {
            if !prompt.is_empty() {
                history.push(HistoryTurn::system(prompt.clone()));
            }
        }
        Self {
            state: TurnState::Idle,
            history,
            generated_text: String::new(),
            chat_queue: VecDeque::new(),
            cfg,
            asr_counter: 0,
            about_to_sing: false,
            song_id: String::new(),
            idle_since: now,
            waiting_asr_since: now,
            waiting_tts_since: now,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn history(&self) -> &[HistoryTurn] {
        &self.history
    }

    pub fn asr_counter(&self) -> i64 {
        self.asr_counter
    }

    pub fn chat_queue_len(&self) -> usize {
        self.chat_queue.len()
    }

    /// Global rule (§4.3): admit into `chat_queue` per the overload policy.
    /// `roll` is a caller-supplied uniform sample in `[0, 1)` so tests can
    /// drive the policy deterministically (§8 scenario 3); production
    /// callers pass `rng.gen()`. Returns whether the message was admitted.
    pub fn offer_chat(&mut self, user: String, content: String, roll: f64) -> bool {
        let prob = admission_probability(self.chat_queue.len(), self.cfg.chat_size_threshold, self.cfg.chat_maxsize);
        if roll < prob && self.chat_queue.len() < self.cfg.chat_maxsize {
            self.chat_queue.push_back((user, content));
            return true;
        }
        false
    }

    /// Global rule (§4.3): never changes state directly. Honors the most
    /// recent `SongInfo` (§9 Open Questions decision).
    pub fn note_song_info(&mut self, song_id: String) {
        self.about_to_sing = true;
        self.song_id = song_id;
    }

    /// `ASRActivated` is delivered to the LLM in every state; dispatch
    /// depends on which state it found (§4.3).
    pub fn on_asr_activated(&mut self, now: Instant) -> AsrActivation {
        match self.state {
            TurnState::Idle | TurnState::WaitingForTts => {
                self.state = TurnState::WaitingForAsr;
                self.asr_counter = 1;
                self.waiting_asr_since = now;
                AsrActivation::EnteredWaiting
            }
            TurnState::WaitingForAsr => {
                self.asr_counter += 1;
                AsrActivation::CounterIncremented
            }
            TurnState::Generating => {
                if !self.generated_text.is_empty() {
                    self.history.push(HistoryTurn::assistant(std::mem::take(&mut self.generated_text)));
                }
                self.state = TurnState::WaitingForAsr;
                self.waiting_asr_since = now;
                self.asr_counter = 1;
                AsrActivation::CancelledGeneration
            }
            TurnState::Singing => AsrActivation::Ignored,
        }
    }

    /// Only meaningful in `WAITING4ASR` (§4.3); silently ignored otherwise,
    /// matching the source's state-scoped `match` arm.
    pub fn on_asr_message(&mut self, speaker_name: String, message: String) {
        if self.state != TurnState::WaitingForAsr {
            return;
        }
        self.history.push(HistoryTurn::user(apply_template(&self.cfg.asr_template, &self.cfg.asr_role, &speaker_name, &message)));
        self.asr_counter -= 1;
        if self.asr_counter <= 0 {
            self.state = TurnState::Generating;
            self.generated_text.clear();
        }
    }

    /// Only meaningful in `WAITING4TTS` (§4.3).
    pub fn on_audio_finished(&mut self, now: Instant) {
        if self.state == TurnState::WaitingForTts {
            self.state = TurnState::Idle;
            self.idle_since = now;
        }
    }

    /// Only meaningful in `SINGING` (§4.3).
    pub fn on_finished_singing(&mut self, now: Instant) {
        if self.state == TurnState::Singing {
            self.state = TurnState::Idle;
            self.idle_since = now;
        }
    }

    /// Called by the runner as each `(sentence, emotion)` pair arrives
    /// from the generation task while still `GENERATING`. Sentences that
    /// arrive after a barge-in has already moved the state machine on are
    /// the "partial sentence buffered at the cancel point" and must be
    /// dropped by the caller instead of reaching this method (§4.3).
    pub fn push_generated_sentence(&mut self, sentence: &str) {
        self.generated_text.push_str(sentence);
    }

    /// The generation task's channel closed normally (sequence exhausted,
    /// not barge-in). No-op if a barge-in already moved the state machine
    /// off `GENERATING` by the time the stream finishes closing.
    pub fn complete_generation(&mut self, now: Instant) {
        if self.state != TurnState::Generating {
            return;
        }
        self.history.push(HistoryTurn::assistant(std::mem::take(&mut self.generated_text)));
        self.state = TurnState::WaitingForTts;
        self.waiting_tts_since = now;
    }

    /// Evaluated once per scheduler tick (§4.3 "Scheduler step"): applies
    /// `IDLE`'s priority-ordered rules and the `WAITING4ASR`/`WAITING4TTS`
    /// wall-clock timeouts.
    pub fn evaluate(&mut self, now: Instant) -> Decision {
        match self.state {
            TurnState::Idle => {
                if self.about_to_sing {
                    self.about_to_sing = false;
                    let song_id = self.song_id.clone();
                    self.history.push(HistoryTurn::system(format!("you sang {song_id}")));
                    self.state = TurnState::Singing;
                    return Decision::EmitReadyToSing(song_id);
                }
                if let Some((user, content)) = self.chat_queue.pop_front() {
                    self.history.push(HistoryTurn::user(apply_template(&self.cfg.chat_template, &self.cfg.chat_role, &user, &content)));
                    self.state = TurnState::Generating;
                    self.generated_text.clear();
                    return Decision::EnterGenerating;
                }
                if self.cfg.do_start_topic && now.duration_since(self.idle_since) > self.cfg.idle_timeout {
                    self.history.push(HistoryTurn::system("please say something"));
                    self.state = TurnState::Generating;
                    self.generated_text.clear();
                    return Decision::EnterGenerating;
                }
                Decision::None
            }
            TurnState::WaitingForAsr => {
                if now.duration_since(self.waiting_asr_since) > self.cfg.asr_timeout {
                    self.state = TurnState::Idle;
                    self.idle_since = now;
                }
                Decision::None
            }
            TurnState::WaitingForTts => {
                if now.duration_since(self.waiting_tts_since) > self.cfg.tts_timeout {
                    self.state = TurnState::Idle;
                    self.idle_since = now;
                }
                Decision::None
            }
            TurnState::Generating | TurnState::Singing => Decision::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TurnConfig {
        TurnConfig::default()
    }

    #[test]
    fn admission_is_full_below_threshold() {
        assert_eq!(admission_probability(0, 10, 20), 1.0);
        assert_eq!(admission_probability(9, 10, 20), 1.0);
    }

    #[test]
    fn admission_ramps_linearly_and_floors_at_maxsize() {
        assert_eq!(admission_probability(15, 10, 20), 0.5);
        assert_eq!(admission_probability(20, 10, 20), 0.0);
        assert_eq!(admission_probability(25, 10, 20), 0.0);
    }

    #[test]
    fn idle_pops_chat_and_enters_generating() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        assert!(sm.offer_chat("alice".into(), "hi".into(), 0.0));
        let decision = sm.evaluate(Instant::now());
        assert_eq!(decision, Decision::EnterGenerating);
        assert_eq!(sm.state(), TurnState::Generating);
        assert!(sm.history().last().unwrap().content.contains("alice: hi"));
    }

    #[test]
    fn song_info_takes_priority_over_chat_and_emits_ready_to_sing() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.offer_chat("alice".into(), "hi".into(), 0.0);
        sm.note_song_info("song-1".into());
        let decision = sm.evaluate(Instant::now());
        assert_eq!(decision, Decision::EmitReadyToSing("song-1".to_string()));
        assert_eq!(sm.state(), TurnState::Singing);
        // the chat message is still queued, pops after the song finishes
        assert_eq!(sm.chat_queue_len(), 1);
    }

    #[test]
    fn most_recent_song_info_wins() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.note_song_info("song-1".into());
        sm.note_song_info("song-2".into());
        let decision = sm.evaluate(Instant::now());
        assert_eq!(decision, Decision::EmitReadyToSing("song-2".to_string()));
    }

    #[test]
    fn asr_activated_from_idle_enters_waiting_with_counter_one() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        let activation = sm.on_asr_activated(Instant::now());
        assert_eq!(activation, AsrActivation::EnteredWaiting);
        assert_eq!(sm.state(), TurnState::WaitingForAsr);
        assert_eq!(sm.asr_counter(), 1);
    }

    #[test]
    fn overlapping_speakers_increment_counter() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.on_asr_activated(Instant::now());
        let activation = sm.on_asr_activated(Instant::now());
        assert_eq!(activation, AsrActivation::CounterIncremented);
        assert_eq!(sm.asr_counter(), 2);
    }

    #[test]
    fn asr_message_decrements_and_generates_once_drained() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.on_asr_activated(Instant::now());
        sm.on_asr_message("bob".into(), "hello".into());
        assert_eq!(sm.state(), TurnState::Generating);
    }

    #[test]
    fn asr_message_outside_waiting_state_is_ignored() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.on_asr_message("bob".into(), "hello".into());
        assert_eq!(sm.state(), TurnState::Idle);
        assert!(sm.history().is_empty());
    }

    #[test]
    fn asr_timeout_bails_to_idle_even_with_counter_positive() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        let t0 = Instant::now();
        sm.on_asr_activated(t0);
        sm.on_asr_activated(t0); // counter=2, never fully drained
        let after = t0 + Duration::from_secs(61);
        sm.evaluate(after);
        assert_eq!(sm.state(), TurnState::Idle);
    }

    #[test]
    fn tts_timeout_bails_to_idle() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        let t0 = Instant::now();
        sm.offer_chat("a".into(), "b".into(), 0.0);
        sm.evaluate(t0); // -> Generating
        sm.complete_generation(t0); // -> WaitingForTts
        assert_eq!(sm.state(), TurnState::WaitingForTts);
        sm.evaluate(t0 + Duration::from_secs(61));
        assert_eq!(sm.state(), TurnState::Idle);
    }

    #[test]
    fn barge_in_during_generating_keeps_partial_text_and_moves_to_waiting4asr() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.offer_chat("a".into(), "hello".into(), 0.0);
        sm.evaluate(Instant::now());
        sm.push_generated_sentence("partial reply");
        let activation = sm.on_asr_activated(Instant::now());
        assert_eq!(activation, AsrActivation::CancelledGeneration);
        assert_eq!(sm.state(), TurnState::WaitingForAsr);
        assert_eq!(sm.asr_counter(), 1);
        assert_eq!(sm.history().last().unwrap().content, "partial reply");
    }

    #[test]
    fn generation_completion_appends_assistant_turn_and_waits_for_tts() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.offer_chat("a".into(), "hello".into(), 0.0);
        sm.evaluate(Instant::now());
        sm.push_generated_sentence("full reply");
        sm.complete_generation(Instant::now());
        assert_eq!(sm.state(), TurnState::WaitingForTts);
        assert_eq!(sm.history().last().unwrap().role, HistoryRole::Assistant);
        assert_eq!(sm.history().last().unwrap().content, "full reply");
    }

    #[test]
    fn audio_finished_returns_to_idle() {
        let mut sm = StateMachine::new(cfg(), Instant::now());
        sm.offer_chat("a".into(), "hello".into(), 0.0);
        sm.evaluate(Instant::now());
        sm.complete_generation(Instant::now());
        sm.on_audio_finished(Instant::now());
        assert_eq!(sm.state(), TurnState::Idle);
    }

    #[test]
    fn system_prompt_seeds_history() {
        let cfg = TurnConfig {
            system_prompt: Some("be nice".into()),
            ..TurnConfig::default()
        };
        let sm = StateMachine::new(cfg, Instant::now());
        assert_eq!(sm.history().len(), 1);
        assert_eq!(sm.history()[0].role, HistoryRole::System);
    }

    #[test]
    fn chat_role_and_asr_role_are_substituted_into_templates() {
        let cfg = TurnConfig {
            chat_role: "visitor".into(),
            asr_role: "listener".into(),
            chat_template: "({role}) {user}: {content}".into(),
            asr_template: "({role}) {user}: {content}".into(),
            ..TurnConfig::default()
        };
        let mut sm = StateMachine::new(cfg, Instant::now());
        sm.offer_chat("alice".into(), "hi".into(), 0.0);
        sm.evaluate(Instant::now());
        assert_eq!(sm.history().last().unwrap().content, "(visitor) alice: hi");

        let mut sm = StateMachine::new(
            TurnConfig {
                chat_role: "visitor".into(),
                asr_role: "listener".into(),
                chat_template: "({role}) {user}: {content}".into(),
                asr_template: "({role}) {user}: {content}".into(),
                ..TurnConfig::default()
            },
            Instant::now(),
        );
        sm.on_asr_activated(Instant::now());
        sm.on_asr_message("bob".into(), "hello".into());
        assert_eq!(sm.history().last().unwrap().content, "(listener) bob: hello");
    }

    #[test]
    fn do_start_topic_fires_after_idle_timeout() {
        let cfg = TurnConfig {
            do_start_topic: true,
            idle_timeout: Duration::from_millis(1),
            ..TurnConfig::default()
        };
        let t0 = Instant::now();
        let mut sm = StateMachine::new(cfg, t0);
        let decision = sm.evaluate(t0 + Duration::from_millis(5));
        assert_eq!(decision, Decision::EnterGenerating);
    }
}
