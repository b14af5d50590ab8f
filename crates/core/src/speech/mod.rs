use crate::net::RESTART_BACKOFF_MS;

/// Error code the recognizer reports when it simply heard nothing.
pub const NO_SPEECH: &str = "no-speech";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("speech recognition is not available on this device")]
    EngineUnavailable,
    #[error("Could not start mic: {0}")]
    Start(String),
    #[error("Voice Error: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Fragment {
        text: String,
        finalized: bool,
        timestamp: u64,
    },
    Error(String),
    Ended,
}

/// A speech-to-text backend. Sessions end on their own (silence, network,
/// OS policy); the listener decides whether to restart them. `stop` and
/// `abort` each close a live session with exactly one `Ended` event.
pub trait SpeechEngine {
    fn start(&mut self) -> Result<(), SpeechError>;
    fn stop(&mut self);
    fn abort(&mut self);
    fn poll(&mut self) -> Vec<SpeechEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Listening,
    Restarting { resume_at: u64 },
}

impl ListenerState {
    pub fn is_active(&self) -> bool {
        !matches!(self, ListenerState::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutput {
    Phrase { text: String, recognized_at: u64 },
    Interim(String),
    System(String),
    Error(SpeechError),
}

/// Keeps one recognition session alive while the user wants to listen. The
/// only timer is the `resume_at` deadline held inside
/// [`ListenerState::Restarting`], so stopping always cancels a pending restart.
pub struct VoiceListener {
    engine: Option<Box<dyn SpeechEngine>>,
    state: ListenerState,
    backoff_ms: u64,
    unavailable_reported: bool,
    /// Sessions closed by us whose `Ended` has not arrived yet.
    closing_sessions: u32,
}

impl Default for VoiceListener {
    fn default() -> Self {
        Self::new(None, RESTART_BACKOFF_MS)
    }
}

impl VoiceListener {
    pub fn new(engine: Option<Box<dyn SpeechEngine>>, backoff_ms: u64) -> Self {
        Self {
            engine,
            state: ListenerState::Stopped,
            backoff_ms,
            unavailable_reported: false,
            closing_sessions: 0,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn start(&mut self, _now: u64) -> Vec<ListenerOutput> {
        let live = self.session_live();
        let Some(engine) = self.engine.as_mut() else {
            if self.unavailable_reported {
                return Vec::new();
            }
            self.unavailable_reported = true;
            return vec![ListenerOutput::Error(SpeechError::EngineUnavailable)];
        };

        if live {
            engine.abort();
            self.closing_sessions += 1;
        }

        match engine.start() {
            Ok(()) => {
                self.state = ListenerState::Starting;
                Vec::new()
            }
            Err(e) => {
                self.state = ListenerState::Stopped;
                let e = match e {
                    SpeechError::Start(_) => e,
                    other => SpeechError::Start(other.to_string()),
                };
                vec![ListenerOutput::Error(e)]
            }
        }
    }

    pub fn stop(&mut self) {
        let was_active = self.state.is_active();
        if self.session_live() {
            self.closing_sessions += 1;
        }
        self.state = ListenerState::Stopped;
        if was_active {
            if let Some(engine) = self.engine.as_mut() {
                engine.stop();
            }
        }
    }

    fn session_live(&self) -> bool {
        matches!(
            self.state,
            ListenerState::Starting | ListenerState::Listening
        )
    }

    /// Drains engine events and fires a due restart.
    pub fn update(&mut self, now: u64) -> Vec<ListenerOutput> {
        let mut outputs = Vec::new();

        let events = match self.engine.as_mut() {
            Some(engine) => engine.poll(),
            None => return outputs,
        };

        for event in events {
            self.handle_event(event, now, &mut outputs);
        }

        if let ListenerState::Restarting { resume_at } = self.state {
            if now >= resume_at {
                outputs.push(ListenerOutput::System(
                    "Restarting Voice Service...".to_string(),
                ));
                outputs.extend(self.start(now));
            }
        }

        outputs
    }

    fn handle_event(&mut self, event: SpeechEvent, now: u64, outputs: &mut Vec<ListenerOutput>) {
        match event {
            SpeechEvent::Started => {
                if self.state == ListenerState::Starting {
                    self.state = ListenerState::Listening;
                    outputs.push(ListenerOutput::System(
                        "Voice Uplink Established.".to_string(),
                    ));
                }
            }
            SpeechEvent::Fragment {
                text,
                finalized,
                timestamp,
            } => {
                if !self.state.is_active() {
                    return;
                }
                if finalized {
                    let text = text.trim();
                    if !text.is_empty() {
                        outputs.push(ListenerOutput::Phrase {
                            text: text.to_string(),
                            recognized_at: timestamp,
                        });
                    }
                } else {
                    outputs.push(ListenerOutput::Interim(format!("{}...", text)));
                }
            }
            SpeechEvent::Error(code) => {
                if code != NO_SPEECH {
                    outputs.push(ListenerOutput::Error(SpeechError::Stream(code)));
                }
            }
            SpeechEvent::Ended if self.closing_sessions > 0 => {
                // Late end of a session we stopped or replaced.
                self.closing_sessions -= 1;
                if self.state == ListenerState::Stopped {
                    outputs.push(ListenerOutput::System(
                        "Voice Uplink Terminated.".to_string(),
                    ));
                }
            }
            SpeechEvent::Ended => match self.state {
                ListenerState::Starting | ListenerState::Listening => {
                    self.state = ListenerState::Restarting {
                        resume_at: now + self.backoff_ms,
                    };
                }
                ListenerState::Restarting { .. } => {}
                ListenerState::Stopped => {
                    outputs.push(ListenerOutput::System(
                        "Voice Uplink Terminated.".to_string(),
                    ));
                }
            },
        }
    }
}
