//! Voice command dispatcher
//!
//! Each finalized phrase goes through, in order:
//! 1. ignored unless listening
//! 2. inactivity clock reset
//! 3. no keyword: noise, with an occasional spoken nudge
//! 4. parse (common commands, then the current page's)
//! 5. keyword but no command: spoken "not understood"
//!
//! Navigation, settings and listening commands are applied here; the
//! rest are handed back to the caller to perform.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::command::{self, language_name, Page, VoiceCommand};
use super::{Speaker, Tone};
use crate::settings::{AppSettings, VoiceTips};

/// Listening stops after this long without a finalized result
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(90);

pub const DEFAULT_NUDGE_PROBABILITY: f64 = 0.1;

const NUDGE: &str = "Say help to hear what you can do.";
const NOT_UNDERSTOOD: &str = "Sorry, I didn't understand that. Say help for a list of commands.";

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not listening
    Ignored,
    Noise { nudged: bool },
    NotUnderstood,
    /// Command recognized; already applied if it was navigation or a setting
    Executed(VoiceCommand),
}

pub struct VoiceDispatcher {
    speaker: Arc<dyn Speaker>,
    page: Page,
    back_stack: Vec<Page>,
    visited: HashSet<Page>,
    listening: bool,
    last_activity: Instant,
    pending: VecDeque<String>,
    nudge_probability: f64,
    timeout: Duration,
    rng: StdRng,
}

impl VoiceDispatcher {
    pub fn new(speaker: Arc<dyn Speaker>, page: Page) -> Self {
        let mut visited = HashSet::new();
        visited.insert(page);
        Self {
            speaker,
            page,
            back_stack: Vec::new(),
            visited,
            listening: false,
            last_activity: Instant::now(),
            pending: VecDeque::new(),
            nudge_probability: DEFAULT_NUDGE_PROBABILITY,
            timeout: LISTEN_TIMEOUT,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_nudge_probability(mut self, probability: f64) -> Self {
        self.nudge_probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn start(&mut self, now: Instant, settings: &AppSettings) {
        if self.listening {
            return;
        }
        self.listening = true;
        self.last_activity = now;
        if settings.tones {
            self.speaker.tone(Tone::Start);
        }
        self.speaker.speak("Listening.");
        info!(page = self.page.name(), "Voice control started");
    }

    /// Stop immediately; queued phrases are dropped
    pub fn stop(&mut self, settings: &AppSettings) {
        if !self.listening {
            return;
        }
        self.listening = false;
        let dropped = self.pending.len();
        self.pending.clear();
        if settings.tones {
            self.speaker.tone(Tone::Stop);
        }
        info!(dropped, "Voice control stopped");
    }

    /// Queue a finalized phrase for [`drain`](Self::drain)
    pub fn push_result(&mut self, phrase: impl Into<String>) {
        if self.listening {
            self.pending.push_back(phrase.into());
        }
    }

    /// Handle queued phrases in order
    pub fn drain(&mut self, now: Instant, settings: &mut AppSettings) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        while let Some(phrase) = self.pending.pop_front() {
            outcomes.push(self.handle_result(&phrase, now, settings));
        }
        outcomes
    }

    /// Stop listening if the timeout has passed; true when it fired
    pub fn tick(&mut self, now: Instant, settings: &AppSettings) -> bool {
        if !self.listening || now.saturating_duration_since(self.last_activity) < self.timeout {
            return false;
        }
        self.stop(settings);
        self.speaker.speak(&format!(
            "Voice control stopped after {} seconds without a command.",
            self.timeout.as_secs()
        ));
        true
    }

    pub fn handle_result(&mut self, phrase: &str, now: Instant, settings: &mut AppSettings) -> Outcome {
        if !self.listening {
            return Outcome::Ignored;
        }
        self.last_activity = now;

        let text = command::normalize(phrase);
        if !command::has_keyword(&text) {
            let nudged = self.rng.gen_bool(self.nudge_probability);
            if nudged {
                self.speaker.speak(NUDGE);
            }
            debug!(phrase = %text, nudged, "Voice noise ignored");
            return Outcome::Noise { nudged };
        }

        match command::parse(phrase, self.page) {
            Some(cmd) => {
                debug!(phrase = %text, command = ?cmd, page = self.page.name(), "Voice command");
                self.dispatch(cmd, settings)
            }
            None => {
                debug!(phrase = %text, page = self.page.name(), "Voice command not understood");
                self.speaker.speak(NOT_UNDERSTOOD);
                Outcome::NotUnderstood
            }
        }
    }

    fn dispatch(&mut self, cmd: VoiceCommand, settings: &mut AppSettings) -> Outcome {
        match &cmd {
            VoiceCommand::GoTo(page) => self.navigate(*page, settings),
            VoiceCommand::Back => match self.back_stack.pop() {
                Some(page) => {
                    self.page = page;
                    self.speaker.speak(&format!("Back to {}.", page.name()));
                }
                None => self.speaker.speak("There is no previous page."),
            },
            VoiceCommand::Help => {
                self.speaker.speak(self.page.tip());
                self.speaker
                    .speak("You can also say go to, then a page name, or stop listening.");
            }
            VoiceCommand::StopListening => {
                self.stop(settings);
                self.speaker.speak("Voice control off.");
            }
            VoiceCommand::SetLanguage(code) => {
                settings.language = code.clone();
                self.speaker
                    .speak(&format!("Language set to {}.", language_name(code)));
            }
            VoiceCommand::SetTheme(theme) => {
                settings.theme = *theme;
                self.speaker.speak(&format!("{} theme on.", theme.label()));
            }
            VoiceCommand::Faster => {
                let rate = settings.faster();
                self.speaker.speak(&format!("Playback speed {}.", rate));
            }
            VoiceCommand::Slower => {
                let rate = settings.slower();
                self.speaker.speak(&format!("Playback speed {}.", rate));
            }
            VoiceCommand::Logout => {
                self.back_stack.clear();
                self.page = Page::Login;
                self.speaker.speak("Logged out.");
            }
            _ => {}
        }
        Outcome::Executed(cmd)
    }

    /// Move to `page`, speaking its tip per the voice tips setting
    pub fn navigate(&mut self, page: Page, settings: &AppSettings) {
        if page != self.page {
            self.back_stack.push(self.page);
            self.page = page;
        }
        let first_visit = self.visited.insert(page);
        self.speaker.speak(&format!("Opening {}.", page.name()));

        let tip = match settings.voice_tips {
            VoiceTips::Always => true,
            VoiceTips::FirstVisit => first_visit,
            VoiceTips::Never => false,
        };
        if tip {
            self.speaker.speak(page.tip());
        }
    }
}
