//! Voice command navigation
//!
//! Speech recognition itself is external; this module receives finalized
//! phrases and turns them into [`VoiceCommand`]s.

pub mod command;
pub mod dispatcher;

pub use command::{parse, Field, Page, VoiceCommand};
pub use dispatcher::{Outcome, VoiceDispatcher, LISTEN_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Start,
    Stop,
}

/// Speech output
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str);

    fn tone(&self, _tone: Tone) {}
}

/// Writes announcements to stdout
#[derive(Debug, Default)]
pub struct ConsoleSpeaker;

impl Speaker for ConsoleSpeaker {
    fn speak(&self, text: &str) {
        println!("[voice] {}", text);
    }

    fn tone(&self, tone: Tone) {
        match tone {
            Tone::Start => println!("[tone] listening"),
            Tone::Stop => println!("[tone] stopped"),
        }
    }
}
