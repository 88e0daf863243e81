//! Voice command grammar
//!
//! A finalized speech result is normalized, then matched against the
//! commands every page understands, then against the current page's own
//! commands. Phrases without any keyword from [`KEYWORDS`] never parse.

use crate::settings::Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Home,
    Login,
    Signup,
    Upload,
    Results,
    History,
    Settings,
    Profile,
}

impl Page {
    pub fn name(&self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::Login => "login",
            Page::Signup => "sign up",
            Page::Upload => "upload",
            Page::Results => "results",
            Page::History => "history",
            Page::Settings => "settings",
            Page::Profile => "profile",
        }
    }

    /// Page named by a spoken phrase ("the history page", "sign in", ...)
    pub fn from_phrase(text: &str) -> Option<Page> {
        let text = text.trim();
        let text = text.strip_prefix("the ").unwrap_or(text);
        let text = text.strip_prefix("my ").unwrap_or(text);
        let text = text.strip_suffix(" page").unwrap_or(text).trim();
        match text {
            "home" | "main" | "start" => Some(Page::Home),
            "login" | "log in" | "sign in" => Some(Page::Login),
            "sign up" | "signup" | "register" | "registration" => Some(Page::Signup),
            "upload" | "uploads" | "detection" | "detect" | "camera" => Some(Page::Upload),
            "results" | "result" => Some(Page::Results),
            "history" | "past results" => Some(Page::History),
            "settings" | "preferences" | "options" => Some(Page::Settings),
            "profile" | "account" => Some(Page::Profile),
            _ => None,
        }
    }

    /// Spoken on arrival, depending on the voice tips setting
    pub fn tip(&self) -> &'static str {
        match self {
            Page::Home => "Say go to upload to check a street, or go to history for past results.",
            Page::Login => "Say username is, then your name. Then password is, then your password. Then say log in.",
            Page::Signup => "Say username is, email is and password is, then say sign up.",
            Page::Upload => "Say choose file to pick a video or photo, then say start upload.",
            Page::Results => "Say play, pause, replay, faster or slower. Say read results to hear them.",
            Page::History => "Say open entry and a number to play it, or delete entry and a number.",
            Page::Settings => "Say dark mode, light mode or high contrast. Say language and a language name.",
            Page::Profile => "Say username is or email is to change them, then say save.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Email,
    Password,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceCommand {
    GoTo(Page),
    Back,
    Fill { field: Field, value: String },
    Submit,
    Play,
    Pause,
    Stop,
    Replay,
    Faster,
    Slower,
    /// Language code, e.g. `ar`
    SetLanguage(String),
    SetTheme(Theme),
    Logout,
    ReadResults,
    ChooseFile,
    StartUpload,
    /// 1-based position in the history list
    DeleteEntry(usize),
    OpenEntry(usize),
    Help,
    StopListening,
}

/// Words that make a phrase worth parsing; anything else is noise
pub const KEYWORDS: &[&str] = &[
    "go", "open", "navigate", "take", "show", "back", "previous", "help", "stop", "listening",
    "log", "logout", "login", "sign", "signup", "register", "language", "dark", "light",
    "contrast", "theme", "mode", "play", "resume", "pause", "replay", "repeat", "again",
    "faster", "slower", "speed", "slow", "read", "results", "choose", "select", "pick",
    "browse", "start", "upload", "detect", "send", "delete", "remove", "entry", "number",
    "item", "submit", "save", "username", "name", "email", "password", "home", "history",
    "settings", "profile", "switch", "speak",
];

const LANGUAGES: &[(&str, &str)] = &[
    ("english", "en"),
    ("arabic", "ar"),
    ("french", "fr"),
    ("spanish", "es"),
    ("german", "de"),
    ("italian", "it"),
    ("turkish", "tr"),
];

pub fn language_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
        .unwrap_or(code)
}

/// Words with sentence punctuation stripped from their edges, case kept
fn spoken_words(phrase: &str) -> Vec<&str> {
    phrase
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '"')))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lowercase, single-spaced, with sentence punctuation stripped from word edges
pub fn normalize(phrase: &str) -> String {
    spoken_words(phrase)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn has_keyword(normalized: &str) -> bool {
    normalized.split(' ').any(|w| KEYWORDS.contains(&w))
}

/// Parse a finalized phrase for `page`
pub fn parse(phrase: &str, page: Page) -> Option<VoiceCommand> {
    let text = normalize(phrase);
    if !has_keyword(&text) {
        return None;
    }
    parse_common(&text).or_else(|| parse_page(page, &text, &spoken_words(phrase)))
}

/// Commands understood on every page
fn parse_common(text: &str) -> Option<VoiceCommand> {
    match text {
        "stop listening" | "stop voice" | "stop voice control" => {
            return Some(VoiceCommand::StopListening)
        }
        "help" | "what can i say" | "voice help" => return Some(VoiceCommand::Help),
        "back" | "go back" | "previous page" => return Some(VoiceCommand::Back),
        "log out" | "logout" | "sign out" => return Some(VoiceCommand::Logout),
        "dark mode" | "dark theme" => return Some(VoiceCommand::SetTheme(Theme::Dark)),
        "light mode" | "light theme" => return Some(VoiceCommand::SetTheme(Theme::Light)),
        "high contrast" | "high contrast mode" => {
            return Some(VoiceCommand::SetTheme(Theme::HighContrast))
        }
        _ => {}
    }

    for prefix in ["go to ", "open ", "navigate to ", "take me to ", "show "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            if let Some(page) = Page::from_phrase(rest) {
                return Some(VoiceCommand::GoTo(page));
            }
        }
    }

    let words: Vec<&str> = text.split(' ').collect();
    if words.contains(&"language") || words.first() == Some(&"speak") || text.starts_with("switch to ") {
        if let Some((_, code)) = words
            .iter()
            .find_map(|w| LANGUAGES.iter().find(|(name, _)| name == w))
        {
            return Some(VoiceCommand::SetLanguage(code.to_string()));
        }
    }
    None
}

/// `words` is the phrase as spoken, aligned word for word with `text`
fn parse_page(page: Page, text: &str, words: &[&str]) -> Option<VoiceCommand> {
    match page {
        Page::Login | Page::Signup | Page::Profile => parse_form(page, text, words),
        Page::Upload => match text {
            "choose file" | "choose a file" | "select file" | "select a file" | "pick file"
            | "pick a file" | "browse" => Some(VoiceCommand::ChooseFile),
            "start upload" | "upload" | "start" | "detect" | "start detection" | "send" => {
                Some(VoiceCommand::StartUpload)
            }
            _ => None,
        },
        Page::Results => match text {
            "read results" | "read the results" | "read" => Some(VoiceCommand::ReadResults),
            _ => parse_media(text),
        },
        Page::History => parse_entry(text).or_else(|| parse_media(text)),
        Page::Settings => match text {
            "faster" | "speed up" => Some(VoiceCommand::Faster),
            "slower" | "slow down" => Some(VoiceCommand::Slower),
            _ => None,
        },
        Page::Home => match text {
            "start" | "get started" | "upload" => Some(VoiceCommand::GoTo(Page::Upload)),
            _ => None,
        },
    }
}

fn parse_media(text: &str) -> Option<VoiceCommand> {
    match text {
        "play" | "resume" => Some(VoiceCommand::Play),
        "pause" => Some(VoiceCommand::Pause),
        "stop" => Some(VoiceCommand::Stop),
        "replay" | "repeat" | "again" | "play again" => Some(VoiceCommand::Replay),
        "faster" | "speed up" => Some(VoiceCommand::Faster),
        "slower" | "slow down" => Some(VoiceCommand::Slower),
        _ => None,
    }
}

fn parse_form(page: Page, text: &str, words: &[&str]) -> Option<VoiceCommand> {
    let submit = match page {
        Page::Login => matches!(text, "log in" | "login" | "sign in" | "submit"),
        Page::Signup => matches!(text, "sign up" | "signup" | "register" | "submit"),
        _ => matches!(text, "save" | "submit"),
    };
    if submit {
        return Some(VoiceCommand::Submit);
    }

    let (text, skipped) = match text.strip_prefix("my ") {
        Some(rest) => (rest, 1),
        None => (text, 0),
    };
    let fields = [
        ("username is ", Field::Username),
        ("user name is ", Field::Username),
        ("name is ", Field::Username),
        ("email is ", Field::Email),
        ("email address is ", Field::Email),
        ("password is ", Field::Password),
    ];
    for (prefix, field) in fields {
        if text.starts_with(prefix) {
            // Prefixes are matched lowercased; the value keeps its spoken case
            let start = skipped + prefix.split_whitespace().count();
            let spoken = words.get(start..).unwrap_or_default().join(" ");
            let value = match field {
                Field::Email => spoken_email(&spoken.to_lowercase()),
                _ => spoken,
            };
            if value.is_empty() {
                return None;
            }
            return Some(VoiceCommand::Fill { field, value });
        }
    }
    None
}

/// "amira at example dot com" → "amira@example.com"
fn spoken_email(value: &str) -> String {
    value
        .split(' ')
        .map(|w| match w {
            "at" => "@",
            "dot" => ".",
            other => other,
        })
        .collect::<String>()
}

fn parse_entry(text: &str) -> Option<VoiceCommand> {
    let words: Vec<&str> = text.split(' ').collect();
    let (verb, rest) = words.split_first()?;
    let make: fn(usize) -> VoiceCommand = match *verb {
        "open" | "play" => VoiceCommand::OpenEntry,
        "delete" | "remove" => VoiceCommand::DeleteEntry,
        _ => return None,
    };
    let rest: Vec<&str> = rest
        .iter()
        .copied()
        .filter(|w| !matches!(*w, "entry" | "number" | "item" | "the"))
        .collect();
    match rest.as_slice() {
        [n] => ordinal(n).map(make),
        _ => None,
    }
}

fn ordinal(word: &str) -> Option<usize> {
    if let Ok(n) = word.parse::<usize>() {
        return (n > 0).then_some(n);
    }
    let n = match word {
        "one" | "first" => 1,
        "two" | "second" => 2,
        "three" | "third" => 3,
        "four" | "fourth" => 4,
        "five" | "fifth" => 5,
        "six" | "sixth" => 6,
        "seven" | "seventh" => 7,
        "eight" | "eighth" => 8,
        "nine" | "ninth" => 9,
        "ten" | "tenth" => 10,
        _ => return None,
    };
    Some(n)
}
