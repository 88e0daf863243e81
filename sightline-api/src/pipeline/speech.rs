//! Speech synthesis
//!
//! [`TranslateTts`] talks to the translate_tts endpoint. That endpoint
//! only accepts short texts, so narration is split into chunks of at
//! most [`MAX_CHUNK_CHARS`] characters on sentence and word boundaries.
//! The MP3 frames returned for each chunk are concatenated as-is.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, Client};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const MAX_CHUNK_CHARS: usize = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Minimum gap between outbound TTS requests
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(200);

const USER_AGENT: &str = concat!("sightline-api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Nothing to synthesize")]
    EmptyText,

    #[error("Speech request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Speech service returned HTTP {status} for chunk {chunk}")]
    Status { status: u16, chunk: usize },

    #[error("Speech service returned no audio for chunk {0}")]
    EmptyAudio(usize),
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// MP3 bytes for `text` spoken in `language`
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError>;
}

/// Direct (unkeyed) limiter for outbound TTS calls
pub type TtsRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One request per `min_interval`, no burst
pub fn rate_limiter(min_interval: Duration) -> TtsRateLimiter {
    let quota = Quota::with_period(min_interval)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
    RateLimiter::direct(quota)
}

pub struct TranslateTts {
    client: Client,
    endpoint: String,
    limiter: TtsRateLimiter,
}

impl TranslateTts {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SpeechError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::REFERER,
            header::HeaderValue::from_static("https://translate.google.com/"),
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            limiter: rate_limiter(RATE_LIMIT_INTERVAL),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for TranslateTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        let chunks = split_chunks(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            self.limiter.until_ready().await;

            let idx_str = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", language),
                    ("client", "tw-ob"),
                    ("total", total.as_str()),
                    ("idx", idx_str.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(SpeechError::Status {
                    status: status.as_u16(),
                    chunk: idx,
                });
            }

            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Err(SpeechError::EmptyAudio(idx));
            }
            audio.extend_from_slice(&bytes);
        }

        debug!(chunks = chunks.len(), bytes = audio.len(), language, "Synthesized narration");
        Ok(audio)
    }
}

/// Split text into chunks no longer than `max_chars` characters
///
/// Sentences are kept whole where they fit; longer sentences break on
/// spaces, and single words longer than the limit break mid-word.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        for piece in fit_sentence(sentence, max_chars) {
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 1 + piece.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Sentences including their closing punctuation
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn fit_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max_chars) {
                pieces.push(part.iter().collect());
            }
            continue;
        }
        let needed = if current.is_empty() {
            word_len
        } else {
            current.chars().count() + 1 + word_len
        };
        if needed > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
