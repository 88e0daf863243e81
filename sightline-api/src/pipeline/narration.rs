//! Narration text for speech synthesis

/// Spoken when a job produced no guidance at all
pub const NO_DETECTIONS: &str = "No significant detections in this video.";

/// Replaced wherever they occur
const PHRASE_REPLACEMENTS: &[(&str, &str)] = &[
    ("Green-traffic-lights", "Green light ahead, it's safe to cross"),
    ("Red-traffic-lights", "Red light ahead, stop and wait"),
    ("Yellow-traffic-lights", "Yellow light ahead, prepare to stop"),
    ("Person on your right", "Someone is on your right side"),
    ("Person on your left", "Someone is on your left side"),
];

/// Replaced only when they make up the whole line
const LABEL_REPLACEMENTS: &[(&str, &str)] = &[
    ("Green Light", "Green light ahead, it's safe to cross"),
    ("Red Light", "Red light ahead, stop and wait"),
    ("Yellow Light", "Yellow light ahead, prepare to stop"),
    ("Zebra Crossing", "Zebra crossing detected"),
    ("zebra crossing", "Zebra crossing detected"),
    ("Person", "Person detected"),
    ("Car", "Car detected"),
    ("Bus", "Bus detected"),
    ("Truck", "Truck detected"),
];

/// Strip debug fragments and turn bare labels into speech
pub fn clean_line(line: &str) -> String {
    let mut text = strip_fragments(line);
    for (from, to) in PHRASE_REPLACEMENTS {
        if text.contains(from) {
            text = text.replace(from, to);
        }
    }
    let trimmed = text.trim();
    for (label, spoken) in LABEL_REPLACEMENTS {
        if trimmed == *label {
            return spoken.to_string();
        }
    }
    trimmed.to_string()
}

/// Drop `(conf: 0.87)` and `[Frame 12]` fragments
fn strip_fragments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("(conf: ") {
            let digits = after
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(after.len());
            if digits > 0 && after[digits..].starts_with(')') {
                rest = &after[digits + 1..];
                continue;
            }
        }
        if let Some(after) = rest.strip_prefix("[Frame ") {
            let digits = after
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after.len());
            if digits > 0 && after[digits..].starts_with(']') {
                rest = after[digits + 1..].trim_start();
                continue;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Cleaned, de-duplicated sentences in their original order
pub fn narration_lines(lines: &[String]) -> Vec<String> {
    let source: Vec<&str> = if lines.is_empty() {
        vec![NO_DETECTIONS]
    } else {
        lines.iter().map(String::as_str).collect()
    };

    let mut unique: Vec<String> = Vec::new();
    for sentence in source
        .into_iter()
        .flat_map(str::lines)
        .map(clean_line)
        .filter(|s| !s.is_empty())
    {
        if !unique.contains(&sentence) {
            unique.push(sentence);
        }
    }

    if unique.is_empty() {
        unique.push(NO_DETECTIONS.to_string());
    }
    unique
}

/// Single text handed to the synthesizer
///
/// Sentences are joined with `". "`; a sentence that already ends in
/// punctuation is followed by a plain space.
pub fn narration_text(lines: &[String]) -> String {
    let sentences = narration_lines(lines);
    let mut text = String::new();
    for (i, sentence) in sentences.iter().enumerate() {
        text.push_str(sentence);
        if i + 1 < sentences.len() {
            if sentence.ends_with(['.', '!', '?']) {
                text.push(' ');
            } else {
                text.push_str(". ");
            }
        }
    }
    text
}
