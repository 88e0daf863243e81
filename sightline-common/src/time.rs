//! Folder names for history entries

use chrono::{DateTime, Utc};

/// Date folder name used by the media store (`YYYY-MM-DD`)
pub fn date_folder(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Time folder name used by the media store (`HH-MM-SS`)
pub fn time_folder(ts: &DateTime<Utc>) -> String {
    ts.format("%H-%M-%S").to_string()
}
