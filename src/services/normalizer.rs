//! Field normalization
//!
//! Maps each source's own field names and units onto the canonical schema.
//! Lookup order per field is fixed per source kind: the first candidate key
//! present wins, and an absent field falls back to 0 (or is omitted for the
//! optional groups). Normalization never fails.
//!
//! Occupancy policy: `current` is always derived from the entry/exit counters
//! as `entries - exits`, floored at zero. A raw `current` value is ignored so
//! every source follows the same rule.

use crate::domain::types::{
    Normalized, NormalizedSensors, NowPlayingInfo, OccupancyInfo, RawReading, SourceKind,
};

/// Artist reported when the track text carries none
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Prefix the track scraper writes instead of a title when lookup fails
pub const ERROR_SENTINEL: &str = "Error";

const TITLE_ARTIST_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Native,
    CelsiusToFahrenheit,
}

/// One candidate raw key for a canonical field
#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: &'static str,
    unit: Unit,
}

const fn native(key: &'static str) -> Candidate {
    Candidate { key, unit: Unit::Native }
}

const fn celsius(key: &'static str) -> Candidate {
    Candidate { key, unit: Unit::CelsiusToFahrenheit }
}

/// Per-source lookup table
struct FieldMap {
    sound: &'static [Candidate],
    light: &'static [Candidate],
    indoor: &'static [Candidate],
    outdoor: &'static [Candidate],
    humidity: &'static [Candidate],
    pressure: &'static [Candidate],
    entries: &'static [&'static str],
    exits: &'static [&'static str],
    track: &'static [&'static str],
    artist: &'static [&'static str],
    album_art: &'static [&'static str],
}

static MOCK_FIELDS: FieldMap = FieldMap {
    sound: &[native("sound_level")],
    light: &[native("light_level")],
    indoor: &[native("indoor_temperature")],
    outdoor: &[native("outdoor_temperature")],
    humidity: &[native("humidity")],
    pressure: &[],
    entries: &[],
    exits: &[],
    track: &[],
    artist: &[],
    album_art: &[],
};

static HTTP_FIELDS: FieldMap = FieldMap {
    sound: &[native("sound_level"), native("noise_db"), native("avg_db")],
    light: &[native("light_level"), native("lux")],
    indoor: &[
        native("indoor_temperature"),
        native("temperature_f"),
        celsius("temperature_c"),
    ],
    outdoor: &[
        native("outdoor_temperature"),
        native("outdoor_temperature_f"),
        celsius("outdoor_temperature_c"),
    ],
    humidity: &[native("humidity")],
    pressure: &[native("pressure")],
    entries: &["entries"],
    exits: &["exits"],
    track: &["now_playing", "current_song"],
    artist: &["artist"],
    album_art: &["album_art", "album_art_url"],
};

// No outdoor sensor on the file-writing rig: the indoor reading stands in.
static FILE_FIELDS: FieldMap = FieldMap {
    sound: &[native("avg_db"), native("sound_level")],
    light: &[native("lux"), native("light_level")],
    indoor: &[native("temperature_f"), celsius("temperature_c")],
    outdoor: &[
        native("outdoor_temperature_f"),
        native("temperature_f"),
        celsius("temperature_c"),
    ],
    humidity: &[native("humidity")],
    pressure: &[native("pressure")],
    entries: &["entries"],
    exits: &["exits"],
    track: &["current_song"],
    artist: &[],
    album_art: &["album_art"],
};

impl FieldMap {
    fn for_source(kind: SourceKind) -> &'static FieldMap {
        match kind {
            SourceKind::Mock => &MOCK_FIELDS,
            SourceKind::Http => &HTTP_FIELDS,
            SourceKind::File => &FILE_FIELDS,
        }
    }
}

fn resolve(raw: &RawReading, candidates: &[Candidate]) -> Option<f64> {
    candidates.iter().find_map(|c| {
        raw.number(c.key).map(|v| match c.unit {
            Unit::Native => v,
            Unit::CelsiusToFahrenheit => round2(v * 9.0 / 5.0 + 32.0),
        })
    })
}

fn first_counter(raw: &RawReading, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| raw.counter(k))
}

fn first_text<'a>(raw: &'a RawReading, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| raw.text(k))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Occupancy from door counters; `current` never goes negative
pub fn derive_occupancy(entries: u32, exits: u32, capacity: u32) -> OccupancyInfo {
    OccupancyInfo { current: entries.saturating_sub(exits), entries, exits, capacity }
}

/// Parse now-playing text.
///
/// `"Title - Artist"` splits on the first separator. Without a separator the
/// whole text is the title. An explicit artist field takes precedence over
/// splitting. Empty text and error sentinels yield nothing.
pub fn parse_now_playing(
    text: &str,
    explicit_artist: Option<&str>,
    album_art: Option<&str>,
) -> Option<NowPlayingInfo> {
    let text = text.trim();
    if text.is_empty() || text.starts_with(ERROR_SENTINEL) {
        return None;
    }

    let album_art_url = album_art.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    let explicit_artist = explicit_artist.map(str::trim).filter(|s| !s.is_empty());

    let (title, artist) = match explicit_artist {
        Some(artist) => (text, artist),
        None => match text.split_once(TITLE_ARTIST_SEPARATOR) {
            Some((title, artist)) => {
                let artist = artist.trim();
                (title.trim(), if artist.is_empty() { UNKNOWN_ARTIST } else { artist })
            }
            None => (text, UNKNOWN_ARTIST),
        },
    };
    if title.is_empty() {
        return None;
    }

    Some(NowPlayingInfo { title: title.to_string(), artist: artist.to_string(), album_art_url })
}

/// Maps raw readings onto the canonical schema
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    capacity: u32,
}

impl FieldNormalizer {
    pub fn new(capacity: u32) -> Self {
        Self { capacity }
    }

    pub fn normalize(&self, raw: &RawReading) -> Normalized {
        let fields = FieldMap::for_source(raw.kind());

        let sensors = NormalizedSensors {
            sound_level: resolve(raw, fields.sound).unwrap_or(0.0),
            light_level: resolve(raw, fields.light).unwrap_or(0.0),
            indoor_temperature: resolve(raw, fields.indoor).unwrap_or(0.0),
            outdoor_temperature: resolve(raw, fields.outdoor).unwrap_or(0.0),
            humidity: resolve(raw, fields.humidity).unwrap_or(0.0),
            pressure: resolve(raw, fields.pressure),
        };

        let occupancy = match (first_counter(raw, fields.entries), first_counter(raw, fields.exits)) {
            (Some(entries), Some(exits)) => Some(derive_occupancy(entries, exits, self.capacity)),
            _ => None,
        };

        let now_playing = first_text(raw, fields.track).and_then(|text| {
            parse_now_playing(text, first_text(raw, fields.artist), first_text(raw, fields.album_art))
        });

        Normalized { sensors, occupancy, now_playing }
    }
}
