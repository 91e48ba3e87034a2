//! Audio tag extraction: a rank-ordered list of tag names per field, "first
//! present name wins", per the dynamic tag map design (§9).
//!
//! Tag containers are heterogeneous across formats (ID3v2 frames, Vorbis
//! comments, MP4 atoms); [`TagValue`] models the sum type the design calls
//! for, and [`first_present`] is the "stringify, take the first element"
//! helper that reads across it uniformly.

use std::path::Path;

use lofty::file::AudioFile;
use lofty::prelude::{Accessor, ItemKey, TaggedFileExt};
use lofty::tag::Tag;
use serde_json::{Map, Value as Json, json};
use tracing::warn;

/// A tag value as it might appear in any of the supported container formats.
#[derive(Debug, Clone)]
pub enum TagValue {
    String(String),
    List(Vec<TagValue>),
}

impl TagValue {
    /// Stringify-then-take-first-element, per the Design Notes' helper.
    fn first_string(&self) -> Option<String> {
        match self {
            TagValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            TagValue::String(_) => None,
            TagValue::List(items) => items.iter().find_map(TagValue::first_string),
        }
    }
}

/// Rank-ordered raw tag names tried, in order, for each field, mirroring the
/// most common spellings across ID3v2 (`TPE1`), Vorbis/APE (`ARTIST`), and
/// MP4 atom (`©ART`) containers.
const ARTIST_NAMES: &[&str] = &["TPE1", "ARTIST", "\u{a9}ART"];
const ALBUM_NAMES: &[&str] = &["TALB", "ALBUM", "\u{a9}alb"];
const TITLE_NAMES: &[&str] = &["TIT2", "TITLE", "\u{a9}nam"];
const GENRE_NAMES: &[&str] = &["TCON", "GENRE", "\u{a9}gen"];
const YEAR_NAMES: &[&str] = &["TDRC", "DATE", "\u{a9}day"];
const TRACK_NUMBER_NAMES: &[&str] = &["TRCK", "TRACKNUMBER", "trkn"];

pub fn extract(path: &Path) -> Map<String, Json> {
    let mut fields = Map::new();

    let tagged_file = match lofty::read_from_path(path) {
        Ok(f) => f,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "audio tag read failed");
            return fields;
        }
    };

    if let Some(duration) = Some(tagged_file.properties().duration().as_secs_f64()).filter(|d| *d > 0.0) {
        fields.insert("duration".into(), json!(duration.round() as i64));
    }

    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return fields;
    };

    insert_first_present(&mut fields, tag, "artist", ARTIST_NAMES, ItemKey::TrackArtist);
    insert_first_present(&mut fields, tag, "album", ALBUM_NAMES, ItemKey::AlbumTitle);
    insert_first_present(&mut fields, tag, "title", TITLE_NAMES, ItemKey::TrackTitle);
    insert_first_present(&mut fields, tag, "genre", GENRE_NAMES, ItemKey::Genre);
    insert_first_present(&mut fields, tag, "year", YEAR_NAMES, ItemKey::Year);
    insert_first_present(&mut fields, tag, "track_number", TRACK_NUMBER_NAMES, ItemKey::TrackNumber);

    fields
}

/// Tries the rank-ordered raw names first (matching unknown/custom items by
/// literal key text, case-insensitively), then falls back to lofty's
/// normalized [`ItemKey`] for the field, since most real-world files are read
/// back through lofty's already-normalized accessor rather than a raw frame.
fn insert_first_present(
    fields: &mut Map<String, Json>,
    tag: &Tag,
    field_name: &str,
    raw_names: &[&str],
    normalized_key: ItemKey,
) {
    for name in raw_names {
        if let Some(value) = raw_named_item(tag, name) {
            fields.insert(field_name.into(), json!(value));
            return;
        }
    }
    if let Some(value) = tag.get_string(&normalized_key) {
        let value = value.trim();
        if !value.is_empty() {
            fields.insert(field_name.into(), json!(value));
        }
    }
}

fn raw_named_item(tag: &Tag, name: &str) -> Option<String> {
    tag.items()
        .filter(|item| matches!(item.key(), ItemKey::Unknown(k) if k.eq_ignore_ascii_case(name)))
        .find_map(|item| {
            item.value().text().map(|s| TagValue::String(s.to_string())).and_then(|v| v.first_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_string_descends_into_nested_lists() {
        let value = TagValue::List(vec![
            TagValue::String(String::new()),
            TagValue::List(vec![TagValue::String("Artist Name".into())]),
        ]);
        assert_eq!(value.first_string(), Some("Artist Name".to_string()));
    }

    #[test]
    fn first_string_skips_blank_strings() {
        let value = TagValue::String("   ".into());
        assert_eq!(value.first_string(), None);
    }
}
