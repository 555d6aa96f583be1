//! Deterministic, collision-aware rendering of artist/post/file paths, plus the sanitiser
//! every rendered path component is run through.
//!
//! The three rendering functions are pure: given the same parameters and template they always
//! produce the same string. Uniqueness across the whole corpus is not this module's job —
//! that's [`crate::validator`].

use crate::config::TemplateConfig;
use crate::plugin::PathHooks;
use crate::types::{Artist, FileRef, Post};
use chrono::{DateTime, NaiveTime, Utc};
use std::collections::HashMap;
use std::path::Path;

/// Parameters available to `format_artist_folder`.
#[derive(Clone, Debug)]
pub struct ArtistParams<'a> {
    /// `{service}`
    pub service: &'a str,
    /// `{name}`
    pub name: &'a str,
    /// `{alias}`, falls back to `name` when empty.
    pub alias: &'a str,
    /// `{user_id}`
    pub user_id: &'a str,
    /// `{last_date}`, truncated to its date prefix.
    pub last_date: Option<DateTime<Utc>>,
}

impl<'a> ArtistParams<'a> {
    /// Build params from an [`Artist`] record.
    pub fn from_artist(artist: &'a Artist) -> Self {
        Self {
            service: &artist.service,
            name: &artist.name,
            alias: &artist.alias,
            user_id: &artist.user_id,
            last_date: artist.last_date,
        }
    }
}

/// Render the artist folder name from `template`, substituting `{service}`, `{name}`,
/// `{alias}` (falling back to `name` if empty), `{user_id}`, and `{last_date}` (date-only).
pub fn format_artist_folder(params: &ArtistParams<'_>, template: &str) -> String {
    let alias = if params.alias.is_empty() {
        params.name
    } else {
        params.alias
    };
    let last_date = params
        .last_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let mut vars = HashMap::new();
    vars.insert("service", params.service.to_string());
    vars.insert("name", params.name.to_string());
    vars.insert("alias", alias.to_string());
    vars.insert("user_id", params.user_id.to_string());
    vars.insert("last_date", last_date);

    substitute_sanitized(template, &vars)
}

/// Parameters available to `format_post_folder`.
#[derive(Clone, Debug)]
pub struct PostFolderParams<'a> {
    /// `{id}`
    pub id: &'a str,
    /// `{user}`
    pub user: &'a str,
    /// `{service}`
    pub service: &'a str,
    /// `{title}`
    pub title: &'a str,
    /// `{published}`, reformatted per `date_format`.
    pub published: DateTime<Utc>,
}

impl<'a> PostFolderParams<'a> {
    /// Build params from a [`Post`] record.
    pub fn from_post(post: &'a Post) -> Self {
        Self {
            id: &post.id,
            user: &post.user,
            service: &post.service,
            title: &post.title,
            published: post.published,
        }
    }
}

/// Render the post folder name, reformatting `published` with `date_format` (`strftime`
/// syntax). `published` is always a valid instant here since [`Post::published`] is typed,
/// so the "first ten characters" fallback from the source only matters when callers format a
/// raw/untyped timestamp string — exposed via [`format_date_str`] for that case.
pub fn format_post_folder(params: &PostFolderParams<'_>, template: &str, date_format: &str) -> String {
    let published = params.published.format(date_format).to_string();

    let mut vars = HashMap::new();
    vars.insert("id", params.id.to_string());
    vars.insert("user", params.user.to_string());
    vars.insert("service", params.service.to_string());
    vars.insert("title", params.title.to_string());
    vars.insert("published", published);

    substitute_sanitized(template, &vars)
}

/// Reformat a raw, possibly-malformed ISO-8601 timestamp string with `date_format`, falling
/// back to the first ten characters (`YYYY-MM-DD`) on any parse failure. Ported from the
/// source's `_format_date`, used when a date string arrives untyped (e.g. from an external
/// plugin hook or a legacy cache record) rather than as a parsed [`DateTime`].
pub fn format_date_str(raw: &str, date_format: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc).format(date_format).to_string(),
        Err(_) => raw.chars().take(10).collect(),
    }
}

/// Parameters available to `format_file_name`.
#[derive(Clone, Debug)]
pub struct FileNameParams<'a> {
    /// `{idx}` — raw counter value, unpadded.
    pub idx: usize,
    /// `{name}` / `{filename}` — original file name.
    pub name: &'a str,
}

/// Render a single file name from `template`, substituting `{idx}`, `{index}` (zero-padded to
/// width 3), `{name}`, and `{filename}`. If the rendered name has no extension but the
/// original did, the original's extension is appended.
pub fn format_file_name(params: &FileNameParams<'_>, template: &str) -> String {
    let mut vars = HashMap::new();
    vars.insert("idx", params.idx.to_string());
    vars.insert("index", format!("{:03}", params.idx));
    vars.insert("name", params.name.to_string());
    vars.insert("filename", params.name.to_string());

    let rendered = substitute_sanitized(template, &vars);
    let original_ext = Path::new(params.name).extension().and_then(|e| e.to_str());
    let rendered_has_ext = Path::new(&rendered).extension().is_some();

    match (rendered_has_ext, original_ext) {
        (false, Some(ext)) => format!("{rendered}.{ext}"),
        _ => rendered,
    }
}

/// Drive per-file formatting for an ordered list of originals with two counters: a global
/// index `i` and an image-only index `j`. If `rename_images_only` is set and a file's
/// extension is not in `image_extensions`, the sanitised original name is emitted unchanged;
/// otherwise the file is rendered via `format_file_name` using `j` (image-only mode, image
/// file) or `i` (otherwise). `j` only advances when the current file is an image.
pub fn format_files_names(
    originals: &[FileRef],
    template: &str,
    rename_images_only: bool,
    image_extensions: &[String],
) -> Vec<String> {
    let mut i = 0usize;
    let mut j = 0usize;
    let mut out = Vec::with_capacity(originals.len());

    for file in originals {
        let is_image = extension_of(&file.name)
            .map(|ext| image_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false);

        if rename_images_only && !is_image {
            out.push(sanitize(&file.name));
            i += 1;
            continue;
        }

        let idx = if rename_images_only && is_image { j } else { i };
        let rendered = format_file_name(
            &FileNameParams {
                idx,
                name: &file.name,
            },
            template,
        );
        out.push(rendered);

        if is_image {
            j += 1;
        }
        i += 1;
    }

    out
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Substitute `{key}` placeholders in `template` from `vars`, sanitising every substituted
/// value first. Unknown placeholders are left verbatim (never a hard error — §4.3 says the
/// sanitiser, and by extension the renderer, never throws).
fn substitute_sanitized(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let key = &template[i + 1..i + end];
                if let Some(value) = vars.get(key) {
                    out.push_str(&sanitize(value));
                    i += end + 1;
                    continue;
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Apply a named path hook (if `hooks` provides one) around `format_artist_folder`.
pub fn format_artist_folder_hooked(
    params: &ArtistParams<'_>,
    template: &str,
    hooks: &dyn PathHooks,
) -> String {
    let rendered = format_artist_folder(params, template);
    hooks.rewrite_artist_path(params.user_id, rendered)
}

/// Apply a named path hook (if `hooks` provides one) around `format_post_folder`.
pub fn format_post_folder_hooked(
    params: &PostFolderParams<'_>,
    template: &str,
    date_format: &str,
    hooks: &dyn PathHooks,
) -> String {
    let rendered = format_post_folder(params, template, date_format);
    hooks.rewrite_post_path(params.id, rendered)
}

/// Windows-forbidden characters and their full-width Unicode analogues, in substitution
/// order.
const FORBIDDEN_REPLACEMENTS: &[(char, char)] = &[
    ('/', '／'),
    ('\\', '＼'),
    (':', '：'),
    ('*', '＊'),
    ('?', '？'),
    ('"', '＂'),
    ('<', '＜'),
    ('>', '＞'),
    ('|', '｜'),
];

/// Sanitise a single string for use as a path component.
///
/// Strips ASCII control characters and zero-width/direction-mark code points, normalises
/// several Unicode space variants (plus tab/CR/LF) to a single ASCII space, collapses runs of
/// spaces, strips leading/trailing spaces and dots, then replaces each of
/// `/ \ : * ? " < > |` with its full-width analogue. An empty result becomes `"unknown"`.
/// Never panics.
pub fn sanitize(input: &str) -> String {
    let mut collapsed = String::with_capacity(input.len());
    let mut last_was_space = false;

    for ch in input.chars() {
        if is_zero_width_or_direction_mark(ch) {
            continue;
        }
        if ch.is_control() {
            continue;
        }
        if is_space_like(ch) {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
            continue;
        }
        collapsed.push(ch);
        last_was_space = false;
    }

    let trimmed = collapsed.trim_matches(|c: char| c == ' ' || c == '.');

    let mut replaced = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let mapped = FORBIDDEN_REPLACEMENTS
            .iter()
            .find(|(from, _)| *from == ch)
            .map(|(_, to)| *to)
            .unwrap_or(ch);
        replaced.push(mapped);
    }

    if replaced.is_empty() {
        "unknown".to_string()
    } else {
        replaced
    }
}

fn is_zero_width_or_direction_mark(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}'..='\u{200F}' | '\u{FEFF}' | '\u{2060}' | '\u{061C}'
    )
}

fn is_space_like(ch: char) -> bool {
    matches!(
        ch,
        ' ' | '\t'
            | '\r'
            | '\n'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200A}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
    )
}

/// `serde(with = ...)` helper for `HH:MM` `NaiveTime` fields, used by [`crate::types::TimerSchedule`].
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom)
    }
}

/// Exposed for callers that need to validate a `TemplateConfig` without rendering anything.
pub fn validate_templates(templates: &TemplateConfig) -> Result<(), String> {
    for (name, template) in [
        ("artist_folder", &templates.artist_folder),
        ("post_folder", &templates.post_folder),
        ("file_name", &templates.file_name),
    ] {
        if template.trim().is_empty() {
            return Err(format!("{name} template must not be empty"));
        }
    }
    Ok(())
}
