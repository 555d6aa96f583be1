//! Predicate-based post filtering.
//!
//! Every predicate present in the merged [`FilterConfig`] must pass (AND across keys).
//! Absent keys do not constrain.

use crate::config::FilterConfig;
use crate::types::Post;

/// Evaluate `filter` against `post`. All present keys must pass.
pub fn apply_filters(post: &Post, filter: &FilterConfig) -> bool {
    let haystack = format!("{} {}", post.title, post.content_text());
    let haystack_lower = haystack.to_lowercase();
    let published_date = &post.published.format("%Y-%m-%d").to_string()[..];

    if let Some(keywords) = &filter.include_keywords {
        if !keywords.is_empty() && !any_keyword_present(&haystack_lower, keywords) {
            return false;
        }
    }

    if let Some(keywords) = &filter.exclude_keywords {
        if any_keyword_present(&haystack_lower, keywords) {
            return false;
        }
    }

    if let Some(keywords) = &filter.require_all_keywords {
        if !all_keywords_present(&haystack_lower, keywords) {
            return false;
        }
    }

    if filter.require_files == Some(true) && !has_files(post) {
        return false;
    }

    if filter.require_attachments == Some(true) && post.attachments.is_empty() {
        return false;
    }

    if let Some(after) = &filter.published_after {
        if published_date < after.as_str() {
            return false;
        }
    }

    if let Some(before) = &filter.published_before {
        if published_date > before.as_str() {
            return false;
        }
    }

    true
}

fn any_keyword_present(haystack_lower: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| haystack_lower.contains(&k.to_lowercase()))
}

fn all_keywords_present(haystack_lower: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .all(|k| haystack_lower.contains(&k.to_lowercase()))
}

fn has_files(post: &Post) -> bool {
    post.file.is_some() || !post.attachments.is_empty()
}

impl Post {
    /// Post content as plain text for keyword matching; empty string for an unfetched or
    /// empty sentinel.
    fn content_text(&self) -> &str {
        self.content.as_text().unwrap_or("")
    }
}

/// Merge an artist's filter overrides over the global filter, key-by-key (artist wins).
pub fn merge_filter_config(global: &FilterConfig, artist: &FilterConfig) -> FilterConfig {
    FilterConfig {
        include_keywords: artist
            .include_keywords
            .clone()
            .or_else(|| global.include_keywords.clone()),
        exclude_keywords: artist
            .exclude_keywords
            .clone()
            .or_else(|| global.exclude_keywords.clone()),
        require_all_keywords: artist
            .require_all_keywords
            .clone()
            .or_else(|| global.require_all_keywords.clone()),
        require_files: artist.require_files.or(global.require_files),
        require_attachments: artist.require_attachments.or(global.require_attachments),
        published_after: artist
            .published_after
            .clone()
            .or_else(|| global.published_after.clone()),
        published_before: artist
            .published_before
            .clone()
            .or_else(|| global.published_before.clone()),
    }
}
