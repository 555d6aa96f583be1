//! Minimal remote-API response bodies, matching the shapes `kemono_fetch::downloader` parses.

use serde_json::{json, Value};

/// A profile response reporting `post_count`.
pub fn profile_json(post_count: u64) -> Value {
    json!({ "post_count": post_count })
}

/// A single post summary as returned by the posts-listing endpoint.
pub fn post_summary_json(id: &str, title: &str, published: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "content": "",
        "published": published,
    })
}

/// A post summary carrying one principal file attachment.
pub fn post_with_file_json(id: &str, title: &str, published: &str, file_name: &str, file_path: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "content": "",
        "published": published,
        "file": { "name": file_name, "path": file_path },
    })
}
