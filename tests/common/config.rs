//! Build a [`kemono_fetch::Config`] rooted at fresh temp directories, for integration tests.

use kemono_fetch::Config;
use std::path::Path;

/// A default config pointed at `download_dir`, with `base_url` set to a wiremock server's URI.
pub fn test_config(base_url: &str, download_dir: &Path) -> Config {
    let mut config = Config::default();
    config.base_url = base_url.to_string();
    config.download.download_dir = download_dir.to_path_buf();
    config.download.save_empty_posts = true;
    config
}
