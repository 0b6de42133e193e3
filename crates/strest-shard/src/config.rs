//! Tunables for a [`crate::ShardManager`]: what service/entry it represents,
//! where it persists its router table, and which seed endpoints it bootstraps
//! from when no persisted table is found.

use std::path::PathBuf;

/// Configuration for a [`crate::ShardManager`], mirroring the
/// builder-with-`Default`-free-fields shape of `strest_client::ClientConfig`
/// (this one has no sensible defaults for `service_name`/`my_entry_id`, so
/// those are constructor arguments rather than builder calls).
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub service_name: String,
    pub my_entry_id: String,
    pub data_dir: Option<PathBuf>,
    pub seed_http_urls: Vec<String>,
}

impl ShardConfig {
    pub fn new(service_name: impl Into<String>, my_entry_id: impl Into<String>) -> Self {
        ShardConfig {
            service_name: service_name.into(),
            my_entry_id: my_entry_id.into(),
            data_dir: None,
            seed_http_urls: Vec::new(),
        }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn seed_http_urls(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.seed_http_urls = urls.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_data_dir_or_seeds() {
        let config = ShardConfig::new("svc", "self:1");
        assert!(config.data_dir.is_none());
        assert!(config.seed_http_urls.is_empty());
    }
}
