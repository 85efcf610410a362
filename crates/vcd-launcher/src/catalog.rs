//! Application catalog
//!
//! Maps application keys to container images. Built once at startup and
//! shared read-only between requests.

use crate::config::LauncherConfig;
use std::collections::BTreeMap;

/// Immutable application key -> image reference map
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationCatalog {
    images: BTreeMap<String, String>,
}

impl ApplicationCatalog {
    /// Build a catalog where every key maps to `<image_prefix>-<key>:latest`
    pub fn new<I, S>(image_prefix: &str, applications: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let images = applications
            .into_iter()
            .map(|app| {
                let app: String = app.into();
                let image = image_reference(image_prefix, &app);
                (app, image)
            })
            .collect();
        Self { images }
    }

    pub fn from_config(config: &LauncherConfig) -> Self {
        Self::new(&config.image_prefix, config.applications.iter().cloned())
    }

    /// Image for an application, `None` when the key is unknown
    pub fn image(&self, application: &str) -> Option<&str> {
        self.images.get(application).map(String::as_str)
    }

    pub fn contains(&self, application: &str) -> bool {
        self.images.contains_key(application)
    }

    /// Known application keys in sorted order
    pub fn applications(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl Default for ApplicationCatalog {
    fn default() -> Self {
        Self::from_config(&LauncherConfig::default())
    }
}

fn image_reference(image_prefix: &str, application: &str) -> String {
    format!("{}-{}:latest", image_prefix, application)
}
