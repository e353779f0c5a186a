//! Maven repository layout for the analyzer jar.

use std::fmt;
use std::path::{Path, PathBuf};

/// `group:artifact:version` of a jar artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl MavenCoordinate {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            artifact_id: artifact_id.to_owned(),
            version: version.to_owned(),
        }
    }

    /// `<artifact>-<version>.jar`.
    pub fn filename(&self) -> String {
        format!("{}-{}.jar", self.artifact_id, self.version)
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.group_id
            .split('.')
            .chain([self.artifact_id.as_str(), self.version.as_str()])
    }

    /// Download URL of the jar in `repository`.
    pub fn to_url(&self, repository: &str) -> String {
        let mut url = repository.trim_end_matches('/').to_owned();
        for segment in self.segments() {
            url.push('/');
            url.push_str(segment);
        }
        url.push('/');
        url.push_str(&self.filename());
        url
    }

    /// Where the jar lives under a local cache mirroring the repository layout.
    pub fn cache_path(&self, cache_root: &Path) -> PathBuf {
        let mut path = cache_root.to_path_buf();
        path.extend(self.segments());
        path.join(self.filename())
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}
