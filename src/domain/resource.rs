use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unique identifier for a configured resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Kind of managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Service,
    Directory,
}

/// A managed resource as described by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ResourceKind,
    /// Service unit name for services, filesystem path for directories
    pub location: String,
    #[serde(default)]
    pub installable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
}

impl ResourceConfig {
    pub fn service(id: impl Into<ResourceId>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind: ResourceKind::Service,
            location: unit.into(),
            installable: false,
            install_path: None,
        }
    }

    pub fn directory(id: impl Into<ResourceId>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind: ResourceKind::Directory,
            location: path.into(),
            installable: false,
            install_path: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.installable = true;
        self.install_path = Some(path.into());
        self
    }

    pub fn is_service(&self) -> bool {
        matches!(self.kind, ResourceKind::Service)
    }

    /// Directory that `install` writes into, if the resource has one.
    ///
    /// Directories fall back to their own location; services need an
    /// explicit `install_path`.
    pub fn install_dir(&self) -> Option<PathBuf> {
        if !self.installable {
            return None;
        }
        match (&self.install_path, self.kind) {
            (Some(path), _) => Some(path.clone()),
            (None, ResourceKind::Directory) => Some(PathBuf::from(&self.location)),
            (None, ResourceKind::Service) => None,
        }
    }
}

/// A file to be written into a resource's install directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl InstallFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// True when the name is a single path component (no separators, no `..`)
    pub fn has_plain_name(&self) -> bool {
        let name = self.name.as_str();
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\\')
            && !name.contains('\0')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_dir_for_directory_defaults_to_location() {
        let mut dir = ResourceConfig::directory("kiosk", "Kiosk Web", "/srv/kiosk");
        assert_eq!(dir.install_dir(), None);

        dir.installable = true;
        assert_eq!(dir.install_dir(), Some(PathBuf::from("/srv/kiosk")));
    }

    #[test]
    fn test_install_dir_for_service_requires_explicit_path() {
        let mut svc = ResourceConfig::service("report", "Report Service", "report.service");
        svc.installable = true;
        assert_eq!(svc.install_dir(), None);

        let svc = svc.with_install_path("/opt/report");
        assert_eq!(svc.install_dir(), Some(PathBuf::from("/opt/report")));
    }

    #[test]
    fn test_plain_file_names() {
        assert!(InstallFile::new("app.dll", vec![]).has_plain_name());
        assert!(!InstallFile::new("../etc/passwd", vec![]).has_plain_name());
        assert!(!InstallFile::new("bin/app", vec![]).has_plain_name());
        assert!(!InstallFile::new("..", vec![]).has_plain_name());
        assert!(!InstallFile::new("", vec![]).has_plain_name());
    }
}
