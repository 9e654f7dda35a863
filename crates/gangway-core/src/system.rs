//! System-container filtering.
//!
//! Containers that belong to the platform itself are excluded from every
//! user-facing listing, regardless of caller identity. Membership is
//! decided by a fixed allow-list of images and names.

use crate::container::ContainerBrief;
use serde::{Deserialize, Serialize};

/// Fixed allow-lists identifying system-designated containers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemAllowList {
    /// Image references. A container matches on exact image equality or
    /// on equality with tags stripped from both sides.
    pub images: Vec<String>,

    /// Container names. A container matches when its first name, with the
    /// leading separator stripped, equals an entry exactly.
    pub names: Vec<String>,
}

impl SystemAllowList {
    /// Creates an allow-list from image and name entries.
    pub fn new(images: Vec<String>, names: Vec<String>) -> Self {
        Self { images, names }
    }

    /// Returns true when the container is system-designated.
    pub fn is_system(&self, brief: &ContainerBrief) -> bool {
        let image_matches = self.images.iter().any(|entry| {
            entry == &brief.image || strip_tag(entry) == strip_tag(&brief.image)
        });
        if image_matches {
            return true;
        }

        match brief.primary_name() {
            Some(name) => self.names.iter().any(|entry| entry == name),
            None => false,
        }
    }
}

/// Strips the tag from an image reference, leaving the repository.
///
/// A colon only counts as a tag separator after the last `/`, so registry
/// ports (`registry:5000/app`) are left intact.
fn strip_tag(image: &str) -> &str {
    let after_slash = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image.get(after_slash..).and_then(|rest| rest.find(':')) {
        Some(colon) => image.get(..after_slash + colon).unwrap_or(image),
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerId, ContainerState};

    fn brief(image: &str, names: &[&str]) -> ContainerBrief {
        ContainerBrief {
            id: ContainerId::new("c1"),
            names: names.iter().map(|n| n.to_string()).collect(),
            image: image.to_string(),
            state: ContainerState::Running,
            status: String::new(),
        }
    }

    #[test]
    fn test_strip_tag_plain() {
        assert_eq!(strip_tag("nginx:latest"), "nginx");
        assert_eq!(strip_tag("nginx"), "nginx");
    }

    #[test]
    fn test_strip_tag_registry_port() {
        assert_eq!(strip_tag("registry:5000/app"), "registry:5000/app");
        assert_eq!(strip_tag("registry:5000/app:v1"), "registry:5000/app");
    }

    #[test]
    fn test_image_exact_match() {
        let list = SystemAllowList::new(vec!["traefik:v3".to_string()], Vec::new());
        assert!(list.is_system(&brief("traefik:v3", &["/proxy"])));
    }

    #[test]
    fn test_image_tag_stripped_match() {
        // "registry/x/app:v2" is system when the list holds
        // "registry/x/app:latest" - tags are stripped on both sides.
        let list = SystemAllowList::new(vec!["registry/x/app:latest".to_string()], Vec::new());
        assert!(list.is_system(&brief("registry/x/app:v2", &["/app"])));
        assert!(!list.is_system(&brief("registry/x/other:v2", &["/other"])));
    }

    #[test]
    fn test_name_match_strips_separator() {
        let list = SystemAllowList::new(Vec::new(), vec!["gangway".to_string()]);
        assert!(list.is_system(&brief("some/image:1", &["/gangway"])));
        assert!(!list.is_system(&brief("some/image:1", &["/gangway-2"])));
    }

    #[test]
    fn test_only_first_name_considered() {
        let list = SystemAllowList::new(Vec::new(), vec!["hidden".to_string()]);
        assert!(!list.is_system(&brief("img", &["/visible", "/hidden"])));
    }

    #[test]
    fn test_nameless_container_not_system_by_name() {
        let list = SystemAllowList::new(Vec::new(), vec!["gangway".to_string()]);
        assert!(!list.is_system(&brief("img", &[])));
    }
}
