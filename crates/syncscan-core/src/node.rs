//! Folder snapshot node types.

use std::collections::HashMap;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Backend-provided file identifier.
///
/// For local disks this is the (device, inode) pair; remote backends may
/// leave it empty when the protocol has no stable id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    /// Device ID.
    pub device: u64,
    /// Inode number (or backend equivalent).
    pub inode: u64,
}

impl FileId {
    /// Create a new file id.
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// Check whether the backend reported no identifier.
    pub fn is_empty(&self) -> bool {
        self.device == 0 && self.inode == 0
    }
}

/// Attributes recorded for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Last modification time in seconds since the unix epoch.
    pub mod_time: i64,
    /// File size in bytes.
    pub file_size: u64,
    /// Backend file identifier.
    pub file_id: FileId,
    /// Whether the file was reached through a followed symlink.
    pub is_followed_symlink: bool,
}

impl FileAttributes {
    /// Create new file attributes.
    pub fn new(mod_time: i64, file_size: u64, file_id: FileId, is_followed_symlink: bool) -> Self {
        Self {
            mod_time,
            file_size,
            file_id,
            is_followed_symlink,
        }
    }
}

/// Attributes recorded for a symlink that is not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAttributes {
    /// Modification time of the link itself.
    pub mod_time: i64,
}

impl LinkAttributes {
    pub fn new(mod_time: i64) -> Self {
        Self { mod_time }
    }
}

/// A child folder entry: its contents plus whether it was reached through
/// a followed symlink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubFolder {
    pub content: FolderContainer,
    pub is_followed_symlink: bool,
}

/// In-memory snapshot of one directory's contents.
///
/// Names are unique per kind; iteration order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderContainer {
    /// Files by name.
    pub files: HashMap<CompactString, FileAttributes>,
    /// Sub folders by name.
    pub folders: HashMap<CompactString, SubFolder>,
    /// Symlinks recorded as links (not followed) by name.
    pub links: HashMap<CompactString, LinkAttributes>,
}

impl FolderContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file. A later entry of the same name replaces the earlier one.
    pub fn add_sub_file(&mut self, name: impl Into<CompactString>, attr: FileAttributes) {
        self.files.insert(name.into(), attr);
    }

    /// Register a sub folder and return its container.
    ///
    /// An existing folder of the same name is reused so that a retried
    /// enumeration does not drop what was already collected.
    pub fn add_sub_folder(
        &mut self,
        name: impl Into<CompactString>,
        is_followed_symlink: bool,
    ) -> &mut FolderContainer {
        let entry = self.folders.entry(name.into()).or_default();
        entry.is_followed_symlink = is_followed_symlink;
        &mut entry.content
    }

    /// Record a symlink.
    pub fn add_sub_link(&mut self, name: impl Into<CompactString>, attr: LinkAttributes) {
        self.links.insert(name.into(), attr);
    }

    /// Check whether the container has no children at all.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty() && self.links.is_empty()
    }

    /// Total number of files, folders and links in this subtree.
    pub fn item_count(&self) -> u64 {
        let own = (self.files.len() + self.folders.len() + self.links.len()) as u64;
        own + self
            .folders
            .values()
            .map(|f| f.content.item_count())
            .sum::<u64>()
    }

    /// Sum of all file sizes in this subtree.
    pub fn total_file_size(&self) -> u64 {
        let own: u64 = self.files.values().map(|f| f.file_size).sum();
        own + self
            .folders
            .values()
            .map(|f| f.content.total_file_size())
            .sum::<u64>()
    }

    /// Look up a descendant folder by `/`-separated relative path.
    ///
    /// The empty path returns `self`.
    pub fn find_folder(&self, rel_path: &str) -> Option<&FolderContainer> {
        rel_path
            .split('/')
            .filter(|c| !c.is_empty())
            .try_fold(self, |cont, name| cont.folders.get(name).map(|f| &f.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub_folder_reuses_existing() {
        let mut root = FolderContainer::new();
        root.add_sub_folder("a", false)
            .add_sub_file("x.txt", FileAttributes::new(1, 2, FileId::default(), false));
        root.add_sub_folder("a", false);

        assert_eq!(root.folders.len(), 1);
        assert_eq!(root.find_folder("a").unwrap().files.len(), 1);
    }

    #[test]
    fn test_item_count_is_recursive() {
        let mut root = FolderContainer::new();
        root.add_sub_file("f", FileAttributes::new(0, 10, FileId::default(), false));
        root.add_sub_link("l", LinkAttributes::new(0));
        let sub = root.add_sub_folder("d", false);
        sub.add_sub_file("g", FileAttributes::new(0, 5, FileId::default(), false));

        assert_eq!(root.item_count(), 4);
        assert_eq!(root.total_file_size(), 15);
    }

    #[test]
    fn test_find_folder() {
        let mut root = FolderContainer::new();
        root.add_sub_folder("a", false).add_sub_folder("b", true);

        assert!(root.find_folder("").is_some());
        assert!(root.find_folder("a/b").is_some());
        assert!(root.find_folder("a/c").is_none());
    }
}
