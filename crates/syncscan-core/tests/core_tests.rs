use std::collections::BTreeSet;
use std::sync::Arc;

use syncscan_core::{
    AbstractPath, DirectoryKey, DirectoryValue, FileAttributes, FileId, FolderContainer,
    HardFilter, LinkAttributes, NameFilter, NullFilter, ScanConfig, SymlinkHandling,
};

#[test]
fn test_directory_keys_in_set() {
    let filter: Arc<dyn HardFilter> = Arc::new(NullFilter);

    let mut keys = BTreeSet::new();
    keys.insert(DirectoryKey::new("/b", filter.clone(), SymlinkHandling::Exclude));
    keys.insert(DirectoryKey::new("/a", filter.clone(), SymlinkHandling::Exclude));
    keys.insert(DirectoryKey::new("/a", filter.clone(), SymlinkHandling::Exclude));
    keys.insert(DirectoryKey::new("/a", filter, SymlinkHandling::Follow));

    assert_eq!(keys.len(), 3);
    let paths: Vec<&str> = keys.iter().map(|k| k.folder_path.as_str()).collect();
    assert_eq!(paths, vec!["/a", "/a", "/b"]);
}

#[test]
fn test_folder_container_snapshot() {
    let mut root = FolderContainer::new();
    root.add_sub_file(
        "readme.md",
        FileAttributes::new(1_700_000_000, 512, FileId::new(1, 2), false),
    );
    root.add_sub_link("current", LinkAttributes::new(1_700_000_001));

    let src = root.add_sub_folder("src", false);
    src.add_sub_file("main.rs", FileAttributes::new(1_700_000_002, 1024, FileId::default(), false));
    src.add_sub_folder("linked", true);

    assert_eq!(root.item_count(), 5);
    assert_eq!(root.total_file_size(), 1536);
    assert!(root.folders["src"].content.folders["linked"].is_followed_symlink);
    assert!(root.find_folder("src/linked").unwrap().is_empty());
}

#[test]
fn test_directory_value_failures() {
    let mut value = DirectoryValue::new();
    assert!(!value.has_failures());

    value
        .failed_item_reads
        .insert("a/b.txt".to_string(), "access denied".to_string());
    assert!(value.has_failures());
}

#[test]
fn test_directory_value_serializes() {
    let mut value = DirectoryValue::new();
    value
        .folder_cont
        .add_sub_file("x", FileAttributes::new(0, 3, FileId::default(), false));
    value
        .failed_folder_reads
        .insert(String::new(), "cannot read".to_string());

    let json = serde_json::to_string(&value).unwrap();
    assert!(json.contains("\"file_size\":3"));
    assert!(json.contains("cannot read"));
}

#[test]
fn test_config_filter_roundtrip() {
    let config = ScanConfig::builder()
        .folders(vec!["/data".to_string()])
        .exclude_patterns(vec!["*.log".to_string(), "/cache/".to_string()])
        .build()
        .unwrap();

    let filter = config.build_filter().unwrap();
    assert!(filter.pass_file_filter("src/lib.rs"));
    assert!(!filter.pass_file_filter("logs/app.log"));
    assert!(filter.pass_dir_filter("cache").prunes());
}

#[test]
fn test_name_filter_include_and_exclude() {
    let filter = NameFilter::new(["photos/**"], ["photos/tmp"]).unwrap();

    assert!(filter.pass_file_filter("photos/2024/a.jpg"));
    assert!(!filter.pass_file_filter("music/a.mp3"));

    let music = filter.pass_dir_filter("music");
    assert!(!music.passes && music.child_item_might_match);
    assert!(filter.pass_dir_filter("photos/tmp").prunes());
}

#[test]
fn test_abstract_path_display() {
    let path = AbstractPath::new("/srv/share").append_rel_path("dir/file");
    assert_eq!(path.to_string(), "/srv/share/dir/file");
}
