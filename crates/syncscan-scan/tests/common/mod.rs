//! In-memory backend and helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use syncscan_scan::{
    AbstractPath, DirFilterMatch, ErrorDecision, FileId, FileInfo, FileSystem, FolderInfo,
    HandleError, HandleLink, HardFilter, PathComponents, ScanError, SymlinkInfo,
    TraverserCallback, TraverserWorkload,
};

pub const SCHEME: &str = "mem://";

/// A node of the synthetic tree.
#[derive(Debug, Clone)]
pub enum MemNode {
    File { size: u64 },
    Dir(BTreeMap<String, MemNode>),
    /// Symlink resolving to the boxed node; `None` is a broken link.
    Link(Option<Box<MemNode>>),
    /// Item whose attributes fail `failures` times, then read as `then`.
    FlakyItem { failures: usize, then: Box<MemNode> },
    /// Directory whose listing fails `failures` times, then lists `then`.
    FlakyDir {
        failures: usize,
        then: BTreeMap<String, MemNode>,
    },
}

pub fn file(size: u64) -> MemNode {
    MemNode::File { size }
}

pub fn dir<const N: usize>(children: [(&str, MemNode); N]) -> MemNode {
    MemNode::Dir(
        children
            .into_iter()
            .map(|(name, node)| (name.to_string(), node))
            .collect(),
    )
}

/// `depth` folders nested into each other: `d1/d2/.../d{depth}`.
pub fn nested(depth: usize) -> MemNode {
    (1..=depth).rev().fold(dir([]), |inner, i| {
        let mut children = BTreeMap::new();
        children.insert(format!("d{i}"), inner);
        MemNode::Dir(children)
    })
}

/// Backend serving trees from memory, one tree per storage root.
///
/// Paths look like `mem://<root>/<rel/path>`.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    roots: BTreeMap<String, MemNode>,
    /// Pause before reporting each item.
    pub item_delay: Option<Duration>,
    /// Every event delivered to a handler, e.g. `file:a/b.txt`.
    pub events: Mutex<Vec<String>>,
    /// (root, thread, parallel_ops) per traversal call.
    pub traversals: Mutex<Vec<(String, ThreadId, usize)>>,
    /// Names of the threads that ran a traversal.
    pub thread_names: Mutex<HashSet<String>>,
    /// Number of `display_path` calls, i.e. published current-item paths.
    pub display_calls: AtomicUsize,
    /// Traversal of this root panics.
    pub panic_on_root: Option<String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: &str, tree: MemNode) -> Self {
        self.roots.insert(root.to_string(), tree);
        self
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.item_delay = Some(delay);
        self
    }

    pub fn with_panic_on_root(mut self, root: &str) -> Self {
        self.panic_on_root = Some(root.to_string());
        self
    }

    pub fn display_calls(&self) -> usize {
        self.display_calls.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn lookup(&self, root: &str, rel_path: &str) -> Option<&BTreeMap<String, MemNode>> {
        let mut node = self.roots.get(root)?;
        for name in rel_path.split('/').filter(|c| !c.is_empty()) {
            node = match node {
                MemNode::Dir(children) => children.get(name)?,
                MemNode::FlakyDir { then, .. } => then.get(name)?,
                _ => return None,
            };
        }
        match node {
            MemNode::Dir(children) => Some(children),
            MemNode::FlakyDir { then, .. } => Some(then),
            _ => None,
        }
    }

    fn walk<C: TraverserCallback>(
        &self,
        children: &BTreeMap<String, MemNode>,
        rel_path: &str,
        callback: &mut C,
    ) -> Result<(), syncscan_scan::Cancelled> {
        for (name, node) in children {
            if let Some(delay) = self.item_delay {
                std::thread::sleep(delay);
            }
            self.visit(name, node, rel_path, false, callback)?;
        }
        Ok(())
    }

    fn visit<C: TraverserCallback>(
        &self,
        name: &str,
        node: &MemNode,
        parent_rel_path: &str,
        is_followed_symlink: bool,
        callback: &mut C,
    ) -> Result<(), syncscan_scan::Cancelled> {
        let rel_path = join(parent_rel_path, name);
        match node {
            MemNode::File { size } => {
                self.log(format!("file:{rel_path}"));
                callback.on_file(&FileInfo {
                    item_name: name.into(),
                    file_size: *size,
                    mod_time: 1_700_000_000,
                    file_id: FileId::new(1, *size),
                    is_followed_symlink,
                })
            }
            MemNode::Dir(children) => {
                self.log(format!("folder:{rel_path}"));
                let fi = FolderInfo {
                    item_name: name.into(),
                    is_followed_symlink,
                };
                if let Some(mut child) = callback.on_folder(&fi)? {
                    self.walk(children, &rel_path, &mut child)?;
                }
                Ok(())
            }
            MemNode::Link(target) => {
                self.log(format!("link:{rel_path}"));
                let si = SymlinkInfo {
                    item_name: name.into(),
                    mod_time: 1_600_000_000,
                };
                match callback.on_symlink(&si)? {
                    HandleLink::Skip => Ok(()),
                    HandleLink::Follow => {
                        self.log(format!("follow:{rel_path}"));
                        match target {
                            Some(target) => {
                                self.visit(name, target, parent_rel_path, true, callback)
                            }
                            None => {
                                let mut retry_number = 0;
                                while callback.report_item_error(
                                    &format!("Cannot resolve symbolic link \"{rel_path}\"."),
                                    retry_number,
                                    name,
                                )? == HandleError::Retry
                                {
                                    retry_number += 1;
                                }
                                Ok(())
                            }
                        }
                    }
                }
            }
            MemNode::FlakyItem { failures, then } => {
                let mut retry_number = 0;
                while retry_number < *failures {
                    self.log(format!("item-error:{rel_path}#{retry_number}"));
                    match callback.report_item_error(
                        &format!("Cannot read file attributes of \"{rel_path}\"."),
                        retry_number,
                        name,
                    )? {
                        HandleError::Retry => retry_number += 1,
                        HandleError::Continue => return Ok(()),
                    }
                }
                self.visit(name, then, parent_rel_path, is_followed_symlink, callback)
            }
            MemNode::FlakyDir { failures, then } => {
                self.log(format!("folder:{rel_path}"));
                let fi = FolderInfo {
                    item_name: name.into(),
                    is_followed_symlink,
                };
                let Some(mut child) = callback.on_folder(&fi)? else {
                    return Ok(());
                };
                let mut retry_number = 0;
                while retry_number < *failures {
                    self.log(format!("dir-error:{rel_path}#{retry_number}"));
                    match child.report_dir_error(
                        &format!("Cannot read directory \"{rel_path}\"."),
                        retry_number,
                    )? {
                        HandleError::Retry => retry_number += 1,
                        HandleError::Continue => return Ok(()),
                    }
                }
                self.walk(then, &rel_path, &mut child)
            }
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn path_components(&self, path: &AbstractPath) -> PathComponents {
        let rest = path.as_str().trim_start_matches(SCHEME);
        let (root, rel_path) = rest.split_once('/').unwrap_or((rest, ""));
        PathComponents::new(AbstractPath::new(format!("{SCHEME}{root}")), rel_path)
    }

    fn display_path(&self, path: &AbstractPath) -> String {
        self.display_calls.fetch_add(1, Ordering::Relaxed);
        path.to_string()
    }

    fn traverse_folder_parallel<C: TraverserCallback>(
        &self,
        root: &AbstractPath,
        workload: TraverserWorkload<C>,
        parallel_ops: usize,
    ) -> Result<(), syncscan_scan::Cancelled> {
        let root = root.as_str().trim_start_matches(SCHEME).to_string();
        if self.panic_on_root.as_deref() == Some(root.as_str()) {
            panic!("traversal of {root} blew up");
        }
        let current = std::thread::current();
        self.traversals
            .lock()
            .unwrap()
            .push((root.clone(), current.id(), parallel_ops));
        if let Some(name) = current.name() {
            self.thread_names.lock().unwrap().insert(name.to_string());
        }

        for (rel_path, mut callback) in workload {
            match self.lookup(&root, &rel_path) {
                Some(children) => self.walk(children, &rel_path, &mut callback)?,
                None => {
                    let mut retry_number = 0;
                    while callback.report_dir_error(
                        &format!("Cannot read directory \"{rel_path}\"."),
                        retry_number,
                    )? == HandleError::Retry
                    {
                        retry_number += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Filter with explicit per-path rules; everything else passes.
#[derive(Debug, Default)]
pub struct RuleFilter {
    pub excluded_files: HashSet<String>,
    pub dir_rules: HashMap<String, DirFilterMatch>,
}

impl RuleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude_file(mut self, rel_path: &str) -> Self {
        self.excluded_files.insert(rel_path.to_string());
        self
    }

    pub fn dir_rule(mut self, rel_path: &str, passes: bool, child_item_might_match: bool) -> Self {
        self.dir_rules.insert(
            rel_path.to_string(),
            DirFilterMatch::new(passes, child_item_might_match),
        );
        self
    }
}

impl HardFilter for RuleFilter {
    fn pass_file_filter(&self, rel_path: &str) -> bool {
        !self.excluded_files.contains(rel_path)
    }

    fn pass_dir_filter(&self, rel_path: &str) -> DirFilterMatch {
        self.dir_rules
            .get(rel_path)
            .copied()
            .unwrap_or(DirFilterMatch::new(true, true))
    }
}

/// Callback answering every error the same way and recording everything.
#[derive(Debug)]
pub struct ScriptedCallback {
    /// Answer for an error, given its retry number.
    pub decide: fn(usize) -> ErrorDecision,
    pub errors: Vec<(String, usize)>,
    pub statuses: Vec<(String, u64)>,
    /// Abort on this status call (1-based).
    pub abort_on_status: Option<usize>,
    /// When the abort was handed to the scan.
    pub aborted_at: Option<Instant>,
}

impl ScriptedCallback {
    pub fn continuing() -> Self {
        Self {
            decide: |_| ErrorDecision::Continue,
            errors: Vec::new(),
            statuses: Vec::new(),
            abort_on_status: None,
            aborted_at: None,
        }
    }

    pub fn deciding(decide: fn(usize) -> ErrorDecision) -> Self {
        Self {
            decide,
            ..Self::continuing()
        }
    }

    pub fn final_count(&self) -> u64 {
        self.statuses.last().map(|(_, count)| *count).unwrap_or(0)
    }
}

impl syncscan_scan::FillBufferCallback for ScriptedCallback {
    fn report_status(&mut self, status_msg: &str, items_scanned: u64) -> Result<(), ScanError> {
        self.statuses.push((status_msg.to_string(), items_scanned));
        if self.abort_on_status == Some(self.statuses.len()) {
            self.aborted_at = Some(Instant::now());
            return Err(ScanError::aborted("stopped by test"));
        }
        Ok(())
    }

    fn report_error(
        &mut self,
        msg: &str,
        retry_number: usize,
    ) -> Result<ErrorDecision, ScanError> {
        self.errors.push((msg.to_string(), retry_number));
        Ok((self.decide)(retry_number))
    }
}
