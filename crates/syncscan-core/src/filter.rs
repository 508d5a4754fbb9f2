//! Include/exclude filtering of relative item paths.

use std::fmt::Debug;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::ScanError;

/// Result of evaluating the directory filter.
///
/// The two flags are independent: a directory may be excluded itself
/// while some descendant could still be included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirFilterMatch {
    /// The directory itself passes the filter.
    pub passes: bool,
    /// Some item below this directory might still pass.
    pub child_item_might_match: bool,
}

impl DirFilterMatch {
    pub fn new(passes: bool, child_item_might_match: bool) -> Self {
        Self {
            passes,
            child_item_might_match,
        }
    }

    /// Neither the directory nor anything below it can pass.
    pub fn prunes(&self) -> bool {
        !self.passes && !self.child_item_might_match
    }
}

/// Filter applied to paths relative to the requested base folder.
///
/// Shared by all worker threads of a run; implementations must not rely
/// on interior mutability.
pub trait HardFilter: Send + Sync + Debug {
    /// Whether a file (or a symlink treated as a file) passes.
    fn pass_file_filter(&self, rel_path: &str) -> bool;

    /// Evaluate a directory.
    fn pass_dir_filter(&self, rel_path: &str) -> DirFilterMatch;
}

/// Filter letting everything pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFilter;

impl HardFilter for NullFilter {
    fn pass_file_filter(&self, _rel_path: &str) -> bool {
        true
    }

    fn pass_dir_filter(&self, _rel_path: &str) -> DirFilterMatch {
        DirFilterMatch::new(true, true)
    }
}

/// Glob based include/exclude filter.
///
/// An empty include list (or a lone `*`) includes everything. An excluded
/// directory takes its whole subtree with it.
#[derive(Debug, Clone)]
pub struct NameFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl NameFilter {
    /// Build a filter from include and exclude glob phrases.
    pub fn new<I, E>(include: I, exclude: E) -> Result<Self, ScanError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let include: Vec<String> = include
            .into_iter()
            .map(|p| normalize_phrase(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();

        let include = if include.is_empty() || include.iter().any(|p| p == "*") {
            None
        } else {
            Some(build_set(&include)?)
        };

        let exclude: Vec<String> = exclude
            .into_iter()
            .map(|p| normalize_phrase(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            include,
            exclude: build_set(&exclude)?,
        })
    }

    /// A phrase naming a folder covers everything below it.
    fn is_included(&self, rel_path: &str) -> bool {
        self.include
            .as_ref()
            .is_none_or(|set| self_and_parents(rel_path).any(|p| set.is_match(p)))
    }

    fn is_excluded(&self, rel_path: &str) -> bool {
        self_and_parents(rel_path).any(|p| self.exclude.is_match(p))
    }
}

impl HardFilter for NameFilter {
    fn pass_file_filter(&self, rel_path: &str) -> bool {
        self.is_included(rel_path) && !self.is_excluded(rel_path)
    }

    fn pass_dir_filter(&self, rel_path: &str) -> DirFilterMatch {
        if self.is_excluded(rel_path) {
            return DirFilterMatch::new(false, false);
        }
        // include patterns may still match something deeper down
        DirFilterMatch::new(self.is_included(rel_path), true)
    }
}

/// `a/b/c`, then `a`, then `a/b`.
fn self_and_parents(rel_path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(rel_path).chain(rel_path.match_indices('/').map(|(i, _)| &rel_path[..i]))
}

/// Strip leading separators and a trailing one so that `/build/` and
/// `build` address the same relative path.
fn normalize_phrase(phrase: &str) -> String {
    phrase.trim().trim_matches('/').to_string()
}

fn build_set(patterns: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
            message: format!("invalid filter pattern \"{pattern}\": {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScanError::InvalidConfig {
        message: e.to_string(),
    })
}
