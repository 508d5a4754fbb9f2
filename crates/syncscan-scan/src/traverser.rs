//! Per-directory traversal handler writing into the snapshot tree.

use std::collections::BTreeMap;

use syncscan_core::{
    AbstractPath, DirectoryValue, FILE_NAME_SEPARATOR, FileAttributes, FolderContainer,
    HardFilter, LinkAttributes, SymlinkHandling,
};

use crate::afs::{
    FileInfo, FileSystem, FolderInfo, HandleError, HandleLink, SymlinkInfo, TraverserCallback,
};
use crate::async_callback::{AsyncCallback, ReportThrottle};
use crate::cancel::{CancellationToken, Cancelled};
use crate::parallel_scan::ErrorDecision;

/// File name ending of the sync database kept next to synced folders.
pub const SYNC_DB_FILE_ENDING: &str = ".ffs_db";
/// File name ending of the lock file held during a sync.
pub const LOCK_FILE_ENDING: &str = ".ffs_lock";

/// Deepest level that may still spawn a child handler. Bounds the native
/// stack used by recursive backends.
pub const MAX_TRAVERSAL_LEVEL: usize = 100;

/// Settings shared by all levels of one folder's traversal.
pub struct TraverserConfig<'a, F> {
    pub base_folder_path: &'a AbstractPath,
    pub filter: &'a dyn HardFilter,
    pub handle_symlinks: SymlinkHandling,
    pub acb: &'a AsyncCallback,
    pub thread_idx: usize,
    /// Shared by all traversals of the worker thread.
    pub report_throttle: &'a ReportThrottle,
    pub cancel: &'a CancellationToken,
    pub fs: &'a F,
}

/// Handler for one directory level.
///
/// The base level is created with [`DirCallback::base`]; deeper levels are
/// handed out by [`TraverserCallback::on_folder`] and borrow their parent.
pub struct DirCallback<'a, F> {
    cfg: &'a TraverserConfig<'a, F>,
    /// Relative path of this level, postfixed with `/` (empty at the base).
    parent_rel_path_pf: String,
    output: &'a mut FolderContainer,
    failed_folder_reads: &'a mut BTreeMap<String, String>,
    failed_item_reads: &'a mut BTreeMap<String, String>,
    level: usize,
}

impl<'a, F: FileSystem> DirCallback<'a, F> {
    /// Handler for the requested base folder.
    pub fn base(cfg: &'a TraverserConfig<'a, F>, output: &'a mut DirectoryValue) -> Self {
        let callback = Self {
            cfg,
            parent_rel_path_pf: String::new(),
            output: &mut output.folder_cont,
            failed_folder_reads: &mut output.failed_folder_reads,
            failed_item_reads: &mut output.failed_item_reads,
            level: 0,
        };
        // the first directory access may block
        callback.report_current_item("");
        callback
    }

    fn report_current_item(&self, rel_path: &str) {
        let cfg = self.cfg;
        if cfg.acb.may_report_current_file(cfg.thread_idx, cfg.report_throttle) {
            let path = cfg.base_folder_path.append_rel_path(rel_path);
            cfg.acb.report_current_file(cfg.fs.display_path(&path));
        }
    }

    fn ask_error(&self, msg: &str, retry_number: usize) -> Result<ErrorDecision, Cancelled> {
        self.cfg.acb.report_error(msg, retry_number, self.cfg.cancel)
    }
}

fn is_sidecar_file(item_name: &str) -> bool {
    item_name.ends_with(SYNC_DB_FILE_ENDING) || item_name.ends_with(LOCK_FILE_ENDING)
}

/// Record an item error under `parent_rel_path_pf + item_name` on CONTINUE.
fn handle_item_error<F>(
    cfg: &TraverserConfig<'_, F>,
    failed_item_reads: &mut BTreeMap<String, String>,
    parent_rel_path_pf: &str,
    msg: &str,
    retry_number: usize,
    item_name: &str,
) -> Result<HandleError, Cancelled> {
    match cfg.acb.report_error(msg, retry_number, cfg.cancel)? {
        ErrorDecision::Continue => {
            failed_item_reads.insert(format!("{parent_rel_path_pf}{item_name}"), msg.to_string());
            Ok(HandleError::Continue)
        }
        ErrorDecision::Retry => Ok(HandleError::Retry),
    }
}

impl<'a, F: FileSystem> TraverserCallback for DirCallback<'a, F> {
    type Child<'b>
        = DirCallback<'b, F>
    where
        Self: 'b;

    fn on_file(&mut self, fi: &FileInfo) -> Result<(), Cancelled> {
        self.cfg.cancel.check()?;

        // never list sync databases or lock files
        if is_sidecar_file(&fi.item_name) {
            return Ok(());
        }

        let file_rel_path = format!("{}{}", self.parent_rel_path_pf, fi.item_name);

        // status is updated whether the item is excluded or not
        self.report_current_item(&file_rel_path);

        if !self.cfg.filter.pass_file_filter(&file_rel_path) {
            return Ok(());
        }

        self.output.add_sub_file(
            fi.item_name.clone(),
            FileAttributes::new(fi.mod_time, fi.file_size, fi.file_id, fi.is_followed_symlink),
        );
        self.cfg.acb.inc_items_scanned();
        Ok(())
    }

    fn on_folder(&mut self, fi: &FolderInfo) -> Result<Option<DirCallback<'_, F>>, Cancelled> {
        self.cfg.cancel.check()?;

        let folder_rel_path = format!("{}{}", self.parent_rel_path_pf, fi.item_name);

        self.report_current_item(&folder_rel_path);

        let dir_match = self.cfg.filter.pass_dir_filter(&folder_rel_path);
        if dir_match.prunes() {
            return Ok(None);
        }
        // a folder kept only because descendants might match is still
        // registered so they have a place to go, but is not counted

        let cfg = self.cfg;
        let sub_folder = self
            .output
            .add_sub_folder(fi.item_name.clone(), fi.is_followed_symlink);
        if dir_match.passes {
            cfg.acb.inc_items_scanned();
        }

        if self.level > MAX_TRAVERSAL_LEVEL {
            let msg = format!(
                "Cannot read directory \"{}\".\n\nEndless recursion.",
                cfg.fs
                    .display_path(&cfg.base_folder_path.append_rel_path(&folder_rel_path))
            );
            let mut retry_number = 0;
            while handle_item_error(
                cfg,
                self.failed_item_reads,
                &self.parent_rel_path_pf,
                &msg,
                retry_number,
                &fi.item_name,
            )? == HandleError::Retry
            {
                retry_number += 1;
            }
            return Ok(None);
        }

        let mut child_rel_path_pf = folder_rel_path;
        child_rel_path_pf.push(FILE_NAME_SEPARATOR);

        Ok(Some(DirCallback {
            cfg,
            parent_rel_path_pf: child_rel_path_pf,
            output: sub_folder,
            failed_folder_reads: &mut *self.failed_folder_reads,
            failed_item_reads: &mut *self.failed_item_reads,
            level: self.level + 1,
        }))
    }

    fn on_symlink(&mut self, si: &SymlinkInfo) -> Result<HandleLink, Cancelled> {
        self.cfg.cancel.check()?;

        let link_rel_path = format!("{}{}", self.parent_rel_path_pf, si.item_name);

        self.report_current_item(&link_rel_path);

        match self.cfg.handle_symlinks {
            SymlinkHandling::Exclude => Ok(HandleLink::Skip),

            SymlinkHandling::Direct => {
                // always the file filter: the link type is not stable on all platforms
                if self.cfg.filter.pass_file_filter(&link_rel_path) {
                    self.output
                        .add_sub_link(si.item_name.clone(), LinkAttributes::new(si.mod_time));
                    self.cfg.acb.inc_items_scanned();
                }
                Ok(HandleLink::Skip)
            }

            SymlinkHandling::Follow => {
                // target type is unknown yet: skip only if both filter variants agree
                if !self.cfg.filter.pass_file_filter(&link_rel_path)
                    && self.cfg.filter.pass_dir_filter(&link_rel_path).prunes()
                {
                    return Ok(HandleLink::Skip);
                }
                Ok(HandleLink::Follow)
            }
        }
    }

    fn report_dir_error(
        &mut self,
        msg: &str,
        retry_number: usize,
    ) -> Result<HandleError, Cancelled> {
        match self.ask_error(msg, retry_number)? {
            ErrorDecision::Continue => {
                let folder_rel_path = self
                    .parent_rel_path_pf
                    .strip_suffix(FILE_NAME_SEPARATOR)
                    .unwrap_or_default();
                self.failed_folder_reads
                    .insert(folder_rel_path.to_string(), msg.to_string());
                Ok(HandleError::Continue)
            }
            ErrorDecision::Retry => Ok(HandleError::Retry),
        }
    }

    fn report_item_error(
        &mut self,
        msg: &str,
        retry_number: usize,
        item_name: &str,
    ) -> Result<HandleError, Cancelled> {
        handle_item_error(
            self.cfg,
            self.failed_item_reads,
            &self.parent_rel_path_pf,
            msg,
            retry_number,
            item_name,
        )
    }
}
