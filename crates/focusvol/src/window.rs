use std::path::{Path, PathBuf};

use focusvol_core::audio::{ProcessId, WindowSource};
use tokio::sync::watch;

/// Window queries backed by the KWin focus tracker and `/proc`.
pub struct FocusedWindow {
    focused: watch::Receiver<Option<ProcessId>>,
    proc_root: PathBuf,
}

impl FocusedWindow {
    pub fn new(focused: watch::Receiver<Option<ProcessId>>) -> Self {
        FocusedWindow {
            focused,
            proc_root: PathBuf::from("/proc"),
        }
    }

    #[cfg(test)]
    fn with_proc_root(mut self, root: &Path) -> Self {
        self.proc_root = root.to_owned();
        self
    }
}

impl WindowSource for FocusedWindow {
    fn foreground_process_id(&self) -> Option<ProcessId> {
        *self.focused.borrow()
    }

    fn executable_basename(&self, pid: ProcessId) -> Option<String> {
        process_basename(&self.proc_root, pid)
    }
}

/// Executable name of `pid`: the `exe` link target, else `comm`.
///
/// `exe` is unreadable for other users' processes; `comm` is truncated to
/// 15 bytes but always readable.
fn process_basename(proc_root: &Path, pid: ProcessId) -> Option<String> {
    let dir = proc_root.join(pid.0.to_string());

    if let Ok(target) = std::fs::read_link(dir.join("exe")) {
        if let Some(name) = target.file_name().and_then(|n| n.to_str()) {
            // Replaced binaries keep running as "name (deleted)".
            let name = name.strip_suffix(" (deleted)").unwrap_or(name);
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    let comm = std::fs::read_to_string(dir.join("comm")).ok()?;
    Some(comm.trim_end().to_string()).filter(|s| !s.is_empty())
}
