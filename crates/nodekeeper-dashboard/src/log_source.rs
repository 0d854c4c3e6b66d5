//! Log file discovery and tailing
//!
//! Clients write `<kind>_<datetime>.log` files under their `logs` directory
//! and start a new file on every launch. [`LogLocator`] picks the newest one;
//! [`LogCursor`] reads appended lines and follows the locator to newer files.

use nodekeeper_core::{ClientKind, NodeError, Result};
use regex::Regex;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Finds the most recently modified log file for a client
#[derive(Debug, Clone, Copy)]
pub struct LogLocator {
    retry: Duration,
}

impl LogLocator {
    pub fn new(retry: Duration) -> Self {
        Self { retry }
    }

    /// One directory scan; a missing directory counts as empty
    ///
    /// Ties on modification time go to the lexically greater name, which
    /// for timestamped names is the later one.
    pub fn scan(dir: &Path, kind: ClientKind) -> Result<Option<PathBuf>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(NodeError::LogLocator(format!(
                    "Failed to list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut newest: Option<(SystemTime, String, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !kind.matches_log_file(&name) {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let modified = metadata.modified()?;

            let is_newer = match &newest {
                None => true,
                Some((time, best, _)) => (modified, &name) > (*time, best),
            };
            if is_newer {
                newest = Some((modified, name, entry.path()));
            }
        }

        Ok(newest.map(|(_, _, path)| path))
    }

    /// Wait until a log file exists, then return the newest one
    ///
    /// Never gives up: a client that has not written its first log line
    /// yet is still starting. Scan errors are logged and retried.
    pub async fn find_latest(&self, dir: &Path, kind: ClientKind) -> PathBuf {
        loop {
            match Self::scan(dir, kind) {
                Ok(Some(path)) => {
                    info!(client = %kind, file = %path.display(), "Found log file");
                    return path;
                }
                Ok(None) => {
                    debug!(client = %kind, dir = %dir.display(), "No log file yet, retrying");
                }
                Err(e) => {
                    debug!(client = %kind, "Log scan failed, retrying: {}", e);
                }
            }
            tokio::time::sleep(self.retry).await;
        }
    }
}

/// Read position in the current log file of one client
#[derive(Debug, Clone)]
pub struct LogCursor {
    kind: ClientKind,
    dir: PathBuf,
    current: Option<PathBuf>,
    offset: u64,
}

impl LogCursor {
    pub fn new(kind: ClientKind, dir: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            dir: dir.into(),
            current: None,
            offset: 0,
        }
    }

    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Attach to an existing file, keeping only its last `backlog` bytes
    ///
    /// A line cut by the backlog boundary is skipped.
    pub fn attach_at_tail(&mut self, path: PathBuf, backlog: u64) -> Result<()> {
        let len = std::fs::metadata(&path)?.len();
        let mut offset = len.saturating_sub(backlog);

        if offset > 0 {
            let mut file = File::open(&path)?;
            file.seek(SeekFrom::Start(offset - 1))?;
            let mut rest = Vec::new();
            file.read_to_end(&mut rest)?;
            // Start right after the first newline at or past offset - 1
            offset = match rest.iter().position(|b| *b == b'\n') {
                Some(pos) => offset + pos as u64,
                None => len,
            };
        }

        debug!(client = %self.kind, file = %path.display(), offset, "Attached log cursor");
        self.current = Some(path);
        self.offset = offset;
        Ok(())
    }

    /// Follow a newer file from its start; returns whether the file changed
    pub fn follow(&mut self, latest: PathBuf) -> bool {
        if self.current.as_ref() == Some(&latest) {
            return false;
        }
        info!(client = %self.kind, file = %latest.display(), "Switching to newer log file");
        self.current = Some(latest);
        self.offset = 0;
        true
    }

    /// Re-resolve the newest file in this cursor's directory
    pub fn relocate(&mut self) -> Result<bool> {
        match LogLocator::scan(&self.dir, self.kind)? {
            Some(latest) => Ok(self.follow(latest)),
            None => Ok(false),
        }
    }

    /// Complete lines appended since the last read, ANSI escapes removed
    ///
    /// A trailing line without a newline is left for the next read. A file
    /// that shrank (truncated or replaced) is read again from the start.
    pub fn read_new_lines(&mut self) -> Result<Vec<String>> {
        let Some(path) = &self.current else {
            return Ok(Vec::new());
        };

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if len < self.offset {
            debug!(client = %self.kind, "Log file shrank, rereading from start");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut bytes = Vec::with_capacity((len - self.offset) as usize);
        file.read_to_end(&mut bytes)?;

        let Some(last_newline) = bytes.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &bytes[..=last_newline];
        self.offset += complete.len() as u64;

        Ok(complete
            .split(|b| *b == b'\n')
            .map(|raw| strip_ansi(String::from_utf8_lossy(raw).trim_end_matches('\r')))
            .filter(|line| !line.trim().is_empty())
            .collect())
    }
}

fn ansi_pattern() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").ok()
    })
    .as_ref()
}

/// Remove terminal escape sequences (colors, cursor movement, titles)
pub fn strip_ansi(line: &str) -> String {
    match ansi_pattern() {
        Some(pattern) => pattern.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(dir: &Path, name: &str, content: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        (&file).write_all(content.as_bytes()).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_scan_picks_newest_matching() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "geth_A.log", "", 100);
        let newer = write_log(dir.path(), "geth_B.log", "", 10);
        write_log(dir.path(), "reth_C.log", "", 0);
        write_log(dir.path(), "geth_D.txt", "", 0);

        let found = LogLocator::scan(dir.path(), ClientKind::Geth).unwrap();
        assert_eq!(found, Some(newer));
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let found = LogLocator::scan(&dir.path().join("logs"), ClientKind::Prysm).unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_find_latest_waits_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().to_path_buf();
        let locator = LogLocator::new(Duration::from_millis(20));

        let waiter = tokio::spawn(async move {
            locator.find_latest(&logs, ClientKind::Lighthouse).await
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!waiter.is_finished());

        let created = write_log(dir.path(), "lighthouse_2024.log", "", 0);
        let found = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
    }

    #[test]
    fn test_read_new_lines_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "geth_1.log", "first\nsecond\n", 0);

        let mut cursor = LogCursor::new(ClientKind::Geth, dir.path());
        cursor.attach_at_tail(path.clone(), 1 << 20).unwrap();
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["first", "second"]);
        assert!(cursor.read_new_lines().unwrap().is_empty());

        append(&path, "\x1b[32mINFO\x1b[0m third\npart");
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["INFO third"]);

        append(&path, "ial\n");
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["partial"]);
    }

    #[test]
    fn test_attach_at_tail_skips_cut_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "geth_1.log", "aaaaaaaaaa\nbbbb\ncccc\n", 0);

        let mut cursor = LogCursor::new(ClientKind::Geth, dir.path());
        cursor.attach_at_tail(path, 12).unwrap();
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["bbbb", "cccc"]);

        let path = write_log(dir.path(), "geth_2.log", "aaaaaaaaaa\nbbbb\ncccc\n", 0);
        cursor.attach_at_tail(path, 8).unwrap();
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["cccc"]);
    }

    #[test]
    fn test_truncated_file_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "prysm_1.log", "one\ntwo\n", 0);

        let mut cursor = LogCursor::new(ClientKind::Prysm, dir.path());
        cursor.attach_at_tail(path.clone(), 1 << 20).unwrap();
        cursor.read_new_lines().unwrap();

        std::fs::write(&path, "new\n").unwrap();
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["new"]);
    }

    #[test]
    fn test_relocate_switches_to_newer_file_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let old = write_log(dir.path(), "reth_1.log", "old\n", 60);

        let mut cursor = LogCursor::new(ClientKind::Reth, dir.path());
        cursor.attach_at_tail(old.clone(), 1 << 20).unwrap();
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["old"]);
        assert!(!cursor.relocate().unwrap());

        let newer = write_log(dir.path(), "reth_2.log", "fresh\n", 0);
        assert!(cursor.relocate().unwrap());
        assert_eq!(cursor.current_file(), Some(newer.as_path()));
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.read_new_lines().unwrap(), vec!["fresh"]);
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;31mERROR\x1b[0m boom"), "ERROR boom");
        assert_eq!(strip_ansi("\x1b]0;title\x07plain"), "plain");
        assert_eq!(strip_ansi("no escapes"), "no escapes");
    }
}
