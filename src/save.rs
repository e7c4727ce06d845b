//! Persistence of completed sessions.
//!
//! One save produces three artifacts under the data directory:
//!
//! | Artifact | Path | Semantics |
//! |----------|------|-----------|
//! | Snapshot | `snapshots/tabs_{YYYY-MM-DD}.json` | same-day saves append records |
//! | Markdown mirror | `markdown/tabs_{YYYY-MM-DD}.md` | appended |
//! | Ledger | [`Ledger::path`] (default `all_tabs.md`) | appended, never rewritten |
//!
//! The snapshot is written to a temporary file and renamed into place so a
//! crash never leaves a half-written JSON document behind.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::SaveError;
use crate::models::{CaptureSession, Tab, UNCATEGORIZED};

/// On-disk layout of one day's snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub updated_at: DateTime<Utc>,
    pub tabs: Vec<Tab>,
}

/// Where a save landed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub snapshot_path: Option<PathBuf>,
    pub markdown_path: Option<PathBuf>,
    pub ledger_appended: usize,
}

/// Handle to the cumulative markdown ledger.
///
/// The file is opened in append mode for each write and closed right after;
/// nothing here ever truncates it.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.ledger_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one block per tab. Returns the number of blocks written.
    pub fn append(&self, tabs: &[Tab]) -> Result<usize, SaveError> {
        if tabs.is_empty() {
            return Ok(0);
        }
        append_blocks(&self.path, tabs)?;
        Ok(tabs.len())
    }

    /// Read every block back. A missing ledger reads as empty.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, SaveError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(parse_ledger(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(SaveError::io(&self.path, e)),
        }
    }
}

/// Writes sessions beneath a data directory.
pub struct TabSaver {
    data_dir: PathBuf,
}

impl TabSaver {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.data_dir.clone())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join("snapshots")
            .join(format!("tabs_{}.json", date.format("%Y-%m-%d")))
    }

    pub fn markdown_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join("markdown")
            .join(format!("tabs_{}.md", date.format("%Y-%m-%d")))
    }

    /// Persist a session: snapshot, then markdown mirror, then ledger.
    ///
    /// An empty session writes nothing.
    pub fn save(&self, session: &CaptureSession, ledger: &Ledger) -> Result<SaveOutcome, SaveError> {
        if session.is_empty() {
            return Ok(SaveOutcome::default());
        }

        let date = session.started_at.date_naive();

        let snapshot_path = self.snapshot_path(date);
        self.write_snapshot(&snapshot_path, date, &session.tabs)?;

        let markdown_path = self.markdown_path(date);
        append_blocks(&markdown_path, &session.tabs)?;

        let ledger_appended = ledger.append(&session.tabs)?;

        tracing::debug!(
            tabs = session.len(),
            snapshot = %snapshot_path.display(),
            "session saved"
        );

        Ok(SaveOutcome {
            snapshot_path: Some(snapshot_path),
            markdown_path: Some(markdown_path),
            ledger_appended,
        })
    }

    fn write_snapshot(&self, path: &Path, date: NaiveDate, tabs: &[Tab]) -> Result<(), SaveError> {
        ensure_parent(path)?;

        let mut records = match fs::read_to_string(path) {
            Ok(existing) => serde_json::from_str::<Snapshot>(&existing)
                .map_err(|source| SaveError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                })?
                .tabs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(SaveError::io(path, e)),
        };
        records.extend(tabs.iter().cloned());

        let snapshot = Snapshot {
            date,
            updated_at: Utc::now(),
            tabs: records,
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|source| SaveError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| SaveError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| SaveError::io(path, e))?;
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<(), SaveError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| SaveError::io(parent, e))?;
        }
    }
    Ok(())
}

fn append_blocks(path: &Path, tabs: &[Tab]) -> Result<(), SaveError> {
    ensure_parent(path)?;
    let text: String = tabs.iter().map(render_block).collect();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SaveError::io(path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| SaveError::io(path, e))?;
    Ok(())
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render one tab as a markdown ledger block.
pub fn render_block(tab: &Tab) -> String {
    format!(
        "## {}\n- **URL:** {}\n- **Main Category:** {}\n- **Tags:** {}\n\n---\n\n",
        single_line(&tab.title),
        tab.url.trim(),
        single_line(&tab.category),
        tab.tags.join(", ")
    )
}

/// One block read back from a ledger or markdown mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub title: String,
    pub url: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// Parse ledger text into entries, in file order. Lines that belong to no
/// block are ignored.
pub fn parse_ledger(text: &str) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();
    let mut current: Option<LedgerEntry> = None;

    for line in text.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            entries.extend(current.take());
            current = Some(LedgerEntry {
                title: title.trim().to_string(),
                url: String::new(),
                category: UNCATEGORIZED.to_string(),
                tags: Vec::new(),
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };

        if let Some(url) = line.strip_prefix("- **URL:**") {
            entry.url = url.trim().to_string();
        } else if let Some(category) = line.strip_prefix("- **Main Category:**") {
            entry.category = category.trim().to_string();
        } else if let Some(tags) = line.strip_prefix("- **Tags:**") {
            entry.tags = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        } else if line.trim() == "---" {
            entries.extend(current.take());
        }
    }

    entries.extend(current);
    entries
}

/// Move a ledger to `to`, creating parent directories. If `to` already
/// exists the ledger's content is appended to it. The source is removed.
pub fn relocate_ledger(from: &Path, to: &Path) -> Result<PathBuf, SaveError> {
    if from == to {
        return Ok(to.to_path_buf());
    }
    ensure_parent(to)?;

    if to.exists() {
        if same_file(from, to)? {
            return Ok(to.to_path_buf());
        }
        let text = fs::read_to_string(from).map_err(|e| SaveError::io(from, e))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(to)
            .map_err(|e| SaveError::io(to, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| SaveError::io(to, e))?;
        fs::remove_file(from).map_err(|e| SaveError::io(from, e))?;
    } else if fs::rename(from, to).is_err() {
        // Rename fails across filesystems; fall back to copy + remove.
        fs::copy(from, to).map_err(|e| SaveError::io(to, e))?;
        fs::remove_file(from).map_err(|e| SaveError::io(from, e))?;
    }

    tracing::info!("ledger moved from {} to {}", from.display(), to.display());
    Ok(to.to_path_buf())
}

/// Both paths resolve to the same file (`./x`, `a/../x`, symlinks).
fn same_file(a: &Path, b: &Path) -> Result<bool, SaveError> {
    let a = fs::canonicalize(a).map_err(|e| SaveError::io(a, e))?;
    let b = fs::canonicalize(b).map_err(|e| SaveError::io(b, e))?;
    Ok(a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn tab(title: &str, url: &str, category: &str, tags: &[&str]) -> Tab {
        let mut tab = Tab::new(title, url, Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap());
        tab.category = category.to_string();
        tab.tags = tags.iter().map(|t| t.to_string()).collect();
        tab
    }

    fn session(tabs: Vec<Tab>) -> CaptureSession {
        CaptureSession::new(Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap(), tabs)
    }

    #[test]
    fn block_format_is_fixed() {
        let block = render_block(&tab("Rust async", "https://a.com", "Programming", &["rust", "async"]));
        assert_eq!(
            block,
            "## Rust async\n- **URL:** https://a.com\n- **Main Category:** Programming\n- **Tags:** rust, async\n\n---\n\n"
        );
    }

    #[test]
    fn parse_reads_blocks_in_order() {
        let text = format!(
            "{}{}",
            render_block(&tab("One", "https://one.com", "Coding", &["a", "b"])),
            render_block(&tab("Two", "https://two.com", "Other", &[]))
        );
        let entries = parse_ledger(&text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "One");
        assert_eq!(entries[0].tags, vec!["a", "b"]);
        assert_eq!(entries[1].url, "https://two.com");
        assert!(entries[1].tags.is_empty());
    }

    #[test]
    fn same_day_saves_append_to_snapshot() {
        let tmp = TempDir::new().unwrap();
        let saver = TabSaver::new(tmp.path());
        let ledger = Ledger::new(tmp.path().join("all_tabs.md"));

        let first = saver
            .save(&session(vec![tab("A", "https://a.com", "Coding", &[])]), &ledger)
            .unwrap();
        saver
            .save(&session(vec![tab("B", "https://b.com", "Other", &[])]), &ledger)
            .unwrap();

        let path = first.snapshot_path.unwrap();
        assert!(path.ends_with("snapshots/tabs_2024-03-09.json"));
        let snapshot: Snapshot = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let titles: Vec<&str> = snapshot.tabs.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert!(!path.with_extension("json.tmp").exists());

        let mirror = fs::read_to_string(first.markdown_path.unwrap()).unwrap();
        assert_eq!(parse_ledger(&mirror).len(), 2);
    }

    #[test]
    fn empty_session_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let saver = TabSaver::new(tmp.path().join("data"));
        let ledger = Ledger::new(tmp.path().join("data/all_tabs.md"));

        let outcome = saver.save(&session(Vec::new()), &ledger).unwrap();
        assert_eq!(outcome, SaveOutcome::default());
        assert!(!tmp.path().join("data").exists());
    }

    #[test]
    fn corrupt_snapshot_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let saver = TabSaver::new(tmp.path());
        let ledger = Ledger::new(tmp.path().join("all_tabs.md"));
        let path = saver.snapshot_path(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = saver
            .save(&session(vec![tab("A", "https://a.com", "Coding", &[])]), &ledger)
            .unwrap_err();
        assert!(matches!(err, SaveError::Corrupt { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn relocation_appends_to_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("data/all_tabs.md");
        let to = tmp.path().join("central/notes/all_tabs.md");

        Ledger::new(&from)
            .append(&[tab("Old", "https://old.com", "Other", &[])])
            .unwrap();
        Ledger::new(&to)
            .append(&[tab("Existing", "https://existing.com", "Other", &[])])
            .unwrap();

        relocate_ledger(&from, &to).unwrap();

        assert!(!from.exists());
        let titles: Vec<String> = Ledger::new(&to)
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Existing", "Old"]);
    }

    #[test]
    fn relocation_onto_itself_keeps_ledger() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("all_tabs.md");
        let alias = tmp.path().join("sub").join("..").join("all_tabs.md");
        Ledger::new(&from)
            .append(&[tab("Keep", "https://keep.com", "Other", &[])])
            .unwrap();
        let before = fs::read_to_string(&from).unwrap();

        relocate_ledger(&from, &alias).unwrap();

        assert!(from.exists());
        assert_eq!(fs::read_to_string(&from).unwrap(), before);
        assert_eq!(Ledger::new(&from).entries().unwrap().len(), 1);
    }

    #[test]
    fn relocation_to_fresh_path_moves_file() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("all_tabs.md");
        let to = tmp.path().join("elsewhere/ledger.md");
        Ledger::new(&from)
            .append(&[tab("Only", "https://only.com", "Other", &[])])
            .unwrap();

        relocate_ledger(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(Ledger::new(&to).entries().unwrap().len(), 1);
    }
}
