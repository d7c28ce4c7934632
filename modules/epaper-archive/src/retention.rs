//! Month-folder retention.
//!
//! Purges whole `MMMYY` folders once they fall out of the retention window.
//! Nothing is deleted during the first `grace_day` days of a month so a job
//! still finishing the previous month's editions is never raced.

use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};

use epaper_common::{MonthLabel, RetentionPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// False when the grace period kept retention from running.
    pub active: bool,
    /// Oldest month kept; folders before it are purged.
    pub oldest_kept: Option<MonthLabel>,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

pub struct RetentionManager {
    root: PathBuf,
    policy: RetentionPolicy,
    remove_dir: fn(&Path) -> io::Result<()>,
}

impl RetentionManager {
    pub fn new(root: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            remove_dir: |path| fs::remove_dir_all(path),
        }
    }

    /// Oldest month preserved on `now`: the current month and the
    /// `keep_months - 1` months before it survive.
    pub fn oldest_kept(&self, now: NaiveDate) -> MonthLabel {
        MonthLabel::of(now).months_back(self.policy.keep_months.saturating_sub(1))
    }

    pub fn enforce(&self, now: NaiveDate) -> RetentionReport {
        let mut report = RetentionReport::default();

        if now.day() <= self.policy.grace_day {
            info!(
                day = now.day(),
                grace_day = self.policy.grace_day,
                "Retention waits until the grace period is over"
            );
            return report;
        }

        let oldest_kept = self.oldest_kept(now);
        report.active = true;
        report.oldest_kept = Some(oldest_kept);

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "Archive root does not exist, nothing to purge");
                return report;
            }
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Cannot list archive root");
                return report;
            }
        };

        let mut expired: Vec<(MonthLabel, PathBuf, String)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                match name.parse::<MonthLabel>() {
                    Ok(label) => Some((label, entry.path(), name)),
                    Err(_) => {
                        debug!(folder = name.as_str(), "Not a month folder, leaving it alone");
                        None
                    }
                }
            })
            .filter(|(label, _, _)| *label < oldest_kept)
            .collect();
        expired.sort();

        for (_, path, name) in expired {
            match (self.remove_dir)(&path) {
                Ok(()) => {
                    info!(folder = name.as_str(), "Deleted expired month folder");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(folder = name.as_str(), error = %e, "Failed to delete month folder");
                    report.failed.push(name);
                }
            }
        }

        info!(
            oldest_kept = %oldest_kept,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Retention complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn archive_with(folders: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for folder in folders {
            let path = dir.path().join(folder);
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join("X-01-01.pdf"), b"%PDF-1.4").unwrap();
        }
        dir
    }

    fn manager(root: &Path) -> RetentionManager {
        RetentionManager::new(root, RetentionPolicy::default())
    }

    #[test]
    fn nothing_is_deleted_inside_grace_period() {
        let dir = archive_with(&["JAN24", "FEB24", "MAR24"]);
        let report = manager(dir.path()).enforce(day(2024, 3, 5));

        assert!(!report.active);
        assert!(report.deleted.is_empty());
        for folder in ["JAN24", "FEB24", "MAR24"] {
            assert!(dir.path().join(folder).exists());
        }
    }

    #[test]
    fn grace_day_itself_is_still_inside_the_grace_period() {
        let dir = archive_with(&["FEB24"]);
        let report = manager(dir.path()).enforce(day(2024, 3, 7));
        assert!(!report.active);
        assert!(dir.path().join("FEB24").exists());
    }

    #[test]
    fn past_grace_period_older_months_go_and_current_stays() {
        let dir = archive_with(&["JAN24", "FEB24", "MAR24"]);
        let report = manager(dir.path()).enforce(day(2024, 3, 15));

        assert!(report.active);
        assert_eq!(report.oldest_kept, MonthLabel::new(2024, 3));
        assert_eq!(report.deleted, vec!["JAN24".to_string(), "FEB24".to_string()]);
        assert!(!dir.path().join("JAN24").exists());
        assert!(!dir.path().join("FEB24").exists());
        assert!(dir.path().join("MAR24").exists());
    }

    #[test]
    fn comparison_is_chronological_across_years() {
        // "APR23" sorts after "MAR24" as a string but is older.
        let dir = archive_with(&["APR23", "DEC23", "JAN24", "MAY24"]);
        let report = manager(dir.path()).enforce(day(2024, 1, 20));

        assert_eq!(report.deleted, vec!["APR23".to_string(), "DEC23".to_string()]);
        assert!(dir.path().join("JAN24").exists());
        assert!(dir.path().join("MAY24").exists(), "future months are never purged");
    }

    #[test]
    fn wider_window_keeps_previous_months() {
        let dir = archive_with(&["JAN24", "FEB24", "MAR24"]);
        let policy = RetentionPolicy {
            grace_day: 7,
            keep_months: 2,
        };
        let report = RetentionManager::new(dir.path(), policy).enforce(day(2024, 3, 15));

        assert_eq!(report.deleted, vec!["JAN24".to_string()]);
        assert!(dir.path().join("FEB24").exists());
    }

    #[test]
    fn non_month_entries_are_ignored() {
        let dir = archive_with(&["JAN24", "misc", "JAN2024"]);
        fs::write(dir.path().join("FEB24"), b"a file, not a folder").unwrap();

        let report = manager(dir.path()).enforce(day(2024, 3, 15));
        assert_eq!(report.deleted, vec!["JAN24".to_string()]);
        assert!(dir.path().join("misc").exists());
        assert!(dir.path().join("JAN2024").exists());
        assert!(dir.path().join("FEB24").is_file());
    }

    #[test]
    fn missing_root_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let report = manager(&dir.path().join("absent")).enforce(day(2024, 3, 15));
        assert!(report.active);
        assert!(report.deleted.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn one_failed_deletion_does_not_stop_the_rest() {
        let dir = archive_with(&["JAN24", "FEB24"]);
        let mut manager = manager(dir.path());
        manager.remove_dir = |path| {
            if path.ends_with("JAN24") {
                Err(io::Error::new(ErrorKind::PermissionDenied, "in use"))
            } else {
                fs::remove_dir_all(path)
            }
        };

        let report = manager.enforce(day(2024, 3, 15));
        assert_eq!(report.failed, vec!["JAN24".to_string()]);
        assert_eq!(report.deleted, vec!["FEB24".to_string()]);
        assert!(dir.path().join("JAN24").exists());
    }
}
