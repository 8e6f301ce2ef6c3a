//! On-disk CSV table accumulated across runs. Merges never destroy
//! prior data: duplicates resolve in favor of the earlier-observed row,
//! and an unreadable table is renamed to a timestamped backup instead of
//! being overwritten.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::models::{ListingRecord, COLUMNS};

/// Counts reported after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub previous: usize,
    pub added: usize,
    pub total: usize,
}

/// Merge `new_records` into the table at `path`.
///
/// Existing rows come first and win natural-key ties: a listing's core
/// identity does not change between runs, so the earlier observation is
/// treated as authoritative. If the existing table cannot be read it is
/// renamed to a backup and a fresh table is written from the batch.
pub fn merge(new_records: &[ListingRecord], path: &Path) -> Result<MergeReport, StoreError> {
    if !path.exists() {
        let records = dedup_keep_first(new_records.to_vec());
        write_table(path, &records)?;
        info!(total = records.len(), path = %path.display(), "created new table");
        return Ok(MergeReport {
            previous: 0,
            added: records.len(),
            total: records.len(),
        });
    }

    let existing = match load(path) {
        Ok(existing) => existing,
        Err(err) => {
            let backup = backup_path(path);
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                %err,
                "existing table unreadable, moving it aside"
            );
            fs::rename(path, &backup)?;
            let records = dedup_keep_first(new_records.to_vec());
            write_table(path, &records)?;
            return Ok(MergeReport {
                previous: 0,
                added: records.len(),
                total: records.len(),
            });
        }
    };

    let previous = existing.len();
    let mut combined = existing;
    combined.extend_from_slice(new_records);
    let combined = dedup_keep_first(combined);
    write_table(path, &combined)?;

    let report = MergeReport {
        previous,
        added: combined.len().saturating_sub(previous),
        total: combined.len(),
    };
    info!(
        previous = report.previous,
        added = report.added,
        total = report.total,
        path = %path.display(),
        "merge complete"
    );
    Ok(report)
}

/// Load every row, coercing each to the fixed column set. A table whose
/// header lacks the title column is treated as unreadable.
pub fn load(path: &Path) -> Result<Vec<ListingRecord>, StoreError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    if !headers.iter().any(|h| h == "Property_Title") {
        return Err(StoreError::MalformedHeader(path.to_path_buf()));
    }
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(ListingRecord::from_row(&headers, &row));
    }
    Ok(records)
}

/// Rewrite the table atomically: serialize next to the target, then
/// rename over it, so a crash mid-write cannot truncate prior data.
fn write_table(path: &Path, records: &[ListingRecord]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(COLUMNS)?;
        for record in records {
            writer.write_record(record.to_row())?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn dedup_keep_first(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.natural_key()))
        .collect()
}

fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string());
    let name = format!(
        "{stem}_backup_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    );
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::SENTINEL;

    fn record(title: &str, location: &str, price: &str) -> ListingRecord {
        let mut r = ListingRecord::empty(&format!("https://example.com/{title}"));
        r.title = title.to_string();
        r.location = location.to_string();
        r.price = price.to_string();
        r
    }

    fn table(dir: &TempDir) -> PathBuf {
        dir.path().join("data").join("listings.csv")
    }

    #[test]
    fn first_merge_creates_the_table() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        let report = merge(
            &[record("A", "Delhi", "₹ 10,000"), record("B", "Delhi", "₹ 12,000")],
            &path,
        )
        .unwrap();
        assert_eq!(
            report,
            MergeReport {
                previous: 0,
                added: 2,
                total: 2
            }
        );
        assert_eq!(load(&path).unwrap().len(), 2);
    }

    #[test]
    fn new_batch_is_deduped_by_natural_key() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        let report = merge(
            &[
                record("A", "Delhi", "₹ 10,000"),
                record("A", "Delhi", "₹ 99,999"),
            ],
            &path,
        )
        .unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(load(&path).unwrap()[0].price, "₹ 10,000");
    }

    #[test]
    fn merging_an_empty_batch_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        merge(&[record("A", "Delhi", "₹ 10,000")], &path).unwrap();
        let before = load(&path).unwrap();

        let report = merge(&[], &path).unwrap();
        assert_eq!(
            report,
            MergeReport {
                previous: 1,
                added: 0,
                total: 1
            }
        );
        assert_eq!(load(&path).unwrap(), before);
    }

    #[test]
    fn merge_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        let batch = vec![
            record("A", "Delhi", "₹ 10,000"),
            record("B", "Noida", "₹ 15,000"),
        ];
        merge(&batch, &path).unwrap();
        let once = load(&path).unwrap();

        let report = merge(&batch, &path).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(load(&path).unwrap(), once);
    }

    #[test]
    fn existing_row_wins_natural_key_ties() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        merge(&[record("A", "Delhi", "₹ 10,000")], &path).unwrap();

        let rescraped = record("A", "Delhi", "₹ 22,000");
        let report = merge(&[rescraped], &path).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(load(&path).unwrap()[0].price, "₹ 10,000");
    }

    #[test]
    fn natural_keys_are_unique_after_any_merge() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        merge(
            &[record("A", "Delhi", "₹ 1"), record("B", "Delhi", "₹ 2")],
            &path,
        )
        .unwrap();
        merge(
            &[
                record("B", "Delhi", "₹ 3"),
                record("C", "Noida", "₹ 4"),
                record("C", "Noida", "₹ 5"),
            ],
            &path,
        )
        .unwrap();

        let rows = load(&path).unwrap();
        let keys: HashSet<_> = rows.iter().map(|r| r.natural_key()).collect();
        assert_eq!(keys.len(), rows.len());
    }

    #[test]
    fn two_runs_report_expected_counts() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        merge(
            &[
                record("A", "Delhi", "₹ 1"),
                record("B", "Delhi", "₹ 2"),
                record("C", "Delhi", "₹ 3"),
                record("D", "Delhi", "₹ 4"),
            ],
            &path,
        )
        .unwrap();

        // Second run: 5 scraped pages, 3 new keys, 2 duplicates.
        let report = merge(
            &[
                record("C", "Delhi", "₹ 30"),
                record("D", "Delhi", "₹ 40"),
                record("E", "Delhi", "₹ 5"),
                record("F", "Delhi", "₹ 6"),
                record("G", "Delhi", "₹ 7"),
            ],
            &path,
        )
        .unwrap();
        assert_eq!(
            report,
            MergeReport {
                previous: 4,
                added: 3,
                total: 7
            }
        );
        // No backup appears when the load succeeded.
        let backups: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("backup"))
            .collect();
        assert!(backups.is_empty());
    }

    #[test]
    fn unreadable_table_is_backed_up_not_lost() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "this,is,not\nthe,table,you,are,looking,for\n").unwrap();

        let report = merge(&[record("A", "Delhi", "₹ 10,000")], &path).unwrap();
        assert_eq!(
            report,
            MergeReport {
                previous: 0,
                added: 1,
                total: 1
            }
        );

        let backups: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("_backup_"))
            .collect();
        assert_eq!(backups.len(), 1, "corrupt file must be preserved");
        assert_eq!(load(&path).unwrap().len(), 1);
    }

    #[test]
    fn short_rows_from_older_exports_are_coerced() {
        let dir = TempDir::new().unwrap();
        let path = table(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "Property_Title,Location\nOld Flat,Rohini\n",
        )
        .unwrap();

        let rows = load(&path).unwrap();
        assert_eq!(rows[0].title, "Old Flat");
        assert_eq!(rows[0].price, SENTINEL);

        let report = merge(&[record("Old Flat", "Rohini", "₹ 9,000")], &path).unwrap();
        assert_eq!(report.added, 0, "coerced row still wins its key");
    }
}
