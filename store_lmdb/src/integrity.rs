//! Startup checks for an LMDB environment.
//!
//! [`check_data_dir`] runs before the environment is opened. [`check_integrity`]
//! runs after migrations and walks every row, so corruption shows up in the
//! log at startup instead of in the middle of a commit.

use std::path::Path;

use heed::types::Bytes;
use quire_store::Table;

use crate::environment::META_DB;
use crate::{record, LmdbEnvironment, LmdbError};

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub tables_checked: u32,
    pub rows: u64,
    /// Highest row version found in any table.
    pub highest_version: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Walk every table, checking that each row carries a version header and that
/// no version is ahead of the persisted commit sequence.
///
/// Problems are collected in the report; only failing to start a read
/// transaction is a hard error.
pub fn check_integrity(environment: &LmdbEnvironment) -> Result<IntegrityReport, LmdbError> {
    let env = environment.env();
    let rtxn = env.read_txn()?;
    let mut report = IntegrityReport::default();

    for table in Table::ALL {
        let name = table.name();
        let db = match env.open_database::<Bytes, Bytes>(&rtxn, Some(name)) {
            Ok(Some(db)) => db,
            Ok(None) => {
                report.errors.push(format!("table '{}' is missing", name));
                continue;
            }
            Err(e) => {
                report.errors.push(format!("table '{}' cannot be opened: {}", name, e));
                continue;
            }
        };
        report.tables_checked += 1;

        let rows = match db.iter(&rtxn) {
            Ok(rows) => rows,
            Err(e) => {
                report.errors.push(format!("table '{}' cannot be read: {}", name, e));
                continue;
            }
        };
        for entry in rows {
            let (key, row) = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.errors.push(format!("table '{}' stopped mid-scan: {}", name, e));
                    break;
                }
            };
            report.rows += 1;
            match record::decode(name, row) {
                Ok(versioned) => {
                    report.highest_version = report.highest_version.max(versioned.version.value());
                }
                Err(e) => report
                    .errors
                    .push(format!("{} (key {})", e, String::from_utf8_lossy(key))),
            }
        }
    }

    if env.open_database::<Bytes, Bytes>(&rtxn, Some(META_DB))?.is_none() {
        report.errors.push(format!("database '{}' is missing", META_DB));
    }

    let sequence = environment.last_sequence();
    if report.highest_version > sequence {
        report.errors.push(format!(
            "row version {} is ahead of the commit sequence {}",
            report.highest_version, sequence
        ));
    }

    Ok(report)
}

/// Refuse a data directory that holds something other than an LMDB
/// environment. Missing and empty directories are fine.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let mut entries = path
        .read_dir()
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    if entries.next().is_none() || path.join("data.mdb").exists() {
        return Ok(());
    }
    Err(format!(
        "{} is not empty and holds no data.mdb",
        path.display()
    ))
}
