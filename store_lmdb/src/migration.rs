//! Schema versioning for LMDB environments.
//!
//! The `_meta` database records which schema an environment was written with.
//! Opening an older environment runs each step from [`STEPS`] in order and then
//! stamps the new version; opening a newer one is refused.

use crate::{LmdbEnvironment, LmdbError};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

type Step = fn(&LmdbEnvironment) -> Result<(), LmdbError>;

/// `STEPS[n]` upgrades schema `n` to `n + 1`.
const STEPS: [Step; CURRENT_SCHEMA_VERSION as usize] = [create_tables];

/// Version 1: every table database exists. `LmdbEnvironment::open` creates
/// them, so there is only something to verify.
fn create_tables(env: &LmdbEnvironment) -> Result<(), LmdbError> {
    let rtxn = env.env().read_txn()?;
    for table in quire_store::Table::ALL {
        let db = env
            .env()
            .open_database::<heed::types::Bytes, heed::types::Bytes>(&rtxn, Some(table.name()))?;
        if db.is_none() {
            return Err(LmdbError::Schema(format!("table '{}' was not created", table)));
        }
    }
    Ok(())
}

pub struct Migrator;

impl Migrator {
    /// Bring `env` up to [`CURRENT_SCHEMA_VERSION`]. A stored version of 0
    /// means a fresh environment.
    pub fn run(env: &LmdbEnvironment) -> Result<(), LmdbError> {
        let stored = env.schema_version()?;
        if stored > CURRENT_SCHEMA_VERSION {
            return Err(LmdbError::Schema(format!(
                "environment has schema {} but this build understands up to {}",
                stored, CURRENT_SCHEMA_VERSION
            )));
        }
        if stored == CURRENT_SCHEMA_VERSION {
            tracing::debug!(version = stored, "schema current");
            return Ok(());
        }

        for (from, step) in STEPS.iter().enumerate().skip(stored as usize) {
            tracing::info!(from, to = from + 1, "migrating schema");
            step(env)?;
        }
        env.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        tracing::info!(version = CURRENT_SCHEMA_VERSION, "schema migrated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::REQUIRED_DBS;

    fn open(dir: &tempfile::TempDir) -> LmdbEnvironment {
        LmdbEnvironment::open(dir.path(), REQUIRED_DBS, 10 * 1024 * 1024).unwrap()
    }

    #[test]
    fn open_stamps_current_version() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(open(&dir).schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn unstamped_environment_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(&dir);
        env.set_schema_version(0).unwrap();
        Migrator::run(&env).unwrap();
        assert_eq!(env.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let env = open(&dir);
        env.set_schema_version(CURRENT_SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(Migrator::run(&env), Err(LmdbError::Schema(_))));
    }
}
