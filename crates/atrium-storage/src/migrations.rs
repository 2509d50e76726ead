// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary via
//! `embed_migrations!` and applied every time a database is opened.

use atrium_core::AtriumError;
use tracing::debug;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
///
/// Refinery tracks applied migrations in its own `refinery_schema_history` table.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), AtriumError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| AtriumError::Storage {
            source: Box::new(e),
        })?;
    for migration in report.applied_migrations() {
        debug!(migration = %migration, "applied migration");
    }
    Ok(())
}
