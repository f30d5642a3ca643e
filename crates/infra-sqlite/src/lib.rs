// RideMatch Infrastructure - SQLite Adapter
// Implements: MatchResultRepository, ProcessedMarkers, DriverDirectory

mod connection;
mod driver_directory;
mod migration;
mod processed_markers;
mod result_repository;

pub use connection::create_pool;
pub use sqlx::SqlitePool;
pub use driver_directory::SqliteDriverDirectory;
pub use migration::run_migrations;
pub use processed_markers::SqliteProcessedMarkers;
pub use result_repository::SqliteMatchResultRepository;

use ridematch_core::AppError;

// sqlx::Error conversion lives here as a helper due to orphan rules
// (cannot implement From<sqlx::Error> for AppError in this crate)
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();
                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        _ => AppError::Database(err.to_string()),
    }
}
