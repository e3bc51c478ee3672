use bridge_traits::catalog::CatalogError;

/// SQLite primary result codes that mean "someone else holds the lock"
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// Map a sqlx error from the Calibre database onto the catalog taxonomy
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> CatalogError {
    match &e {
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => CatalogError::Busy(e.to_string()),
                _ => CatalogError::Query(e.to_string()),
            }
        }
        sqlx::Error::PoolTimedOut => CatalogError::Busy(e.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::Configuration(_) => {
            CatalogError::Unavailable(e.to_string())
        }
        _ => CatalogError::Query(e.to_string()),
    }
}

/// Map a failure to open the catalog at all
pub(crate) fn map_open_error(e: sqlx::Error) -> CatalogError {
    match map_sqlx_error(e) {
        CatalogError::Query(message) => CatalogError::Unavailable(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_busy() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            CatalogError::Busy(_)
        ));
    }

    #[test]
    fn test_open_failure_is_unavailable() {
        assert!(matches!(
            map_open_error(sqlx::Error::RowNotFound),
            CatalogError::Unavailable(_)
        ));
    }
}
