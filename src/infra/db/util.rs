use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("invalid input syntax")
                || db.message().contains("violates check constraint") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to statement timeout") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::Persistence(_)
        ));
    }
}
