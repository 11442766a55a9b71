use crate::session::{get_sess, reload_session_cache};
use once_cell::sync::OnceCell;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;

static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

#[inline(always)]
pub fn get_db_pool() -> &'static DatabaseConnection {
    unsafe { DB_POOL.get_unchecked() }
}

/// Opens the database URL and initializes the DB_POOL static.
pub async fn init_db(database_url: String) -> &'static DatabaseConnection {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true);

    let pool = Database::connect(opt)
        .await
        .expect("Database connection was not established.");
    DB_POOL.set(pool).unwrap();

    reload_session_cache(get_sess())
        .await
        .expect("failed to reload_session_cache");

    DB_POOL
        .get()
        .expect("DatabaseConnection in DB_POOL failed in init_db()")
}

/// True when a DbErr is the store reporting a unique constraint violation.
/// Toggle-style inserts use this to treat "already exists" as applied.
pub fn is_unique_violation(err: &DbErr) -> bool {
    match err {
        DbErr::Exec(msg) | DbErr::Query(msg) => {
            msg.contains("duplicate key") || msg.contains("23505") || msg.contains("UNIQUE")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_unique_violation;
    use sea_orm::DbErr;

    #[test]
    fn unique_violation_is_detected_from_exec_errors() {
        let err = DbErr::Exec(
            "error returned from database: duplicate key value violates unique constraint \
             \"user_follows_follower_id_followee_id_key\""
                .to_owned(),
        );
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn other_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&DbErr::Conn("timed out".to_owned())));
        assert!(!is_unique_violation(&DbErr::Exec(
            "null value in column \"user_id\"".to_owned()
        )));
    }
}
