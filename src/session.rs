use crate::db::get_db_pool;
use crate::orm::sessions;
use crate::user::{get_client_user_by_id, ClientUser};
use actix_web::{get, Responder};
use chrono::{NaiveDateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};
use uuid::Uuid;

/// Cached copy of a sessions row. The authentication collaborator writes
/// the rows; we only resolve and prune them.
#[derive(Copy, Clone, Debug)]
pub struct Session {
    pub user_id: i32,
    pub expires_at: NaiveDateTime,
}

pub type SessionMap = DashMap<Uuid, Session>;

static SESSION_CACHE: OnceCell<SessionMap> = OnceCell::new();

#[inline(always)]
pub fn get_sess() -> &'static SessionMap {
    unsafe { SESSION_CACHE.get_unchecked() }
}

/// This MUST be called before get_sess, which is unsafe code.
pub fn init() {
    SESSION_CACHE
        .set(DashMap::new())
        .expect("failed to set SESSION_CACHE");
}

/// Replaces the cache contents with every live row in the sessions table.
pub async fn reload_session_cache(cache: &SessionMap) -> Result<(), DbErr> {
    let now = Utc::now().naive_utc();
    let rows = sessions::Entity::find()
        .filter(sessions::Column::ExpiresAt.gt(now))
        .all(get_db_pool())
        .await?;

    cache.clear();
    for row in rows {
        if let Ok(uuid) = Uuid::parse_str(&row.id) {
            cache.insert(
                uuid,
                Session {
                    user_id: row.user_id,
                    expires_at: row.expires_at,
                },
            );
        } else {
            log::warn!("sessions row with unparseable uuid: {}", row.id);
        }
    }

    Ok(())
}

/// Resolves a session token to its user, if the session is live.
pub async fn authenticate_by_uuid(uuid: &Uuid) -> Option<ClientUser> {
    let session = match get_sess().get(uuid) {
        Some(session) => *session,
        None => return None,
    };

    if session.expires_at < Utc::now().naive_utc() {
        get_sess().remove(uuid);
        return None;
    }

    match get_client_user_by_id(get_db_pool(), session.user_id).await {
        Ok(user) => user,
        Err(e) => {
            log::error!("authenticate_by_uuid: {}", e);
            None
        }
    }
}

/// Reads the token out of the cookie session and resolves it.
pub async fn authenticate_client_by_session(cookies: &actix_session::Session) -> Option<ClientUser> {
    let token = match cookies.get::<String>("token") {
        Ok(Some(token)) => token,
        Ok(None) => return None,
        Err(e) => {
            log::error!("authenticate_client_by_session: {}", e);
            return None;
        }
    };

    match Uuid::parse_str(&token) {
        Ok(uuid) => authenticate_by_uuid(&uuid).await,
        Err(_) => None,
    }
}

/// Deletes expired session rows and drops them from the cache.
pub async fn remove_expired_sessions(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let now = Utc::now().naive_utc();
    let res = sessions::Entity::delete_many()
        .filter(sessions::Column::ExpiresAt.lte(now))
        .exec(db)
        .await?;

    get_sess().retain(|_, session| session.expires_at > now);

    Ok(res.rows_affected)
}

#[get("/task/expire-sessions")]
pub async fn view_task_expire_sessions() -> impl Responder {
    match remove_expired_sessions(get_db_pool()).await {
        Ok(count) => format!("Expired {} session(s).", count),
        Err(e) => {
            log::error!("view_task_expire_sessions: {}", e);
            "Failed to expire sessions.".to_owned()
        }
    }
}
