use crate::db::get_db_pool;
use crate::forum::{STATUS_ACTIVE, STATUS_DELETED, STATUS_SPAM};
use crate::middleware::ClientCtx;
use crate::orm::{activity_events, forum_posts, forum_replies, forum_reports};
use actix_web::{error, post, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*};
use serde::{Deserialize, Serialize};

pub const REPORT_PENDING: &str = "pending";
pub const REPORT_RESOLVED: &str = "resolved";
pub const REPORT_DISMISSED: &str = "dismissed";

/// The only legal status moves. Deleting is open to the author (checked by
/// the caller); everything else is moderator-only. There is no path out of
/// deleted or spam except an explicit moderator restore.
pub fn status_transition_allowed(from: &str, to: &str, is_moderator: bool) -> bool {
    match (from, to) {
        (STATUS_ACTIVE, STATUS_DELETED) => true,
        (STATUS_ACTIVE, STATUS_SPAM) => is_moderator,
        (STATUS_DELETED, STATUS_ACTIVE) | (STATUS_SPAM, STATUS_ACTIVE) => is_moderator,
        _ => false,
    }
}

#[derive(Serialize)]
struct StatusResponse {
    id: i32,
    status: String,
}

async fn set_post_status(
    client: &ClientCtx,
    post_id: i32,
    to: &'static str,
) -> Result<HttpResponse, Error> {
    let actor_id = client.require_id()?;
    let db = get_db_pool();

    let post = forum_posts::Entity::find_by_id(post_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Thread not found."))?;

    let is_author = post.user_id == actor_id;
    if !status_transition_allowed(&post.status, to, client.is_moderator())
        || (to == STATUS_DELETED && !is_author && !client.is_moderator())
    {
        return Err(error::ErrorForbidden(
            "You do not have permission to do that.",
        ));
    }

    forum_posts::Entity::update_many()
        .col_expr(forum_posts::Column::Status, Expr::value(to))
        .filter(forum_posts::Column::Id.eq(post.id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(StatusResponse {
        id: post.id,
        status: to.to_owned(),
    }))
}

async fn set_reply_status(
    client: &ClientCtx,
    reply_id: i32,
    to: &'static str,
) -> Result<HttpResponse, Error> {
    let actor_id = client.require_id()?;
    let db = get_db_pool();

    let reply = forum_replies::Entity::find_by_id(reply_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Reply not found."))?;

    let is_author = reply.user_id == actor_id;
    if !status_transition_allowed(&reply.status, to, client.is_moderator())
        || (to == STATUS_DELETED && !is_author && !client.is_moderator())
    {
        return Err(error::ErrorForbidden(
            "You do not have permission to do that.",
        ));
    }

    // The row stays in place as a placeholder so the reply tree keeps its
    // shape; view code withholds the content.
    forum_replies::Entity::update_many()
        .col_expr(forum_replies::Column::Status, Expr::value(to))
        .filter(forum_replies::Column::Id.eq(reply.id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(StatusResponse {
        id: reply.id,
        status: to.to_owned(),
    }))
}

#[post("/threads/{post_id}/delete")]
pub async fn delete_thread(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    set_post_status(&client, path.into_inner(), STATUS_DELETED).await
}

#[post("/threads/{post_id}/spam")]
pub async fn spam_thread(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    client.require_moderator()?;
    set_post_status(&client, path.into_inner(), STATUS_SPAM).await
}

#[post("/threads/{post_id}/restore")]
pub async fn restore_thread(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    client.require_moderator()?;
    set_post_status(&client, path.into_inner(), STATUS_ACTIVE).await
}

#[post("/replies/{reply_id}/delete")]
pub async fn delete_reply(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    set_reply_status(&client, path.into_inner(), STATUS_DELETED).await
}

#[post("/replies/{reply_id}/restore")]
pub async fn restore_reply(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    client.require_moderator()?;
    set_reply_status(&client, path.into_inner(), STATUS_ACTIVE).await
}

#[derive(Deserialize)]
pub struct PinData {
    pub pinned: bool,
}

/// Pinning and locking are metadata flips with no counter side effects.
#[post("/threads/{post_id}/pin")]
pub async fn pin_thread(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<PinData>,
) -> Result<impl Responder, Error> {
    client.require_moderator()?;
    let db = get_db_pool();

    forum_posts::Entity::update_many()
        .col_expr(forum_posts::Column::Pinned, Expr::value(form.pinned))
        .filter(forum_posts::Column::Id.eq(path.into_inner()))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "pinned": form.pinned })))
}

#[derive(Deserialize)]
pub struct LockData {
    pub locked: bool,
}

#[post("/threads/{post_id}/lock")]
pub async fn lock_thread(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<LockData>,
) -> Result<impl Responder, Error> {
    client.require_moderator()?;
    let db = get_db_pool();

    forum_posts::Entity::update_many()
        .col_expr(forum_posts::Column::Locked, Expr::value(form.locked))
        .filter(forum_posts::Column::Id.eq(path.into_inner()))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "locked": form.locked })))
}

#[derive(Deserialize)]
pub struct ReportData {
    pub reason: String,
}

async fn file_report(
    reporter_id: i32,
    post_id: Option<i32>,
    reply_id: Option<i32>,
    reason: &str,
) -> Result<HttpResponse, Error> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(error::ErrorUnprocessableEntity("Reports need a reason."));
    }

    let report = forum_reports::ActiveModel {
        reporter_id: Set(reporter_id),
        post_id: Set(post_id),
        reply_id: Set(reply_id),
        reason: Set(reason.to_owned()),
        status: Set(REPORT_PENDING.to_owned()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(get_db_pool())
    .await
    .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "id": report.id,
        "status": report.status,
    })))
}

#[post("/threads/{post_id}/report")]
pub async fn report_thread(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<ReportData>,
) -> Result<impl Responder, Error> {
    let reporter_id = client.require_id()?;
    let db = get_db_pool();

    let post = forum_posts::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Thread not found."))?;

    file_report(reporter_id, Some(post.id), None, &form.reason).await
}

#[post("/replies/{reply_id}/report")]
pub async fn report_reply(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<ReportData>,
) -> Result<impl Responder, Error> {
    let reporter_id = client.require_id()?;
    let db = get_db_pool();

    let reply = forum_replies::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Reply not found."))?;

    file_report(reporter_id, None, Some(reply.id), &form.reason).await
}

async fn close_report(
    client: &ClientCtx,
    report_id: i32,
    to: &'static str,
) -> Result<HttpResponse, Error> {
    let moderator_id = client.require_moderator()?;
    let db = get_db_pool();

    let report = forum_reports::Entity::find_by_id(report_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Report not found."))?;

    if report.status != REPORT_PENDING {
        return Err(error::ErrorConflict("Report is already closed."));
    }

    forum_reports::Entity::update_many()
        .col_expr(forum_reports::Column::Status, Expr::value(to))
        .col_expr(forum_reports::Column::ResolvedBy, Expr::value(moderator_id))
        .col_expr(
            forum_reports::Column::ResolvedAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(forum_reports::Column::Id.eq(report.id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": report.id, "status": to })))
}

#[post("/mod/reports/{report_id}/resolve")]
pub async fn resolve_report(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    close_report(&client, path.into_inner(), REPORT_RESOLVED).await
}

#[post("/mod/reports/{report_id}/dismiss")]
pub async fn dismiss_report(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    close_report(&client, path.into_inner(), REPORT_DISMISSED).await
}

/// The only path that ever removes rows from the activity stream.
#[post("/mod/activity/{event_id}/purge")]
pub async fn purge_activity(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    client.require_moderator()?;
    let db = get_db_pool();

    let res = activity_events::Entity::delete_many()
        .filter(activity_events::Column::Id.eq(path.into_inner()))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    if res.rows_affected == 0 {
        return Err(error::ErrorNotFound("Activity event not found."));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "purged": true })))
}

#[cfg(test)]
mod tests {
    use super::status_transition_allowed;

    #[test]
    fn authors_can_only_delete_from_active() {
        assert!(status_transition_allowed("active", "deleted", false));
        assert!(!status_transition_allowed("deleted", "active", false));
        assert!(!status_transition_allowed("spam", "active", false));
        assert!(!status_transition_allowed("active", "spam", false));
    }

    #[test]
    fn moderators_can_flag_spam_and_restore() {
        assert!(status_transition_allowed("active", "spam", true));
        assert!(status_transition_allowed("deleted", "active", true));
        assert!(status_transition_allowed("spam", "active", true));
    }

    #[test]
    fn no_transitions_between_terminal_states() {
        assert!(!status_transition_allowed("deleted", "spam", true));
        assert!(!status_transition_allowed("spam", "deleted", true));
        assert!(!status_transition_allowed("active", "active", true));
    }
}
