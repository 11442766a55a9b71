use crate::activity::{emit, ActivityKind};
use crate::db::get_db_pool;
use crate::forum::STATUS_ACTIVE;
use crate::middleware::ClientCtx;
use crate::orm::{forum_posts, forum_replies, users};
use crate::reputation::{award, AwardReason, POINTS_REPLY};
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, FromQueryResult};
use serde::{Deserialize, Serialize};

/// Depth of a new reply given its parent's depth. Top-level replies sit at 0.
pub fn reply_depth(parent_depth: Option<i32>) -> i32 {
    match parent_depth {
        Some(depth) => depth + 1,
        None => 0,
    }
}

#[derive(Debug, FromQueryResult)]
pub struct ReplyForJson {
    pub id: i32,
    pub post_id: i32,
    pub parent_reply_id: Option<i32>,
    pub user_id: i32,
    pub username: Option<String>,
    pub content: String,
    pub depth: i32,
    pub status: String,
    pub upvotes_count: i32,
    pub downvotes_count: i32,
    pub created_at: chrono::NaiveDateTime,
}

/// Replies leave the thread tree intact when moderated: the row is kept as
/// a placeholder and only its content is withheld.
#[derive(Debug, Serialize)]
pub struct ReplyOut {
    pub id: i32,
    pub post_id: i32,
    pub parent_reply_id: Option<i32>,
    pub user_id: i32,
    pub username: Option<String>,
    pub content: Option<String>,
    pub depth: i32,
    pub status: String,
    pub upvotes_count: i32,
    pub downvotes_count: i32,
    pub created_at: chrono::NaiveDateTime,
}

impl From<ReplyForJson> for ReplyOut {
    fn from(reply: ReplyForJson) -> Self {
        let content = if reply.status == STATUS_ACTIVE {
            Some(reply.content)
        } else {
            None
        };
        Self {
            id: reply.id,
            post_id: reply.post_id,
            parent_reply_id: reply.parent_reply_id,
            user_id: reply.user_id,
            username: reply.username,
            content,
            depth: reply.depth,
            status: reply.status,
            upvotes_count: reply.upvotes_count,
            downvotes_count: reply.downvotes_count,
            created_at: reply.created_at,
        }
    }
}

pub async fn get_post(
    db: &DatabaseConnection,
    post_id: i32,
) -> Result<Option<forum_posts::Model>, DbErr> {
    forum_posts::Entity::find_by_id(post_id).one(db).await
}

/// Loads a post for viewing; non-active posts are only visible to moderators.
async fn get_visible_post(
    client: &ClientCtx,
    post_id: i32,
) -> Result<forum_posts::Model, Error> {
    let post = get_post(get_db_pool(), post_id)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Thread not found."))?;

    if post.status != STATUS_ACTIVE && !client.is_moderator() {
        return Err(error::ErrorNotFound("Thread not found."));
    }

    Ok(post)
}

#[get("/threads/{post_id}")]
pub async fn view_thread(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let post = get_visible_post(&client, path.into_inner()).await?;

    let replies: Vec<ReplyOut> = forum_replies::Entity::find()
        .filter(forum_replies::Column::PostId.eq(post.id))
        .left_join(users::Entity)
        .column_as(users::Column::Name, "username")
        .order_by_asc(forum_replies::Column::CreatedAt)
        .order_by_asc(forum_replies::Column::Id)
        .into_model::<ReplyForJson>()
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .into_iter()
        .map(ReplyOut::from)
        .collect();

    // View counting is best effort and stays off the request's critical path.
    let post_id = post.id;
    actix_web::rt::spawn(async move {
        let res = forum_posts::Entity::update_many()
            .col_expr(
                forum_posts::Column::ViewsCount,
                Expr::cust("views_count + 1"),
            )
            .filter(forum_posts::Column::Id.eq(post_id))
            .exec(get_db_pool())
            .await;
        if let Err(e) = res {
            log::warn!("views_count bump failed for post {}: {}", post_id, e);
        }
    });

    let subscribed = match client.get_id() {
        Some(viewer_id) => crate::subscription::is_subscribed(db, viewer_id, post.id)
            .await
            .map_err(error::ErrorInternalServerError)?,
        None => false,
    };

    #[derive(Serialize)]
    struct ThreadResponse {
        post: ThreadPost,
        replies: Vec<ReplyOut>,
        subscribed: bool,
    }

    #[derive(Serialize)]
    struct ThreadPost {
        id: i32,
        category_id: i32,
        user_id: i32,
        title: String,
        slug: String,
        content: String,
        status: String,
        pinned: bool,
        locked: bool,
        views_count: i32,
        replies_count: i32,
        upvotes_count: i32,
        downvotes_count: i32,
        created_at: chrono::NaiveDateTime,
        last_activity_at: chrono::NaiveDateTime,
    }

    Ok(HttpResponse::Ok().json(ThreadResponse {
        post: ThreadPost {
            id: post.id,
            category_id: post.category_id,
            user_id: post.user_id,
            title: post.title,
            slug: post.slug,
            content: post.content,
            status: post.status,
            pinned: post.pinned,
            locked: post.locked,
            views_count: post.views_count,
            replies_count: post.replies_count,
            upvotes_count: post.upvotes_count,
            downvotes_count: post.downvotes_count,
            created_at: post.created_at,
            last_activity_at: post.last_activity_at,
        },
        replies,
        subscribed,
    }))
}

#[derive(Deserialize)]
pub struct NewReplyData {
    pub content: String,
    pub parent_reply_id: Option<i32>,
}

#[post("/threads/{post_id}/post-reply")]
pub async fn create_reply(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<NewReplyData>,
) -> Result<impl Responder, Error> {
    let author_id = client.require_id()?;
    let db = get_db_pool();

    let post = get_post(db, path.into_inner())
        .await
        .map_err(error::ErrorInternalServerError)?
        .filter(|p| p.status == STATUS_ACTIVE)
        .ok_or_else(|| error::ErrorNotFound("Thread not found."))?;

    if post.locked {
        return Err(error::ErrorForbidden("This thread is locked."));
    }

    let content = form.content.trim().to_owned();
    if content.is_empty() {
        return Err(error::ErrorUnprocessableEntity(
            "Input must contain content.",
        ));
    }

    // The parent must be a living reply in this same thread.
    let parent = match form.parent_reply_id {
        Some(parent_id) => {
            let parent = forum_replies::Entity::find_by_id(parent_id)
                .one(db)
                .await
                .map_err(error::ErrorInternalServerError)?
                .filter(|r| r.status == STATUS_ACTIVE)
                .ok_or_else(|| error::ErrorNotFound("Parent reply not found."))?;
            if parent.post_id != post.id {
                return Err(error::ErrorBadRequest(
                    "Parent reply belongs to another thread.",
                ));
            }
            Some(parent)
        }
        None => None,
    };

    let now = Utc::now().naive_utc();
    let depth = reply_depth(parent.as_ref().map(|p| p.depth));

    // Reply row, thread counters, activity event and points in one unit.
    let txn = db.begin().await.map_err(error::ErrorInternalServerError)?;

    let new_reply = forum_replies::ActiveModel {
        post_id: Set(post.id),
        parent_reply_id: Set(form.parent_reply_id),
        user_id: Set(author_id),
        content: Set(content),
        depth: Set(depth),
        status: Set(STATUS_ACTIVE.to_owned()),
        upvotes_count: Set(0),
        downvotes_count: Set(0),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(error::ErrorInternalServerError)?;

    forum_posts::Entity::update_many()
        .col_expr(
            forum_posts::Column::RepliesCount,
            Expr::cust("replies_count + 1"),
        )
        .col_expr(forum_posts::Column::LastActivityAt, Expr::value(now))
        .filter(forum_posts::Column::Id.eq(post.id))
        .exec(&txn)
        .await
        .map_err(error::ErrorInternalServerError)?;

    emit(
        &txn,
        author_id,
        ActivityKind::ReplyCreated {
            post_id: post.id,
            reply_id: new_reply.id,
            post_title: post.title.to_owned(),
        },
    )
    .await
    .map_err(error::ErrorInternalServerError)?;

    award(&txn, author_id, POINTS_REPLY, AwardReason::Reply)
        .await
        .map_err(error::ErrorInternalServerError)?;

    txn.commit().await.map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Created().json(ReplyOut {
        id: new_reply.id,
        post_id: new_reply.post_id,
        parent_reply_id: new_reply.parent_reply_id,
        user_id: new_reply.user_id,
        username: Some(client.get_name()),
        content: Some(new_reply.content),
        depth: new_reply.depth,
        status: new_reply.status,
        upvotes_count: new_reply.upvotes_count,
        downvotes_count: new_reply.downvotes_count,
        created_at: new_reply.created_at,
    }))
}

#[derive(Deserialize)]
pub struct EditPostData {
    pub content: String,
}

/// Author-only content edit; bumps last_activity_at like a reply does.
#[post("/threads/{post_id}/edit")]
pub async fn update_thread(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<EditPostData>,
) -> Result<impl Responder, Error> {
    let editor_id = client.require_id()?;
    let db = get_db_pool();

    let post = get_post(db, path.into_inner())
        .await
        .map_err(error::ErrorInternalServerError)?
        .filter(|p| p.status == STATUS_ACTIVE)
        .ok_or_else(|| error::ErrorNotFound("Thread not found."))?;

    if post.user_id != editor_id {
        return Err(error::ErrorForbidden(
            "You do not have permission to update this thread.",
        ));
    }
    if post.locked && !client.is_moderator() {
        return Err(error::ErrorForbidden("This thread is locked."));
    }

    let content = form.content.trim().to_owned();
    if content.is_empty() {
        return Err(error::ErrorUnprocessableEntity(
            "Input must contain content.",
        ));
    }

    let now = Utc::now().naive_utc();
    forum_posts::Entity::update_many()
        .col_expr(forum_posts::Column::Content, Expr::value(content))
        .col_expr(forum_posts::Column::LastActivityAt, Expr::value(now))
        .filter(forum_posts::Column::Id.eq(post.id))
        .exec(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": post.id, "updated": true })))
}

#[cfg(test)]
mod tests {
    use super::reply_depth;

    #[test]
    fn top_level_replies_have_depth_zero() {
        assert_eq!(reply_depth(None), 0);
    }

    #[test]
    fn depth_strictly_increases_along_a_parent_chain() {
        let mut depth = reply_depth(None);
        for _ in 0..5 {
            let child = reply_depth(Some(depth));
            assert_eq!(child, depth + 1);
            depth = child;
        }
    }
}
