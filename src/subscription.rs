use crate::db::{get_db_pool, is_unique_violation};
use crate::forum::STATUS_ACTIVE;
use crate::middleware::ClientCtx;
use crate::orm::{forum_posts, forum_subscriptions};
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};
use serde::{Deserialize, Serialize};

/// Subscribes a user to a thread. Same contract as the follow toggle:
/// a duplicate subscribe is already-applied, not an error. When the
/// subscription already exists only the notify_replies flag is updated.
pub async fn subscribe(
    db: &DatabaseConnection,
    user_id: i32,
    post_id: i32,
    notify_replies: bool,
) -> Result<(), DbErr> {
    let res = forum_subscriptions::ActiveModel {
        user_id: Set(user_id),
        post_id: Set(post_id),
        notify_replies: Set(notify_replies),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await;

    match res {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            forum_subscriptions::Entity::update_many()
                .col_expr(
                    forum_subscriptions::Column::NotifyReplies,
                    sea_orm::sea_query::Expr::value(notify_replies),
                )
                .filter(forum_subscriptions::Column::UserId.eq(user_id))
                .filter(forum_subscriptions::Column::PostId.eq(post_id))
                .exec(db)
                .await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub async fn unsubscribe(db: &DatabaseConnection, user_id: i32, post_id: i32) -> Result<(), DbErr> {
    forum_subscriptions::Entity::delete_many()
        .filter(forum_subscriptions::Column::UserId.eq(user_id))
        .filter(forum_subscriptions::Column::PostId.eq(post_id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn is_subscribed(
    db: &DatabaseConnection,
    user_id: i32,
    post_id: i32,
) -> Result<bool, DbErr> {
    Ok(forum_subscriptions::Entity::find()
        .filter(forum_subscriptions::Column::UserId.eq(user_id))
        .filter(forum_subscriptions::Column::PostId.eq(post_id))
        .one(db)
        .await?
        .is_some())
}

/// The accurate set the external notification dispatcher fans out to when a
/// reply lands: subscribers who asked to be notified, minus the reply author.
pub async fn subscribers_of(
    db: &DatabaseConnection,
    post_id: i32,
    exclude_user_id: Option<i32>,
) -> Result<Vec<i32>, DbErr> {
    let mut query = forum_subscriptions::Entity::find()
        .filter(forum_subscriptions::Column::PostId.eq(post_id))
        .filter(forum_subscriptions::Column::NotifyReplies.eq(true));
    if let Some(user_id) = exclude_user_id {
        query = query.filter(forum_subscriptions::Column::UserId.ne(user_id));
    }

    Ok(query
        .order_by_asc(forum_subscriptions::Column::UserId)
        .all(db)
        .await?
        .into_iter()
        .map(|s| s.user_id)
        .collect())
}

pub async fn subscriber_count(db: &DatabaseConnection, post_id: i32) -> Result<usize, DbErr> {
    forum_subscriptions::Entity::find()
        .filter(forum_subscriptions::Column::PostId.eq(post_id))
        .paginate(db, 1)
        .num_items()
        .await
}

async fn require_live_post(db: &DatabaseConnection, post_id: i32) -> Result<(), Error> {
    forum_posts::Entity::find_by_id(post_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .filter(|p| p.status == STATUS_ACTIVE)
        .ok_or_else(|| error::ErrorNotFound("Thread not found."))?;
    Ok(())
}

#[derive(Serialize)]
pub struct SubscriptionToggleResponse {
    pub subscribed: bool,
    pub subscriber_count: usize,
}

#[derive(Deserialize)]
pub struct SubscribeData {
    pub notify_replies: Option<bool>,
}

#[post("/threads/{post_id}/subscribe")]
pub async fn subscribe_thread(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<SubscribeData>,
) -> Result<impl Responder, Error> {
    let user_id = client.require_id()?;
    let post_id = path.into_inner();
    let db = get_db_pool();

    require_live_post(db, post_id).await?;

    subscribe(db, user_id, post_id, form.notify_replies.unwrap_or(true))
        .await
        .map_err(error::ErrorInternalServerError)?;
    let subscriber_count = subscriber_count(db, post_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(SubscriptionToggleResponse {
        subscribed: true,
        subscriber_count,
    }))
}

#[post("/threads/{post_id}/unsubscribe")]
pub async fn unsubscribe_thread(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user_id = client.require_id()?;
    let post_id = path.into_inner();
    let db = get_db_pool();

    require_live_post(db, post_id).await?;

    unsubscribe(db, user_id, post_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let subscriber_count = subscriber_count(db, post_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(SubscriptionToggleResponse {
        subscribed: false,
        subscriber_count,
    }))
}

/// Consumed by the notification dispatcher; not part of the public UI surface.
#[get("/threads/{post_id}/subscribers")]
pub async fn view_subscribers(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    client.require_moderator()?;
    let post_id = path.into_inner();
    let db = get_db_pool();

    let subscribers = subscribers_of(db, post_id, None)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(subscribers))
}
