use crate::db::{get_db_pool, is_unique_violation};
use crate::middleware::ClientCtx;
use crate::orm::{user_follows, users};
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};
use serde::Serialize;

/// Inserts a follow edge. A duplicate insert is reported as Ok(false):
/// the edge already existed and the request is a benign retry, not an error.
/// Follows are deliberately not fed into the activity stream.
pub async fn follow(
    db: &DatabaseConnection,
    follower_id: i32,
    followee_id: i32,
) -> Result<bool, DbErr> {
    let res = user_follows::ActiveModel {
        follower_id: Set(follower_id),
        followee_id: Set(followee_id),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await;

    match res {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Deletes the edge if present. Absence is not an error.
pub async fn unfollow(
    db: &DatabaseConnection,
    follower_id: i32,
    followee_id: i32,
) -> Result<bool, DbErr> {
    let res = user_follows::Entity::delete_many()
        .filter(user_follows::Column::FollowerId.eq(follower_id))
        .filter(user_follows::Column::FolloweeId.eq(followee_id))
        .exec(db)
        .await?;

    Ok(res.rows_affected > 0)
}

pub async fn is_following(
    db: &DatabaseConnection,
    follower_id: i32,
    followee_id: i32,
) -> Result<bool, DbErr> {
    Ok(user_follows::Entity::find()
        .filter(user_follows::Column::FollowerId.eq(follower_id))
        .filter(user_follows::Column::FolloweeId.eq(followee_id))
        .one(db)
        .await?
        .is_some())
}

// Counts are live COUNT(*) queries rather than cached columns, so redundant
// follow/unfollow calls can never make them drift.

pub async fn follower_count(db: &DatabaseConnection, user_id: i32) -> Result<usize, DbErr> {
    user_follows::Entity::find()
        .filter(user_follows::Column::FolloweeId.eq(user_id))
        .paginate(db, 1)
        .num_items()
        .await
}

pub async fn following_count(db: &DatabaseConnection, user_id: i32) -> Result<usize, DbErr> {
    user_follows::Entity::find()
        .filter(user_follows::Column::FollowerId.eq(user_id))
        .paginate(db, 1)
        .num_items()
        .await
}

#[derive(Serialize)]
pub struct FollowToggleResponse {
    pub following: bool,
    pub follower_count: usize,
}

async fn require_member(db: &DatabaseConnection, user_id: i32) -> Result<(), Error> {
    users::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Member not found."))?;
    Ok(())
}

#[post("/members/{user_id}/follow")]
pub async fn follow_member(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let follower_id = client.require_id()?;
    let followee_id = path.into_inner();
    let db = get_db_pool();

    if follower_id == followee_id {
        return Err(error::ErrorBadRequest("You cannot follow yourself."));
    }
    require_member(db, followee_id).await?;

    follow(db, follower_id, followee_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let follower_count = follower_count(db, followee_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(FollowToggleResponse {
        following: true,
        follower_count,
    }))
}

#[post("/members/{user_id}/unfollow")]
pub async fn unfollow_member(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let follower_id = client.require_id()?;
    let followee_id = path.into_inner();
    let db = get_db_pool();

    require_member(db, followee_id).await?;

    unfollow(db, follower_id, followee_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let follower_count = follower_count(db, followee_id)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(FollowToggleResponse {
        following: false,
        follower_count,
    }))
}

#[get("/members/{user_id}/follows")]
pub async fn view_follows(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    let user_id = path.into_inner();
    let db = get_db_pool();

    require_member(db, user_id).await?;

    let followers = follower_count(db, user_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let following = following_count(db, user_id)
        .await
        .map_err(error::ErrorInternalServerError)?;
    let followed_by_viewer = match client.get_id() {
        Some(viewer_id) if viewer_id != user_id => is_following(db, viewer_id, user_id)
            .await
            .map_err(error::ErrorInternalServerError)?,
        _ => false,
    };

    #[derive(Serialize)]
    struct FollowsResponse {
        follower_count: usize,
        following_count: usize,
        followed_by_viewer: bool,
    }

    Ok(HttpResponse::Ok().json(FollowsResponse {
        follower_count: followers,
        following_count: following,
        followed_by_viewer,
    }))
}
