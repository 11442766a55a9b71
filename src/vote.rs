use crate::db::get_db_pool;
use crate::forum::STATUS_ACTIVE;
use crate::middleware::ClientCtx;
use crate::orm::{forum_posts, forum_replies, forum_votes};
use crate::reputation::{award, AwardReason, POINTS_HELPFUL};
use actix_web::{error, post, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, DatabaseTransaction, DbErr};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "upvote",
            Self::Down => "downvote",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upvote" => Some(Self::Up),
            "downvote" => Some(Self::Down),
            _ => None,
        }
    }
}

/// What a vote request does given the row that already exists.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VoteAction {
    /// No prior vote: insert the row.
    Insert,
    /// Same type again: the toggle retracts the vote.
    Remove,
    /// Opposite type: the row flips in place.
    Switch,
}

/// The three-way branch. Counters must never diverge from the vote rows, so
/// whatever this returns is applied together with the row mutation in one
/// transaction.
pub fn vote_transition(existing: Option<VoteType>, requested: VoteType) -> VoteAction {
    match existing {
        None => VoteAction::Insert,
        Some(prior) if prior == requested => VoteAction::Remove,
        Some(_) => VoteAction::Switch,
    }
}

/// Counter adjustments (upvotes, downvotes) for a transition.
pub fn counter_deltas(existing: Option<VoteType>, requested: VoteType) -> (i32, i32) {
    match vote_transition(existing, requested) {
        VoteAction::Insert => match requested {
            VoteType::Up => (1, 0),
            VoteType::Down => (0, 1),
        },
        VoteAction::Remove => match requested {
            VoteType::Up => (-1, 0),
            VoteType::Down => (0, -1),
        },
        VoteAction::Switch => match requested {
            VoteType::Up => (1, -1),
            VoteType::Down => (-1, 1),
        },
    }
}

/// Change to the content author's helpful score. Only upvotes count toward
/// reputation; a retracted or flipped upvote takes its points back.
pub fn helpful_delta(existing: Option<VoteType>, requested: VoteType) -> i32 {
    let before = matches!(existing, Some(VoteType::Up)) as i32;
    let after = match vote_transition(existing, requested) {
        VoteAction::Remove => 0,
        VoteAction::Insert | VoteAction::Switch => matches!(requested, VoteType::Up) as i32,
    };
    after - before
}

#[derive(Copy, Clone, Debug)]
pub enum VoteTarget {
    Post(i32),
    Reply(i32),
}

#[derive(Debug, Serialize)]
pub struct VoteOutcome {
    /// The caller's vote after the toggle, if any remains.
    pub vote: Option<&'static str>,
    pub upvotes_count: i32,
    pub downvotes_count: i32,
}

async fn find_existing_vote(
    txn: &DatabaseTransaction,
    user_id: i32,
    target: VoteTarget,
) -> Result<Option<forum_votes::Model>, DbErr> {
    let query = forum_votes::Entity::find().filter(forum_votes::Column::UserId.eq(user_id));
    let query = match target {
        VoteTarget::Post(id) => query.filter(forum_votes::Column::PostId.eq(id)),
        VoteTarget::Reply(id) => query.filter(forum_votes::Column::ReplyId.eq(id)),
    };
    query.one(txn).await
}

async fn apply_post_counters(
    txn: &DatabaseTransaction,
    post_id: i32,
    up: i32,
    down: i32,
) -> Result<forum_posts::Model, DbErr> {
    let mut update = forum_posts::Entity::update_many();
    if up != 0 {
        update = update.col_expr(
            forum_posts::Column::UpvotesCount,
            Expr::cust(&format!("GREATEST(upvotes_count + {}, 0)", up)),
        );
    }
    if down != 0 {
        update = update.col_expr(
            forum_posts::Column::DownvotesCount,
            Expr::cust(&format!("GREATEST(downvotes_count + {}, 0)", down)),
        );
    }
    update
        .filter(forum_posts::Column::Id.eq(post_id))
        .exec(txn)
        .await?;

    forum_posts::Entity::find_by_id(post_id)
        .one(txn)
        .await?
        .ok_or_else(|| DbErr::Custom("vote target vanished mid-transaction".to_owned()))
}

async fn apply_reply_counters(
    txn: &DatabaseTransaction,
    reply_id: i32,
    up: i32,
    down: i32,
) -> Result<forum_replies::Model, DbErr> {
    let mut update = forum_replies::Entity::update_many();
    if up != 0 {
        update = update.col_expr(
            forum_replies::Column::UpvotesCount,
            Expr::cust(&format!("GREATEST(upvotes_count + {}, 0)", up)),
        );
    }
    if down != 0 {
        update = update.col_expr(
            forum_replies::Column::DownvotesCount,
            Expr::cust(&format!("GREATEST(downvotes_count + {}, 0)", down)),
        );
    }
    update
        .filter(forum_replies::Column::Id.eq(reply_id))
        .exec(txn)
        .await?;

    forum_replies::Entity::find_by_id(reply_id)
        .one(txn)
        .await?
        .ok_or_else(|| DbErr::Custom("vote target vanished mid-transaction".to_owned()))
}

/// Applies one vote request. Row mutation, counter adjustment and the
/// author's helpful points all commit or roll back together; a retried
/// request after a transient failure must re-read state first.
pub async fn cast_vote(
    voter_id: i32,
    author_id: i32,
    target: VoteTarget,
    requested: VoteType,
) -> Result<VoteOutcome, DbErr> {
    let db = get_db_pool();
    let txn = db.begin().await?;

    let existing = find_existing_vote(&txn, voter_id, target).await?;
    let existing_type = existing.as_ref().and_then(|v| VoteType::parse(&v.vote_type));
    let action = vote_transition(existing_type, requested);
    let (up, down) = counter_deltas(existing_type, requested);

    match action {
        VoteAction::Insert => {
            let (post_id, reply_id) = match target {
                VoteTarget::Post(id) => (Some(id), None),
                VoteTarget::Reply(id) => (None, Some(id)),
            };
            forum_votes::ActiveModel {
                user_id: Set(voter_id),
                post_id: Set(post_id),
                reply_id: Set(reply_id),
                vote_type: Set(requested.as_str().to_owned()),
                created_at: Set(Utc::now().naive_utc()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        VoteAction::Remove => {
            // Unwrap is safe: Remove only arises from an existing row.
            let row = existing.unwrap();
            forum_votes::Entity::delete_many()
                .filter(forum_votes::Column::Id.eq(row.id))
                .exec(&txn)
                .await?;
        }
        VoteAction::Switch => {
            let row = existing.unwrap();
            forum_votes::Entity::update_many()
                .col_expr(
                    forum_votes::Column::VoteType,
                    Expr::value(requested.as_str()),
                )
                .filter(forum_votes::Column::Id.eq(row.id))
                .exec(&txn)
                .await?;
        }
    }

    let (upvotes_count, downvotes_count) = match target {
        VoteTarget::Post(id) => {
            let post = apply_post_counters(&txn, id, up, down).await?;
            (post.upvotes_count, post.downvotes_count)
        }
        VoteTarget::Reply(id) => {
            let reply = apply_reply_counters(&txn, id, up, down).await?;
            (reply.upvotes_count, reply.downvotes_count)
        }
    };

    let points = helpful_delta(existing_type, requested) * POINTS_HELPFUL;
    if points != 0 {
        award(&txn, author_id, points, AwardReason::Helpful).await?;
    }

    txn.commit().await?;

    let vote = match action {
        VoteAction::Remove => None,
        VoteAction::Insert | VoteAction::Switch => Some(requested.as_str()),
    };

    Ok(VoteOutcome {
        vote,
        upvotes_count,
        downvotes_count,
    })
}

#[derive(Deserialize)]
pub struct VoteData {
    pub vote_type: String,
}

#[post("/threads/{post_id}/vote")]
pub async fn vote_on_thread(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<VoteData>,
) -> Result<impl Responder, Error> {
    let voter_id = client.require_id()?;
    let requested = VoteType::parse(&form.vote_type)
        .ok_or_else(|| error::ErrorBadRequest("Unknown vote type."))?;

    let post = forum_posts::Entity::find_by_id(path.into_inner())
        .one(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?
        .filter(|p| p.status == STATUS_ACTIVE)
        .ok_or_else(|| error::ErrorNotFound("Thread not found."))?;

    if post.user_id == voter_id {
        return Err(error::ErrorForbidden(
            "You cannot vote on your own content.",
        ));
    }

    let outcome = cast_vote(voter_id, post.user_id, VoteTarget::Post(post.id), requested)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/replies/{reply_id}/vote")]
pub async fn vote_on_reply(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<VoteData>,
) -> Result<impl Responder, Error> {
    let voter_id = client.require_id()?;
    let requested = VoteType::parse(&form.vote_type)
        .ok_or_else(|| error::ErrorBadRequest("Unknown vote type."))?;

    let reply = forum_replies::Entity::find_by_id(path.into_inner())
        .one(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?
        .filter(|r| r.status == STATUS_ACTIVE)
        .ok_or_else(|| error::ErrorNotFound("Reply not found."))?;

    if reply.user_id == voter_id {
        return Err(error::ErrorForbidden(
            "You cannot vote on your own content.",
        ));
    }

    let outcome = cast_vote(
        voter_id,
        reply.user_id,
        VoteTarget::Reply(reply.id),
        requested,
    )
    .await
    .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use VoteType::{Down, Up};

    #[test]
    fn transition_covers_the_three_branches() {
        assert_eq!(vote_transition(None, Up), VoteAction::Insert);
        assert_eq!(vote_transition(None, Down), VoteAction::Insert);
        assert_eq!(vote_transition(Some(Up), Up), VoteAction::Remove);
        assert_eq!(vote_transition(Some(Down), Down), VoteAction::Remove);
        assert_eq!(vote_transition(Some(Up), Down), VoteAction::Switch);
        assert_eq!(vote_transition(Some(Down), Up), VoteAction::Switch);
    }

    #[test]
    fn upvote_twice_returns_counters_to_baseline() {
        // upvote, upvote => retract
        let (up1, down1) = counter_deltas(None, Up);
        let (up2, down2) = counter_deltas(Some(Up), Up);
        assert_eq!((up1 + up2, down1 + down2), (0, 0));
    }

    #[test]
    fn upvote_then_downvote_nets_one_downvote() {
        let (up1, down1) = counter_deltas(None, Up);
        let (up2, down2) = counter_deltas(Some(Up), Down);
        assert_eq!((up1 + up2, down1 + down2), (0, 1));
    }

    #[test]
    fn helpful_points_follow_the_upvote() {
        assert_eq!(helpful_delta(None, Up), 1);
        assert_eq!(helpful_delta(None, Down), 0);
        assert_eq!(helpful_delta(Some(Up), Up), -1);
        assert_eq!(helpful_delta(Some(Down), Down), 0);
        assert_eq!(helpful_delta(Some(Up), Down), -1);
        assert_eq!(helpful_delta(Some(Down), Up), 1);
    }

    #[test]
    fn vote_type_round_trips_through_strings() {
        assert_eq!(VoteType::parse("upvote"), Some(Up));
        assert_eq!(VoteType::parse("downvote"), Some(Down));
        assert_eq!(VoteType::parse("sideways"), None);
        assert_eq!(Up.as_str(), "upvote");
    }
}
