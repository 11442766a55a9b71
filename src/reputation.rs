use crate::db::{get_db_pool, is_unique_violation};
use crate::middleware::ClientCtx;
use crate::orm::{user_badges, user_reputation, users};
use actix_web::{error, get, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, DatabaseConnection, DatabaseTransaction, DbErr, FromQueryResult};
use serde::{Deserialize, Serialize};

// Points per qualifying action.
pub const POINTS_POST: i32 = 10;
pub const POINTS_REPLY: i32 = 5;
pub const POINTS_HELPFUL: i32 = 2;
pub const POINTS_BEST_ANSWER: i32 = 15;

/// Which denormalized counter an award touches.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AwardReason {
    Post,
    Reply,
    Helpful,
    BestAnswer,
}

impl AwardReason {
    fn counter_name(self) -> &'static str {
        match self {
            Self::Post => "posts_count",
            Self::Reply => "replies_count",
            Self::Helpful => "helpful_count",
            Self::BestAnswer => "best_answer_count",
        }
    }

    fn counter_column(self) -> user_reputation::Column {
        match self {
            Self::Post => user_reputation::Column::PostsCount,
            Self::Reply => user_reputation::Column::RepliesCount,
            Self::Helpful => user_reputation::Column::HelpfulCount,
            Self::BestAnswer => user_reputation::Column::BestAnswerCount,
        }
    }
}

/// Adds points to a user's ledger and bumps the counter named by `reason`.
/// Negative points are corrective; both points and counters clamp at zero.
/// Runs on the caller's transaction so the ledger moves with the action
/// that earned it.
pub async fn award(
    txn: &DatabaseTransaction,
    user_id: i32,
    points: i32,
    reason: AwardReason,
) -> Result<(), DbErr> {
    // Lazily create the ledger row. A concurrent insert is fine.
    let existing = user_reputation::Entity::find_by_id(user_id).one(txn).await?;
    if existing.is_none() {
        let res = user_reputation::ActiveModel {
            user_id: Set(user_id),
            reputation_points: Set(0),
            posts_count: Set(0),
            replies_count: Set(0),
            helpful_count: Set(0),
            best_answer_count: Set(0),
        }
        .insert(txn)
        .await;
        if let Err(e) = res {
            if !is_unique_violation(&e) {
                return Err(e);
            }
        }
    }

    let counter_delta = if points >= 0 { 1 } else { -1 };
    user_reputation::Entity::update_many()
        .col_expr(
            user_reputation::Column::ReputationPoints,
            Expr::cust(&format!("GREATEST(reputation_points + {}, 0)", points)),
        )
        .col_expr(
            reason.counter_column(),
            Expr::cust(&format!(
                "GREATEST({} + {}, 0)",
                reason.counter_name(),
                counter_delta
            )),
        )
        .filter(user_reputation::Column::UserId.eq(user_id))
        .exec(txn)
        .await?;

    Ok(())
}

/// Records an earned badge. Append-only; returns the grant row id.
pub async fn grant_badge(
    txn: &DatabaseTransaction,
    user_id: i32,
    badge_name: &str,
    badge_icon: &str,
) -> Result<i32, DbErr> {
    let badge = user_badges::ActiveModel {
        user_id: Set(user_id),
        badge_name: Set(badge_name.to_owned()),
        badge_icon: Set(badge_icon.to_owned()),
        earned_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    Ok(badge.id)
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Tier {
    pub name: &'static str,
    pub rank: u8,
}

/// Maps reputation points to a badge tier.
/// Thresholds are checked highest-first; lower bound inclusive.
pub fn tier(points: i32) -> Tier {
    if points >= 1000 {
        Tier {
            name: "Expert",
            rank: 4,
        }
    } else if points >= 500 {
        Tier {
            name: "Avansat",
            rank: 3,
        }
    } else if points >= 200 {
        Tier {
            name: "Contributor",
            rank: 2,
        }
    } else if points >= 50 {
        Tier {
            name: "Activ",
            rank: 1,
        }
    } else {
        Tier {
            name: "Novice",
            rank: 0,
        }
    }
}

#[derive(Debug, FromQueryResult, Serialize)]
pub struct LeaderboardRow {
    pub user_id: i32,
    pub name: Option<String>,
    pub reputation_points: i32,
}

/// Top accounts by points, user id ascending on ties for determinism.
pub async fn leaderboard(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<LeaderboardRow>, DbErr> {
    user_reputation::Entity::find()
        .left_join(users::Entity)
        .column_as(users::Column::Name, "name")
        .order_by_desc(user_reputation::Column::ReputationPoints)
        .order_by_asc(user_reputation::Column::UserId)
        .limit(limit)
        .into_model::<LeaderboardRow>()
        .all(db)
        .await
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u64>,
}

#[get("/members/leaderboard")]
pub async fn view_leaderboard(query: web::Query<LeaderboardQuery>) -> Result<impl Responder, Error> {
    let limit = query.limit.unwrap_or(25).min(100);
    let rows = leaderboard(get_db_pool(), limit)
        .await
        .map_err(error::ErrorInternalServerError)?;

    #[derive(Serialize)]
    struct Entry {
        user_id: i32,
        name: Option<String>,
        reputation_points: i32,
        tier: Tier,
    }

    let entries: Vec<Entry> = rows
        .into_iter()
        .map(|row| Entry {
            user_id: row.user_id,
            name: row.name,
            tier: tier(row.reputation_points),
            reputation_points: row.reputation_points,
        })
        .collect();

    Ok(HttpResponse::Ok().json(entries))
}

#[get("/members/{user_id}/reputation")]
pub async fn view_reputation(
    _client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let user_id = path.into_inner();
    let db = get_db_pool();

    let record = user_reputation::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    let badges = user_badges::Entity::find()
        .filter(user_badges::Column::UserId.eq(user_id))
        .order_by_asc(user_badges::Column::EarnedAt)
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    #[derive(Serialize)]
    struct BadgeEntry {
        badge_name: String,
        badge_icon: String,
        earned_at: chrono::NaiveDateTime,
    }

    #[derive(Serialize)]
    struct ReputationResponse {
        user_id: i32,
        reputation_points: i32,
        posts_count: i32,
        replies_count: i32,
        helpful_count: i32,
        best_answer_count: i32,
        tier: Tier,
        badges: Vec<BadgeEntry>,
    }

    // Accounts with no ledger row yet are plain novices, not errors.
    let (points, posts, replies, helpful, best) = match record {
        Some(r) => (
            r.reputation_points,
            r.posts_count,
            r.replies_count,
            r.helpful_count,
            r.best_answer_count,
        ),
        None => (0, 0, 0, 0, 0),
    };

    Ok(HttpResponse::Ok().json(ReputationResponse {
        user_id,
        reputation_points: points,
        posts_count: posts,
        replies_count: replies,
        helpful_count: helpful,
        best_answer_count: best,
        tier: tier(points),
        badges: badges
            .into_iter()
            .map(|b| BadgeEntry {
                badge_name: b.badge_name,
                badge_icon: b.badge_icon,
                earned_at: b.earned_at,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_matches_documented_breakpoints_at_boundaries() {
        assert_eq!(tier(0).name, "Novice");
        assert_eq!(tier(49).name, "Novice");
        assert_eq!(tier(50).name, "Activ");
        assert_eq!(tier(199).name, "Activ");
        assert_eq!(tier(200).name, "Contributor");
        assert_eq!(tier(499).name, "Contributor");
        assert_eq!(tier(500).name, "Avansat");
        assert_eq!(tier(999).name, "Avansat");
        assert_eq!(tier(1000).name, "Expert");
        assert_eq!(tier(1999999).name, "Expert");
    }

    #[test]
    fn tier_rank_is_monotonic_in_points() {
        let mut last = tier(0).rank;
        for points in [1, 49, 50, 51, 199, 200, 499, 500, 999, 1000, 5000] {
            let rank = tier(points).rank;
            assert!(rank >= last, "rank regressed at {} points", points);
            last = rank;
        }
    }

    #[test]
    fn award_reason_names_its_counter() {
        assert_eq!(AwardReason::Post.counter_name(), "posts_count");
        assert_eq!(AwardReason::Reply.counter_name(), "replies_count");
        assert_eq!(AwardReason::Helpful.counter_name(), "helpful_count");
        assert_eq!(AwardReason::BestAnswer.counter_name(), "best_answer_count");
    }
}
