use crate::activity::{emit, ActivityKind};
use crate::db::{get_db_pool, is_unique_violation};
use crate::middleware::ClientCtx;
use crate::orm::{challenge_progress, challenges, users};
use crate::reputation::grant_badge;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use chrono::{NaiveDateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, DatabaseTransaction, DbErr, FromQueryResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a challenge accepts progress at `now`: it must be switched on
/// and inside its optional date window.
pub fn is_open(
    active: bool,
    start_date: Option<NaiveDateTime>,
    end_date: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> bool {
    if !active {
        return false;
    }
    if let Some(start) = start_date {
        if now < start {
            return false;
        }
    }
    if let Some(end) = end_date {
        if now > end {
            return false;
        }
    }
    true
}

/// Completion fires exactly once: on the first update that reaches the
/// target while the row is still open.
pub fn completion_due(current_value: i32, target_value: i32, already_completed: bool) -> bool {
    !already_completed && current_value >= target_value
}

async fn get_or_create_progress(
    txn: &DatabaseTransaction,
    user_id: i32,
    challenge_id: i32,
) -> Result<challenge_progress::Model, DbErr> {
    if let Some(row) = challenge_progress::Entity::find()
        .filter(challenge_progress::Column::UserId.eq(user_id))
        .filter(challenge_progress::Column::ChallengeId.eq(challenge_id))
        .one(txn)
        .await?
    {
        return Ok(row);
    }

    let res = challenge_progress::ActiveModel {
        user_id: Set(user_id),
        challenge_id: Set(challenge_id),
        current_value: Set(0),
        completed: Set(false),
        completed_at: Set(None),
        ..Default::default()
    }
    .insert(txn)
    .await;

    match res {
        Ok(row) => Ok(row),
        // Lost a race with a concurrent first step; the row exists now.
        Err(e) if is_unique_violation(&e) => challenge_progress::Entity::find()
            .filter(challenge_progress::Column::UserId.eq(user_id))
            .filter(challenge_progress::Column::ChallengeId.eq(challenge_id))
            .one(txn)
            .await?
            .ok_or(e),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressOutcome {
    pub challenge_id: i32,
    pub current_value: i32,
    pub target_value: i32,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

/// Adds `delta` to the user's progress and flips completion the first time
/// the target is reached. current_value keeps accumulating afterwards, but
/// the event and badge never fire twice.
pub async fn record_progress(
    user_id: i32,
    challenge: &challenges::Model,
    delta: i32,
) -> Result<ProgressOutcome, DbErr> {
    let db = get_db_pool();
    let txn = db.begin().await?;

    let row = get_or_create_progress(&txn, user_id, challenge.id).await?;

    challenge_progress::Entity::update_many()
        .col_expr(
            challenge_progress::Column::CurrentValue,
            Expr::cust(&format!("current_value + {}", delta)),
        )
        .filter(challenge_progress::Column::Id.eq(row.id))
        .exec(&txn)
        .await?;

    let row = challenge_progress::Entity::find_by_id(row.id)
        .one(&txn)
        .await?
        .ok_or_else(|| DbErr::Custom("challenge progress vanished mid-transaction".to_owned()))?;

    let newly_completed = completion_due(row.current_value, challenge.target_value, row.completed);
    let mut completed_at = row.completed_at;
    if newly_completed {
        let now = Utc::now().naive_utc();
        completed_at = Some(now);

        challenge_progress::Entity::update_many()
            .col_expr(challenge_progress::Column::Completed, Expr::value(true))
            .col_expr(challenge_progress::Column::CompletedAt, Expr::value(now))
            .filter(challenge_progress::Column::Id.eq(row.id))
            .exec(&txn)
            .await?;

        emit(
            &txn,
            user_id,
            ActivityKind::ChallengeCompleted {
                challenge_id: challenge.id,
                title: challenge.title.to_owned(),
            },
        )
        .await?;

        if let Some(badge_name) = &challenge.badge_name {
            let badge_icon = challenge.badge_icon.as_deref().unwrap_or("");
            let badge_id = grant_badge(&txn, user_id, badge_name, badge_icon).await?;
            emit(
                &txn,
                user_id,
                ActivityKind::BadgeEarned {
                    badge_id,
                    badge_name: badge_name.to_owned(),
                    badge_icon: badge_icon.to_owned(),
                },
            )
            .await?;
        }
    }

    txn.commit().await?;

    Ok(ProgressOutcome {
        challenge_id: challenge.id,
        current_value: row.current_value,
        target_value: challenge.target_value,
        completed: row.completed || newly_completed,
        completed_at,
    })
}

#[get("/challenges")]
pub async fn view_challenges(client: ClientCtx) -> Result<impl Responder, Error> {
    let db = get_db_pool();

    let rows = challenges::Entity::find()
        .filter(challenges::Column::Active.eq(true))
        .order_by_asc(challenges::Column::OrderIndex)
        .order_by_asc(challenges::Column::Id)
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    // Guests see the catalogue; members also see their own progress.
    let mut progress_by_challenge: HashMap<i32, challenge_progress::Model> = HashMap::new();
    if let Some(viewer_id) = client.get_id() {
        let ids: Vec<i32> = rows.iter().map(|c| c.id).collect();
        let progress = challenge_progress::Entity::find()
            .filter(challenge_progress::Column::UserId.eq(viewer_id))
            .filter(challenge_progress::Column::ChallengeId.is_in(ids))
            .all(db)
            .await
            .map_err(error::ErrorInternalServerError)?;
        for row in progress {
            progress_by_challenge.insert(row.challenge_id, row);
        }
    }

    #[derive(Serialize)]
    struct ChallengeEntry {
        id: i32,
        title: String,
        description: String,
        metric: String,
        target_value: i32,
        start_date: Option<NaiveDateTime>,
        end_date: Option<NaiveDateTime>,
        badge_name: Option<String>,
        current_value: i32,
        completed: bool,
    }

    let entries: Vec<ChallengeEntry> = rows
        .into_iter()
        .map(|c| {
            let progress = progress_by_challenge.get(&c.id);
            ChallengeEntry {
                id: c.id,
                title: c.title,
                description: c.description,
                metric: c.metric,
                target_value: c.target_value,
                start_date: c.start_date,
                end_date: c.end_date,
                badge_name: c.badge_name,
                current_value: progress.map(|p| p.current_value).unwrap_or(0),
                completed: progress.map(|p| p.completed).unwrap_or(false),
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(entries))
}

#[derive(Deserialize)]
pub struct ProgressData {
    pub delta: i32,
}

#[post("/challenges/{challenge_id}/progress")]
pub async fn post_progress(
    client: ClientCtx,
    path: web::Path<i32>,
    form: web::Json<ProgressData>,
) -> Result<impl Responder, Error> {
    let user_id = client.require_id()?;

    // Progress is monotonic; nothing ever walks it backwards.
    if form.delta <= 0 {
        return Err(error::ErrorBadRequest("Progress delta must be positive."));
    }

    let challenge = challenges::Entity::find_by_id(path.into_inner())
        .one(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Challenge not found."))?;

    if !is_open(
        challenge.active,
        challenge.start_date,
        challenge.end_date,
        Utc::now().naive_utc(),
    ) {
        return Err(error::ErrorForbidden("Challenge is not active."));
    }

    let outcome = record_progress(user_id, &challenge, form.delta)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(outcome))
}

#[derive(Debug, FromQueryResult, Serialize)]
pub struct ChallengeLeaderboardRow {
    pub user_id: i32,
    pub name: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
}

/// First-to-finish ranking. completed_at granularity can in principle
/// collide, so user id ascending is the documented deterministic tie-break.
pub async fn leaderboard_for(
    challenge_id: i32,
    limit: u64,
) -> Result<Vec<ChallengeLeaderboardRow>, DbErr> {
    challenge_progress::Entity::find()
        .filter(challenge_progress::Column::ChallengeId.eq(challenge_id))
        .filter(challenge_progress::Column::Completed.eq(true))
        .left_join(users::Entity)
        .column_as(users::Column::Name, "name")
        .order_by_asc(challenge_progress::Column::CompletedAt)
        .order_by_asc(challenge_progress::Column::UserId)
        .limit(limit)
        .into_model::<ChallengeLeaderboardRow>()
        .all(get_db_pool())
        .await
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u64>,
}

#[get("/challenges/{challenge_id}/leaderboard")]
pub async fn view_challenge_leaderboard(
    path: web::Path<i32>,
    query: web::Query<LeaderboardQuery>,
) -> Result<impl Responder, Error> {
    let challenge_id = path.into_inner();

    let challenge = challenges::Entity::find_by_id(challenge_id)
        .one(get_db_pool())
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Challenge not found."))?;

    let rows = leaderboard_for(challenge.id, query.limit.unwrap_or(25).min(100))
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn inactive_challenges_are_closed_regardless_of_window() {
        assert!(!is_open(false, None, None, at(2026, 6, 1)));
    }

    #[test]
    fn date_window_bounds_are_inclusive() {
        let start = Some(at(2026, 6, 1));
        let end = Some(at(2026, 6, 30));
        assert!(!is_open(true, start, end, at(2026, 5, 31)));
        assert!(is_open(true, start, end, at(2026, 6, 1)));
        assert!(is_open(true, start, end, at(2026, 6, 30)));
        assert!(!is_open(true, start, end, at(2026, 7, 1)));
        assert!(is_open(true, None, None, at(2026, 1, 1)));
    }

    #[test]
    fn completion_fires_once_at_the_target() {
        assert!(!completion_due(9, 10, false));
        assert!(completion_due(10, 10, false));
        assert!(completion_due(15, 10, false));
        // Already completed: later progress never re-fires.
        assert!(!completion_due(15, 10, true));
    }
}
