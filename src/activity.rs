use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{activity_events, user_follows, users};
use actix_web::{error, get, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::{entity::*, query::*, DatabaseConnection, DatabaseTransaction, DbErr, FromQueryResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// One variant per activity_type, so the fixed enumeration is covered at
/// compile time instead of through an untyped metadata map. The serialized
/// form is stored in activity_events.meta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityKind {
    FavoriteAdded {
        objective_id: i32,
        objective_title: String,
    },
    ReviewPosted {
        objective_id: i32,
        rating: i32,
    },
    PostCreated {
        post_id: i32,
        title: String,
    },
    ReplyCreated {
        post_id: i32,
        reply_id: i32,
        post_title: String,
    },
    JournalPublished {
        journal_id: i32,
        title: String,
    },
    ChallengeCompleted {
        challenge_id: i32,
        title: String,
    },
    BadgeEarned {
        badge_id: i32,
        badge_name: String,
        badge_icon: String,
    },
}

impl ActivityKind {
    pub fn activity_type(&self) -> &'static str {
        match self {
            Self::FavoriteAdded { .. } => "favorite_added",
            Self::ReviewPosted { .. } => "review_posted",
            Self::PostCreated { .. } => "post_created",
            Self::ReplyCreated { .. } => "reply_created",
            Self::JournalPublished { .. } => "journal_published",
            Self::ChallengeCompleted { .. } => "challenge_completed",
            Self::BadgeEarned { .. } => "badge_earned",
        }
    }

    /// The entity the event points at, as (target_type, target_id).
    pub fn target(&self) -> (&'static str, i32) {
        match self {
            Self::FavoriteAdded { objective_id, .. } => ("objective", *objective_id),
            Self::ReviewPosted { objective_id, .. } => ("objective", *objective_id),
            Self::PostCreated { post_id, .. } => ("post", *post_id),
            Self::ReplyCreated { reply_id, .. } => ("reply", *reply_id),
            Self::JournalPublished { journal_id, .. } => ("journal", *journal_id),
            Self::ChallengeCompleted { challenge_id, .. } => ("challenge", *challenge_id),
            Self::BadgeEarned { badge_id, .. } => ("badge", *badge_id),
        }
    }
}

/// Returns the activity_type a feed filter selects, or None for "all".
/// Unknown filters are an input error, not an empty feed.
pub fn parse_filter(filter: &str) -> Result<Option<&'static str>, ()> {
    match filter {
        "all" => Ok(None),
        "favorite_added" => Ok(Some("favorite_added")),
        "review_posted" => Ok(Some("review_posted")),
        "post_created" => Ok(Some("post_created")),
        "reply_created" => Ok(Some("reply_created")),
        "journal_published" => Ok(Some("journal_published")),
        "challenge_completed" => Ok(Some("challenge_completed")),
        "badge_earned" => Ok(Some("badge_earned")),
        _ => Err(()),
    }
}

/// Appends one event to the stream. Always called inside the transaction of
/// the action that caused it, so the event never exists without its action
/// and vice versa.
pub async fn emit(txn: &DatabaseTransaction, actor_id: i32, kind: ActivityKind) -> Result<(), DbErr> {
    let (target_type, target_id) = kind.target();

    activity_events::ActiveModel {
        actor_id: Set(actor_id),
        activity_type: Set(kind.activity_type().to_owned()),
        target_type: Set(target_type.to_owned()),
        target_id: Set(target_id),
        meta: Set(serde_json::to_value(&kind).map_err(|e| DbErr::Custom(e.to_string()))?),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    Ok(())
}

#[derive(Debug, FromQueryResult, Serialize)]
pub struct FeedItem {
    pub id: i32,
    pub actor_id: i32,
    pub actor_name: Option<String>,
    pub activity_type: String,
    pub target_type: String,
    pub target_id: i32,
    pub meta: serde_json::Value,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub has_more: bool,
}

pub fn has_more(total: usize, page: usize, page_size: usize) -> bool {
    total > page * page_size
}

/// Reverse-chronological feed of events whose actor the viewer follows.
///
/// Ordered on (created_at, id) as a composite key so a page fetched at a
/// fixed offset is stable under concurrent inserts above it. `page` is
/// 1-based; each call is an independent point-in-time snapshot.
pub async fn feed_for(
    db: &DatabaseConnection,
    viewer_id: i32,
    page: usize,
    page_size: usize,
    filter: Option<&str>,
) -> Result<FeedPage, DbErr> {
    let page = page.max(1);

    let followee_ids: Vec<i32> = user_follows::Entity::find()
        .filter(user_follows::Column::FollowerId.eq(viewer_id))
        .all(db)
        .await?
        .into_iter()
        .map(|edge| edge.followee_id)
        .collect();

    if followee_ids.is_empty() {
        return Ok(FeedPage {
            items: Vec::new(),
            has_more: false,
        });
    }

    let mut query = activity_events::Entity::find()
        .filter(activity_events::Column::ActorId.is_in(followee_ids));
    if let Some(activity_type) = filter {
        query = query.filter(activity_events::Column::ActivityType.eq(activity_type));
    }

    let paginator = query
        .left_join(users::Entity)
        .column_as(users::Column::Name, "actor_name")
        .order_by_desc(activity_events::Column::CreatedAt)
        .order_by_desc(activity_events::Column::Id)
        .into_model::<FeedItem>()
        .paginate(db, page_size);

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page - 1).await?;

    Ok(FeedPage {
        items,
        has_more: has_more(total, page, page_size),
    })
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pub page: Option<usize>,
    pub filter: Option<String>,
}

#[get("/feed")]
pub async fn view_feed(
    client: ClientCtx,
    query: web::Query<FeedQuery>,
) -> Result<impl Responder, Error> {
    let viewer_id = client.require_id()?;

    let filter = match query.filter.as_deref() {
        None => None,
        Some(raw) => parse_filter(raw)
            .map_err(|_| error::ErrorBadRequest("Unknown activity filter."))?,
    };

    let feed = feed_for(
        get_db_pool(),
        viewer_id,
        query.page.unwrap_or(1),
        DEFAULT_PAGE_SIZE,
        filter,
    )
    .await
    .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(feed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_type_and_target_agree_per_variant() {
        let kind = ActivityKind::PostCreated {
            post_id: 7,
            title: "Trasee in Bucegi".to_owned(),
        };
        assert_eq!(kind.activity_type(), "post_created");
        assert_eq!(kind.target(), ("post", 7));

        let kind = ActivityKind::ReplyCreated {
            post_id: 7,
            reply_id: 31,
            post_title: "Trasee in Bucegi".to_owned(),
        };
        assert_eq!(kind.activity_type(), "reply_created");
        assert_eq!(kind.target(), ("reply", 31));

        let kind = ActivityKind::BadgeEarned {
            badge_id: 3,
            badge_name: "Drumet".to_owned(),
            badge_icon: "boots".to_owned(),
        };
        assert_eq!(kind.target(), ("badge", 3));
    }

    #[test]
    fn meta_round_trips_through_json() {
        let kind = ActivityKind::ChallengeCompleted {
            challenge_id: 12,
            title: "10 obiective vizitate".to_owned(),
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["kind"], "challenge_completed");
        let back: ActivityKind = serde_json::from_value(value).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn filter_parses_each_known_type_and_rejects_junk() {
        assert_eq!(parse_filter("all"), Ok(None));
        assert_eq!(parse_filter("post_created"), Ok(Some("post_created")));
        assert_eq!(parse_filter("badge_earned"), Ok(Some("badge_earned")));
        assert!(parse_filter("posts").is_err());
        assert!(parse_filter("").is_err());
    }

    #[test]
    fn has_more_matches_page_arithmetic() {
        // 45 rows, 20 per page: pages 1 and 2 have more, page 3 does not.
        assert!(has_more(45, 1, 20));
        assert!(has_more(45, 2, 20));
        assert!(!has_more(45, 3, 20));
        // Exact boundary: 40 rows fill page 2 exactly.
        assert!(!has_more(40, 2, 20));
        assert!(!has_more(0, 1, 20));
    }
}
