use crate::activity::{emit, ActivityKind};
use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{forum_categories, forum_posts, users};
use crate::reputation::{award, AwardReason, POINTS_POST};
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use chrono::prelude::Utc;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, FromQueryResult};
use serde::{Deserialize, Serialize};

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_DELETED: &str = "deleted";
pub const STATUS_SPAM: &str = "spam";

pub const POSTS_PER_PAGE: usize = 20;

/// Derives a URL slug from a title: lowercased, alphanumeric runs joined
/// by single dashes, capped at 80 chars.
pub fn derive_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug.truncate(80);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// A fully joined struct representing the post model and its relational data.
#[derive(Debug, FromQueryResult, Serialize)]
pub struct PostForJson {
    pub id: i32,
    pub category_id: i32,
    pub user_id: i32,
    pub username: Option<String>,
    pub title: String,
    pub slug: String,
    pub status: String,
    pub pinned: bool,
    pub locked: bool,
    pub views_count: i32,
    pub replies_count: i32,
    pub upvotes_count: i32,
    pub downvotes_count: i32,
    pub created_at: chrono::NaiveDateTime,
    pub last_activity_at: chrono::NaiveDateTime,
}

/// Live count of visible posts in a category. Computed per query instead of
/// cached; category cardinality is small and this can never drift.
pub async fn category_posts_count(
    db: &DatabaseConnection,
    category_id: i32,
) -> Result<usize, DbErr> {
    forum_posts::Entity::find()
        .filter(forum_posts::Column::CategoryId.eq(category_id))
        .filter(forum_posts::Column::Status.eq(STATUS_ACTIVE))
        .paginate(db, 1)
        .num_items()
        .await
}

#[get("/forums")]
pub async fn view_forum_index() -> Result<impl Responder, Error> {
    let db = get_db_pool();

    let categories = forum_categories::Entity::find()
        .order_by_asc(forum_categories::Column::OrderIndex)
        .order_by_asc(forum_categories::Column::Id)
        .all(db)
        .await
        .map_err(error::ErrorInternalServerError)?;

    #[derive(Serialize)]
    struct CategoryEntry {
        id: i32,
        name: String,
        slug: String,
        description: Option<String>,
        posts_count: usize,
    }

    let mut entries = Vec::with_capacity(categories.len());
    for category in categories {
        let posts_count = category_posts_count(db, category.id)
            .await
            .map_err(error::ErrorInternalServerError)?;
        entries.push(CategoryEntry {
            id: category.id,
            name: category.name,
            slug: category.slug,
            description: category.description,
            posts_count,
        });
    }

    Ok(HttpResponse::Ok().json(entries))
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
}

#[get("/forums/{slug}")]
pub async fn view_forum(
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let slug = path.into_inner();

    let category = forum_categories::Entity::find()
        .filter(forum_categories::Column::Slug.eq(slug))
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Forum category not found."))?;

    let page = query.page.unwrap_or(1).max(1);
    let paginator = forum_posts::Entity::find()
        .filter(forum_posts::Column::CategoryId.eq(category.id))
        .filter(forum_posts::Column::Status.eq(STATUS_ACTIVE))
        .left_join(users::Entity)
        .column_as(users::Column::Name, "username")
        .order_by_desc(forum_posts::Column::Pinned)
        .order_by_desc(forum_posts::Column::LastActivityAt)
        .order_by_desc(forum_posts::Column::Id)
        .into_model::<PostForJson>()
        .paginate(db, POSTS_PER_PAGE);

    let total = paginator
        .num_items()
        .await
        .map_err(error::ErrorInternalServerError)?;
    let items = paginator
        .fetch_page(page - 1)
        .await
        .map_err(error::ErrorInternalServerError)?;

    #[derive(Serialize)]
    struct ForumResponse {
        id: i32,
        name: String,
        slug: String,
        description: Option<String>,
        posts_count: usize,
        items: Vec<PostForJson>,
        has_more: bool,
    }

    Ok(HttpResponse::Ok().json(ForumResponse {
        id: category.id,
        name: category.name,
        slug: category.slug,
        description: category.description,
        posts_count: total,
        has_more: crate::activity::has_more(total, page, POSTS_PER_PAGE),
        items,
    }))
}

#[derive(Deserialize)]
pub struct NewPostData {
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
}

fn validate_post_form(form: NewPostData) -> Result<NewPostData, Error> {
    let title = form.title.trim().to_owned();
    let content = form.content.trim().to_owned();

    if title.is_empty() {
        return Err(error::ErrorUnprocessableEntity("Threads must have a title."));
    }
    if content.is_empty() {
        return Err(error::ErrorUnprocessableEntity(
            "Input must contain content.",
        ));
    }

    Ok(NewPostData {
        title,
        slug: form.slug.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()),
        content,
    })
}

#[post("/forums/{slug}/post-thread")]
pub async fn create_thread(
    client: ClientCtx,
    path: web::Path<String>,
    form: web::Json<NewPostData>,
) -> Result<impl Responder, Error> {
    let author_id = client.require_id()?;
    let db = get_db_pool();

    let category = forum_categories::Entity::find()
        .filter(forum_categories::Column::Slug.eq(path.into_inner()))
        .one(db)
        .await
        .map_err(error::ErrorInternalServerError)?
        .ok_or_else(|| error::ErrorNotFound("Forum category not found."))?;

    // Run form data through validator.
    let form = validate_post_form(form.into_inner())?;
    let slug = match &form.slug {
        Some(slug) => derive_slug(slug),
        None => derive_slug(&form.title),
    };
    let now = Utc::now().naive_utc();

    // The post row, its activity event and the author's points move in one
    // atomic unit.
    let txn = db.begin().await.map_err(error::ErrorInternalServerError)?;

    let new_post = forum_posts::ActiveModel {
        category_id: Set(category.id),
        user_id: Set(author_id),
        title: Set(form.title.to_owned()),
        slug: Set(slug),
        content: Set(form.content.to_owned()),
        status: Set(STATUS_ACTIVE.to_owned()),
        pinned: Set(false),
        locked: Set(false),
        views_count: Set(0),
        replies_count: Set(0),
        upvotes_count: Set(0),
        downvotes_count: Set(0),
        created_at: Set(now),
        last_activity_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(error::ErrorInternalServerError)?;

    emit(
        &txn,
        author_id,
        ActivityKind::PostCreated {
            post_id: new_post.id,
            title: new_post.title.to_owned(),
        },
    )
    .await
    .map_err(error::ErrorInternalServerError)?;

    award(&txn, author_id, POINTS_POST, AwardReason::Post)
        .await
        .map_err(error::ErrorInternalServerError)?;

    txn.commit().await.map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Created().json(PostForJson {
        id: new_post.id,
        category_id: new_post.category_id,
        user_id: new_post.user_id,
        username: Some(client.get_name()),
        title: new_post.title,
        slug: new_post.slug,
        status: new_post.status,
        pinned: new_post.pinned,
        locked: new_post.locked,
        views_count: new_post.views_count,
        replies_count: new_post.replies_count,
        upvotes_count: new_post.upvotes_count,
        downvotes_count: new_post.downvotes_count,
        created_at: new_post.created_at,
        last_activity_at: new_post.last_activity_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::derive_slug;

    #[test]
    fn slugs_collapse_and_trim_separator_runs() {
        assert_eq!(derive_slug("Travel Tips"), "travel-tips");
        assert_eq!(derive_slug("  Trasee -- de munte!  "), "trasee-de-munte");
        assert_eq!(derive_slug("Cazare: ieftina & buna?"), "cazare-ieftina-buna");
    }

    #[test]
    fn slugs_never_exceed_eighty_chars() {
        let long = "a ".repeat(200);
        let slug = derive_slug(&long);
        assert!(slug.len() <= 80);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn non_ascii_titles_degrade_to_dashes() {
        assert_eq!(derive_slug("Drumeții în Bucegi"), "drume-ii-n-bucegi");
    }
}
