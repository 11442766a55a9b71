use sea_orm::entity::prelude::*;

/// Thread roots. Vote and reply counters are caches over forum_votes and
/// forum_replies rows and are only mutated inside the same transaction as
/// the rows they track.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "forum_posts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub category_id: i32,
    pub user_id: i32,
    pub title: String,
    pub slug: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub status: String,
    pub pinned: bool,
    pub locked: bool,
    pub views_count: i32,
    pub replies_count: i32,
    pub upvotes_count: i32,
    pub downvotes_count: i32,
    pub created_at: DateTime,
    pub last_activity_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::forum_categories::Entity",
        from = "Column::CategoryId",
        to = "super::forum_categories::Column::Id",
        on_delete = "Cascade"
    )]
    ForumCategories,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "NoAction"
    )]
    Users,
    #[sea_orm(has_many = "super::forum_replies::Entity")]
    ForumReplies,
    #[sea_orm(has_many = "super::forum_subscriptions::Entity")]
    ForumSubscriptions,
}

impl Related<super::forum_categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForumCategories.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::forum_replies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForumReplies.def()
    }
}

impl Related<super::forum_subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForumSubscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
