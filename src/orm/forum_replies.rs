use sea_orm::entity::prelude::*;

/// Nested replies. depth is parent depth + 1, 0 for top-level; the parent
/// must belong to the same post.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "forum_replies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub post_id: i32,
    pub parent_reply_id: Option<i32>,
    pub user_id: i32,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub depth: i32,
    pub status: String,
    pub upvotes_count: i32,
    pub downvotes_count: i32,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::forum_posts::Entity",
        from = "Column::PostId",
        to = "super::forum_posts::Column::Id",
        on_delete = "Cascade"
    )]
    ForumPosts,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "NoAction"
    )]
    Users,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentReplyId",
        to = "Column::Id",
        on_delete = "NoAction"
    )]
    Parent,
}

impl Related<super::forum_posts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForumPosts.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
