use sea_orm::entity::prelude::*;

/// One row per (user, target) vote. Exactly one of post_id / reply_id is
/// set; uniqueness over the pair is enforced by the database.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "forum_votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub post_id: Option<i32>,
    pub reply_id: Option<i32>,
    pub vote_type: String,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::forum_posts::Entity",
        from = "Column::PostId",
        to = "super::forum_posts::Column::Id",
        on_delete = "Cascade"
    )]
    ForumPosts,
    #[sea_orm(
        belongs_to = "super::forum_replies::Entity",
        from = "Column::ReplyId",
        to = "super::forum_replies::Column::Id",
        on_delete = "Cascade"
    )]
    ForumReplies,
}

impl ActiveModelBehavior for ActiveModel {}
