use sea_orm::entity::prelude::*;

/// User reports against posts or replies. Resolution is a moderator action
/// and never mutates the reported content itself.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "forum_reports")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub reporter_id: i32,
    pub post_id: Option<i32>,
    pub reply_id: Option<i32>,
    #[sea_orm(column_type = "Text")]
    pub reason: String,
    pub status: String,
    pub created_at: DateTime,
    pub resolved_by: Option<i32>,
    pub resolved_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ReporterId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    Reporter,
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
