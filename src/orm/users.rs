use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub is_moderator: bool,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::forum_posts::Entity")]
    ForumPosts,
    #[sea_orm(has_many = "super::forum_replies::Entity")]
    ForumReplies,
    #[sea_orm(has_many = "super::activity_events::Entity")]
    ActivityEvents,
    #[sea_orm(has_one = "super::user_reputation::Entity")]
    UserReputation,
}

impl Related<super::forum_posts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForumPosts.def()
    }
}

impl Related<super::forum_replies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForumReplies.def()
    }
}

impl Related<super::activity_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActivityEvents.def()
    }
}

impl Related<super::user_reputation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserReputation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
