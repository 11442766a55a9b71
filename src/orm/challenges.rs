use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "challenges")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub metric: String,
    pub target_value: i32,
    pub active: bool,
    pub start_date: Option<DateTime>,
    pub end_date: Option<DateTime>,
    pub order_index: i32,
    pub badge_name: Option<String>,
    pub badge_icon: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::challenge_progress::Entity")]
    ChallengeProgress,
}

impl Related<super::challenge_progress::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChallengeProgress.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
