use crate::orm::users;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait, FromQueryResult};

/// A mini struct for holding only what information we need about a client.
#[derive(Clone, Debug, FromQueryResult)]
pub struct ClientUser {
    pub id: i32,
    pub name: String,
    pub is_moderator: bool,
}

pub async fn get_client_user_by_id(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Option<ClientUser>, DbErr> {
    Ok(users::Entity::find_by_id(id)
        .one(db)
        .await?
        .map(|u| ClientUser {
            id: u.id,
            name: u.name,
            is_moderator: u.is_moderator,
        }))
}
