//! SeaORM implementation of IdentityResolver

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::domain::{IdentityResolver, LendingError, PatronKey};
use crate::models::card::{Column, Entity as CardEntity};

/// Resolves patrons against the local card table.
pub struct SeaOrmCardDirectory {
    db: DatabaseConnection,
}

impl SeaOrmCardDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityResolver for SeaOrmCardDirectory {
    async fn resolve_card(&self, key: &PatronKey) -> Result<Option<i32>, LendingError> {
        let card = match key {
            PatronKey::CardId(id) => CardEntity::find_by_id(*id).one(&self.db).await?,
            PatronKey::Email(email) => {
                CardEntity::find()
                    .filter(Column::PatronEmail.eq(email.trim().to_lowercase()))
                    .one(&self.db)
                    .await?
            }
        };
        Ok(card.map(|c| c.id))
    }
}
