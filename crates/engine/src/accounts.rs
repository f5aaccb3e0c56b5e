//! The module contains `Account` struct and its storage model.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

use crate::{AccountId, MoneyCents, UserId};

/// An account holding a balance.
///
/// `integrity_tag` must always equal the keyed tag of `(balance, id)`. The
/// engine is the only writer of `balance` and `integrity_tag`; any account
/// read back with a mismatching tag is treated as tampered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: UserId,
    pub balance: MoneyCents,
    integrity_tag: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Rebuild an account exactly as it was read from storage.
    pub fn from_parts(
        id: AccountId,
        owner_id: UserId,
        balance: MoneyCents,
        integrity_tag: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            balance,
            integrity_tag,
            created_at,
        }
    }

    pub fn integrity_tag(&self) -> &str {
        &self.integrity_tag
    }

    /// Copy of this account carrying a new balance and its tag.
    pub(crate) fn rebalanced(&self, balance: MoneyCents, integrity_tag: String) -> Self {
        Self {
            balance,
            integrity_tag,
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub owner_id: i64,
    pub balance: i64,
    pub integrity_tag: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::OwnerId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Account {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            balance: MoneyCents::new(model.balance),
            integrity_tag: model.integrity_tag,
            created_at: model.created_at,
        }
    }
}
