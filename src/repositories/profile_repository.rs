use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::profile::{self, Entity as Profile, Model as ProfileModel};
use crate::repositories::Repository;

use super::BaseRepository;

/// Lookup of customer and professional contact details.
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfileModel>, DbErr>;
}

#[derive(Debug, Clone)]
pub struct ProfileRepository {
    base: BaseRepository,
}

impl ProfileRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn insert(&self, profile: profile::ActiveModel) -> Result<ProfileModel, DbErr> {
        profile.insert(self.base.get_db()).await
    }
}

#[async_trait]
impl PartyDirectory for ProfileRepository {
    async fn find_profile(&self, id: Uuid) -> Result<Option<ProfileModel>, DbErr> {
        Profile::find_by_id(id).one(self.base.get_db()).await
    }
}
