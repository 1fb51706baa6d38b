//! Postgres-backed [`Store`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{LogRow, WorkflowRow};
use crate::repository::{credentials, logs, workflows};
use crate::{CredentialCipher, DbError, DbPool, Store};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
    cipher: CredentialCipher,
}

impl PgStore {
    pub fn new(pool: DbPool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_active_scheduled_workflows(&self) -> Result<Vec<WorkflowRow>, DbError> {
        workflows::list_active_scheduled(&self.pool).await
    }

    async fn get_workflow_by_id(&self, id: Uuid) -> Result<Option<WorkflowRow>, DbError> {
        workflows::get_workflow(&self.pool, id).await
    }

    async fn update_workflow_last_executed(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        workflows::set_last_executed(&self.pool, id, at).await
    }

    async fn update_workflow_active(&self, id: Uuid, is_active: bool) -> Result<(), DbError> {
        workflows::set_active(&self.pool, id, is_active).await
    }

    async fn create_log(
        &self,
        workflow_id: Uuid,
        status: &str,
        message: &str,
    ) -> Result<LogRow, DbError> {
        logs::insert_log(&self.pool, workflow_id, status, message).await
    }

    async fn get_credential(
        &self,
        owner_id: Uuid,
        service: &str,
    ) -> Result<Option<String>, DbError> {
        match credentials::find_credential(&self.pool, owner_id, service).await? {
            Some(row) => self.cipher.decrypt(&row.encrypted_value).map(Some),
            None => Ok(None),
        }
    }
}
