//! Encrypted credential rows. Values are opaque here; see `CredentialCipher`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::CredentialRow, DbError};

pub async fn find_credential(
    pool: &PgPool,
    owner_id: Uuid,
    service: &str,
) -> Result<Option<CredentialRow>, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, owner_id, service, encrypted_value, created_at
        FROM credentials
        WHERE owner_id = $1 AND service = $2
        "#,
    )
    .bind(owner_id)
    .bind(service)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
