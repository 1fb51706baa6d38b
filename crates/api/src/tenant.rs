//! Caller identity carried in request headers.

use std::str::FromStr;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ApiError;

pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const TENANT_TIER_HEADER: &str = "x-tenant-tier";

/// Billing tier; selects the tenant's rate limit. Ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Paid,
}

impl FromStr for Tier {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "paid" => Ok(Self::Paid),
            other => Err(ApiError::BadRequest(format!("unknown tenant tier: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenant {
    pub id: Uuid,
    pub tier: Tier,
}

impl Tenant {
    /// Read the tenant from `X-Tenant-ID` / `X-Tenant-Tier`.
    ///
    /// `Ok(None)` when no tenant id is present; the tier defaults to free.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, ApiError> {
        let Some(raw_id) = headers.get(TENANT_ID_HEADER) else {
            return Ok(None);
        };
        let id = raw_id
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| ApiError::BadRequest("X-Tenant-ID must be a UUID".into()))?;

        let tier = match headers.get(TENANT_TIER_HEADER) {
            Some(raw) => raw
                .to_str()
                .map_err(|_| ApiError::BadRequest("X-Tenant-Tier is not valid text".into()))?
                .parse()?,
            None => Tier::Free,
        };

        Ok(Some(Self { id, tier }))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)?.ok_or(ApiError::MissingTenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn absent_tenant_is_none() {
        assert_eq!(Tenant::from_headers(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn tier_defaults_to_free() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());

        let tenant = Tenant::from_headers(&headers).unwrap().unwrap();
        assert_eq!(tenant, Tenant { id, tier: Tier::Free });

        headers.insert(TENANT_TIER_HEADER, HeaderValue::from_static("Paid"));
        assert_eq!(Tenant::from_headers(&headers).unwrap().unwrap().tier, Tier::Paid);
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            Tenant::from_headers(&headers),
            Err(ApiError::BadRequest(_))
        ));

        headers.insert(
            TENANT_ID_HEADER,
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        );
        headers.insert(TENANT_TIER_HEADER, HeaderValue::from_static("platinum"));
        assert!(Tenant::from_headers(&headers).is_err());
    }
}
