//! Gateway identity extraction.
//!
//! The upstream gateway authenticates the session and forwards the result as
//! request headers; this extractor only reads that assertion. `x-user-id`
//! and `x-tenant-id` name the actor, and the optional `x-team-ids`,
//! `x-role-ids` (comma-separated UUID lists) and `x-super-admin` headers
//! carry membership facts for callers that resolve them at the edge.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::HeaderMap;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Default)]
pub struct GatewayIdentity {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub team_ids: Option<Vec<Uuid>>,
    pub role_ids: Option<Vec<Uuid>>,
    pub is_super_admin: Option<bool>,
}

impl GatewayIdentity {
    /// Whether the gateway resolved membership itself. When false the
    /// membership directory is the source of truth.
    pub fn carries_membership_facts(&self) -> bool {
        self.team_ids.is_some() || self.role_ids.is_some() || self.is_super_admin.is_some()
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, AppError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::invalid_request(format!("{name} header is not valid UTF-8")))
        })
        .transpose()
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, AppError> {
    header_str(headers, name)?
        .map(|value| {
            Uuid::parse_str(value.trim())
                .map_err(|_| AppError::invalid_request(format!("{name} header is not a valid UUID")))
        })
        .transpose()
}

/// An empty header value is an explicit empty list, not an absent one.
fn header_uuid_list(headers: &HeaderMap, name: &str) -> Result<Option<Vec<Uuid>>, AppError> {
    header_str(headers, name)?
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| {
                    Uuid::parse_str(part).map_err(|_| {
                        AppError::invalid_request(format!(
                            "{name} header contains an invalid UUID: {part}"
                        ))
                    })
                })
                .collect::<Result<Vec<Uuid>, AppError>>()
        })
        .transpose()
}

fn header_bool(headers: &HeaderMap, name: &str) -> Result<Option<bool>, AppError> {
    header_str(headers, name)?
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(AppError::invalid_request(format!(
                "{name} header must be true or false"
            ))),
        })
        .transpose()
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for GatewayIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        Ok(GatewayIdentity {
            user_id: header_uuid(headers, "x-user-id")?,
            tenant_id: header_uuid(headers, "x-tenant-id")?,
            team_ids: header_uuid_list(headers, "x-team-ids")?,
            role_ids: header_uuid_list(headers, "x-role-ids")?,
            is_super_admin: header_bool(headers, "x-super-admin")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    async fn extract(req: Request<Body>) -> Result<GatewayIdentity, AppError> {
        let (mut parts, _) = req.into_parts();
        GatewayIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn bare_request_yields_an_empty_identity() {
        let identity = extract(Request::new(Body::empty())).await.unwrap();
        assert!(identity.user_id.is_none());
        assert!(identity.tenant_id.is_none());
        assert!(!identity.carries_membership_facts());
    }

    #[tokio::test]
    async fn full_header_set_is_read() {
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let team_a = Uuid::new_v4();
        let team_b = Uuid::new_v4();
        let role = Uuid::new_v4();

        let req = Request::builder()
            .header("x-user-id", user.to_string())
            .header("x-tenant-id", tenant.to_string())
            .header("x-team-ids", format!("{team_a}, {team_b}"))
            .header("x-role-ids", role.to_string())
            .header("x-super-admin", "false")
            .body(Body::empty())
            .unwrap();

        let identity = extract(req).await.unwrap();
        assert_eq!(identity.user_id, Some(user));
        assert_eq!(identity.tenant_id, Some(tenant));
        assert_eq!(identity.team_ids, Some(vec![team_a, team_b]));
        assert_eq!(identity.role_ids, Some(vec![role]));
        assert_eq!(identity.is_super_admin, Some(false));
        assert!(identity.carries_membership_facts());
    }

    #[tokio::test]
    async fn empty_list_header_is_an_explicit_empty_list() {
        let req = Request::builder()
            .header("x-team-ids", "")
            .body(Body::empty())
            .unwrap();

        let identity = extract(req).await.unwrap();
        assert_eq!(identity.team_ids, Some(Vec::new()));
        assert!(identity.carries_membership_facts());
    }

    #[tokio::test]
    async fn malformed_uuid_in_a_list_is_rejected() {
        let req = Request::builder()
            .header("x-role-ids", format!("{}, not-a-uuid", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        let err = extract(req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn malformed_user_id_is_rejected() {
        let req = Request::builder()
            .header("x-user-id", "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let err = extract(req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
