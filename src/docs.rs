use utoipa::OpenApi;

use crate::authz;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::tenants::provision_tenant,
        routes::roles::list_roles,
        routes::roles::create_role,
        routes::roles::get_role,
        routes::roles::update_role,
        routes::roles::archive_role,
        routes::roles::reorder_roles,
        routes::roles::set_users_count,
        routes::check::check,
        routes::health::health
    ),
    components(
        schemas(
            authz::Target,
            models::permission::Permission,
            models::permission::Action,
            models::permission::Scope,
            models::decision::Decision,
            models::role::RoleView,
            models::role::GrantInput,
            models::role::RoleCreateRequest,
            models::role::RoleUpdateRequest,
            models::role::ReorderRequest,
            models::role::UsersCountRequest,
            routes::check::CheckRequest,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "Tenants", description = "Tenant provisioning"),
        (name = "Roles", description = "Role administration"),
        (name = "Authorization", description = "Policy decisions"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;
