use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, OriginalUri, Path, Query},
    routing::{delete, get, post, put},
};

use eproc_auth::catalog::{CREATE_ROLE, DELETE_ROLE, UPDATE_ROLE, VIEW_ROLE};
use eproc_core::RoleId;
use eproc_infra::store::RoleRecord;

use crate::app::dto::{Listed, RoleDetail, RoleRequest, RoleView};
use crate::app::errors::{Empty, Entity, Envelope, ServiceResult};
use crate::app::routes::common::{JsonBody, guarded, list_request, parse_id};
use crate::app::services::AppServices;
use crate::middleware::RouteGuard;

pub fn router() -> Router {
    let view = RouteGuard::any_of(&[VIEW_ROLE, CREATE_ROLE, UPDATE_ROLE, DELETE_ROLE]);
    Router::new()
        .route(
            "/",
            guarded(get(list_roles), view.clone())
                .merge(guarded(post(create_role), RouteGuard::any_of(&[CREATE_ROLE]))),
        )
        .route(
            "/:id",
            guarded(get(get_role), view)
                .merge(guarded(put(update_role), RouteGuard::any_of(&[UPDATE_ROLE])))
                .merge(guarded(delete(delete_role), RouteGuard::any_of(&[DELETE_ROLE]))),
        )
}

pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<HashMap<String, String>>,
    uri: OriginalUri,
) -> ServiceResult<Envelope<Listed<RoleView>>> {
    let req = list_request(&params, &uri, RoleRecord::SORTABLE);
    let data = services.roles.list(&req).await?;
    Ok(Envelope::ok(Entity::Role.listed(), data))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<RoleDetail>> {
    let id: RoleId = parse_id(&id)?;
    let data = services.roles.get(id).await?;
    Ok(Envelope::ok(Entity::Role.fetched(), data))
}

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<RoleRequest>,
) -> ServiceResult<Envelope<RoleView>> {
    let input = body.validate()?;
    let data = services.roles.create(input).await?;
    Ok(Envelope::created(Entity::Role.created(), data))
}

/// `features` replaces the granted set.
pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RoleRequest>,
) -> ServiceResult<Envelope<RoleView>> {
    let id: RoleId = parse_id(&id)?;
    let input = body.validate()?;
    let data = services.roles.update(id, input).await?;
    Ok(Envelope::ok(Entity::Role.updated(), data))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<Empty>> {
    let id: RoleId = parse_id(&id)?;
    services.roles.delete(id).await?;
    Ok(Envelope::ok(Entity::Role.deleted(), Empty {}))
}
