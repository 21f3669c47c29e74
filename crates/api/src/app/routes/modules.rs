use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, OriginalUri, Path, Query},
    routing::{delete, get, post, put},
};

use eproc_auth::catalog::{CREATE_MODULE, DELETE_MODULE, UPDATE_MODULE, VIEW_MODULE};
use eproc_core::ModuleId;
use eproc_infra::store::ModuleRecord;

use crate::app::dto::{Listed, ModuleDetail, ModuleRequest, ModuleView};
use crate::app::errors::{Empty, Entity, Envelope, ServiceResult};
use crate::app::routes::common::{JsonBody, guarded, list_request, parse_id};
use crate::app::services::AppServices;
use crate::middleware::RouteGuard;

pub fn router() -> Router {
    let view = RouteGuard::any_of(&[VIEW_MODULE, CREATE_MODULE, UPDATE_MODULE, DELETE_MODULE]);
    Router::new()
        .route(
            "/",
            guarded(get(list_modules), view.clone())
                .merge(guarded(post(create_module), RouteGuard::any_of(&[CREATE_MODULE]))),
        )
        .route(
            "/:id",
            guarded(get(get_module), view)
                .merge(guarded(put(update_module), RouteGuard::any_of(&[UPDATE_MODULE])))
                .merge(guarded(delete(delete_module), RouteGuard::any_of(&[DELETE_MODULE]))),
        )
}

pub async fn list_modules(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<HashMap<String, String>>,
    uri: OriginalUri,
) -> ServiceResult<Envelope<Listed<ModuleView>>> {
    let req = list_request(&params, &uri, ModuleRecord::SORTABLE);
    let data = services.modules.list(&req).await?;
    Ok(Envelope::ok(Entity::Module.listed(), data))
}

pub async fn get_module(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<ModuleDetail>> {
    let id: ModuleId = parse_id(&id)?;
    let data = services.modules.get(id).await?;
    Ok(Envelope::ok(Entity::Module.fetched(), data))
}

pub async fn create_module(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<ModuleRequest>,
) -> ServiceResult<Envelope<ModuleView>> {
    let input = body.validate()?;
    let data = services.modules.create(input).await?;
    Ok(Envelope::created(Entity::Module.created(), data))
}

pub async fn update_module(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ModuleRequest>,
) -> ServiceResult<Envelope<ModuleView>> {
    let id: ModuleId = parse_id(&id)?;
    let input = body.validate()?;
    let data = services.modules.update(id, input).await?;
    Ok(Envelope::ok(Entity::Module.updated(), data))
}

pub async fn delete_module(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<Empty>> {
    let id: ModuleId = parse_id(&id)?;
    services.modules.delete(id).await?;
    Ok(Envelope::ok(Entity::Module.deleted(), Empty {}))
}
