use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, OriginalUri, Path, Query},
    routing::{delete, get, post, put},
};

use eproc_auth::catalog::{
    CREATE_VEHICLE_TYPE, DELETE_VEHICLE_TYPE, UPDATE_VEHICLE_TYPE, VIEW_VEHICLE_TYPE,
};
use eproc_core::VehicleTypeId;
use eproc_infra::store::VehicleTypeRecord;

use crate::app::dto::{Listed, VehicleTypeRequest, VehicleTypeView};
use crate::app::errors::{Empty, Entity, Envelope, ServiceResult};
use crate::app::routes::common::{JsonBody, guarded, list_request, parse_id};
use crate::app::services::AppServices;
use crate::middleware::RouteGuard;

pub fn router() -> Router {
    let view = RouteGuard::any_of(&[
        VIEW_VEHICLE_TYPE,
        CREATE_VEHICLE_TYPE,
        UPDATE_VEHICLE_TYPE,
        DELETE_VEHICLE_TYPE,
    ]);
    Router::new()
        .route(
            "/",
            guarded(get(list_types), view.clone())
                .merge(guarded(post(create_type), RouteGuard::any_of(&[CREATE_VEHICLE_TYPE]))),
        )
        .route(
            "/:id",
            guarded(get(get_type), view)
                .merge(guarded(put(update_type), RouteGuard::any_of(&[UPDATE_VEHICLE_TYPE])))
                .merge(guarded(delete(delete_type), RouteGuard::any_of(&[DELETE_VEHICLE_TYPE]))),
        )
}

pub async fn list_types(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<HashMap<String, String>>,
    uri: OriginalUri,
) -> ServiceResult<Envelope<Listed<VehicleTypeView>>> {
    let req = list_request(&params, &uri, VehicleTypeRecord::SORTABLE);
    let data = services.vehicle_types.list(&req).await?;
    Ok(Envelope::ok(Entity::VehicleType.listed(), data))
}

pub async fn get_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<VehicleTypeView>> {
    let id: VehicleTypeId = parse_id(&id)?;
    let data = services.vehicle_types.get(id).await?;
    Ok(Envelope::ok(Entity::VehicleType.fetched(), data))
}

pub async fn create_type(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<VehicleTypeRequest>,
) -> ServiceResult<Envelope<VehicleTypeView>> {
    let name = body.validate()?;
    let data = services.vehicle_types.create(name).await?;
    Ok(Envelope::created(Entity::VehicleType.created(), data))
}

pub async fn update_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<VehicleTypeRequest>,
) -> ServiceResult<Envelope<VehicleTypeView>> {
    let id: VehicleTypeId = parse_id(&id)?;
    let name = body.validate()?;
    let data = services.vehicle_types.update(id, name).await?;
    Ok(Envelope::ok(Entity::VehicleType.updated(), data))
}

pub async fn delete_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<Empty>> {
    let id: VehicleTypeId = parse_id(&id)?;
    services.vehicle_types.delete(id).await?;
    Ok(Envelope::ok(Entity::VehicleType.deleted(), Empty {}))
}
