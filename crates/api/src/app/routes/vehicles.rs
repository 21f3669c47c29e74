use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, OriginalUri, Path, Query},
    routing::{delete, get, post, put},
};

use eproc_auth::catalog::{CREATE_VEHICLE, DELETE_VEHICLE, UPDATE_VEHICLE, VIEW_VEHICLE};
use eproc_core::VehicleId;
use eproc_infra::store::{VehicleFilter, VehicleRecord};

use crate::app::dto::{Listed, VehicleRequest, VehicleView};
use crate::app::errors::{Empty, Entity, Envelope, ServiceResult};
use crate::app::routes::common::{JsonBody, bool_filter, filter, guarded, list_request, parse_id};
use crate::app::services::AppServices;
use crate::middleware::RouteGuard;

pub fn router() -> Router {
    let view = RouteGuard::any_of(&[VIEW_VEHICLE, CREATE_VEHICLE, UPDATE_VEHICLE, DELETE_VEHICLE]);
    Router::new()
        .route(
            "/",
            guarded(get(list_vehicles), view.clone())
                .merge(guarded(post(create_vehicle), RouteGuard::any_of(&[CREATE_VEHICLE]))),
        )
        .route(
            "/:id",
            guarded(get(get_vehicle), view)
                .merge(guarded(put(update_vehicle), RouteGuard::any_of(&[UPDATE_VEHICLE])))
                .merge(guarded(delete(delete_vehicle), RouteGuard::any_of(&[DELETE_VEHICLE]))),
        )
}

/// Filters: `type_id`, `is_available`.
pub async fn list_vehicles(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<HashMap<String, String>>,
    uri: OriginalUri,
) -> ServiceResult<Envelope<Listed<VehicleView>>> {
    let by = VehicleFilter {
        type_id: filter(&params, "type_id")?,
        is_available: bool_filter(&params, "is_available")?,
    };
    let req = list_request(&params, &uri, VehicleRecord::SORTABLE);
    let data = services.vehicles.list(by, &req).await?;
    Ok(Envelope::ok(Entity::Vehicle.listed(), data))
}

pub async fn get_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<VehicleView>> {
    let id: VehicleId = parse_id(&id)?;
    let data = services.vehicles.get(id).await?;
    Ok(Envelope::ok(Entity::Vehicle.fetched(), data))
}

pub async fn create_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<VehicleRequest>,
) -> ServiceResult<Envelope<VehicleView>> {
    let input = body.validate()?;
    let data = services.vehicles.create(input).await?;
    Ok(Envelope::created(Entity::Vehicle.created(), data))
}

pub async fn update_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<VehicleRequest>,
) -> ServiceResult<Envelope<VehicleView>> {
    let id: VehicleId = parse_id(&id)?;
    let input = body.validate()?;
    let data = services.vehicles.update(id, input).await?;
    Ok(Envelope::ok(Entity::Vehicle.updated(), data))
}

pub async fn delete_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<Empty>> {
    let id: VehicleId = parse_id(&id)?;
    services.vehicles.delete(id).await?;
    Ok(Envelope::ok(Entity::Vehicle.deleted(), Empty {}))
}
