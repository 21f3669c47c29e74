use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, OriginalUri, Path, Query},
    routing::{delete, get, post, put},
};

use eproc_auth::catalog::{CREATE_FEATURE, DELETE_FEATURE, UPDATE_FEATURE, VIEW_FEATURE};
use eproc_core::FeatureId;
use eproc_infra::store::{FeatureFilter, FeatureRecord};

use crate::app::dto::{FeatureDetail, FeatureRequest, FeatureView, Listed};
use crate::app::errors::{Empty, Entity, Envelope, ServiceResult};
use crate::app::routes::common::{JsonBody, filter, guarded, list_request, parse_id};
use crate::app::services::AppServices;
use crate::middleware::RouteGuard;

pub fn router() -> Router {
    let view = RouteGuard::any_of(&[VIEW_FEATURE, CREATE_FEATURE, UPDATE_FEATURE, DELETE_FEATURE]);
    Router::new()
        .route(
            "/",
            guarded(get(list_features), view.clone())
                .merge(guarded(post(create_feature), RouteGuard::any_of(&[CREATE_FEATURE]))),
        )
        .route(
            "/:id",
            guarded(get(get_feature), view)
                .merge(guarded(put(update_feature), RouteGuard::any_of(&[UPDATE_FEATURE])))
                .merge(guarded(delete(delete_feature), RouteGuard::any_of(&[DELETE_FEATURE]))),
        )
}

/// Supports `?module_id=` to list one module's features.
pub async fn list_features(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<HashMap<String, String>>,
    uri: OriginalUri,
) -> ServiceResult<Envelope<Listed<FeatureView>>> {
    let by = FeatureFilter {
        module_id: filter(&params, "module_id")?,
    };
    let req = list_request(&params, &uri, FeatureRecord::SORTABLE);
    let data = services.features.list(by, &req).await?;
    Ok(Envelope::ok(Entity::Feature.listed(), data))
}

pub async fn get_feature(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<FeatureDetail>> {
    let id: FeatureId = parse_id(&id)?;
    let data = services.features.get(id).await?;
    Ok(Envelope::ok(Entity::Feature.fetched(), data))
}

pub async fn create_feature(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<FeatureRequest>,
) -> ServiceResult<Envelope<FeatureView>> {
    let input = body.validate()?;
    let data = services.features.create(input).await?;
    Ok(Envelope::created(Entity::Feature.created(), data))
}

pub async fn update_feature(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<FeatureRequest>,
) -> ServiceResult<Envelope<FeatureView>> {
    let id: FeatureId = parse_id(&id)?;
    let input = body.validate()?;
    let data = services.features.update(id, input).await?;
    Ok(Envelope::ok(Entity::Feature.updated(), data))
}

pub async fn delete_feature(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<Empty>> {
    let id: FeatureId = parse_id(&id)?;
    services.features.delete(id).await?;
    Ok(Envelope::ok(Entity::Feature.deleted(), Empty {}))
}
