use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, OriginalUri, Path, Query},
    routing::{delete, get, post, put},
};

use eproc_auth::catalog::{CREATE_LOAN, DELETE_LOAN, UPDATE_LOAN, VIEW_LOAN};
use eproc_core::LoanId;
use eproc_infra::store::{LoanFilter, LoanRecord};

use crate::app::dto::{Listed, LoanRequest, LoanView};
use crate::app::errors::{Empty, Entity, Envelope, ServiceResult};
use crate::app::routes::common::{JsonBody, filter, guarded, list_request, parse_id};
use crate::app::services::AppServices;
use crate::context::UserContext;
use crate::middleware::RouteGuard;

pub const MSG_RETURNED: &str = "Loan returned successfully";

pub fn router() -> Router {
    let view = RouteGuard::any_of(&[VIEW_LOAN, CREATE_LOAN, UPDATE_LOAN, DELETE_LOAN]);
    Router::new()
        .route(
            "/",
            guarded(get(list_loans), view.clone())
                .merge(guarded(post(create_loan), RouteGuard::any_of(&[CREATE_LOAN]))),
        )
        .route(
            "/:id",
            guarded(get(get_loan), view)
                .merge(guarded(put(update_loan), RouteGuard::any_of(&[UPDATE_LOAN])))
                .merge(guarded(delete(delete_loan), RouteGuard::any_of(&[DELETE_LOAN]))),
        )
        .route(
            "/:id/return",
            guarded(post(return_loan), RouteGuard::any_of(&[UPDATE_LOAN])),
        )
}

/// Filters: `user_id`, `vehicle_id`.
pub async fn list_loans(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<HashMap<String, String>>,
    uri: OriginalUri,
) -> ServiceResult<Envelope<Listed<LoanView>>> {
    let by = LoanFilter {
        user_id: filter(&params, "user_id")?,
        vehicle_id: filter(&params, "vehicle_id")?,
    };
    let req = list_request(&params, &uri, LoanRecord::SORTABLE);
    let data = services.loans.list(by, &req).await?;
    Ok(Envelope::ok(Entity::Loan.listed(), data))
}

pub async fn get_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<LoanView>> {
    let id: LoanId = parse_id(&id)?;
    let data = services.loans.get(id).await?;
    Ok(Envelope::ok(Entity::Loan.fetched(), data))
}

pub async fn create_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<UserContext>,
    JsonBody(body): JsonBody<LoanRequest>,
) -> ServiceResult<Envelope<LoanView>> {
    let draft = body.validate()?;
    let data = services.loans.create(&caller, draft).await?;
    Ok(Envelope::created(Entity::Loan.created(), data))
}

pub async fn update_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<LoanRequest>,
) -> ServiceResult<Envelope<LoanView>> {
    let id: LoanId = parse_id(&id)?;
    let draft = body.validate()?;
    let data = services.loans.update(id, draft).await?;
    Ok(Envelope::ok(Entity::Loan.updated(), data))
}

pub async fn delete_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<Empty>> {
    let id: LoanId = parse_id(&id)?;
    services.loans.delete(id).await?;
    Ok(Envelope::ok(Entity::Loan.deleted(), Empty {}))
}

pub async fn return_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<LoanView>> {
    let id: LoanId = parse_id(&id)?;
    let data = services.loans.return_loan(id).await?;
    Ok(Envelope::ok(MSG_RETURNED, data))
}
