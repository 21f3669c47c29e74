use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, OriginalUri, Path, Query},
    routing::{delete, get, patch, post, put},
};

use eproc_auth::OwnershipAction;
use eproc_auth::catalog::{CREATE_USER, DELETE_USER, RESET_USER_PASSWORD, UPDATE_USER, VIEW_USER};
use eproc_core::{FieldErrors, UserId};
use eproc_infra::store::UserRecord;

use crate::app::dto::{
    ChangePasswordRequest, CreateUserRequest, Listed, ResetPasswordRequest, UpdateUserRequest,
    UserDetail, UserView,
};
use crate::app::errors::{Empty, Entity, Envelope, ServiceError, ServiceResult};
use crate::app::routes::common::{JsonBody, guarded, list_request, parse_id};
use crate::app::services::AppServices;
use crate::app::services::access::MSG_INVALID_PASSWORD_DATA;
use crate::context::{RoleContext, UserContext};
use crate::middleware::RouteGuard;

pub const MSG_PASSWORD_RESET: &str = "User Password Reset Successfully";
pub const MSG_PASSWORD_CHANGED: &str = "User Password Changed Successfully";

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            guarded(
                get(list_users),
                RouteGuard::any_of(&[
                    VIEW_USER,
                    CREATE_USER,
                    UPDATE_USER,
                    DELETE_USER,
                    RESET_USER_PASSWORD,
                ]),
            )
            .merge(guarded(post(create_user), RouteGuard::any_of(&[CREATE_USER]))),
        )
        .route(
            "/:id",
            guarded(
                get(get_user),
                RouteGuard::any_of(&[VIEW_USER, CREATE_USER, UPDATE_USER, DELETE_USER]),
            )
            .merge(guarded(put(update_user), RouteGuard::any_of(&[UPDATE_USER])))
            .merge(guarded(delete(delete_user), RouteGuard::any_of(&[DELETE_USER]))),
        )
        .route(
            "/reset-pass/:id",
            guarded(patch(reset_password), RouteGuard::any_of(&[RESET_USER_PASSWORD])),
        )
        .route(
            "/change-pass/:id",
            guarded(
                patch(change_password),
                RouteGuard::authenticated().self_or_admin(OwnershipAction::AlterPassword),
            ),
        )
}

/// Password bodies report field failures under "Invalid Data".
fn password_errors(errors: FieldErrors) -> ServiceError {
    ServiceError::Rejected {
        message: MSG_INVALID_PASSWORD_DATA,
        errors,
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<HashMap<String, String>>,
    uri: OriginalUri,
) -> ServiceResult<Envelope<Listed<UserView>>> {
    let req = list_request(&params, &uri, UserRecord::SORTABLE);
    let data = services.users.list(&req).await?;
    Ok(Envelope::ok(Entity::User.listed(), data))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<UserDetail>> {
    let id: UserId = parse_id(&id)?;
    let data = services.users.get(id).await?;
    Ok(Envelope::ok(Entity::User.fetched(), data))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<CreateUserRequest>,
) -> ServiceResult<Envelope<UserView>> {
    let draft = body.validate()?;
    let data = services.users.create(draft).await?;
    Ok(Envelope::created(Entity::User.created(), data))
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<UserContext>,
    Extension(role): Extension<RoleContext>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateUserRequest>,
) -> ServiceResult<Envelope<UserView>> {
    let id: UserId = parse_id(&id)?;
    let changes = body.validate()?;
    let data = services.users.update(&caller, &role, id, changes).await?;
    Ok(Envelope::ok(Entity::User.updated(), data))
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<UserContext>,
    Extension(role): Extension<RoleContext>,
    Path(id): Path<String>,
) -> ServiceResult<Envelope<Empty>> {
    let id: UserId = parse_id(&id)?;
    services.users.delete(&caller, &role, id).await?;
    Ok(Envelope::ok(Entity::User.deleted(), Empty {}))
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ResetPasswordRequest>,
) -> ServiceResult<Envelope<Empty>> {
    let id: UserId = parse_id(&id)?;
    let password = body.validate().map_err(password_errors)?;
    services.users.reset_password(id, password).await?;
    Ok(Envelope::ok(MSG_PASSWORD_RESET, Empty {}))
}

/// The route guard has already checked self-or-admin against `:id`.
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<ChangePasswordRequest>,
) -> ServiceResult<Envelope<Empty>> {
    let id: UserId = parse_id(&id)?;
    let (old_password, password) = body.validate().map_err(password_errors)?;
    services
        .users
        .change_password(id, old_password, password)
        .await?;
    Ok(Envelope::ok(MSG_PASSWORD_CHANGED, Empty {}))
}
