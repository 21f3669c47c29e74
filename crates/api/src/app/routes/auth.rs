use std::sync::Arc;

use axum::extract::Extension;

use crate::app::dto::{LoginRequest, LoginView};
use crate::app::errors::{Envelope, ServiceResult};
use crate::app::routes::common::JsonBody;
use crate::app::services::AppServices;

pub const MSG_LOGIN: &str = "User Login Successfully";

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> ServiceResult<Envelope<LoginView>> {
    let (username_or_email, password) = body.validate()?;
    let view = services.auth.login(&username_or_email, password).await?;
    Ok(Envelope::ok(MSG_LOGIN, view))
}
