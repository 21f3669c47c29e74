//! Application services: input rules, referential checks and mapping between
//! storage records and response payloads.
//!
//! Services are constructed once at start-up and shared by handlers through
//! an `Arc<AppServices>` extension.

use eproc_auth::{TokenIssuer, hash_password, verify_password};
use eproc_core::{ListQuery, Page};
use eproc_infra::Stores;
use eproc_infra::store::Listing;

use crate::app::dto::Listed;
use crate::app::errors::{ServiceError, ServiceResult};

pub mod access;
pub mod auth;
pub mod fleet;

pub use access::{FeatureService, ModuleService, RoleService, UserService};
pub use auth::AuthService;
pub use fleet::{LoanService, VehicleService, VehicleTypeService};

pub struct AppServices {
    pub auth: AuthService,
    pub modules: ModuleService,
    pub features: FeatureService,
    pub roles: RoleService,
    pub users: UserService,
    pub vehicle_types: VehicleTypeService,
    pub vehicles: VehicleService,
    pub loans: LoanService,
}

impl AppServices {
    pub fn new(stores: Stores, tokens: TokenIssuer) -> Self {
        Self {
            auth: AuthService::new(stores.clone(), tokens),
            modules: ModuleService::new(stores.clone()),
            features: FeatureService::new(stores.clone()),
            roles: RoleService::new(stores.clone()),
            users: UserService::new(stores.clone()),
            vehicle_types: VehicleTypeService::new(stores.clone()),
            vehicles: VehicleService::new(stores.clone()),
            loans: LoanService::new(stores),
        }
    }
}

/// A list request as resolved from the query string.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub query: ListQuery,
    /// Request path, used for the page navigation links.
    pub path: String,
}

impl ListRequest {
    pub fn new(query: ListQuery, path: impl Into<String>) -> Self {
        Self {
            query,
            path: path.into(),
        }
    }

    /// Shape a storage listing into the response `data`.
    pub fn shape<R, T>(&self, listing: Listing<R>, f: impl FnMut(R) -> T) -> Listed<T> {
        let rows = listing.rows.into_iter().map(f).collect();
        match self.query.page {
            Some(page) => Listed::Paged(Page::build(&self.path, page, listing.total, rows)),
            None => Listed::All(rows),
        }
    }
}

// Password hashing is CPU-bound; keep it off the async workers.

pub(crate) async fn hash_blocking(password: String) -> ServiceResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

pub(crate) async fn verify_blocking(password: String, hash: String) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ServiceError::Internal(format!("password verify task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use eproc_core::{Ordering, PageRequest};

    use super::*;

    #[test]
    fn shape_pages_only_when_asked() {
        let listing = Listing {
            rows: vec![1, 2],
            total: 5,
        };
        let plain = ListRequest::new(ListQuery::all(), "/api/v1/loans");
        assert_eq!(plain.shape(listing.clone(), |n| n * 10), Listed::All(vec![10, 20]));

        let paged = ListRequest::new(
            ListQuery::new(Some(PageRequest::new(2, 2)), Ordering::by_id()),
            "/api/v1/loans",
        );
        let Listed::Paged(page) = paged.shape(listing, |n| n) else {
            panic!("expected a page");
        };
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.from_row, 3);
        assert_eq!(page.to_row, 4);
        assert_eq!(page.next_page, "/api/v1/loans?page=3&limit=2");
    }
}
