use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Name of a feature (the unit of permission).
///
/// Features are compared by exact string equality; a token carries the flat
/// list of names its role was granted at login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureName(Cow<'static, str>);

impl FeatureName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for FeatureName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FeatureName {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&'static str> for FeatureName {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

/// Feature names of the seeded catalog, referenced by route guards.
pub mod catalog {
    pub const VIEW_MODULE: &str = "View Module";
    pub const CREATE_MODULE: &str = "Create Module";
    pub const UPDATE_MODULE: &str = "Update Module";
    pub const DELETE_MODULE: &str = "Delete Module";

    pub const VIEW_FEATURE: &str = "View Feature";
    pub const CREATE_FEATURE: &str = "Create Feature";
    pub const UPDATE_FEATURE: &str = "Update Feature";
    pub const DELETE_FEATURE: &str = "Delete Feature";

    pub const VIEW_ROLE: &str = "View Role";
    pub const CREATE_ROLE: &str = "Create Role";
    pub const UPDATE_ROLE: &str = "Update Role";
    pub const DELETE_ROLE: &str = "Delete Role";

    pub const VIEW_USER: &str = "View User";
    pub const CREATE_USER: &str = "Create User";
    pub const UPDATE_USER: &str = "Update User";
    pub const DELETE_USER: &str = "Delete User";
    pub const RESET_USER_PASSWORD: &str = "Reset User Password";

    pub const VIEW_VEHICLE: &str = "View Vehicle";
    pub const CREATE_VEHICLE: &str = "Create Vehicle";
    pub const UPDATE_VEHICLE: &str = "Update Vehicle";
    pub const DELETE_VEHICLE: &str = "Delete Vehicle";

    pub const VIEW_VEHICLE_TYPE: &str = "View Vehicle Type";
    pub const CREATE_VEHICLE_TYPE: &str = "Create Vehicle Type";
    pub const UPDATE_VEHICLE_TYPE: &str = "Update Vehicle Type";
    pub const DELETE_VEHICLE_TYPE: &str = "Delete Vehicle Type";

    pub const VIEW_LOAN: &str = "View Loan";
    pub const CREATE_LOAN: &str = "Create Loan";
    pub const UPDATE_LOAN: &str = "Update Loan";
    pub const DELETE_LOAN: &str = "Delete Loan";

    /// A management area of the seeded module tree.
    pub struct Area {
        pub parent: &'static str,
        pub module: &'static str,
        pub features: &'static [&'static str],
    }

    pub const ACCESS_MANAGEMENT: &str = "Access Management";
    pub const FLEET_MANAGEMENT: &str = "Fleet Management";

    pub const AREAS: &[Area] = &[
        Area {
            parent: ACCESS_MANAGEMENT,
            module: "Module",
            features: &[VIEW_MODULE, CREATE_MODULE, UPDATE_MODULE, DELETE_MODULE],
        },
        Area {
            parent: ACCESS_MANAGEMENT,
            module: "Feature",
            features: &[VIEW_FEATURE, CREATE_FEATURE, UPDATE_FEATURE, DELETE_FEATURE],
        },
        Area {
            parent: ACCESS_MANAGEMENT,
            module: "Role",
            features: &[VIEW_ROLE, CREATE_ROLE, UPDATE_ROLE, DELETE_ROLE],
        },
        Area {
            parent: ACCESS_MANAGEMENT,
            module: "User",
            features: &[
                VIEW_USER,
                CREATE_USER,
                UPDATE_USER,
                DELETE_USER,
                RESET_USER_PASSWORD,
            ],
        },
        Area {
            parent: FLEET_MANAGEMENT,
            module: "Vehicle",
            features: &[VIEW_VEHICLE, CREATE_VEHICLE, UPDATE_VEHICLE, DELETE_VEHICLE],
        },
        Area {
            parent: FLEET_MANAGEMENT,
            module: "Vehicle Type",
            features: &[
                VIEW_VEHICLE_TYPE,
                CREATE_VEHICLE_TYPE,
                UPDATE_VEHICLE_TYPE,
                DELETE_VEHICLE_TYPE,
            ],
        },
        Area {
            parent: FLEET_MANAGEMENT,
            module: "Loan",
            features: &[VIEW_LOAN, CREATE_LOAN, UPDATE_LOAN, DELETE_LOAN],
        },
    ];

    /// Every catalog feature name, in catalog order.
    pub fn all_features() -> impl Iterator<Item = &'static str> {
        AREAS.iter().flat_map(|a| a.features.iter().copied())
    }
}
