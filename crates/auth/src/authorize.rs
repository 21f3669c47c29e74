use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::{FeatureName, OwnershipAction};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// None of the route's required features is held.
    #[error("Unauthorized to access this resource")]
    MissingFeature,

    /// Self-or-admin rule refused the action.
    #[error("{0}")]
    NotOwner(OwnershipAction),
}

/// The feature set a route declares. Any one of them admits the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFeatures(HashSet<FeatureName>);

impl RequiredFeatures {
    /// Authentication only; every verified caller is admitted.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn any_of<I, F>(features: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FeatureName>,
    {
        Self(features.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, feature: &FeatureName) -> bool {
        self.0.contains(feature)
    }

    /// Sorted names, for logs and explanations.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.iter().map(|f| f.as_str().to_string()).collect();
        names.sort();
        names
    }
}

/// Authorize a caller holding `granted` against `required`.
///
/// - empty `required` always allows
/// - otherwise one held feature in `required` is enough (OR semantics)
/// - one set lookup per granted feature; no IO, no panics
pub fn authorize(granted: &[FeatureName], required: &RequiredFeatures) -> Result<(), AuthzError> {
    if required.is_empty() || granted.iter().any(|f| required.contains(f)) {
        Ok(())
    } else {
        Err(AuthzError::MissingFeature)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Debuggable account of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub granted: bool,
    pub reason: String,
    /// Held features that matched the requirement (sorted).
    pub matched: Vec<String>,
    pub required: Vec<String>,
}

/// Explain why [`authorize`] decided the way it did.
pub fn explain_authorization(
    granted: &[FeatureName],
    required: &RequiredFeatures,
) -> AuthorizationExplanation {
    let required_names = required.names();

    if required.is_empty() {
        return AuthorizationExplanation {
            granted: true,
            reason: "route requires authentication only".to_string(),
            matched: Vec::new(),
            required: required_names,
        };
    }

    let mut matched: Vec<String> = granted
        .iter()
        .filter(|f| required.contains(f))
        .map(|f| f.as_str().to_string())
        .collect();
    matched.sort();
    matched.dedup();

    let reason = if matched.is_empty() {
        format!(
            "caller holds {} feature(s), none of {:?}",
            granted.len(),
            required_names
        )
    } else {
        format!("caller holds {:?}", matched)
    };

    AuthorizationExplanation {
        granted: !matched.is_empty(),
        reason,
        matched,
        required: required_names,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(list: &[&'static str]) -> Vec<FeatureName> {
        list.iter().copied().map(FeatureName::from_static).collect()
    }

    #[test]
    fn empty_requirement_allows_anyone() {
        assert!(authorize(&[], &RequiredFeatures::none()).is_ok());
    }

    #[test]
    fn any_one_feature_is_enough() {
        let required = RequiredFeatures::any_of(["A", "B"]);
        assert!(authorize(&names(&["B"]), &required).is_ok());
    }

    #[test]
    fn disjoint_sets_are_denied() {
        let required = RequiredFeatures::any_of(["Create Role"]);
        let err = authorize(&names(&["View Role", "View User"]), &required).unwrap_err();
        assert_eq!(err, AuthzError::MissingFeature);
        assert_eq!(err.to_string(), "Unauthorized to access this resource");
    }

    #[test]
    fn comparison_is_exact() {
        let required = RequiredFeatures::any_of(["View Role"]);
        assert!(authorize(&names(&["view role", "View Role "]), &required).is_err());
    }

    #[test]
    fn explanation_lists_matches() {
        let required = RequiredFeatures::any_of(["A", "B", "C"]);
        let explained = explain_authorization(&names(&["C", "A", "Z"]), &required);
        assert!(explained.granted);
        assert_eq!(explained.matched, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(explained.required, vec!["A", "B", "C"]);

        let explained = explain_authorization(&names(&["Z"]), &required);
        assert!(!explained.granted);
        assert!(explained.matched.is_empty());
    }

    proptest! {
        #[test]
        fn allow_iff_intersection_nonempty(
            held in proptest::collection::vec(0u8..12, 0..8),
            needed in proptest::collection::vec(0u8..12, 1..6),
        ) {
            let granted: Vec<FeatureName> = held.iter().map(|n| FeatureName::new(format!("F{n}"))).collect();
            let required = RequiredFeatures::any_of(needed.iter().map(|n| FeatureName::new(format!("F{n}"))));
            let intersects = held.iter().any(|h| needed.contains(h));

            prop_assert_eq!(authorize(&granted, &required).is_ok(), intersects);
            prop_assert_eq!(explain_authorization(&granted, &required).granted, intersects);
        }
    }
}
