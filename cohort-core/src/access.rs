//! Role-scoped page access and data-loading policy.

use serde::{Deserialize, Serialize};

use crate::identity::Role;

/// Top-level dashboard areas, identified by their path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageArea {
    Admin,
    Mentor,
    Student,
    Personal,
}

impl PageArea {
    pub fn all() -> &'static [PageArea] {
        &[
            PageArea::Admin,
            PageArea::Mentor,
            PageArea::Student,
            PageArea::Personal,
        ]
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            PageArea::Admin => "/admin",
            PageArea::Mentor => "/mentor",
            PageArea::Student => "/student",
            PageArea::Personal => "/personal",
        }
    }

    /// Area owning `path`, matched on whole segments so `/administrator`
    /// does not fall under `/admin`.
    pub fn of_path(path: &str) -> Option<PageArea> {
        let path = normalize_path(path);
        PageArea::all().iter().copied().find(|area| {
            let prefix = area.prefix();
            path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Areas each role may open.
pub fn accessible_areas(role: Role) -> &'static [PageArea] {
    match role {
        Role::Admin => PageArea::all(),
        Role::Mentor => &[PageArea::Mentor, PageArea::Admin],
        Role::Student => &[PageArea::Student, PageArea::Mentor],
        Role::PersonalUser => &[PageArea::Personal],
    }
}

/// Total access check: every `(role, path)` pair yields a boolean.
///
/// Paths outside every known area and viewers without a role are denied.
pub fn can_access_page(role: Option<Role>, path: &str) -> bool {
    let Some(role) = role else {
        return false;
    };
    match PageArea::of_path(path) {
        Some(area) => accessible_areas(role).contains(&area),
        None => false,
    }
}

fn normalize_path(path: &str) -> String {
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Which cache-backed loads a page should issue for the current viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLoadingStrategy {
    pub load_users: bool,
    pub load_mentors: bool,
    pub load_students: bool,
    pub load_analytics: bool,
    pub load_community: bool,
    pub load_personal: bool,
}

impl DataLoadingStrategy {
    /// Fixed flag set per role. `None` loads nothing.
    pub fn for_role(role: Option<Role>) -> Self {
        match role {
            Some(Role::Admin) => Self {
                load_users: true,
                load_mentors: true,
                load_students: true,
                load_analytics: true,
                load_community: true,
                load_personal: false,
            },
            Some(Role::Mentor) => Self {
                load_users: false,
                load_mentors: false,
                load_students: true,
                load_analytics: true,
                load_community: true,
                load_personal: false,
            },
            Some(Role::Student) => Self {
                load_users: false,
                load_mentors: true,
                load_students: false,
                load_analytics: false,
                load_community: true,
                load_personal: false,
            },
            Some(Role::PersonalUser) => Self {
                load_personal: true,
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    pub fn loads_anything(&self) -> bool {
        self.load_users
            || self.load_mentors
            || self.load_students
            || self.load_analytics
            || self.load_community
            || self.load_personal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_admin_reaches_every_area() {
        for area in PageArea::all() {
            assert!(can_access_page(Some(Role::Admin), area.prefix()));
        }
    }

    #[test]
    fn test_mentor_table() {
        assert!(can_access_page(Some(Role::Mentor), "/mentor/sessions"));
        assert!(can_access_page(Some(Role::Mentor), "/admin/reports"));
        assert!(!can_access_page(Some(Role::Mentor), "/student/dashboard"));
        assert!(!can_access_page(Some(Role::Mentor), "/personal/dashboard"));
    }

    #[test]
    fn test_student_table() {
        assert!(can_access_page(Some(Role::Student), "/student/dashboard"));
        assert!(can_access_page(Some(Role::Student), "/mentor/directory"));
        assert!(!can_access_page(Some(Role::Student), "/admin"));
    }

    #[test]
    fn test_personal_table() {
        assert!(can_access_page(Some(Role::PersonalUser), "/personal/goals"));
        assert!(!can_access_page(Some(Role::PersonalUser), "/student/dashboard"));
    }

    #[test]
    fn test_segment_boundaries_and_normalization() {
        assert!(!can_access_page(Some(Role::Admin), "/administrator"));
        assert!(can_access_page(Some(Role::Admin), "/ADMIN/users/"));
        assert!(can_access_page(Some(Role::Student), "student/dashboard?tab=2"));
        assert!(!can_access_page(Some(Role::Admin), "/"));
        assert!(!can_access_page(Some(Role::Admin), ""));
    }

    #[test]
    fn test_no_role_is_denied() {
        assert!(!can_access_page(None, "/admin"));
        assert!(!can_access_page(None, "/personal"));
    }

    #[test]
    fn test_strategy_per_role() {
        assert!(DataLoadingStrategy::for_role(Some(Role::Admin)).load_users);
        assert!(!DataLoadingStrategy::for_role(Some(Role::Mentor)).load_users);
        assert!(DataLoadingStrategy::for_role(Some(Role::Student)).load_mentors);
        assert!(!DataLoadingStrategy::for_role(Some(Role::Student)).load_analytics);
        let personal = DataLoadingStrategy::for_role(Some(Role::PersonalUser));
        assert!(personal.load_personal);
        assert!(!personal.load_community);
        assert!(!DataLoadingStrategy::for_role(None).loads_anything());
    }

    fn arb_role() -> impl Strategy<Value = Option<Role>> {
        prop_oneof![
            Just(None),
            Just(Some(Role::Admin)),
            Just(Some(Role::Mentor)),
            Just(Some(Role::Student)),
            Just(Some(Role::PersonalUser)),
        ]
    }

    proptest! {
        #[test]
        fn can_access_page_is_total(role in arb_role(), path in ".*") {
            let _ = can_access_page(role, &path);
        }

        #[test]
        fn admin_access_is_superset(path in "(/[a-z]{0,10}){0,4}") {
            for role in Role::all() {
                if can_access_page(Some(*role), &path) {
                    prop_assert!(can_access_page(Some(Role::Admin), &path));
                }
            }
        }
    }
}
