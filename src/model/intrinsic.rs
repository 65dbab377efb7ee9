use core::fmt::{self, Display};

/// A predefined CI variable referenced symbolically, such as `CI::COMMIT_SHA`.
///
/// Intrinsics render as `$NAME` in the wire document.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Intrinsic {
    namespace: &'static str,
    name: &'static str,
    variable: &'static str,
}

impl Intrinsic {
    /// The namespace in declaration source (`CI`, `GitLab` or `MR`).
    #[must_use]
    pub const fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// The constant name within the namespace.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The orchestrator variable, without the `$` prefix.
    #[must_use]
    pub const fn variable(&self) -> &'static str {
        self.variable
    }

    /// Finds the intrinsic for `namespace::name`.
    #[must_use]
    pub fn lookup(namespace: &str, name: &str) -> Option<&'static Self> {
        INTRINSICS.iter().find(|i| i.namespace == namespace && i.name == name)
    }

    /// Finds the intrinsic that renders as `$variable`.
    #[must_use]
    pub fn by_variable(variable: &str) -> Option<&'static Self> {
        INTRINSICS.iter().find(|i| i.variable == variable)
    }

    /// Returns `true` if `namespace` is one of the intrinsic namespaces.
    #[must_use]
    pub fn is_namespace(namespace: &str) -> bool {
        NAMESPACES.contains(&namespace)
    }
}

impl Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.variable)
    }
}

const NAMESPACES: &[&str] = &["CI", "GitLab", "MR"];

macro_rules! intrinsics {
    ($($namespace:ident => $prefix:literal { $($name:ident),* $(,)? })*) => {
        /// Every intrinsic variable known to the compiler.
        pub static INTRINSICS: &[Intrinsic] = &[
            $($(
                Intrinsic {
                    namespace: stringify!($namespace),
                    name: stringify!($name),
                    variable: concat!($prefix, stringify!($name)),
                },
            )*)*
        ];
    };
}

intrinsics! {
    CI => "CI_" {
        COMMIT_SHA,
        COMMIT_SHORT_SHA,
        COMMIT_REF_NAME,
        COMMIT_REF_SLUG,
        COMMIT_BRANCH,
        COMMIT_TAG,
        COMMIT_MESSAGE,
        COMMIT_TITLE,
        COMMIT_BEFORE_SHA,
        DEFAULT_BRANCH,
        PIPELINE_ID,
        PIPELINE_IID,
        PIPELINE_SOURCE,
        PIPELINE_URL,
        JOB_ID,
        JOB_NAME,
        JOB_STAGE,
        JOB_TOKEN,
        JOB_URL,
        PROJECT_ID,
        PROJECT_NAME,
        PROJECT_NAMESPACE,
        PROJECT_PATH,
        PROJECT_PATH_SLUG,
        PROJECT_URL,
        PROJECT_DIR,
        REGISTRY,
        REGISTRY_IMAGE,
        REGISTRY_USER,
        REGISTRY_PASSWORD,
        SERVER_HOST,
        SERVER_URL,
        ENVIRONMENT_NAME,
        ENVIRONMENT_SLUG,
        ENVIRONMENT_URL,
    }

    GitLab => "GITLAB_" {
        USER_LOGIN,
        USER_EMAIL,
        USER_NAME,
        USER_ID,
        FEATURES,
    }

    MR => "CI_MERGE_REQUEST_" {
        IID,
        ID,
        SOURCE_BRANCH_NAME,
        SOURCE_BRANCH_SHA,
        TARGET_BRANCH_NAME,
        TARGET_BRANCH_SHA,
        TITLE,
        DESCRIPTION,
        LABELS,
        MILESTONE,
        PROJECT_ID,
        PROJECT_PATH,
        PROJECT_URL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_lookup_agree() {
        let sha = Intrinsic::lookup("CI", "COMMIT_SHA").unwrap();
        assert_eq!(sha.to_string(), "$CI_COMMIT_SHA");
        assert_eq!(Intrinsic::by_variable("CI_COMMIT_SHA"), Some(sha));

        let iid = Intrinsic::lookup("MR", "IID").unwrap();
        assert_eq!(iid.variable(), "CI_MERGE_REQUEST_IID");

        let login = Intrinsic::lookup("GitLab", "USER_LOGIN").unwrap();
        assert_eq!(login.variable(), "GITLAB_USER_LOGIN");
    }

    #[test]
    fn variables_are_unique() {
        for (i, a) in INTRINSICS.iter().enumerate() {
            for b in &INTRINSICS[i + 1..] {
                assert_ne!(a.variable, b.variable);
            }
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(Intrinsic::lookup("CI", "NOPE").is_none());
        assert!(Intrinsic::by_variable("HOME").is_none());
        assert!(Intrinsic::is_namespace("MR"));
        assert!(!Intrinsic::is_namespace("Job"));
    }
}
