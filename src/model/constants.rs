use core::fmt::{self, Display};
use core::str::FromStr;
use serde::{Serialize, Serializer};

/// When a job, or a job selected by a rule, runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum When {
    /// Whatever happened before.
    Always,
    /// Not at all.
    Never,
    /// When every earlier job succeeded.
    OnSuccess,
    /// When an earlier job failed.
    OnFailure,
    /// When started by hand.
    Manual,
    /// After `start_in`.
    Delayed,
}

impl When {
    /// The wire spelling, such as `on_success`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::OnSuccess => "on_success",
            Self::OnFailure => "on_failure",
            Self::Manual => "manual",
            Self::Delayed => "delayed",
        }
    }
}

impl FromStr for When {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "on_success" => Ok(Self::OnSuccess),
            "on_failure" => Ok(Self::OnFailure),
            "manual" => Ok(Self::Manual),
            "delayed" => Ok(Self::Delayed),
            _ => Err(format!("'{s}' is not a valid `when` value")),
        }
    }
}

impl Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for When {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Why a top-level block of a wire document is carried through opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// A key the model does not know.
    UnknownKey,

    /// A deprecated global keyword such as a top-level `image`.
    GlobalKeyword,

    /// A block that relies on YAML merge keys.
    MergeKey,
}

impl Marker {
    /// The variant name as written in declarations.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownKey => "UnknownKey",
            Self::GlobalKeyword => "GlobalKeyword",
            Self::MergeKey => "MergeKey",
        }
    }
}

impl FromStr for Marker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UnknownKey" => Ok(Self::UnknownKey),
            "GlobalKeyword" => Ok(Self::GlobalKeyword),
            "MergeKey" => Ok(Self::MergeKey),
            _ => Err(format!("'{s}' is not a passthrough marker")),
        }
    }
}

impl Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enum-like constants usable in declaration source, as `(namespace, name, value)`.
///
/// Each evaluates to its wire string.
pub static ENUM_CONSTANTS: &[(&str, &str, &str)] = &[
    ("When", "Always", "always"),
    ("When", "Never", "never"),
    ("When", "OnSuccess", "on_success"),
    ("When", "OnFailure", "on_failure"),
    ("When", "Manual", "manual"),
    ("When", "Delayed", "delayed"),
    ("CachePolicy", "Pull", "pull"),
    ("CachePolicy", "Push", "push"),
    ("CachePolicy", "PullPush", "pull-push"),
    ("ArtifactsWhen", "OnSuccess", "on_success"),
    ("ArtifactsWhen", "OnFailure", "on_failure"),
    ("ArtifactsWhen", "Always", "always"),
    ("PipelineSource", "Push", "push"),
    ("PipelineSource", "Web", "web"),
    ("PipelineSource", "Schedule", "schedule"),
    ("PipelineSource", "Api", "api"),
    ("PipelineSource", "Trigger", "trigger"),
    ("PipelineSource", "Pipeline", "pipeline"),
    ("PipelineSource", "ParentPipeline", "parent_pipeline"),
    ("PipelineSource", "MergeRequestEvent", "merge_request_event"),
    ("PipelineSource", "ExternalPullRequestEvent", "external_pull_request_event"),
    ("PipelineSource", "Chat", "chat"),
    ("Marker", "UnknownKey", "UnknownKey"),
    ("Marker", "GlobalKeyword", "GlobalKeyword"),
    ("Marker", "MergeKey", "MergeKey"),
];

/// Looks up `namespace::name` among the enum-like constants.
#[must_use]
pub fn enum_constant(namespace: &str, name: &str) -> Option<&'static str> {
    ENUM_CONSTANTS
        .iter()
        .find(|(ns, n, _)| *ns == namespace && *n == name)
        .map(|(_, _, value)| *value)
}

/// Returns `true` if `namespace` holds enum-like constants.
#[must_use]
pub fn is_enum_namespace(namespace: &str) -> bool {
    ENUM_CONSTANTS.iter().any(|(ns, _, _)| *ns == namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_parses_its_own_rendering() {
        for when in [
            When::Always,
            When::Never,
            When::OnSuccess,
            When::OnFailure,
            When::Manual,
            When::Delayed,
        ] {
            assert_eq!(when.as_str().parse::<When>(), Ok(when));
            assert_eq!(enum_constant("When", &format!("{when:?}")), Some(when.as_str()));
        }
        assert!("sometimes".parse::<When>().is_err());
    }

    #[test]
    fn constants_resolve() {
        assert_eq!(enum_constant("CachePolicy", "PullPush"), Some("pull-push"));
        assert_eq!(enum_constant("PipelineSource", "MergeRequestEvent"), Some("merge_request_event"));
        assert_eq!(enum_constant("When", "Sometimes"), None);
        assert!(is_enum_namespace("Marker"));
        assert!(!is_enum_namespace("CI"));
    }
}
