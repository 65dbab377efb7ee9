use core::fmt::{self, Display};

/// The modeled record types that may appear as struct literals in declaration source.
///
/// Each type carries its field list in canonical wire order. A field named `extra`
/// holds additional keys as an ordered list of `(key, value)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// `Job { .. }`.
    Job,
    /// `Pipeline { .. }`.
    Pipeline,
    /// `Rule { .. }`.
    Rule,
    /// `Need { .. }`.
    Need,
    /// `Artifacts { .. }`.
    Artifacts,
    /// `Reports { .. }`.
    Reports,
    /// `Cache { .. }`.
    Cache,
    /// `CacheKey { .. }`.
    CacheKey,
    /// `Image { .. }`.
    Image,
    /// `Service { .. }`.
    Service,
    /// `Include { .. }`.
    Include,
    /// `Workflow { .. }`.
    Workflow,
    /// `Defaults { .. }`.
    Defaults,
    /// `Trigger { .. }`.
    Trigger,
    /// `Environment { .. }`.
    Environment,
    /// `Retry { .. }`.
    Retry,
    /// `Release { .. }`.
    Release,
    /// `Variable { .. }`.
    Variable,
    /// `Parallel { .. }`.
    Parallel,
    /// `Passthrough { .. }`.
    Passthrough,
}

const ALL: &[RecordType] = &[
    RecordType::Job,
    RecordType::Pipeline,
    RecordType::Rule,
    RecordType::Need,
    RecordType::Artifacts,
    RecordType::Reports,
    RecordType::Cache,
    RecordType::CacheKey,
    RecordType::Image,
    RecordType::Service,
    RecordType::Include,
    RecordType::Workflow,
    RecordType::Defaults,
    RecordType::Trigger,
    RecordType::Environment,
    RecordType::Retry,
    RecordType::Release,
    RecordType::Variable,
    RecordType::Parallel,
    RecordType::Passthrough,
];

impl RecordType {
    /// All record types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        ALL
    }

    /// Finds a record type by its declaration-source name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        ALL.iter().copied().find(|t| t.name() == name)
    }

    /// The type name as written in source.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Job => "Job",
            Self::Pipeline => "Pipeline",
            Self::Rule => "Rule",
            Self::Need => "Need",
            Self::Artifacts => "Artifacts",
            Self::Reports => "Reports",
            Self::Cache => "Cache",
            Self::CacheKey => "CacheKey",
            Self::Image => "Image",
            Self::Service => "Service",
            Self::Include => "Include",
            Self::Workflow => "Workflow",
            Self::Defaults => "Defaults",
            Self::Trigger => "Trigger",
            Self::Environment => "Environment",
            Self::Retry => "Retry",
            Self::Release => "Release",
            Self::Variable => "Variable",
            Self::Parallel => "Parallel",
            Self::Passthrough => "Passthrough",
        }
    }

    /// Field names in canonical output order.
    #[must_use]
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Job => &[
                "name",
                "extends",
                "stage",
                "image",
                "services",
                "variables",
                "needs",
                "dependencies",
                "cache",
                "before_script",
                "script",
                "after_script",
                "rules",
                "when",
                "start_in",
                "allow_failure",
                "artifacts",
                "environment",
                "coverage",
                "retry",
                "timeout",
                "tags",
                "resource_group",
                "interruptible",
                "parallel",
                "trigger",
                "release",
                "secrets",
                "id_tokens",
                "inherit",
                "extra",
            ],
            Self::Pipeline => &[
                "stages",
                "workflow",
                "include",
                "default",
                "variables",
                "cache",
                "services",
                "passthrough",
            ],
            Self::Rule => &[
                "if_",
                "changes",
                "exists",
                "variables",
                "when",
                "allow_failure",
                "start_in",
                "needs",
                "extra",
            ],
            Self::Need => &["job", "project", "ref_", "pipeline", "artifacts", "optional", "parallel"],
            Self::Artifacts => &["name", "paths", "exclude", "expose_as", "expire_in", "untracked", "when", "reports", "extra"],
            Self::Reports => &[
                "junit",
                "coverage_report",
                "codequality",
                "sast",
                "dependency_scanning",
                "container_scanning",
                "dast",
                "dotenv",
                "terraform",
                "extra",
            ],
            Self::Cache => &["key", "paths", "untracked", "unprotect", "when", "policy", "fallback_keys", "extra"],
            Self::CacheKey => &["files", "prefix"],
            Self::Image => &["name", "entrypoint", "pull_policy", "docker"],
            Self::Service => &["name", "alias", "entrypoint", "command", "variables", "pull_policy"],
            Self::Include => &["local", "remote", "template", "project", "file", "ref_", "component", "inputs", "rules"],
            Self::Workflow => &["name", "rules", "auto_cancel", "extra"],
            Self::Defaults => &[
                "image",
                "services",
                "before_script",
                "after_script",
                "cache",
                "artifacts",
                "tags",
                "retry",
                "timeout",
                "interruptible",
                "hooks",
                "id_tokens",
                "extra",
            ],
            Self::Trigger => &["include", "project", "branch", "strategy", "forward"],
            Self::Environment => &["name", "url", "on_stop", "action", "auto_stop_in", "deployment_tier", "kubernetes"],
            Self::Retry => &["max", "when", "exit_codes"],
            Self::Release => &["tag_name", "tag_message", "name", "description", "ref_", "milestones", "released_at", "assets"],
            Self::Variable => &["value", "description", "options", "expand"],
            Self::Parallel => &["matrix"],
            Self::Passthrough => &["key", "marker", "value"],
        }
    }

    /// Returns `true` if `field` is declared by this record type.
    #[must_use]
    pub fn has_field(self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    /// Position of `field` in canonical order.
    #[must_use]
    pub fn field_rank(self, field: &str) -> usize {
        self.fields().iter().position(|f| *f == field).unwrap_or(usize::MAX)
    }

    /// Returns `true` for the record types that are top-level declarations.
    #[must_use]
    pub const fn is_declaration(self) -> bool {
        matches!(self, Self::Job | Self::Pipeline)
    }
}

impl Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a record field identifier to its wire key.
///
/// Only fields whose wire key is a Rust keyword are renamed.
#[must_use]
pub fn wire_key(field: &str) -> &str {
    match field {
        "if_" => "if",
        "ref_" => "ref",
        other => other,
    }
}

/// Maps a wire key to the record field identifier, the inverse of [`wire_key`].
#[must_use]
pub fn field_name(key: &str) -> &str {
    match key {
        "if" => "if_",
        "ref" => "ref_",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for t in RecordType::all() {
            assert_eq!(RecordType::from_name(t.name()), Some(*t));
        }
        assert_eq!(RecordType::from_name("Step"), None);
    }

    #[test]
    fn keyword_fields_are_renamed() {
        assert_eq!(wire_key("if_"), "if");
        assert_eq!(wire_key("ref_"), "ref");
        assert_eq!(wire_key("stage"), "stage");
        assert_eq!(field_name("if"), "if_");
        assert_eq!(field_name("script"), "script");
    }

    #[test]
    fn job_fields_start_with_name_and_end_with_extra() {
        let fields = RecordType::Job.fields();
        assert_eq!(fields.first(), Some(&"name"));
        assert_eq!(fields.last(), Some(&"extra"));
        assert!(RecordType::Job.field_rank("stage") < RecordType::Job.field_rank("script"));
    }
}
