use core::fmt::{self, Display};
use serde_yaml::Value as YamlValue;

/// One step into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A mapping key.
    Key(String),

    /// A sequence position.
    Index(usize),
}

/// Where a value sits in a document, such as `build.variables.PORT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuePath {
    segments: Vec<Segment>,
}

impl ValuePath {
    /// The whole document.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// This path extended by a mapping key.
    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.segments.push(Segment::Key(key.into()));
        path
    }

    /// This path extended by a sequence position.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.segments.push(Segment::Index(index));
        path
    }

    /// The steps from the document root.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<document>");
        }

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => f.write_str(key)?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A way two scalars of different types may still be equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// A number equals the string that spells it.
    NumberAsText,

    /// A bool equals the string `true` or `false`.
    BoolAsText,
}

impl Coercion {
    fn applies(self, left: &YamlValue, right: &YamlValue) -> bool {
        let is = |value: &YamlValue| match self {
            Self::NumberAsText => value.is_number(),
            Self::BoolAsText => value.is_bool(),
        };
        (is(left) && right.is_string()) || (left.is_string() && is(right))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Key(String),
    AnyKey,
    AnyIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pattern {
    text: String,
    segments: Vec<PatternSegment>,
}

impl Pattern {
    /// Parses `a.*.b[*]`: `*` is any key, `[*]` any index.
    fn parse(text: &str) -> Self {
        let mut segments = Vec::new();
        for part in text.split('.') {
            let (key, indexes) = part.split_once('[').map_or((part, ""), |(key, rest)| (key, rest));
            match key {
                "" => {}
                "*" => segments.push(PatternSegment::AnyKey),
                key => segments.push(PatternSegment::Key(key.to_string())),
            }
            for _ in indexes.matches('*') {
                segments.push(PatternSegment::AnyIndex);
            }
        }

        Self {
            text: text.to_string(),
            segments,
        }
    }

    fn matches(&self, path: &ValuePath) -> bool {
        self.segments.len() == path.segments().len()
            && self.segments.iter().zip(path.segments()).all(|(pattern, segment)| match (pattern, segment) {
                (PatternSegment::AnyKey, Segment::Key(_)) | (PatternSegment::AnyIndex, Segment::Index(_)) => true,
                (PatternSegment::Key(expected), Segment::Key(key)) => expected == key,
                _ => false,
            })
    }
}

/// Path patterns where scalars of different types are compared as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercionTable {
    entries: Vec<(Pattern, Coercion)>,
}

impl CoercionTable {
    /// A table with no entries: every type difference is flagged.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a rule for paths matching `pattern`.
    #[must_use]
    pub fn with(mut self, pattern: &str, coercion: Coercion) -> Self {
        self.entries.push((Pattern::parse(pattern), coercion));
        self
    }

    /// The coercion for `path` that relates `left` and `right`, if any.
    #[must_use]
    pub fn lookup(&self, path: &ValuePath, left: &YamlValue, right: &YamlValue) -> Option<Coercion> {
        self.entries
            .iter()
            .find(|(pattern, coercion)| pattern.matches(path) && coercion.applies(left, right))
            .map(|(pattern, coercion)| {
                log::trace!("comparing {path} as text under '{}'", pattern.text);
                *coercion
            })
    }
}

/// How two scalars compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarMatch {
    /// The scalars are the same.
    Equal,

    /// The scalars differ.
    Different,

    /// The types differ and nothing says whether they may be equal.
    Uncovered,
}

/// Decides whether two scalar values at a path are equal.
pub trait ScalarComparator {
    /// Compares the scalars found at `path` in each document.
    fn compare(&self, path: &ValuePath, left: &YamlValue, right: &YamlValue) -> ScalarMatch;
}

/// Compares like-typed scalars directly and consults a [`CoercionTable`] otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableComparator {
    table: CoercionTable,
}

impl TableComparator {
    /// A comparator consulting `table`.
    #[must_use]
    pub const fn new(table: CoercionTable) -> Self {
        Self { table }
    }
}

/// Variables, whether global, per job, per rule or in workflow rules, are text on the wire.
impl Default for TableComparator {
    fn default() -> Self {
        let mut table = CoercionTable::empty();
        for scope in ["variables.*", "*.variables.*", "*.rules[*].variables.*"] {
            for pattern in [scope.to_string(), format!("{scope}.value")] {
                table = table
                    .with(&pattern, Coercion::NumberAsText)
                    .with(&pattern, Coercion::BoolAsText);
            }
        }
        Self { table }
    }
}

fn as_text(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.trim().to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn same_numbers(left: &serde_yaml::Number, right: &serde_yaml::Number) -> bool {
    match (left.as_i64(), right.as_i64(), left.as_u64(), right.as_u64()) {
        (Some(l), Some(r), _, _) => l == r,
        (_, _, Some(l), Some(r)) => l == r,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l.to_bits() == r.to_bits() || (l - r).abs() <= f64::EPSILON * l.abs().max(r.abs()),
            _ => false,
        },
    }
}

impl ScalarComparator for TableComparator {
    fn compare(&self, path: &ValuePath, left: &YamlValue, right: &YamlValue) -> ScalarMatch {
        let equal = match (left, right) {
            (YamlValue::Null, YamlValue::Null) => true,
            (YamlValue::Bool(l), YamlValue::Bool(r)) => l == r,
            (YamlValue::Number(l), YamlValue::Number(r)) => same_numbers(l, r),
            (YamlValue::String(l), YamlValue::String(r)) => l.trim() == r.trim(),
            _ => {
                if self.table.lookup(path, left, right).is_none() {
                    return ScalarMatch::Uncovered;
                }
                as_text(left).is_some() && as_text(left) == as_text(right)
            }
        };

        if equal { ScalarMatch::Equal } else { ScalarMatch::Different }
    }
}
