use crate::equivalence::{ScalarComparator, ScalarMatch, TableComparator, ValuePath};
use crate::error::{Error, Result};
use core::fmt::{self, Display};
use serde_yaml::{Mapping, Value as YamlValue};
use std::borrow::Cow;

/// What differs at one place in two documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DifferenceKind {
    /// The key is in the left document only.
    MissingKey,

    /// The key is in the right document only.
    ExtraKey,

    /// The two values are of different kinds, such as a list and a mapping.
    TypeMismatch {
        /// The left document's value.
        left: String,

        /// The right document's value.
        right: String,
    },

    /// Scalars that compare unequal.
    ValueMismatch {
        /// The left document's value.
        left: String,

        /// The right document's value.
        right: String,
    },

    /// Lists of different lengths.
    LengthMismatch {
        /// The left document's length.
        left: usize,

        /// The right document's length.
        right: usize,
    },

    /// Scalars of different types where no coercion rule applies.
    UncoveredCoercion {
        /// The left document's value.
        left: String,

        /// The right document's value.
        right: String,
    },
}

/// One difference between two documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    /// Where the difference is, such as `build.script[0]`.
    pub path: String,
    /// What differs.
    pub kind: DifferenceKind,
}

impl Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = &self.path;
        match &self.kind {
            DifferenceKind::MissingKey => write!(f, "{path}: missing from the right document"),
            DifferenceKind::ExtraKey => write!(f, "{path}: only in the right document"),
            DifferenceKind::TypeMismatch { left, right } => write!(f, "{path}: {left} vs {right}"),
            DifferenceKind::ValueMismatch { left, right } => write!(f, "{path}: {left} != {right}"),
            DifferenceKind::LengthMismatch { left, right } => write!(f, "{path}: {left} item(s) vs {right} item(s)"),
            DifferenceKind::UncoveredCoercion { left, right } => {
                write!(f, "{path}: {left} vs {right} with no coercion rule for this path")
            }
        }
    }
}

/// Structurally compares two documents.
///
/// Map key order is ignored. Sequence order, key presence and scalar types are
/// significant; scalars are compared through `comparator`. An empty document is
/// the same as an empty mapping.
#[must_use]
pub fn compare(left: &YamlValue, right: &YamlValue, comparator: &dyn ScalarComparator) -> Vec<Difference> {
    let mut differences = Vec::new();
    walk(&ValuePath::root(), &as_document(left), &as_document(right), comparator, &mut differences);
    differences
}

fn as_document(value: &YamlValue) -> Cow<'_, YamlValue> {
    match value {
        YamlValue::Null => Cow::Owned(YamlValue::Mapping(Mapping::new())),
        other => Cow::Borrowed(other),
    }
}

/// Parses two YAML or JSON texts and compares them with the default coercion table.
///
/// # Errors
///
/// Fails with [`Error::Schema`] if either text is not YAML.
pub fn compare_text(left: &str, right: &str) -> Result<Vec<Difference>> {
    let parse = |side: &str, text: &str| -> Result<YamlValue> {
        serde_yaml::from_str(text).map_err(|e| Error::Schema {
            path: format!("<{side} document>"),
            message: format!("invalid YAML: {e}"),
        })
    };

    let left = parse("left", left)?;
    let right = parse("right", right)?;
    Ok(compare(&left, &right, &TableComparator::default()))
}

/// Fails with [`Error::EquivalenceMismatch`] unless the documents are equivalent.
///
/// # Errors
///
/// Fails if the documents differ.
pub fn check_equivalent(left: &YamlValue, right: &YamlValue) -> Result<()> {
    let differences = compare(left, right, &TableComparator::default());
    if differences.is_empty() {
        return Ok(());
    }

    Err(Error::EquivalenceMismatch {
        differences: differences.iter().map(ToString::to_string).collect(),
    })
}

fn walk(path: &ValuePath, left: &YamlValue, right: &YamlValue, comparator: &dyn ScalarComparator, out: &mut Vec<Difference>) {
    let difference = |kind| Difference {
        path: path.to_string(),
        kind,
    };

    match (left, right) {
        (YamlValue::Mapping(l), YamlValue::Mapping(r)) => walk_mappings(path, l, r, comparator, out),
        (YamlValue::Sequence(l), YamlValue::Sequence(r)) => {
            if l.len() != r.len() {
                out.push(difference(DifferenceKind::LengthMismatch {
                    left: l.len(),
                    right: r.len(),
                }));
            }
            for (i, (l, r)) in l.iter().zip(r).enumerate() {
                walk(&path.index(i), l, r, comparator, out);
            }
        }
        (YamlValue::Tagged(l), YamlValue::Tagged(r)) => {
            if l.tag == r.tag {
                walk(path, &l.value, &r.value, comparator, out);
            } else {
                out.push(difference(DifferenceKind::ValueMismatch {
                    left: l.tag.to_string(),
                    right: r.tag.to_string(),
                }));
            }
        }
        (l, r) if is_scalar(l) && is_scalar(r) => match comparator.compare(path, l, r) {
            ScalarMatch::Equal => {}
            ScalarMatch::Different => out.push(difference(DifferenceKind::ValueMismatch {
                left: render(l),
                right: render(r),
            })),
            ScalarMatch::Uncovered => out.push(difference(DifferenceKind::UncoveredCoercion {
                left: describe(l),
                right: describe(r),
            })),
        },
        (l, r) => out.push(difference(DifferenceKind::TypeMismatch {
            left: type_name(l).to_string(),
            right: type_name(r).to_string(),
        })),
    }
}

fn walk_mappings(path: &ValuePath, left: &Mapping, right: &Mapping, comparator: &dyn ScalarComparator, out: &mut Vec<Difference>) {
    for (key, l) in left {
        let child = path.key(render(key));
        match right.get(key) {
            Some(r) => walk(&child, l, r, comparator, out),
            None => out.push(Difference {
                path: child.to_string(),
                kind: DifferenceKind::MissingKey,
            }),
        }
    }

    for key in right.keys().filter(|key| !left.contains_key(*key)) {
        out.push(Difference {
            path: path.key(render(key)).to_string(),
            kind: DifferenceKind::ExtraKey,
        });
    }
}

const fn is_scalar(value: &YamlValue) -> bool {
    matches!(value, YamlValue::Null | YamlValue::Bool(_) | YamlValue::Number(_) | YamlValue::String(_))
}

const fn type_name(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "bool",
        YamlValue::Number(_) => "number",
        YamlValue::String(_) => "string",
        YamlValue::Sequence(_) => "sequence",
        YamlValue::Mapping(_) => "mapping",
        YamlValue::Tagged(_) => "tagged value",
    }
}

fn render(value: &YamlValue) -> String {
    match value {
        YamlValue::String(s) => s.clone(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Null => "null".into(),
        other => type_name(other).into(),
    }
}

fn describe(value: &YamlValue) -> String {
    match value {
        YamlValue::String(s) => format!("string {s:?}"),
        other => format!("{} {}", type_name(other), render(other)),
    }
}
