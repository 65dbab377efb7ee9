//! Structural comparison of wire documents, used to validate round trips.

mod coercion;
mod compare;

pub use coercion::{Coercion, CoercionTable, ScalarComparator, ScalarMatch, Segment, TableComparator, ValuePath};
pub use compare::{Difference, DifferenceKind, check_equivalent, compare, compare_text};
