//! Structural shape checks over plain tables.
//!
//! After a lossy wire round trip the only thing left to tell a sequence from a
//! sparse numeric table or a flattened container is the shape of its keys and
//! the brands it carries. These checks are pure and never look at values.

use crate::value::{Brand, Key, Table};

/// What a plain table represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Contiguous integer keys `1..=n`.
    Sequence,
    /// Non-empty, every data key a non-negative integer, not a sequence.
    NumberKeyed,
    /// Any other unbranded table, including the empty one.
    Associative,
    /// Carries a primary brand.
    Branded(Brand),
}

pub fn classify(table: &Table) -> Shape {
    if let Some(brand) = primary_brand(table) {
        return Shape::Branded(brand);
    }
    if is_sequence(table) {
        Shape::Sequence
    } else if has_only_number_keys(table) {
        Shape::NumberKeyed
    } else {
        Shape::Associative
    }
}

/// The highest-priority primary brand on `table`, if any.
pub fn primary_brand(table: &Table) -> Option<Brand> {
    Brand::PRIMARY
        .iter()
        .copied()
        .find(|brand| table.has_brand(*brand))
}

/// True when the unbranded data keys are exactly `1..=n` for some `n >= 1`.
pub fn is_sequence(table: &Table) -> bool {
    if table.brands().next().is_some() {
        return false;
    }

    let mut expected = 1;
    for key in table.keys() {
        match key {
            Key::Int(n) if *n == expected => expected += 1,
            _ => return false,
        }
    }
    expected > 1
}

/// True when the table is non-empty and every data key is a non-negative integer.
///
/// Brand keys are ignored, so a table already tagged number-keyed still matches.
pub fn has_only_number_keys(table: &Table) -> bool {
    let mut data_keys = table.keys().filter(|key| !key.is_brand()).peekable();
    if data_keys.peek().is_none() {
        return false;
    }
    data_keys.all(|key| matches!(key, Key::Int(n) if *n >= 0))
}
