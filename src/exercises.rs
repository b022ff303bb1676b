//! Small generic container helpers.
//!
//! Each function is a thin wrapper over a standard-library operation; they are
//! not used by the model pipeline.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::iter::Sum;

/// Sum of all elements (zero for an empty slice).
pub fn sum_list<T>(numbers: &[T]) -> T
where
    T: Copy + Sum<T>,
{
    numbers.iter().copied().sum()
}

/// First element of a pair.
pub fn first_of_tuple<A: Clone, B>(t: &(A, B)) -> A {
    t.0.clone()
}

/// Whether `key` is present in `map`.
pub fn has_key<K, V, Q>(map: &HashMap<K, V>, key: &Q) -> bool
where
    K: Borrow<Q> + Eq + Hash,
    Q: Eq + Hash + ?Sized,
{
    map.contains_key(key)
}

/// Round to two decimal places, ties to even on the exact binary value.
pub fn round_float(f: f64) -> f64 {
    if !f.is_finite() {
        return f;
    }
    format!("{f:.2}").parse().unwrap_or(f)
}

/// Reversed copy of `items`.
pub fn reverse_list<T: Clone>(items: &[T]) -> Vec<T> {
    items.iter().rev().cloned().collect()
}

/// Number of elements equal to `item`.
pub fn count_occurrences<T: PartialEq>(items: &[T], item: &T) -> usize {
    items.iter().filter(|x| *x == item).count()
}

/// Build a map from pairs; a repeated key keeps its last value.
pub fn tuples_to_dict<K, V, I>(pairs: I) -> HashMap<K, V>
where
    K: Eq + Hash,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().collect()
}

/// Length in characters (Unicode scalar values), not bytes.
pub fn string_length(s: &str) -> usize {
    s.chars().count()
}

/// Distinct elements of `items`.
pub fn unique_elements<T: Eq + Hash + Clone>(items: &[T]) -> HashSet<T> {
    items.iter().cloned().collect()
}

/// Swap keys and values. When values repeat, which key survives is unspecified.
pub fn swap_dict<K, V>(map: HashMap<K, V>) -> HashMap<V, K>
where
    V: Eq + Hash,
{
    map.into_iter().map(|(k, v)| (v, k)).collect()
}
