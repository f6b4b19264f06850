use super::{Avp, AvpValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Ordered sequence of attributes
///
/// RADIUS permits repeated names, so this is a list rather than a map. Two
/// merge operators are provided:
///
/// - [`AttributeSet::override_with`]: names present in the other set replace
///   every occurrence in this one
/// - [`AttributeSet::add`]: plain concatenation, duplicates kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    avps: Vec<Avp>,
}

impl AttributeSet {
    pub fn new() -> Self {
        AttributeSet { avps: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.avps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Avp> {
        self.avps.iter()
    }

    /// First attribute with this name
    pub fn get(&self, name: &str) -> Option<&AvpValue> {
        self.avps.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    /// All attributes with this name, in order
    pub fn get_all(&self, name: &str) -> Vec<&AvpValue> {
        self.avps
            .iter()
            .filter(|a| a.name == name)
            .map(|a| &a.value)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.avps.iter().any(|a| a.name == name)
    }

    pub fn push(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    /// Remove every occurrence of `name`, returning how many were removed
    pub fn remove_all(&mut self, name: &str) -> usize {
        let before = self.avps.len();
        self.avps.retain(|a| a.name != name);
        before - self.avps.len()
    }

    /// Replace every occurrence of `avp.name` with `avp`, or append it
    pub fn replace(&mut self, avp: Avp) {
        let single: AttributeSet = std::iter::once(avp).collect();
        *self = self.override_with(&single);
    }

    /// Merge `other` over this set
    ///
    /// For each name in `other`, all occurrences in `self` are replaced by
    /// the value(s) from `other`, placed where the first occurrence was.
    /// Names only present in `other` are appended in `other`'s order.
    /// Untouched names keep their relative order.
    pub fn override_with(&self, other: &AttributeSet) -> AttributeSet {
        let overridden: HashSet<&str> = other.avps.iter().map(|a| a.name.as_str()).collect();
        let mut emitted: HashSet<&str> = HashSet::new();
        let mut result = Vec::with_capacity(self.avps.len() + other.avps.len());

        for avp in &self.avps {
            if overridden.contains(avp.name.as_str()) {
                if emitted.insert(avp.name.as_str()) {
                    result.extend(other.avps.iter().filter(|a| a.name == avp.name).cloned());
                }
            } else {
                result.push(avp.clone());
            }
        }

        for avp in &other.avps {
            if !self.contains(&avp.name) {
                result.push(avp.clone());
            }
        }

        AttributeSet { avps: result }
    }

    /// Append `other` without deduplication
    pub fn add(&self, other: &AttributeSet) -> AttributeSet {
        let mut avps = self.avps.clone();
        avps.extend(other.avps.iter().cloned());
        AttributeSet { avps }
    }

    /// Apply `f` to every value, keeping names and order
    pub fn map_values<F>(&self, mut f: F) -> AttributeSet
    where
        F: FnMut(&AvpValue) -> AvpValue,
    {
        self.avps
            .iter()
            .map(|a| Avp {
                name: a.name.clone(),
                value: f(&a.value),
            })
            .collect()
    }
}

impl FromIterator<Avp> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Avp>>(iter: I) -> Self {
        AttributeSet {
            avps: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for AttributeSet {
    type Item = Avp;
    type IntoIter = std::vec::IntoIter<Avp>;

    fn into_iter(self) -> Self::IntoIter {
        self.avps.into_iter()
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = &'a Avp;
    type IntoIter = std::slice::Iter<'a, Avp>;

    fn into_iter(self) -> Self::IntoIter {
        self.avps.iter()
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.avps.iter().map(|a| a.to_string()).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> AttributeSet {
        pairs.iter().map(|(n, v)| Avp::new(*n, *v)).collect()
    }

    fn names(set: &AttributeSet) -> Vec<String> {
        set.iter().map(|a| a.name.clone()).collect()
    }

    #[test]
    fn test_override_replaces_and_appends() {
        let base = set(&[("A", "1"), ("B", "2"), ("C", "3")]);
        let over = set(&[("D", "4"), ("B", "20")]);

        let merged = base.override_with(&over);
        assert_eq!(names(&merged), vec!["A", "B", "C", "D"]);
        assert_eq!(merged.get("B"), Some(&AvpValue::from("20")));
        assert_eq!(merged.get_all("B").len(), 1);
    }

    #[test]
    fn test_override_collapses_repeated_names() {
        let base = set(&[("Class", "x"), ("A", "1"), ("Class", "y")]);
        let over = set(&[("Class", "z")]);

        let merged = base.override_with(&over);
        assert_eq!(names(&merged), vec!["Class", "A"]);
        assert_eq!(merged.get_all("Class"), vec![&AvpValue::from("z")]);
    }

    #[test]
    fn test_override_keeps_multivalued_from_other() {
        let base = set(&[("Cisco-AVPair", "a=1")]);
        let over = set(&[("Cisco-AVPair", "b=2"), ("Cisco-AVPair", "c=3")]);

        let merged = base.override_with(&over);
        assert_eq!(merged.get_all("Cisco-AVPair").len(), 2);
    }

    #[test]
    fn test_add_keeps_duplicates() {
        let a = set(&[("X", "1")]);
        let b = set(&[("X", "2"), ("Y", "3")]);

        let merged = a.add(&b);
        assert_eq!(names(&merged), vec!["X", "X", "Y"]);
        assert_eq!(merged.get("X"), Some(&AvpValue::from("1")));
    }

    #[test]
    fn test_override_with_empty_is_identity() {
        let a = set(&[("X", "1"), ("Y", "2")]);
        assert_eq!(a.override_with(&AttributeSet::new()), a);
        assert_eq!(AttributeSet::new().override_with(&a), a);
    }

    #[test]
    fn test_replace_and_remove() {
        let mut a = set(&[("X", "1"), ("Y", "2"), ("X", "3")]);
        a.replace(Avp::new("X", "9"));
        assert_eq!(a.get_all("X"), vec![&AvpValue::from("9")]);

        assert_eq!(a.remove_all("Y"), 1);
        assert!(!a.contains("Y"));
    }

    #[test]
    fn test_json_is_a_plain_list() {
        let a = set(&[("Filter-Id", "gold")]);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"[{"name":"Filter-Id","value":"gold"}]"#);
    }
}
