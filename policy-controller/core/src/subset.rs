use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

mod iter;

pub use self::iter::SubsetIter;

/// A predicate over a single tag of a mesh participant.
///
/// Tags order by key, then value, then negation, which is the order candidate tags are fed to
/// [`SubsetIter`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,

    /// When set, the tag asserts that `key` does NOT equal `value`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not: bool,
}

/// A conjunction of tag predicates.
///
/// As a policy selector, an empty subset selects everything. As an assignment (the tags observed
/// on a proxy or connection), an empty subset means nothing is known.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subset(Vec<Tag>);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid tag {0:?}: expected key=value or key!=value")]
pub struct InvalidTag(String);

/// A concrete set of tags observed on a participant, at most one value per key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Element(BTreeMap<String, String>);

// === impl Tag ===

impl Tag {
    pub fn new(key: impl ToString, value: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            not: false,
        }
    }

    pub fn negated(key: impl ToString, value: impl ToString) -> Self {
        Self {
            not: true,
            ..Self::new(key, value)
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.not {
            write!(f, "{}!={}", self.key, self.value)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

impl FromStr for Tag {
    type Err = InvalidTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTag(s.to_string());
        let (key, value, not) = match s.split_once("!=") {
            Some((key, value)) => (key, value, true),
            None => {
                let (key, value) = s.split_once('=').ok_or_else(invalid)?;
                (key, value, false)
            }
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
            not,
        })
    }
}

// === impl Subset ===

impl Subset {
    pub fn new(tags: Vec<Tag>) -> Self {
        Self(tags)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Tag] {
        &self.0
    }

    /// Returns true if every predicate of this selector holds for `other`.
    ///
    /// A selector tag fails when `other` says nothing about its key, when `other` asserts the
    /// opposite of it, or when the selector requires a value that `other` doesn't guarantee.
    pub fn is_subset(&self, other: &Subset) -> bool {
        self.holds_for(other, false)
    }

    /// Returns true if `assignment` falls in this cell.
    ///
    /// Like [`Subset::is_subset`], except that a key the assignment doesn't mention satisfies a
    /// negated tag, as it does for [`Subset::contains_element`]. A positive tag still requires its
    /// key, so the cell negating every candidate is the only one an unrelated assignment falls in.
    pub fn matches_assignment(&self, assignment: &Subset) -> bool {
        self.holds_for(assignment, true)
    }

    fn holds_for(&self, other: &Subset, absent_negates: bool) -> bool {
        if self.is_empty() {
            return true;
        }

        let mut other_by_key = HashMap::<&str, Vec<&Tag>>::with_capacity(other.len());
        for tag in other.iter() {
            other_by_key.entry(tag.key.as_str()).or_default().push(tag);
        }

        for tag in self.iter() {
            let others = match other_by_key.get(tag.key.as_str()) {
                Some(others) => others,
                None if tag.not && absent_negates => continue,
                None => return false,
            };
            for o in others {
                if o.value == tag.value && o.not != tag.not {
                    return false;
                }
                if o.value != tag.value && !tag.not {
                    return false;
                }
            }
        }

        true
    }

    /// Returns true if the concrete `element` satisfies every predicate of this selector.
    pub fn contains_element(&self, element: &Element) -> bool {
        self.iter().all(|tag| match element.get(&tag.key) {
            Some(value) if tag.not => value != tag.value,
            Some(value) => value == tag.value,
            None => tag.not,
        })
    }

    /// Returns false only when a positive tag of `self` and a positive tag of `other` pin the same
    /// key to different values.
    pub fn intersect(&self, other: &Subset) -> bool {
        if self.is_empty() || other.is_empty() {
            return true;
        }

        let mut positive = HashMap::<&str, Vec<&str>>::new();
        for tag in other.iter().filter(|t| !t.not) {
            positive
                .entry(tag.key.as_str())
                .or_default()
                .push(tag.value.as_str());
        }

        self.iter().filter(|t| !t.not).all(|tag| {
            positive
                .get(tag.key.as_str())
                .map(|values| values.iter().all(|v| *v == tag.value))
                .unwrap_or(true)
        })
    }

    /// The number of non-negated tags; higher is more specific.
    pub fn num_positive(&self) -> usize {
        self.iter().filter(|t| !t.not).count()
    }

    pub fn index_of_positive(&self) -> Option<usize> {
        self.iter().position(|t| !t.not)
    }

    /// Drops repeated subsets, keeping the first occurrence of each.
    pub fn deduplicate(subsets: impl IntoIterator<Item = Subset>) -> Vec<Subset> {
        let mut out = Vec::<Subset>::new();
        for ss in subsets {
            if !out.contains(&ss) {
                out.push(ss);
            }
        }
        out
    }
}

impl FromIterator<Tag> for Subset {
    fn from_iter<T: IntoIterator<Item = Tag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Subset {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'s> IntoIterator for &'s Subset {
    type Item = &'s Tag;
    type IntoIter = std::slice::Iter<'s, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Tag>> for Subset {
    fn from(tags: Vec<Tag>) -> Self {
        Self(tags)
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("*");
        }
        for (i, tag) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            tag.fmt(f)?;
        }
        Ok(())
    }
}

/// Parses a comma-separated list of tags. `*` and the empty string are the empty subset.
impl FromStr for Subset {
    type Err = InvalidTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::default());
        }
        s.split(',').map(str::parse::<Tag>).collect()
    }
}

// === impl Element ===

impl Element {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expresses the element as an assignment of positive tags.
    pub fn to_subset(&self) -> Subset {
        self.0.iter().map(|(k, v)| Tag::new(k, v)).collect()
    }
}

impl From<BTreeMap<String, String>> for Element {
    fn from(tags: BTreeMap<String, String>) -> Self {
        Self(tags)
    }
}

impl AsRef<BTreeMap<String, String>> for Element {
    fn as_ref(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl FromIterator<(String, String)> for Element {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl FromIterator<(&'static str, &'static str)> for Element {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
