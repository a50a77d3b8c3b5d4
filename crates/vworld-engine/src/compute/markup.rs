//! Markup tags: `#name#` placeholders substituted into shader templates.

use super::error::ComputeError;
use super::threads::ThreadGroupConfig;

/// Tag carrying the X dimension of the thread group (threads per group).
pub const THREAD_COUNT_X: &str = "threadCountX";
/// Tag carrying the Y dimension of the thread group.
pub const THREAD_COUNT_Y: &str = "threadCountY";
/// Tag carrying the Z dimension of the thread group.
pub const THREAD_COUNT_Z: &str = "threadCountZ";

/// A single name/value substitution.
///
/// Immutable once built. The placeholder form is `#name#`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupTag {
    name: String,
    value: String,
}

impl MarkupTag {
    /// Creates a tag. The name must be non-empty and must not contain `#`,
    /// otherwise the placeholder could never be matched as written.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, ComputeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ComputeError::invalid("markup tag name is empty"));
        }
        if name.contains('#') {
            return Err(ComputeError::invalid(format!(
                "markup tag name `{name}` contains `#`"
            )));
        }

        Ok(Self { name, value: value.into() })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The literal text this tag replaces, e.g. `#threadCountX#`.
    pub fn placeholder(&self) -> String {
        format!("#{}#", self.name)
    }
}

/// Ordered list of tags.
///
/// No deduplication: a repeated name stays in the list and is applied again
/// in its own position. Since replacement is literal and in order, the first
/// occurrence consumes every placeholder before the later one sees the line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<MarkupTag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: MarkupTag) {
        self.tags.push(tag);
    }

    /// Builds and appends a tag in one step.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ComputeError> {
        self.push(MarkupTag::new(name, value)?);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkupTag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the value of the last tag named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .rev()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }

    /// Returns a copy of this set with the mandatory `threadCountX/Y/Z` tags
    /// appended, valued from `threads.threads_per_group`.
    pub fn with_thread_counts(&self, threads: &ThreadGroupConfig) -> Self {
        let [x, y, z] = threads.threads_per_group();
        let mut out = self.clone();
        for (name, v) in [(THREAD_COUNT_X, x), (THREAD_COUNT_Y, y), (THREAD_COUNT_Z, z)] {
            out.tags.push(MarkupTag {
                name: name.to_string(),
                value: v.to_string(),
            });
        }
        out
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a MarkupTag;
    type IntoIter = std::slice::Iter<'a, MarkupTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_rejected() {
        let err = MarkupTag::new("", "1").unwrap_err();
        assert!(matches!(err, ComputeError::InvalidArgument(_)));
    }

    #[test]
    fn hash_in_name_is_rejected() {
        assert!(MarkupTag::new("a#b", "1").is_err());
    }

    #[test]
    fn empty_value_is_allowed() {
        let tag = MarkupTag::new("unused", "").unwrap();
        assert_eq!(tag.placeholder(), "#unused#");
        assert_eq!(tag.value(), "");
    }

    #[test]
    fn duplicates_are_kept_in_order() {
        let mut set = TagSet::new();
        set.insert("a", "1").unwrap();
        set.insert("a", "2").unwrap();
        assert_eq!(set.len(), 2);
        let values: Vec<_> = set.iter().map(MarkupTag::value).collect();
        assert_eq!(values, ["1", "2"]);
        assert_eq!(set.get("a"), Some("2"));
    }

    #[test]
    fn thread_counts_are_appended_after_variant_tags() {
        let mut set = TagSet::new();
        set.insert("radius", "0.45").unwrap();
        let threads = ThreadGroupConfig::new([8, 4, 1], [1, 1, 1]).unwrap();

        let full = set.with_thread_counts(&threads);
        let names: Vec<_> = full.iter().map(MarkupTag::name).collect();
        assert_eq!(names, ["radius", THREAD_COUNT_X, THREAD_COUNT_Y, THREAD_COUNT_Z]);
        assert_eq!(full.get(THREAD_COUNT_Y), Some("4"));

        // The source set is untouched, so a retried initialization starts clean.
        assert_eq!(set.len(), 1);
    }
}
