//! Catalog of streams available across a source set

use indexmap::IndexMap;

use crate::data::StreamDescriptor;

/// Flat, deduplicated snapshot of every stream exposed by one load.
///
/// Rebuilt from scratch on each load; never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct StreamCatalog {
    /// Descriptor -> id of the first backend that exposed it
    streams: IndexMap<StreamDescriptor, String>,
}

impl StreamCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from `(backend id, descriptors)` pairs.
    ///
    /// When two backends expose the same descriptor the first one wins.
    pub fn from_listings<I, D>(listings: I) -> Self
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = StreamDescriptor>,
    {
        let mut catalog = Self::new();
        for (backend_id, descriptors) in listings {
            for descriptor in descriptors {
                catalog.insert(descriptor, &backend_id);
            }
        }
        catalog
    }

    /// Catalog with no provenance information, mostly useful for tests and
    /// for applicability checks against a hand-written list.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = StreamDescriptor>) -> Self {
        Self::from_listings([(String::new(), descriptors)])
    }

    fn insert(&mut self, descriptor: StreamDescriptor, backend_id: &str) {
        self.streams
            .entry(descriptor)
            .or_insert_with(|| backend_id.to_string());
    }

    pub fn contains(&self, descriptor: &StreamDescriptor) -> bool {
        self.streams.contains_key(descriptor)
    }

    pub fn contains_named(&self, category: &str, name: &str) -> bool {
        self.streams
            .keys()
            .any(|d| d.category == category && d.name == name)
    }

    /// Id of the backend providing `descriptor`
    pub fn provider(&self, descriptor: &StreamDescriptor) -> Option<&str> {
        self.streams.get(descriptor).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.keys()
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a StreamDescriptor> + 'a {
        self.streams.keys().filter(move |d| d.category == category)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Descriptors rendered as `category:name`
    pub fn names(&self) -> Vec<String> {
        self.streams.keys().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_keeps_first_provider() {
        let catalog = StreamCatalog::from_listings([
            (
                "event_record".to_string(),
                vec![
                    StreamDescriptor::new("track", "trackreco"),
                    StreamDescriptor::new("opflash", "simpleFlashBeam"),
                ],
            ),
            (
                "ntuple".to_string(),
                vec![StreamDescriptor::new("track", "trackreco")],
            ),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.provider(&StreamDescriptor::new("track", "trackreco")),
            Some("event_record")
        );
        assert!(catalog.contains_named("opflash", "simpleFlashBeam"));
        assert!(!catalog.contains_named("opflash", "simpleFlashCosmic"));
    }

    #[test]
    fn test_in_category() {
        let catalog = StreamCatalog::from_descriptors([
            StreamDescriptor::new("crthit", "crthitcorr"),
            StreamDescriptor::new("crttrack", "crttrack"),
            StreamDescriptor::new("crthit", "crthit"),
        ]);

        let hits: Vec<_> = catalog.in_category("crthit").map(|d| d.name.as_str()).collect();
        assert_eq!(hits, vec!["crthitcorr", "crthit"]);
        assert_eq!(catalog.names()[1], "crttrack:crttrack");
    }
}
