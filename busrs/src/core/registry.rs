//! Path-keyed store of elements, one instance per path.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::core::element::Element;
use crate::types::value::PropertyName;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    elements: HashMap<PropertyName, Element>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the element at `path`, creating an empty one if needed.
    ///
    /// Never performs bus I/O. The flag is `true` when the element was created.
    pub(crate) fn get_or_create(
        &mut self,
        path: &str,
        create: impl FnOnce(PropertyName) -> Element,
    ) -> (&mut Element, bool) {
        match self.elements.entry(PropertyName::from(path)) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                (entry.insert(create(key)), true)
            }
        }
    }

    pub(crate) fn get(&self, path: &str) -> Option<&Element> {
        self.elements.get(path)
    }

    pub(crate) fn get_mut(&mut self, path: &str) -> Option<&mut Element> {
        self.elements.get_mut(path)
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.elements.contains_key(path)
    }

    /// Excises the element from the index and hands it back for release.
    pub(crate) fn remove(&mut self, path: &str) -> Option<Element> {
        self.elements.remove(path)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub(crate) fn paths(&self) -> Vec<PropertyName> {
        self.elements.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
