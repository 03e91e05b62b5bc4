//! Catalogue mapping works to labels.
//!
//! A catalogue partitions works into labelled sub-corpora for a query.
//! Each work carries exactly one label; the file format is one
//! space-separated `work label` pair per line, with unlabelled works
//! (no label field) skipped.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

/// Ordered mapping of work name to label.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    works: IndexMap<String, String>,
}

impl Catalogue {
    pub fn new() -> Self {
        Catalogue::default()
    }

    /// Load catalogue data from `path`, preserving work order.
    ///
    /// A work listed more than once is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut catalogue = Catalogue::new();
        let data = fs::read_to_string(path)?;
        for line in data.lines() {
            let mut fields = line.split_whitespace();
            let work = match fields.next() {
                Some(work) => work,
                None => continue,
            };
            let label = match fields.next() {
                Some(label) => label,
                None => continue,
            };
            if catalogue.works.contains_key(work) {
                return Err(Error::MalformedCatalogue(format!(
                    "work {} is labelled more than once",
                    work
                )));
            }
            catalogue.works.insert(work.to_string(), label.to_string());
        }
        Ok(catalogue)
    }

    /// Save catalogue data to `path`, optionally sorted by work name.
    pub fn save(&self, path: &Path, sort: bool) -> Result<()> {
        let mut rows: Vec<(&str, &str)> = self
            .works
            .iter()
            .map(|(work, label)| (work.as_str(), label.as_str()))
            .collect();
        if sort {
            rows.sort_by_key(|(work, _)| work.to_string());
        }
        let data: String = rows
            .iter()
            .map(|(work, label)| format!("{} {}\n", work, label))
            .collect();
        fs::write(path, data)?;
        Ok(())
    }

    pub fn insert(&mut self, work: impl Into<String>, label: impl Into<String>) {
        self.works.insert(work.into(), label.into());
    }

    pub fn get(&self, work: &str) -> Option<&str> {
        self.works.get(work).map(String::as_str)
    }

    pub fn contains_work(&self, work: &str) -> bool {
        self.works.contains_key(work)
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    pub fn len(&self) -> usize {
        self.works.len()
    }

    /// Iterate over (work, label) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.works
            .iter()
            .map(|(work, label)| (work.as_str(), label.as_str()))
    }

    pub fn works(&self) -> impl Iterator<Item = &str> {
        self.works.keys().map(String::as_str)
    }

    /// The distinct labels, in order of first occurrence.
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        for label in self.works.values() {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    /// The works carrying `label`, in insertion order.
    pub fn works_by_label(&self, label: &str) -> Vec<&str> {
        self.works
            .iter()
            .filter(|(_, work_label)| work_label.as_str() == label)
            .map(|(work, _)| work.as_str())
            .collect()
    }

    /// A copy with labels remapped by `label_map`; works whose label has
    /// no mapping are dropped.
    pub fn relabel(&self, label_map: &IndexMap<String, String>) -> Catalogue {
        let mut catalogue = Catalogue::new();
        for (work, label) in &self.works {
            if let Some(new_label) = label_map.get(label) {
                catalogue.insert(work.clone(), new_label.clone());
            }
        }
        catalogue
    }

    /// Remove all works carrying `label`.
    pub fn remove_label(&mut self, label: &str) {
        self.works.retain(|_, work_label| work_label != label);
    }
}

impl FromIterator<(String, String)> for Catalogue {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Catalogue {
            works: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalogue {
        let mut catalogue = Catalogue::new();
        catalogue.insert("T0001", "A");
        catalogue.insert("T0002", "B");
        catalogue.insert("T0003", "A");
        catalogue
    }

    #[test]
    fn labels_in_first_occurrence_order() {
        assert_eq!(sample().labels(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn works_by_label() {
        assert_eq!(sample().works_by_label("A"), vec!["T0001", "T0003"]);
    }

    #[test]
    fn remove_label_drops_works() {
        let mut catalogue = sample();
        catalogue.remove_label("A");
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.get("T0002"), Some("B"));
    }

    #[test]
    fn relabel_remaps_and_drops() {
        let mut label_map = IndexMap::new();
        label_map.insert("A".to_string(), "X".to_string());
        let relabelled = sample().relabel(&label_map);
        assert_eq!(relabelled.get("T0001"), Some("X"));
        assert!(!relabelled.contains_work("T0002"));
    }

    #[test]
    fn load_rejects_duplicate_work() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalogue.txt");
        std::fs::write(&path, "T0001 A\nT0001 B\n").unwrap();
        assert!(matches!(
            Catalogue::load(&path),
            Err(Error::MalformedCatalogue(_))
        ));
    }

    #[test]
    fn load_skips_unlabelled_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalogue.txt");
        std::fs::write(&path, "T0001 A\nT0002\n\nT0003 B\n").unwrap();
        let catalogue = Catalogue::load(&path).unwrap();
        assert_eq!(catalogue.len(), 2);
        assert!(!catalogue.contains_work("T0002"));
    }
}
