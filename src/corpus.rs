//! Filesystem corpus of witnesses.
//!
//! A corpus directory contains one subdirectory per work, each holding
//! one plain-text file per witness named `<siglum>.txt`. Texts are
//! expected to have been stripped of markup beforehand.

use crate::error::{Error, Result};
use crate::witness::Witness;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Corpus {
    path: PathBuf,
}

impl Corpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Corpus { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The work names in the corpus, sorted.
    pub fn works(&self) -> Result<Vec<String>> {
        let mut works = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                works.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        works.sort();
        Ok(works)
    }

    /// The witness sigla for `work`, sorted.
    pub fn sigla(&self, work: &str) -> Result<Vec<String>> {
        let work_path = self.path.join(work);
        if !work_path.is_dir() {
            return Err(Error::not_found("work", work));
        }
        let mut sigla = Vec::new();
        for entry in fs::read_dir(&work_path)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("txt") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    sigla.push(stem.to_string());
                }
            }
        }
        sigla.sort();
        Ok(sigla)
    }

    /// Load a single witness.
    pub fn witness(&self, work: &str, siglum: &str) -> Result<Witness> {
        let path = self.path.join(work).join(format!("{}.txt", siglum));
        let content = fs::read_to_string(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::not_found("witness", format!("{}/{}", work, siglum))
            } else {
                Error::Io(err)
            }
        })?;
        Ok(Witness::new(work, siglum, content))
    }

    /// Load every witness of `work`. Errors if the work is absent or has
    /// no witness files, since that indicates a configuration mismatch.
    pub fn witnesses_of_work(&self, work: &str) -> Result<Vec<Witness>> {
        let sigla = self.sigla(work)?;
        if sigla.is_empty() {
            return Err(Error::not_found("witnesses for work", work));
        }
        sigla
            .iter()
            .map(|siglum| self.witness(work, siglum))
            .collect()
    }

    /// Load every witness in the corpus, ordered by work then siglum.
    pub fn witnesses(&self) -> Result<Vec<Witness>> {
        let mut witnesses = Vec::new();
        for work in self.works()? {
            for siglum in self.sigla(&work)? {
                witnesses.push(self.witness(&work, &siglum)?);
            }
        }
        Ok(witnesses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_corpus(dir: &Path) {
        fs::create_dir_all(dir.join("T0001")).unwrap();
        fs::create_dir_all(dir.join("T0002")).unwrap();
        fs::write(dir.join("T0001/base.txt"), "then we went").unwrap();
        fs::write(dir.join("T0001/alt.txt"), "then they went").unwrap();
        fs::write(dir.join("T0002/base.txt"), "these he sent").unwrap();
    }

    #[test]
    fn works_and_sigla_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        build_corpus(dir.path());
        let corpus = Corpus::new(dir.path());
        assert_eq!(corpus.works().unwrap(), vec!["T0001", "T0002"]);
        assert_eq!(corpus.sigla("T0001").unwrap(), vec!["alt", "base"]);
    }

    #[test]
    fn witness_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        build_corpus(dir.path());
        let corpus = Corpus::new(dir.path());
        let witness = corpus.witness("T0002", "base").unwrap();
        assert_eq!(witness.content(), "these he sent");
        assert_eq!(witness.work(), "T0002");
        assert_eq!(witness.siglum(), "base");
    }

    #[test]
    fn missing_work_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        build_corpus(dir.path());
        let corpus = Corpus::new(dir.path());
        assert!(matches!(
            corpus.witnesses_of_work("T9999"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn all_witnesses_enumerated() {
        let dir = tempfile::tempdir().unwrap();
        build_corpus(dir.path());
        let corpus = Corpus::new(dir.path());
        assert_eq!(corpus.witnesses().unwrap().len(), 3);
    }
}
