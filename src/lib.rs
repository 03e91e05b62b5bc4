//! N-gram indexing and set-algebra queries over multi-witness corpora.
//!
//! Works are stored as one or more witnesses (textual exemplars), whose
//! n-grams are indexed into SQLite. A catalogue partitions works into
//! labelled sub-corpora, and queries over those labels find the n-grams
//! shared by all of them or peculiar to one. The resulting tables can
//! then be refined: reduced to maximal matches, extended against the
//! source texts, pruned, relabelled and grouped.
//!
//! # Example
//!
//! ```no_run
//! use corpus_ngrams::prelude::*;
//! use std::path::Path;
//!
//! let corpus = Corpus::new("corpus");
//! let catalogue = Catalogue::load(Path::new("catalogue.txt")).unwrap();
//! let tokenizer = Tokenizer::from_profile(TokenizerProfile::Cbeta);
//!
//! let mut store = DataStore::open(
//!     Path::new("ngrams.db"),
//!     tokenizer,
//!     StoreOptions::default(),
//! )
//! .unwrap();
//! store.add_ngrams(&corpus, 2, 4, Some(&catalogue), true).unwrap();
//!
//! let mut results = store.intersection(&catalogue).unwrap();
//! results.reduce();
//! results.sort();
//! let mut out = Vec::new();
//! results.csv(&mut out).unwrap();
//! ```

pub mod catalogue;
pub mod corpus;
pub mod error;
pub mod results;
pub mod store;
pub mod tokenizer;
pub mod witness;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::catalogue::Catalogue;
    pub use crate::corpus::Corpus;
    pub use crate::error::{Error, Result};
    pub use crate::results::{
        write_collapsed_csv, write_ngram_groups_csv, write_witness_groups_csv, CollapsedRow,
        NGramGroupRow, ResultRow, Results, WitnessGroupRow,
    };
    pub use crate::store::{
        write_counts_csv, write_search_csv, CountRow, DataStore, LabelExtent, QueryOutput,
        SearchRow, StoreOptions,
    };
    pub use crate::tokenizer::{Tokenizer, TokenizerProfile};
    pub use crate::witness::Witness;
}

// Re-export commonly used types at the crate root
pub use catalogue::Catalogue;
pub use corpus::Corpus;
pub use error::{Error, Result};
pub use results::Results;
pub use store::{DataStore, StoreOptions};
pub use tokenizer::{Tokenizer, TokenizerProfile};
