//! Query results and the transformations that refine them.
//!
//! A results table holds one row per (n-gram, witness) with its
//! occurrence count and the label the witness carried when the query
//! ran. Tables round-trip through CSV, so every transformation here can
//! run long after the query that produced its input, and the operations
//! compose in any order that makes sense for the analysis.

use crate::catalogue::Catalogue;
use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;
use crate::witness::{ngram_counts, occurrences};
use indexmap::IndexMap;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, warn};

pub const NGRAM: &str = "ngram";
pub const SIZE: &str = "size";
pub const WORK: &str = "work";
pub const SIGLUM: &str = "siglum";
pub const COUNT: &str = "count";
pub const LABEL: &str = "label";
pub const LABEL_COUNT: &str = "label count";
pub const LABEL_WORK_COUNT: &str = "label work count";

/// One witness's attestation of one n-gram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub ngram: String,
    pub size: u32,
    pub work: String,
    pub siglum: String,
    pub count: u64,
    pub label: String,
    pub label_count: Option<u64>,
    pub label_work_count: Option<u64>,
}

impl ResultRow {
    pub fn base(
        ngram: impl Into<String>,
        size: u32,
        work: impl Into<String>,
        siglum: impl Into<String>,
        count: u64,
        label: impl Into<String>,
    ) -> Self {
        ResultRow {
            ngram: ngram.into(),
            size,
            work: work.into(),
            siglum: siglum.into(),
            count,
            label: label.into(),
            label_count: None,
            label_work_count: None,
        }
    }
}

/// Row of the per-n-gram grouped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NGramGroupRow {
    pub ngram: String,
    pub size: u32,
    pub label: String,
    pub work_counts: String,
}

/// Row of the per-witness grouped table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WitnessGroupRow {
    pub work: String,
    pub siglum: String,
    pub label: String,
    pub ngrams: String,
    pub number: u64,
    pub total_count: u64,
}

/// Row of the collapsed-witnesses table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollapsedRow {
    pub ngram: String,
    pub size: u32,
    pub work: String,
    pub sigla: String,
    pub count: u64,
    pub label: String,
}

/// A query results table together with the tokenizer its n-grams were
/// generated with, which several transformations need in order to take
/// n-grams apart again.
#[derive(Debug, Clone)]
pub struct Results {
    rows: Vec<ResultRow>,
    has_label_count: bool,
    has_label_work_count: bool,
    tokenizer: Tokenizer,
}

impl Results {
    pub fn new(rows: Vec<ResultRow>, tokenizer: Tokenizer) -> Self {
        Results {
            rows,
            has_label_count: false,
            has_label_work_count: false,
            tokenizer,
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Load a results table from a CSV file.
    pub fn from_csv_path(path: &Path, tokenizer: Tokenizer) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(BufReader::new(file), tokenizer)
    }

    /// Load a results table from CSV data. The base columns must all be
    /// present; the label count columns are optional and their presence
    /// is preserved on output. Blank rows are skipped.
    pub fn from_reader<R: BufRead>(reader: R, tokenizer: Tokenizer) -> Result<Self> {
        let mut records = RecordReader::new(reader);
        let layout = ColumnLayout::from_reader(&mut records)?;
        let mut rows = Vec::new();
        while let Some(record) = records.next_record()? {
            if let Some(row) = layout.parse_row(&record)? {
                rows.push(row);
            }
        }
        Ok(Results {
            rows,
            has_label_count: layout.label_count.is_some(),
            has_label_work_count: layout.label_work_count.is_some(),
            tokenizer,
        })
    }

    /// Load raw query rows from CSV data, reducing each witness's rows as
    /// its group completes. The input must be grouped by (work, siglum),
    /// which the store's queries guarantee by ordering; only one
    /// witness's raw rows are ever in memory at a time.
    pub fn reduced_from_reader<R: BufRead>(reader: R, tokenizer: Tokenizer) -> Result<Self> {
        let mut records = RecordReader::new(reader);
        let layout = ColumnLayout::from_reader(&mut records)?;
        let mut reduced = Vec::new();
        let mut group: Vec<ResultRow> = Vec::new();
        let mut key: Option<(String, String)> = None;
        while let Some(record) = records.next_record()? {
            let row = match layout.parse_row(&record)? {
                Some(row) => row,
                None => continue,
            };
            let row_key = (row.work.clone(), row.siglum.clone());
            if key.as_ref() != Some(&row_key) {
                if !group.is_empty() {
                    reduced.extend(reduce_witness_rows(std::mem::take(&mut group), &tokenizer));
                }
                key = Some(row_key);
            }
            group.push(row);
        }
        if !group.is_empty() {
            reduced.extend(reduce_witness_rows(group, &tokenizer));
        }
        Ok(Results::new(reduced, tokenizer))
    }

    /// Write the table as CSV, including whichever label count columns
    /// are present.
    pub fn csv<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut header = vec![NGRAM, SIZE, WORK, SIGLUM, COUNT, LABEL];
        if self.has_label_count {
            header.push(LABEL_COUNT);
        }
        if self.has_label_work_count {
            header.push(LABEL_WORK_COUNT);
        }
        writeln!(writer, "{}", header.join(","))?;
        for row in &self.rows {
            write!(
                writer,
                "{},{},{},{},{},{}",
                csv_field(&row.ngram),
                row.size,
                csv_field(&row.work),
                csv_field(&row.siglum),
                row.count,
                csv_field(&row.label)
            )?;
            if self.has_label_count {
                write!(writer, ",{}", row.label_count.unwrap_or(0))?;
            }
            if self.has_label_work_count {
                write!(writer, ",{}", row.label_work_count.unwrap_or(0))?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Remove each n-gram's occurrences that are wholly accounted for by
    /// a larger n-gram attested in the same witness, leaving only the
    /// longest matches and whatever residue occurs outside them.
    ///
    /// Operates on complete, unreduced query output; applying it a
    /// second time would subtract the containments again and is not
    /// meaningful.
    pub fn reduce(&mut self) {
        debug!(rows = self.rows.len(), "reducing result rows");
        let rows = std::mem::take(&mut self.rows);
        let mut groups: IndexMap<(String, String), Vec<ResultRow>> = IndexMap::new();
        for row in rows {
            groups
                .entry((row.work.clone(), row.siglum.clone()))
                .or_default()
                .push(row);
        }
        for (_, group) in groups {
            self.rows
                .extend(reduce_witness_rows(group, &self.tokenizer));
        }
    }

    /// Extend the largest n-grams in each witness to their maximal length
    /// by chaining overlapping attested n-grams, verifying each candidate
    /// against the witness text, and add rows for every larger n-gram so
    /// discovered. Intersection results are re-filtered afterwards so
    /// the extension cannot break the all-labels guarantee.
    pub fn extend(&mut self, corpus: &Corpus) -> Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let highest = self.rows.iter().map(|row| row.size).max().unwrap_or(0);
        if highest < 2 {
            warn!("extending results of unigrams is unsupported; results unchanged");
            return Ok(());
        }
        let is_intersect = self.is_intersect();
        let mut groups: IndexMap<(String, String, String), Vec<usize>> = IndexMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            groups
                .entry((row.work.clone(), row.siglum.clone(), row.label.clone()))
                .or_default()
                .push(i);
        }
        let mut new_rows = Vec::new();
        for ((work, siglum, label), indices) in groups {
            let witness = corpus.witness(&work, &siglum)?;
            let tokens = witness.tokens(&self.tokenizer);
            let mut seeds: Vec<Vec<String>> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for &i in &indices {
                let row = &self.rows[i];
                seen.insert(row.ngram.clone());
                if row.size == highest {
                    let seed = self.ngram_tokens(&row.ngram);
                    if !seeds.contains(&seed) {
                        seeds.push(seed);
                    }
                }
            }
            if seeds.is_empty() {
                continue;
            }
            debug!(%work, %siglum, seeds = seeds.len(), "extending witness n-grams");
            for sequence in extend_sequences(&seeds, &tokens) {
                for size in (highest as usize + 1)..=sequence.len() {
                    for window in sequence.windows(size) {
                        let ngram = self.tokenizer.join(window);
                        if seen.contains(&ngram) {
                            continue;
                        }
                        let count = occurrences(&tokens, window);
                        if count > 0 {
                            seen.insert(ngram.clone());
                            new_rows.push(ResultRow::base(
                                ngram,
                                size as u32,
                                work.clone(),
                                siglum.clone(),
                                count,
                                label.clone(),
                            ));
                        }
                    }
                }
            }
        }
        self.rows.extend(new_rows);
        if is_intersect {
            self.reciprocal_remove();
        }
        Ok(())
    }

    /// Regrow each witness's n-grams up to `max_size` around the minimal
    /// distinguishing n-grams already present, then keep only rows at a
    /// bifurcation point, where growing or shrinking the n-gram by one
    /// token changes how many sub-corpus occurrences it has. The output
    /// carries the label count column.
    pub fn bifurcated_extend(&mut self, corpus: &Corpus, max_size: u32) -> Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let highest = self.rows.iter().map(|row| row.size).max().unwrap_or(0);
        if max_size <= highest {
            return Err(Error::QueryValidity(format!(
                "extension size ({}) must be larger than the largest n-gram present ({})",
                max_size, highest
            )));
        }
        let rows = std::mem::take(&mut self.rows);
        let mut groups: IndexMap<(String, String, String), Vec<ResultRow>> = IndexMap::new();
        for row in rows {
            groups
                .entry((row.work.clone(), row.siglum.clone(), row.label.clone()))
                .or_default()
                .push(row);
        }
        let mut extended = Vec::new();
        for ((work, siglum, label), group) in groups {
            let witness = corpus.witness(&work, &siglum)?;
            let tokens = witness.tokens(&self.tokenizer);
            let min_size = group.iter().map(|row| row.size).min().unwrap_or(1);
            let filters = generate_filter_ngrams(&group, &self.tokenizer);
            for size in min_size..=max_size {
                for (ngram, count) in ngram_counts(&tokens, &self.tokenizer, size as usize) {
                    let ngram_tokens = self.ngram_tokens(&ngram);
                    if filters
                        .iter()
                        .any(|filter| occurrences(&ngram_tokens, filter) > 0)
                    {
                        extended.push(ResultRow::base(
                            ngram,
                            size,
                            work.clone(),
                            siglum.clone(),
                            count,
                            label.clone(),
                        ));
                    }
                }
            }
        }
        self.rows = extended;
        self.has_label_count = false;
        self.has_label_work_count = false;
        self.add_label_count();
        self.prune_non_bifurcated();
        Ok(())
    }

    /// Keep only positively attested n-grams attested under every label
    /// in the table; restores intersection semantics after
    /// transformations that may have broken them.
    pub fn reciprocal_remove(&mut self) {
        let labels: HashSet<&str> = self.rows.iter().map(|row| row.label.as_str()).collect();
        if labels.len() < 2 {
            return;
        }
        let label_total = labels.len();
        let mut coverage: HashMap<String, HashSet<String>> = HashMap::new();
        for row in &self.rows {
            if row.count > 0 {
                coverage
                    .entry(row.ngram.clone())
                    .or_default()
                    .insert(row.label.clone());
            }
        }
        self.rows.retain(|row| {
            row.count > 0
                && coverage
                    .get(&row.ngram)
                    .map_or(false, |labels| labels.len() == label_total)
        });
    }

    /// For every (label, n-gram, work) present, add count-0 rows for each
    /// of that work's corpus witnesses that has no row, making absences
    /// explicit.
    pub fn zero_fill(&mut self, corpus: &Corpus) -> Result<()> {
        let mut combos: IndexMap<(String, String, u32, String), HashSet<String>> = IndexMap::new();
        for row in &self.rows {
            combos
                .entry((
                    row.label.clone(),
                    row.ngram.clone(),
                    row.size,
                    row.work.clone(),
                ))
                .or_default()
                .insert(row.siglum.clone());
        }
        let mut sigla_cache: HashMap<String, Vec<String>> = HashMap::new();
        let mut new_rows = Vec::new();
        for ((label, ngram, size, work), present) in combos {
            let sigla = match sigla_cache.get(&work) {
                Some(sigla) => sigla.clone(),
                None => {
                    let sigla = corpus.sigla(&work)?;
                    sigla_cache.insert(work.clone(), sigla.clone());
                    sigla
                }
            };
            for siglum in sigla {
                if !present.contains(&siglum) {
                    new_rows.push(ResultRow::base(
                        ngram.clone(),
                        size,
                        work.clone(),
                        siglum,
                        0,
                        label.clone(),
                    ));
                }
            }
        }
        self.rows.extend(new_rows);
        Ok(())
    }

    /// Reassign labels from `catalogue`; rows of works it does not list
    /// keep their current label.
    pub fn relabel(&mut self, catalogue: &Catalogue) {
        for row in &mut self.rows {
            if let Some(label) = catalogue.get(&row.work) {
                row.label = label.to_string();
            }
        }
    }

    /// Remove all rows carrying `label`.
    pub fn remove_label(&mut self, label: &str) {
        self.rows.retain(|row| row.label != label);
    }

    /// Remove rows whose n-gram contains `ngram`. An empty needle would
    /// match everything and is ignored.
    pub fn excise(&mut self, ngram: &str) {
        if ngram.is_empty() {
            warn!("ignoring excise of the empty string");
            return;
        }
        self.rows.retain(|row| !row.ngram.contains(ngram));
    }

    /// Remove rows whose n-gram is listed in `ngrams`.
    pub fn prune_by_ngram(&mut self, ngrams: &[String]) {
        let drop: HashSet<&str> = ngrams.iter().map(String::as_str).collect();
        self.rows.retain(|row| !drop.contains(row.ngram.as_str()));
    }

    /// Keep only rows whose n-gram size is within the inclusive bounds.
    pub fn prune_by_ngram_size(&mut self, minimum: Option<u32>, maximum: Option<u32>) {
        self.rows.retain(|row| {
            minimum.map_or(true, |m| row.size >= m) && maximum.map_or(true, |m| row.size <= m)
        });
    }

    /// Keep only n-grams whose corpus-wide occurrence count falls within
    /// the bounds. A work contributes the maximum count among its
    /// witnesses; with `label` the count considers only that label's
    /// rows, and n-grams with no such rows are removed.
    pub fn prune_by_ngram_count(
        &mut self,
        minimum: Option<u64>,
        maximum: Option<u64>,
        label: Option<&str>,
    ) {
        let work_max = self.work_max_counts(label);
        let mut totals: HashMap<String, u64> = HashMap::new();
        for ((ngram, _), max) in work_max {
            *totals.entry(ngram).or_insert(0) += max;
        }
        self.rows.retain(|row| {
            totals
                .get(&row.ngram)
                .map_or(false, |&total| in_range(total, minimum, maximum))
        });
    }

    /// Keep only n-grams for which at least one work's occurrence count
    /// (maximum among its witnesses) falls within the bounds, optionally
    /// considering only `label`'s rows.
    pub fn prune_by_ngram_count_per_work(
        &mut self,
        minimum: Option<u64>,
        maximum: Option<u64>,
        label: Option<&str>,
    ) {
        let work_max = self.work_max_counts(label);
        let mut keep: HashSet<String> = HashSet::new();
        for ((ngram, _), max) in work_max {
            if in_range(max, minimum, maximum) {
                keep.insert(ngram);
            }
        }
        self.rows.retain(|row| keep.contains(&row.ngram));
    }

    /// Keep only n-grams attested (count above zero) in a number of
    /// distinct works within the bounds, optionally considering only
    /// `label`'s rows. Wholly zero-count n-grams count zero works.
    pub fn prune_by_work_count(
        &mut self,
        minimum: Option<u64>,
        maximum: Option<u64>,
        label: Option<&str>,
    ) {
        let mut works: HashMap<String, HashSet<String>> = HashMap::new();
        for row in &self.rows {
            if label.map_or(true, |label| row.label == label) && row.count > 0 {
                works
                    .entry(row.ngram.clone())
                    .or_default()
                    .insert(row.work.clone());
            }
        }
        self.rows.retain(|row| {
            let count = works.get(&row.ngram).map_or(0, |works| works.len() as u64);
            in_range(count, minimum, maximum)
        });
    }

    /// Annotate every row with its (label, n-gram) occurrence total: the
    /// sum over the label's works of each work's maximum witness count.
    pub fn add_label_count(&mut self) {
        let mut work_max: HashMap<(String, String, String), u64> = HashMap::new();
        for row in &self.rows {
            let entry = work_max
                .entry((row.label.clone(), row.ngram.clone(), row.work.clone()))
                .or_insert(0);
            *entry = (*entry).max(row.count);
        }
        let mut label_counts: HashMap<(String, String), u64> = HashMap::new();
        for ((label, ngram, _), max) in work_max {
            *label_counts.entry((label, ngram)).or_insert(0) += max;
        }
        for row in &mut self.rows {
            row.label_count = label_counts
                .get(&(row.label.clone(), row.ngram.clone()))
                .copied();
        }
        self.has_label_count = true;
    }

    /// Annotate every row with the number of the label's works in which
    /// its n-gram is positively attested.
    pub fn add_label_work_count(&mut self) {
        let mut label_works: HashMap<(String, String), HashSet<String>> = HashMap::new();
        for row in &self.rows {
            if row.count > 0 {
                label_works
                    .entry((row.label.clone(), row.ngram.clone()))
                    .or_default()
                    .insert(row.work.clone());
            }
        }
        for row in &mut self.rows {
            row.label_work_count = Some(
                label_works
                    .get(&(row.label.clone(), row.ngram.clone()))
                    .map_or(0, |works| works.len() as u64),
            );
        }
        self.has_label_work_count = true;
    }

    /// Sort rows for stable presentation: size descending, then n-gram,
    /// count descending, label, work, siglum.
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then_with(|| a.ngram.cmp(&b.ngram))
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.work.cmp(&b.work))
                .then_with(|| a.siglum.cmp(&b.siglum))
        });
    }

    /// Summarise per n-gram: for each label (in the given order) the
    /// works attesting it, each with its count range across witnesses.
    pub fn group_by_ngram(&self, labels: &[String]) -> Vec<NGramGroupRow> {
        let mut sizes: HashMap<&str, u32> = HashMap::new();
        let mut spans: HashMap<(String, String), BTreeMap<String, (u64, u64)>> = HashMap::new();
        for row in &self.rows {
            sizes.insert(row.ngram.as_str(), row.size);
            let span = spans
                .entry((row.ngram.clone(), row.label.clone()))
                .or_default()
                .entry(row.work.clone())
                .or_insert((row.count, row.count));
            span.0 = span.0.min(row.count);
            span.1 = span.1.max(row.count);
        }
        let mut ngrams: Vec<(&str, u32)> = sizes.iter().map(|(n, s)| (*n, *s)).collect();
        ngrams.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        let mut out = Vec::new();
        for (ngram, size) in ngrams {
            for label in labels {
                if let Some(works) = spans.get(&(ngram.to_string(), label.clone())) {
                    let work_counts = works
                        .iter()
                        .map(|(work, (min, max))| {
                            if min == max {
                                format!("{}({})", work, min)
                            } else {
                                format!("{}({}-{})", work, min, max)
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push(NGramGroupRow {
                        ngram: ngram.to_string(),
                        size,
                        label: label.clone(),
                        work_counts,
                    });
                }
            }
        }
        out
    }

    /// Summarise per witness: its attested n-grams (sorted), how many
    /// there are, and their total occurrence count. Zero-count rows do
    /// not contribute.
    pub fn group_by_witness(&self) -> Vec<WitnessGroupRow> {
        let mut grouped: IndexMap<(String, String, String), Vec<(&str, u64)>> = IndexMap::new();
        for row in &self.rows {
            if row.count == 0 {
                continue;
            }
            grouped
                .entry((row.work.clone(), row.siglum.clone(), row.label.clone()))
                .or_default()
                .push((row.ngram.as_str(), row.count));
        }
        grouped
            .into_iter()
            .map(|((work, siglum, label), mut items)| {
                items.sort_by(|a, b| a.0.cmp(b.0));
                WitnessGroupRow {
                    number: items.len() as u64,
                    total_count: items.iter().map(|(_, count)| count).sum(),
                    ngrams: items
                        .iter()
                        .map(|(ngram, _)| *ngram)
                        .collect::<Vec<_>>()
                        .join(", "),
                    work,
                    siglum,
                    label,
                }
            })
            .collect()
    }

    /// Merge a work's witnesses that agree on an n-gram's count into one
    /// row listing their sigla.
    pub fn collapse_witnesses(&self) -> Vec<CollapsedRow> {
        let mut grouped: IndexMap<(String, String, u64, String), (u32, Vec<String>)> =
            IndexMap::new();
        for row in &self.rows {
            grouped
                .entry((
                    row.work.clone(),
                    row.ngram.clone(),
                    row.count,
                    row.label.clone(),
                ))
                .or_insert((row.size, Vec::new()))
                .1
                .push(row.siglum.clone());
        }
        grouped
            .into_iter()
            .map(|((work, ngram, count, label), (size, mut sigla))| {
                sigla.sort();
                CollapsedRow {
                    ngram,
                    size,
                    work,
                    sigla: sigla.join(", "),
                    count,
                    label,
                }
            })
            .collect()
    }

    /// True when these rows have intersection shape: more than one label,
    /// every n-gram attested under all of them.
    fn is_intersect(&self) -> bool {
        let labels: HashSet<&str> = self.rows.iter().map(|row| row.label.as_str()).collect();
        if labels.len() < 2 {
            return false;
        }
        let mut coverage: HashMap<&str, HashSet<&str>> = HashMap::new();
        for row in &self.rows {
            coverage
                .entry(row.ngram.as_str())
                .or_default()
                .insert(row.label.as_str());
        }
        coverage.values().all(|c| c.len() == labels.len())
    }

    fn ngram_tokens(&self, ngram: &str) -> Vec<String> {
        self.tokenizer
            .tokenize(ngram)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Maximum count per (n-gram, work), optionally over one label's rows.
    fn work_max_counts(&self, label: Option<&str>) -> HashMap<(String, String), u64> {
        let mut work_max: HashMap<(String, String), u64> = HashMap::new();
        for row in &self.rows {
            if label.map_or(true, |label| row.label == label) {
                let entry = work_max
                    .entry((row.ngram.clone(), row.work.clone()))
                    .or_insert(0);
                *entry = (*entry).max(row.count);
            }
        }
        work_max
    }

    /// Delete rows whose n-gram carries no more information than a
    /// one-token-longer or one-token-shorter row in the same witness.
    fn prune_non_bifurcated(&mut self) {
        let rows = std::mem::take(&mut self.rows);
        let mut groups: IndexMap<(String, String), Vec<ResultRow>> = IndexMap::new();
        for row in rows {
            groups
                .entry((row.work.clone(), row.siglum.clone()))
                .or_default()
                .push(row);
        }
        for (_, group) in groups {
            let tokens: Vec<Vec<String>> = group
                .iter()
                .map(|row| self.tokenizer.tokenize(&row.ngram))
                .map(|tokens| tokens.into_iter().map(str::to_string).collect())
                .collect();
            'rows: for (i, row) in group.iter().enumerate() {
                let label_count = row.label_count.unwrap_or(0);
                let mut parent_max: Option<u64> = None;
                for (j, other) in group.iter().enumerate() {
                    if other.size == row.size + 1 && occurrences(&tokens[j], &tokens[i]) > 0 {
                        let other_count = other.label_count.unwrap_or(0);
                        parent_max = Some(parent_max.map_or(other_count, |m| m.max(other_count)));
                    }
                }
                if let Some(max) = parent_max {
                    // A longer n-gram occurs just as often; keep that instead.
                    if max == label_count {
                        continue 'rows;
                    }
                }
                if label_count == 1 && row.size >= 2 {
                    let size = row.size as usize;
                    let head = &tokens[i][..size - 1];
                    let tail = &tokens[i][1..];
                    let mut constituent_max: Option<u64> = None;
                    for (j, other) in group.iter().enumerate() {
                        if other.size + 1 == row.size
                            && (tokens[j].as_slice() == head || tokens[j].as_slice() == tail)
                        {
                            let other_count = other.label_count.unwrap_or(0);
                            constituent_max =
                                Some(constituent_max.map_or(other_count, |m| m.max(other_count)));
                        }
                    }
                    if constituent_max == Some(1) {
                        continue 'rows;
                    }
                }
                self.rows.push(row.clone());
            }
        }
    }
}

/// Reduce one witness's rows: process n-grams largest first, and for
/// each one still positively attested subtract its count from every
/// strictly smaller contained n-gram, once per containment position.
/// Rows left with no unexplained occurrences are dropped.
fn reduce_witness_rows(group: Vec<ResultRow>, tokenizer: &Tokenizer) -> Vec<ResultRow> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    let mut template: IndexMap<String, ResultRow> = IndexMap::new();
    for row in group {
        *counts.entry(row.ngram.clone()).or_insert(0) += row.count as i64;
        template.entry(row.ngram.clone()).or_insert(row);
    }
    let mut ordered: Vec<(u32, String)> = template
        .iter()
        .map(|(ngram, row)| (row.size, ngram.clone()))
        .collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    for (size, ngram) in &ordered {
        if *size < 2 {
            continue;
        }
        let count = counts.get(ngram).copied().unwrap_or(0);
        if count <= 0 {
            continue;
        }
        let tokens: Vec<String> = tokenizer
            .tokenize(ngram)
            .into_iter()
            .map(str::to_string)
            .collect();
        for sub_size in 1..tokens.len() {
            for window in tokens.windows(sub_size) {
                let sub = tokenizer.join(window);
                if let Some(sub_count) = counts.get_mut(&sub) {
                    *sub_count -= count;
                }
            }
        }
    }
    let mut out = Vec::new();
    for (_, ngram) in ordered {
        let count = counts.get(&ngram).copied().unwrap_or(0);
        if count > 0 {
            if let Some(mut row) = template.swap_remove(&ngram) {
                row.count = count as u64;
                out.push(row);
            }
        }
    }
    out
}

/// Grow each seed token sequence rightwards by chaining seeds that
/// overlap it by all but one token, keeping only candidates actually
/// present in `tokens`, until no sequence can grow further.
fn extend_sequences(seeds: &[Vec<String>], tokens: &[String]) -> Vec<Vec<String>> {
    let overlap = match seeds.first() {
        Some(seed) => seed.len() - 1,
        None => return Vec::new(),
    };
    let mut prefixes: HashMap<&[String], Vec<&String>> = HashMap::new();
    for seed in seeds {
        if let (Some(last), true) = (seed.last(), seed.len() > overlap) {
            prefixes.entry(&seed[..overlap]).or_default().push(last);
        }
    }
    let mut current: Vec<Vec<String>> = seeds.to_vec();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut maximal = Vec::new();
    while !current.is_empty() {
        let mut next = Vec::new();
        for sequence in current {
            let suffix = &sequence[sequence.len() - overlap..];
            let mut extended = false;
            if let Some(tails) = prefixes.get(suffix) {
                for tail in tails {
                    let mut candidate = sequence.clone();
                    candidate.push((*tail).clone());
                    if seen.contains(&candidate) {
                        continue;
                    }
                    if occurrences(tokens, &candidate) > 0 {
                        seen.insert(candidate.clone());
                        next.push(candidate);
                        extended = true;
                    }
                }
            }
            if !extended {
                maximal.push(sequence);
            }
        }
        current = next;
    }
    maximal
}

/// The minimal distinguishing n-grams of one witness's rows: every
/// smallest-size n-gram, plus each larger one that does not contain an
/// already kept n-gram.
fn generate_filter_ngrams(rows: &[ResultRow], tokenizer: &Tokenizer) -> Vec<Vec<String>> {
    let mut sorted: Vec<&ResultRow> = rows.iter().collect();
    sorted.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.ngram.cmp(&b.ngram)));
    let mut filters: Vec<Vec<String>> = Vec::new();
    for row in sorted {
        let tokens: Vec<String> = tokenizer
            .tokenize(&row.ngram)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !filters
            .iter()
            .any(|filter| occurrences(&tokens, filter) > 0)
        {
            filters.push(tokens);
        }
    }
    filters
}

fn in_range(value: u64, minimum: Option<u64>, maximum: Option<u64>) -> bool {
    minimum.map_or(true, |m| value >= m) && maximum.map_or(true, |m| value <= m)
}

/// Escape a CSV field if it contains a delimiter, quote or line break.
pub fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

pub(crate) fn write_query_header<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{}",
        NGRAM, SIZE, WORK, SIGLUM, COUNT, LABEL
    )?;
    Ok(())
}

pub(crate) fn write_query_row<W: Write>(writer: &mut W, row: &ResultRow) -> Result<()> {
    writeln!(
        writer,
        "{},{},{},{},{},{}",
        csv_field(&row.ngram),
        row.size,
        csv_field(&row.work),
        csv_field(&row.siglum),
        row.count,
        csv_field(&row.label)
    )?;
    Ok(())
}

/// Write the per-n-gram grouped table as CSV.
pub fn write_ngram_groups_csv<W: Write>(rows: &[NGramGroupRow], writer: &mut W) -> Result<()> {
    writeln!(writer, "ngram,size,label,work counts")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{}",
            csv_field(&row.ngram),
            row.size,
            csv_field(&row.label),
            csv_field(&row.work_counts)
        )?;
    }
    Ok(())
}

/// Write the per-witness grouped table as CSV.
pub fn write_witness_groups_csv<W: Write>(rows: &[WitnessGroupRow], writer: &mut W) -> Result<()> {
    writeln!(writer, "work,siglum,label,ngrams,number,total count")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            csv_field(&row.work),
            csv_field(&row.siglum),
            csv_field(&row.label),
            csv_field(&row.ngrams),
            row.number,
            row.total_count
        )?;
    }
    Ok(())
}

/// Write the collapsed-witnesses table as CSV.
pub fn write_collapsed_csv<W: Write>(rows: &[CollapsedRow], writer: &mut W) -> Result<()> {
    writeln!(writer, "ngram,size,work,sigla,count,label")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            csv_field(&row.ngram),
            row.size,
            csv_field(&row.work),
            csv_field(&row.sigla),
            row.count,
            csv_field(&row.label)
        )?;
    }
    Ok(())
}

/// Reads one CSV record at a time, joining lines while a quoted field
/// remains open and skipping blank lines.
struct RecordReader<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> RecordReader<R> {
    fn new(reader: R) -> Self {
        RecordReader {
            reader,
            line: String::new(),
        }
    }

    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        loop {
            let mut record = String::new();
            loop {
                self.line.clear();
                let read = self.reader.read_line(&mut self.line)?;
                if read == 0 {
                    if record.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                record.push_str(&self.line);
                if record.matches('"').count() % 2 == 0 {
                    break;
                }
            }
            let record = record.trim_end_matches(['\n', '\r']);
            if record.is_empty() {
                continue;
            }
            return Ok(Some(split_record(record)));
        }
    }
}

fn split_record(record: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = record.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Maps column names from a CSV header to field positions.
struct ColumnLayout {
    ngram: usize,
    size: usize,
    work: usize,
    siglum: usize,
    count: usize,
    label: usize,
    label_count: Option<usize>,
    label_work_count: Option<usize>,
}

impl ColumnLayout {
    fn from_reader<R: BufRead>(records: &mut RecordReader<R>) -> Result<Self> {
        let header = records.next_record()?.unwrap_or_default();
        let position = |name: &str| header.iter().position(|field| field.trim() == name);
        let mut missing = Vec::new();
        let mut require = |name: &str| match position(name) {
            Some(index) => index,
            None => {
                missing.push(name.to_string());
                0
            }
        };
        let layout = ColumnLayout {
            ngram: require(NGRAM),
            size: require(SIZE),
            work: require(WORK),
            siglum: require(SIGLUM),
            count: require(COUNT),
            label: require(LABEL),
            label_count: position(LABEL_COUNT),
            label_work_count: position(LABEL_WORK_COUNT),
        };
        if missing.is_empty() {
            Ok(layout)
        } else {
            Err(Error::MalformedResults { missing })
        }
    }

    /// Parse one record; `None` for a blank row.
    fn parse_row(&self, record: &[String]) -> Result<Option<ResultRow>> {
        if record.iter().all(|field| field.trim().is_empty()) {
            return Ok(None);
        }
        let field = |index: usize| -> Result<&str> {
            record.get(index).map(String::as_str).ok_or_else(|| {
                Error::MalformedResultsRow(format!(
                    "row has {} field(s), column {} needed",
                    record.len(),
                    index + 1
                ))
            })
        };
        let number = |index: usize| -> Result<u64> {
            let raw = field(index)?;
            raw.trim().parse().map_err(|_| {
                Error::MalformedResultsRow(format!("cannot parse {:?} as a count", raw))
            })
        };
        let optional = |index: Option<usize>| -> Result<Option<u64>> {
            match index {
                Some(index) if !field(index)?.trim().is_empty() => Ok(Some(number(index)?)),
                _ => Ok(None),
            }
        };
        Ok(Some(ResultRow {
            ngram: field(self.ngram)?.to_string(),
            size: number(self.size)? as u32,
            work: field(self.work)?.to_string(),
            siglum: field(self.siglum)?.to_string(),
            count: number(self.count)?,
            label: field(self.label)?.to_string(),
            label_count: optional(self.label_count)?,
            label_work_count: optional(self.label_work_count)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::TokenizerProfile;
    use std::fs;

    fn cbeta() -> Tokenizer {
        Tokenizer::from_profile(TokenizerProfile::Cbeta)
    }

    fn results(rows: Vec<ResultRow>) -> Results {
        Results::new(rows, cbeta())
    }

    #[test]
    fn from_reader_parses_base_and_aux_columns() {
        let data = "ngram,size,work,siglum,count,label,label count\n\
                    ab,2,T1,base,3,A,5\n\
                    \n\
                    cd,2,T2,base,1,B,\n";
        let parsed = Results::from_reader(data.as_bytes(), cbeta()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.rows()[0].label_count, Some(5));
        assert_eq!(parsed.rows()[1].label_count, None);
    }

    #[test]
    fn from_reader_reports_missing_columns() {
        let data = "ngram,size,work,count,label\nab,2,T1,3,A\n";
        match Results::from_reader(data.as_bytes(), cbeta()) {
            Err(Error::MalformedResults { missing }) => {
                assert_eq!(missing, vec!["siglum".to_string()]);
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn from_reader_rejects_bad_numbers() {
        let data = "ngram,size,work,siglum,count,label\nab,two,T1,base,3,A\n";
        assert!(matches!(
            Results::from_reader(data.as_bytes(), cbeta()),
            Err(Error::MalformedResultsRow(_))
        ));
    }

    #[test]
    fn csv_round_trips_quoted_fields() {
        let rows = vec![ResultRow::base("a,b", 2, "T\"1", "base", 1, "A")];
        let mut table = results(rows.clone());
        table.add_label_count();
        let mut data = Vec::new();
        table.csv(&mut data).unwrap();
        let parsed = Results::from_reader(data.as_slice(), cbeta()).unwrap();
        assert_eq!(parsed.rows()[0].ngram, "a,b");
        assert_eq!(parsed.rows()[0].work, "T\"1");
        assert_eq!(parsed.rows()[0].label_count, Some(1));
    }

    #[test]
    fn reduce_drops_counts_explained_by_larger_ngrams() {
        // Witness text "AAAAA": the 5-gram's single occurrence covers all
        // three overlapping "AAA" occurrences and all five "A"s.
        let mut table = results(vec![
            ResultRow::base("AAAAA", 5, "T1", "base", 1, "A"),
            ResultRow::base("AAA", 3, "T1", "base", 3, "A"),
            ResultRow::base("A", 1, "T1", "base", 5, "A"),
        ]);
        table.reduce();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].ngram, "AAAAA");
        assert_eq!(table.rows()[0].count, 1);
    }

    #[test]
    fn reduce_keeps_residual_occurrences() {
        // Witness "ababa": "aba" occurs twice (overlapping), "a" three
        // times. The two "aba"s explain four "a" positions with
        // multiplicity, wiping "a" out; "ab" occurs twice, also wiped.
        let mut table = results(vec![
            ResultRow::base("aba", 3, "T1", "base", 2, "A"),
            ResultRow::base("ab", 2, "T1", "base", 2, "A"),
            ResultRow::base("a", 1, "T1", "base", 3, "A"),
        ]);
        table.reduce();
        let ngrams: Vec<&str> = table.rows().iter().map(|row| row.ngram.as_str()).collect();
        assert_eq!(ngrams, vec!["aba"]);
    }

    #[test]
    fn reduce_handles_witnesses_independently() {
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("a", 1, "T1", "base", 1, "A"),
            ResultRow::base("a", 1, "T2", "base", 4, "B"),
        ]);
        table.reduce();
        assert_eq!(table.len(), 2);
        let t2 = table.rows().iter().find(|row| row.work == "T2").unwrap();
        assert_eq!(t2.count, 4);
    }

    #[test]
    fn reduced_from_reader_streams_witness_groups() {
        let data = "ngram,size,work,siglum,count,label\n\
                    ab,2,T1,base,1,A\n\
                    a,1,T1,base,1,A\n\
                    a,1,T2,base,2,B\n";
        let table = Results::reduced_from_reader(data.as_bytes(), cbeta()).unwrap();
        let ngrams: HashSet<(&str, &str)> = table
            .rows()
            .iter()
            .map(|row| (row.ngram.as_str(), row.work.as_str()))
            .collect();
        assert_eq!(ngrams, HashSet::from([("ab", "T1"), ("a", "T2")]));
    }

    #[test]
    fn extend_discovers_longer_matches() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("T1")).unwrap();
        fs::write(dir.path().join("T1/base.txt"), "abcabc").unwrap();
        let corpus = Corpus::new(dir.path());
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 2, "A"),
            ResultRow::base("bc", 2, "T1", "base", 2, "A"),
        ]);
        table.extend(&corpus).unwrap();
        let abc = table.rows().iter().find(|row| row.ngram == "abc").unwrap();
        assert_eq!(abc.size, 3);
        assert_eq!(abc.count, 2);
        // "bca" only occurs once; it is found via the chain but verified
        // against the text.
        let bca = table.rows().iter().find(|row| row.ngram == "bca").unwrap();
        assert_eq!(bca.count, 1);
    }

    #[test]
    fn extend_of_unigrams_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("T1")).unwrap();
        fs::write(dir.path().join("T1/base.txt"), "ab").unwrap();
        let corpus = Corpus::new(dir.path());
        let mut table = results(vec![ResultRow::base("a", 1, "T1", "base", 1, "A")]);
        table.extend(&corpus).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn bifurcated_extend_keeps_bifurcation_points() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("T1")).unwrap();
        fs::write(dir.path().join("T1/base.txt"), "ababac").unwrap();
        let corpus = Corpus::new(dir.path());
        let mut table = results(vec![ResultRow::base("ab", 2, "T1", "base", 2, "A")]);
        table.bifurcated_extend(&corpus, 3).unwrap();
        let ngrams: HashSet<&str> = table.rows().iter().map(|row| row.ngram.as_str()).collect();
        // "ab" extends to "aba" without losing occurrences, so only the
        // longer forms survive.
        assert_eq!(ngrams, HashSet::from(["aba", "bab"]));
        for row in table.rows() {
            assert!(row.label_count.is_some());
        }
    }

    #[test]
    fn bifurcated_extend_requires_larger_size() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::new(dir.path());
        let mut table = results(vec![ResultRow::base("ab", 2, "T1", "base", 2, "A")]);
        assert!(matches!(
            table.bifurcated_extend(&corpus, 2),
            Err(Error::QueryValidity(_))
        ));
    }

    #[test]
    fn reciprocal_remove_keeps_mutually_attested_ngrams() {
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("ab", 2, "T2", "base", 2, "B"),
            ResultRow::base("cd", 2, "T1", "base", 1, "A"),
            ResultRow::base("ef", 2, "T2", "base", 0, "B"),
            ResultRow::base("ef", 2, "T1", "base", 3, "A"),
        ]);
        table.reciprocal_remove();
        let ngrams: HashSet<&str> = table.rows().iter().map(|row| row.ngram.as_str()).collect();
        assert_eq!(ngrams, HashSet::from(["ab"]));
        // Idempotent.
        let before = table.len();
        table.reciprocal_remove();
        assert_eq!(table.len(), before);
    }

    #[test]
    fn zero_fill_adds_missing_witness_rows() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("T1")).unwrap();
        fs::write(dir.path().join("T1/base.txt"), "ab").unwrap();
        fs::write(dir.path().join("T1/alt.txt"), "cd").unwrap();
        let corpus = Corpus::new(dir.path());
        let mut table = results(vec![ResultRow::base("ab", 2, "T1", "base", 1, "A")]);
        table.zero_fill(&corpus).unwrap();
        assert_eq!(table.len(), 2);
        let alt = table.rows().iter().find(|row| row.siglum == "alt").unwrap();
        assert_eq!(alt.count, 0);
        assert_eq!(alt.label, "A");
    }

    #[test]
    fn relabel_changes_only_mapped_works() {
        let mut catalogue = Catalogue::new();
        catalogue.insert("T1", "X");
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("ab", 2, "T2", "base", 1, "B"),
        ]);
        table.relabel(&catalogue);
        assert_eq!(table.rows()[0].label, "X");
        assert_eq!(table.rows()[1].label, "B");
    }

    #[test]
    fn remove_label_and_excise() {
        let mut table = results(vec![
            ResultRow::base("abc", 3, "T1", "base", 1, "A"),
            ResultRow::base("xbz", 3, "T2", "base", 1, "B"),
            ResultRow::base("xyz", 3, "T2", "base", 1, "B"),
        ]);
        table.remove_label("A");
        assert_eq!(table.len(), 2);
        table.excise("b");
        let ngrams: Vec<&str> = table.rows().iter().map(|row| row.ngram.as_str()).collect();
        assert_eq!(ngrams, vec!["xyz"]);
        table.excise("");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn prune_by_ngram_and_size() {
        let mut table = results(vec![
            ResultRow::base("a", 1, "T1", "base", 1, "A"),
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("abc", 3, "T1", "base", 1, "A"),
        ]);
        table.prune_by_ngram(&["ab".to_string()]);
        assert_eq!(table.len(), 2);
        table.prune_by_ngram_size(Some(2), Some(3));
        let ngrams: Vec<&str> = table.rows().iter().map(|row| row.ngram.as_str()).collect();
        assert_eq!(ngrams, vec!["abc"]);
    }

    #[test]
    fn prune_by_ngram_count_sums_work_maxima() {
        // "ab" total: max(3, 1) for T1 + 2 for T2 = 5.
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 3, "A"),
            ResultRow::base("ab", 2, "T1", "alt", 1, "A"),
            ResultRow::base("ab", 2, "T2", "base", 2, "B"),
            ResultRow::base("cd", 2, "T1", "base", 1, "A"),
        ]);
        let mut high = table.clone();
        high.prune_by_ngram_count(Some(5), None, None);
        let ngrams: HashSet<&str> = high.rows().iter().map(|row| row.ngram.as_str()).collect();
        assert_eq!(ngrams, HashSet::from(["ab"]));
        // With a label filter, only label A rows count: "ab" totals 3.
        table.prune_by_ngram_count(Some(4), None, Some("A"));
        assert!(table.is_empty());
    }

    #[test]
    fn prune_by_ngram_count_per_work() {
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("ab", 2, "T2", "base", 9, "B"),
            ResultRow::base("cd", 2, "T1", "base", 4, "A"),
        ]);
        table.prune_by_ngram_count_per_work(Some(9), None, None);
        let ngrams: HashSet<&str> = table.rows().iter().map(|row| row.ngram.as_str()).collect();
        assert_eq!(ngrams, HashSet::from(["ab"]));
        // Both rows of "ab" survive, not just the matching one.
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn prune_by_work_count_ignores_zero_counts() {
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("ab", 2, "T2", "base", 1, "B"),
            ResultRow::base("cd", 2, "T1", "base", 1, "A"),
            ResultRow::base("cd", 2, "T2", "base", 0, "B"),
        ]);
        table.prune_by_work_count(Some(2), None, None);
        let ngrams: HashSet<&str> = table.rows().iter().map(|row| row.ngram.as_str()).collect();
        assert_eq!(ngrams, HashSet::from(["ab"]));
    }

    #[test]
    fn add_label_count_sums_work_maxima_per_label() {
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 3, "A"),
            ResultRow::base("ab", 2, "T1", "alt", 5, "A"),
            ResultRow::base("ab", 2, "T3", "base", 2, "A"),
            ResultRow::base("ab", 2, "T2", "base", 1, "B"),
        ]);
        table.add_label_count();
        for row in table.rows() {
            match row.label.as_str() {
                "A" => assert_eq!(row.label_count, Some(7)),
                _ => assert_eq!(row.label_count, Some(1)),
            }
        }
    }

    #[test]
    fn add_label_work_count_counts_attesting_works() {
        let mut table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 3, "A"),
            ResultRow::base("ab", 2, "T3", "base", 0, "A"),
            ResultRow::base("ab", 2, "T4", "base", 1, "A"),
        ]);
        table.add_label_work_count();
        for row in table.rows() {
            assert_eq!(row.label_work_count, Some(2));
        }
    }

    #[test]
    fn sort_orders_by_size_then_ngram() {
        let mut table = results(vec![
            ResultRow::base("b", 1, "T1", "base", 1, "A"),
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("aa", 2, "T2", "base", 5, "B"),
            ResultRow::base("aa", 2, "T1", "base", 7, "A"),
        ]);
        table.sort();
        let order: Vec<(&str, u64)> = table
            .rows()
            .iter()
            .map(|row| (row.ngram.as_str(), row.count))
            .collect();
        assert_eq!(order, vec![("aa", 7), ("aa", 5), ("ab", 1), ("b", 1)]);
    }

    #[test]
    fn group_by_ngram_formats_count_ranges() {
        let table = results(vec![
            ResultRow::base("ab", 2, "T1", "base", 1, "A"),
            ResultRow::base("ab", 2, "T1", "alt", 3, "A"),
            ResultRow::base("ab", 2, "T2", "base", 2, "B"),
        ]);
        let labels = vec!["A".to_string(), "B".to_string()];
        let grouped = table.group_by_ngram(&labels);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].label, "A");
        assert_eq!(grouped[0].work_counts, "T1(1-3)");
        assert_eq!(grouped[1].work_counts, "T2(2)");
    }

    #[test]
    fn group_by_witness_summarises_attested_ngrams() {
        let table = results(vec![
            ResultRow::base("cd", 2, "T1", "base", 2, "A"),
            ResultRow::base("ab", 2, "T1", "base", 3, "A"),
            ResultRow::base("ef", 2, "T1", "base", 0, "A"),
        ]);
        let grouped = table.group_by_witness();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].ngrams, "ab, cd");
        assert_eq!(grouped[0].number, 2);
        assert_eq!(grouped[0].total_count, 5);
    }

    #[test]
    fn collapse_witnesses_merges_agreeing_sigla() {
        let table = results(vec![
            ResultRow::base("ab", 2, "T1", "x", 2, "A"),
            ResultRow::base("ab", 2, "T1", "w", 2, "A"),
            ResultRow::base("ab", 2, "T1", "y", 3, "A"),
        ]);
        let collapsed = table.collapse_witnesses();
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].sigla, "w, x");
        assert_eq!(collapsed[1].sigla, "y");
    }
}
