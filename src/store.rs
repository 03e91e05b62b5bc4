//! SQLite-backed n-gram index store.
//!
//! The store holds one row per witness and one row per (witness, n-gram)
//! occurrence, indexed incrementally with checksum-based change
//! detection, and answers set-algebra queries (intersection, diff,
//! asymmetric diff, counts, search) over labelled sub-corpora. Queries
//! are built dynamically from fragments because the number of labels is
//! only known at run time.
//!
//! The index is a disposable, rebuildable cache rather than a source of
//! truth, so the connection trades crash-durability for throughput:
//! synchronous writes off, exclusive locking, temp tables in memory.

use crate::catalogue::Catalogue;
use crate::corpus::Corpus;
use crate::error::{Error, Result};
use crate::results::{self, ResultRow, Results};
use crate::tokenizer::Tokenizer;
use crate::witness::{ngram_counts, Witness};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};

const CREATE_TABLE_WITNESS: &str = "CREATE TABLE IF NOT EXISTS Witness (
    id INTEGER PRIMARY KEY ASC,
    work TEXT NOT NULL,
    siglum TEXT NOT NULL,
    checksum TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    UNIQUE (work, siglum))";
const CREATE_TABLE_WITNESS_NGRAM: &str = "CREATE TABLE IF NOT EXISTS WitnessNGram (
    witness INTEGER NOT NULL REFERENCES Witness (id),
    ngram TEXT NOT NULL,
    size INTEGER NOT NULL,
    count INTEGER NOT NULL)";
const CREATE_TABLE_WITNESS_HAS_NGRAM: &str = "CREATE TABLE IF NOT EXISTS WitnessHasNGram (
    witness INTEGER NOT NULL REFERENCES Witness (id),
    size INTEGER NOT NULL,
    unique_count INTEGER NOT NULL)";
const CREATE_INDEX_WITNESS_WORK: &str =
    "CREATE INDEX IF NOT EXISTS WitnessIndexWork ON Witness (work)";
const CREATE_INDEX_WITNESS_HAS_NGRAM: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     WitnessHasNGramIndex ON WitnessHasNGram (witness, size)";
const CREATE_INDEX_WITNESS_NGRAM: &str = "CREATE INDEX IF NOT EXISTS \
     WitnessNGramIndex ON WitnessNGram (witness, ngram)";
const DROP_INDEX_WITNESS_NGRAM: &str = "DROP INDEX IF EXISTS WitnessNGramIndex";

const SELECT_WITNESS: &str = "SELECT id, checksum FROM Witness WHERE work = ?1 AND siglum = ?2";
const INSERT_WITNESS: &str = "INSERT INTO Witness (work, siglum, checksum, token_count) \
     VALUES (?1, ?2, ?3, ?4)";
const UPDATE_WITNESS: &str = "UPDATE Witness SET checksum = ?1, token_count = ?2 WHERE id = ?3";
const DELETE_WITNESS_NGRAMS: &str = "DELETE FROM WitnessNGram WHERE witness = ?1";
const DELETE_WITNESS_SIZE_MARKERS: &str = "DELETE FROM WitnessHasNGram WHERE witness = ?1";
const SELECT_SIZE_MARKERS: &str = "SELECT size FROM WitnessHasNGram WHERE witness = ?1";
const INSERT_SIZE_MARKER: &str =
    "INSERT INTO WitnessHasNGram (witness, size, unique_count) VALUES (?1, ?2, ?3)";
const INSERT_NGRAM: &str =
    "INSERT INTO WitnessNGram (witness, ngram, size, count) VALUES (?1, ?2, ?3, ?4)";
// The store itself is label-agnostic: each query loads its catalogue's
// work-to-label map into this per-connection temporary table and joins
// against it, so no label state outlives the query that supplied it.
const CREATE_TABLE_WORK_LABEL: &str =
    "CREATE TEMPORARY TABLE WorkLabel (work TEXT PRIMARY KEY, label TEXT NOT NULL)";
const INSERT_WORK_LABEL: &str = "INSERT INTO temp.WorkLabel (work, label) VALUES (?1, ?2)";
const SELECT_LABEL_TOKEN_TOTALS: &str = "SELECT WorkLabel.label, SUM(Witness.token_count) \
     FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
     GROUP BY WorkLabel.label";

/// Connection tuning. The defaults mirror a bulk-load posture: temp
/// storage in memory and the default page cache.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Keep SQLite temporary storage in memory.
    pub memory_temp_store: bool,
    /// Page cache budget in gigabytes; 0 leaves the SQLite default.
    pub ram_gb: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            memory_temp_store: true,
            ram_gb: 0,
        }
    }
}

/// A label together with the total token count of its sub-corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelExtent {
    pub label: String,
    pub tokens: u64,
}

/// Per-witness, per-size coverage summary returned by [`DataStore::counts`].
#[derive(Debug, Clone, Serialize)]
pub struct CountRow {
    pub work: String,
    pub siglum: String,
    pub size: u32,
    pub unique_ngrams: u64,
    pub total_ngrams: u64,
    pub total_tokens: u64,
    pub label: String,
}

/// Per-witness match summary returned by [`DataStore::search`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchRow {
    pub work: String,
    pub siglum: String,
    pub ngrams: String,
    pub match_count: u64,
    pub ngram_count: u64,
    pub label: String,
}

/// Column names and stringified rows from a passthrough query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub struct DataStore {
    conn: Connection,
    tokenizer: Tokenizer,
}

impl DataStore {
    /// Open (or create) the index database at `path`.
    pub fn open(path: &Path, tokenizer: Tokenizer, options: StoreOptions) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, tokenizer, options)
    }

    /// Open an in-memory store; used by tests and throwaway analyses.
    pub fn open_in_memory(tokenizer: Tokenizer, options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, tokenizer, options)
    }

    fn from_connection(
        conn: Connection,
        tokenizer: Tokenizer,
        options: StoreOptions,
    ) -> Result<Self> {
        if options.memory_temp_store {
            conn.pragma_update(None, "temp_store", "MEMORY")?;
        }
        if options.ram_gb > 0 {
            let cache_size = -(options.ram_gb as i64 * 1_000_000);
            conn.pragma_update(None, "cache_size", cache_size)?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
        conn.pragma_update(None, "synchronous", "OFF")?;
        let store = DataStore { conn, tokenizer };
        store.initialise_schema()?;
        Ok(store)
    }

    /// Creates tables and indices that do not already exist; safe to call
    /// on an existing database.
    fn initialise_schema(&self) -> Result<()> {
        debug!("creating database schema, if necessary");
        self.conn.execute(CREATE_TABLE_WITNESS, [])?;
        self.conn.execute(CREATE_TABLE_WITNESS_NGRAM, [])?;
        self.conn.execute(CREATE_TABLE_WITNESS_HAS_NGRAM, [])?;
        self.conn.execute(CREATE_INDEX_WITNESS_WORK, [])?;
        self.conn.execute(CREATE_INDEX_WITNESS_HAS_NGRAM, [])?;
        Ok(())
    }

    /// Index n-grams of sizes `[minimum, maximum]` for every witness in
    /// scope: all corpus witnesses, or only those of works named in
    /// `catalogue`, in which case witnesses of works absent from the
    /// catalogue are deleted from the index.
    ///
    /// A witness whose checksum no longer matches the stored value has
    /// its existing rows deleted and regenerated; sizes already marked
    /// indexed are skipped. Each witness's insert is its own atomic unit,
    /// so a mid-run failure leaves earlier witnesses valid.
    pub fn add_ngrams(
        &mut self,
        corpus: &Corpus,
        minimum: u32,
        maximum: u32,
        catalogue: Option<&Catalogue>,
        show_progress: bool,
    ) -> Result<()> {
        if minimum < 1 {
            return Err(Error::QueryValidity(
                "minimum n-gram size must be at least 1".to_string(),
            ));
        }
        if minimum > maximum {
            return Err(Error::QueryValidity(format!(
                "minimum n-gram size ({}) is greater than maximum ({})",
                minimum, maximum
            )));
        }
        let witnesses = match catalogue {
            Some(catalogue) => {
                let mut witnesses = Vec::new();
                for work in catalogue.works() {
                    witnesses.extend(corpus.witnesses_of_work(work)?);
                }
                witnesses
            }
            None => corpus.witnesses()?,
        };
        info!(
            count = witnesses.len(),
            minimum, maximum, "indexing witnesses"
        );
        // The lookup index is rebuilt once after the bulk load.
        self.conn.execute(DROP_INDEX_WITNESS_NGRAM, [])?;
        let progress = if show_progress {
            let pb = ProgressBar::new(witnesses.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };
        for witness in &witnesses {
            if let Some(ref pb) = progress {
                pb.set_message(format!("{}/{}", witness.work(), witness.siglum()));
            }
            self.add_witness_ngrams(witness, minimum, maximum)?;
            if let Some(ref pb) = progress {
                pb.inc(1);
            }
        }
        if let Some(pb) = progress {
            pb.finish_with_message("indexed");
        }
        if let Some(catalogue) = catalogue {
            self.delete_witnesses_not_in(catalogue)?;
        }
        info!("adding n-gram lookup index");
        self.conn.execute(CREATE_INDEX_WITNESS_NGRAM, [])?;
        info!("analysing database");
        self.conn.execute("ANALYZE", [])?;
        self.conn.execute("VACUUM", [])?;
        Ok(())
    }

    fn add_witness_ngrams(&mut self, witness: &Witness, minimum: u32, maximum: u32) -> Result<()> {
        let checksum = witness.checksum();
        let tokens = witness.tokens(&self.tokenizer);
        let tokenizer = &self.tokenizer;
        let tx = self.conn.transaction()?;
        let existing: Option<(i64, String)> = tx
            .query_row(SELECT_WITNESS, params![witness.work(), witness.siglum()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let witness_id = match existing {
            None => {
                debug!(work = %witness.work(), siglum = %witness.siglum(), "adding witness record");
                tx.execute(
                    INSERT_WITNESS,
                    params![
                        witness.work(),
                        witness.siglum(),
                        checksum,
                        tokens.len() as i64
                    ],
                )?;
                tx.last_insert_rowid()
            }
            Some((id, stored_checksum)) => {
                if stored_checksum != checksum {
                    info!(
                        work = %witness.work(),
                        siglum = %witness.siglum(),
                        "witness has changed since it was indexed; deleting its n-grams"
                    );
                    tx.execute(UPDATE_WITNESS, params![checksum, tokens.len() as i64, id])?;
                    tx.execute(DELETE_WITNESS_NGRAMS, params![id])?;
                    tx.execute(DELETE_WITNESS_SIZE_MARKERS, params![id])?;
                }
                id
            }
        };
        let indexed_sizes: HashSet<u32> = {
            let mut stmt = tx.prepare(SELECT_SIZE_MARKERS)?;
            let sizes = stmt
                .query_map(params![witness_id], |row| row.get::<_, u32>(0))?
                .collect::<std::result::Result<HashSet<u32>, _>>()?;
            sizes
        };
        for size in minimum..=maximum {
            if indexed_sizes.contains(&size) {
                debug!(
                    work = %witness.work(),
                    siglum = %witness.siglum(),
                    size,
                    "n-grams already indexed"
                );
                continue;
            }
            let counts = ngram_counts(&tokens, tokenizer, size as usize);
            debug!(
                work = %witness.work(),
                siglum = %witness.siglum(),
                size,
                unique = counts.len(),
                "adding n-grams"
            );
            tx.execute(
                INSERT_SIZE_MARKER,
                params![witness_id, size, counts.len() as i64],
            )?;
            let mut stmt = tx.prepare_cached(INSERT_NGRAM)?;
            for (ngram, count) in &counts {
                stmt.execute(params![witness_id, ngram, size, count])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove witnesses (and their n-grams) whose work is not named in
    /// `catalogue`.
    fn delete_witnesses_not_in(&mut self, catalogue: &Catalogue) -> Result<()> {
        let works: Vec<&str> = catalogue.works().collect();
        if works.is_empty() {
            return Ok(());
        }
        let placeholders = placeholders(works.len());
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "DELETE FROM WitnessNGram WHERE witness IN \
                 (SELECT id FROM Witness WHERE work NOT IN ({}))",
                placeholders
            ),
            params_from_iter(works.iter()),
        )?;
        tx.execute(
            &format!(
                "DELETE FROM WitnessHasNGram WHERE witness IN \
                 (SELECT id FROM Witness WHERE work NOT IN ({}))",
                placeholders
            ),
            params_from_iter(works.iter()),
        )?;
        let deleted = tx.execute(
            &format!("DELETE FROM Witness WHERE work NOT IN ({})", placeholders),
            params_from_iter(works.iter()),
        )?;
        if deleted > 0 {
            info!(deleted, "removed witnesses absent from the catalogue");
        }
        tx.commit()?;
        Ok(())
    }

    /// Confirm that every witness of every catalogued work has a
    /// checksum-current record in the store. Mismatches are logged and
    /// reported via the return value; a catalogued work with no corpus
    /// witnesses is a configuration error and fails.
    pub fn validate(&self, corpus: &Corpus, catalogue: &Catalogue) -> Result<bool> {
        let mut is_valid = true;
        for work in catalogue.works() {
            for witness in corpus.witnesses_of_work(work)? {
                let stored: Option<String> = self
                    .conn
                    .query_row(
                        SELECT_WITNESS,
                        params![witness.work(), witness.siglum()],
                        |row| row.get(1),
                    )
                    .optional()?;
                match stored {
                    None => {
                        warn!(
                            work = %witness.work(),
                            siglum = %witness.siglum(),
                            "no record exists for witness in the database"
                        );
                        is_valid = false;
                    }
                    Some(checksum) if checksum != witness.checksum() => {
                        warn!(
                            work = %witness.work(),
                            siglum = %witness.siglum(),
                            "witness has changed since its n-grams were indexed"
                        );
                        is_valid = false;
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(is_valid)
    }

    /// Load the catalogue's work-to-label map into the per-connection
    /// temporary label table the queries join against, and return the
    /// labels ordered by total token count, largest sub-corpus first.
    /// Any previously loaded map is replaced wholesale; taking
    /// `&mut self` on the query methods serialises loading and querying
    /// as one unit.
    fn register_labels(&mut self, catalogue: &Catalogue) -> Result<Vec<LabelExtent>> {
        self.conn
            .execute("DROP TABLE IF EXISTS temp.WorkLabel", [])?;
        self.conn.execute(CREATE_TABLE_WORK_LABEL, [])?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT_WORK_LABEL)?;
            for (work, label) in catalogue.iter() {
                stmt.execute(params![work, label])?;
            }
        }
        tx.commit()?;
        let mut extents: Vec<LabelExtent> = catalogue
            .labels()
            .into_iter()
            .map(|label| LabelExtent { label, tokens: 0 })
            .collect();
        let mut stmt = self.conn.prepare(SELECT_LABEL_TOKEN_TOTALS)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let label: String = row.get(0)?;
            let tokens: u64 = row.get(1)?;
            if let Some(extent) = extents.iter_mut().find(|extent| extent.label == label) {
                extent.tokens = tokens;
            }
        }
        Ok(order_labels_by_extent(extents))
    }

    fn require_multiple_labels(extents: &[LabelExtent]) -> Result<()> {
        if extents.len() < 2 {
            return Err(Error::QueryValidity(format!(
                "set-algebra queries need at least 2 labels; catalogue has {}",
                extents.len()
            )));
        }
        Ok(())
    }

    /// N-grams common to every label in `catalogue`, one row per
    /// contributing witness.
    pub fn intersection(&mut self, catalogue: &Catalogue) -> Result<Results> {
        let extents = self.register_labels(catalogue)?;
        Self::require_multiple_labels(&extents)?;
        let labels: Vec<&str> = extents.iter().map(|extent| extent.label.as_str()).collect();
        let (sql, parameters) = intersection_query(&labels);
        info!(labels = labels.len(), "running intersection query");
        debug!(%sql, "intersection query");
        let rows = self.collect_result_rows(&sql, &parameters)?;
        Ok(Results::new(rows, self.tokenizer.clone()))
    }

    /// N-grams occurring under exactly one label, restricted to that
    /// label's witnesses. Raw output is dominated by filler matches, so
    /// it is spilled to a temporary file and reduced before returning.
    pub fn diff(&mut self, catalogue: &Catalogue) -> Result<Results> {
        let extents = self.register_labels(catalogue)?;
        Self::require_multiple_labels(&extents)?;
        let labels: Vec<&str> = extents.iter().map(|extent| extent.label.as_str()).collect();
        let (sql, parameters) = diff_query(&labels);
        info!(labels = labels.len(), "running diff query");
        debug!(%sql, "diff query");
        self.reduced_results(&sql, &parameters)
    }

    /// N-grams unique to `prime_label` versus the union of all other
    /// labels, reduced like [`DataStore::diff`].
    pub fn diff_asymmetric(&mut self, catalogue: &Catalogue, prime_label: &str) -> Result<Results> {
        let extents = self.register_labels(catalogue)?;
        Self::require_multiple_labels(&extents)?;
        if !extents.iter().any(|extent| extent.label == prime_label) {
            return Err(Error::QueryValidity(format!(
                "prime label {} is not present in the catalogue",
                prime_label
            )));
        }
        let others: Vec<&str> = extents
            .iter()
            .map(|extent| extent.label.as_str())
            .filter(|label| *label != prime_label)
            .collect();
        let (sql, parameters) = diff_asymmetric_query(prime_label, &others);
        info!(prime_label, "running asymmetric diff query");
        debug!(%sql, "asymmetric diff query");
        self.reduced_results(&sql, &parameters)
    }

    /// Per witness per size: unique n-gram count, total possible n-gram
    /// count and total token count.
    pub fn counts(&mut self, catalogue: &Catalogue) -> Result<Vec<CountRow>> {
        let extents = self.register_labels(catalogue)?;
        let labels: Vec<&str> = extents.iter().map(|extent| extent.label.as_str()).collect();
        let sql = format!(
            "SELECT Witness.work, Witness.siglum, WitnessNGram.size, \
             COUNT(WitnessNGram.ngram), Witness.token_count + 1 - WitnessNGram.size, \
             Witness.token_count, WorkLabel.label \
             FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
             CROSS JOIN WitnessNGram \
             WHERE Witness.id = WitnessNGram.witness AND WorkLabel.label IN ({}) \
             GROUP BY WitnessNGram.witness, WitnessNGram.size \
             ORDER BY Witness.work, Witness.siglum, WitnessNGram.size",
            placeholders(labels.len())
        );
        info!("running counts query");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(labels.iter()), |row| {
                Ok(CountRow {
                    work: row.get(0)?,
                    siglum: row.get(1)?,
                    size: row.get(2)?,
                    unique_ngrams: row.get(3)?,
                    total_ngrams: row.get(4)?,
                    total_tokens: row.get(5)?,
                    label: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Per witness: the matched n-grams from `ngrams` (all indexed
    /// n-grams when empty), the sum of their counts, and the number of
    /// distinct matches.
    pub fn search(&mut self, catalogue: &Catalogue, ngrams: &[String]) -> Result<Vec<SearchRow>> {
        let extents = self.register_labels(catalogue)?;
        let labels: Vec<&str> = extents.iter().map(|extent| extent.label.as_str()).collect();
        let mut sql = format!(
            "SELECT Witness.work, Witness.siglum, \
             GROUP_CONCAT(WitnessNGram.ngram, ', '), SUM(WitnessNGram.count), \
             COUNT(WitnessNGram.ngram), WorkLabel.label \
             FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
             CROSS JOIN WitnessNGram \
             WHERE Witness.id = WitnessNGram.witness AND WorkLabel.label IN ({})",
            placeholders(labels.len())
        );
        if !ngrams.is_empty() {
            self.add_temporary_ngrams(ngrams)?;
            sql.push_str(" AND WitnessNGram.ngram IN (SELECT ngram FROM temp.InputNGram)");
        }
        sql.push_str(
            " GROUP BY WitnessNGram.witness ORDER BY Witness.work, Witness.siglum",
        );
        info!(ngrams = ngrams.len(), "running search query");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(labels.iter()), |row| {
                Ok(SearchRow {
                    work: row.get(0)?,
                    siglum: row.get(1)?,
                    ngrams: row.get(2)?,
                    match_count: row.get(3)?,
                    ngram_count: row.get(4)?,
                    label: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Diff semantics over externally supplied result tables, one label
    /// per table, composed without touching the persisted index.
    pub fn diff_supplied(&mut self, supplied: &[Results], labels: &[String]) -> Result<Results> {
        self.add_supplied_results(supplied, labels)?;
        let sql = "SELECT ngram, size, work, siglum, count, label FROM temp.InputResults \
             WHERE ngram IN (SELECT ngram FROM temp.InputResults \
             GROUP BY ngram HAVING COUNT(DISTINCT label) = 1) \
             ORDER BY work, siglum";
        info!("running diff query over supplied results");
        self.reduced_results(sql, &[])
    }

    /// Intersection semantics over externally supplied result tables.
    pub fn intersection_supplied(
        &mut self,
        supplied: &[Results],
        labels: &[String],
    ) -> Result<Results> {
        self.add_supplied_results(supplied, labels)?;
        let distinct: HashSet<&String> = labels.iter().collect();
        let sql = format!(
            "SELECT ngram, size, work, siglum, count, label FROM temp.InputResults \
             WHERE ngram IN (SELECT ngram FROM temp.InputResults \
             GROUP BY ngram HAVING COUNT(DISTINCT label) = {}) \
             ORDER BY work, siglum",
            distinct.len()
        );
        info!("running intersection query over supplied results");
        let rows = self.collect_result_rows(&sql, &[])?;
        Ok(Results::new(rows, self.tokenizer.clone()))
    }

    /// Execute an arbitrary read query, returning its column names and
    /// stringified rows; for ad hoc diagnostics only.
    pub fn query(&self, sql: &str, parameters: &[String]) -> Result<QueryOutput> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let column_count = columns.len();
        let mut rows = Vec::new();
        let mut raw = stmt.query(params_from_iter(parameters.iter()))?;
        while let Some(row) = raw.next()? {
            let mut fields = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = match row.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => String::new(),
                    rusqlite::types::ValueRef::Integer(n) => n.to_string(),
                    rusqlite::types::ValueRef::Real(n) => n.to_string(),
                    rusqlite::types::ValueRef::Text(text) => {
                        String::from_utf8_lossy(text).into_owned()
                    }
                    rusqlite::types::ValueRef::Blob(blob) => {
                        blob.iter().map(|b| format!("{:02x}", b)).collect()
                    }
                };
                fields.push(value);
            }
            rows.push(fields);
        }
        Ok(QueryOutput { columns, rows })
    }

    fn add_temporary_ngrams(&self, ngrams: &[String]) -> Result<()> {
        self.conn
            .execute("DROP TABLE IF EXISTS temp.InputNGram", [])?;
        self.conn
            .execute("CREATE TEMPORARY TABLE InputNGram (ngram TEXT)", [])?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO temp.InputNGram (ngram) VALUES (?1)")?;
        for ngram in ngrams {
            stmt.execute(params![ngram])?;
        }
        Ok(())
    }

    /// Load supplied result tables into a transient store-side table,
    /// overriding each table's labels with the caller-supplied one.
    fn add_supplied_results(&mut self, supplied: &[Results], labels: &[String]) -> Result<()> {
        if supplied.len() != labels.len() {
            return Err(Error::QueryValidity(format!(
                "{} supplied results sets but {} labels; each set needs exactly one label",
                supplied.len(),
                labels.len()
            )));
        }
        if supplied.len() < 2 {
            return Err(Error::QueryValidity(
                "set-algebra queries over supplied results need at least 2 results sets"
                    .to_string(),
            ));
        }
        self.conn
            .execute("DROP TABLE IF EXISTS temp.InputResults", [])?;
        self.conn.execute(
            "CREATE TEMPORARY TABLE InputResults (\
             ngram TEXT, size INTEGER, work TEXT, siglum TEXT, count INTEGER, label TEXT)",
            [],
        )?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO temp.InputResults (ngram, size, work, siglum, count, label) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (results, label) in supplied.iter().zip(labels) {
                for row in results.rows() {
                    stmt.execute(params![
                        row.ngram,
                        row.size,
                        row.work,
                        row.siglum,
                        row.count,
                        label
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn collect_result_rows(&self, sql: &str, parameters: &[String]) -> Result<Vec<ResultRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(parameters.iter()), |row| {
                Ok(ResultRow {
                    ngram: row.get(0)?,
                    size: row.get(1)?,
                    work: row.get(2)?,
                    siglum: row.get(3)?,
                    count: row.get(4)?,
                    label: row.get(5)?,
                    label_count: None,
                    label_work_count: None,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Stream a diff-family query's raw rows to a temporary CSV file and
    /// reduce them witness-group-at-a-time on the way back, so the raw
    /// and reduced tables are never both held in memory. The query must
    /// order its rows by work and siglum; the temporary file is removed
    /// on all paths, including errors.
    fn reduced_results(&self, sql: &str, parameters: &[String]) -> Result<Results> {
        let mut spill = tempfile::tempfile()?;
        {
            let mut writer = BufWriter::new(&mut spill);
            results::write_query_header(&mut writer)?;
            let mut stmt = self.conn.prepare(sql)?;
            let mut raw = stmt.query(params_from_iter(parameters.iter()))?;
            while let Some(row) = raw.next()? {
                let result_row = ResultRow {
                    ngram: row.get(0)?,
                    size: row.get(1)?,
                    work: row.get(2)?,
                    siglum: row.get(3)?,
                    count: row.get(4)?,
                    label: row.get(5)?,
                    label_count: None,
                    label_work_count: None,
                };
                results::write_query_row(&mut writer, &result_row)?;
            }
            writer.flush()?;
        }
        spill.seek(SeekFrom::Start(0))?;
        Results::reduced_from_reader(std::io::BufReader::new(spill), self.tokenizer.clone())
    }
}

/// A string of `count` comma-separated placeholders.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// Order labels largest sub-corpus first, so the nested-most
/// intersection sub-query runs against the smallest corpus. Ties break
/// by label for determinism.
pub fn order_labels_by_extent(mut extents: Vec<LabelExtent>) -> Vec<LabelExtent> {
    extents.sort_by(|a, b| b.tokens.cmp(&a.tokens).then_with(|| a.label.cmp(&b.label)));
    extents
}

/// Build the intersection query for `labels`, ordered largest
/// sub-corpus first. The containment chain nests one existence check
/// per label, with the smallest corpus innermost so later, wider checks
/// only run against candidates that survived the narrowest one.
fn intersection_query(labels: &[&str]) -> (String, Vec<String>) {
    let sql = format!(
        "SELECT WitnessNGram.ngram, WitnessNGram.size, Witness.work, Witness.siglum, \
         WitnessNGram.count, WorkLabel.label \
         FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
         CROSS JOIN WitnessNGram \
         WHERE WorkLabel.label IN ({}) AND Witness.id = WitnessNGram.witness \
         AND WitnessNGram.ngram IN ({}) \
         ORDER BY Witness.work, Witness.siglum",
        placeholders(labels.len()),
        intersection_subquery(labels)
    );
    let mut parameters: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
    parameters.extend(labels.iter().map(|s| s.to_string()));
    (sql, parameters)
}

fn intersection_subquery(labels: &[&str]) -> String {
    let mut sql = String::from(
        "SELECT DISTINCT WitnessNGram.ngram \
         FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
         CROSS JOIN WitnessNGram \
         WHERE WorkLabel.label = ? AND Witness.id = WitnessNGram.witness",
    );
    if labels.len() > 1 {
        sql.push_str(" AND WitnessNGram.ngram IN (");
        sql.push_str(&intersection_subquery(&labels[1..]));
        sql.push(')');
    }
    sql
}

/// Build the diff query: n-grams whose distinct-label count across all
/// participating labels is exactly one, restricted to witnesses of that
/// label.
fn diff_query(labels: &[&str]) -> (String, Vec<String>) {
    let label_placeholders = placeholders(labels.len());
    let sql = format!(
        "SELECT WitnessNGram.ngram, WitnessNGram.size, Witness.work, Witness.siglum, \
         WitnessNGram.count, WorkLabel.label \
         FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
         CROSS JOIN WitnessNGram \
         WHERE WorkLabel.label IN ({}) AND Witness.id = WitnessNGram.witness \
         AND WitnessNGram.ngram IN (\
         SELECT WitnessNGram.ngram \
         FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
         CROSS JOIN WitnessNGram \
         WHERE Witness.id = WitnessNGram.witness AND WorkLabel.label IN ({}) \
         GROUP BY WitnessNGram.ngram HAVING COUNT(DISTINCT WorkLabel.label) = 1) \
         ORDER BY Witness.work, Witness.siglum",
        label_placeholders, label_placeholders
    );
    let mut parameters: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
    parameters.extend(labels.iter().map(|s| s.to_string()));
    (sql, parameters)
}

/// Build the asymmetric diff query: n-grams of `prime_label`'s
/// witnesses minus every n-gram attested under any other label.
fn diff_asymmetric_query(prime_label: &str, others: &[&str]) -> (String, Vec<String>) {
    let sql = format!(
        "SELECT WitnessNGram.ngram, WitnessNGram.size, Witness.work, Witness.siglum, \
         WitnessNGram.count, WorkLabel.label \
         FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
         CROSS JOIN WitnessNGram \
         WHERE WorkLabel.label = ? AND Witness.id = WitnessNGram.witness \
         AND WitnessNGram.ngram IN (\
         SELECT WitnessNGram.ngram \
         FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
         CROSS JOIN WitnessNGram \
         WHERE Witness.id = WitnessNGram.witness AND WorkLabel.label = ? \
         EXCEPT \
         SELECT WitnessNGram.ngram \
         FROM Witness JOIN temp.WorkLabel ON Witness.work = WorkLabel.work \
         CROSS JOIN WitnessNGram \
         WHERE Witness.id = WitnessNGram.witness AND WorkLabel.label IN ({})) \
         ORDER BY Witness.work, Witness.siglum",
        placeholders(others.len())
    );
    let mut parameters = vec![prime_label.to_string(), prime_label.to_string()];
    parameters.extend(others.iter().map(|s| s.to_string()));
    (sql, parameters)
}

/// Write [`CountRow`]s in the counts CSV format.
pub fn write_counts_csv<W: Write>(rows: &[CountRow], writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "work,siglum,size,unique ngrams,total ngrams,total tokens,label"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{},{}",
            results::csv_field(&row.work),
            results::csv_field(&row.siglum),
            row.size,
            row.unique_ngrams,
            row.total_ngrams,
            row.total_tokens,
            results::csv_field(&row.label)
        )?;
    }
    Ok(())
}

/// Write [`SearchRow`]s in the search CSV format.
pub fn write_search_csv<W: Write>(rows: &[SearchRow], writer: &mut W) -> Result<()> {
    writeln!(writer, "work,siglum,ngrams,match count,ngram count,label")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            results::csv_field(&row.work),
            results::csv_field(&row.siglum),
            results::csv_field(&row.ngrams),
            row.match_count,
            row.ngram_count,
            results::csv_field(&row.label)
        )?;
    }
    Ok(())
}
