//! Command-line front end for corpus n-gram indexing and querying.
//!
//! Thin layer over the library: each subcommand parses its inputs,
//! invokes one store or results operation, and writes CSV (or JSON for
//! the raw query passthrough) to a file or stdout.

use clap::{Parser, Subcommand, ValueEnum};
use corpus_ngrams::prelude::*;
use corpus_ngrams::results::csv_field;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corpus-ngrams")]
#[command(about = "N-gram indexing and set-algebra queries over multi-witness corpora")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress progress bars and informational output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Tokenizer profile (CLI version, mirrors tokenizer::TokenizerProfile)
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum CliTokenizer {
    /// Single-character tokens, no joiner (logographic scripts)
    #[default]
    Cbeta,
    /// Whitespace-delimited word tokens, space joiner
    Pagel,
}

impl From<CliTokenizer> for TokenizerProfile {
    fn from(tokenizer: CliTokenizer) -> Self {
        match tokenizer {
            CliTokenizer::Cbeta => TokenizerProfile::Cbeta,
            CliTokenizer::Pagel => TokenizerProfile::Pagel,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a corpus's n-grams into the database
    Index {
        /// Path to the n-gram database
        #[arg(long)]
        db: PathBuf,

        /// Path to the corpus directory
        #[arg(long)]
        corpus: PathBuf,

        /// Minimum n-gram size
        #[arg(long)]
        minimum: u32,

        /// Maximum n-gram size
        #[arg(long)]
        maximum: u32,

        /// Restrict indexing to the works in this catalogue, removing
        /// indexed witnesses of other works
        #[arg(long)]
        catalogue: Option<PathBuf>,

        /// Tokenizer profile
        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        /// SQLite page cache budget in gigabytes (0 for the default)
        #[arg(long, default_value = "0")]
        ram: u32,
    },

    /// Per-witness n-gram coverage counts
    Counts {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        catalogue: PathBuf,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        /// Output file (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// N-grams common to every labelled sub-corpus
    Intersect {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        catalogue: PathBuf,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// N-grams unique to a single labelled sub-corpus
    Diff {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        catalogue: PathBuf,

        /// Restrict to n-grams unique to this label versus all others
        #[arg(long)]
        asymmetric: Option<String>,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Per-witness matches for a list of n-grams
    Search {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        catalogue: PathBuf,

        /// File of n-grams to search for, one per line; all indexed
        /// n-grams when omitted
        #[arg(long)]
        ngrams: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Diff over previously saved results files instead of the index
    Sdiff {
        /// Results files, one per label
        #[arg(long, num_args = 2.., required = true)]
        supplied: Vec<PathBuf>,

        /// Labels, one per results file, in the same order
        #[arg(long, num_args = 2.., required = true)]
        labels: Vec<String>,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Intersection over previously saved results files
    Sintersect {
        #[arg(long, num_args = 2.., required = true)]
        supplied: Vec<PathBuf>,

        #[arg(long, num_args = 2.., required = true)]
        labels: Vec<String>,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check that the index is current for every catalogued witness
    Validate {
        #[arg(long)]
        db: PathBuf,

        #[arg(long)]
        corpus: PathBuf,

        #[arg(long)]
        catalogue: PathBuf,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,
    },

    /// Transform a results file
    ///
    /// Transformations apply in a fixed order: extend, reduce,
    /// reciprocal remove, zero fill, n-gram list prune, work count
    /// range, size range, count ranges, remove label, relabel, excise,
    /// label count columns, sort, grouping.
    Report {
        /// Results CSV file
        results: PathBuf,

        /// Corpus directory; required by --extend, --bifurcated-extend
        /// and --zero-fill
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Extend n-grams to their maximal length against the corpus
        #[arg(long)]
        extend: bool,

        /// Bifurcated extension up to the given n-gram size
        #[arg(long, value_name = "SIZE")]
        bifurcated_extend: Option<u32>,

        /// Remove n-gram occurrences contained in larger n-grams
        #[arg(long)]
        reduce: bool,

        /// Keep only n-grams attested under every label
        #[arg(long)]
        reciprocal: bool,

        /// Add count-0 rows for unattested witnesses
        #[arg(long)]
        zero_fill: bool,

        /// File of n-grams to remove, one per line
        #[arg(long)]
        ngrams: Option<PathBuf>,

        /// Keep n-grams attested in at least this many works
        #[arg(long)]
        min_works: Option<u64>,

        /// Keep n-grams attested in at most this many works
        #[arg(long)]
        max_works: Option<u64>,

        /// Keep n-grams of at least this size
        #[arg(long)]
        min_size: Option<u32>,

        /// Keep n-grams of at most this size
        #[arg(long)]
        max_size: Option<u32>,

        /// Keep n-grams occurring at least this often corpus-wide
        #[arg(long)]
        min_count: Option<u64>,

        /// Keep n-grams occurring at most this often corpus-wide
        #[arg(long)]
        max_count: Option<u64>,

        /// Keep n-grams occurring at least this often in some work
        #[arg(long)]
        min_count_work: Option<u64>,

        /// Keep n-grams occurring at most this often in some work
        #[arg(long)]
        max_count_work: Option<u64>,

        /// Restrict count and work-count pruning to one label's rows
        #[arg(long)]
        count_label: Option<String>,

        /// Remove all rows carrying this label
        #[arg(long)]
        remove: Option<String>,

        /// Reassign labels from this catalogue
        #[arg(long)]
        relabel: Option<PathBuf>,

        /// Remove rows whose n-gram contains this string
        #[arg(long)]
        excise: Option<String>,

        /// Add the label count column
        #[arg(long)]
        add_label_count: bool,

        /// Add the label work count column
        #[arg(long)]
        add_label_work_count: bool,

        /// Sort rows for presentation
        #[arg(long)]
        sort: bool,

        /// Group output per n-gram (requires --catalogue for label order)
        #[arg(long, conflicts_with_all = ["group_by_witness", "collapse_witnesses"])]
        group_by_ngram: bool,

        /// Catalogue providing the label order for --group-by-ngram
        #[arg(long)]
        catalogue: Option<PathBuf>,

        /// Group output per witness
        #[arg(long, conflicts_with = "collapse_witnesses")]
        group_by_witness: bool,

        /// Merge witnesses that agree on an n-gram's count
        #[arg(long)]
        collapse_witnesses: bool,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run a raw SQL query against the database
    Query {
        #[arg(long)]
        db: PathBuf,

        /// The SQL to execute
        sql: String,

        /// Positional query parameters
        #[arg(long = "param")]
        params: Vec<String>,

        /// Emit JSON instead of CSV
        #[arg(long)]
        json: bool,

        #[arg(long, value_enum, default_value = "cbeta")]
        tokenizer: CliTokenizer,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("CORPUS_NGRAMS_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn tokenizer_for(profile: CliTokenizer) -> Tokenizer {
    Tokenizer::from_profile(profile.into())
}

fn open_store(db: &Path, tokenizer: Tokenizer, ram: u32) -> Result<DataStore> {
    DataStore::open(
        db,
        tokenizer,
        StoreOptions {
            ram_gb: ram,
            ..StoreOptions::default()
        },
    )
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn io::Write>> {
    match path {
        Some(path) => Ok(Box::new(BufWriter::new(fs::File::create(path)?))),
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// One n-gram per line; blank lines skipped.
fn read_ngram_list(path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(path)?;
    let mut ngrams = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let ngram = line.trim();
        if !ngram.is_empty() {
            ngrams.push(ngram.to_string());
        }
    }
    Ok(ngrams)
}

fn load_supplied(paths: &[PathBuf], tokenizer: &Tokenizer) -> Result<Vec<Results>> {
    paths
        .iter()
        .map(|path| Results::from_csv_path(path, tokenizer.clone()))
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let show_progress = !cli.quiet;

    match cli.command {
        Commands::Index {
            db,
            corpus,
            minimum,
            maximum,
            catalogue,
            tokenizer,
            ram,
        } => {
            let catalogue = catalogue.map(|path| Catalogue::load(&path)).transpose()?;
            let mut store = open_store(&db, tokenizer_for(tokenizer), ram)?;
            store.add_ngrams(
                &Corpus::new(corpus),
                minimum,
                maximum,
                catalogue.as_ref(),
                show_progress,
            )?;
        }

        Commands::Counts {
            db,
            catalogue,
            tokenizer,
            output,
        } => {
            let catalogue = Catalogue::load(&catalogue)?;
            let mut store = open_store(&db, tokenizer_for(tokenizer), 0)?;
            let rows = store.counts(&catalogue)?;
            let mut writer = open_output(output.as_deref())?;
            write_counts_csv(&rows, &mut writer)?;
            writer.flush()?;
        }

        Commands::Intersect {
            db,
            catalogue,
            tokenizer,
            output,
        } => {
            let catalogue = Catalogue::load(&catalogue)?;
            let mut store = open_store(&db, tokenizer_for(tokenizer), 0)?;
            let results = store.intersection(&catalogue)?;
            let mut writer = open_output(output.as_deref())?;
            results.csv(&mut writer)?;
            writer.flush()?;
        }

        Commands::Diff {
            db,
            catalogue,
            asymmetric,
            tokenizer,
            output,
        } => {
            let catalogue = Catalogue::load(&catalogue)?;
            let mut store = open_store(&db, tokenizer_for(tokenizer), 0)?;
            let results = match asymmetric {
                Some(label) => store.diff_asymmetric(&catalogue, &label)?,
                None => store.diff(&catalogue)?,
            };
            let mut writer = open_output(output.as_deref())?;
            results.csv(&mut writer)?;
            writer.flush()?;
        }

        Commands::Search {
            db,
            catalogue,
            ngrams,
            tokenizer,
            output,
        } => {
            let catalogue = Catalogue::load(&catalogue)?;
            let ngrams = match ngrams {
                Some(path) => read_ngram_list(&path)?,
                None => Vec::new(),
            };
            let mut store = open_store(&db, tokenizer_for(tokenizer), 0)?;
            let rows = store.search(&catalogue, &ngrams)?;
            let mut writer = open_output(output.as_deref())?;
            write_search_csv(&rows, &mut writer)?;
            writer.flush()?;
        }

        Commands::Sdiff {
            supplied,
            labels,
            tokenizer,
            output,
        } => {
            let tokenizer = tokenizer_for(tokenizer);
            let supplied = load_supplied(&supplied, &tokenizer)?;
            let mut store = DataStore::open_in_memory(tokenizer, StoreOptions::default())?;
            let results = store.diff_supplied(&supplied, &labels)?;
            let mut writer = open_output(output.as_deref())?;
            results.csv(&mut writer)?;
            writer.flush()?;
        }

        Commands::Sintersect {
            supplied,
            labels,
            tokenizer,
            output,
        } => {
            let tokenizer = tokenizer_for(tokenizer);
            let supplied = load_supplied(&supplied, &tokenizer)?;
            let mut store = DataStore::open_in_memory(tokenizer, StoreOptions::default())?;
            let results = store.intersection_supplied(&supplied, &labels)?;
            let mut writer = open_output(output.as_deref())?;
            results.csv(&mut writer)?;
            writer.flush()?;
        }

        Commands::Validate {
            db,
            corpus,
            catalogue,
            tokenizer,
        } => {
            let catalogue = Catalogue::load(&catalogue)?;
            let store = open_store(&db, tokenizer_for(tokenizer), 0)?;
            if store.validate(&Corpus::new(corpus), &catalogue)? {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }

        Commands::Report {
            results,
            corpus,
            extend,
            bifurcated_extend,
            reduce,
            reciprocal,
            zero_fill,
            ngrams,
            min_works,
            max_works,
            min_size,
            max_size,
            min_count,
            max_count,
            min_count_work,
            max_count_work,
            count_label,
            remove,
            relabel,
            excise,
            add_label_count,
            add_label_work_count,
            sort,
            group_by_ngram,
            catalogue,
            group_by_witness,
            collapse_witnesses,
            tokenizer,
            output,
        } => {
            let tokenizer = tokenizer_for(tokenizer);
            let mut table = Results::from_csv_path(&results, tokenizer)?;
            let corpus = corpus.map(Corpus::new);
            let need_corpus = || -> Result<&Corpus> {
                corpus.as_ref().ok_or_else(|| {
                    Error::QueryValidity(
                        "--corpus is required by --extend, --bifurcated-extend and --zero-fill"
                            .to_string(),
                    )
                })
            };
            if extend {
                table.extend(need_corpus()?)?;
            }
            if let Some(size) = bifurcated_extend {
                table.bifurcated_extend(need_corpus()?, size)?;
            }
            if reduce {
                table.reduce();
            }
            if reciprocal {
                table.reciprocal_remove();
            }
            if zero_fill {
                table.zero_fill(need_corpus()?)?;
            }
            if let Some(path) = ngrams {
                table.prune_by_ngram(&read_ngram_list(&path)?);
            }
            if min_works.is_some() || max_works.is_some() {
                table.prune_by_work_count(min_works, max_works, count_label.as_deref());
            }
            if min_size.is_some() || max_size.is_some() {
                table.prune_by_ngram_size(min_size, max_size);
            }
            if min_count.is_some() || max_count.is_some() {
                table.prune_by_ngram_count(min_count, max_count, count_label.as_deref());
            }
            if min_count_work.is_some() || max_count_work.is_some() {
                table.prune_by_ngram_count_per_work(
                    min_count_work,
                    max_count_work,
                    count_label.as_deref(),
                );
            }
            if let Some(label) = remove {
                table.remove_label(&label);
            }
            if let Some(path) = relabel {
                table.relabel(&Catalogue::load(&path)?);
            }
            if let Some(needle) = excise {
                table.excise(&needle);
            }
            if add_label_count {
                table.add_label_count();
            }
            if add_label_work_count {
                table.add_label_work_count();
            }
            if sort {
                table.sort();
            }
            let mut writer = open_output(output.as_deref())?;
            if group_by_ngram {
                let labels = match catalogue {
                    Some(path) => Catalogue::load(&path)?.labels(),
                    None => {
                        return Err(Error::QueryValidity(
                            "--group-by-ngram requires --catalogue for the label order"
                                .to_string(),
                        ))
                    }
                };
                write_ngram_groups_csv(&table.group_by_ngram(&labels), &mut writer)?;
            } else if group_by_witness {
                write_witness_groups_csv(&table.group_by_witness(), &mut writer)?;
            } else if collapse_witnesses {
                write_collapsed_csv(&table.collapse_witnesses(), &mut writer)?;
            } else {
                table.csv(&mut writer)?;
            }
            writer.flush()?;
        }

        Commands::Query {
            db,
            sql,
            params,
            json,
            tokenizer,
            output,
        } => {
            let store = open_store(&db, tokenizer_for(tokenizer), 0)?;
            let result = store.query(&sql, &params)?;
            let mut writer = open_output(output.as_deref())?;
            if json {
                serde_json::to_writer_pretty(&mut writer, &result)
                    .map_err(|err| Error::Io(err.into()))?;
                writeln!(writer)?;
            } else {
                let header: Vec<_> = result
                    .columns
                    .iter()
                    .map(|column| csv_field(column).into_owned())
                    .collect();
                writeln!(writer, "{}", header.join(","))?;
                for row in &result.rows {
                    let fields: Vec<_> = row
                        .iter()
                        .map(|field| csv_field(field).into_owned())
                        .collect();
                    writeln!(writer, "{}", fields.join(","))?;
                }
            }
            writer.flush()?;
        }
    }

    Ok(())
}
