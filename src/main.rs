//! graframe CLI: concept matching and SPARQL query building.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use graframe::config::GraframeConfig;
use graframe::exec::SparqlStore;
use graframe::lexicon::{ConceptKind, Lexicon};
use graframe::matcher::{ConceptMatcher, MatchOptions};
use graframe::session::{DEFAULT_SESSION, SessionStore, load_plan};

/// Score floor for abbreviation expansion, looser than plain matching.
const EXPAND_MIN_SCORE: f64 = 0.25;

#[derive(Parser)]
#[command(name = "graframe", version, about = "Build SPARQL queries over building ontologies")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank ontology concepts for free-text queries.
    Match {
        /// One or more queries, matched in parallel.
        #[arg(required = true)]
        queries: Vec<String>,

        /// Lexicon JSON (overrides the config).
        #[arg(long)]
        lexicon: Option<PathBuf>,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        min_score: Option<f64>,

        /// Restrict to a concept kind: class, predicate or other. Repeatable.
        #[arg(long = "kind")]
        kinds: Vec<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Expand an abbreviation to candidate class names.
    Expand {
        abbreviation: String,

        #[arg(long)]
        lexicon: Option<PathBuf>,

        #[arg(long, default_value = "5")]
        top_k: usize,
    },

    /// Apply a plan file and print the compiled query.
    Compile {
        /// JSON plan: an array of builder operations.
        #[arg(long)]
        plan: PathBuf,

        /// Session to print.
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,

        /// Print the structural snapshot instead of SPARQL.
        #[arg(long)]
        snapshot: bool,
    },

    /// Apply a plan file and run the query against a local RDF file.
    Run {
        #[arg(long)]
        plan: PathBuf,

        /// RDF data (.ttl, .nt, .nq, .trig, .rdf).
        #[arg(long)]
        data: PathBuf,

        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
    },
}

fn load_matcher(cli_lexicon: Option<PathBuf>, config: &GraframeConfig) -> Result<ConceptMatcher> {
    let Some(path) = cli_lexicon.or_else(|| config.lexicon.clone()) else {
        miette::bail!("no lexicon given: pass --lexicon or set `lexicon` in the config");
    };
    let lexicon = Lexicon::load(&path)?;
    Ok(ConceptMatcher::new(&lexicon))
}

fn apply_plan(
    plan: &Path,
    session: &str,
    config: &GraframeConfig,
) -> Result<graframe::query::Query> {
    let steps = load_plan(plan)?;
    let store = SessionStore::new(config.query.clone());
    store.run_plan(&steps)?;
    Ok(store.get(session)?)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GraframeConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Match {
            queries,
            lexicon,
            top_k,
            min_score,
            kinds,
            json,
        } => {
            let matcher = load_matcher(lexicon, &config)?;
            let mut options = config.match_options();
            if let Some(k) = top_k {
                options = options.top_k(k);
            }
            if let Some(s) = min_score {
                options = options.min_score(s);
            }
            if !kinds.is_empty() {
                options = options.kinds(kinds.iter().map(|k| ConceptKind::from(k.as_str())));
            }

            let results = matcher.match_batch(&queries, &options);
            if json {
                let out: Vec<_> = queries
                    .iter()
                    .zip(&results)
                    .map(|(q, r)| serde_json::json!({ "query": q, "matches": r }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
            } else {
                for (query, matches) in queries.iter().zip(&results) {
                    println!("{query}:");
                    if matches.is_empty() {
                        println!("  (no matches)");
                    }
                    for m in matches {
                        println!(
                            "  {:.3}  {:<16} {} [{}] via \"{}\"",
                            m.score,
                            m.reason.to_string(),
                            m.uri,
                            m.kind,
                            m.matched_surface
                        );
                    }
                }
            }
        }

        Commands::Expand {
            abbreviation,
            lexicon,
            top_k,
        } => {
            let matcher = load_matcher(lexicon, &config)?;
            let options = MatchOptions::default()
                .kinds([ConceptKind::Class])
                .top_k(top_k)
                .min_score(EXPAND_MIN_SCORE);
            let matches = matcher.match_concepts(&abbreviation, &options);
            if let Some(best) = matches.first() {
                tracing::info!(abbreviation = %abbreviation, best = %best.label, "closest match");
            }
            let mut seen: Vec<&str> = Vec::new();
            for m in &matches {
                if !seen.contains(&m.label.as_str()) {
                    seen.push(&m.label);
                    println!("{}", m.local_name());
                }
            }
        }

        Commands::Compile {
            plan,
            session,
            snapshot,
        } => {
            let query = apply_plan(&plan, &session, &config)?;
            if snapshot {
                let json = serde_json::to_string_pretty(&query.to_dict()).into_diagnostic()?;
                println!("{json}");
            } else {
                println!("{}", query.to_sparql_with(&config.compile_options()));
            }
        }

        Commands::Run {
            plan,
            data,
            session,
        } => {
            let query = apply_plan(&plan, &session, &config)?;
            let store = SparqlStore::in_memory()?;
            store.load_file(&data)?;

            let sparql = query.to_sparql_with(&config.compile_options());
            tracing::debug!(%sparql, "running query");
            let rows = store.query_select(&sparql)?;
            for row in &rows {
                let cells: Vec<String> =
                    row.iter().map(|(var, term)| format!("{var}={term}")).collect();
                println!("{}", cells.join("\t"));
            }
            println!("{} row(s)", rows.len());
        }
    }

    Ok(())
}
