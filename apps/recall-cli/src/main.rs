mod corpus;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use recall_core::config::{expand_path, RecallConfig};
use recall_embed::HashEmbedder;
use recall_hybrid::{DefaultSearchService, SearchResponse};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recall", about = "Hybrid BM25 + vector search over a JSONL chunk corpus")]
struct Cli {
    /// Config file; defaults to recall.toml / recall.<env>.toml in the working directory
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one query and print ranked, attributed results
    Search {
        #[command(flatten)]
        corpus: CorpusArgs,
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long)]
        no_cache: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Prompt for queries until EOF; `:stats` prints cache counters
    Interactive {
        #[command(flatten)]
        corpus: CorpusArgs,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Print corpus and configuration statistics
    Stats {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

#[derive(Args)]
struct CorpusArgs {
    /// JSONL file with one chunk per line
    #[arg(long)]
    corpus: String,
    #[arg(long)]
    quiet: bool,
}

fn load_config(path: Option<&str>) -> Result<RecallConfig> {
    let config = match path {
        Some(p) => RecallConfig::load_from(&expand_path(p)),
        None => RecallConfig::load(),
    };
    config.context("loading configuration")
}

async fn open(config: RecallConfig, args: &CorpusArgs) -> Result<DefaultSearchService> {
    let embedder = HashEmbedder::new(config.vector.dim)?;
    let path: PathBuf = expand_path(&args.corpus);
    let chunks = corpus::load(&path, &embedder, !args.quiet)?;
    let service = DefaultSearchService::from_config(config, Arc::new(embedder))?;
    let generation = service.rebuild(chunks).await?;
    info!(generation, chunks = service.chunk_count(), "corpus indexed");
    Ok(service)
}

fn print_response(service: &DefaultSearchService, query: &str, response: &SearchResponse) {
    println!(
        "\n🔍 {} results for \"{}\"  (cache: {}, {:.1} ms, generation {})",
        response.results.len(),
        query,
        response.hit.as_str(),
        response.latency.as_secs_f64() * 1000.0,
        response.generation
    );
    for hit in service.attribute(query, &response.results) {
        let text: String = hit.chunk.text.chars().take(160).collect();
        println!("\n  {}. score={:.4}  id={}  source={}", hit.rank + 1, hit.score, hit.chunk.id, hit.chunk.source);
        if !hit.matched_terms.is_empty() {
            println!("     matched: {}", hit.matched_terms.join(", "));
        }
        println!("     {text}");
    }
}

fn response_json(service: &DefaultSearchService, query: &str, response: &SearchResponse) -> serde_json::Value {
    let results: Vec<serde_json::Value> = response
        .results
        .iter()
        .map(|r| {
            let hit = service.attribute(query, std::slice::from_ref(r)).pop();
            serde_json::json!({
                "result": r,
                "source": hit.as_ref().map(|h| h.chunk.source.as_str()),
                "text": hit.as_ref().map(|h| h.chunk.text.as_str()),
                "matched_terms": hit.as_ref().map(|h| h.matched_terms.as_slice()),
            })
        })
        .collect();
    serde_json::json!({
        "hit": response.hit,
        "generation": response.generation,
        "latency_ms": response.latency.as_secs_f64() * 1000.0,
        "results": results,
    })
}

async fn interactive(service: DefaultSearchService, k: usize) -> Result<()> {
    let cancel = CancellationToken::new();
    let cache = Arc::clone(service.cache());
    let sweeper = cache.spawn_sweeper(cancel.clone());
    println!("Type a query (`:stats` for cache counters, Ctrl-D to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        match query {
            "" => continue,
            ":stats" => {
                let s = service.cache_stats();
                println!(
                    "entries={}/{} exact={} semantic={} misses={} hit_rate={:.2} ttl_evicted={} lru_evicted={}",
                    s.entries, s.capacity, s.exact_hits, s.semantic_hits, s.misses, s.hit_rate(), s.ttl_evictions, s.lru_evictions
                );
            }
            ":quit" | ":q" => break,
            _ => match service.search(query, k, true).await {
                Ok(response) => print_response(&service, query, &response),
                Err(e) => eprintln!("❌ {e}"),
            },
        }
    }
    cancel.cancel();
    sweeper.await.context("cache sweeper")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Search { corpus, query, k, no_cache, json } => {
            let k = k.unwrap_or(config.search.default_k);
            let service = open(config, &corpus).await?;
            let response = service.search(&query, k, !no_cache).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response_json(&service, &query, &response))?);
            } else {
                print_response(&service, &query, &response);
            }
        }
        Command::Interactive { corpus, k } => {
            let k = k.unwrap_or(config.search.default_k);
            let service = open(config, &corpus).await?;
            interactive(service, k).await?;
        }
        Command::Stats { corpus } => {
            let printed = config.clone();
            let service = open(config, &corpus).await?;
            println!("📊 chunks: {}", service.chunk_count());
            println!("   generation: {}", service.generation().unwrap_or(0));
            println!("   lexical: backend={:?}", printed.lexical.backend);
            println!("   vector: dim={} backend={:?}", printed.vector.dim, printed.vector.backend);
            println!("   fusion: lexical={} vector={}", printed.fusion.lexical_weight, printed.fusion.vector_weight);
            let s = service.cache_stats();
            println!(
                "   cache: capacity={} ttl={}s threshold={} entries={}",
                s.capacity, printed.cache.ttl_secs, printed.cache.similarity_threshold, s.entries
            );
        }
    }
    Ok(())
}
