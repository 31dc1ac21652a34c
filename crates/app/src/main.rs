use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::config::{parse_embedding_backend, parse_ocr_engine};
use pdf_rag_core::{
    load_documents, ConversationTurn, PipelineConfig, RagPipeline, Role, VectorStoreConfig,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Ollama base URL (overrides RAG_OLLAMA_URL)
    #[arg(long)]
    ollama_url: Option<String>,

    /// Embedding model served by Ollama
    #[arg(long)]
    embedding_model: Option<String>,

    /// Embedding backend: ollama, or trigram for offline runs
    #[arg(long)]
    embedding_backend: Option<String>,

    /// Generation model served by Ollama
    #[arg(long)]
    generation_model: Option<String>,

    /// Store vectors in Qdrant instead of memory
    #[arg(long)]
    qdrant_url: Option<String>,

    /// OCR fallback: tesseract, vision or disabled
    #[arg(long)]
    ocr: Option<String>,

    /// PDFs to ingest before running the command, as `topic=path`.
    /// The path may be a single PDF or a folder searched recursively.
    #[arg(long = "source", env = "RAG_SOURCES", value_delimiter = ',', value_parser = parse_source)]
    sources: Vec<Source>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question and print the answer.
    Ask {
        question: String,
        /// Restrict retrieval to one topic.
        #[arg(long)]
        topic: Option<String>,
    },
    /// Print every topic with its chunk count.
    Topics,
    /// Interactive question loop on stdin.
    Chat,
}

#[derive(Debug, Clone)]
struct Source {
    topic: String,
    path: PathBuf,
}

fn parse_source(value: &str) -> Result<Source, String> {
    let (topic, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected topic=path, got {value:?}"))?;
    if topic.trim().is_empty() || path.trim().is_empty() {
        return Err(format!("expected topic=path, got {value:?}"));
    }
    Ok(Source {
        topic: topic.trim().to_string(),
        path: PathBuf::from(path.trim()),
    })
}

fn build_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;

    if let Some(url) = &cli.ollama_url {
        config.ollama.base_url = url.clone();
    }
    if let Some(model) = &cli.embedding_model {
        config.ollama.embedding_model = model.clone();
    }
    if let Some(backend) = &cli.embedding_backend {
        config.embedding_backend = parse_embedding_backend(backend)?;
    }
    if let Some(model) = &cli.generation_model {
        config.ollama.generation_model = model.clone();
    }
    if let Some(url) = &cli.qdrant_url {
        config.vector_store = VectorStoreConfig::Qdrant { url: url.clone() };
    }
    if let Some(engine) = &cli.ocr {
        config.ocr.engine = parse_ocr_engine(engine)?;
    }

    config.validate()?;
    Ok(config)
}

async fn ingest_source(pipeline: &RagPipeline, source: &Source) -> anyhow::Result<()> {
    let documents = load_documents(&source.path)
        .with_context(|| format!("loading {}", source.path.display()))?;
    let report = pipeline.ingest(&documents, &source.topic).await?;

    for skipped in &report.skipped_files {
        warn!(filename = %skipped.filename, reason = %skipped.reason, "skipped pdf");
    }

    if report.success {
        println!(
            "[OK] {}: {} pdf(s), {} page(s), {} chunk(s)",
            report.topic,
            documents.len(),
            report.page_count,
            report.chunk_count
        );
    } else {
        println!(
            "[WARN] {}: no text could be extracted from {} pdf(s)",
            report.topic,
            documents.len()
        );
    }
    Ok(())
}

async fn print_topics(pipeline: &RagPipeline) {
    let collections = pipeline.collections().await;
    if collections.is_empty() {
        println!("no topics loaded");
        return;
    }
    for collection in collections {
        println!(
            "{} ({}) chunks={} updated={}",
            collection.topic,
            collection.collection_name,
            collection.chunk_count,
            collection.updated_at.to_rfc3339()
        );
    }
}

async fn chat(pipeline: &RagPipeline) -> anyhow::Result<()> {
    println!("commands: :topics  :topic <name>  :all  :delete <name>  :clear  :history  :quit");

    let mut scope: Option<String> = None;
    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}> ", scope.as_deref().unwrap_or("all"));
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            ":quit" | ":q" => break,
            ":topics" => print_topics(pipeline).await,
            ":topic" if !argument.is_empty() => {
                if pipeline.list_topics().await.iter().any(|topic| topic == argument) {
                    scope = Some(argument.to_string());
                } else {
                    println!("unknown topic {argument:?}");
                }
            }
            ":all" => scope = None,
            ":delete" if !argument.is_empty() => {
                if pipeline.delete_topic(argument).await? {
                    if scope.as_deref() == Some(argument) {
                        scope = None;
                    }
                    println!("deleted {argument}");
                } else {
                    println!("unknown topic {argument:?}");
                }
            }
            ":clear" => {
                let removed = pipeline.delete_all().await?;
                scope = None;
                history.clear();
                println!("removed {removed} topic(s)");
            }
            ":history" => {
                for turn in &history {
                    let speaker = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "rag",
                    };
                    println!("{speaker}: {}", turn.content);
                }
            }
            _ if command.starts_with(':') => println!("unknown command {line:?}"),
            _ => {
                let answer = pipeline.ask(line, scope.as_deref()).await?;
                println!("{answer}\n");
                history.push(ConversationTurn {
                    role: Role::User,
                    content: line.to_string(),
                });
                history.push(ConversationTurn {
                    role: Role::Assistant,
                    content: answer,
                });
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let pipeline = RagPipeline::from_config(config)?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        sources = cli.sources.len(),
        "pdf-rag boot"
    );

    for source in &cli.sources {
        ingest_source(&pipeline, source).await?;
    }

    match cli.command {
        Command::Ask { question, topic } => {
            let answer = pipeline.ask(&question, topic.as_deref()).await?;
            println!("{answer}");
        }
        Command::Topics => print_topics(&pipeline).await,
        Command::Chat => chat(&pipeline).await?,
    }

    Ok(())
}
