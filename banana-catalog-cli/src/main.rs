use banana_catalog::{
    Agent, CatalogResult, Config, ExtractOptions, KeywordTransformer, Registry, ScanMode,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG: &str = "banana-catalog.json";

fn cli() -> Command {
    Command::new("banana-catalog")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extract, inspect and compile message catalogs")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("Configuration file")
                .default_value(DEFAULT_CONFIG),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .help("Log every file and catalog operation")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("extract")
                .about("Update catalogs from the source files")
                .arg(
                    Arg::new("clean")
                        .long("clean")
                        .help("Remove references and items that no longer occur in the sources")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("sync")
                        .long("sync")
                        .help("Process files one at a time instead of concurrently")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show translation progress per locale")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print machine readable output")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("compile")
                .about("Write compiled catalogs for the runtime")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .help("Output directory")
                        .required(true),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let config_path = PathBuf::from(
        matches
            .get_one::<String>("config")
            .map(String::as_str)
            .unwrap_or(DEFAULT_CONFIG),
    );
    let config = Config::from_file(&config_path)?;
    let root = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let transformer = Arc::new(KeywordTransformer::new()?);
    let mut agents = config.build_agents(&root, transformer)?;
    let mut registry = Registry::new();
    // Load in configuration order so the first agent owns shared catalogs
    for agent in &agents {
        agent.load(&mut registry).await?;
    }

    match matches.subcommand() {
        Some(("extract", sub)) => {
            run_extract(&config, &mut agents, &mut registry, extract_options(sub)).await?;
        }
        Some(("status", sub)) => print_status(&agents, &registry, sub.get_flag("json"))?,
        Some(("compile", sub)) => {
            let out = sub
                .get_one::<String>("out")
                .map(PathBuf::from)
                .ok_or("missing --out")?;
            run_extract(&config, &mut agents, &mut registry, ExtractOptions::default()).await?;
            write_artifacts(&agents, &out)?;
        }
        _ => unreachable!("subcommand_required is set"),
    }
    Ok(())
}

fn extract_options(matches: &ArgMatches) -> ExtractOptions {
    ExtractOptions {
        clean: matches.get_flag("clean"),
        mode: if matches.get_flag("sync") {
            ScanMode::Sequential
        } else {
            ScanMode::Parallel
        },
    }
}

async fn run_extract(
    config: &Config,
    agents: &mut [Agent],
    registry: &mut Registry,
    options: ExtractOptions,
) -> CatalogResult<()> {
    for (agent, agent_config) in agents.iter_mut().zip(&config.agents) {
        let files = agent.discover_files()?;
        let report = agent.extract(registry, &files, options).await?;
        if !agent_config.url_patterns.is_empty() {
            agent
                .sync_url_patterns(registry, &agent_config.url_patterns)
                .await?;
        }
        info!(
            "{}: {} files, {} catalogs written, {} references and {} items removed",
            agent.key(),
            report.files.len(),
            report.written.len(),
            report.removed_references,
            report.removed_items
        );
    }
    Ok(())
}

fn print_status(
    agents: &[Agent],
    registry: &Registry,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = Vec::new();
    for agent in agents {
        // Agents sharing a catalog would print the same numbers
        if seen.contains(&agent.storage_key()) {
            continue;
        }
        seen.push(agent.storage_key());
        let status = agent.status(registry)?;
        if json {
            println!("{}", serde_json::to_string(&status)?);
            continue;
        }
        println!("{} ({})", agent.key(), agent.storage_key());
        for locale in status {
            println!(
                "  {:<8} {:>5} total {:>5} untranslated {:>5} obsolete",
                locale.locale, locale.stats.total, locale.stats.untranslated, locale.stats.obsolete
            );
        }
    }
    Ok(())
}

/// Write `<agent>.<locale>.json` per bundle, or `<agent>/<load id>.<locale>.json` per load
/// unit for granular agents
fn write_artifacts(agents: &[Agent], out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(out)?;
    for agent in agents {
        match agent.granular() {
            Some(granular) => {
                let dir = out.join(agent.key());
                fs::create_dir_all(&dir)?;
                for unit in granular.states() {
                    for (locale, compiled) in &unit.compiled {
                        let path = dir.join(format!("{}.{}.json", unit.id, locale));
                        fs::write(&path, compiled.to_json()?)?;
                    }
                }
            }
            None => {
                for locale in agent.locales() {
                    if let Some(compiled) = agent.compiled(locale) {
                        let path = out.join(format!("{}.{}.json", agent.key(), locale));
                        fs::write(&path, compiled.to_json()?)?;
                    }
                }
            }
        }
    }
    info!("Wrote compiled catalogs to {}", out.display());
    Ok(())
}
