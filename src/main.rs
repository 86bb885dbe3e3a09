use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use telos::backend::{GenerationBackend, OllamaBackend};
use telos::engine::CancelFlag;
use telos::model::load_test_cases;
use telos::{
    setup_logging, should_use_json, EvolutionConfig, EvolutionEngine, FitnessEvaluator,
    GenerationOptions, Individual, Result,
};

#[derive(Parser)]
#[command(name = "telos")]
#[command(author, version, about = "Evolutionary directive optimization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Evolve a base directive against a test case file
    Evolve {
        /// File containing the base directive text
        base: PathBuf,

        /// TOML file with [[cases]] entries
        #[arg(short, long, default_value = "./cases.toml")]
        cases: PathBuf,

        /// Number of generations to evolve
        #[arg(short, long, default_value = "5")]
        generations: usize,

        /// Backend endpoint
        #[arg(long, default_value = "http://localhost:11434")]
        endpoint: String,

        /// Backend model name
        #[arg(long, default_value = "llama3.2")]
        model: String,

        /// Override the population size
        #[arg(long)]
        population: Option<usize>,

        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Load evolution parameters from a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write a JSON export of the run to this path
        #[arg(long)]
        export: Option<PathBuf>,

        /// Apply the best directive to the backend when done
        #[arg(long)]
        apply: bool,
    },

    /// Score a single directive against a test case file
    Score {
        /// File containing the directive text
        directive: PathBuf,

        /// TOML file with [[cases]] entries
        #[arg(short, long, default_value = "./cases.toml")]
        cases: PathBuf,

        /// Backend endpoint
        #[arg(long, default_value = "http://localhost:11434")]
        endpoint: String,

        /// Backend model name
        #[arg(long, default_value = "llama3.2")]
        model: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.json || should_use_json(), &cli.log_level);

    let result = match cli.command {
        Commands::Evolve {
            base,
            cases,
            generations,
            endpoint,
            model,
            population,
            seed,
            config,
            export,
            apply,
        } => {
            run_evolve(
                base,
                cases,
                generations,
                endpoint,
                model,
                population,
                seed,
                config,
                export,
                apply,
            )
            .await
        }
        Commands::Score {
            directive,
            cases,
            endpoint,
            model,
        } => run_score(directive, cases, endpoint, model).await,
    };

    if let Err(err) = result {
        eprintln!("{} {}", "error:".red().bold(), err);
        if let Some(suggestion) = err.suggestion() {
            eprintln!("{} {}", "hint:".yellow(), suggestion);
        }
        std::process::exit(err.exit_code());
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_evolve(
    base: PathBuf,
    cases: PathBuf,
    generations: usize,
    endpoint: String,
    model: String,
    population: Option<usize>,
    seed: Option<u64>,
    config_path: Option<PathBuf>,
    export: Option<PathBuf>,
    apply: bool,
) -> Result<()> {
    let base_directive = std::fs::read_to_string(&base)?;
    let test_cases = load_test_cases(&cases)?;

    let mut config = match config_path {
        Some(path) => EvolutionConfig::load_from_file(&path)?,
        None => EvolutionConfig::load()?,
    };
    if let Some(population) = population {
        config.population_size = population;
    }
    if let Some(seed) = seed {
        config.seed = Some(seed);
    }

    let backend = OllamaBackend::builder()
        .endpoint(&endpoint)
        .model(&model)
        .build();
    backend.health_check().await?;

    let mut engine = EvolutionEngine::new(config, Box::new(backend));
    let subscription = engine.subscribe(|event| {
        println!("{}", format!("  [{}] {}", event.kind, event.data).dimmed());
    });

    engine.initialize_evolution(&base_directive)?;
    engine.start_evolution()?;

    println!(
        "{} {} generations, population {}, {} test cases",
        "evolving:".cyan().bold(),
        generations,
        engine.config().population_size,
        test_cases.len()
    );

    let progress = ProgressBar::new(generations as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for _ in 0..generations {
        if let Some(generation) = engine.evolve_generation(&test_cases).await? {
            progress.set_message(format!(
                "gen {} best {:.3}",
                generation.number, generation.best_fitness
            ));
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    engine.stop_evolution()?;
    subscription.unsubscribe();

    println!("\n{}", "generation history".bold());
    for generation in engine.store().iter() {
        println!(
            "  gen {:>3}  best {:.3}  avg {:.3}",
            generation.number, generation.best_fitness, generation.average_fitness
        );
    }

    if let Some(best) = engine.best_individual() {
        println!(
            "\n{} fitness {:.3} (generation {}, {} mutations)",
            "best directive:".green().bold(),
            best.fitness,
            best.generation,
            best.applied_mutations.len()
        );
        println!("{}", best.directive);
    } else {
        warn!("run produced no evaluated individuals");
    }

    if let Some(path) = export {
        let snapshot = engine.export_evolution_data();
        std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        println!("\n{} {}", "exported:".cyan(), path.display());
    }

    if apply {
        let directive = engine.apply_best_directive()?;
        println!(
            "\n{} {} chars now active on the backend",
            "applied:".green(),
            directive.len()
        );
    }

    Ok(())
}

async fn run_score(
    directive: PathBuf,
    cases: PathBuf,
    endpoint: String,
    model: String,
) -> Result<()> {
    let directive_text = std::fs::read_to_string(&directive)?;
    let test_cases = load_test_cases(&cases)?;

    let mut backend = OllamaBackend::builder()
        .endpoint(&endpoint)
        .model(&model)
        .build();
    backend.health_check().await?;

    let evaluator = FitnessEvaluator::new(GenerationOptions::default());
    let mut individual = Individual::new(directive_text, 0);
    let cancel = CancelFlag::new();
    evaluator
        .evaluate(
            &mut individual,
            &test_cases,
            &mut backend as &mut dyn GenerationBackend,
            &cancel,
        )
        .await?;

    println!("{}", "per-case results".bold());
    for outcome in &individual.test_results {
        match &outcome.error {
            Some(error) => println!(
                "  {:<16} {}",
                outcome.test_case_id,
                format!("failed: {}", error).red()
            ),
            None => println!(
                "  {:<16} overall {:.3}  weighted {:.3}  ({} tokens, {}ms)",
                outcome.test_case_id,
                outcome.overall_score,
                outcome.weighted_score,
                outcome.token_count,
                outcome.duration_ms
            ),
        }
    }

    let p = &individual.performance;
    println!("\n{}", "criterion averages".bold());
    println!("  relevance    {:.3}", p.relevance);
    println!("  coherence    {:.3}", p.coherence);
    println!("  creativity   {:.3}", p.creativity);
    println!("  helpfulness  {:.3}", p.helpfulness);
    println!("  safety       {:.3}", p.safety);
    println!("  accuracy     {:.3}", p.accuracy);

    println!(
        "\n{} {:.3}",
        "fitness:".green().bold(),
        individual.fitness
    );
    Ok(())
}
