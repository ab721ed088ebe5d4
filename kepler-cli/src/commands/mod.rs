use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Subcommand;

use kepler_core::config::KeplerConfig;
use kepler_core::pipeline::{Pipeline, PipelineOptions};
use kepler_core::progress::PhaseBarReporter;
use kepler_core::types::{Domain, RequestId};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a diagram from a problem statement
    Generate {
        /// Problem text; pass "-" or use --file to read from elsewhere
        text: Option<String>,

        /// Read the problem statement from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Domain override (electronics, mechanics, optics, chemistry, geometry)
        #[arg(long)]
        domain: Option<String>,

        /// Config file (defaults to ./kepler.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory override
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Request id override (defaults to a fresh UUID)
        #[arg(long)]
        request_id: Option<String>,

        /// Print the full result JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Write a default kepler.toml to the current directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Generate { text, file, domain, config, output, request_id, json } => {
            generate(text, file, domain, config, output, request_id, json).await
        }
        Command::Init { force } => init(force),
    }
}

fn parse_domain(name: &str) -> anyhow::Result<Domain> {
    match name.to_lowercase().as_str() {
        "electronics" => Ok(Domain::Electronics),
        "mechanics" => Ok(Domain::Mechanics),
        "optics" => Ok(Domain::Optics),
        "chemistry" => Ok(Domain::Chemistry),
        "geometry" => Ok(Domain::Geometry),
        "general" => Ok(Domain::General),
        other => bail!("unknown domain '{other}'"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn generate(
    text: Option<String>,
    file: Option<PathBuf>,
    domain: Option<String>,
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
    request_id: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let problem_text = match (text, file) {
        (Some(text), None) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read problem file {}", path.display()))?,
        _ => bail!("provide the problem text as an argument or via --file"),
    };

    let mut config = match &config_path {
        Some(path) => KeplerConfig::load(path)?,
        None => {
            let default_path = PathBuf::from("kepler.toml");
            if default_path.exists() {
                KeplerConfig::load(&default_path)?
            } else {
                KeplerConfig::default()
            }
        }
    };
    if let Some(dir) = output {
        config.output.dir = dir;
    }

    let options = PipelineOptions {
        domain: domain.as_deref().map(parse_domain).transpose()?,
        request_id: request_id.map(RequestId),
    };

    let mut pipeline =
        Pipeline::new(config).with_reporter(Box::new(PhaseBarReporter::new()));
    let result = pipeline.generate(&problem_text, options).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("request:  {}", result.request_id);
        if let Some(domain) = result.metadata.domain {
            println!("domain:   {domain}");
        }
        if let Some(plan) = &result.diagram_plan {
            println!(
                "plan:     {} entities, {} relations, {} constraints ({:?})",
                plan.entities.len(),
                plan.relations.len(),
                plan.constraints.len(),
                plan.strategy
            );
        }
        if let Some(validation) = &result.validation {
            println!(
                "quality:  {:.0}/100 (confidence {:.2}, {} refinement pass(es))",
                validation.structural.overall,
                validation.overall_confidence,
                validation.refinement_iterations
            );
        }
        for warning in &result.warnings {
            println!("warning:  {warning}");
        }
        match &result.svg {
            Some(_) => println!(
                "svg:      {}/{}.svg",
                pipeline.config().output.dir.display(),
                result.request_id
            ),
            None => println!("svg:      (none)"),
        }
    }

    if result.svg.is_none() {
        bail!("Pipeline aborted: {}", result.errors.join("; "));
    }
    if !result.errors.is_empty() {
        bail!("diagram completed with errors: {}", result.errors.join("; "));
    }
    Ok(())
}

fn init(force: bool) -> anyhow::Result<()> {
    let path = PathBuf::from("kepler.toml");
    if path.exists() && !force {
        bail!("config file {} already exists (use --force to overwrite)", path.display());
    }
    let config = KeplerConfig::default();
    let toml = toml::to_string_pretty(&config).context("cannot serialise default config")?;
    std::fs::write(&path, toml)
        .with_context(|| format!("cannot write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
