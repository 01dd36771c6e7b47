// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Context, Result};
use clap::Parser;
use judgeloop_evals::{
    BackendConfig, ConsensusSummary, EvaluationLoop, EvaluationLoopConfig, SemanticCriterion,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "judgeloop")]
#[command(about = "Judge an agent response against semantic criteria with a panel of LLMs", long_about = None)]
struct Cli {
    /// TOML file with evaluation loop settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dotenv file with backend credentials (default: nearest .env, if any)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// The user message the agent answered
    #[arg(short, long)]
    input: String,

    /// The agent response to judge
    #[arg(short, long)]
    response: String,

    /// Natural-language requirement (repeat for several criteria)
    #[arg(long = "criterion", required = true)]
    criteria: Vec<String>,

    /// Judge model id (repeat for several judges); replaces the configured list
    #[arg(short, long = "evaluator")]
    evaluators: Vec<String>,

    /// Rounds per criterion
    #[arg(short = 'n', long)]
    iterations: Option<u32>,

    /// Minimum YES fraction for a criterion to pass
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Ask judges one at a time instead of concurrently
    #[arg(long)]
    sequential: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Resolve the loop configuration: file (or defaults), then flag overrides
    fn loop_config(&self) -> Result<EvaluationLoopConfig> {
        let mut config = match &self.config {
            Some(path) => EvaluationLoopConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => EvaluationLoopConfig::default(),
        };

        if !self.evaluators.is_empty() {
            config = config.with_evaluators(self.evaluators.iter().cloned());
        }
        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if self.sequential {
            config = config.with_parallel_execution(false);
        }

        Ok(config)
    }

    fn semantic_criteria(&self) -> Vec<SemanticCriterion> {
        self.criteria
            .iter()
            .map(|c| SemanticCriterion::from(c.as_str()))
            .collect()
    }
}

/// Variables from a dotenv file. Without an explicit path a missing `.env` is not an error.
fn dotenv_vars(env_file: Option<&Path>) -> Result<HashMap<String, String>> {
    let iter = match env_file {
        Some(path) => dotenvy::from_path_iter(path)
            .with_context(|| format!("Failed to read env file {}", path.display()))?,
        None => match dotenvy::dotenv_iter() {
            Ok(iter) => iter,
            Err(e) if e.not_found() => return Ok(HashMap::new()),
            Err(e) => return Err(e).context("Failed to read .env"),
        },
    };

    iter.collect::<std::result::Result<HashMap<_, _>, _>>()
        .context("Malformed env file")
}

/// Backend settings from the live environment, falling back to dotenv values
fn backend_config<F>(file_vars: &HashMap<String, String>, live: F) -> BackendConfig
where
    F: Fn(&str) -> Option<String>,
{
    BackendConfig::from_lookup(|name| live(name).or_else(|| file_vars.get(name).cloned()))
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "judgeloop=debug,judgeloop_evals=debug"
    } else {
        "judgeloop=info,judgeloop_evals=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<bool> {
    let config = cli.loop_config()?;
    let criteria = cli.semantic_criteria();
    if criteria.iter().any(|c| c.criterion.trim().is_empty()) {
        bail!("Criterion text must not be empty");
    }

    let file_vars = dotenv_vars(cli.env_file.as_deref())?;
    let backends = backend_config(&file_vars, |name| std::env::var(name).ok());

    let evaluation = EvaluationLoop::new(config, &backends)
        .context("Invalid evaluation loop configuration")?;

    let results = evaluation
        .evaluate_response(&cli.input, &cli.response, &criteria)
        .await
        .context("Evaluation failed")?;

    println!("{}", serde_json::to_string_pretty(&results)?);

    let summary = ConsensusSummary::from_results(&results);
    info!("{}", summary);
    eprintln!("{}", summary);

    Ok(summary.all_passed())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["judgeloop", "--input", "hello", "--response", "hi"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_criterion_is_required() {
        let result = Cli::try_parse_from(["judgeloop", "--input", "a", "--response", "b"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_repeated_criteria_keep_order() {
        let cli = parse(&["--criterion", "greets", "--criterion", "offers help"]);
        let criteria = cli.semantic_criteria();

        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].criterion, "greets");
        assert_eq!(criteria[1].criterion, "offers help");
        assert_eq!(criteria[1].weight, 1.0);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--criterion",
            "greets",
            "-e",
            "gpt-4o-mini",
            "-e",
            "llama3",
            "-n",
            "5",
            "--threshold",
            "0.5",
            "--sequential",
        ]);
        let config = cli.loop_config().unwrap();

        assert_eq!(config.evaluator_ids, vec!["gpt-4o-mini", "llama3"]);
        assert_eq!(config.iterations, 5);
        assert_eq!(config.consensus_threshold, 0.5);
        assert!(!config.parallel_execution);
    }

    #[test]
    fn test_without_flags_uses_defaults() {
        let cli = parse(&["--criterion", "greets"]);
        assert_eq!(cli.loop_config().unwrap(), EvaluationLoopConfig::default());
    }

    #[test]
    fn test_config_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "iterations = 2\nevaluator_models = [\"claude-3-5-haiku-20241022\"]\nconsensus_threshold = 0.8"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = parse(&["--criterion", "greets", "--config", &path, "-n", "4"]);
        let config = cli.loop_config().unwrap();

        assert_eq!(config.iterations, 4);
        assert_eq!(config.evaluator_ids, vec!["claude-3-5-haiku-20241022"]);
        assert_eq!(config.consensus_threshold, 0.8);
    }

    #[test]
    fn test_env_file_supplies_missing_credentials() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "OPENAI_API_KEY=sk-from-file\nANTHROPIC_API_KEY=ak-from-file\nOLLAMA_BASE_URL=http://gpu-box:11434"
        )
        .unwrap();

        let file_vars = dotenv_vars(Some(file.path())).unwrap();
        assert_eq!(file_vars.get("OPENAI_API_KEY").map(String::as_str), Some("sk-from-file"));

        // Live environment wins over the file
        let backends = backend_config(&file_vars, |name| {
            (name == "OPENAI_API_KEY").then(|| "sk-live".to_string())
        });
        assert_eq!(backends.openai_api_key.as_deref(), Some("sk-live"));
        assert_eq!(backends.anthropic_api_key.as_deref(), Some("ak-from-file"));
        assert_eq!(backends.local_endpoint, "http://gpu-box:11434");
    }

    #[test]
    fn test_missing_explicit_env_file_is_reported() {
        let err = dotenv_vars(Some(Path::new("/nonexistent/judgeloop.env"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read env file"));
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let cli = parse(&["--criterion", "greets", "--config", "/nonexistent/judgeloop.toml"]);
        let err = cli.loop_config().unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load config"));
    }
}
