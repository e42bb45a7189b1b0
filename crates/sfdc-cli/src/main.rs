//! `sfdc-plan`: resolve every configured query for one run without executing it

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::json;
use sfdc_config::{ConfigLoader, InstanceConfig};
use sfdc_core::{RunPlan, Runner};
use sfdc_query::{Clock, FixedClock, SystemClock, Watermark};
use sfdc_state::{JsonFileWatermarkStore, MemoryWatermarkStore, WatermarkStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("sfdc-plan")
        .version(sfdc_core::VERSION)
        .about("Salesforce event log query resolver")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .default_value("config.yml")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the YAML configuration"),
        )
        .subcommand(
            Command::new("validate").about("Load the configuration and summarize each instance"),
        )
        .subcommand(
            Command::new("plan")
                .about("Resolve every query for one run and print it")
                .arg(
                    Arg::new("state")
                        .long("state")
                        .value_parser(value_parser!(PathBuf))
                        .help("JSON watermark file (first-run windows when absent)"),
                )
                .arg(
                    Arg::new("at")
                        .long("at")
                        .help("Plan as of this RFC 3339 instant instead of now"),
                )
                .arg(
                    Arg::new("instance")
                        .long("instance")
                        .help("Only plan the named instance"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .context("missing --config")?;
    let instances = ConfigLoader::new()
        .load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match matches.subcommand() {
        Some(("validate", _)) => {
            validate(&instances);
            Ok(())
        }
        Some(("plan", args)) => plan(&instances, args),
        _ => Ok(()),
    }
}

fn validate(instances: &[InstanceConfig]) {
    for instance in instances {
        let defaults = &instance.defaults;
        println!(
            "{}: api v{}, {} on {}, lag {}m, lookback {}m, cache {}",
            instance.name(),
            defaults.api_ver,
            defaults.generation_interval,
            defaults.date_field,
            defaults.time_lag_minutes,
            defaults.initial_lookback_minutes,
            if instance.cache.enabled { "on" } else { "off" },
        );
        for (key, template) in instance.keyed_queries() {
            println!("  {key}: {}", template.text);
        }
    }
}

fn plan(instances: &[InstanceConfig], args: &ArgMatches) -> Result<()> {
    let store: Box<dyn WatermarkStore> = match args.get_one::<PathBuf>("state") {
        Some(path) => Box::new(
            JsonFileWatermarkStore::open(path)
                .with_context(|| format!("opening state file {}", path.display()))?,
        ),
        None => Box::new(MemoryWatermarkStore::new()),
    };
    let clock: Box<dyn Clock> = match args.get_one::<String>("at") {
        Some(at) => Box::new(FixedClock::new(
            Watermark::parse(at).context("invalid --at")?.at(),
        )),
        None => Box::new(SystemClock),
    };
    let only = args.get_one::<String>("instance");

    let mut plans = Vec::new();
    for instance in instances {
        if only.is_some_and(|name| name != instance.name()) {
            continue;
        }
        let runner = Runner::new(instance, store.as_ref(), clock.as_ref());
        plans.push(runner.plan()?);
    }
    if let Some(name) = only {
        anyhow::ensure!(!plans.is_empty(), "no instance named \"{name}\"");
    }

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&to_json(&plans))?);
    } else {
        for run in &plans {
            print_plan(run);
        }
    }

    let failed: usize = plans.iter().map(|p| p.failures.len()).sum();
    anyhow::ensure!(failed == 0, "{failed} queries failed to resolve");
    Ok(())
}

fn print_plan(run: &RunPlan) {
    println!("{} @ {}", run.instance, run.now.to_rfc3339());
    for planned in &run.planned {
        let resolved = &planned.resolved;
        println!("  {} {}", planned.key, resolved.window());
        println!("    {}", resolved.query());
        for unused in resolved.unused_env() {
            println!("    warning: env key \"{unused}\" is never referenced");
        }
    }
    for failure in &run.failures {
        println!("  {} FAILED: {}", failure.key, failure.error);
    }
}

fn to_json(plans: &[RunPlan]) -> serde_json::Value {
    plans
        .iter()
        .map(|run| {
            json!({
                "instance": run.instance,
                "now": run.now,
                "queries": run.planned.iter().map(|p| json!({
                    "key": p.key,
                    "request_path": p.resolved.request_path(),
                    "resolved": p.resolved,
                })).collect::<Vec<_>>(),
                "failures": run.failures.iter().map(|f| json!({
                    "key": f.key,
                    "error": f.error.to_string(),
                })).collect::<Vec<_>>(),
            })
        })
        .collect()
}
