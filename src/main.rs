use std::{fs, path::PathBuf, time::Duration};

use anyhow::Context;
use benchee::{benchmark, create_suite, BenchmarkResult, Options, Results, RunType};
use chrono::Utc;
use clap::Parser;
use serde_json::{json, Map, Value};
use sysinfo::{CpuExt, System, SystemExt};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON file with suite options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum time in milliseconds each measurement must cover
    #[arg(long)]
    min_time: Option<u64>,

    /// Pause in milliseconds before each benchmark
    #[arg(long)]
    delay: Option<u64>,

    /// Iteration count of the first round
    #[arg(long)]
    min_iterations: Option<u64>,

    /// Measurement type (adaptive or fixed)
    #[arg(long = "type")]
    run_type: Option<RunType>,

    /// Path to a directory to dump results in
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// If true, collects system information (e.g. CPU, memory, etc...) in the output
    #[arg(long)]
    collect_sysinfo: bool,
}

impl Args {
    fn options(&self) -> anyhow::Result<Options> {
        let options = match &self.config {
            Some(path) => Options::from_path(path)
                .with_context(|| format!("could not load options from {}", path.display()))?,
            None => Options::default(),
        };

        let mut overrides = Map::new();
        if let Some(min_time) = self.min_time {
            overrides.insert("minTime".to_string(), json!(min_time));
        }
        if let Some(delay) = self.delay {
            overrides.insert("delay".to_string(), json!(delay));
        }
        if let Some(min_iterations) = self.min_iterations {
            overrides.insert("minIterations".to_string(), json!(min_iterations));
        }
        if let Some(run_type) = self.run_type {
            overrides.insert("type".to_string(), json!(run_type));
        }

        options
            .merge(Value::Object(overrides))
            .context("could not apply command line options")
    }
}

fn render(title: &str, results: &[BenchmarkResult]) {
    let width = results
        .iter()
        .map(|result| result.name.len())
        .chain([4])
        .max()
        .unwrap_or(4);

    println!("{title}");
    println!("| {:<width$} | {:>16} |", "Name", "Ops / sec");
    println!("|-{:-<width$}-|-{:->16}-|", "", "");
    for result in results {
        match &result.error {
            None => println!("| {:<width$} | {:>16} |", result.name, result.stats.ops),
            Some(err) => println!("| {:<width$} | {:>16} | {err}", result.name, "failed"),
        }
    }
    println!();
}

fn sum(a: u64, b: u64) -> u64 {
    a + b
}

async fn run_single_benchmark(options: &Options) -> anyhow::Result<Value> {
    let result = benchmark("basic sum", || sum(1, 2), Some(options.clone())).await?;
    render("sum results", std::slice::from_ref(&result));
    Ok(json!({ "sum": [result] }))
}

async fn run_simple_suite(options: &Options) -> anyhow::Result<Results> {
    let suite = create_suite(Some(options.clone()));
    suite
        .add("u64::max", || 1_u64.max(2))
        .add("Option::or", || Some(2_u64).or(Some(1)));

    let results = suite.run().await?;
    if let Some(results) = results.get(benchee::UNGROUPED) {
        render("u64::max vs Option::or results", results);
    }
    Ok(results)
}

async fn run_map_suite(options: &Options) -> anyhow::Result<Results> {
    let small: std::collections::HashMap<String, u64> =
        [("foo", 1), ("bar", 2), ("baz", 3)].map(|(k, v)| (k.to_string(), v)).into();
    let large: std::collections::HashMap<String, u64> =
        (0..10_000).map(|i| (format!("key_{i}"), 1)).collect();

    let suite = create_suite(Some(options.clone()));
    for (group, map) in [("small map", small), ("large map", large)] {
        let looped = map.clone();
        suite
            .add_to_group("for loop", group, move || {
                let mut keys = Vec::new();
                for key in looped.keys() {
                    keys.push(key.as_str());
                }
                keys.len()
            })
            .add_to_group("keys().collect()", group, move || {
                map.keys().collect::<Vec<_>>().len()
            });
    }

    let results = suite.run().await?;
    for (group, results) in results.iter() {
        render(&format!("map key results - {group}"), results);
    }
    Ok(results)
}

fn sysinfo() -> Value {
    let mut system = System::new_all();
    system.refresh_all();
    json!({
        "os": system.long_os_version(),
        "kernel": system.kernel_version(),
        "cpus": system.cpus().iter().map(|cpu| cpu.brand().to_string()).collect::<Vec<_>>(),
        "memory": system.total_memory(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();
    env_logger::init();

    let args = Args::parse();
    let options = args.options()?;
    let start_time = Utc::now();

    log::info!(
        "running demo suites ({} mode, min time {:?}, delay {:?}), please wait...",
        options.run_type,
        options.min_time,
        options.delay
    );
    if options.min_time > Duration::from_secs(10) {
        log::warn!("minimum time is over ten seconds, this is going to take a while...");
    }

    let single = run_single_benchmark(&options).await?;
    let simple = run_simple_suite(&options).await?;
    let maps = run_map_suite(&options).await?;

    let Some(output) = args.output else {
        return Ok(());
    };

    let mut report = json!({
        "startTime": start_time.to_rfc3339(),
        "options": options,
        "suites": {
            "single": single,
            "simple": simple,
            "maps": maps,
        },
    });
    if args.collect_sysinfo {
        report["sysinfo"] = sysinfo();
    }

    let output_file_path = output.join(format!(
        "results.{}.json",
        start_time.format("%Y-%m-%dT%H-%M-%S%z")
    ));
    log::info!(
        "writing result output to {}...",
        output_file_path.to_string_lossy()
    );
    fs::create_dir_all(&output).context("could not create output directory structure")?;
    fs::write(&output_file_path, serde_json::to_string_pretty(&report)?).context(format!(
        "could not write to output file {}",
        output_file_path.to_string_lossy()
    ))?;

    Ok(())
}
