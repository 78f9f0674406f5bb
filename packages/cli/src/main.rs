use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use looptrace_kernel::kernel::{CaptureEvents, TraceScript};
use looptrace_kernel::{Step, StepSequence, Tracer, TracerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEMO_CODE: &str = r#"console.log('script start');

setTimeout(() => {
  console.log('setTimeout');
}, 0);

async function async1() {
  console.log('async1 start');
  await async2();
  console.log('async1 end');
}

async function async2() {
  console.log('async2');
}

async1();

new Promise((resolve) => {
  console.log('promise1');
  resolve();
}).then(() => {
  console.log('promise2');
});

console.log('script end');"#;

/// looptrace: step through the JavaScript event loop
#[derive(Parser)]
#[command(name = "looptrace", version)]
#[command(about = "Trace how a script moves through the call stack and task queues", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace a script file (`-` reads stdin)
    Run {
        input: PathBuf,
        #[command(flatten)]
        opts: TraceOpts,
    },
    /// Trace the built-in example
    Demo {
        #[command(flatten)]
        opts: TraceOpts,
    },
    /// Print the raw event buffer of a script as JSON
    Events {
        input: PathBuf,
        #[command(flatten)]
        limits: LimitOpts,
    },
}

#[derive(Args)]
struct TraceOpts {
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,
    #[command(flatten)]
    limits: LimitOpts,
}

#[derive(Args)]
struct LimitOpts {
    /// Wall-clock budget for the run
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long)]
    max_events: Option<usize>,
    #[arg(long)]
    max_macrotasks: Option<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl LimitOpts {
    fn config(&self) -> TracerConfig {
        let mut config = TracerConfig::default().with_cache_capacity(0);
        if let Some(ms) = self.timeout_ms {
            config = config.with_run_timeout(Duration::from_millis(ms));
        }
        if let Some(max) = self.max_events {
            config = config.with_max_events(max);
        }
        if let Some(max) = self.max_macrotasks {
            config = config.with_max_macrotasks(max);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("⚡ looptrace v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { input, opts } => {
            let code = read_source(&input)?;
            trace(&code, &opts).await
        }
        Commands::Demo { opts } => trace(DEMO_CODE, &opts).await,
        Commands::Events { input, limits } => {
            let code = read_source(&input)?;
            let tracer = Tracer::new(limits.config());
            let events = CaptureEvents::new(&tracer).run(&code).await;
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(())
        }
    }
}

async fn trace(code: &str, opts: &TraceOpts) -> Result<()> {
    let tracer = Tracer::new(opts.limits.config());
    let steps = match TraceScript::new(&tracer).run(code).await {
        Ok(Some(steps)) => steps,
        Ok(None) => bail!("Trace was superseded"),
        Err(_) => StepSequence::error(),
    };

    match opts.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&steps)?),
        Format::Text => steps.iter().for_each(print_step),
    }

    if steps.is_error() {
        bail!("Script could not be traced");
    }
    Ok(())
}

fn read_source(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .context("Failed to read script from stdin")?;
        return Ok(code);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))
}

fn print_step(step: &Step) {
    println!("── Step {} ── [{}]", step.ordinal, step.highlight);
    println!("   {}", step.description);
    println!("   {}", step.explanation);
    println!("   Call Stack : {}", join(&step.call_stack));
    println!("   Microtasks : {}", join(&step.microtask_queue));
    println!("   Callbacks  : {}", join(&step.callback_queue));
    println!("   Output     : {}", join(&step.output));
    println!();
}

fn join(items: &[String]) -> String {
    if items.is_empty() {
        "(empty)".to_string()
    } else {
        items.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_takes_limits_but_no_format() {
        let cli = Cli::try_parse_from(["looptrace", "events", "a.js", "--max-events", "5"]).unwrap();
        match cli.command {
            Commands::Events { limits, .. } => assert_eq!(limits.max_events, Some(5)),
            _ => panic!("expected events"),
        }
        assert!(Cli::try_parse_from(["looptrace", "events", "a.js", "--format", "json"]).is_err());
    }

    #[test]
    fn test_run_accepts_format_and_limits() {
        let cli =
            Cli::try_parse_from(["looptrace", "run", "-", "-f", "json", "--timeout-ms", "50"]).unwrap();
        match cli.command {
            Commands::Run { opts, .. } => {
                assert!(opts.format == Format::Json);
                assert_eq!(opts.limits.timeout_ms, Some(50));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
