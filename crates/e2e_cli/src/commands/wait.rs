//! Await command: poll a shell command as a condition probe.

use crate::AwaitArgs;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use console::style;
use e2e_core::{Config, TestRun};
use indicatif::{ProgressBar, ProgressStyle};
use std::process::{Command, ExitCode, Stdio};
use std::time::Duration;
use tracing::debug;

/// Parse durations such as `30s`, `500ms`, `2m`, or bare seconds.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {:?}", input))?;

    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration too large: {:?}", input)),
        other => Err(format!("unknown duration unit {:?} (use ms, s or m)", other)),
    }
}

/// Run the await command as a one-off test whose wait is an eventual ASSERT phase.
///
/// A timeout is reported here and turned into a failing exit code.
pub fn run(args: AwaitArgs, config: &Config) -> Result<ExitCode> {
    let mut schedule = config
        .polling
        .schedule(args.timeout.unwrap_or_else(|| config.polling.eventual_consistency()));
    if let Some(ms) = args.interval_ms {
        schedule = schedule.with_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = args.delay_ms {
        schedule = schedule.with_delay(Duration::from_millis(ms));
    }
    let description = args
        .description
        .clone()
        .unwrap_or_else(|| args.command.join(" "));

    let run = TestRun::from_config(config.clone())?;
    let case = run.start_test("e2e await");

    println!(
        "{} Waiting for: {} (max {:?}, started {})",
        style("→").cyan(),
        style(&description).bold(),
        schedule.timeout,
        Local::now().format("%H:%M:%S")
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .map_err(|e| anyhow!("invalid spinner template: {}", e))?,
    );
    spinner.set_message(description.clone());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let outcome = if args.capture {
        case.poll_condition(&description, &schedule, || probe_output(&args.command))
    } else {
        case.poll_condition(&description, &schedule, || {
            probe_status(&args.command).map(|ok| ok.then(String::new))
        })
    };

    spinner.finish_and_clear();
    case.finish();

    match outcome {
        Ok((output, record)) => {
            println!(
                "{} {} after {} attempt(s) in {:.1}s",
                style("✓").green(),
                style(&description).green(),
                record.attempts,
                record.elapsed.as_secs_f64()
            );
            if args.capture {
                println!("{}", output);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_timeout() => {
            let timeout = err.as_condition_timeout().unwrap_or(&err);
            println!("{} {}", style("×").red(), style(timeout).red());
            if let Some(hint) = timeout.hint() {
                println!("  {} {}", style("→").cyan(), hint);
            }
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}

fn command_for(argv: &[String]) -> Result<Command> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| anyhow!("no command given"))?;
    let mut command = Command::new(program);
    command.args(rest).stdin(Stdio::null());
    Ok(command)
}

/// Exit status 0 means satisfied.
fn probe_status(argv: &[String]) -> Result<bool> {
    let status = command_for(argv)?
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to run {}", argv.join(" ")))?;
    debug!(command = %argv.join(" "), %status, "probe command exited");
    Ok(status.success())
}

/// Non-empty stdout from a successful run is the value.
fn probe_output(argv: &[String]) -> Result<Option<String>> {
    let output = command_for(argv)?
        .stderr(Stdio::null())
        .output()
        .with_context(|| format!("failed to run {}", argv.join(" ")))?;
    if !output.status.success() {
        bail!("{} exited with {}", argv.join(" "), output.status);
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!stdout.is_empty()).then_some(stdout))
}
