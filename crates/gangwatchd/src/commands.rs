//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use gangwatch_shared::report::format_xp;
use gangwatch_shared::Granularity;
use gangwatchd::config::CONFIG_PATH;
use gangwatchd::{Config, HttpSource, JsonStore, Monitor, Tracker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Ok(Config::load()),
    }
}

fn open_tracker(config: &Config) -> Result<Tracker> {
    let clock = config.boundary_clock()?;
    let store = JsonStore::new(&config.storage.data_dir);
    let tracker = Tracker::open(store, clock, Box::new(config.task_detector()))
        .with_context(|| format!("Failed to open state in {}", config.storage.data_dir.display()))?;
    Ok(tracker.with_catch_up(config.schedule.catch_up_missed))
}

fn build_monitor(config: &Config) -> Result<Monitor> {
    let tracker = open_tracker(config)?;
    let source = HttpSource::new(&config.source)?;
    info!("Scoreboard source: {}", source.url());
    Ok(Monitor::new(tracker, Arc::new(source), config))
}

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    info!("Gangwatch Daemon v{} starting", gangwatch_shared::VERSION);

    let monitor = build_monitor(&config)?;
    let caught_up = monitor.catch_up().await;
    if !caught_up.is_empty() {
        info!("Caught up {} missed window(s)", caught_up.len());
    }

    let handles = monitor.spawn();
    info!("Gangwatch Daemon ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");

    // Wait for an in-flight cycle to finish before stopping the tasks
    let tracker = monitor.tracker();
    let _guard = tracker.lock().await;
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

pub async fn once(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let monitor = build_monitor(&config)?;
    monitor.catch_up().await;

    let outcome = monitor.run_once().await?;
    if outcome.first_cycle {
        println!("Baseline recorded.");
    }
    for change in &outcome.changes {
        println!("{}", change.format());
    }
    for report in &outcome.reports {
        println!("Closed {} window {}", report.granularity, report.period.id);
    }
    if outcome.storage_errors > 0 {
        warn!("{} state files could not be written", outcome.storage_errors);
    }
    Ok(())
}

pub fn report(
    config_path: Option<PathBuf>,
    granularity: &str,
    period: Option<String>,
    list: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let granularity: Granularity = granularity.parse()?;
    let store = JsonStore::new(&config.storage.data_dir);

    if list {
        for id in store.list_reports(granularity)? {
            println!("{}", id);
        }
        return Ok(());
    }

    let report = match period {
        Some(id) => store.load_report(granularity, &id)?,
        None => open_tracker(&config)?.last_report(granularity).cloned(),
    };
    let Some(report) = report else {
        bail!("No {} report available yet", granularity);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text(config.boundary_clock()?.tz()));
    }
    Ok(())
}

pub fn standings(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let tracker = open_tracker(&config)?;
    let standings = tracker.standings();

    if json {
        println!("{}", serde_json::to_string_pretty(&standings)?);
        return Ok(());
    }
    if standings.is_empty() {
        println!("No scoreboard data yet.");
        return Ok(());
    }

    println!(
        "{:>4}  {:<24} {:>12} {:>10} {:>10} {:>10}  T1 T2",
        "#", "Gang", "XP", "Today", "Week", "Month"
    );
    for s in &standings {
        println!(
            "{:>4}  {:<24} {:>12} {:>10} {:>10} {:>10}  {}  {}",
            s.rank,
            s.name,
            format_xp(s.score),
            format_xp(s.daily_xp),
            format_xp(s.weekly_xp),
            format_xp(s.monthly_xp),
            if s.task1_completed { "x" } else { "-" },
            if s.task2_completed { "x" } else { "-" }
        );
    }
    Ok(())
}

pub fn status(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let status = open_tracker(&config)?.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Data dir:    {}", config.storage.data_dir.display());
    println!("Timezone:    {}", status.timezone);
    println!("Gangs:       {}", status.entities);
    println!(
        "Last update: {}",
        status
            .last_update
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    for window in &status.windows {
        println!(
            "{:<8} {} entries, {} XP, last reset {}, last report {}",
            window.granularity.as_str(),
            window.entries,
            format_xp(window.total_xp),
            window
                .last_reset
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            window.last_report_period.as_deref().unwrap_or("none")
        );
    }
    Ok(())
}

pub fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    Config::save_default(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
