//! flyphase: CLI for flying phase determination.

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use flyphase_core::alternate::{AlternateDecision, CandidateStatus, ForecastStatus, NotamImpact};
use flyphase_core::clock::{local_hhmm_to_utc, ParseContext};
use flyphase_core::config::{self, Config};
use flyphase_core::element::{normalize, NormalizeOptions};
use flyphase_core::fuel::FuelOptions;
use flyphase_core::pipeline::{ResolvedConditions, TimeWindow};
use flyphase_core::*;

#[derive(Parser)]
#[command(name = "flyphase", version, about = "Flying phase determination from METAR, TAF and PIREP")]
struct Cli {
    /// Config file (default ~/.flyphase/config.yaml)
    #[arg(long, global = true, env = "FLYPHASE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Determine the flying phase and divert plan
    Phase(PhaseArgs),

    /// Parse reports and print their fields
    Parse {
        /// Report strings, auto-classified ("-" reads one per line from stdin)
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args)]
struct PhaseArgs {
    /// Report strings, auto-classified ("-" reads one per line from stdin)
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Runway in use (e.g. 33); auto-selected from the wind when omitted
    #[arg(long, alias = "runway")]
    rwy: Option<String>,

    /// Free-text weather warning
    #[arg(long)]
    warning: Option<String>,

    /// Operational notes, e.g. "No medical" "RADAR procedures only"
    #[arg(long, num_args = 1..)]
    notes: Vec<String>,

    /// Bird-strike risk level: low, moderate, severe
    #[arg(long, default_value = "low")]
    bird: BirdLevel,

    /// Solo cadet (divert fuel)
    #[arg(long)]
    solo: bool,

    /// Diverting from the opposite side (divert fuel)
    #[arg(long)]
    opposite: bool,

    /// Sortie time, local HHMM
    #[arg(long)]
    sortie_time: Option<String>,

    /// Local phase window half-width in minutes
    #[arg(long)]
    local_lookahead: Option<i64>,

    /// Directory of alternate forecasts named <ICAO>.taf
    #[arg(long, env = "FLYPHASE_TAF_DIR")]
    taf_dir: Option<PathBuf>,

    /// JSON map of ICAO to NOTAM impact
    #[arg(long)]
    notams: Option<PathBuf>,

    /// Airfield dataset (overrides the config)
    #[arg(long, env = "FLYPHASE_AIRFIELDS")]
    airfields: Option<PathBuf>,

    /// Evaluate alternates even when not required
    #[arg(long)]
    always_alternate: bool,

    /// Reject reports with unrecognized groups
    #[arg(long)]
    strict: bool,

    /// Show every phase check
    #[arg(long)]
    checks: bool,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };

    match cli.command {
        Commands::Phase(args) => cmd_phase(args, config),
        Commands::Parse { inputs, json } => cmd_parse(&inputs, &config, json),
        Commands::InitConfig { force } => cmd_init_config(&config, force),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

/// Expand `-` into stdin lines; everything else passes through.
fn read_inputs(inputs: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for input in inputs {
        if input == "-" {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { continue };
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    out.push(line.to_string());
                }
            }
        } else {
            out.push(input.clone());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// phase
// ---------------------------------------------------------------------------

fn cmd_phase(args: PhaseArgs, mut config: Config) {
    let now = Utc::now();
    if let Some(min) = args.local_lookahead {
        config.windows.local_lookahead_min = min;
    }

    let data_path = args
        .airfields
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data.airfields));
    let dataset = AirfieldDataset::load(&data_path)
        .unwrap_or_else(|e| fail(format!("loading {}: {e}", data_path.display())));
    if !dataset.home.eq_ignore_ascii_case(&config.home.icao) {
        warn!(config = %config.home.icao, dataset = %dataset.home, "home airfield differs from config, using dataset");
    }

    let sortie_time = args.sortie_time.as_deref().map(|t| {
        local_hhmm_to_utc(t, config.home.utc_offset_hours, now)
            .unwrap_or_else(|| fail(format!("invalid sortie time '{t}', expected local HHMM")))
    });

    let forecasts = match &args.taf_dir {
        Some(dir) => load_forecasts(dir, &dataset.alternate_priority),
        None => HashMap::new(),
    };
    let notams = match &args.notams {
        Some(path) => load_notams(path),
        None => HashMap::new(),
    };

    let input = AssessmentInput {
        reports: read_inputs(&args.inputs),
        warning: args.warning.clone(),
        warning_window: None,
        notes: (!args.notes.is_empty()).then(|| args.notes.join(", ")),
        bird: args.bird,
        runway: args.rwy.clone(),
        fuel: FuelOptions {
            solo: args.solo,
            opposite_side: args.opposite,
        },
        sortie_time,
        forecasts,
        notams,
        always_alternate: args.always_alternate,
        strict: args.strict,
    };

    let assessment = assess(&input, &dataset, &config, now).unwrap_or_else(|e| fail(e));

    if args.json {
        match serde_json::to_string_pretty(&assessment) {
            Ok(text) => println!("{text}"),
            Err(e) => fail(e),
        }
        return;
    }
    print_assessment(&assessment, &config, args.checks);
}

/// Read `<dir>/<ICAO>.taf` for each candidate. Missing or empty files are
/// unavailable forecasts.
fn load_forecasts(dir: &Path, icaos: &[String]) -> HashMap<String, ForecastStatus> {
    icaos
        .iter()
        .map(|icao| {
            let key = icao.to_ascii_uppercase();
            let path = dir.join(format!("{key}.taf"));
            let status = match std::fs::read_to_string(&path) {
                Ok(text) if !text.trim().is_empty() => ForecastStatus::Provided(text.trim().to_string()),
                Ok(_) => ForecastStatus::Unavailable,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "no forecast");
                    ForecastStatus::Unavailable
                }
            };
            (key, status)
        })
        .collect()
}

fn load_notams(path: &Path) -> HashMap<String, NotamImpact> {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| fail(format!("reading {}: {e}", path.display())));
    let map: HashMap<String, NotamImpact> =
        serde_json::from_str(&text).unwrap_or_else(|e| fail(format!("parsing {}: {e}", path.display())));
    map.into_iter().map(|(k, v)| (k.to_ascii_uppercase(), v)).collect()
}

fn print_assessment(a: &Assessment, config: &Config, show_checks: bool) {
    let p = &a.phase;
    println!();
    println!("{} FLYING PHASE: {}", a.home, p.phase);
    if p.weather_phase != p.phase {
        println!("  Weather alone: {}", p.weather_phase);
    }
    for r in &p.reasons {
        println!("  - {r}");
    }
    println!("  Solo: {}", p.solo.note);
    if p.takeoffs_forbidden {
        println!("  TAKE-OFFS FORBIDDEN");
    }

    println!();
    print_conditions(&p.conditions, &local_label(a.generated_at, config));
    if let Some(rw) = &p.runway {
        println!(
            "  Runway {}{}: xwind {:.1} kt, head {:.1} kt, tail {:.1} kt (wind {} kt)",
            rw.runway,
            if rw.manual { " (manual)" } else { "" },
            rw.crosswind_kt,
            rw.headwind_kt,
            rw.tailwind_kt,
            rw.effective_kt
        );
    }
    println!(
        "  IFR minima: {} m / {} ft ({})",
        p.ifr_minima.visibility_m,
        p.ifr_minima.ceiling_ft,
        if p.ifr_minima.basis.is_empty() { "defaults" } else { p.ifr_minima.basis.as_str() }
    );

    if show_checks {
        println!();
        let mut table = Table::new();
        table.set_header(vec!["Phase", "Visibility", "Cloud", "Wind", "Result"]);
        for c in &p.checks {
            table.add_row(vec![
                Cell::new(c.phase),
                Cell::new(&c.visibility.detail),
                Cell::new(&c.cloud.detail),
                Cell::new(&c.wind.detail),
                Cell::new(if c.passed { "yes" } else { "no" }),
            ]);
        }
        println!("{table}");
    }

    if let Some(s) = &a.sortie {
        println!();
        println!(
            "Sortie {}: {}{}",
            s.sortie_time.format("%H:%MZ"),
            s.sortie_phase,
            if s.deteriorating {
                format!(" (deteriorating from {})", s.current_phase)
            } else {
                String::new()
            }
        );
        print_window("  Window", &s.window);
    }

    println!();
    if a.alternate_required {
        println!("ALTERNATE REQUIRED: {}", a.alternate_reasons.join("; "));
    } else {
        println!("Alternate not required");
    }
    if let Some(d) = &a.alternate {
        print_alternate(d);
    }

    if !a.advisories.is_empty() {
        println!();
        println!("Advisories:");
        for adv in &a.advisories {
            println!("  - {adv}");
        }
    }
    if !a.parse_issues.is_empty() {
        println!();
        for issue in &a.parse_issues {
            eprintln!("Parse: {issue}");
        }
    }
    println!();
}

fn local_label(t: DateTime<Utc>, config: &Config) -> String {
    let local = t + Duration::hours(i64::from(config.home.utc_offset_hours));
    format!("{} ({}L)", t.format("%H:%MZ"), local.format("%H:%M"))
}

fn print_window(label: &str, w: &TimeWindow) {
    println!("{label}: [{} → {}]", w.start.format("%H:%MZ"), w.end.format("%H:%MZ"));
}

fn print_conditions(c: &ResolvedConditions, at: &str) {
    println!("Conditions at {at}:");
    let vis = c.visibility_m.map_or("-".into(), |v| format!("{v} m"));
    let ceiling = c.ceiling_ft.map_or("none".into(), |v| format!("{v} ft"));
    let wind = c.effective_wind.map_or("-".into(), |w| w.to_string());
    println!("  Visibility {vis}, ceiling {ceiling}, wind {wind}");
    if let Some(t) = c.temperature_c {
        println!("  Temperature {t}°C");
    }
    if c.cb_within_radius {
        let by: Vec<String> = c.cb_sources.iter().map(|s| s.to_string()).collect();
        println!("  CB reported ({})", by.join(", "));
    }
}

fn print_alternate(d: &AlternateDecision) {
    print_window("  Alternate window", &d.window);
    match d.selected() {
        Some(c) => {
            let provisional = matches!(
                d.outcome,
                flyphase_core::AlternateOutcome::Selected { provisional: true, .. }
            );
            println!(
                "  Selected: {} {}{}",
                c.icao,
                c.name,
                if provisional { " (PROVISIONAL)" } else { "" }
            );
            if let Some(f) = &c.fuel {
                println!("  Fuel: {f}");
            }
        }
        None => println!("  NO SUITABLE ALTERNATE"),
    }

    let mut table = Table::new();
    table.set_header(vec!["ICAO", "Dist (nm)", "Status", "Phase", "Runway", "Fuel (lbs)", "Notes"]);
    for c in &d.candidates {
        let status = match c.status {
            CandidateStatus::Suitable => "suitable",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Unassessed => "unassessed",
        };
        let mut notes: Vec<String> = c.rejection.iter().map(|r| r.to_string()).collect();
        notes.extend(c.warnings.iter().cloned());
        table.add_row(vec![
            Cell::new(&c.icao),
            Cell::new(c.distance_nm),
            Cell::new(status),
            Cell::new(c.phase.map_or("-".into(), |p| p.to_string())),
            Cell::new(c.runway.as_ref().map_or("-".into(), |r| r.runway.clone())),
            Cell::new(c.fuel.as_ref().map_or("-".into(), |f| f.total_lbs.to_string())),
            Cell::new(notes.join("; ")),
        ]);
    }
    println!("{table}");
}

// ---------------------------------------------------------------------------
// parse
// ---------------------------------------------------------------------------

fn cmd_parse(inputs: &[String], config: &Config, json: bool) {
    let ctx = ParseContext::new(Utc::now(), &config.home.icao);
    let mut reports = Vec::new();
    let mut failed = false;

    for text in read_inputs(inputs) {
        match parse_labeled(&text, &ctx) {
            Ok(r) => reports.push(r),
            Err(e) => {
                eprintln!("Error: {e}");
                eprintln!("  Input: {text}");
                failed = true;
            }
        }
    }

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(text) => println!("{text}"),
            Err(e) => fail(e),
        }
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Type", "Station", "Time", "Summary", "Issues"]);
        for r in &reports {
            let (station, time, summary) = summarize(r);
            table.add_row(vec![
                Cell::new(r.kind()),
                Cell::new(station),
                Cell::new(time),
                Cell::new(summary),
                Cell::new(r.issues().len()),
            ]);
        }
        println!("{table}");
        print_elements(&reports, config);
        for issue in reports.iter().flat_map(|r| r.issues()) {
            eprintln!("Parse: {issue}");
        }
    }

    if failed {
        std::process::exit(1);
    }
}

/// The normalized elements of every report, as the pipeline sees them.
fn print_elements(reports: &[Report], config: &Config) {
    // PIREP heights need the home elevation; without a dataset they stay AMSL
    let elevation_ft = AirfieldDataset::load(Path::new(&config.data.airfields))
        .ok()
        .and_then(|d| d.home_airfield().ok().map(|a| a.elevation_ft))
        .unwrap_or_default();
    let opts = NormalizeOptions {
        metar_staleness: config.windows.metar_staleness(),
        pirep_horizon: config.windows.pirep_horizon(),
        elevation_ft,
    };
    let fmt_time = |t: Option<DateTime<Utc>>| t.map_or("-".into(), |t| t.format("%d %H:%MZ").to_string());

    let mut table = Table::new();
    table.set_header(vec!["Source", "Kind", "Value", "From", "To"]);
    for el in reports.iter().flat_map(|r| normalize(r, &opts)) {
        table.add_row(vec![
            Cell::new(el.source()),
            Cell::new(format!("{:?}", el.kind()).to_lowercase()),
            Cell::new(el.value()),
            Cell::new(fmt_time(el.valid_from())),
            Cell::new(fmt_time(el.valid_to())),
        ]);
    }
    println!("{table}");
}

fn summarize(report: &Report) -> (String, String, String) {
    match report {
        Report::Metar(m) => (
            m.station.clone(),
            m.observed_at.format("%d %H:%MZ").to_string(),
            format!(
                "{} {} m ceiling {}",
                m.wind,
                m.visibility_m,
                m.ceiling_ft().map_or("none".into(), |c| format!("{c} ft"))
            ),
        ),
        Report::Taf(t) => (
            t.station.clone(),
            format!("{} → {}", t.valid_from.format("%d %H:%MZ"), t.valid_to.format("%d %H:%MZ")),
            format!("{} periods{}", t.periods.len(), if t.has_cb() { ", CB" } else { "" }),
        ),
        Report::Pirep(p) => (
            p.location.clone(),
            p.reported_at.format("%d %H:%MZ").to_string(),
            format!(
                "{}{} layers{}",
                if p.urgent { "URGENT " } else { "" },
                p.sky.len(),
                if p.cb_reported { ", CB" } else { "" }
            ),
        ),
    }
}

// ---------------------------------------------------------------------------
// init-config
// ---------------------------------------------------------------------------

fn cmd_init_config(config: &Config, force: bool) {
    let path = config::config_file();
    if path.exists() && !force {
        fail(format!("{} exists (use --force to overwrite)", path.display()));
    }
    let fresh = if force { Config::default() } else { config.clone() };
    match config::save_config(&fresh) {
        Ok(p) => println!("Config written to {}", p.display()),
        Err(e) => fail(e),
    }
}
