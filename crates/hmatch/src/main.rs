#![forbid(unsafe_code)]

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hemomatch_core::config::{EngineConfig, CONFIG_FILE, DEFAULT_STATE_DIR};
use hemomatch_core::model::{Donor, Preset, Request, WeightTriple};
use hemomatch_core::traits::SnapshotReadiness;
use hemomatch_core::types::Outcome;
use hemomatch_engine::ledger::atomic::StateLock;
use hemomatch_engine::ledger::chain::{create_checkpoint, verify_chain, verify_checkpoint};
use hemomatch_engine::ledger::store::{save_weights, StateDir};
use hemomatch_engine::ledger::writer::EngineSession;
use hemomatch_engine::ledger::LedgerEvent;
use hemomatch_engine::scoring::urgency::UrgencyScorer;
use hemomatch_engine::tracker::performance::TimeWindow;
use hemomatch_engine::weights::config::{WeightConfig, WeightVersion};

#[derive(Parser)]
#[command(
    name = "hmatch",
    version,
    about = "Rank blood donors against requests by urgency, readiness and distance."
)]
struct Cli {
    /// State directory holding config, weight history and match ledger.
    #[arg(long, global = true, env = "HEMOMATCH_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    /// Override the distance radius (km) from config.json.
    #[arg(long, global = true)]
    max_km: Option<f64>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the state directory with a default config and weight history.
    Init {
        /// Overwrite an existing config.json.
        #[arg(long)]
        force: bool,
    },

    /// Inspect or change the active scoring weights.
    Weights {
        #[command(subcommand)]
        action: WeightsCmd,
    },

    /// Compute the Request Urgency Score for a request.
    Score {
        /// Path to request .json (or "-" for stdin).
        #[arg(default_value = "-")]
        file: String,

        /// Show every factor that went into the score.
        #[arg(long)]
        explain: bool,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rank donors for a request, best match first.
    Rank {
        /// Path to request .json.
        request: String,

        /// Path to donors .json (an array of donors with readiness scores).
        donors: String,

        /// Keep at most this many candidates.
        #[arg(long)]
        limit: Option<usize>,

        /// Drop donors whose blood type cannot give to the request.
        #[arg(long)]
        compatible_only: bool,

        /// Append the returned matches to the ledger as pending.
        #[arg(long)]
        record: bool,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Record the outcome of a pending match.
    Outcome {
        request_id: String,
        donor_id: String,

        /// successful or unsuccessful.
        outcome: Outcome,

        /// Minutes from match to donor response.
        #[arg(long)]
        minutes: f64,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Aggregate match performance over a time window.
    Snapshot {
        /// Window start (RFC 3339, inclusive).
        #[arg(long, conflicts_with = "last_hours")]
        since: Option<DateTime<Utc>>,

        /// Window end (RFC 3339, exclusive).
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Trailing window of this many hours ending now.
        #[arg(long)]
        last_hours: Option<i64>,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Donors ordered by current readiness and donations.
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate request and donor documents against the input schema.
    Check {
        /// One or more .json file paths.
        #[arg(required = true)]
        files: Vec<String>,

        /// Output structured JSON reports.
        #[arg(long)]
        json: bool,

        /// Fail on warnings (not just errors).
        #[arg(long)]
        strict: bool,
    },

    /// Verify or checkpoint the match ledger.
    Ledger {
        #[command(subcommand)]
        action: LedgerCmd,
    },
}

#[derive(Subcommand)]
enum WeightsCmd {
    /// Show the active weight version.
    Show {
        #[arg(long)]
        json: bool,
    },

    /// Publish a manual weight triple.
    Set {
        #[arg(long)]
        rus: f64,
        #[arg(long)]
        drs: f64,
        #[arg(long)]
        distance: f64,
        #[arg(long)]
        json: bool,
    },

    /// Publish a named preset.
    Preset {
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// List every published version, oldest first.
    History {
        #[arg(long)]
        json: bool,
    },

    /// List the built-in presets.
    Presets,
}

#[derive(Subcommand)]
enum LedgerCmd {
    /// Verify the hash chain and any checkpoint.
    Verify {
        #[arg(long)]
        json: bool,
    },

    /// Record the current chain head.
    Checkpoint,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let ctx = Globals::new(cli.state_dir, cli.max_km);

    match cli.cmd {
        Cmd::Init { force } => cmd_init(&ctx, force),

        Cmd::Weights { action } => match action {
            WeightsCmd::Show { json } => cmd_weights_show(&ctx, json),
            WeightsCmd::Set {
                rus,
                drs,
                distance,
                json,
            } => cmd_weights_set(&ctx, WeightTriple::new(rus, drs, distance), json),
            WeightsCmd::Preset { name, json } => cmd_weights_preset(&ctx, &name, json),
            WeightsCmd::History { json } => cmd_weights_history(&ctx, json),
            WeightsCmd::Presets => cmd_presets(),
        },

        Cmd::Score {
            file,
            explain,
            json,
        } => cmd_score(&file, explain, json),

        Cmd::Rank {
            request,
            donors,
            limit,
            compatible_only,
            record,
            json,
        } => cmd_rank(&ctx, &request, &donors, limit, compatible_only, record, json),

        Cmd::Outcome {
            request_id,
            donor_id,
            outcome,
            minutes,
            json,
        } => cmd_outcome(&ctx, &request_id, &donor_id, outcome, minutes, json),

        Cmd::Snapshot {
            since,
            until,
            last_hours,
            json,
        } => cmd_snapshot(&ctx, since, until, last_hours, json),

        Cmd::Leaderboard { limit, json } => cmd_leaderboard(&ctx, limit, json),

        Cmd::Check {
            files,
            json,
            strict,
        } => cmd_check(&files, json, strict),

        Cmd::Ledger { action } => match action {
            LedgerCmd::Verify { json } => cmd_ledger_verify(&ctx, json),
            LedgerCmd::Checkpoint => cmd_ledger_checkpoint(&ctx),
        },
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_env("HEMOMATCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
    }
}

/// Resolved global options shared by every command.
struct Globals {
    state_dir: PathBuf,
    max_km: Option<f64>,
}

impl Globals {
    fn new(state_dir: PathBuf, max_km: Option<f64>) -> Self {
        Self { state_dir, max_km }
    }

    fn config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::load(&self.state_dir)?;
        if let Some(km) = self.max_km {
            config.max_relevant_km = km;
            config.validate().context("invalid --max-km")?;
        }
        Ok(config)
    }

    fn open(&self) -> Result<EngineSession> {
        EngineSession::open(&self.state_dir, self.config()?)
    }

    fn open_for_write(&self) -> Result<EngineSession> {
        EngineSession::open_for_write(&self.state_dir, self.config()?)
    }
}

// ── Input documents ─────────────────────────────────────────────

fn read_json(file: &str) -> Result<Value> {
    let content = if file == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("cannot read {file}"))?
    };
    serde_json::from_str(&content).with_context(|| format!("{file}: invalid JSON"))
}

/// Parse a document after it passes the schema check; warnings are logged.
fn load_document<T: serde::de::DeserializeOwned>(file: &str) -> Result<T> {
    let data = read_json(file)?;
    let report = hemomatch_core::schema::check(&data, file, false, Utc::now());
    for w in &report.warnings {
        warn!(file, code = %w.code, path = w.path.as_deref().unwrap_or(""), "{}", w.message);
    }
    if !report.pass {
        let msgs: Vec<String> = report
            .errors
            .iter()
            .map(|e| format!("  {} {}: {}", e.code, e.path.as_deref().unwrap_or("(root)"), e.message))
            .collect();
        bail!("{file} failed validation:\n{}", msgs.join("\n"));
    }
    serde_json::from_value(data).with_context(|| format!("{file}: unexpected document shape"))
}

// ── Commands ────────────────────────────────────────────────────

fn cmd_init(ctx: &Globals, force: bool) -> Result<()> {
    let state = StateDir::new(&ctx.state_dir);
    state.ensure()?;
    let lock = StateLock::acquire(state.root())?;

    let config_path = state.root().join(CONFIG_FILE);
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    let mut config = EngineConfig::default();
    if let Some(km) = ctx.max_km {
        config.max_relevant_km = km;
    }
    config.validate()?;
    config.save(state.root())?;
    eprintln!("created {}", config_path.display());

    if !state.weights_path().exists() {
        let weights = WeightConfig::new(config.initial_preset);
        hemomatch_engine::ledger::chain::append_event(
            &state.ledger_path(),
            &LedgerEvent::WeightsPublished {
                version: (*weights.current()).clone(),
            },
        )?;
        save_weights(&state.weights_path(), &weights)?;
        eprintln!("created {}", state.weights_path().display());
    }
    lock.release()
}

fn print_version(v: &WeightVersion, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(v)?);
    } else {
        println!("  version {}  {}", v.version, v.weights);
    }
    Ok(())
}

fn cmd_weights_show(ctx: &Globals, json: bool) -> Result<()> {
    let session = ctx.open()?;
    print_version(&session.weights().current(), json)
}

fn cmd_weights_set(ctx: &Globals, triple: WeightTriple, json: bool) -> Result<()> {
    let session = ctx.open_for_write()?;
    let version = session.set_weights(triple)?;
    eprintln!("  ok  published version {}", version.version);
    print_version(&version, json)?;
    session.close()
}

fn cmd_weights_preset(ctx: &Globals, name: &str, json: bool) -> Result<()> {
    let session = ctx.open_for_write()?;
    let version = session.apply_preset(name)?;
    eprintln!("  ok  preset {name} published as version {}", version.version);
    print_version(&version, json)?;
    session.close()
}

fn cmd_weights_history(ctx: &Globals, json: bool) -> Result<()> {
    let session = ctx.open()?;
    let history = session.weights().history();
    let active = session.weights().current().version;
    if json {
        let out = serde_json::json!({
            "active": active,
            "versions": history,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for v in &history {
            let marker = if v.version == active { "*" } else { " " };
            println!(
                "{marker} {:>3}  {}  {}",
                v.version,
                v.published_at.format("%Y-%m-%d %H:%M:%S"),
                v.weights
            );
        }
    }
    Ok(())
}

fn cmd_presets() -> Result<()> {
    for preset in Preset::ALL {
        println!(
            "  {:<18} {}  {}",
            preset.name(),
            preset.weights(),
            preset.description()
        );
    }
    Ok(())
}

fn cmd_score(file: &str, explain: bool, json: bool) -> Result<()> {
    let request: Request = load_document(file)?;
    let breakdown = UrgencyScorer.breakdown_at(&request, Utc::now());

    if json {
        let mut out = serde_json::json!({
            "request_id": request.id,
            "rus": breakdown.rus,
        });
        if explain {
            out["breakdown"] = serde_json::to_value(breakdown)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("  {}  RUS {}", request.id, breakdown.rus);
        if explain {
            println!("    blood type     {}", request.blood_type);
            println!("    age            {:.2} h", breakdown.age_hours);
            println!("    rarity         {:.2}", breakdown.rarity_factor);
            println!("    time factor    {:.3}", breakdown.time_factor);
            println!("    urgency        {:.2} ({})", breakdown.urgency_multiplier, request.urgency_level);
            println!("    base score     {:.2}", breakdown.base_score);
            println!("    raw score      {:.2}", breakdown.raw_score);
        }
    }
    Ok(())
}

fn cmd_rank(
    ctx: &Globals,
    request_file: &str,
    donors_file: &str,
    limit: Option<usize>,
    compatible_only: bool,
    record: bool,
    json: bool,
) -> Result<()> {
    let request: Request = load_document(request_file)?;
    let mut donors: Vec<Donor> = load_document(donors_file)?;
    if compatible_only {
        donors.retain(|d| d.blood_type.can_donate_to(&request.blood_type));
    }
    let readiness = SnapshotReadiness::from_donors(&donors);

    let session = if record {
        ctx.open_for_write()?
    } else {
        ctx.open()?
    };
    let ranked = session.rank(readiness, &request, &donors, limit, record, Utc::now())?;
    let weights_version = ranked
        .first()
        .map(|r| r.record.weights_version)
        .unwrap_or_else(|| session.weights().current().version);

    if json {
        let out = serde_json::json!({
            "request_id": request.id,
            "weights_version": weights_version,
            "recorded": record,
            "candidates": ranked,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "  {} ({}, {})  weights v{weights_version}",
            request.id, request.blood_type, request.urgency_level
        );
        if ranked.is_empty() {
            println!("  (no candidates)");
        }
        for (i, r) in ranked.iter().enumerate() {
            println!(
                "  {:>3}. {:<16} score {:>8.2}  rus {:>3}  drs {:>5.1}  dist {:.3}",
                i + 1,
                r.donor.id,
                r.record.match_score,
                r.record.rus,
                r.record.drs,
                r.record.distance_factor
            );
        }
    }
    if record {
        eprintln!("  ok  recorded {} match(es)", ranked.len());
    }
    session.close()
}

fn cmd_outcome(
    ctx: &Globals,
    request_id: &str,
    donor_id: &str,
    outcome: Outcome,
    minutes: f64,
    json: bool,
) -> Result<()> {
    let session = ctx.open_for_write()?;
    let record = session.record_outcome(request_id, donor_id, outcome, minutes)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        eprintln!("  ok  {request_id}/{donor_id} -> {outcome} after {minutes} min");
    }
    session.close()
}

fn cmd_snapshot(
    ctx: &Globals,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    last_hours: Option<i64>,
    json: bool,
) -> Result<()> {
    let window = match last_hours {
        Some(h) if h <= 0 => bail!("--last-hours must be positive"),
        Some(h) => {
            let trailing = Duration::try_hours(h)
                .and_then(|span| TimeWindow::trailing(span, Utc::now()))
                .with_context(|| format!("--last-hours {h} is out of range"))?;
            TimeWindow { to: until, ..trailing }
        }
        None => TimeWindow { from: since, to: until },
    };
    let session = ctx.open()?;
    let snap = session.tracker().snapshot(window);

    if json {
        println!("{}", serde_json::to_string_pretty(&snap)?);
    } else {
        println!("  matches           {}", snap.match_count);
        println!(
            "  outcomes          {} successful, {} unsuccessful, {} pending",
            snap.successful_count, snap.unsuccessful_count, snap.pending_count
        );
        println!("  success rate      {:.1}%", snap.success_rate * 100.0);
        println!("  avg match score   {:.2}", snap.average_match_score);
        println!("  avg RUS           {:.2}", snap.rus_average);
        println!("  avg DRS           {:.2}", snap.drs_average);
        println!("  avg response      {:.1} min", snap.average_response_time);
        if !snap.recent_matches.is_empty() {
            println!("  recent:");
            for r in &snap.recent_matches {
                println!(
                    "    {}  {}/{}  {:.2}  {}",
                    r.timestamp.format("%Y-%m-%d %H:%M"),
                    r.request_id,
                    r.donor_id,
                    r.match_score,
                    r.outcome
                );
            }
        }
    }
    Ok(())
}

fn cmd_leaderboard(ctx: &Globals, limit: usize, json: bool) -> Result<()> {
    let session = ctx.open()?;
    let standings = session.tracker().leaderboard(limit);
    if json {
        println!("{}", serde_json::to_string_pretty(&standings)?);
    } else {
        for (i, s) in standings.iter().enumerate() {
            println!(
                "  {:>3}. {:<16} drs {:>5.1}  donations {:>3}  matches {:>3}",
                i + 1,
                s.donor_id,
                s.drs,
                s.donation_count,
                s.match_count
            );
        }
    }
    Ok(())
}

fn cmd_check(files: &[String], json: bool, strict: bool) -> Result<()> {
    let now = Utc::now();
    let mut reports = Vec::new();
    for file in files {
        let data = read_json(file)?;
        reports.push(hemomatch_core::schema::check(&data, file, strict, now));
    }

    if json {
        let out = if reports.len() == 1 {
            serde_json::to_value(&reports[0])?
        } else {
            serde_json::to_value(&reports)?
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for report in &reports {
            if report.pass {
                eprintln!("  ok  {} ({})", report.file, report.kind);
            } else {
                eprintln!("  FAIL {} ({})", report.file, report.kind);
            }
            for e in &report.errors {
                eprintln!(
                    "  error {}: {} {}",
                    e.code,
                    e.message,
                    e.path.as_deref().unwrap_or("")
                );
            }
            for w in &report.warnings {
                eprintln!(
                    "  warn  {}: {} {}",
                    w.code,
                    w.message,
                    w.path.as_deref().unwrap_or("")
                );
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.pass).count();
    if failed > 0 {
        bail!("{failed} file(s) failed check");
    }
    Ok(())
}

fn cmd_ledger_verify(ctx: &Globals, json: bool) -> Result<()> {
    let state = StateDir::new(&ctx.state_dir);
    let ledger = state.ledger_path();
    let entries = if ledger.exists() {
        verify_chain(&ledger)?
    } else {
        0
    };
    let checkpoint = checkpoint_status(&ledger, &state.checkpoint_path())?;

    if json {
        let out = serde_json::json!({
            "ledger": ledger.display().to_string(),
            "entries": entries,
            "chain_valid": true,
            "checkpoint_valid": checkpoint,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        eprintln!("  ok  {} entries, chain intact", entries);
        match checkpoint {
            Some(true) => eprintln!("  ok  checkpoint matches"),
            Some(false) => eprintln!("  FAIL checkpoint does not match ledger"),
            None => {}
        }
    }
    if checkpoint == Some(false) {
        bail!("ledger diverges from checkpoint");
    }
    Ok(())
}

fn checkpoint_status(ledger: &Path, checkpoint: &Path) -> Result<Option<bool>> {
    if !checkpoint.exists() {
        return Ok(None);
    }
    if !ledger.exists() {
        return Ok(Some(false));
    }
    verify_checkpoint(ledger, checkpoint).map(Some)
}

fn cmd_ledger_checkpoint(ctx: &Globals) -> Result<()> {
    let state = StateDir::new(&ctx.state_dir);
    if !state.ledger_path().exists() {
        bail!("no ledger at {}", state.ledger_path().display());
    }
    let lock = StateLock::acquire(state.root())?;
    let cp = create_checkpoint(&state.ledger_path(), &state.checkpoint_path())?;
    println!("{}", serde_json::to_string_pretty(&cp)?);
    eprintln!("  ok  checkpoint at entry {}", cp.entries);
    lock.release()
}
