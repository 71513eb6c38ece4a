// Cooperative onboarding client
// Main library entry point

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod smoke;
pub mod tui;
pub mod utils;
pub mod wizard;

use crate::api::{PaymentProcessor, RestBackend};
use crate::config::Settings;
use crate::models::requests::BankInfoUpdateRequest;
use crate::session::SessionContext;
use crate::utils::logging::mask_account_number;
use crate::wizard::submission::CheckoutDefaults;
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(with_stdout: bool, settings: &Settings) -> Result<PathBuf> {
    let log_dir = utils::path_resolver::resolve_log_folder(settings.logging.dir.as_deref())?;
    std::fs::create_dir_all(&log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");
    let json_log_file = log_dir.join(format!("onboarding-{}.log", timestamp));
    let txt_log_file = log_dir.join(format!("onboarding-{}.txt", timestamp));

    let level = settings
        .logging
        .level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Debug);

    // stdout stays off for the terminal UI
    let mut dispatch = fern::Dispatch::new()
        .level(level)
        .level_for("hyper", log::LevelFilter::Info)
        .level_for("reqwest", log::LevelFilter::Info);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                        None,
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(log_dir)
}

/// Load settings and start logging. Exits the process when either fails.
fn bootstrap(config_path: Option<&Path>, with_stdout: bool, mode: &str) -> (Settings, PathBuf) {
    let settings = match Settings::load(config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(2);
        }
    };

    let log_dir = match init_logging(with_stdout, &settings) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::env::temp_dir()
        }
    };

    info!(
        "[PHASE: initialization] {} starting at {}",
        mode,
        chrono::Utc::now()
    );
    if let Ok(folder) = utils::path_resolver::resolve_deployment_folder() {
        info!(
            "[PHASE: initialization] [STEP: deployment_folder] Deployment folder: {:?}",
            folder
        );
    }

    (settings, log_dir)
}

/// Run a future on a fresh current-thread runtime; errors are logged and exit with 1.
fn block_on_or_exit<F>(step: &str, fut: F)
where
    F: Future<Output = Result<()>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();
    let result = match rt {
        Ok(rt) => rt.block_on(fut),
        Err(e) => Err(anyhow::anyhow!(
            "Failed to create async runtime for {}: {}",
            step,
            e
        )),
    };

    if let Err(e) = result {
        error!("[PHASE: {}] [STEP: fatal] {:#}", step, e);
        eprintln!("Onboarding error: {:#}", e);
        std::process::exit(1);
    }
}

fn session_context(settings: &Settings) -> Result<SessionContext> {
    let folder = utils::path_resolver::resolve_session_folder(settings.session.dir.as_deref())?;
    Ok(SessionContext::new(&folder))
}

/// Wire the real collaborators. Without processor credentials the wizard still runs,
/// but bank validation and paid checkouts report a configuration error.
fn build_services(settings: &Settings, sessions: Arc<SessionContext>) -> Result<tui::Services> {
    let backend = Arc::new(RestBackend::new(&settings.api)?);

    let (bank_validation, checkout) = if settings.payments_configured() {
        let processor = Arc::new(PaymentProcessor::new(
            &settings.payments,
            settings.api.timeout_secs,
        )?);
        (
            Some(processor.clone() as Arc<dyn wizard::verification::BankValidationGateway>),
            Some(processor as Arc<dyn wizard::submission::CheckoutGateway>),
        )
    } else {
        warn!(
            "[PHASE: initialization] [STEP: payments] Payment processor credentials not configured"
        );
        (None, None)
    };

    Ok(tui::Services {
        directory: backend.clone(),
        registration: backend,
        bank_validation,
        checkout,
        sessions,
        checkout_defaults: CheckoutDefaults {
            currency: settings.payments.currency.clone(),
            description: settings.payments.checkout_description.clone(),
        },
    })
}

/// Interactive terminal wizard.
pub fn run_tui(config_path: Option<&Path>) {
    let (settings, _log_dir) = bootstrap(config_path, false, "Registration wizard");

    let setup = || -> Result<(tui::Services, Option<session::SessionData>)> {
        let sessions = Arc::new(session_context(&settings)?);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let existing = rt.block_on(sessions.init());
        Ok((build_services(&settings, sessions)?, existing))
    };

    let result = setup().and_then(|(services, existing)| tui::run(services, existing));
    if let Err(e) = result {
        error!("[PHASE: tui] [STEP: fatal] TUI exited with error: {:?}", e);
        eprintln!("Onboarding error: {}", e);
        std::process::exit(1);
    }
}

/// Non-interactive TUI smoke mode (for automated checks).
/// Renders a single frame and exits.
pub fn run_tui_smoke(config_path: Option<&Path>, target: Option<String>) {
    let _ = bootstrap(config_path, false, "Headless TUI smoke");

    let target = target.as_deref().unwrap_or("welcome");
    if let Err(e) = tui::smoke(target) {
        error!(
            "[PHASE: tui] [STEP: smoke] TUI smoke exited with error: {:?}",
            e
        );
        eprintln!("Onboarding error: {}", e);
        std::process::exit(1);
    }
}

/// Deterministic end-to-end pipeline run against scripted collaborators.
/// Writes `submit_smoke_transcript.log` under the log folder.
pub fn run_submit_smoke(config_path: Option<&Path>) {
    let (_settings, log_dir) = bootstrap(config_path, false, "Submission smoke");

    block_on_or_exit("smoke", async {
        let path = smoke::submit_smoke(&log_dir).await?;
        println!("Transcript: {}", path.display());
        Ok::<(), anyhow::Error>(())
    });
}

async fn show_profile(settings: &Settings, update: Option<&Path>) -> Result<()> {
    let sessions = session_context(settings)?;
    sessions.init().await;
    let session = sessions.require().await?;
    let backend = RestBackend::new(&settings.api)?;

    if let Some(path) = update {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let mut request: BankInfoUpdateRequest =
            serde_json::from_str(&raw).context("Bank info file is not valid JSON")?;
        request.ifsc_code = request.ifsc_code.trim().to_ascii_uppercase();
        if !utils::validation::is_valid_ifsc(&request.ifsc_code) {
            return Err(error::ClientError::validation("ifsc_code", "Invalid IFSC code").into());
        }
        if !utils::validation::is_valid_account_number(&request.account_number) {
            return Err(error::ClientError::validation(
                "account_number",
                "Invalid account number",
            )
            .into());
        }
        backend.update_bank_info(&session, &request).await?;
        println!("Bank info updated.");
    }

    println!("User {} ({})", session.user_id, session.user_role);

    match backend.fetch_bank_info(&session).await {
        Ok(bank) => {
            println!("Bank:    {} / {}", bank.bank_name, bank.account_holder_name);
            println!(
                "Account: {}  IFSC: {}  verified: {}",
                mask_account_number(&bank.account_number),
                bank.ifsc_code,
                bank.verified
            );
        }
        Err(e) => {
            warn!("[PHASE: profile] [STEP: bank_info] {}", e.log_details());
            println!("Bank:    unavailable ({})", e);
        }
    }

    let lands = backend.fetch_land_details(&session).await?;
    if lands.is_empty() {
        println!("Land:    none recorded");
    }
    for land in lands {
        println!(
            "Land:    survey {}  {} acres  {}  invested {:.2}{}",
            land.survey_number,
            land.land_area,
            land.land_type,
            land.investment_amount,
            land.village
                .map(|v| format!("  village {}", v))
                .unwrap_or_default()
        );
    }
    Ok(())
}

/// Print the logged-in user's bank info and land records, optionally updating bank info
/// from a JSON file first. `verbose` mirrors the log to stdout.
pub fn run_show_profile(
    config_path: Option<&Path>,
    update_bank_info: Option<PathBuf>,
    verbose: bool,
) {
    let (settings, _) = bootstrap(config_path, verbose, "Profile");
    block_on_or_exit(
        "profile",
        show_profile(&settings, update_bank_info.as_deref()),
    );
}

/// Remove the persisted session.
pub fn run_logout(config_path: Option<&Path>, verbose: bool) {
    let (settings, _) = bootstrap(config_path, verbose, "Logout");
    block_on_or_exit("session", async {
        let sessions = session_context(&settings)?;
        sessions.init().await;
        sessions.teardown().await?;
        println!("Signed out.");
        Ok::<(), anyhow::Error>(())
    });
}

/// Write a starter config file. Without a path it goes to the user config folder.
pub fn run_write_default_config(target: Option<PathBuf>) {
    let path = target.or_else(|| {
        utils::path_resolver::resolve_config_folder().map(|d| d.join(config::CONFIG_FILE_NAME))
    });
    let Some(path) = path else {
        eprintln!("No config folder available; pass a path: --write-default-config=<path>");
        std::process::exit(2);
    };
    match Settings::write_default(&path) {
        Ok(()) => println!("Wrote {}", path.display()),
        Err(e) => {
            eprintln!("Onboarding error: {:#}", e);
            std::process::exit(1);
        }
    }
}
