use std::path::PathBuf;

/// Value of `--flag=value`, or of `--flag value` when `takes_next` is set.
fn flag_value(args: &[String], flag: &str, takes_next: bool) -> Option<String> {
    let prefix = format!("{}=", flag);
    for (i, a) in args.iter().enumerate() {
        if let Some(v) = a.strip_prefix(&prefix) {
            return Some(v.to_string()).filter(|v| !v.trim().is_empty());
        }
        if takes_next && a == flag {
            return args.get(i + 1).cloned();
        }
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    let prefix = format!("{}=", flag);
    args.iter().any(|a| a == flag || a.starts_with(&prefix))
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config_path = flag_value(&args, "--config", true).map(PathBuf::from);
    let config = config_path.as_deref();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");

    // Writes a starter coop-onboarding.toml and exits.
    if has_flag(&args, "--write-default-config") {
        let target = flag_value(&args, "--write-default-config", false).map(PathBuf::from);
        coop_onboarding::run_write_default_config(target);
        return;
    }

    // Deterministic pipeline run against scripted collaborators.
    // Writes `submit_smoke_transcript.log` under the log folder and exits 0/1.
    if args.iter().any(|a| a == "--submit-smoke") {
        coop_onboarding::run_submit_smoke(config);
        return;
    }

    // Non-interactive TUI smoke test mode (for automated checks).
    // Usage: --tui-smoke or --tui-smoke=welcome|personal|documents|bank|details|service|payment|retry|complete
    if has_flag(&args, "--tui-smoke") {
        let target = flag_value(&args, "--tui-smoke", false);
        coop_onboarding::run_tui_smoke(config, target);
        return;
    }

    // Account maintenance for the stored session.
    if args.iter().any(|a| a == "--show-profile") || has_flag(&args, "--update-bank-info") {
        let update = flag_value(&args, "--update-bank-info", true).map(PathBuf::from);
        coop_onboarding::run_show_profile(config, update, verbose);
        return;
    }

    if args.iter().any(|a| a == "--logout") {
        coop_onboarding::run_logout(config, verbose);
        return;
    }

    coop_onboarding::run_tui(config);
}
