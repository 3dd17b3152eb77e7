use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use noq_request::api::{ApiError, ApiGateway, HttpGateway, TypeaheadQuery};
use noq_request::cli::{self, AuthArgs, Commands, ConfigArgs, SearchArgs, SessionAction};
use noq_request::config::{self, Settings};
use noq_request::session::SessionStore;
use noq_request::tui::{App, ExitReason, run_tui};

fn main() -> Result<()> {
    let args = cli::parse_args();
    let session_db = config::session_db_path()?;
    init_logging(&session_db, args.verbose)?;

    match args.command {
        None | Some(Commands::New) => handle_new(&session_db)?,
        Some(Commands::Providers) => handle_providers()?,
        Some(Commands::Search(search_args)) => handle_search(&search_args)?,
        Some(Commands::Auth(auth_args)) => handle_auth(&auth_args)?,
        Some(Commands::Config(config_args)) => handle_config(&config_args)?,
        Some(Commands::Session { action }) => match action {
            SessionAction::Show => handle_session_show(&session_db)?,
            SessionAction::Clear => handle_session_clear(&session_db)?,
        },
    }

    Ok(())
}

/// Send logs to a file next to the session store; the TUI owns the terminal.
fn init_logging(session_db: &Path, verbose: bool) -> Result<()> {
    let log_path = config::log_file_path(session_db);
    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_settings() -> Result<Settings> {
    let cfg = config::load_config()?;
    Ok(Settings::resolve(&cfg))
}

fn connect() -> Result<(Settings, HttpGateway)> {
    let settings = load_settings()?;
    if settings.token.is_none() {
        bail!("No access token configured. Run 'noq-request auth' first");
    }
    let gateway = HttpGateway::new(&settings)?;
    tracing::debug!(api_url = %settings.api_url, "gateway ready");
    Ok((settings, gateway))
}

/// Handle the default command - run the request wizard.
fn handle_new(session_db: &Path) -> Result<()> {
    let (settings, gateway) = connect()?;
    let session = SessionStore::open(session_db)?;
    let app = App::new(Arc::new(gateway), session, settings.typeahead_debounce);

    match run_tui(app)? {
        ExitReason::Cancelled => {}
        ExitReason::Submitted(receipt) => {
            println!("✓ Request {} submitted", receipt.request_id);
            if let Some(url) = receipt.request_url {
                println!("  {}", url);
            }
        }
        ExitReason::SessionExpired => return Err(ApiError::SessionExpired.into()),
    }
    Ok(())
}

fn handle_providers() -> Result<()> {
    let (_, gateway) = connect()?;
    let providers = gateway.configured_providers()?;

    if providers.is_empty() {
        println!("No providers are configured");
        return Ok(());
    }
    for p in providers {
        println!("{:<12} {}", p.provider, p.sub_type);
    }
    Ok(())
}

fn handle_search(args: &SearchArgs) -> Result<()> {
    let (_, gateway) = connect()?;
    let hits = gateway.resource_typeahead(&TypeaheadQuery {
        provider: args.provider.clone(),
        template_id: args.template_id.clone(),
        field: args.field.clone(),
        prefix: args.prefix.clone(),
    })?;

    if hits.is_empty() {
        println!("No matches for '{}'", args.prefix);
        return Ok(());
    }
    for hit in hits {
        if hit.label == hit.value {
            println!("{}", hit.value);
        } else {
            println!("{:<40} {}", hit.label, hit.value);
        }
    }
    Ok(())
}

fn handle_auth(args: &AuthArgs) -> Result<()> {
    let token = rpassword::prompt_password("Noq access token: ")
        .context("Failed to read token")?
        .trim()
        .to_string();
    if token.is_empty() {
        bail!("Token cannot be empty");
    }

    let mut cfg = config::load_config()?;
    cfg.token = Some(token);
    if args.csrf {
        let csrf = rpassword::prompt_password("CSRF token: ")
            .context("Failed to read CSRF token")?
            .trim()
            .to_string();
        cfg.csrf_token = (!csrf.is_empty()).then_some(csrf);
    }
    config::save_config(&cfg)?;

    println!("✓ Token saved to {}", config::config_path()?.display());
    Ok(())
}

fn handle_config(args: &ConfigArgs) -> Result<()> {
    let mut cfg = config::load_config()?;
    let mut changed = false;

    if let Some(url) = &args.api_url {
        let url = url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("API URL must start with http:// or https://");
        }
        cfg.api_url = Some(url.trim_end_matches('/').to_string());
        changed = true;
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            bail!("Timeout must be at least 1 second");
        }
        cfg.timeout_secs = Some(timeout);
        changed = true;
    }

    if changed {
        config::save_config(&cfg)?;
        println!("✓ Configuration updated");
    }

    if args.show || !changed {
        let settings = Settings::resolve(&cfg);
        let set = |v: &Option<String>| if v.is_some() { "set" } else { "not set" };
        println!("Config file:  {}", config::config_path()?.display());
        println!("API URL:      {}", settings.api_url);
        println!("Token:        {}", set(&settings.token));
        println!("CSRF token:   {}", set(&settings.csrf_token));
        println!("Timeout:      {}s", settings.timeout.as_secs());
        println!("Debounce:     {}ms", settings.typeahead_debounce.as_millis());
    }
    Ok(())
}

fn handle_session_show(session_db: &Path) -> Result<()> {
    if !session_db.exists() {
        println!("No session data");
        return Ok(());
    }

    let store = SessionStore::open(session_db)?;
    let entries = store.entries()?;
    if entries.is_empty() {
        println!("No session data");
        return Ok(());
    }

    println!("Session store: {}", session_db.display());
    println!("─────────────────────────────────────");
    for entry in entries {
        println!("  {:<36} {}  {}", entry.feature, entry.updated_at, entry.value);
    }
    Ok(())
}

fn handle_session_clear(session_db: &Path) -> Result<()> {
    if !session_db.exists() {
        println!("No session data to clear");
        return Ok(());
    }

    let mut store = SessionStore::open(session_db)?;
    let count = store.clear_all()?;
    println!("✓ Cleared {} session entries", count);
    Ok(())
}
