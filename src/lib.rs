pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    add_category_impl, dispatch, export_config_impl, get_config_impl, get_stats_impl,
    import_config_impl, initialize_impl, remove_category_impl, set_category_color_impl,
    stop_scheduler_impl, update_settings_impl, AppState, Command, CommandResponse,
    SettingsUpdate,
};
use application::event_scanner::ScanWindow;
use chrono::{DateTime, Duration, Local, Utc};
pub use cli::{Cli, Commands};
use infrastructure::calendar_host::{CalendarHost, CalendarItem, ItemKind, ItemQuery};
use infrastructure::error::InfraError;
use infrastructure::sqlite_calendar_host::SqliteCalendarHost;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

pub async fn run(cli: Cli) -> ExitCode {
    match execute(cli).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<String, String> {
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    let state = Arc::new(AppState::new(workspace_root).map_err(|error| error.to_string())?);

    match cli.command {
        Commands::Run { startup_delay_secs } => run_service(&state, startup_delay_secs).await,
        Commands::Scan { force } => {
            let command = if force { Command::ForceScan } else { Command::Scan };
            send(&state, command).await
        }
        Commands::Stats => {
            let stats =
                get_stats_impl(&state).map_err(|error| state.command_error("stats", &error))?;
            to_json(&stats)
        }
        Commands::Reset => {
            let category_names = get_config_impl(&state)
                .map_err(|error| state.command_error("reset_categories", &error))?
                .categories
                .names();
            send(&state, Command::ResetCategories { category_names }).await
        }
        Commands::Config => {
            let config =
                get_config_impl(&state).map_err(|error| state.command_error("config", &error))?;
            to_json(&config)
        }
        Commands::Export { file } => export(&state, file),
        Commands::Import { file } => import(&state, file),
        Commands::AddCategory { keyword, color } => {
            let config = add_category_impl(&state, &keyword, &color)
                .map_err(|error| state.command_error("add_category", &error))?;
            to_json(&config.categories)
        }
        Commands::RemoveCategory { keyword } => {
            let config = remove_category_impl(&state, &keyword)
                .map_err(|error| state.command_error("remove_category", &error))?;
            to_json(&config.categories)
        }
        Commands::SetColor { keyword, color } => {
            let config = set_category_color_impl(&state, &keyword, &color)
                .map_err(|error| state.command_error("set_category_color", &error))?;
            to_json(&config.categories)
        }
        Commands::Settings {
            days_back,
            days_forward,
            interval,
            full_width_colors,
        } => {
            let settings = SettingsUpdate {
                days_back,
                days_forward,
                interval_minutes: interval,
                full_width_colors,
            };
            let config = if settings.is_empty() {
                get_config_impl(&state)
            } else {
                update_settings_impl(&state, &settings)
            }
            .map_err(|error| state.command_error("update_settings", &error))?;
            to_json(&config)
        }
        Commands::AddCalendar {
            id,
            name,
            read_only,
        } => {
            SqliteCalendarHost::new(state.database_path())
                .add_calendar(&id, &name, read_only)
                .map_err(|error| state.command_error("add_calendar", &error))?;
            Ok(format!("calendar {id} saved"))
        }
        Commands::AddEvent {
            calendar,
            title,
            start,
            minutes,
            id,
            categories,
        } => add_event(&state, calendar, title, &start, minutes, id, categories),
        Commands::Events => list_events(&state).await,
    }
}

async fn send(state: &Arc<AppState>, command: Command) -> Result<String, String> {
    let name = command.name();
    let response = dispatch(state, command)
        .await
        .map_err(|error| state.command_error(name, &error))?;
    match response {
        CommandResponse::Scanned(result) => to_json(&result),
        other => to_json(&other),
    }
}

async fn run_service(state: &Arc<AppState>, startup_delay_secs: u64) -> Result<String, String> {
    let startup_delay = tokio::time::Duration::from_secs(startup_delay_secs);
    let initialized = tokio::select! {
        result = initialize_impl(state, startup_delay) => {
            result.map_err(|error| state.command_error("initialize", &error))?
        }
        result = tokio::signal::ctrl_c() => {
            result.map_err(|error| error.to_string())?;
            return Ok(String::new());
        }
    };
    println!("{}", to_json(&initialized)?);

    wait_for_shutdown(state).await?;
    stop_scheduler_impl(state).map_err(|error| state.command_error("shutdown", &error))?;
    state.log_info("shutdown", "stopped");
    Ok(String::new())
}

#[cfg(unix)]
async fn wait_for_shutdown(state: &Arc<AppState>) -> Result<(), String> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).map_err(|error| error.to_string())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return result.map_err(|error| error.to_string()),
            _ = hangup.recv() => {
                if let Err(error) = dispatch(state, Command::ReloadConfig).await {
                    state.command_error("reload_config", &error);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_state: &Arc<AppState>) -> Result<(), String> {
    tokio::signal::ctrl_c().await.map_err(|error| error.to_string())
}

fn export(state: &AppState, file: PathBuf) -> Result<String, String> {
    let exported =
        export_config_impl(state).map_err(|error| state.command_error("export_config", &error))?;
    fs::write(&file, exported)
        .map_err(|error| state.command_error("export_config", &InfraError::from(error)))?;
    Ok(format!("configuration exported to {}", file.display()))
}

fn import(state: &Arc<AppState>, file: PathBuf) -> Result<String, String> {
    let raw = fs::read_to_string(&file)
        .map_err(|error| state.command_error("import_config", &InfraError::from(error)))?;
    let config = import_config_impl(state, &raw)
        .map_err(|error| state.command_error("import_config", &error))?;
    Ok(format!(
        "imported {} categories from {}",
        config.categories.len(),
        file.display()
    ))
}

fn add_event(
    state: &AppState,
    calendar: String,
    title: String,
    start: &str,
    minutes: i64,
    id: Option<String>,
    categories: Vec<String>,
) -> Result<String, String> {
    let start_at = DateTime::parse_from_rfc3339(start.trim())
        .map_err(|error| {
            state.command_error(
                "add_event",
                &InfraError::Validation(format!("start must be RFC 3339: {error}")),
            )
        })?
        .with_timezone(&Utc);
    let id = id.unwrap_or_else(|| format!("evt-{}", Utc::now().timestamp_micros()));
    let item = CalendarItem {
        id: id.clone(),
        kind: ItemKind::Event,
        title,
        categories,
        start_at,
        end_at: start_at + Duration::minutes(minutes.max(0)),
        recurrence_id: None,
    };
    SqliteCalendarHost::new(state.database_path())
        .add_item(&calendar, &item)
        .map_err(|error| state.command_error("add_event", &error))?;
    Ok(format!("event {id} saved"))
}

#[derive(Debug, Serialize)]
struct EventListing {
    calendar: String,
    title: String,
    start_at: String,
    categories: Vec<String>,
}

async fn list_events(state: &AppState) -> Result<String, String> {
    let config = get_config_impl(state).map_err(|error| state.command_error("events", &error))?;
    let window = ScanWindow::around(&Local::now(), config.days_back, config.days_forward);
    let host = SqliteCalendarHost::new(state.database_path());
    let query = ItemQuery::events_between(window.start, window.end);

    let mut listing = Vec::new();
    let calendars = host
        .list_calendars()
        .await
        .map_err(|error| state.command_error("events", &error))?;
    for calendar in calendars {
        let items = host
            .get_items(&calendar.id, &query)
            .await
            .map_err(|error| state.command_error("events", &error))?;
        listing.extend(items.into_iter().map(|item| EventListing {
            calendar: calendar.name.clone(),
            title: item.title,
            start_at: item.start_at.to_rfc3339(),
            categories: item.categories,
        }));
    }
    to_json(&listing)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|error| error.to_string())
}
