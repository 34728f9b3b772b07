use crate::application::bootstrap::bootstrap_workspace;
use crate::application::category_applier::CategoryApplier;
use crate::application::category_registry::CategoryRegistry;
use crate::application::event_scanner::Clock;
use crate::application::scheduler::ScanScheduler;
use crate::domain::models::{
    AutotagConfig, CategoryColorMap, EnsureCategoriesResult, RemoveCategoriesResult, Rule,
    ScanResult,
};
use crate::domain::rules::ApplyMode;
use crate::infrastructure::calendar_host::CalendarHost;
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::config::{export_config, import_config, load_config, save_config};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::preference_store::{PreferenceStore, SqlitePreferenceStore};
use crate::infrastructure::scan_result_repository::{
    ScanResultRepository, SqliteScanResultRepository,
};
use crate::infrastructure::sqlite_calendar_host::SqliteCalendarHost;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{sleep, Duration};

pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 5;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    log: Arc<CommandLog>,
    config: Mutex<AutotagConfig>,
    calendar_host: Arc<dyn CalendarHost>,
    preferences: Arc<dyn PreferenceStore>,
    scan_results: Arc<dyn ScanResultRepository>,
    clock: Option<Clock>,
    scan_lock: tokio::sync::Mutex<()>,
    scheduler: Mutex<ScanScheduler>,
    scheduling: AtomicBool,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = load_config(&bootstrap.config_dir)?;
        let database_path = bootstrap.database_path;

        Ok(Self {
            config_dir: bootstrap.config_dir,
            log: Arc::new(CommandLog::new(&bootstrap.logs_dir)),
            config: Mutex::new(config),
            calendar_host: Arc::new(SqliteCalendarHost::new(&database_path)),
            preferences: Arc::new(SqlitePreferenceStore::new(&database_path)),
            scan_results: Arc::new(SqliteScanResultRepository::new(&database_path)),
            database_path,
            clock: None,
            scan_lock: tokio::sync::Mutex::new(()),
            scheduler: Mutex::new(ScanScheduler::new()),
            scheduling: AtomicBool::new(false),
        })
    }

    pub fn with_calendar_host(mut self, calendar_host: Arc<dyn CalendarHost>) -> Self {
        self.calendar_host = calendar_host;
        self
    }

    pub fn with_scan_results(mut self, scan_results: Arc<dyn ScanResultRepository>) -> Self {
        self.scan_results = scan_results;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn log(&self) -> Arc<CommandLog> {
        Arc::clone(&self.log)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.log.info(command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.log.error(command, message);
    }

    fn now(&self) -> DateTime<Utc> {
        match &self.clock {
            Some(clock) => clock().with_timezone(&Utc),
            None => Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReloadConfigResponse {
    pub categories: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensured: Option<EnsureCategoriesResult>,
    pub interval_minutes: u32,
    pub full_width_colors: bool,
    pub scheduler_running: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_scan: Option<ScanResult>,
    pub interval_minutes: u32,
    pub scheduler_running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub days_back: Option<u32>,
    pub days_forward: Option<u32>,
    pub interval_minutes: Option<u32>,
    pub full_width_colors: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply_to(&self, config: &mut AutotagConfig) {
        if let Some(days_back) = self.days_back {
            config.days_back = days_back;
        }
        if let Some(days_forward) = self.days_forward {
            config.days_forward = days_forward;
        }
        if let Some(interval_minutes) = self.interval_minutes {
            config.interval_minutes = interval_minutes;
        }
        if let Some(full_width_colors) = self.full_width_colors {
            config.full_width_colors = full_width_colors;
        }
    }
}

/// Requests understood by a running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ReloadConfig,
    Scan,
    ForceScan,
    ResetCategories { category_names: Vec<String> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReloadConfig => "reload_config",
            Self::Scan => "scan",
            Self::ForceScan => "force_scan",
            Self::ResetCategories { .. } => "reset_categories",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandResponse {
    ConfigReloaded(ReloadConfigResponse),
    Scanned(ScanResult),
    CategoriesReset(RemoveCategoriesResult),
}

pub async fn dispatch(state: &Arc<AppState>, command: Command) -> Result<CommandResponse, InfraError> {
    state.log_info("dispatch", &format!("received {}", command.name()));
    match command {
        Command::ReloadConfig => reload_config_impl(state).map(CommandResponse::ConfigReloaded),
        Command::Scan => scan_now_impl(state, false).await.map(CommandResponse::Scanned),
        Command::ForceScan => scan_now_impl(state, true).await.map(CommandResponse::Scanned),
        Command::ResetCategories { category_names } => {
            remove_categories_impl(state, &category_names).map(CommandResponse::CategoriesReset)
        }
    }
}

pub fn get_config_impl(state: &AppState) -> Result<AutotagConfig, InfraError> {
    Ok(lock_config(state)?.clone())
}

pub fn ensure_categories_impl(
    state: &AppState,
    colors: &CategoryColorMap,
) -> Result<EnsureCategoriesResult, InfraError> {
    let result = registry(state).ensure_categories(colors)?;
    state.log_info(
        "ensure_categories",
        &format!("{} new, {} existing", result.created, result.existing),
    );
    Ok(result)
}

pub fn remove_categories_impl(
    state: &AppState,
    category_names: &[String],
) -> Result<RemoveCategoriesResult, InfraError> {
    let result = registry(state).remove_categories(category_names)?;
    state.log_info(
        "remove_categories",
        &format!(
            "removed {} colors, {} names",
            result.removed_colors, result.removed_names
        ),
    );
    Ok(result)
}

/// Runs one scan with the given rules and stores its outcome as the last
/// result. Scans never overlap: a second caller waits for the first.
pub async fn apply_categories_impl(
    state: &AppState,
    rules: &[Rule],
    days_back: u32,
    days_forward: u32,
    force: bool,
) -> Result<ScanResult, InfraError> {
    let mode = ApplyMode::from_force(force);
    if rules.is_empty() {
        state.log_info("apply_categories", "no rules defined, skipping scan");
        return Ok(ScanResult::default());
    }

    let _scan = state.scan_lock.lock().await;
    state.log_info("apply_categories", &format!("scanning events ({})", mode.as_str()));
    state.scan_results.save(&ScanResult::started_at(state.now()))?;

    let result = applier(state)
        .apply(rules, days_back, days_forward, mode)
        .await?;
    state.scan_results.save(&result)?;

    state.log_info(
        "apply_categories",
        &format!(
            "{} events checked, {} categorized",
            result.processed, result.modified
        ),
    );
    for detail in &result.details {
        state.log_info(
            "apply_categories",
            &format!("\"{}\" -> {}", detail.title, detail.category),
        );
    }
    Ok(result)
}

/// Last stored scan outcome, or an empty result before the first scan.
pub fn get_stats_impl(state: &AppState) -> Result<ScanResult, InfraError> {
    Ok(state.scan_results.load()?.unwrap_or_default())
}

/// Scan with the current configuration, registering its categories first.
pub async fn scan_now_impl(state: &AppState, force: bool) -> Result<ScanResult, InfraError> {
    let command = if force { "force_scan" } else { "scan" };
    let config = get_config_impl(state)?;
    ensure_categories_logged(state, command, &config.categories);
    apply_categories_impl(
        state,
        &config.rules(),
        config.days_back,
        config.days_forward,
        force,
    )
    .await
}

pub fn reload_config_impl(state: &Arc<AppState>) -> Result<ReloadConfigResponse, InfraError> {
    let config = load_config(&state.config_dir)?;
    activate_config(state, config, "reload_config")
}

/// Delays, registers categories, runs the first scan and starts the timer.
/// A failing first scan is logged; the timer starts regardless.
pub async fn initialize_impl(
    state: &Arc<AppState>,
    startup_delay: Duration,
) -> Result<InitializeResponse, InfraError> {
    state.log_info(
        "initialize",
        &format!("starting in {}s", startup_delay.as_secs()),
    );
    sleep(startup_delay).await;

    let config = get_config_impl(state)?;
    ensure_categories_logged(state, "initialize", &config.categories);
    log_full_width_colors(state, "initialize", config.full_width_colors);

    let initial_scan = match scan_once(state, &config).await {
        Ok(result) => Some(result),
        Err(error) => {
            state.log_error("initialize", &format!("initial scan failed: {error}"));
            None
        }
    };

    let scheduler_running = start_scheduler_impl(state)?;
    state.log_info("initialize", "ready");
    Ok(InitializeResponse {
        initial_scan,
        interval_minutes: config.interval_minutes,
        scheduler_running,
    })
}

/// Starts periodic scanning with the configured interval. Later
/// configuration changes restart the timer until it is stopped.
pub fn start_scheduler_impl(state: &Arc<AppState>) -> Result<bool, InfraError> {
    state.scheduling.store(true, Ordering::SeqCst);
    let interval_minutes = lock_config(state)?.interval_minutes;
    restart_scheduler(state, interval_minutes)
}

pub fn stop_scheduler_impl(state: &AppState) -> Result<(), InfraError> {
    state.scheduling.store(false, Ordering::SeqCst);
    lock_scheduler(state)?.stop();
    state.log_info("scheduler", "stopped");
    Ok(())
}

pub fn scheduler_running_impl(state: &AppState) -> Result<bool, InfraError> {
    Ok(lock_scheduler(state)?.is_running())
}

pub fn export_config_impl(state: &AppState) -> Result<String, InfraError> {
    export_config(&get_config_impl(state)?)
}

/// Replaces the configuration with an exported one. Nothing changes when
/// the input is rejected.
pub fn import_config_impl(state: &Arc<AppState>, raw: &str) -> Result<AutotagConfig, InfraError> {
    let config = import_config(raw)?;
    save_config(&state.config_dir, &config)?;
    activate_config(state, config.clone(), "import_config")?;
    Ok(config)
}

pub fn add_category_impl(
    state: &Arc<AppState>,
    keyword: &str,
    color: &str,
) -> Result<AutotagConfig, InfraError> {
    update_config(state, "add_category", |config| {
        config.add_category(keyword, color).map(|_| ())
    })
}

pub fn remove_category_impl(state: &Arc<AppState>, keyword: &str) -> Result<AutotagConfig, InfraError> {
    update_config(state, "remove_category", |config| {
        if config.remove_category(keyword) {
            Ok(())
        } else {
            Err(format!("unknown keyword: {keyword}"))
        }
    })
}

pub fn set_category_color_impl(
    state: &Arc<AppState>,
    keyword: &str,
    color: &str,
) -> Result<AutotagConfig, InfraError> {
    update_config(state, "set_category_color", |config| {
        config.set_color(keyword, color)
    })
}

pub fn update_settings_impl(
    state: &Arc<AppState>,
    settings: &SettingsUpdate,
) -> Result<AutotagConfig, InfraError> {
    update_config(state, "update_settings", |config| {
        settings.apply_to(config);
        Ok(())
    })
}

fn update_config<F>(state: &Arc<AppState>, command: &str, edit: F) -> Result<AutotagConfig, InfraError>
where
    F: FnOnce(&mut AutotagConfig) -> Result<(), String>,
{
    let mut config = get_config_impl(state)?;
    edit(&mut config).map_err(InfraError::Validation)?;
    save_config(&state.config_dir, &config)?;
    activate_config(state, config.clone(), command)?;
    Ok(config)
}

fn activate_config(
    state: &Arc<AppState>,
    config: AutotagConfig,
    command: &str,
) -> Result<ReloadConfigResponse, InfraError> {
    *lock_config(state)? = config.clone();
    state.log_info(
        command,
        &format!("configuration active with {} categories", config.categories.len()),
    );

    let ensured = ensure_categories_logged(state, command, &config.categories);
    log_full_width_colors(state, command, config.full_width_colors);

    let scheduler_running = if state.scheduling.load(Ordering::SeqCst) {
        restart_scheduler(state, config.interval_minutes)?
    } else {
        false
    };

    Ok(ReloadConfigResponse {
        categories: config.categories.len(),
        ensured,
        interval_minutes: config.interval_minutes,
        full_width_colors: config.full_width_colors,
        scheduler_running,
    })
}

fn restart_scheduler(state: &Arc<AppState>, interval_minutes: u32) -> Result<bool, InfraError> {
    let weak_state = Arc::downgrade(state);
    let mut scheduler = lock_scheduler(state)?;
    scheduler.reconfigure(interval_minutes, move || {
        let weak_state = weak_state.clone();
        async move {
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            if let Err(error) = scan_now_impl(&state, false).await {
                state.log_error("scheduled_scan", &error.to_string());
            }
        }
    })?;

    if interval_minutes > 0 {
        state.log_info(
            "scheduler",
            &format!("scan interval set to {interval_minutes} minutes"),
        );
    } else {
        state.log_info("scheduler", "interval disabled (0 minutes)");
    }
    Ok(scheduler.is_running())
}

async fn scan_once(state: &AppState, config: &AutotagConfig) -> Result<ScanResult, InfraError> {
    apply_categories_impl(
        state,
        &config.rules(),
        config.days_back,
        config.days_forward,
        false,
    )
    .await
}

fn ensure_categories_logged(
    state: &AppState,
    command: &str,
    colors: &CategoryColorMap,
) -> Option<EnsureCategoriesResult> {
    match ensure_categories_impl(state, colors) {
        Ok(result) => Some(result),
        Err(error) => {
            state.log_error(command, &format!("error creating categories: {error}"));
            None
        }
    }
}

fn log_full_width_colors(state: &AppState, command: &str, enabled: bool) {
    let status = if enabled { "enabled" } else { "disabled" };
    state.log_info(command, &format!("full-width colors {status}"));
}

fn registry(state: &AppState) -> CategoryRegistry<dyn PreferenceStore> {
    CategoryRegistry::new(Arc::clone(&state.preferences)).with_log(state.log())
}

fn applier(state: &AppState) -> CategoryApplier<dyn CalendarHost> {
    let applier = CategoryApplier::new(Arc::clone(&state.calendar_host)).with_log(state.log());
    match &state.clock {
        Some(clock) => applier.with_clock(Arc::clone(clock)),
        None => applier,
    }
}

fn lock_config(state: &AppState) -> Result<MutexGuard<'_, AutotagConfig>, InfraError> {
    state
        .config
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("config lock poisoned: {error}")))
}

fn lock_scheduler(state: &AppState) -> Result<MutexGuard<'_, ScanScheduler>, InfraError> {
    state
        .scheduler
        .lock()
        .map_err(|error| InfraError::Scheduler(format!("scheduler lock poisoned: {error}")))
}
