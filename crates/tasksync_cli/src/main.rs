use async_trait::async_trait;
use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tasksync_cli::cli::{Cli, Command, collect_config_overrides};
use tasksync_core::config::{Config, load_config_with_fallback, merge_overrides};
use tasksync_core::dispatch::{
    PendingWrite, QueueWorker, RemoteOutcome, RetryPolicy, Transport, TransportError, WriteQueue,
    WriteRequest,
};
use tasksync_core::error::AppError;
use tasksync_core::model::{PersonalDetailsList, Report, TaskLifecycle, decode};
use tasksync_core::report_utils::read_report;
use tasksync_core::session::{ActionContext, ClockIds, SessionContext, SystemClock};
use tasksync_core::storage::json_store::{self, StoreState};
use tasksync_core::store::{EntityStore, MemoryStore, StoreKey};
use tasksync_core::task_api::{CreateTaskParams, TaskActions};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

/// The persisted store and outbox for one invocation.
struct Workspace {
    path: PathBuf,
    store: Arc<MemoryStore>,
    queue: Arc<WriteQueue<MemoryStore>>,
}

impl Workspace {
    fn open() -> Result<Self, AppError> {
        let path = json_store::store_path()?;
        let state = json_store::load_state(&path)?;
        let store = Arc::new(MemoryStore::from_entries(state.entities));
        let queue = Arc::new(WriteQueue::with_pending(store.clone(), state.outbox));
        Ok(Self { path, store, queue })
    }

    fn save(&self) -> Result<(), AppError> {
        json_store::save_state(
            &self.path,
            &StoreState {
                entities: self.store.entries(),
                outbox: self.queue.pending(),
            },
        )
    }

    fn session(&self, config: &Config) -> Result<SessionContext, AppError> {
        if config.session.account_id == 0 {
            return Err(AppError::invalid_input(
                "session.account_id is not configured",
            ));
        }
        let details: PersonalDetailsList = match self.store.get(&StoreKey::PersonalDetailsList) {
            Some(value) => decode(value)?,
            None => PersonalDetailsList::new(),
        };
        Ok(config.session.to_session().with_personal_details(details))
    }

    fn task(&self, id: &str) -> Result<Report, AppError> {
        read_report(self.store.as_ref(), id)?
            .ok_or_else(|| AppError::invalid_input(format!("report {id} not found")))
    }
}

/// Stands in for the remote authority: confirms every write unless told to
/// reject them.
struct LocalAuthority {
    reject: Option<String>,
}

#[async_trait]
impl Transport for LocalAuthority {
    async fn send(&self, request: &WriteRequest) -> Result<RemoteOutcome, TransportError> {
        tracing::info!(command = %request.command, "delivering write");
        Ok(outcome_for(self.reject.clone()))
    }
}

fn outcome_for(reject: Option<String>) -> RemoteOutcome {
    match reject {
        Some(reason) => RemoteOutcome::Rejected { reason },
        None => RemoteOutcome::Confirmed,
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct PendingRow {
    #[tabled(rename = "#")]
    request_id: u64,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Task")]
    task: String,
}

fn lifecycle_label(lifecycle: TaskLifecycle) -> &'static str {
    match lifecycle {
        TaskLifecycle::Open => "open",
        TaskLifecycle::Completed => "completed",
        TaskLifecycle::Cancelled => "cancelled",
    }
}

fn keys_label<V>(map: &std::collections::BTreeMap<String, V>) -> String {
    if map.is_empty() {
        "-".to_string()
    } else {
        map.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn task_json(report: &Report) -> serde_json::Value {
    serde_json::json!({
        "id": report.report_id,
        "title": report.report_name,
        "description": report.description,
        "state": lifecycle_label(report.lifecycle()),
        "owner": report.owner_account_id,
        "assignee": report.assignee(),
        "parent_report_id": report.parent_report_id,
        "pending_fields": report.pending_fields,
        "error_fields": report.error_fields,
    })
}

fn print_task(cli_json: bool, verb: &str, report: &Report) {
    if cli_json {
        println!("{}", task_json(report));
    } else {
        println!("{verb} task: {} ({})", report.report_name, report.report_id);
    }
}

fn print_report_table(report: &Report) {
    let rows = vec![
        FieldRow {
            field: "id",
            value: report.report_id.clone(),
        },
        FieldRow {
            field: "title",
            value: report.report_name.clone(),
        },
        FieldRow {
            field: "description",
            value: report.description.clone().unwrap_or_default(),
        },
        FieldRow {
            field: "state",
            value: if report.is_task() {
                lifecycle_label(report.lifecycle()).to_string()
            } else {
                "-".to_string()
            },
        },
        FieldRow {
            field: "assignee",
            value: report
                .assignee()
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
        },
        FieldRow {
            field: "last message",
            value: report.last_message_text.clone().unwrap_or_default(),
        },
        FieldRow {
            field: "pending",
            value: keys_label(&report.pending_fields),
        },
        FieldRow {
            field: "errors",
            value: keys_label(&report.error_fields),
        },
    ];
    println!("{}", Table::new(rows));
}

fn print_pending(cli_json: bool, pending: &[PendingWrite]) -> Result<(), AppError> {
    if cli_json {
        println!("{}", serde_json::to_value(pending)?);
        return Ok(());
    }
    if pending.is_empty() {
        println!("No pending writes");
        return Ok(());
    }
    let rows: Vec<PendingRow> = pending
        .iter()
        .map(|write| PendingRow {
            request_id: write.request_id,
            command: write.request.command.clone(),
            task: write
                .request
                .get("taskReportID")
                .map_or_else(|| "-".to_string(), ToString::to_string),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn init_tracing(log_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_command(cli: Cli, config: &Config) -> Result<(), AppError> {
    let workspace = Workspace::open()?;

    match cli.command {
        Command::Show { id } => {
            if cli.json {
                let document = workspace
                    .store
                    .get(&StoreKey::report(&id))
                    .ok_or_else(|| AppError::invalid_input(format!("report {id} not found")))?;
                println!("{document}");
            } else {
                print_report_table(&workspace.task(&id)?);
            }
            return Ok(());
        }
        Command::Pending => return print_pending(cli.json, &workspace.queue.pending()),
        Command::Resolve { reject, all } => {
            let verb = if reject.is_some() { "Rejected" } else { "Confirmed" };
            let mut resolved = vec![workspace.queue.resolve_next(outcome_for(reject.clone()))?];
            while all && !workspace.queue.is_empty() {
                resolved.push(workspace.queue.resolve_next(outcome_for(reject.clone()))?);
            }
            workspace.save()?;
            if cli.json {
                let payload: Vec<serde_json::Value> = resolved
                    .iter()
                    .map(|write| {
                        serde_json::json!({
                            "request_id": write.request_id,
                            "command": write.request.command,
                            "outcome": verb.to_lowercase(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::Value::Array(payload));
            } else {
                for write in &resolved {
                    println!("{verb} {} (#{})", write.request.command, write.request_id);
                }
            }
            return Ok(());
        }
        Command::Sync { reject } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|err| AppError::io(err.to_string()))?;
            let worker = QueueWorker::new(
                workspace.queue.clone(),
                LocalAuthority { reject },
                RetryPolicy::from_config(&config.dispatch),
            );
            let summary = runtime.block_on(worker.drain())?;
            workspace.save()?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "confirmed": summary.confirmed,
                        "rejected": summary.rejected,
                    })
                );
            } else {
                println!(
                    "Delivered {} write(s): {} confirmed, {} rejected",
                    summary.confirmed + summary.rejected,
                    summary.confirmed,
                    summary.rejected
                );
            }
            return Ok(());
        }
        _ => {}
    }

    let session = workspace.session(config)?;
    let clock = SystemClock;
    let ids = ClockIds::new();
    let actions = TaskActions::new(
        ActionContext::new(&session, &clock, &ids),
        workspace.store.as_ref(),
        workspace.queue.as_ref(),
    );

    match cli.command {
        Command::Create {
            title,
            parent,
            description,
            assignee,
            assignee_id,
        } => {
            let id = actions.create_task(CreateTaskParams {
                parent_report_id: parent,
                title,
                description,
                assignee_email: assignee,
                assignee_account_id: assignee_id,
                ..CreateTaskParams::default()
            })?;
            workspace.save()?;
            print_task(cli.json, "Created", &workspace.task(&id)?);
        }
        Command::Complete { id } => {
            actions.complete_task(&id)?;
            workspace.save()?;
            print_task(cli.json, "Completed", &workspace.task(&id)?);
        }
        Command::Reopen { id } => {
            actions.reopen_task(&id)?;
            workspace.save()?;
            print_task(cli.json, "Reopened", &workspace.task(&id)?);
        }
        Command::Edit {
            id,
            title,
            description,
        } => {
            if title.is_none() && description.is_none() {
                return Err(AppError::invalid_input(
                    "nothing to edit: pass --title and/or --description",
                ));
            }
            actions.edit_task(&id, title.as_deref(), description.as_deref())?;
            workspace.save()?;
            print_task(cli.json, "Updated", &workspace.task(&id)?);
        }
        Command::Assign {
            id,
            email,
            account_id,
        } => {
            actions.edit_task_assignee(&id, &email, account_id, None)?;
            workspace.save()?;
            print_task(cli.json, "Assigned", &workspace.task(&id)?);
        }
        Command::Cancel { id } => {
            actions.cancel_task(&id)?;
            workspace.save()?;
            print_task(cli.json, "Cancelled", &workspace.task(&id)?);
        }
        Command::ClearErrors { id } => {
            actions.clear_task_errors(&id)?;
            workspace.save()?;
            if cli.json {
                println!("{}", serde_json::json!({ "id": id, "cleared": true }));
            } else {
                println!("Cleared errors on report {id}");
            }
        }
        Command::Show { .. }
        | Command::Pending
        | Command::Resolve { .. }
        | Command::Sync { .. } => {}
    }

    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let load = load_config_with_fallback();
    let config = match collect_config_overrides(&cli.config_override) {
        Ok(mut overrides) => {
            if let Some(account_id) = cli.act_as {
                overrides.account_id = Some(account_id);
            }
            merge_overrides(&load.config, &overrides)
        }
        Err(err) => {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
    };

    init_tracing(config.log_filter.as_deref());
    if let Some(err) = load.error {
        tracing::warn!(error = %err, "falling back to default configuration");
    }

    if let Err(err) = run_command(cli, &config) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
