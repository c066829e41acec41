use clap::{Parser, Subcommand};
use tasksync_core::config::ConfigOverrides;
use tasksync_core::error::AppError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Act as this account instead of the configured one
    #[arg(long = "as", value_name = "ACCOUNT_ID", global = true)]
    pub act_as: Option<u64>,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a task under a conversation
    ///
    /// Example: tasksync create "Ship report" --parent R1
    /// Example: tasksync create "Ship report" --parent R1 --assignee ana@example.com --assignee-id 7
    Create {
        title: String,
        #[arg(long)]
        parent: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, requires = "assignee_id")]
        assignee: Option<String>,
        #[arg(long = "assignee-id", value_name = "ACCOUNT_ID")]
        assignee_id: Option<u64>,
    },
    /// Mark a task as complete
    ///
    /// Example: tasksync complete 1700000000000001
    Complete { id: String },
    /// Reopen a completed task
    ///
    /// Example: tasksync reopen 1700000000000001
    Reopen { id: String },
    /// Edit a task's title and/or description
    ///
    /// Example: tasksync edit 1700000000000001 --title "Ship final report"
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Assign a task to someone
    ///
    /// Example: tasksync assign 1700000000000001 ana@example.com 7
    Assign {
        id: String,
        email: String,
        account_id: u64,
    },
    /// Cancel a task
    ///
    /// Example: tasksync cancel 1700000000000001
    Cancel { id: String },
    /// Show a report
    ///
    /// Example: tasksync show 1700000000000001
    Show { id: String },
    /// List writes waiting for the remote outcome
    ///
    /// Example: tasksync pending
    Pending,
    /// Apply the remote outcome of the oldest pending write
    ///
    /// Example: tasksync resolve
    /// Example: tasksync resolve --reject "server said no"
    /// Example: tasksync resolve --all
    Resolve {
        #[arg(long, value_name = "REASON")]
        reject: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Deliver every pending write through the local authority
    ///
    /// Example: tasksync sync
    Sync {
        #[arg(long, value_name = "REASON")]
        reject: Option<String>,
    },
    /// Dismiss the errors on a report
    ///
    /// Example: tasksync clear-errors 1700000000000001
    ClearErrors { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    AccountId,
    Email,
    AdminPolicies,
    MaxAttempts,
    RetryDelayMs,
    LogFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let (field, remainder) = key_raw
        .split_once('.')
        .map(|(field, rest)| (field.trim(), Some(rest.trim())))
        .unwrap_or((key_raw.trim(), None));

    let canonical_field =
        canonicalize_flag_name(field).ok_or_else(|| "override key cannot be empty".to_string())?;
    let subfield = remainder.and_then(canonicalize_flag_name);

    let target = match (canonical_field.as_str(), subfield.as_deref()) {
        ("session", Some("account_id")) => ConfigOverrideTarget::AccountId,
        ("session", Some("email")) => ConfigOverrideTarget::Email,
        ("session", Some("admin_policies")) => ConfigOverrideTarget::AdminPolicies,
        ("dispatch", Some("max_attempts")) => ConfigOverrideTarget::MaxAttempts,
        ("dispatch", Some("retry_delay_ms")) => ConfigOverrideTarget::RetryDelayMs,
        ("log_filter", None) => ConfigOverrideTarget::LogFilter,
        ("log_filter", Some(_)) => {
            return Err("log_filter override cannot have subfields".to_string());
        }
        ("session" | "dispatch", None) => {
            return Err(format!("{canonical_field} override requires a field name"));
        }
        ("session" | "dispatch", Some(other)) => {
            return Err(format!("unknown config field '{canonical_field}.{other}'"));
        }
        (other, _) => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Folds every `--config-override` into one [`ConfigOverrides`].
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let parsed = parse_config_override(entry).map_err(AppError::invalid_input)?;
        match parsed.target {
            ConfigOverrideTarget::AccountId => {
                overrides.account_id = Some(parse_number(&parsed.value, "session.account_id")?);
            }
            ConfigOverrideTarget::Email => overrides.email = Some(parsed.value),
            ConfigOverrideTarget::AdminPolicies => {
                overrides.admin_policies = Some(
                    parsed
                        .value
                        .split(',')
                        .map(str::trim)
                        .filter(|policy| !policy.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            ConfigOverrideTarget::MaxAttempts => {
                overrides.max_attempts = Some(parse_number(&parsed.value, "dispatch.max_attempts")?);
            }
            ConfigOverrideTarget::RetryDelayMs => {
                overrides.retry_delay_ms =
                    Some(parse_number(&parsed.value, "dispatch.retry_delay_ms")?);
            }
            ConfigOverrideTarget::LogFilter => overrides.log_filter = Some(parsed.value),
        }
    }
    Ok(overrides)
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|_| AppError::invalid_input(format!("{key} must be a number, got '{value}'")))
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigOverrideTarget, collect_config_overrides, parse_config_override};

    #[test]
    fn parse_config_override_canonicalizes_field_names() {
        let parsed = parse_config_override(" Session.Account-ID = 7 ").unwrap();

        assert_eq!(parsed.target, ConfigOverrideTarget::AccountId);
        assert_eq!(parsed.value, "7");
    }

    #[test]
    fn parse_config_override_requires_section_field() {
        let err = parse_config_override("dispatch = 3").unwrap_err();
        assert!(err.contains("requires a field name"));
    }

    #[test]
    fn parse_config_override_rejects_unknown_fields() {
        let err = parse_config_override("unknown.field=value").unwrap_err();
        assert!(err.contains("unknown config field"));

        let err = parse_config_override("session.token=value").unwrap_err();
        assert!(err.contains("session.token"));
    }

    #[test]
    fn parse_config_override_rejects_missing_equals() {
        let err = parse_config_override("log_filter").unwrap_err();
        assert!(err.contains("KEY=VALUE"));
    }

    #[test]
    fn collect_overrides_parses_values() {
        let overrides = collect_config_overrides(&[
            "session.account_id=2".to_string(),
            "session.admin_policies = P1, ,P2".to_string(),
            "dispatch.max_attempts=5".to_string(),
            "log_filter=tasksync_core=debug".to_string(),
        ])
        .unwrap();

        assert_eq!(overrides.account_id, Some(2));
        assert_eq!(
            overrides.admin_policies,
            Some(vec!["P1".to_string(), "P2".to_string()])
        );
        assert_eq!(overrides.max_attempts, Some(5));
        assert_eq!(overrides.log_filter.as_deref(), Some("tasksync_core=debug"));
    }

    #[test]
    fn collect_overrides_rejects_non_numeric_ids() {
        let err = collect_config_overrides(&["session.account_id=abc".to_string()]).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }
}
