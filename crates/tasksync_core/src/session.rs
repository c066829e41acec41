//! Explicit per-call context for the action procedures: who is acting, what
//! the client knows about other people, and where time and identifiers come
//! from.

use crate::error::AppError;
use crate::model::{AccountId, ErrorMap, PersonalDetails, PersonalDetailsList};
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub account_id: AccountId,
    pub email: String,
    pub personal_details: PersonalDetailsList,
    pub admin_policy_ids: BTreeSet<String>,
}

impl SessionContext {
    pub fn new<E: Into<String>>(account_id: AccountId, email: E) -> Self {
        Self {
            account_id,
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn with_personal_details(mut self, personal_details: PersonalDetailsList) -> Self {
        self.personal_details = personal_details;
        self
    }

    pub fn with_admin_policy<P: Into<String>>(mut self, policy_id: P) -> Self {
        self.admin_policy_ids.insert(policy_id.into());
        self
    }

    pub fn is_policy_admin(&self, policy_id: Option<&str>) -> bool {
        policy_id.is_some_and(|id| self.admin_policy_ids.contains(id))
    }

    pub fn details_for(&self, account_id: AccountId) -> Option<&PersonalDetails> {
        self.personal_details.get(&account_id)
    }

    /// Display name, falling back to the login, then to an empty string.
    pub fn display_name_for(&self, account_id: AccountId) -> String {
        self.details_for(account_id)
            .and_then(|details| {
                details
                    .display_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .or_else(|| details.login.clone())
            })
            .unwrap_or_default()
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that starts at a fixed instant and advances one millisecond per read.
pub struct SteppingClock {
    current: Mutex<OffsetDateTime>,
}

impl SteppingClock {
    pub fn starting_at(start: OffsetDateTime) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = *current;
        *current = now + Duration::milliseconds(1);
        now
    }
}

pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Numeric identifiers derived from the wall clock plus a process counter.
pub struct ClockIds {
    counter: AtomicU64,
}

impl ClockIds {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for ClockIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for ClockIds {
    fn next_id(&self) -> String {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) % 1000;
        format!("{}{:03}", nanos / 1000, sequence)
    }
}

/// `<prefix>1`, `<prefix>2`, ... in call order.
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new<P: Into<String>>(prefix: P) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.prefix, next)
    }
}

/// Everything an action procedure reads besides the entity store.
pub struct ActionContext<'a> {
    pub session: &'a SessionContext,
    pub clock: &'a dyn Clock,
    pub ids: &'a dyn IdSource,
}

impl<'a> ActionContext<'a> {
    pub fn new(session: &'a SessionContext, clock: &'a dyn Clock, ids: &'a dyn IdSource) -> Self {
        Self {
            session,
            clock,
            ids,
        }
    }

    /// Current time in the store's `YYYY-MM-DD HH:MM:SS.mmm` format.
    pub fn db_time(&self) -> Result<String, AppError> {
        format_db_time(self.clock.now())
    }

    /// Error descriptor keyed by the current time in microseconds.
    pub fn microsecond_error(&self, translation_key: &str) -> ErrorMap {
        let micros = self.clock.now().unix_timestamp_nanos() / 1000;
        ErrorMap::from([(micros.to_string(), translation_key.to_string())])
    }
}

pub fn format_db_time(instant: OffsetDateTime) -> Result<String, AppError> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    instant
        .to_offset(time::UtcOffset::UTC)
        .format(&format)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{
        ActionContext, ClockIds, IdSource, SequentialIds, SessionContext, SteppingClock,
        format_db_time,
    };
    use crate::model::PersonalDetails;
    use time::macros::datetime;

    #[test]
    fn db_time_has_millisecond_precision() {
        let formatted = format_db_time(datetime!(2025-12-20 09:05:03.0042 UTC)).unwrap();
        assert_eq!(formatted, "2025-12-20 09:05:03.004");
    }

    #[test]
    fn stepping_clock_advances_per_read() {
        let clock = SteppingClock::starting_at(datetime!(2025-12-20 00:00 UTC));
        let session = SessionContext::new(1, "owner@example.com");
        let ids = SequentialIds::new("id");
        let ctx = ActionContext::new(&session, &clock, &ids);

        assert_eq!(ctx.db_time().unwrap(), "2025-12-20 00:00:00.000");
        assert_eq!(ctx.db_time().unwrap(), "2025-12-20 00:00:00.001");
    }

    #[test]
    fn microsecond_error_is_keyed_by_timestamp() {
        let clock = SteppingClock::starting_at(datetime!(1970-01-01 00:00:01 UTC));
        let session = SessionContext::new(1, "owner@example.com");
        let ids = SequentialIds::new("id");
        let ctx = ActionContext::new(&session, &clock, &ids);

        let error = ctx.microsecond_error("task.messages.error");
        assert_eq!(error.get("1000000").map(String::as_str), Some("task.messages.error"));
    }

    #[test]
    fn id_sources_do_not_repeat() {
        let sequential = SequentialIds::new("a");
        assert_eq!(sequential.next_id(), "a1");
        assert_eq!(sequential.next_id(), "a2");

        let clock_ids = ClockIds::new();
        let first = clock_ids.next_id();
        let second = clock_ids.next_id();
        assert_ne!(first, second);
    }

    #[test]
    fn display_name_falls_back_to_login() {
        let mut session = SessionContext::new(1, "owner@example.com");
        session.personal_details.insert(
            7,
            PersonalDetails {
                account_id: 7,
                login: Some("ana@example.com".into()),
                display_name: Some(String::new()),
            },
        );

        assert_eq!(session.display_name_for(7), "ana@example.com");
        assert_eq!(session.display_name_for(8), "");
        assert!(!session.is_policy_admin(Some("P1")));
        assert!(session.with_admin_policy("P1").is_policy_admin(Some("P1")));
    }
}
