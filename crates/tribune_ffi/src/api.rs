//! FFI use-case API for the host app.
//!
//! # Responsibility
//! - Expose the vote endpoint to Dart via FRB as flat envelopes.
//! - Parse string inputs into engine types at the boundary.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - `error_code` values match `VoteError::code()` plus `invalid_request`.
//! - One coordinator per process, so same-key calls serialize across threads.

use log::warn;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tribune_core::db::open_db;
use tribune_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Choice, CoordinatorConfig, TargetKind, TargetRef, UserId, VoteCoordinator, VoteError,
    VoteOutcome, VoteRequest,
};
use uuid::Uuid;

const VOTE_DB_FILE_NAME: &str = "tribune_votes.sqlite3";
const INVALID_REQUEST: &str = "invalid_request";
static VOTE_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static COORDINATOR: OnceLock<VoteCoordinator> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Flat response envelope for vote calls.
///
/// Article outcomes fill `votes_for`/`votes_against`; opinion outcomes fill
/// `likes`/`dislikes`/`author_aura`. All counters are `None` on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Stable failure code (`unauthorized|not_found|conflict|...`).
    pub error_code: Option<String>,
    /// Whether sending the same call again may succeed.
    pub retryable: bool,
    /// Human-readable diagnostics message.
    pub message: String,
    pub votes_for: Option<u64>,
    pub votes_against: Option<u64>,
    pub likes: Option<u64>,
    pub dislikes: Option<u64>,
    pub author_aura: Option<i64>,
}

impl VoteResponse {
    fn success(message: impl Into<String>, outcome: VoteOutcome) -> Self {
        let mut response = Self {
            ok: true,
            message: message.into(),
            ..Self::default()
        };
        match outcome {
            VoteOutcome::Article(tally) => {
                response.votes_for = Some(tally.votes_for);
                response.votes_against = Some(tally.votes_against);
            }
            VoteOutcome::Opinion(tally) => {
                response.likes = Some(tally.likes);
                response.dislikes = Some(tally.dislikes);
                response.author_aura = Some(tally.author_aura);
            }
        }
        response
    }

    fn failure(error_code: &str, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code.to_string()),
            retryable,
            message: message.into(),
            ..Self::default()
        }
    }

    fn from_vote_error(op: &str, err: &VoteError) -> Self {
        Self::failure(err.code(), err.is_retryable(), format!("{op} failed: {err}"))
    }
}

/// One of the caller's current votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteItem {
    /// `article|opinion`.
    pub target_kind: String,
    pub target_id: String,
    /// `for|against|like|dislike`.
    pub choice: String,
}

/// Response envelope for vote listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteListResponse {
    pub ok: bool,
    pub error_code: Option<String>,
    pub message: String,
    pub items: Vec<VoteItem>,
}

/// Casts `choice` on a target for `caller_id`.
///
/// Input semantics:
/// - `caller_id`: authenticated user id; `None` or blank means anonymous.
/// - `target_kind`: `article|opinion`.
/// - `choice`: `for|against` for articles, `like|dislike` for opinions.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Repeating the current choice returns current counters unchanged.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn vote_cast(
    caller_id: Option<String>,
    target_kind: String,
    target_id: String,
    choice: String,
) -> VoteResponse {
    let request = match parse_target(&target_kind, &target_id).and_then(|target| {
        choice
            .trim()
            .parse::<Choice>()
            .map(|choice| VoteRequest::new(target, choice))
            .map_err(|err| err.to_string())
    }) {
        Ok(request) => request,
        Err(message) => return invalid_request("vote_cast", message),
    };

    with_vote_connection("vote_cast", |coordinator, conn| {
        let caller = parse_caller(caller_id.as_deref())?;
        coordinator.cast_vote(conn, caller, &request)
    })
    .map_or_else(
        |failure| failure,
        |outcome| VoteResponse::success("Vote recorded.", outcome),
    )
}

/// Withdraws the caller's vote on a target.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Retracting with no vote present returns current counters unchanged.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn vote_retract(
    caller_id: Option<String>,
    target_kind: String,
    target_id: String,
) -> VoteResponse {
    let target = match parse_target(&target_kind, &target_id) {
        Ok(target) => target,
        Err(message) => return invalid_request("vote_retract", message),
    };

    with_vote_connection("vote_retract", |coordinator, conn| {
        let caller = parse_caller(caller_id.as_deref())?;
        coordinator.retract_vote(conn, caller, target)
    })
    .map_or_else(
        |failure| failure,
        |outcome| VoteResponse::success("Vote retracted.", outcome),
    )
}

/// Reads current counters for a target without voting.
#[flutter_rust_bridge::frb(sync)]
pub fn vote_snapshot(target_kind: String, target_id: String) -> VoteResponse {
    let target = match parse_target(&target_kind, &target_id) {
        Ok(target) => target,
        Err(message) => return invalid_request("vote_snapshot", message),
    };

    with_vote_connection("vote_snapshot", |coordinator, conn| {
        coordinator.snapshot(conn, target)
    })
    .map_or_else(
        |failure| failure,
        |outcome| VoteResponse::success("Snapshot loaded.", outcome),
    )
}

/// Lists the caller's current votes for client mirror hydration.
#[flutter_rust_bridge::frb(sync)]
pub fn vote_list_mine(caller_id: Option<String>) -> VoteListResponse {
    let listed = with_vote_connection("vote_list_mine", |coordinator, conn| {
        let caller = parse_caller(caller_id.as_deref())?;
        coordinator.votes_for_user(conn, caller)
    });

    match listed {
        Ok(votes) => VoteListResponse {
            ok: true,
            error_code: None,
            message: format!("Found {} vote(s).", votes.len()),
            items: votes
                .into_iter()
                .map(|(target, choice)| VoteItem {
                    target_kind: target.kind.as_str().to_string(),
                    target_id: target.id.to_string(),
                    choice: choice.as_str().to_string(),
                })
                .collect(),
        },
        Err(failure) => VoteListResponse {
            ok: false,
            error_code: failure.error_code,
            message: failure.message,
            items: Vec::new(),
        },
    }
}

fn invalid_request(op: &str, message: String) -> VoteResponse {
    warn!("event={op} module=ffi status=error error_code={INVALID_REQUEST}");
    VoteResponse::failure(INVALID_REQUEST, false, format!("{op} failed: {message}"))
}

fn parse_target(target_kind: &str, target_id: &str) -> Result<TargetRef, String> {
    let kind = target_kind
        .trim()
        .parse::<TargetKind>()
        .map_err(|err| err.to_string())?;
    let id = Uuid::parse_str(target_id.trim())
        .map_err(|_| format!("invalid target id `{}`", target_id.trim()))?;
    Ok(TargetRef { kind, id })
}

/// Blank ids are anonymous; malformed ids are not a known identity.
fn parse_caller(caller_id: Option<&str>) -> Result<Option<UserId>, VoteError> {
    match caller_id.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => Uuid::parse_str(value)
            .map(Some)
            .map_err(|_| VoteError::Unauthorized),
    }
}

fn with_vote_connection<T>(
    op: &str,
    f: impl FnOnce(&VoteCoordinator, &mut rusqlite::Connection) -> Result<T, VoteError>,
) -> Result<T, VoteResponse> {
    let db_path = resolve_vote_db_path();
    let mut conn = open_db(&db_path).map_err(|err| {
        VoteResponse::failure("transient_io", true, format!("{op} DB open failed: {err}"))
    })?;
    f(coordinator(), &mut conn).map_err(|err| VoteResponse::from_vote_error(op, &err))
}

fn coordinator() -> &'static VoteCoordinator {
    COORDINATOR.get_or_init(|| {
        let mut config = CoordinatorConfig::default();
        if let Some(lock_timeout) = read_lock_timeout() {
            config.lock_timeout = lock_timeout;
        }
        VoteCoordinator::new(config)
    })
}

fn read_lock_timeout() -> Option<Duration> {
    let raw = std::env::var("TRIBUNE_LOCK_TIMEOUT_MS").ok()?;
    match raw.trim().parse::<u64>() {
        Ok(millis) => Some(Duration::from_millis(millis)),
        Err(_) => {
            warn!("event=config_load module=ffi status=error key=TRIBUNE_LOCK_TIMEOUT_MS");
            None
        }
    }
}

fn resolve_vote_db_path() -> PathBuf {
    VOTE_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("TRIBUNE_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(VOTE_DB_FILE_NAME)
        })
        .clone()
}
