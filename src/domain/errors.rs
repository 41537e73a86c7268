//! Domain error types
//!
//! These errors are framework-agnostic and represent business-level failures.
//! Every failure a caller can see falls into one of five kinds; per-line
//! problems are collected as [`Issue`]s and reported together.

use sea_orm::SqlxError;
use sea_orm::{DbErr, RuntimeErr};
use serde::Serialize;

use super::locale::Locale;

/// Coarse classification used by callers (and the HTTP layer) to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    State,
    System,
}

/// Which input list an issue points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Items,
    Resources,
    Reservations,
    Instances,
    Details,
    Returned,
    Lost,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Items => "items",
            Field::Resources => "resources",
            Field::Reservations => "reservations",
            Field::Instances => "instances",
            Field::Details => "details",
            Field::Returned => "returned",
            Field::Lost => "lost",
        }
    }
}

/// Stable machine-readable reason for a rejected line or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    // patron card
    CardInactive,
    CardHasUnpaidFines,
    // request composition
    EmptyRequest,
    DuplicateItem,
    DuplicateResource,
    ItemNotFound,
    ResourceNotFound,
    AlreadyRequested,
    AlreadyBorrowed,
    AlreadyReserved,
    ResourceAlreadyActive,
    BorrowLimitExceeded,
    RequestNotMutable,
    ReservationClosed,
    // instance allocation
    TooFewInstances,
    TooManyInstances,
    DuplicateInstance,
    SameItemTwice,
    InstanceNotFound,
    InstanceUnavailable,
    InstanceAlreadyBorrowed,
    InstanceReservedForOther,
    InstanceRequestedByOther,
    WrongInstanceForReservation,
    MissingConditionHistory,
    ItemNotInRequest,
    SelfServiceInLibrary,
    // extensions
    DuplicateDetail,
    DetailNotFound,
    DetailNotBorrowing,
    DetailClosed,
    ExtensionLimitReached,
    ExtensionTooEarly,
    ExtensionBlockedByReservation,
    NoDueDate,
    // returns and losses
    DetailInBothLists,
    UnexpectedFine,
    OverdueFineRequired,
    WrongFineType,
    ReturnConditionRequired,
    LostFineRequired,
    MissingEstimatedPrice,
    FinePolicyNotFound,
    // storage races
    CapacityExhausted,
    ConcurrentModification,
}

impl IssueCode {
    pub fn kind(self) -> ErrorKind {
        use IssueCode::*;
        match self {
            AlreadyRequested
            | AlreadyBorrowed
            | AlreadyReserved
            | ResourceAlreadyActive
            | BorrowLimitExceeded
            | InstanceAlreadyBorrowed
            | InstanceReservedForOther
            | InstanceRequestedByOther
            | ExtensionBlockedByReservation
            | CapacityExhausted
            | ConcurrentModification => ErrorKind::Conflict,
            RequestNotMutable | ReservationClosed | DetailNotBorrowing | DetailClosed
            | ExtensionLimitReached | NoDueDate => ErrorKind::State,
            CardInactive
            | CardHasUnpaidFines
            | EmptyRequest
            | DuplicateItem
            | DuplicateResource
            | ItemNotFound
            | ResourceNotFound
            | TooFewInstances
            | TooManyInstances
            | DuplicateInstance
            | SameItemTwice
            | InstanceNotFound
            | InstanceUnavailable
            | WrongInstanceForReservation
            | MissingConditionHistory
            | ItemNotInRequest
            | SelfServiceInLibrary
            | DuplicateDetail
            | DetailNotFound
            | ExtensionTooEarly
            | DetailInBothLists
            | UnexpectedFine
            | OverdueFineRequired
            | WrongFineType
            | ReturnConditionRequired
            | LostFineRequired
            | MissingEstimatedPrice
            | FinePolicyNotFound => ErrorKind::Validation,
        }
    }
}

/// One rejected line (or the whole call when `line` is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub field: Option<Field>,
    pub line: Option<usize>,
    pub code: IssueCode,
    pub message: String,
}

impl Issue {
    pub fn new(field: Option<Field>, line: Option<usize>, code: IssueCode, locale: Locale) -> Self {
        let text = locale.message(code);
        let message = match (field, line) {
            (Some(field), Some(line)) => format!("{}[{}]: {}", field.as_str(), line, text),
            (Some(field), None) => format!("{}: {}", field.as_str(), text),
            _ => text.to_string(),
        };
        Self {
            field,
            line,
            code,
            message,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("validation failed on {} line(s)", .0.len())]
    Validation(Vec<Issue>),
    #[error("conflicting claim on {} line(s)", .0.len())]
    Conflict(Vec<Issue>),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },
    #[error("operation not allowed in current state")]
    State(Vec<Issue>),
    /// Lines due today or overdue were left out of a return and must be confirmed.
    #[error("{} loan line(s) left out of the return must be confirmed", .detail_ids.len())]
    ConfirmMissing { detail_ids: Vec<i32> },
    #[error("system error: {0}")]
    System(String),
}

impl LendingError {
    pub fn not_found(entity: &'static str, id: i32) -> Self {
        LendingError::NotFound { entity, id }
    }

    pub fn state(code: IssueCode, locale: Locale) -> Self {
        LendingError::State(vec![Issue::new(None, None, code, locale)])
    }

    pub fn conflict(code: IssueCode, locale: Locale) -> Self {
        LendingError::Conflict(vec![Issue::new(None, None, code, locale)])
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::Validation(_) | LendingError::ConfirmMissing { .. } => {
                ErrorKind::Validation
            }
            LendingError::Conflict(_) => ErrorKind::Conflict,
            LendingError::NotFound { .. } => ErrorKind::NotFound,
            LendingError::State(_) => ErrorKind::State,
            LendingError::System(_) => ErrorKind::System,
        }
    }

    pub fn issues(&self) -> &[Issue] {
        match self {
            LendingError::Validation(issues)
            | LendingError::Conflict(issues)
            | LendingError::State(issues) => issues,
            _ => &[],
        }
    }

    pub fn has_code(&self, code: IssueCode) -> bool {
        self.issues().iter().any(|issue| issue.code == code)
    }

    /// Re-renders every issue message for `locale`.
    pub fn localized(self, locale: Locale) -> Self {
        let render = |issues: Vec<Issue>| -> Vec<Issue> {
            issues
                .into_iter()
                .map(|i| Issue::new(i.field, i.line, i.code, locale))
                .collect()
        };
        match self {
            LendingError::Validation(issues) => LendingError::Validation(render(issues)),
            LendingError::Conflict(issues) => LendingError::Conflict(render(issues)),
            LendingError::State(issues) => LendingError::State(render(issues)),
            other => other,
        }
    }
}

// SQLite reports a competing writer as BUSY (5) or LOCKED (6); extended codes keep
// the primary code in the low byte.
fn is_lock_contention(err: &DbErr) -> bool {
    let (DbErr::Conn(runtime) | DbErr::Exec(runtime) | DbErr::Query(runtime)) = err else {
        return false;
    };
    match runtime {
        RuntimeErr::SqlxError(SqlxError::Database(db)) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

// A writer that lost the database lock lost the race; any other storage failure
// aborts the call unchanged.
impl From<DbErr> for LendingError {
    fn from(e: DbErr) -> Self {
        if is_lock_contention(&e) {
            return LendingError::conflict(IssueCode::ConcurrentModification, Locale::default());
        }
        LendingError::System(e.to_string())
    }
}

/// Collects every issue of one call before anything is written.
#[derive(Debug)]
pub struct Issues {
    locale: Locale,
    items: Vec<Issue>,
}

impl Issues {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            items: Vec::new(),
        }
    }

    pub fn line(&mut self, field: Field, line: usize, code: IssueCode) {
        self.items
            .push(Issue::new(Some(field), Some(line), code, self.locale));
    }

    pub fn general(&mut self, code: IssueCode) {
        self.items.push(Issue::new(None, None, code, self.locale));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_line(&self, field: Field, line: usize) -> bool {
        self.items
            .iter()
            .any(|issue| issue.field == Some(field) && issue.line == Some(line))
    }

    /// Conflicts win over state errors, which win over plain validation.
    pub fn into_result(self) -> Result<(), LendingError> {
        if self.items.is_empty() {
            return Ok(());
        }
        let kinds: Vec<ErrorKind> = self.items.iter().map(|i| i.code.kind()).collect();
        if kinds.contains(&ErrorKind::Conflict) {
            Err(LendingError::Conflict(self.items))
        } else if kinds.contains(&ErrorKind::State) {
            Err(LendingError::State(self.items))
        } else {
            Err(LendingError::Validation(self.items))
        }
    }
}
