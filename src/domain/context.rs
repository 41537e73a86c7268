use chrono::{DateTime, Utc};

use super::locale::Locale;

/// Per-call context threaded through every public operation.
#[derive(Debug, Clone, Copy)]
pub struct OpContext {
    pub locale: Locale,
    /// Clock reading used for every timestamp written by the call.
    pub now: DateTime<Utc>,
}

impl OpContext {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            now: Utc::now(),
        }
    }

    pub fn at(locale: Locale, now: DateTime<Utc>) -> Self {
        Self { locale, now }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new(Locale::default())
    }
}
