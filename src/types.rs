use serde::Serialize;

/// Number of batches in the rotation cycle (batches 1..=BATCH_CYCLE)
pub const BATCH_CYCLE: i64 = 3;

/// Batch value written to records that have never been assigned one
pub const UNASSIGNED_BATCH: i64 = 0;

/// Stored credential record, as far as rotation is concerned
///
/// Auth material lives alongside these fields in the store but is never
/// read or written here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenRecord {
    pub id: String,
    pub username: Option<String>,
    /// `None` for legacy records created before batches existed
    pub batch: Option<i64>,
    pub active: Option<bool>,
}

impl TokenRecord {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: Some(username.into()),
            ..Default::default()
        }
    }

    pub fn with_batch(mut self, batch: i64) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(false)
    }
}

/// Result of a committed rotation
#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    /// Batch that is now current
    pub batch: i64,
    /// Holder names of every record active after commit
    pub active_holders: Vec<String>,
    /// Records that received `batch = 0`
    pub normalized: u64,
    /// Records switched to `active = true`
    pub activated: u64,
    /// Records switched to `active = false`
    pub deactivated: u64,
    /// Unix timestamp (seconds) of the commit
    pub rotated_at: i64,
}

/// What a committed rotation left active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome<'a> {
    Active(&'a [String]),
    /// Legitimate when the target batch has no records yet
    NoActiveRecords,
}

impl RotationReport {
    pub fn outcome(&self) -> RotationOutcome<'_> {
        if self.active_holders.is_empty() {
            RotationOutcome::NoActiveRecords
        } else {
            RotationOutcome::Active(&self.active_holders)
        }
    }
}
