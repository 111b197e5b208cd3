use serde::Serialize;

/// Work status of a context segment (and of the daily snapshot row).
///
/// `Complete` is terminal: it is the only status a context row can be
/// mutated into after insertion (open → complete, see db::event_log).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum WorkStatus {
    OnProgress,
    Pending,
    Complete,
    Reset,
}

impl WorkStatus {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WorkStatus::OnProgress => "on-progress",
            WorkStatus::Pending => "pending",
            WorkStatus::Complete => "complete",
            WorkStatus::Reset => "reset",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "on-progress" => Some(WorkStatus::OnProgress),
            "pending" => Some(WorkStatus::Pending),
            "complete" => Some(WorkStatus::Complete),
            "reset" => Some(WorkStatus::Reset),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, WorkStatus::Complete)
    }
}
