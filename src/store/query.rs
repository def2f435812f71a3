//! Query criteria for issuance process stores

use serde_json::Value;

use crate::mapping;
use crate::process::IssuanceProcess;
use crate::state::IssuanceProcessState;

/// One filter condition. A query matches processes satisfying all of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    State(IssuanceProcessState),
    StateIn(Vec<IssuanceProcessState>),
    HolderId(String),
    ParticipantContextId(String),
    /// The process requests this credential definition.
    CredentialDefinition(String),
    /// The claim at a dot-separated path equals `value`.
    Claim { path: String, value: Value },
}

impl Criterion {
    pub fn matches(&self, process: &IssuanceProcess) -> bool {
        match self {
            Self::State(state) => process.state() == *state,
            Self::StateIn(states) => states.contains(&process.state()),
            Self::HolderId(holder) => process.holder_id() == holder,
            Self::ParticipantContextId(id) => process.participant_context_id() == id,
            Self::CredentialDefinition(id) => {
                process.credential_definitions().iter().any(|d| d == id)
            }
            Self::Claim { path, value } => {
                mapping::lookup(process.claims(), path).is_ok_and(|found| found == value)
            }
        }
    }
}

/// States a filter restricts to, if any state criterion is present.
///
/// Lets SQL-backed stores push the state condition into the query; the
/// remaining criteria are still applied in memory.
pub fn state_restriction(filter: &[Criterion]) -> Option<Vec<IssuanceProcessState>> {
    let mut allowed: Option<Vec<IssuanceProcessState>> = None;
    for criterion in filter {
        let states = match criterion {
            Criterion::State(state) => vec![*state],
            Criterion::StateIn(states) => states.clone(),
            _ => continue,
        };
        allowed = Some(match allowed {
            None => states,
            Some(current) => current.into_iter().filter(|s| states.contains(s)).collect(),
        });
    }
    allowed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    StateTimestamp,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filter, sort and page over stored processes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Vec<Criterion>,
    pub sort: SortField,
    pub order: SortOrder,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl QuerySpec {
    /// Every process, oldest first.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.filter.push(criterion);
        self
    }

    pub fn sorted_by(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn paged(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, process: &IssuanceProcess) -> bool {
        self.filter.iter().all(|c| c.matches(process))
    }

    /// Apply filter, sort, offset and limit to a set of processes.
    pub fn apply(&self, processes: impl IntoIterator<Item = IssuanceProcess>) -> Vec<IssuanceProcess> {
        let mut selected: Vec<IssuanceProcess> =
            processes.into_iter().filter(|p| self.matches(p)).collect();

        selected.sort_by(|a, b| {
            let ordering = match self.sort {
                SortField::CreatedAt => a.created_at().cmp(&b.created_at()),
                SortField::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
                SortField::StateTimestamp => a.state_timestamp().cmp(&b.state_timestamp()),
                SortField::Id => a.id().cmp(b.id()),
            }
            .then_with(|| a.id().cmp(b.id()));
            match self.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        selected
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}
