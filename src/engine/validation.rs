use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Insertion request as it arrives from a host boundary: every field may be
/// missing and the status is free text.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    pub owner: Option<PersonRef>,
    pub status: Option<String>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub description: Option<String>,
}

/// A validated insertion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub owner: PersonRef,
    pub status: Status,
    pub span: Span,
    pub description: Option<String>,
}

impl RecordDraft {
    pub fn validate(self) -> Result<NewRecord, EngineError> {
        let status = self.status.as_deref().map(str::parse::<Status>).transpose()?;
        validate_fields(self.owner, status, self.start, self.end, self.description)
    }
}

pub(crate) fn validate_fields(
    owner: Option<PersonRef>,
    status: Option<Status>,
    start: Option<Ms>,
    end: Option<Ms>,
    description: Option<String>,
) -> Result<NewRecord, EngineError> {
    let mut missing = Vec::new();
    if owner.is_none() {
        missing.push("owner");
    }
    if status.is_none() {
        missing.push("status");
    }
    if start.is_none() {
        missing.push("start");
    }
    if end.is_none() {
        missing.push("end");
    }
    let (Some(owner), Some(status), Some(start), Some(end)) = (owner, status, start, end) else {
        return Err(EngineError::Validation(format!("missing {}", missing.join(", "))));
    };

    validate_timestamp(start)?;
    validate_timestamp(end)?;
    let span = Span::try_new(start, end)?;

    if let Some(ref d) = description
        && d.len() > MAX_DESCRIPTION_LEN {
            return Err(EngineError::Validation("description too long".into()));
        }

    Ok(NewRecord {
        owner,
        status,
        span,
        description,
    })
}

fn validate_timestamp(t: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
        return Err(EngineError::Validation(format!("timestamp out of range: {t}")));
    }
    Ok(())
}
