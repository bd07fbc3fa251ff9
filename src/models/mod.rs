pub mod validation;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub use validation::ValidationError;
use validation::{optional_text, required_text};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_OPTION_TEXT_LEN: usize = 200;
pub const MAX_ATTRIBUTE_LEN: usize = 64;
pub const MIN_OPTIONS: usize = 2;

lazy_static! {
    static ref AGE_RANGE: Regex = Regex::new(r"^(\d{2}-\d{2}|\d{2}\+)$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub vote_type: VoteType,
    pub status: PollStatus,
    pub is_public: bool,
    pub results_visibility: ResultsVisibility,
    pub allow_multiple: bool,
    pub max_votes_per_user: u32,
    pub max_choices: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub is_featured: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub poll_id: String,
    pub text: String,
    pub position: i64,
}

macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ValidationError::InvalidVariant {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Single,
    Multiple,
    Ranking,
}

string_enum!(VoteType, "vote_type", {
    Single => "single",
    Multiple => "multiple",
    Ranking => "ranking",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Draft,
    Open,
    Paused,
    Closed,
}

string_enum!(PollStatus, "status", {
    Draft => "draft",
    Open => "open",
    Paused => "paused",
    Closed => "closed",
});

/// Who may see a poll's results besides administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultsVisibility {
    Live,
    AfterVote,
    AfterClose,
    AdminOnly,
}

string_enum!(ResultsVisibility, "results_visibility", {
    Live => "live",
    AfterVote => "after_vote",
    AfterClose => "after_close",
    AdminOnly => "admin_only",
});

impl Poll {
    /// Whether the end date has passed or the poll was closed explicitly.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.status == PollStatus::Closed || self.end_date.is_some_and(|end| end <= now)
    }

    /// Publicly listed polls: flagged public and no longer drafts.
    pub fn is_listed(&self) -> bool {
        self.is_public && self.status != PollStatus::Draft
    }

    /// Maximum number of options a multiple-choice ballot may select.
    pub fn effective_max_choices(&self) -> usize {
        self.max_choices
            .map(|c| c as usize)
            .unwrap_or(self.options.len())
            .min(self.options.len())
    }

    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    /// Checks the rules that tie settings together. Called after creation
    /// and after every update.
    pub fn check_rules(&self) -> Result<(), ValidationError> {
        if !self.allow_multiple && self.max_votes_per_user != 1 {
            return Err(ValidationError::OutOfRange {
                field: "max_votes_per_user",
                reason: "must be 1 when allow_multiple is false".to_string(),
            });
        }
        if self.allow_multiple && self.max_votes_per_user < 2 {
            return Err(ValidationError::OutOfRange {
                field: "max_votes_per_user",
                reason: "must be at least 2 when allow_multiple is true".to_string(),
            });
        }
        if let Some(max_choices) = self.max_choices {
            if self.vote_type != VoteType::Multiple {
                return Err(ValidationError::OutOfRange {
                    field: "max_choices",
                    reason: "only applies to multiple-choice polls".to_string(),
                });
            }
            if max_choices == 0 || max_choices as usize > self.options.len() {
                return Err(ValidationError::OutOfRange {
                    field: "max_choices",
                    reason: format!("must be between 1 and {}", self.options.len()),
                });
            }
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(ValidationError::DateOrder);
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_open() -> PollStatus {
    PollStatus::Open
}

fn default_live() -> ResultsVisibility {
    ResultsVisibility::Live
}

/// Body of a poll creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPoll {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub vote_type: VoteType,
    pub options: Vec<String>,
    #[serde(default = "default_open")]
    pub status: PollStatus,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_live")]
    pub results_visibility: ResultsVisibility,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub max_votes_per_user: Option<u32>,
    #[serde(default)]
    pub max_choices: Option<u32>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl NewPoll {
    pub fn into_poll(self, created_by: &str, now: DateTime<Utc>) -> Result<Poll, ValidationError> {
        let title = required_text("title", &self.title, MAX_TITLE_LEN)?;
        let description = match self.description.as_deref() {
            Some(d) => optional_text("description", d, MAX_DESCRIPTION_LEN)?,
            None => None,
        };

        if self.options.len() < MIN_OPTIONS {
            return Err(ValidationError::OutOfRange {
                field: "options",
                reason: format!("at least {} options are required", MIN_OPTIONS),
            });
        }
        let texts = normalize_option_texts(&self.options)?;

        if self.end_date.is_some_and(|end| end <= now) {
            return Err(ValidationError::EndInPast);
        }

        let max_votes_per_user = self
            .max_votes_per_user
            .unwrap_or(if self.allow_multiple { 2 } else { 1 });

        let id = Uuid::new_v4().to_string();
        let options = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| PollOption {
                id: Uuid::new_v4().to_string(),
                poll_id: id.clone(),
                text,
                position: i as i64,
            })
            .collect();

        let poll = Poll {
            id,
            title,
            description,
            vote_type: self.vote_type,
            status: self.status,
            is_public: self.is_public,
            results_visibility: self.results_visibility,
            allow_multiple: self.allow_multiple,
            max_votes_per_user,
            max_choices: self.max_choices,
            start_date: self.start_date,
            end_date: self.end_date,
            image_url: None,
            is_featured: false,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            options,
        };
        poll.check_rules()?;
        Ok(poll)
    }
}

/// Validates option texts and rejects case-insensitive duplicates.
pub fn normalize_option_texts(raw: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut seen = HashSet::new();
    let mut texts = Vec::with_capacity(raw.len());
    for text in raw {
        let text = required_text("option", text, MAX_OPTION_TEXT_LEN)?;
        if !seen.insert(text.to_lowercase()) {
            return Err(ValidationError::Duplicate { field: "option", value: text });
        }
        texts.push(text);
    }
    Ok(texts)
}

// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of poll settings. `null` clears nullable fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub results_visibility: Option<ResultsVisibility>,
    #[serde(default)]
    pub allow_multiple: Option<bool>,
    #[serde(default)]
    pub max_votes_per_user: Option<u32>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_choices: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
}

impl PollUpdate {
    /// Applies the update in place and returns the names of changed fields.
    pub fn apply_to(&self, poll: &mut Poll, now: DateTime<Utc>) -> Result<Vec<&'static str>, ValidationError> {
        let mut changed = Vec::new();

        if let Some(title) = &self.title {
            poll.title = required_text("title", title, MAX_TITLE_LEN)?;
            changed.push("title");
        }
        if let Some(description) = &self.description {
            poll.description = match description {
                Some(d) => optional_text("description", d, MAX_DESCRIPTION_LEN)?,
                None => None,
            };
            changed.push("description");
        }
        if let Some(visibility) = self.results_visibility {
            poll.results_visibility = visibility;
            changed.push("results_visibility");
        }
        if let Some(allow_multiple) = self.allow_multiple {
            poll.allow_multiple = allow_multiple;
            // Keep the pair consistent when only the flag is sent.
            if self.max_votes_per_user.is_none() {
                poll.max_votes_per_user = match (allow_multiple, poll.max_votes_per_user) {
                    (false, _) => 1,
                    (true, n) if n < 2 => 2,
                    (true, n) => n,
                };
            }
            changed.push("allow_multiple");
        }
        if let Some(max_votes) = self.max_votes_per_user {
            poll.max_votes_per_user = max_votes;
            changed.push("max_votes_per_user");
        }
        if let Some(max_choices) = self.max_choices {
            poll.max_choices = max_choices;
            changed.push("max_choices");
        }
        if let Some(start_date) = self.start_date {
            poll.start_date = start_date;
            changed.push("start_date");
        }
        if let Some(end_date) = self.end_date {
            poll.end_date = end_date;
            changed.push("end_date");
        }

        poll.check_rules()?;
        if !changed.is_empty() {
            poll.updated_at = now;
        }
        Ok(changed)
    }
}

/// A ballot as submitted by a voter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Ballot {
    Single { option_id: String },
    Multiple { option_ids: Vec<String> },
    Ranking { ranking: Vec<String> },
}

impl Ballot {
    pub fn vote_type(&self) -> VoteType {
        match self {
            Self::Single { .. } => VoteType::Single,
            Self::Multiple { .. } => VoteType::Multiple,
            Self::Ranking { .. } => VoteType::Ranking,
        }
    }
}

/// A ballot that passed validation, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidBallot {
    Single(String),
    Multiple(Vec<String>),
    /// Option ids paired with their 1-based rank.
    Ranking(Vec<(String, i64)>),
}

/// A stored ballot as shown back to its voter.
#[derive(Debug, Clone, Serialize)]
pub struct VoteRecord {
    pub id: String,
    pub poll_id: String,
    pub created_at: DateTime<Utc>,
    /// Selected option ids; ranking ballots list them best first.
    pub option_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantAttributes {
    pub user_id: String,
    pub age_range: Option<String>,
    pub region: Option<String>,
    pub gender: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributesUpdate {
    #[serde(default)]
    pub age_range: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl AttributesUpdate {
    pub fn into_attributes(self, user_id: &str, now: DateTime<Utc>) -> Result<ParticipantAttributes, ValidationError> {
        let age_range = match self.age_range.as_deref() {
            Some(raw) => {
                let value = optional_text("age_range", raw, MAX_ATTRIBUTE_LEN)?;
                if let Some(v) = &value {
                    if !AGE_RANGE.is_match(v) {
                        return Err(ValidationError::InvalidFormat {
                            field: "age_range",
                            reason: "expected NN-NN or NN+",
                        });
                    }
                }
                value
            }
            None => None,
        };
        let region = match self.region.as_deref() {
            Some(raw) => optional_text("region", raw, MAX_ATTRIBUTE_LEN)?,
            None => None,
        };
        let gender = match self.gender.as_deref() {
            Some(raw) => optional_text("gender", raw, MAX_ATTRIBUTE_LEN)?,
            None => None,
        };
        Ok(ParticipantAttributes {
            user_id: user_id.to_string(),
            age_range,
            region,
            gender,
            updated_at: now,
        })
    }
}

/// Participant attribute used to segment voters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    AgeRange,
    Region,
    Gender,
}

string_enum!(Attribute, "attribute", {
    AgeRange => "age_range",
    Region => "region",
    Gender => "gender",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CreatePoll,
    UpdatePoll,
    DeletePoll,
    SetStatus,
    SetVisibility,
    AddOption,
    UpdateOption,
    DeleteOption,
    UploadImage,
    FeaturePoll,
    AutoClose,
}

string_enum!(AuditAction, "action", {
    CreatePoll => "create_poll",
    UpdatePoll => "update_poll",
    DeletePoll => "delete_poll",
    SetStatus => "set_status",
    SetVisibility => "set_visibility",
    AddOption => "add_option",
    UpdateOption => "update_option",
    DeleteOption => "delete_option",
    UploadImage => "upload_image",
    FeaturePoll => "feature_poll",
    AutoClose => "auto_close",
});

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: String,
    pub admin_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub poll_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(admin_id: &str, action: AuditAction, entity_type: &str, entity_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            admin_id: admin_id.to_string(),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            poll_id: None,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Shorthand for entries about a poll itself.
    pub fn for_poll(admin_id: &str, action: AuditAction, poll_id: &str) -> Self {
        Self::new(admin_id, action, "poll", poll_id).with_poll(poll_id)
    }

    pub fn with_poll(mut self, poll_id: &str) -> Self {
        self.poll_id = Some(poll_id.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
