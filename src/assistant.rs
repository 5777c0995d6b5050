//! Generative-AI helpers.
//!
//! The provider sits behind the [`Assistant`] trait: it receives a structured
//! [`AssistantRequest`] and answers with raw text, usually JSON. This module
//! parses and clamps those answers and maps provider failures to sentences a
//! user can read. A failed helper call never takes a view down with it.

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::{DevelopmentResource, NewDevelopmentPlan, NewTask, Task};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistantError {
    #[error("assistant service unavailable")]
    Unavailable,
    #[error("assistant rejected the request")]
    BadRequest,
    #[error("assistant rate limited")]
    RateLimited,
    #[error("assistant response could not be read: {0}")]
    Malformed(String),
    #[error("assistant failed: {0}")]
    Unknown(String),
}

impl AssistantError {
    /// Classify a provider failure by what its message mentions.
    pub fn from_provider_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if mentions(&["500", "503", "rpc failed", "unavailable"]) {
            AssistantError::Unavailable
        } else if mentions(&["400", "bad request"]) {
            AssistantError::BadRequest
        } else if mentions(&["429", "quota"]) {
            AssistantError::RateLimited
        } else {
            AssistantError::Unknown(message.to_string())
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AssistantError::Unavailable => {
                "The AI service seems to be temporarily unavailable. Please try again in a few moments."
            }
            AssistantError::BadRequest => "There was a problem processing this request with the AI.",
            AssistantError::RateLimited => {
                "The AI service is currently experiencing high demand. Please try again later."
            }
            AssistantError::Malformed(_) | AssistantError::Unknown(_) => {
                "An unexpected error occurred. Please check your connection and try again."
            }
        }
    }
}

/// Screens the assistant may suggest navigating to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum View {
    Dashboard,
    Goals,
    Weekly,
    Schedule,
    Financials,
    PersonalDevelopment,
    Analytics,
    Agents,
}

impl View {
    pub fn id(&self) -> &'static str {
        match self {
            View::Dashboard => "dashboard",
            View::Goals => "goals",
            View::Weekly => "weekly",
            View::Schedule => "schedule",
            View::Financials => "financials",
            View::PersonalDevelopment => "personalDevelopment",
            View::Analytics => "analytics",
            View::Agents => "agents",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub name: String,
    pub due: Option<NaiveDate>,
    pub impact: u8,
    pub effort: u8,
    pub completed: bool,
    pub goal_id: Option<i64>,
}

impl From<&Task> for TaskSummary {
    fn from(t: &Task) -> Self {
        TaskSummary {
            name: t.name.clone(),
            due: t.due_date,
            impact: t.impact,
            effort: t.effort,
            completed: t.completed,
            goal_id: t.goal_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalSummary {
    pub id: i64,
    pub name: String,
    pub progress: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineSummary {
    pub name: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSummary {
    pub desc: String,
    pub amount: f64,
    pub category: String,
}

/// Snapshot of the user's data handed to the chat assistant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantContext {
    pub current_view: View,
    pub tasks: Vec<TaskSummary>,
    pub goals: Vec<GoalSummary>,
    /// Today's routines only
    pub schedule: Vec<RoutineSummary>,
    /// The five most recent transactions
    pub transactions: Vec<TransactionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssistantRequest {
    TaskSuggestions { task_name: String },
    MoreTags { task_name: String, description: String },
    GoalBreakdown { goal_name: String, goal_description: String },
    DevelopmentPlan { goal: String, books: usize, channels: usize, podcasts: usize },
    AlternativeResource { goal: String, resource: String },
    Prioritize { tasks: Vec<TaskSummary> },
    GoalStrategy { goal: GoalSummary, description: String },
    Chat { query: String, context: AssistantContext },
}

/// A text-generation provider.
pub trait Assistant {
    /// Answer `request` with raw text. Provider failures should already be
    /// classified, e.g. with [`AssistantError::from_provider_message`].
    fn complete(&self, request: &AssistantRequest) -> Result<String, AssistantError>;
}

/// Replays a fixed answer for every request. Lets an answer produced
/// elsewhere be fed through the same parsing as a live one.
#[derive(Debug, Clone)]
pub struct CannedAssistant {
    answer: Result<String, AssistantError>,
}

impl CannedAssistant {
    pub fn answering(text: impl Into<String>) -> Self {
        Self { answer: Ok(text.into()) }
    }

    pub fn failing(error: AssistantError) -> Self {
        Self { answer: Err(error) }
    }
}

impl Assistant for CannedAssistant {
    fn complete(&self, _request: &AssistantRequest) -> Result<String, AssistantError> {
        self.answer.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSuggestion {
    pub description: String,
    pub effort: u8,
    pub impact: u8,
    pub tags: Vec<String>,
}

impl TaskSuggestion {
    /// A dashboard task draft named `name` carrying the suggested values.
    pub fn into_task(self, name: impl Into<String>) -> NewTask {
        NewTask {
            description: self.description,
            effort: self.effort,
            impact: self.impact,
            tags: self.tags,
            ..NewTask::new(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantResponse {
    Answer(String),
    Navigate { view: View, text: String },
}

/// Missing, zero or non-numeric scores take the default; the rest are
/// rounded and clamped into range. Providers do answer `4.5`.
fn clamp_score(raw: Option<f64>, max: u8, default: u8) -> u8 {
    match raw {
        Some(value) if value.is_finite() && value != 0.0 => value.round().clamp(1.0, f64::from(max)) as u8,
        _ => default,
    }
}

fn clamp_effort(raw: Option<f64>) -> u8 {
    clamp_score(raw, 5, 3)
}

fn clamp_impact(raw: Option<f64>) -> u8 {
    clamp_score(raw, 10, 5)
}

/// Providers sometimes wrap JSON in a markdown fence.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn parse_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, AssistantError> {
    serde_json::from_str(strip_fence(text)).map_err(|e| {
        warn!("Unreadable assistant response: {}", e);
        AssistantError::Malformed(e.to_string())
    })
}

#[derive(Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    description: String,
    effort: Option<f64>,
    impact: Option<f64>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct RawTags {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct RawBreakdownTask {
    name: String,
    #[serde(default)]
    description: String,
    effort: Option<f64>,
    impact: Option<f64>,
}

#[derive(Deserialize)]
struct RawBreakdown {
    #[serde(default)]
    tasks: Vec<RawBreakdownTask>,
}

#[derive(Deserialize)]
struct RawResource {
    title: String,
    #[serde(rename = "authorOrChannel", default)]
    author_or_channel: String,
}

impl From<RawResource> for DevelopmentResource {
    fn from(raw: RawResource) -> Self {
        DevelopmentResource {
            title: raw.title,
            author_or_channel: raw.author_or_channel,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    #[serde(default)]
    books: Vec<RawResource>,
    #[serde(default)]
    youtube_channels: Vec<RawResource>,
    #[serde(default)]
    podcasts: Vec<RawResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChat {
    response_type: String,
    text: String,
    view: Option<String>,
}

pub fn parse_task_suggestion(text: &str) -> Result<TaskSuggestion, AssistantError> {
    let raw: RawSuggestion = parse_json(text)?;
    Ok(TaskSuggestion {
        description: raw.description,
        effort: clamp_effort(raw.effort),
        impact: clamp_impact(raw.impact),
        tags: raw.tags,
    })
}

/// Tags arrive either bare (`["a","b"]`) or wrapped (`{"tags": [...]}`).
pub fn parse_tags(text: &str) -> Result<Vec<String>, AssistantError> {
    let body = strip_fence(text);
    if let Ok(tags) = serde_json::from_str::<Vec<String>>(body) {
        return Ok(tags);
    }
    parse_json::<RawTags>(body).map(|raw| raw.tags)
}

/// Breakdown items become backlog task drafts for `goal_id`.
pub fn parse_goal_breakdown(text: &str, goal_id: i64) -> Result<Vec<NewTask>, AssistantError> {
    let raw: RawBreakdown = parse_json(text)?;
    Ok(raw
        .tasks
        .into_iter()
        .filter(|t| !t.name.trim().is_empty())
        .map(|t| NewTask {
            description: t.description,
            impact: clamp_impact(t.impact),
            effort: clamp_effort(t.effort),
            goal_id: Some(goal_id),
            ..NewTask::new(t.name)
        })
        .collect())
}

pub fn parse_development_plan(text: &str, goal: &str) -> Result<NewDevelopmentPlan, AssistantError> {
    let raw: RawPlan = parse_json(text)?;
    Ok(NewDevelopmentPlan {
        goal: goal.to_string(),
        books: raw.books.into_iter().map(Into::into).collect(),
        youtube_channels: raw.youtube_channels.into_iter().map(Into::into).collect(),
        podcasts: raw.podcasts.into_iter().map(Into::into).collect(),
    })
}

pub fn parse_resource(text: &str) -> Result<DevelopmentResource, AssistantError> {
    parse_json::<RawResource>(text).map(Into::into)
}

/// A navigation suggestion must name a known view; anything else is
/// treated as a plain answer.
pub fn parse_chat_response(text: &str) -> Result<AssistantResponse, AssistantError> {
    let raw: RawChat = parse_json(text)?;
    if raw.response_type == "navigation_suggestion" {
        let view = raw
            .view
            .as_deref()
            .and_then(|id| serde_json::from_value::<View>(serde_json::Value::String(id.to_string())).ok());
        match view {
            Some(view) => return Ok(AssistantResponse::Navigate { view, text: raw.text }),
            None => warn!("Navigation suggestion with unknown view {:?}", raw.view),
        }
    }
    Ok(AssistantResponse::Answer(raw.text))
}

pub fn suggest_task(assistant: &dyn Assistant, task_name: &str) -> Result<TaskSuggestion, AssistantError> {
    let request = AssistantRequest::TaskSuggestions {
        task_name: task_name.to_string(),
    };
    parse_task_suggestion(&assistant.complete(&request)?)
}

pub fn suggest_more_tags(
    assistant: &dyn Assistant,
    task_name: &str,
    description: &str,
) -> Result<Vec<String>, AssistantError> {
    let request = AssistantRequest::MoreTags {
        task_name: task_name.to_string(),
        description: description.to_string(),
    };
    parse_tags(&assistant.complete(&request)?)
}

pub fn break_down_goal(
    assistant: &dyn Assistant,
    goal_id: i64,
    goal_name: &str,
    goal_description: &str,
) -> Result<Vec<NewTask>, AssistantError> {
    let request = AssistantRequest::GoalBreakdown {
        goal_name: goal_name.to_string(),
        goal_description: goal_description.to_string(),
    };
    parse_goal_breakdown(&assistant.complete(&request)?, goal_id)
}

pub fn plan_development(
    assistant: &dyn Assistant,
    goal: &str,
    books: usize,
    channels: usize,
    podcasts: usize,
) -> Result<NewDevelopmentPlan, AssistantError> {
    let request = AssistantRequest::DevelopmentPlan {
        goal: goal.to_string(),
        books,
        channels,
        podcasts,
    };
    parse_development_plan(&assistant.complete(&request)?, goal)
}

pub fn alternative_resource(
    assistant: &dyn Assistant,
    goal: &str,
    resource: &str,
) -> Result<DevelopmentResource, AssistantError> {
    let request = AssistantRequest::AlternativeResource {
        goal: goal.to_string(),
        resource: resource.to_string(),
    };
    parse_resource(&assistant.complete(&request)?)
}

/// Free-text answers pass through trimmed; an empty one is unusable.
fn complete_text(assistant: &dyn Assistant, request: &AssistantRequest) -> Result<String, AssistantError> {
    let text = assistant.complete(request)?;
    let text = text.trim();
    if text.is_empty() {
        warn!("Empty assistant response");
        return Err(AssistantError::Malformed("empty response".to_string()));
    }
    Ok(text.to_string())
}

/// The three pending tasks most worth doing next, as a short numbered list.
pub fn prioritize(assistant: &dyn Assistant, tasks: Vec<TaskSummary>) -> Result<String, AssistantError> {
    complete_text(assistant, &AssistantRequest::Prioritize { tasks })
}

pub fn goal_strategy(
    assistant: &dyn Assistant,
    goal: GoalSummary,
    description: &str,
) -> Result<String, AssistantError> {
    let request = AssistantRequest::GoalStrategy {
        goal,
        description: description.to_string(),
    };
    complete_text(assistant, &request)
}

/// Ask the chat assistant. Failures become an apologetic answer instead of
/// an error.
pub fn chat(assistant: &dyn Assistant, query: &str, context: AssistantContext) -> AssistantResponse {
    let request = AssistantRequest::Chat {
        query: query.to_string(),
        context,
    };
    match assistant.complete(&request).and_then(|text| parse_chat_response(&text)) {
        Ok(response) => response,
        Err(e) => {
            error!("Error trying to get AI assistant response: {}", e);
            AssistantResponse::Answer(format!("I'm sorry, I've encountered an issue. {}", e.user_message()))
        }
    }
}
