use schemars::JsonSchema;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::completion::{Client, CompletionModel, Extractor};
use crate::error::Error;

const PROMPT_TEMPLATE: &str = r#"Extract tasks from the following conversation and return them as a JSON object with a "tasks" array.

Text to analyze:
{text}

For each task mentioned, extract:
- title: A clear, concise title for the task
- description: More details about what needs to be done (if available)
- priority: "low", "medium", or "high" based on context clues
- due_date: Date mentioned in YYYY-MM-DD format (if mentioned)

Return the result as a JSON object with this exact structure:
{
  "tasks": [
    {
      "title": "task title",
      "description": "task description",
      "priority": "medium",
      "due_date": "2024-01-15"
    }
  ]
}
"#;

/// Priority level of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A single work item pulled out of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct Task {
    /// A clear, concise title for the task
    pub title: String,
    #[schemars(required)]
    /// More details about what needs to be done, if any were given
    pub description: Option<String>,
    /// Priority level based on context clues
    #[serde(default)]
    pub priority: Priority,
    #[schemars(required)]
    /// Due date in YYYY-MM-DD format, if one was mentioned
    pub due_date: Option<String>,
}

/// The exact shape the model is constrained to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct TaskList {
    /// List of extracted tasks
    pub tasks: Vec<Task>,
}

impl Extractor for TaskList {}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Task title is empty")]
    EmptyTitle,
    #[error("Due date `{0}` is not a YYYY-MM-DD date")]
    BadDueDate(String),
}

impl Task {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if let Some(date) = &self.due_date {
            if !is_iso_date(date) {
                return Err(ValidationError::BadDueDate(date.clone()));
            }
        }
        Ok(())
    }
}

impl TaskList {
    /// One invalid task fails the whole list
    fn validate(&self) -> Result<(), ValidationError> {
        self.tasks.iter().try_for_each(Task::validate)
    }
}

// Shape check only, the calendar is not consulted: `2024-02-30` is accepted
fn is_iso_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        })
}

fn render_prompt(text: &str) -> String {
    PROMPT_TEMPLATE.replace("{text}", text)
}

/// Turns unstructured conversational text into a validated list of [`Task`]s
/// with a single schema-constrained completion request.
pub struct TaskExtractor<M: CompletionModel> {
    client: Client<M>,
}

impl<M: CompletionModel> TaskExtractor<M> {
    #[must_use]
    pub fn new(client: Client<M>) -> Self {
        Self { client }
    }

    /// Extract tasks from `text`, with the failure reason kept observable.
    ///
    /// Errors carry the distinction between transport/provider failures,
    /// malformed model output, and tasks that came back outside the field
    /// constraints.
    pub async fn try_extract(&mut self, text: &str) -> Result<Vec<Task>, Error> {
        let list = self
            .client
            .prompt(render_prompt(text))
            .extract::<TaskList>()
            .await?;
        list.validate()?;
        info!(task_count = list.tasks.len(), "Extracted tasks");
        Ok(list.tasks)
    }

    /// Extract tasks from `text`, degrading to an empty list.
    ///
    /// Every failure is logged and swallowed at this boundary; callers never
    /// see a partially invalid batch, only the validated tasks or nothing.
    pub async fn extract(&mut self, text: &str) -> Vec<Task> {
        match self.try_extract(text).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = ?e, "Error extracting tasks");
                Vec::new()
            }
        }
    }
}
