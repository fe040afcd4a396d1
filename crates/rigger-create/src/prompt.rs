//! Questions and the prompter that answers them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stderr, Stdin,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{CreateError, CreateResult};

/// Answers keyed by question name.
pub type Answers = Map<String, Value>;

/// How a question is asked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    #[default]
    Input,
    Confirm,
    Select,
}

/// A question contributed through `addQuestions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed answers for [`QuestionKind::Select`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl Question {
    /// Creates a free-text question.
    pub fn input(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            kind: QuestionKind::Input,
            default: None,
            choices: Vec::new(),
        }
    }

    /// Creates a yes/no question.
    pub fn confirm(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: QuestionKind::Confirm,
            ..Self::input(name, message)
        }
    }

    /// Creates a question answered by one of `choices`.
    pub fn select<I, S>(name: impl Into<String>, message: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: QuestionKind::Select,
            choices: choices.into_iter().map(Into::into).collect(),
            ..Self::input(name, message)
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns the prompt line shown in a terminal.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("? {}", self.message);
        if self.kind == QuestionKind::Select {
            for (i, choice) in self.choices.iter().enumerate() {
                out.push_str(&format!("\n  {}) {choice}", i + 1));
            }
            out.push('\n');
        }
        match (&self.default, self.kind) {
            (Some(Value::String(s)), _) => out.push_str(&format!(" ({s})")),
            (Some(Value::Bool(true)), QuestionKind::Confirm) => out.push_str(" (Y/n)"),
            (_, QuestionKind::Confirm) => out.push_str(" (y/N)"),
            (Some(other), _) => out.push_str(&format!(" ({other})")),
            (None, _) => {}
        }
        out.push_str(": ");
        out
    }

    /// Interprets typed text. An empty answer falls back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`CreateError::InvalidAnswer`] when the text does not fit the
    /// question and [`CreateError::MissingAnswer`] when it is empty and there
    /// is nothing to fall back to.
    pub fn parse_answer(&self, input: &str) -> CreateResult<Value> {
        let input = input.trim();
        if input.is_empty() {
            return self.fallback();
        }

        match self.kind {
            QuestionKind::Input => Ok(Value::String(input.to_string())),
            QuestionKind::Confirm => match input.to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" => Ok(Value::Bool(true)),
                "n" | "no" | "false" => Ok(Value::Bool(false)),
                _ => Err(self.invalid("expected yes or no")),
            },
            QuestionKind::Select => {
                let by_index = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.choices.get(i));
                by_index
                    .or_else(|| self.choices.iter().find(|c| c.as_str() == input))
                    .map(|choice| Value::String(choice.clone()))
                    .ok_or_else(|| {
                        self.invalid(&format!("expected one of {}", self.choices.join(", ")))
                    })
            }
        }
    }

    /// Checks an answer supplied up front. Strings are parsed like typed
    /// text; other values are taken as they are.
    ///
    /// # Errors
    ///
    /// See [`Question::parse_answer`].
    pub fn accept(&self, value: &Value) -> CreateResult<Value> {
        match value {
            Value::String(s) if self.kind != QuestionKind::Input => self.parse_answer(s),
            other => Ok(other.clone()),
        }
    }

    /// Returns the answer used when nothing was typed.
    ///
    /// # Errors
    ///
    /// Returns [`CreateError::MissingAnswer`] when there is no default.
    pub fn fallback(&self) -> CreateResult<Value> {
        match (&self.default, self.kind) {
            (Some(value), _) => Ok(value.clone()),
            (None, QuestionKind::Confirm) => Ok(Value::Bool(false)),
            (None, _) => Err(CreateError::MissingAnswer(self.name.clone())),
        }
    }

    fn invalid(&self, reason: &str) -> CreateError {
        CreateError::InvalidAnswer {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Answers the questions collected by `addQuestions`.
///
/// `initial` holds answers supplied up front (command-line pairs); they are
/// kept in the result and their questions are not asked.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn prompt(&self, questions: &[Question], initial: &Answers) -> CreateResult<Answers>;
}

/// Never asks: uses initial answers, then defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractivePrompter;

#[async_trait]
impl Prompter for NonInteractivePrompter {
    async fn prompt(&self, questions: &[Question], initial: &Answers) -> CreateResult<Answers> {
        let mut answers = initial.clone();
        for question in questions {
            let value = match initial.get(&question.name) {
                Some(value) => question.accept(value)?,
                None => question.fallback()?,
            };
            debug!(name = %question.name, %value, "answered");
            answers.insert(question.name.clone(), value);
        }
        Ok(answers)
    }
}

/// Asks each question on a line-based terminal, again after an answer
/// that does not parse.
pub struct TerminalPrompter<R, W> {
    io: Mutex<(BufReader<R>, W)>,
}

impl TerminalPrompter<Stdin, Stderr> {
    /// Reads answers from stdin and writes questions to stderr.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stderr())
    }
}

impl<R, W> TerminalPrompter<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((BufReader::new(reader), writer)),
        }
    }

    /// Returns the writer, e.g. to inspect what was printed.
    pub fn into_writer(self) -> W {
        self.io.into_inner().1
    }
}

#[async_trait]
impl<R, W> Prompter for TerminalPrompter<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn prompt(&self, questions: &[Question], initial: &Answers) -> CreateResult<Answers> {
        let mut answers = initial.clone();
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        for question in questions {
            let value = if let Some(value) = initial.get(&question.name) {
                question.accept(value)?
            } else {
                // Ask until the answer parses or input runs out.
                loop {
                    writer.write_all(question.render().as_bytes()).await?;
                    writer.flush().await?;

                    let mut line = String::new();
                    if reader.read_line(&mut line).await? == 0 {
                        break question.fallback()?;
                    }
                    match question.parse_answer(&line) {
                        Ok(value) => break value,
                        Err(err) => {
                            debug!(name = %question.name, %err, "asking again");
                            writer.write_all(format!("  {err}\n").as_bytes()).await?;
                        }
                    }
                }
            };
            answers.insert(question.name.clone(), value);
        }
        Ok(answers)
    }
}
