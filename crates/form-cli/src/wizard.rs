use std::io::{BufRead, Write};

use form_spec::{AnswerMap, AnswerValue, FormSpec, QuestionSpec, QuestionType, Responder};

/// Controls which bits of state the prompt prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: question prompts only.
    Clean,
    /// Verbose output: introduction, help text and choices.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

/// Hint appended to a prompt line for the question's type.
pub fn type_hint(question: &QuestionSpec) -> Option<String> {
    match question.kind {
        QuestionType::Bool => Some("(yes/no, y/n, true/false)".to_string()),
        QuestionType::Single if !question.options.is_empty() => {
            Some(format!("({})", question.options.join("/")))
        }
        QuestionType::Multiselect => Some("(comma separated)".to_string()),
        _ => None,
    }
}

/// Parses one line of input for `question`. `Ok(None)` means "no answer".
pub fn parse_answer(
    question: &QuestionSpec,
    raw: &str,
) -> Result<Option<AnswerValue>, AnswerParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match question.kind {
        QuestionType::Bool => parse_boolean(raw).map(Some),
        QuestionType::Single => parse_choice(question, raw).map(|choice| Some(choice.into())),
        QuestionType::Multiselect => {
            let mut chosen = Vec::new();
            for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
                let choice = parse_choice(question, part)?;
                if !chosen.contains(&choice) {
                    chosen.push(choice);
                }
            }
            Ok(Some(AnswerValue::Multi(chosen)))
        }
        QuestionType::Text => Ok(Some(AnswerValue::Single(raw.to_string()))),
        QuestionType::Statement => Ok(None),
    }
}

fn parse_boolean(raw: &str) -> Result<AnswerValue, AnswerParseError> {
    match raw.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(AnswerValue::Flag(true)),
        "false" | "f" | "no" | "n" | "0" => Ok(AnswerValue::Flag(false)),
        _ => Err(AnswerParseError::new(
            "Please enter yes or no.",
            Some("expected boolean (y/n/true/false)".to_string()),
        )),
    }
}

/// Accepts an option by name (case-insensitive) or by its 1-based number.
fn parse_choice(question: &QuestionSpec, raw: &str) -> Result<String, AnswerParseError> {
    if let Some(choice) = question
        .options
        .iter()
        .find(|choice| choice.eq_ignore_ascii_case(raw))
    {
        return Ok(choice.clone());
    }
    if let Ok(index) = raw.parse::<usize>()
        && let Some(choice) = index.checked_sub(1).and_then(|i| question.options.get(i))
    {
        return Ok(choice.clone());
    }
    Err(AnswerParseError::new(
        format!("Choose one of: {}.", question.options.join(", ")),
        Some(format!("allowed values: {}", question.options.join(", "))),
    ))
}

/// Asks each visible question on `output` and reads replies from `input`.
///
/// An empty reply keeps the current answer, then falls back to the question's
/// default. Typing `exit` aborts the run.
pub struct PromptResponder<R, W> {
    input: R,
    output: W,
    verbosity: Verbosity,
    asked: usize,
}

impl<R: BufRead, W: Write> PromptResponder<R, W> {
    pub fn new(input: R, output: W, verbosity: Verbosity) -> Self {
        Self {
            input,
            output,
            verbosity,
            asked: 0,
        }
    }

    pub fn show_header(&mut self, spec: &FormSpec) -> std::io::Result<()> {
        writeln!(self.output, "Form: {}", spec.title())?;
        if self.verbosity.is_verbose()
            && let Some((heading, paragraphs)) = spec.page.introduction()
        {
            writeln!(self.output, "{}", heading)?;
            for paragraph in paragraphs {
                writeln!(self.output, "  {}", paragraph)?;
            }
        }
        Ok(())
    }

    pub fn show_completion(&mut self, spec: &FormSpec, answers: &AnswerMap) -> std::io::Result<()> {
        writeln!(self.output, "{}", spec.page.success_message())?;
        writeln!(self.output, "Answered {} question(s).", answers.len())
    }

    fn show_prompt(
        &mut self,
        question: &QuestionSpec,
        current: Option<&AnswerValue>,
    ) -> std::io::Result<()> {
        let mut line = format!("{}. {}", self.asked, question.display_label());
        if let Some(hint) = type_hint(question) {
            line.push(' ');
            line.push_str(&hint);
        }
        let fallback = current.or(question.default.as_ref());
        if let Some(value) = fallback {
            line.push_str(&format!(" [{}]", value.display()));
        }
        writeln!(self.output, "{}", line)?;
        if let Some(help) = &question.help {
            writeln!(self.output, "{}", help)?;
        }
        if self.verbosity.is_verbose() && !question.options.is_empty() {
            for (index, option) in question.options.iter().enumerate() {
                writeln!(self.output, "  {}) {}", index + 1, option)?;
            }
        }
        write!(self.output, "> ")?;
        self.output.flush()
    }

    fn show_parse_error(&mut self, error: &AnswerParseError) -> std::io::Result<()> {
        writeln!(self.output, "Invalid answer: {}", error.user_message)?;
        if self.verbosity.is_verbose()
            && let Some(debug) = &error.debug_message
        {
            writeln!(self.output, "  Expected: {}", debug)?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Responder for PromptResponder<R, W> {
    type Error = Box<dyn std::error::Error>;

    fn answer(
        &mut self,
        question: &QuestionSpec,
        current: Option<&AnswerValue>,
    ) -> Result<Option<AnswerValue>, Self::Error> {
        self.asked += 1;
        loop {
            self.show_prompt(question, current)?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err("input ended before the form was complete".into());
            }
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("exit") {
                return Err("form aborted by user".into());
            }
            if trimmed.is_empty() {
                return Ok(current.cloned().or_else(|| question.default.clone()));
            }
            match parse_answer(question, trimmed) {
                Ok(value) => return Ok(value),
                Err(err) => self.show_parse_error(&err)?,
            }
        }
    }
}
