use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::answers::{AnswerMap, AnswerValue, ValidationError, ValidationResult};
use crate::rule::Operator;
use crate::spec::form::FormSpec;
use crate::spec::question::{QuestionSpec, QuestionType};
use crate::visibility::resolve_visibility;

/// A single configuration problem found in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaIssue {
    #[error("question #{index} has no key")]
    MissingKey { index: usize },
    #[error("duplicate question key '{key}'")]
    DuplicateKey { key: String },
    #[error("question '{question}' references unknown question '{target}' in show_if")]
    UnknownTarget { question: String, target: String },
    #[error(
        "question '{question}' references '{target}' which does not precede it; rules may only depend on earlier questions"
    )]
    ForwardReference { question: String, target: String },
    #[error("question '{question}' uses unknown operator '{operator}'")]
    UnknownOperator { question: String, operator: String },
    #[error("question '{question}' has a '{operator}' clause without a field")]
    MissingField { question: String, operator: String },
    #[error("question '{question}' has a '{operator}' clause without a value")]
    MissingValue { question: String, operator: String },
    #[error("{kind} question '{question}' has no options")]
    MissingOptions { question: String, kind: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid schema: {}", join_issues(.0))]
    Invalid(Vec<SchemaIssue>),
}

impl SchemaError {
    pub fn issues(&self) -> &[SchemaIssue] {
        match self {
            SchemaError::Invalid(issues) => issues,
        }
    }
}

fn join_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks a schema for configuration errors, reporting all of them at once.
pub fn validate_spec(spec: &FormSpec) -> Result<(), SchemaError> {
    let issues = schema_issues(spec);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid(issues))
    }
}

pub fn schema_issues(spec: &FormSpec) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();
    // First position of each key; later duplicates are reported, not indexed.
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (index, question) in spec.questions.iter().enumerate() {
        if question.key.trim().is_empty() {
            issues.push(SchemaIssue::MissingKey { index });
            continue;
        }
        if positions.contains_key(question.key.as_str()) {
            issues.push(SchemaIssue::DuplicateKey {
                key: question.key.clone(),
            });
        } else {
            positions.insert(question.key.as_str(), index);
        }
    }

    for (index, question) in spec.questions.iter().enumerate() {
        if question.kind.is_select() && question.options.is_empty() {
            issues.push(SchemaIssue::MissingOptions {
                question: question.key.clone(),
                kind: question.kind.as_str(),
            });
        }
        check_rule(question, index, &positions, &mut issues);
    }

    issues
}

fn check_rule(
    question: &QuestionSpec,
    index: usize,
    positions: &HashMap<&str, usize>,
    issues: &mut Vec<SchemaIssue>,
) {
    let Some(rule) = &question.show_if else {
        return;
    };

    for clause in rule.clauses() {
        let operator = clause.operator.as_str().to_string();
        if let Operator::Unknown(_) = clause.operator {
            issues.push(SchemaIssue::UnknownOperator {
                question: question.key.clone(),
                operator: operator.clone(),
            });
        }
        if clause.operator.requires_value() && clause.value.is_none() {
            issues.push(SchemaIssue::MissingValue {
                question: question.key.clone(),
                operator: operator.clone(),
            });
        }

        match clause.field.as_deref() {
            None if clause.operator.requires_field() => {
                issues.push(SchemaIssue::MissingField {
                    question: question.key.clone(),
                    operator,
                });
            }
            None => {}
            Some(target) => match positions.get(target) {
                None => issues.push(SchemaIssue::UnknownTarget {
                    question: question.key.clone(),
                    target: target.to_string(),
                }),
                Some(position) if *position >= index => {
                    issues.push(SchemaIssue::ForwardReference {
                        question: question.key.clone(),
                        target: target.to_string(),
                    })
                }
                Some(_) => {}
            },
        }
    }
}

/// Checks collected answers against the form they were collected for.
pub fn validate_answers(spec: &FormSpec, answers: &AnswerMap) -> ValidationResult {
    let visibility = resolve_visibility(spec, answers);

    let mut errors = Vec::new();
    let mut hidden_answers = Vec::new();

    for question in &spec.questions {
        let Some(value) = answers.get(&question.key) else {
            continue;
        };
        if !visibility.get(&question.key).copied().unwrap_or(true) {
            hidden_answers.push(question.key.clone());
            continue;
        }
        if let Some(error) = validate_value(question, value) {
            errors.push(error);
        }
    }

    let all_keys: BTreeSet<&str> = spec
        .questions
        .iter()
        .map(|question| question.key.as_str())
        .collect();
    let unknown_fields: Vec<String> = answers
        .keys()
        .filter(|key| !all_keys.contains(key.as_str()))
        .cloned()
        .collect();

    ValidationResult {
        valid: errors.is_empty() && unknown_fields.is_empty() && hidden_answers.is_empty(),
        errors,
        unknown_fields,
        hidden_answers,
    }
}

fn validate_value(question: &QuestionSpec, value: &AnswerValue) -> Option<ValidationError> {
    match (question.kind, value) {
        (QuestionType::Statement, _) => Some(base_error(
            question,
            "statements do not take answers",
            "statement_answered",
        )),
        (QuestionType::Text, AnswerValue::Single(_)) => None,
        (QuestionType::Bool, AnswerValue::Flag(_)) => None,
        (QuestionType::Single, AnswerValue::Single(choice)) => {
            check_options(question, std::slice::from_ref(choice))
        }
        (QuestionType::Multiselect, AnswerValue::Multi(choices)) => {
            check_options(question, choices)
        }
        _ => Some(base_error(question, "type mismatch", "type_mismatch")),
    }
}

fn check_options(question: &QuestionSpec, choices: &[String]) -> Option<ValidationError> {
    let unknown = choices
        .iter()
        .filter(|choice| !question.options.contains(*choice))
        .cloned()
        .collect::<Vec<_>>();
    if unknown.is_empty() {
        None
    } else {
        Some(base_error(
            question,
            &format!("not an option: {}", unknown.join(", ")),
            "invalid_option",
        ))
    }
}

fn base_error(question: &QuestionSpec, message: &str, code: &str) -> ValidationError {
    ValidationError {
        question_key: Some(question.key.clone()),
        message: message.into(),
        code: code.into(),
    }
}
