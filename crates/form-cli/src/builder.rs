use std::str::FromStr;

use form_spec::{
    AnswerValue, Introduction, PageSettings, QuestionSpec, QuestionType, Rule, SubmitSettings,
};
use serde_json::Value;

/// Raw question fields as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct QuestionInput {
    pub key: String,
    pub label: Option<String>,
    pub kind: String,
    pub options: Vec<String>,
    pub show_if: Option<String>,
    pub help: Option<String>,
    pub placeholder: Option<String>,
    pub default: Option<String>,
}

/// Splits comma or newline separated options, dropping blanks.
pub fn parse_options<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| {
            entry
                .as_ref()
                .split([',', '\n'])
                .map(str::trim)
                .filter(|option| !option.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Parses a rule given as JSON. Blank input and `{}` mean no rule.
pub fn parse_show_if(raw: &str) -> Result<Option<Rule>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|err| format!("invalid show_if JSON: {}", err))?;
    match value {
        Value::Null => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(|err| format!("invalid show_if rule: {}", err)),
    }
}

fn parse_default(kind: QuestionType, raw: &str, options: &[String]) -> Result<AnswerValue, String> {
    match kind {
        QuestionType::Bool => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(AnswerValue::Flag(true)),
            "false" | "no" | "n" => Ok(AnswerValue::Flag(false)),
            other => Err(format!("default '{}' is not a boolean", other)),
        },
        QuestionType::Multiselect => {
            let chosen = parse_options(&[raw]);
            if let Some(unknown) = chosen.iter().find(|choice| !options.contains(*choice)) {
                return Err(format!("default '{}' is not one of the options", unknown));
            }
            Ok(AnswerValue::Multi(chosen))
        }
        QuestionType::Single => {
            let choice = raw.trim();
            if options.iter().any(|option| option == choice) {
                Ok(AnswerValue::Single(choice.to_string()))
            } else {
                Err(format!("default '{}' is not one of the options", choice))
            }
        }
        QuestionType::Text => Ok(AnswerValue::Single(raw.to_string())),
        QuestionType::Statement => Err("statements cannot have a default".to_string()),
    }
}

/// Builds a question from command-line input. Options are only kept for
/// select questions.
pub fn build_question(input: QuestionInput) -> Result<QuestionSpec, String> {
    let key = input.key.trim().to_string();
    if key.is_empty() {
        return Err("key is required".to_string());
    }
    let kind = QuestionType::from_str(&input.kind)?;
    let options = if kind.is_select() {
        parse_options(&input.options)
    } else {
        Vec::new()
    };
    if kind.is_select() && options.is_empty() {
        return Err(format!("{} questions need at least one option", kind.as_str()));
    }

    let mut question = QuestionSpec::new(key, kind).with_options(options);
    if let Some(label) = input.label.filter(|label| !label.trim().is_empty()) {
        question.label = label;
    }
    question.show_if = match input.show_if {
        Some(raw) => parse_show_if(&raw)?,
        None => None,
    };
    question.help = input.help.filter(|help| !help.trim().is_empty());
    question.placeholder = input.placeholder.filter(|text| !text.trim().is_empty());
    question.default = input
        .default
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_default(kind, &raw, &question.options))
        .transpose()?;
    Ok(question)
}

/// Page settings changes from the command line; unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct PageInput {
    pub title: Option<String>,
    pub heading: Option<String>,
    pub paragraphs: Vec<String>,
    pub show_introduction: Option<bool>,
    pub submit_label: Option<String>,
    pub success_message: Option<String>,
}

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Applies `input` on top of `page`. An empty string clears a field.
pub fn apply_page_input(mut page: PageSettings, input: PageInput) -> PageSettings {
    if let Some(title) = input.title {
        page.title = blank_to_none(title);
    }
    if let Some(show) = input.show_introduction {
        page.show_introduction = Some(show);
    }
    if input.heading.is_some() || !input.paragraphs.is_empty() {
        let intro = page.introduction.get_or_insert_with(Introduction::default);
        if let Some(heading) = input.heading {
            intro.heading = blank_to_none(heading);
        }
        if !input.paragraphs.is_empty() {
            intro.paragraphs = Some(
                input
                    .paragraphs
                    .into_iter()
                    .filter_map(blank_to_none)
                    .collect(),
            );
        }
    }
    if input.submit_label.is_some() || input.success_message.is_some() {
        let submit = page.submit.get_or_insert_with(SubmitSettings::default);
        if let Some(label) = input.submit_label {
            submit.label = blank_to_none(label);
        }
        if let Some(message) = input.success_message {
            submit.success_message = blank_to_none(message);
        }
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_spec::{Operator, Rule};

    fn input(key: &str, kind: &str) -> QuestionInput {
        QuestionInput {
            key: key.to_string(),
            kind: kind.to_string(),
            ..QuestionInput::default()
        }
    }

    #[test]
    fn options_accept_commas_and_repeats() {
        assert_eq!(
            parse_options(&["Tech, Retail", " ", "Finance\nOther"]),
            vec!["Tech", "Retail", "Finance", "Other"]
        );
    }

    #[test]
    fn label_defaults_to_key() {
        let question = build_question(input("q_name", "text")).expect("question");
        assert_eq!(question.label, "q_name");
        assert!(question.options.is_empty());
    }

    #[test]
    fn select_questions_need_options() {
        let err = build_question(input("q_industry", "single")).expect_err("no options");
        assert!(err.contains("at least one option"));

        let mut with_options = input("q_industry", "single_select");
        with_options.options = vec!["Tech,Retail".to_string()];
        with_options.default = Some("Retail".to_string());
        let question = build_question(with_options).expect("question");
        assert_eq!(question.options, vec!["Tech", "Retail"]);
        assert_eq!(question.default, Some(AnswerValue::Single("Retail".into())));
    }

    #[test]
    fn non_select_questions_drop_options() {
        let mut flag = input("q_flag", "bool");
        flag.options = vec!["ignored".to_string()];
        flag.default = Some("yes".to_string());
        let question = build_question(flag).expect("question");
        assert!(question.options.is_empty());
        assert_eq!(question.default, Some(AnswerValue::Flag(true)));
    }

    #[test]
    fn show_if_json_is_parsed() {
        let mut dependent = input("q_employee_management", "bool");
        dependent.show_if =
            Some(r#"{"field": "q_industry", "operator": "equals", "value": "Tech"}"#.to_string());
        let question = build_question(dependent).expect("question");
        match question.show_if {
            Some(Rule::Clause(clause)) => {
                assert_eq!(clause.field.as_deref(), Some("q_industry"));
                assert_eq!(clause.operator, Operator::Equals);
            }
            other => panic!("unexpected rule {:?}", other),
        }

        assert_eq!(parse_show_if("{}").expect("empty"), None);
        assert!(parse_show_if("{not json").is_err());
    }

    #[test]
    fn page_input_only_touches_given_fields() {
        let current = PageSettings {
            title: Some("Intake".to_string()),
            submit: Some(SubmitSettings {
                label: Some("Send".to_string()),
                success_message: None,
            }),
            ..PageSettings::default()
        };
        let page = apply_page_input(
            current,
            PageInput {
                heading: Some("Hello".to_string()),
                paragraphs: vec!["First".to_string(), "  ".to_string()],
                success_message: Some("Thanks!".to_string()),
                ..PageInput::default()
            },
        );
        assert_eq!(page.title.as_deref(), Some("Intake"));
        assert_eq!(page.submit_label(), "Send");
        assert_eq!(page.success_message(), "Thanks!");
        assert_eq!(
            page.introduction(),
            Some(("Hello".to_string(), vec!["First".to_string()]))
        );

        let cleared = apply_page_input(
            page,
            PageInput {
                title: Some(String::new()),
                show_introduction: Some(false),
                ..PageInput::default()
            },
        );
        assert!(cleared.title.is_none());
        assert!(cleared.introduction().is_none());
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = build_question(input("q", "slider")).expect_err("bad type");
        assert!(err.contains("unknown question type"));
    }
}
