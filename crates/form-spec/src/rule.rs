use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::answers::{AnswerMap, AnswerValue};

/// Visibility predicate attached to a question through `show_if`.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum Rule {
    /// Every nested rule must hold.
    All { all: Vec<Rule> },
    /// At least one nested rule must hold.
    Any { any: Vec<Rule> },
    Clause(Clause),
}

/// Comparison of one earlier answer against a literal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Clause {
    #[serde(default, alias = "target_key", skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, alias = "op")]
    #[schemars(with = "String")]
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RuleValue>,
}

/// Literal a clause compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged, expecting = "a string, a list of strings or a boolean")]
pub enum RuleValue {
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

impl RuleValue {
    /// Rule values as plain strings; booleans have none.
    fn as_strings(&self) -> Vec<&str> {
        match self {
            RuleValue::Flag(_) => Vec::new(),
            RuleValue::One(text) => vec![text.as_str()],
            RuleValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn as_set(&self) -> BTreeSet<&str> {
        match self {
            RuleValue::Flag(true) => BTreeSet::from(["true"]),
            RuleValue::Flag(false) => BTreeSet::from(["false"]),
            RuleValue::One(text) => BTreeSet::from([text.as_str()]),
            RuleValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Clause operators. Names that are not recognised are kept verbatim so
/// schema validation can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    Includes,
    Excludes,
    #[default]
    Equals,
    NotEquals,
    AnySelected,
    AllSelected,
    ContainsAny,
    IsTrue,
    IsFalse,
    Always,
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Includes => "includes",
            Operator::Excludes => "excludes",
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::AnySelected => "any_selected",
            Operator::AllSelected => "all_selected",
            Operator::ContainsAny => "contains_any",
            Operator::IsTrue => "is_true",
            Operator::IsFalse => "is_false",
            Operator::Always => "always",
            Operator::Unknown(name) => name,
        }
    }

    pub fn requires_field(&self) -> bool {
        !matches!(self, Operator::Always)
    }

    pub fn requires_value(&self) -> bool {
        !matches!(
            self,
            Operator::Always | Operator::IsTrue | Operator::IsFalse
        )
    }

    /// Applies the operator to a recorded answer.
    pub fn apply(&self, answer: &AnswerValue, expected: Option<&RuleValue>) -> bool {
        match self {
            Operator::Always => true,
            Operator::Equals => equals(answer, expected),
            Operator::NotEquals => !equals(answer, expected),
            Operator::Includes => includes(answer, expected),
            Operator::Excludes => !includes(answer, expected),
            Operator::AnySelected => any_selected(answer, expected),
            Operator::AllSelected => all_selected(answer, expected),
            Operator::ContainsAny => contains_any(answer, expected),
            Operator::IsTrue => answer.is_truthy(),
            Operator::IsFalse => !answer.is_truthy(),
            Operator::Unknown(name) => {
                warn!(operator = %name, "unsupported operator treated as not satisfied");
                false
            }
        }
    }
}

impl From<String> for Operator {
    fn from(name: String) -> Self {
        match name.trim() {
            "includes" => Operator::Includes,
            "excludes" | "not_includes" => Operator::Excludes,
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "any_selected" => Operator::AnySelected,
            "all_selected" => Operator::AllSelected,
            "contains_any" => Operator::ContainsAny,
            "is_true" => Operator::IsTrue,
            "is_false" => Operator::IsFalse,
            "always" => Operator::Always,
            _ => Operator::Unknown(name),
        }
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Operator::from)
    }
}

fn equals(answer: &AnswerValue, expected: Option<&RuleValue>) -> bool {
    match (answer, expected) {
        (_, None) => false,
        (AnswerValue::Flag(left), Some(RuleValue::Flag(right))) => left == right,
        (AnswerValue::Single(left), Some(RuleValue::One(right))) => left == right,
        (AnswerValue::Multi(_), Some(value)) if !matches!(value, RuleValue::Flag(_)) => {
            answer.as_set() == value.as_set()
        }
        _ => false,
    }
}

fn includes(answer: &AnswerValue, expected: Option<&RuleValue>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let wanted = expected.as_set();
    !wanted.is_empty() && wanted.is_subset(&answer.as_set())
}

// The selection operators only look at multi-select answers.
fn any_selected(answer: &AnswerValue, expected: Option<&RuleValue>) -> bool {
    let (AnswerValue::Multi(selected), Some(expected)) = (answer, expected) else {
        return false;
    };
    expected
        .as_strings()
        .iter()
        .any(|value| selected.iter().any(|item| item == value))
}

fn all_selected(answer: &AnswerValue, expected: Option<&RuleValue>) -> bool {
    let (AnswerValue::Multi(selected), Some(expected)) = (answer, expected) else {
        return false;
    };
    let wanted = expected.as_strings();
    !wanted.is_empty()
        && wanted
            .iter()
            .all(|value| selected.iter().any(|item| item == value))
}

/// Substring match on text answers, intersection on selections.
fn contains_any(answer: &AnswerValue, expected: Option<&RuleValue>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let wanted = expected.as_strings();
    match answer {
        AnswerValue::Single(text) => wanted.iter().any(|value| text.contains(value)),
        AnswerValue::Multi(selected) => wanted
            .iter()
            .any(|value| selected.iter().any(|item| item == value)),
        AnswerValue::Flag(_) => false,
    }
}

impl Clause {
    pub fn new(field: impl Into<String>, operator: Operator, value: Option<RuleValue>) -> Self {
        Self {
            field: Some(field.into()),
            operator,
            value,
        }
    }

    /// A clause over a missing answer never holds, except `always`.
    pub fn evaluate(&self, answers: &AnswerMap) -> bool {
        if !self.operator.requires_field() {
            return true;
        }
        let Some(answer) = self.field.as_ref().and_then(|field| answers.get(field)) else {
            return false;
        };
        self.operator.apply(answer, self.value.as_ref())
    }
}

impl Rule {
    pub fn evaluate(&self, answers: &AnswerMap) -> bool {
        match self {
            Rule::All { all } => all.iter().all(|rule| rule.evaluate(answers)),
            Rule::Any { any } => any.iter().any(|rule| rule.evaluate(answers)),
            Rule::Clause(clause) => clause.evaluate(answers),
        }
    }

    /// All clauses in the rule tree, depth first.
    pub fn clauses(&self) -> Vec<&Clause> {
        let mut out = Vec::new();
        self.collect_clauses(&mut out);
        out
    }

    fn collect_clauses<'a>(&'a self, out: &mut Vec<&'a Clause>) {
        match self {
            Rule::All { all: rules } | Rule::Any { any: rules } => {
                for rule in rules {
                    rule.collect_clauses(out);
                }
            }
            Rule::Clause(clause) => out.push(clause),
        }
    }

    /// Question keys the rule reads.
    pub fn referenced_fields(&self) -> Vec<&str> {
        self.clauses()
            .into_iter()
            .filter_map(|clause| clause.field.as_deref())
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default)]
    all: Option<Vec<Rule>>,
    #[serde(default)]
    any: Option<Vec<Rule>>,
    #[serde(default, alias = "target_key")]
    field: Option<String>,
    #[serde(default, alias = "op")]
    operator: Option<Operator>,
    #[serde(default)]
    value: Option<RuleValue>,
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawRule::deserialize(deserializer)?;
        let has_clause_keys = raw.field.is_some() || raw.operator.is_some() || raw.value.is_some();
        match (raw.all, raw.any) {
            (Some(_), Some(_)) => Err(serde::de::Error::custom(
                "a rule cannot have both 'all' and 'any'",
            )),
            (Some(_), None) | (None, Some(_)) if has_clause_keys => Err(serde::de::Error::custom(
                "a rule group cannot also carry 'field', 'operator' or 'value'",
            )),
            (Some(all), None) => Ok(Rule::All { all }),
            (None, Some(any)) => Ok(Rule::Any { any }),
            (None, None) => Ok(Rule::Clause(Clause {
                field: raw.field,
                operator: raw.operator.unwrap_or_default(),
                value: raw.value,
            })),
        }
    }
}

impl From<Clause> for Rule {
    fn from(clause: Clause) -> Self {
        Rule::Clause(clause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answers(value: serde_json::Value) -> AnswerMap {
        serde_json::from_value(value).expect("answers")
    }

    #[test]
    fn clause_accepts_spec_style_aliases() {
        let rule: Rule = serde_json::from_value(json!({
            "target_key": "q_industry",
            "op": "includes",
            "value": "Public sector"
        }))
        .expect("rule");
        let Rule::Clause(clause) = &rule else {
            panic!("expected clause");
        };
        assert_eq!(clause.field.as_deref(), Some("q_industry"));
        assert_eq!(clause.operator, Operator::Includes);
    }

    #[test]
    fn operator_defaults_to_equals_and_keeps_unknown_names() {
        let clause: Clause = serde_json::from_value(json!({ "field": "a", "value": "x" })).unwrap();
        assert_eq!(clause.operator, Operator::Equals);

        let clause: Clause =
            serde_json::from_value(json!({ "field": "a", "operator": "matches" })).unwrap();
        assert_eq!(clause.operator, Operator::Unknown("matches".into()));
        assert_eq!(serde_json::to_value(&clause).unwrap()["operator"], "matches");
    }

    #[test]
    fn legacy_operator_names_map_to_canonical_ones() {
        assert_eq!(Operator::from("not_includes".to_string()), Operator::Excludes);
        assert_eq!(Operator::from("contains_any".to_string()), Operator::ContainsAny);
    }

    #[test]
    fn contains_any_keeps_its_name_when_saved() {
        let rule: Rule = serde_json::from_value(json!({
            "field": "q_notes", "operator": "contains_any", "value": ["AI"]
        }))
        .expect("rule");
        assert_eq!(serde_json::to_value(&rule).unwrap()["operator"], "contains_any");
    }

    #[test]
    fn groups_combine_nested_clauses() {
        let rule: Rule = serde_json::from_value(json!({
            "any": [
                { "field": "role", "operator": "equals", "value": "Manager" },
                { "all": [
                    { "field": "tools", "operator": "includes", "value": "CRM" },
                    { "field": "consent", "operator": "is_true" }
                ]}
            ]
        }))
        .expect("rule");

        assert!(rule.evaluate(&answers(json!({ "role": "Manager" }))));
        assert!(rule.evaluate(&answers(json!({ "tools": ["CRM"], "consent": true }))));
        assert!(!rule.evaluate(&answers(json!({ "tools": ["CRM"], "consent": false }))));
        assert_eq!(rule.referenced_fields(), vec!["role", "tools", "consent"]);
    }

    #[test]
    fn empty_groups_follow_all_and_any_identities() {
        let empty = AnswerMap::new();
        assert!(Rule::All { all: vec![] }.evaluate(&empty));
        assert!(!Rule::Any { any: vec![] }.evaluate(&empty));
    }

    #[test]
    fn multi_select_equals_is_exact_set_match() {
        let answer = AnswerValue::from(vec!["b", "a"]);
        let many = RuleValue::Many(vec!["a".into(), "b".into()]);
        assert!(Operator::Equals.apply(&answer, Some(&many)));
        assert!(!Operator::Equals.apply(&answer, Some(&RuleValue::One("a".into()))));
        assert!(Operator::Includes.apply(&answer, Some(&RuleValue::One("a".into()))));
    }

    #[test]
    fn contains_any_matches_substrings_of_text_answers() {
        let text = AnswerValue::from("uses machine learning models");
        let value = RuleValue::Many(vec!["learning".into(), "robotics".into()]);
        assert!(Operator::ContainsAny.apply(&text, Some(&value)));
        let multi = AnswerValue::from(vec!["robotics"]);
        assert!(Operator::ContainsAny.apply(&multi, Some(&value)));
        assert!(!Operator::ContainsAny.apply(&AnswerValue::Flag(true), Some(&value)));
    }

    #[test]
    fn selection_operators_ignore_text_and_flag_answers() {
        let value = RuleValue::Many(vec!["AI".into()]);
        let text = AnswerValue::from("EMAIL CHAIN");
        assert!(!Operator::AnySelected.apply(&text, Some(&value)));
        assert!(!Operator::AllSelected.apply(&AnswerValue::from("AI"), Some(&value)));
        assert!(!Operator::AnySelected.apply(&AnswerValue::Flag(true), Some(&value)));

        let selected = AnswerValue::from(vec!["AI", "Email"]);
        assert!(Operator::AnySelected.apply(&selected, Some(&value)));
        let both = RuleValue::Many(vec!["AI".into(), "Chat".into()]);
        assert!(Operator::AnySelected.apply(&selected, Some(&both)));
        assert!(!Operator::AllSelected.apply(&selected, Some(&both)));
    }

    #[test]
    fn malformed_clause_inside_a_group_reports_the_bad_value() {
        let err = serde_json::from_value::<Rule>(json!({
            "all": [{ "field": "a", "operator": "equals", "value": 3 }]
        }))
        .expect_err("numeric value");
        assert!(
            err.to_string().contains("a string, a list of strings or a boolean"),
            "{err}"
        );
    }

    #[test]
    fn unknown_rule_keys_are_rejected() {
        let err = serde_json::from_value::<Rule>(json!({
            "field": "a", "operator": "equals", "valeu": "x"
        }))
        .expect_err("typo");
        assert!(err.to_string().contains("valeu"), "{err}");

        let err = serde_json::from_value::<Rule>(json!({
            "all": [], "field": "a"
        }))
        .expect_err("mixed group");
        assert!(err.to_string().contains("rule group"), "{err}");
    }

    #[test]
    fn always_holds_without_a_field() {
        let clause = Clause {
            field: None,
            operator: Operator::Always,
            value: None,
        };
        assert!(clause.evaluate(&AnswerMap::new()));
    }
}
