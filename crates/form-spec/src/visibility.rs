use std::collections::BTreeMap;

use tracing::debug;

use crate::answers::AnswerMap;
use crate::spec::form::FormSpec;
use crate::spec::question::QuestionSpec;

pub type VisibilityMap = BTreeMap<String, bool>;

/// Whether `question` is shown for the given answers.
///
/// Questions without a rule are always shown. A rule whose target has no
/// recorded answer never holds, so the question stays hidden until the
/// earlier question is answered.
pub fn is_visible(question: &QuestionSpec, answers: &AnswerMap) -> bool {
    match &question.show_if {
        None => true,
        Some(rule) => rule.evaluate(answers),
    }
}

/// Evaluates every question in document order.
///
/// Answers of hidden questions are dropped before later questions are
/// evaluated, so anything depending on a hidden question is hidden too.
pub fn resolve_visibility(spec: &FormSpec, answers: &AnswerMap) -> VisibilityMap {
    walk(spec, answers).0
}

/// Copy of `answers` without the answers of hidden questions.
pub fn prune_hidden_answers(spec: &FormSpec, answers: &AnswerMap) -> AnswerMap {
    walk(spec, answers).1
}

fn walk(spec: &FormSpec, answers: &AnswerMap) -> (VisibilityMap, AnswerMap) {
    let mut working = answers.clone();
    let mut map = VisibilityMap::new();

    for question in &spec.questions {
        let visible = is_visible(question, &working);
        if !visible && working.remove(&question.key).is_some() {
            debug!(question = %question.key, "dropping answer of hidden question");
        }
        map.insert(question.key.clone(), visible);
    }

    (map, working)
}
