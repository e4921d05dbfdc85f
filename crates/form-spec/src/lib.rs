#![allow(missing_docs)]

pub mod answers;
pub mod render;
pub mod rule;
pub mod spec;
pub mod validate;
pub mod visibility;

pub use answers::{AnswerMap, AnswerValue, ValidationError, ValidationResult};
pub use render::{
    KeepAnswers, RenderPayload, RenderProgress, RenderQuestion, RenderStatus, Responder,
    build_render_payload, refresh, render, render_json_ui, render_text,
};
pub use rule::{Clause, Operator, Rule, RuleValue};
pub use spec::{
    DocumentShape, FormDocument, FormSpec, Introduction, PageSettings, QuestionSpec, QuestionType,
    SubmitSettings,
};
pub use validate::{SchemaError, SchemaIssue, schema_issues, validate_answers, validate_spec};
pub use visibility::{VisibilityMap, is_visible, prune_hidden_answers, resolve_visibility};
