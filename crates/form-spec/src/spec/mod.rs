pub mod form;
pub mod question;

pub use form::{
    DocumentShape, FormDocument, FormSpec, Introduction, PageSettings, SubmitSettings,
};
pub use question::{QuestionSpec, QuestionType};
