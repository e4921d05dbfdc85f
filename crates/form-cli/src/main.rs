pub mod builder;

mod wizard;

use builder::{PageInput, QuestionInput, apply_page_input, build_question};
use clap::{Parser, Subcommand, ValueEnum};
use dialoguer::Password;
use form_spec::{
    AnswerMap, FormDocument, FormSpec, ValidationResult, build_render_payload, render,
    render_json_ui, render_text, schema_issues, validate_answers,
};
use form_store::{
    DraftOutcome, EditorConfig, EditorSession, PublishOutcome, config::load_config,
    hash_password, load_local_forms, load_or_default, open_store, submit_answers,
};
use std::env;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wizard::{PromptResponder, Verbosity};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "form-editor",
    author,
    version,
    about = "Questionnaire schema editor with conditional visibility rules",
    long_about = "Validates questionnaire schemas, previews which questions are visible for a set of answers, runs forms in a text shell, and edits and publishes schemas locally or to GitHub"
)]
struct Cli {
    /// Editor configuration file (defaults to ./form-editor.toml when present).
    #[arg(long, global = true, env = "FORM_EDITOR_CONFIG", value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Form to work on, overriding `form_key` from the configuration.
    #[arg(long, global = true, env = "FORM_EDITOR_FORM", value_name = "FORM")]
    form: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

/// Password and persistence flags shared by the editing commands.
#[derive(clap::Args)]
struct EditArgs {
    /// Editor password; prompted on stdin when omitted.
    #[arg(long, env = "FORM_EDITOR_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Save to a draft branch with a pull request instead of publishing.
    #[arg(long)]
    draft: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check a schema for configuration errors, and optionally a set of answers.
    Validate {
        /// Path to the schema JSON; the configured store is read when omitted.
        #[arg(long, value_name = "SCHEMA")]
        schema: Option<PathBuf>,
        /// Answers JSON to check against the schema.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
    },
    /// Show which questions are visible for a set of answers.
    Visibility {
        #[arg(long, value_name = "SCHEMA")]
        schema: Option<PathBuf>,
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Fill in a form interactively in a text shell.
    Run {
        #[arg(long, value_name = "SCHEMA")]
        schema: Option<PathBuf>,
        /// Answers JSON used as the starting point.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Show the introduction and numbered choices.
        #[arg(long, alias = "debug")]
        verbose: bool,
        /// Write the collected answers here instead of stdout.
        #[arg(long, value_name = "OUT")]
        output: Option<PathBuf>,
        /// Store the answers as a submission record for the selected form.
        #[arg(long)]
        submit: bool,
    },
    /// List the forms kept in the local forms directory.
    Forms,
    /// Append a question to the stored schema.
    AddQuestion {
        #[arg(long)]
        key: String,
        #[arg(long)]
        label: Option<String>,
        /// single | multiselect | bool | text | statement
        #[arg(long = "type", value_name = "TYPE", default_value = "text")]
        kind: String,
        /// Answer option; repeat the flag or separate with commas.
        #[arg(long = "option", value_name = "OPTION")]
        options: Vec<String>,
        /// Visibility rule as JSON, e.g. {"field":"q1","operator":"equals","value":"Yes"}.
        #[arg(long, value_name = "JSON")]
        show_if: Option<String>,
        #[arg(long = "help-text", value_name = "TEXT")]
        help_text: Option<String>,
        #[arg(long)]
        placeholder: Option<String>,
        #[arg(long)]
        default: Option<String>,
        #[command(flatten)]
        edit: EditArgs,
    },
    /// Remove a question from the stored schema.
    RemoveQuestion {
        #[arg(long)]
        key: String,
        #[command(flatten)]
        edit: EditArgs,
    },
    /// Edit the page title, introduction and submit button.
    SetPage {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        heading: Option<String>,
        /// Introduction paragraph; repeat the flag for several. Replaces the current ones.
        #[arg(long = "paragraph", value_name = "TEXT")]
        paragraphs: Vec<String>,
        #[arg(long, conflicts_with = "hide_introduction")]
        show_introduction: bool,
        #[arg(long)]
        hide_introduction: bool,
        #[arg(long)]
        submit_label: Option<String>,
        #[arg(long)]
        success_message: Option<String>,
        #[command(flatten)]
        edit: EditArgs,
    },
    /// Publish a schema file to the configured store.
    Publish {
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        #[arg(long, env = "FORM_EDITOR_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Save a schema file to a draft branch and open a pull request.
    Draft {
        #[arg(long, value_name = "SCHEMA")]
        schema: PathBuf,
        #[arg(long, env = "FORM_EDITOR_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Print the SHA-256 digest to store as `editor_password_hash`.
    HashPassword {
        /// Password to hash; read from stdin when omitted.
        password: Option<String>,
    },
    /// Print the JSON Schema of the form document.
    JsonSchema,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match real_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Where the editor configuration comes from.
struct ConfigSource {
    path: Option<PathBuf>,
    form: Option<String>,
}

impl ConfigSource {
    fn load(&self) -> CliResult<EditorConfig> {
        let mut config = match &self.path {
            Some(path) => load_config(path)?,
            None => load_or_default(&env::current_dir()?)?,
        };
        if let Some(form) = self.form.as_deref().filter(|form| !form.trim().is_empty()) {
            config.form_key = form.trim().to_string();
        }
        Ok(config)
    }
}

fn real_main() -> CliResult<()> {
    let cli = Cli::parse();
    let source = ConfigSource {
        path: cli.config,
        form: cli.form,
    };
    match cli.command {
        Command::Validate { schema, answers } => {
            let document = load_schema(schema.as_deref(), &source)?;
            run_validate(&document, answers.as_deref())
        }
        Command::Visibility {
            schema,
            answers,
            format,
        } => {
            let document = load_schema(schema.as_deref(), &source)?;
            run_visibility(&document, answers.as_deref(), format)
        }
        Command::Run {
            schema,
            answers,
            verbose,
            output,
            submit,
        } => {
            let document = load_schema(schema.as_deref(), &source)?;
            let answers = run_form(&document, answers.as_deref(), verbose, output.as_deref())?;
            if submit {
                let config = source.load()?;
                let outcome = submit_answers(&config, &document.spec, &answers)?;
                println!("Submission {} stored at {}.", outcome.id, outcome.location);
            }
            Ok(())
        }
        Command::Forms => list_forms(&source.load()?),
        Command::AddQuestion {
            key,
            label,
            kind,
            options,
            show_if,
            help_text,
            placeholder,
            default,
            edit,
        } => {
            let question = build_question(QuestionInput {
                key,
                label,
                kind,
                options,
                show_if,
                help: help_text,
                placeholder,
                default,
            })?;
            let mut session = open_session(&source, edit.password)?;
            session.add_question(question)?;
            persist(&mut session, edit.draft)
        }
        Command::RemoveQuestion { key, edit } => {
            let mut session = open_session(&source, edit.password)?;
            let removed = session.remove_question(&key)?;
            println!("Removed question '{}'.", removed.key);
            persist(&mut session, edit.draft)
        }
        Command::SetPage {
            title,
            heading,
            paragraphs,
            show_introduction,
            hide_introduction,
            submit_label,
            success_message,
            edit,
        } => {
            let mut session = open_session(&source, edit.password)?;
            let page = apply_page_input(
                session.spec().page.clone(),
                PageInput {
                    title,
                    heading,
                    paragraphs,
                    show_introduction: match (show_introduction, hide_introduction) {
                        (true, _) => Some(true),
                        (_, true) => Some(false),
                        _ => None,
                    },
                    submit_label,
                    success_message,
                },
            );
            session.update_page(page)?;
            persist(&mut session, edit.draft)
        }
        Command::Publish { schema, password } => {
            let document = read_document(&schema)?;
            let mut session = open_session(&source, password)?;
            session.replace_document(document)?;
            persist(&mut session, false)
        }
        Command::Draft { schema, password } => {
            let document = read_document(&schema)?;
            let mut session = open_session(&source, password)?;
            session.replace_document(document)?;
            persist(&mut session, true)
        }
        Command::HashPassword { password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password("Password")?,
            };
            println!("{}", hash_password(&password));
            Ok(())
        }
        Command::JsonSchema => {
            let schema = schemars::schema_for!(FormSpec);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn read_document(path: &Path) -> CliResult<FormDocument> {
    let text = fs::read_to_string(path)
        .map_err(|err| format!("could not read '{}': {}", path.display(), err))?;
    let document = FormDocument::from_json(&text)
        .map_err(|err| format!("could not parse '{}': {}", path.display(), err))?;
    debug!(
        path = %path.display(),
        questions = document.spec.questions.len(),
        "loaded schema"
    );
    Ok(document)
}

/// Reads `schema` when given, otherwise the selected form from the store.
fn load_schema(schema: Option<&Path>, source: &ConfigSource) -> CliResult<FormDocument> {
    if let Some(path) = schema {
        return read_document(path);
    }
    let config = source.load()?;
    let store = open_store(&config)?;
    match store.load()? {
        Some(stored) => Ok(stored.document),
        None => Err(format!(
            "form '{}' has no saved schema in {}",
            config.form_key,
            store.describe()
        )
        .into()),
    }
}

fn read_answers(path: Option<&Path>) -> CliResult<AnswerMap> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|err| format!("could not read '{}': {}", path.display(), err))?;
            Ok(serde_json::from_str(&text)
                .map_err(|err| format!("could not parse answers '{}': {}", path.display(), err))?)
        }
        None => Ok(AnswerMap::new()),
    }
}

fn run_validate(document: &FormDocument, answers_path: Option<&Path>) -> CliResult<()> {
    let issues = schema_issues(&document.spec);
    if !issues.is_empty() {
        println!("Schema is invalid:");
        for issue in &issues {
            println!("  - {}", issue);
        }
        return Err("schema validation failed".into());
    }
    println!(
        "Schema is valid ({} questions).",
        document.spec.questions.len()
    );

    let Some(answers_path) = answers_path else {
        return Ok(());
    };
    let answers = read_answers(Some(answers_path))?;
    let result = validate_answers(&document.spec, &answers);
    println!(
        "Answers: {}",
        if result.valid { "valid" } else { "invalid" }
    );
    describe_validation(&result);
    if result.valid {
        Ok(())
    } else {
        Err("answer validation failed".into())
    }
}

fn describe_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!(
                "  {} - {}",
                error.question_key.as_deref().unwrap_or("<form>"),
                error.message
            );
        }
    }
    if !result.unknown_fields.is_empty() {
        println!(
            "Unknown answer fields: {}",
            result.unknown_fields.join(", ")
        );
    }
    if !result.hidden_answers.is_empty() {
        println!(
            "Answers for hidden questions (dropped on render): {}",
            result.hidden_answers.join(", ")
        );
    }
}

fn run_visibility(
    document: &FormDocument,
    answers_path: Option<&Path>,
    format: RenderMode,
) -> CliResult<()> {
    form_spec::validate_spec(&document.spec)?;
    let answers = read_answers(answers_path)?;
    let payload = build_render_payload(&document.spec, &answers);
    match format {
        RenderMode::Text => println!("{}", render_text(&payload)),
        RenderMode::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json_ui(&payload))?
        ),
    }
    Ok(())
}

fn run_form(
    document: &FormDocument,
    answers_path: Option<&Path>,
    verbose: bool,
    output_path: Option<&Path>,
) -> CliResult<AnswerMap> {
    form_spec::validate_spec(&document.spec)?;
    let initial = read_answers(answers_path)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut responder = PromptResponder::new(
        stdin.lock(),
        stdout.lock(),
        Verbosity::from_verbose(verbose),
    );
    responder.show_header(&document.spec)?;
    let answers = render(&document.spec, &initial, &mut responder)?;
    responder.show_completion(&document.spec, &answers)?;
    drop(responder);

    let json = serde_json::to_string_pretty(&answers)?;
    match output_path {
        Some(path) => {
            fs::write(path, format!("{}\n", json))
                .map_err(|err| format!("could not write '{}': {}", path.display(), err))?;
            println!("Answers written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(answers)
}

fn list_forms(config: &EditorConfig) -> CliResult<()> {
    let forms = load_local_forms(config)?;
    if forms.is_empty() {
        println!("No forms found in {}.", config.forms_dir.display());
        return Ok(());
    }
    for form in &forms {
        let marker = if form.key == config.form_key { "*" } else { " " };
        println!(
            "{} {}  {} ({} questions)  {}",
            marker,
            form.key,
            form.title(),
            form.document.spec.questions.len(),
            form.path.display()
        );
    }
    Ok(())
}

fn open_session(source: &ConfigSource, password: Option<String>) -> CliResult<EditorSession> {
    let config = source.load()?;
    let mut session = EditorSession::open(&config)?;
    let password = match password {
        Some(password) => password,
        None => prompt_password("Editor password")?,
    };
    session.unlock(&password)?;
    Ok(session)
}

fn persist(session: &mut EditorSession, draft: bool) -> CliResult<()> {
    if draft {
        let DraftOutcome {
            branch,
            pull_request_url,
            ..
        } = session.save_draft()?;
        println!("Draft saved to branch {}.", branch);
        if let Some(url) = pull_request_url {
            println!("Pull request: {}", url);
        }
        return Ok(());
    }

    match session.publish()? {
        PublishOutcome::Local { path } => {
            println!(
                "GitHub is not configured; schema saved locally to {}.",
                path.display()
            );
        }
        PublishOutcome::Remote {
            branch, commit_sha, ..
        } => {
            println!("Schema published to {}.", branch);
            if let Some(sha) = commit_sha {
                println!("Commit: {}", sha);
            }
        }
    }
    Ok(())
}

/// Hidden input on a terminal; piped input is read as a plain line.
fn prompt_password(prompt: &str) -> CliResult<String> {
    if io::stdin().is_terminal() {
        return Ok(Password::new().with_prompt(prompt).interact()?);
    }
    prompt_line(prompt)
}

fn prompt_line(prompt: &str) -> CliResult<String> {
    print!("{}: ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
