//! Terminal operator: research and review prompts on stdin/stdout.

use indicatif::ProgressBar;
use leadscout_core::operator::{Operator, ReviewDecision, ReviewPosition};
use leadscout_shared::{Company, DecisionMaker, EmailDraft, LeadScoutError, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// A line on its own that ends multi-line input.
const END_MARKER: &str = ".";

fn interaction_err(e: ReadlineError) -> LeadScoutError {
    match e {
        ReadlineError::Interrupted | ReadlineError::Eof => {
            LeadScoutError::Interaction("input closed by operator".into())
        }
        other => LeadScoutError::Interaction(other.to_string()),
    }
}

/// Blocking line-editor prompts. The spinner is hidden while waiting for input.
pub(crate) struct TerminalOperator {
    editor: DefaultEditor,
    spinner: ProgressBar,
}

impl TerminalOperator {
    pub(crate) fn new(spinner: ProgressBar) -> Result<Self> {
        let editor = DefaultEditor::new().map_err(interaction_err)?;
        Ok(Self { editor, spinner })
    }

    /// Run `f` off the async worker with the spinner suspended.
    fn blocking<T>(&mut self, f: impl FnOnce(&mut DefaultEditor) -> T) -> T {
        let spinner = self.spinner.clone();
        let editor = &mut self.editor;
        tokio::task::block_in_place(|| spinner.suspend(|| f(editor)))
    }
}

fn read_block(editor: &mut DefaultEditor, first_prompt: &str) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut prompt = first_prompt;
    loop {
        let line = editor.readline(prompt).map_err(interaction_err)?;
        if line.trim() == END_MARKER || (lines.is_empty() && line.trim().is_empty()) {
            break;
        }
        lines.push(line);
        prompt = "  ";
    }
    Ok(lines)
}

fn print_draft(draft: &EmailDraft, company: &Company, contact: &DecisionMaker, position: &ReviewPosition) {
    println!();
    println!(
        "  ─── Draft {}/{} for {} ({}) at {} [{}] ───",
        position.index, position.total, contact.name, contact.title, company.name, draft.state
    );
    if let Some(handle) = &contact.contact {
        println!("  To:      {handle}");
    }
    println!("  Subject: {}", draft.subject);
    println!();
    for line in draft.body.lines() {
        println!("    {line}");
    }
    println!();
    let budget = if draft.over_budget { " (over budget)" } else { "" };
    println!("  Words: {}{budget}   Attempt: {}", draft.word_count, draft.attempt);
    for warning in &draft.warnings {
        println!("  ! {warning}");
    }
    if let Some(reasoning) = &draft.reasoning {
        println!("  Angle: {reasoning}");
    }
}

impl Operator for TerminalOperator {
    fn research_notes(
        &mut self,
        company: &Company,
        contact: &DecisionMaker,
        questions: &[String],
    ) -> Result<Option<String>> {
        self.blocking(|editor| {
            println!();
            println!("  Research: {} ({}) at {}", contact.name, contact.title, company.name);
            if let Some(site) = &company.website {
                println!("  Website:  {site}");
            }
            for q in questions {
                println!("    - {q}");
            }
            println!("  Enter notes, end with a line containing only '.' (empty to skip):");
            let lines = read_block(editor, "> ")?;
            let notes = lines.join("\n");
            Ok((!notes.trim().is_empty()).then_some(notes))
        })
    }

    fn review(
        &mut self,
        draft: &EmailDraft,
        company: &Company,
        contact: &DecisionMaker,
        position: &ReviewPosition,
    ) -> Result<ReviewDecision> {
        self.blocking(|editor| {
            print_draft(draft, company, contact, position);
            let choices = review_choices(draft, position);
            loop {
                let answer = editor.readline(&choices).map_err(interaction_err)?;
                match answer.trim().to_lowercase().as_str() {
                    "a" | "approve" => return Ok(ReviewDecision::Approve),
                    "s" | "skip" => return Ok(ReviewDecision::Skip),
                    "u" | "unapprove" if draft.state.is_exportable() => {
                        return Ok(ReviewDecision::Unapprove);
                    }
                    "r" | "regenerate" if position.can_regenerate => return Ok(ReviewDecision::Regenerate),
                    "p" | "previous" if position.has_previous => return Ok(ReviewDecision::Previous),
                    "n" | "next" if position.has_next => return Ok(ReviewDecision::Next),
                    "d" | "done" => return Ok(ReviewDecision::Done),
                    "e" | "edit" => {
                        let subject = editor
                            .readline_with_initial("  Subject: ", (draft.subject.as_str(), ""))
                            .map_err(interaction_err)?;
                        println!("  New body, end with '.' on its own line (empty keeps the current body):");
                        let lines = read_block(editor, "  ")?;
                        let body = if lines.is_empty() {
                            draft.body.clone()
                        } else {
                            lines.join("\n")
                        };
                        return Ok(ReviewDecision::Edit {
                            subject: subject.trim().to_string(),
                            body,
                        });
                    }
                    _ => println!("  Please choose one of the listed options."),
                }
            }
        })
    }
}

/// Option line for one draft; only actions that apply are listed.
fn review_choices(draft: &EmailDraft, position: &ReviewPosition) -> String {
    let mut choices = vec!["[a]pprove", "[e]dit"];
    if position.can_regenerate {
        choices.push("[r]egenerate");
    }
    if draft.state.is_exportable() {
        choices.push("[u]napprove");
    } else {
        choices.push("[s]kip");
    }
    if position.has_previous {
        choices.push("[p]revious");
    }
    if position.has_next {
        choices.push("[n]ext");
    }
    choices.push("[d]one");
    format!("{} > ", choices.join("  "))
}
