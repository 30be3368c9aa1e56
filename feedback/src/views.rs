use crate::resolver::ResolvedContext;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write;

/// One-shot notice carried across a redirect in the `flash` cookie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flash {
    SubmissionFailed,
}

impl Flash {
    pub const COOKIE: &'static str = "flash";

    pub fn code(&self) -> &'static str {
        match self {
            Flash::SubmissionFailed => "submission_failed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "submission_failed" => Some(Flash::SubmissionFailed),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Flash::SubmissionFailed => "Error posting your feedback",
        }
    }
}

/// Display fields for the feedback form. Each one is set only when the
/// referrer resolved to something that has it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormContext {
    pub lab_name: Option<String>,
    pub lab_id: Option<String>,
    pub expt_name: Option<String>,
    pub expt_id: Option<String>,
    pub flash: Option<Flash>,
}

impl FormContext {
    pub fn with_flash(mut self, flash: Option<Flash>) -> Self {
        self.flash = flash;
        self
    }
}

impl From<ResolvedContext> for FormContext {
    fn from(context: ResolvedContext) -> Self {
        match context {
            ResolvedContext::Generic => FormContext::default(),
            ResolvedContext::Lab { lab_id, lab_name } => FormContext {
                lab_name: Some(lab_name),
                lab_id: Some(lab_id.to_string()),
                ..Default::default()
            },
            ResolvedContext::Experiment {
                lab_id,
                lab_name,
                experiment_id,
                experiment_name,
            } => FormContext {
                lab_name: Some(lab_name),
                lab_id: Some(lab_id.to_string()),
                expt_name: Some(experiment_name),
                expt_id: Some(experiment_id.to_string()),
                flash: None,
            },
        }
    }
}

fn page(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        encode_text(title),
        content
    )
}

pub fn render_form(context: &FormContext) -> String {
    let mut content = String::new();

    if let Some(flash) = context.flash {
        let _ = writeln!(
            content,
            "<p class=\"flash\">{}</p>",
            encode_text(flash.message())
        );
    }

    content.push_str("<h1>Feedback</h1>\n");

    if let Some(lab_name) = &context.lab_name {
        let _ = writeln!(content, "<p>Lab: <strong>{}</strong></p>", encode_text(lab_name));
    }
    if let Some(expt_name) = &context.expt_name {
        let _ = writeln!(
            content,
            "<p>Experiment: <strong>{}</strong></p>",
            encode_text(expt_name)
        );
    }

    content.push_str("<form method=\"post\" action=\"/\">\n");

    if let Some(lab_id) = &context.lab_id {
        let _ = writeln!(
            content,
            "<input type=\"hidden\" name=\"lab\" value=\"{}\">",
            encode_double_quoted_attribute(lab_id)
        );
    }
    if let Some(expt_id) = &context.expt_id {
        let _ = writeln!(
            content,
            "<input type=\"hidden\" name=\"experiment\" value=\"{}\">",
            encode_double_quoted_attribute(expt_id)
        );
    }

    content.push_str(concat!(
        "<label>Name <input type=\"text\" name=\"name\"></label>\n",
        "<label>Email <input type=\"email\" name=\"email\"></label>\n",
        "<label>Comments <textarea name=\"comments\"></textarea></label>\n",
        "<button type=\"submit\">Send feedback</button>\n",
        "</form>\n",
    ));

    page("Feedback", &content)
}

pub fn render_thanks() -> String {
    page(
        "Thank you",
        "<h1>Thank you</h1>\n<p>Your feedback has been recorded.</p>\n<p><a href=\"/\">Back to the form</a></p>\n",
    )
}
