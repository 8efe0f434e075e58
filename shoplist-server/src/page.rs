//! HTML rendering of the review page.

use html_escape::{encode_double_quoted_attribute, encode_text};
use shoplist_core::{Contact, ReviewView};

use crate::config::PageConfig;
use crate::session::{Notice, NoticeKind};

const REVIEW_HTML_TEMPLATE: &str = include_str!("review.html");

/// Which optional controls to draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct Features<'a> {
    /// Contacts for the recipient selector; `None` hides the send form.
    pub recipients: Option<&'a [Contact]>,
    pub voice: bool,
    pub voice_active: bool,
}

const RESET_FORM: &str = r#"<form class="inline" method="post" action="/review/reset">
  <button class="danger" type="submit">Reset</button>
</form>"#;

const VOICE_START_FORM: &str = r#"<form method="post" action="/voice/start">
  <button class="secondary" type="submit">Answer by voice</button>
</form>"#;

const VOICE_LISTENING: &str = "<p><em>Listening for answers&hellip;</em></p>";

pub fn render_review_page(
    page: &PageConfig,
    view: &ReviewView,
    notice: Option<&Notice>,
    features: Features<'_>,
) -> String {
    let disabled = if view.controls_disabled { "disabled" } else { "" };

    let options: String = view
        .options
        .iter()
        .map(|q| format!("    <option value=\"{q}\">{q}</option>\n"))
        .collect();

    let selections: String = view
        .selection_lines()
        .iter()
        .map(|line| format!("  <li>{}</li>\n", encode_text(line)))
        .collect();

    let reset = if page.reset_enabled { RESET_FORM } else { "" };

    let voice = match (features.voice, features.voice_active) {
        (false, _) => "",
        (true, true) => VOICE_LISTENING,
        (true, false) => VOICE_START_FORM,
    };

    let title = encode_text(&page.title);
    let remaining = view.remaining.to_string();
    fill_template(
        REVIEW_HTML_TEMPLATE,
        &[
            ("title", &*title),
            ("notice", render_notice(notice).as_str()),
            ("prompt", &*encode_text(&view.prompt)),
            ("options", options.as_str()),
            ("disabled", disabled),
            ("confirm_label", &*encode_text(&page.confirm_label)),
            ("skip_label", &*encode_text(&page.skip_label)),
            ("reset", reset),
            ("voice", voice),
            ("selections", selections.as_str()),
            ("notify", render_notify_form(features.recipients).as_str()),
            ("remaining", remaining.as_str()),
            ("version", crate::get_version()),
        ],
    )
}

/// Replace `{name}` placeholders in a single left-to-right pass.
///
/// Inserted values are never rescanned, so text from the catalog or config
/// can contain braces. Braces around anything that is not a known name
/// (the stylesheet's) are copied through.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let placeholder = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match placeholder {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_notice(notice: Option<&Notice>) -> String {
    let Some(notice) = notice else {
        return String::new();
    };
    let class = match notice.kind {
        NoticeKind::Success => "success",
        NoticeKind::Error => "error",
    };
    format!(
        "<div class=\"notice {}\">{}</div>",
        class,
        encode_text(&notice.message)
    )
}

fn render_notify_form(recipients: Option<&[Contact]>) -> String {
    let Some(contacts) = recipients else {
        return String::new();
    };

    let mut form = String::from(r#"<form method="post" action="/notify">"#);
    if !contacts.is_empty() {
        form.push_str(r#"<select name="recipient"><option value="">Send to&hellip;</option>"#);
        for contact in contacts {
            form.push_str(&format!(
                "<option value=\"{}\">{}</option>",
                encode_double_quoted_attribute(&contact.label),
                encode_text(&contact.label)
            ));
        }
        form.push_str("</select>");
    }
    form.push_str(r#"<button class="primary" type="submit">Email List</button></form>"#);
    form
}
