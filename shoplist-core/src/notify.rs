//! Turning selections into a shopping list message.
//!
//! Composition is pure: it checks the preconditions, resolves the recipient
//! and formats the body. Sending is left to whatever transport the caller
//! holds, and never happens when a precondition fails.

use serde::Serialize;

use crate::review::Selection;

/// Subject line of every list message.
pub const SUBJECT: &str = "Your Shopping List";

/// First line of the message body.
pub const BODY_HEADER: &str = "Here is your shopping list:";

/// A named destination the shopper can pick from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub label: String,
    pub address: String,
}

/// Ordered set of contacts, in the order they were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressBook {
    contacts: Vec<Contact>,
}

impl AddressBook {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Look up a contact by label, ignoring case and surrounding whitespace.
    pub fn lookup(&self, label: &str) -> Option<&Contact> {
        let label = label.trim();
        self.contacts
            .iter()
            .find(|c| c.label.eq_ignore_ascii_case(label))
    }
}

/// How the destination address is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientPolicy {
    /// Always send to this address; the page shows no selector.
    Fixed(String),
    /// The shopper picks a contact from the book.
    AddressBook(AddressBook),
}

impl RecipientPolicy {
    /// Resolve the address for a send, given what the shopper chose (if anything).
    pub fn resolve(&self, choice: Option<&str>) -> Option<String> {
        match self {
            Self::Fixed(address) => Some(address.clone()),
            Self::AddressBook(book) => choice
                .filter(|c| !c.trim().is_empty())
                .and_then(|c| book.lookup(c))
                .map(|contact| contact.address.clone()),
        }
    }

    /// Contacts to offer in the selector; empty for a fixed recipient.
    pub fn choices(&self) -> &[Contact] {
        match self {
            Self::Fixed(_) => &[],
            Self::AddressBook(book) => book.contacts(),
        }
    }
}

/// Why a list was not sent. Each cause has its own message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyRejection {
    #[error("Your list is empty. Add some items before sending it.")]
    NoSelections,
    #[error("Please choose who to send the list to.")]
    NoRecipient,
    #[error("Email is not set up for this list.")]
    NotConfigured,
}

/// A formatted list ready to hand to a mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Build the message for `selections`.
///
/// An empty list is reported ahead of a missing recipient.
pub fn compose(
    selections: &[Selection],
    recipient: Option<String>,
) -> Result<ShoppingListMessage, NotifyRejection> {
    if selections.is_empty() {
        return Err(NotifyRejection::NoSelections);
    }
    let to = recipient
        .filter(|r| !r.trim().is_empty())
        .ok_or(NotifyRejection::NoRecipient)?;

    Ok(ShoppingListMessage {
        to,
        subject: SUBJECT.to_string(),
        body: format_body(selections),
    })
}

/// Header line followed by one `name: quantity` line per selection.
pub fn format_body(selections: &[Selection]) -> String {
    let mut body = String::from(BODY_HEADER);
    for selection in selections {
        body.push('\n');
        body.push_str(&selection.to_string());
    }
    body.push('\n');
    body
}
