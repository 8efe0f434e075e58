use anyhow::{bail, Context, Result};
use shoplist_core::catalog::DEFAULT_SHEET;
use shoplist_core::voice::DEFAULT_AFFIRMATIVES;
use shoplist_core::{AddressBook, AdvancePolicy, Contact, RecipientPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Credentials and relay for sending lists by email.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender mailbox; defaults to the username.
    pub from: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

/// Settings for the spoken review loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    pub default_quantity: u32,
    pub affirmatives: Vec<String>,
}

/// Labels and optional features of the review page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    pub title: String,
    pub confirm_label: String,
    pub skip_label: String,
    pub reset_enabled: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: "Shopping List".to_string(),
            confirm_label: "Add to List".to_string(),
            skip_label: "Skip".to_string(),
            reset_enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_path: PathBuf,
    /// Worksheet read from spreadsheet catalogs.
    pub catalog_sheet: String,
    /// Whether reviewed items come round again or are gone for good.
    /// Required: there is no sensible default between the two.
    pub advance_policy: AdvancePolicy,
    pub port: u16,
    /// Sessions untouched this long are dropped.
    pub session_idle: Duration,
    pub page: PageConfig,
    /// `None` when no recipient or address book is configured.
    pub recipients: Option<RecipientPolicy>,
    /// `None` disables sending lists by email.
    pub smtp: Option<SmtpConfig>,
    /// `None` disables the voice loop.
    pub voice: Option<VoiceConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let catalog_path = var("SHOPLIST_CATALOG_PATH")
            .map(PathBuf::from)
            .context("SHOPLIST_CATALOG_PATH environment variable is required")?;

        let catalog_sheet =
            var("SHOPLIST_CATALOG_SHEET").unwrap_or_else(|| DEFAULT_SHEET.to_string());

        let advance_policy = parse_advance_policy(var("SHOPLIST_ADVANCE_POLICY"))?;

        let port = var("PORT")
            .unwrap_or_else(|| "8050".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let session_idle = var("SHOPLIST_SESSION_IDLE_MINUTES")
            .unwrap_or_else(|| "60".to_string())
            .parse::<u64>()
            .ok()
            .filter(|m| *m > 0)
            .map(|minutes| Duration::from_secs(minutes * 60))
            .context("SHOPLIST_SESSION_IDLE_MINUTES must be a positive number")?;

        let defaults = PageConfig::default();
        let page = PageConfig {
            title: var("SHOPLIST_TITLE").unwrap_or(defaults.title),
            confirm_label: var("SHOPLIST_CONFIRM_LABEL").unwrap_or(defaults.confirm_label),
            skip_label: var("SHOPLIST_SKIP_LABEL").unwrap_or(defaults.skip_label),
            reset_enabled: parse_flag(var("SHOPLIST_RESET_ENABLED"), defaults.reset_enabled)
                .context("SHOPLIST_RESET_ENABLED must be true or false")?,
        };

        let recipients = match var("SHOPLIST_RECIPIENT") {
            Some(address) => Some(RecipientPolicy::Fixed(address.trim().to_string())),
            None => {
                let book = parse_address_book(&var("SHOPLIST_ADDRESS_BOOK").unwrap_or_default())
                    .context("SHOPLIST_ADDRESS_BOOK must be a list of Label=address pairs")?;
                (!book.is_empty()).then_some(RecipientPolicy::AddressBook(book))
            }
        };

        let smtp = match (var("SMTP_USERNAME"), var("SMTP_PASSWORD")) {
            (Some(username), Some(password)) => {
                let port = var("SMTP_PORT")
                    .unwrap_or_else(|| "465".to_string())
                    .parse::<u16>()
                    .context("SMTP_PORT must be a valid number")?;
                Some(SmtpConfig {
                    host: var("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
                    port,
                    from: var("SMTP_FROM").unwrap_or_else(|| username.clone()),
                    username,
                    password,
                })
            }
            (None, None) => None,
            _ => bail!("SMTP_USERNAME and SMTP_PASSWORD must be set together"),
        };

        let voice_enabled = parse_flag(var("VOICE_ENABLED"), false)
            .context("VOICE_ENABLED must be true or false")?;
        let voice = if voice_enabled {
            let default_quantity = var("VOICE_DEFAULT_QUANTITY")
                .unwrap_or_else(|| "1".to_string())
                .parse::<u32>()
                .ok()
                .filter(|q| *q > 0)
                .context("VOICE_DEFAULT_QUANTITY must be a positive number")?;
            let affirmatives = parse_keywords(var("VOICE_KEYWORDS"));
            Some(VoiceConfig {
                default_quantity,
                affirmatives,
            })
        } else {
            None
        };

        Ok(Config {
            catalog_path,
            catalog_sheet,
            advance_policy,
            port,
            session_idle,
            page,
            recipients,
            smtp,
            voice,
        })
    }
}

/// Parse SHOPLIST_ADVANCE_POLICY. A missing value is an error.
pub fn parse_advance_policy(value: Option<String>) -> Result<AdvancePolicy> {
    let Some(value) = value else {
        bail!("SHOPLIST_ADVANCE_POLICY environment variable is required (rotate or consume)");
    };
    value
        .parse::<AdvancePolicy>()
        .map_err(anyhow::Error::msg)
        .context("SHOPLIST_ADVANCE_POLICY is invalid")
}

/// Parse a boolean flag, falling back to `default` when unset.
pub fn parse_flag(value: Option<String>, default: bool) -> Result<bool> {
    match value {
        None => Ok(default),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => bail!("`{}` is not a boolean", other),
        },
    }
}

/// Parse `Label=address` pairs separated by commas, keeping their order.
pub fn parse_address_book(value: &str) -> Result<AddressBook> {
    let mut contacts = Vec::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((label, address)) = pair.split_once('=') else {
            bail!("`{}` is missing an `=`", pair);
        };
        let (label, address) = (label.trim(), address.trim());
        if label.is_empty() || address.is_empty() {
            bail!("`{}` needs both a label and an address", pair);
        }
        contacts.push(Contact {
            label: label.to_string(),
            address: address.to_string(),
        });
    }
    Ok(AddressBook::new(contacts))
}

/// Parse VOICE_KEYWORDS, using the built-in affirmatives when unset.
pub fn parse_keywords(value: Option<String>) -> Vec<String> {
    match value {
        Some(v) => v
            .split(',')
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect(),
        None => DEFAULT_AFFIRMATIVES.iter().map(|w| w.to_string()).collect(),
    }
}
