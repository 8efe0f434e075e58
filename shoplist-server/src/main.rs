use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use shoplist_core::{load_catalog, VoiceIntents};
use shoplist_server::config::Config;
use shoplist_server::mailer::{MailTransport, SmtpMailer};
use shoplist_server::session::SessionStore;
use shoplist_server::voice::ConsoleVoiceBackend;
use shoplist_server::{app, AppState, VoiceSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting shopping list review server");

    let config =
        Config::from_env().context("Failed to load configuration from environment variables")?;

    let catalog = load_catalog(&config.catalog_path, &config.catalog_sheet).with_context(|| {
        format!("Failed to load catalog from {}", config.catalog_path.display())
    })?;
    info!(
        "Loaded {} catalog items from {} (advance policy: {})",
        catalog.len(),
        config.catalog_path.display(),
        config.advance_policy
    );

    let mailer: Option<Arc<dyn MailTransport>> = match &config.smtp {
        Some(smtp) => {
            info!("Email enabled via {}:{}", smtp.host, smtp.port);
            Some(Arc::new(
                SmtpMailer::new(smtp).context("Failed to configure SMTP transport")?,
            ))
        }
        None => {
            info!("Email not configured; the send form is hidden");
            None
        }
    };

    let voice = config.voice.map(|voice| {
        info!(
            "Voice review enabled (default quantity {})",
            voice.default_quantity
        );
        VoiceSettings {
            intents: VoiceIntents::new(voice.affirmatives, voice.default_quantity),
            backend: Arc::new(ConsoleVoiceBackend::default()),
        }
    });

    info!(
        "Idle review sessions expire after {} minutes",
        config.session_idle.as_secs() / 60
    );

    let app_state = Arc::new(AppState {
        sessions: SessionStore::new(catalog, config.advance_policy),
        page: config.page,
        recipients: config.recipients,
        mailer,
        voice,
    });

    // Drop sessions abandoned by their browser
    let eviction_state = app_state.clone();
    let session_idle = config.session_idle;
    tokio::spawn(async move {
        eviction_state.sessions.eviction_loop(session_idle).await;
    });

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
