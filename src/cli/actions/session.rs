use crate::cli::globals::GlobalArgs;
use crate::idgate::{
    client::ApiClient,
    config::GateConfig,
    monitor::SessionMonitor,
    policy::{SecurityEvent, SecurityPolicy},
    store::{FileStore, SessionStore},
    validator::AuthValidator,
};
use anyhow::{anyhow, bail, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

#[derive(Debug)]
pub struct LoginArgs {
    pub globals: GlobalArgs,
    pub email: String,
    pub password: SecretString,
}

struct Session {
    config: GateConfig,
    backend: Arc<FileStore>,
    validator: AuthValidator<ApiClient>,
}

fn open(globals: &GlobalArgs) -> Result<Session> {
    let config = globals.config()?;
    let backend = globals.open_store()?;
    let store = Arc::new(SessionStore::new(backend.clone()));
    let policy = Arc::new(SecurityPolicy::new(
        config.max_failed_attempts(),
        config.lockout_duration(),
        store.clone(),
    ));
    let client = ApiClient::new(config.clone())?;

    debug!("session store: {}", globals.store_path.display());

    Ok(Session {
        config,
        backend,
        validator: AuthValidator::new(client, store, policy),
    })
}

/// # Errors
/// Returns an error if the login is rejected or the session cannot be stored.
pub async fn login(args: LoginArgs) -> Result<()> {
    let session = open(&args.globals)?;
    let profile = session
        .validator
        .login(&args.email, &args.password)
        .await
        .map_err(|err| anyhow!(err.user_message()))?;

    println!(
        "Logged in as {} <{}> ({})",
        profile.display_name(),
        profile.email,
        profile.role
    );
    if !profile.is_verified {
        println!(
            "Account not verified yet (status: {})",
            profile.verification_status.as_deref().unwrap_or("PENDING")
        );
    }
    Ok(())
}

/// # Errors
/// Returns an error if there is no valid session.
pub async fn status(globals: GlobalArgs) -> Result<()> {
    let session = open(&globals)?;
    if !session.validator.validate_authentication().await {
        bail!("not authenticated");
    }

    match session.validator.store().read()?.and_then(|raw| raw.profile()) {
        Some(profile) => println!(
            "Authenticated as {} <{}> ({})",
            profile.display_name(),
            profile.email,
            profile.role
        ),
        None => println!("Authenticated"),
    }
    Ok(())
}

/// # Errors
/// Returns an error if the session file cannot be opened.
pub fn logout(globals: &GlobalArgs) -> Result<()> {
    let session = open(globals)?;
    session.validator.logout();
    println!("Logged out");
    Ok(())
}

/// Watches the session file until interrupted or until tampering forces a
/// logout.
///
/// # Errors
/// Returns an error on a forced logout.
pub async fn watch(globals: GlobalArgs) -> Result<()> {
    let session = open(&globals)?;
    let store = session.validator.store().clone();
    let policy = session.validator.policy().clone();

    let mut events = policy.subscribe();
    let _monitor = SessionMonitor::spawn(store, policy);
    let watcher = session.backend.spawn_watcher(session.config.watch_interval());

    if session.validator.validate_authentication().await {
        println!("Session valid, watching {}", globals.store_path.display());
    } else {
        println!("No valid session, watching {}", globals.store_path.display());
    }

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(SecurityEvent::ForcedLogout { reason, redirect }) => {
                    println!("Forced logout: {reason}. Log in again ({redirect}).");
                    break Err(anyhow!("forced logout: {reason}"));
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    watcher.abort();
    result
}
