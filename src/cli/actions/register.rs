use crate::cli::globals::GlobalArgs;
use crate::idgate::{
    client::ApiClient,
    registration::{ImageUpload, PersonalInfo, ProgressStore, Registration, RegistrationStep},
    store::KeyValueStore,
};
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub enum Step {
    Info(PersonalInfo),
    Face { image: PathBuf },
    Nic { image: PathBuf },
    Back { step: RegistrationStep },
    Show,
    Reset,
}

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub step: Step,
}

fn user_id(registration: &Registration<ApiClient>) -> Result<String> {
    registration
        .progress()
        .user_id()
        .map(ToString::to_string)
        .context("no registered user yet, run `idgate register info` first")
}

/// # Errors
/// Returns an error if the step fails or cannot be taken from the current
/// progress.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.globals.config()?;
    let backend: Arc<dyn KeyValueStore> = args.globals.open_store()?;
    let client = ApiClient::new(config.clone())?;
    let mut registration = Registration::resume(
        client,
        ProgressStore::new(backend),
        config.registration_retry(),
    )?;

    match args.step {
        Step::Info(info) => {
            let user_id = registration
                .submit_personal_info(info)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("Personal information accepted (user {user_id})");
            println!("Next: idgate register face --image <photo>");
        }
        Step::Face { image } => {
            let user_id = user_id(&registration)?;
            let upload = ImageUpload::from_path(&image).await?;
            registration
                .submit_face_image(&user_id, &upload)
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            println!("Face verified");
            println!("Next: idgate register nic --image <photo>");
        }
        Step::Nic { image } => {
            let user_id = user_id(&registration)?;
            let upload = ImageUpload::from_path(&image).await?;
            let outcome = registration.submit_nic_image(&user_id, &upload).await;
            if !outcome.success {
                println!("{}", outcome.message);
                for suggestion in &outcome.suggestions {
                    println!("  - {suggestion}");
                }
                match outcome.error {
                    Some(kind) => bail!("NIC verification failed: {kind}"),
                    None => bail!("NIC verification failed"),
                }
            }
            println!("{}", outcome.message);
            println!("Registration complete, you can now log in");
        }
        Step::Back { step } => {
            registration.go_to_step(step)?;
            println!("Back at {step}");
        }
        Step::Show => {
            println!("{}", serde_json::to_string_pretty(registration.progress())?);
        }
        Step::Reset => {
            registration.reset()?;
            println!("Registration reset");
        }
    }

    Ok(())
}
