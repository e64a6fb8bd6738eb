use tracing::{error, info, instrument, warn};

use super::image::{ImageKind, ImageUpload};
use super::outcome::{NicErrorKind, VerificationOutcome};
use super::personal::PersonalInfo;
use super::progress::{ProgressStore, RegistrationProgress, RegistrationStep, Transition};
use crate::idgate::client::IdentityApi;
use crate::idgate::retry::RetryPolicy;
use crate::idgate::{Error, Result};

/// Drives the remote call for each registration step and persists progress
/// after every change.
pub struct Registration<A> {
    api: A,
    store: ProgressStore,
    retry: RetryPolicy,
    progress: RegistrationProgress,
}

impl<A: IdentityApi> Registration<A> {
    /// Resumes from whatever progress is stored.
    ///
    /// # Errors
    /// Returns an error if the progress cannot be read.
    pub fn resume(api: A, store: ProgressStore, retry: RetryPolicy) -> Result<Self> {
        let progress = store.load()?;
        Ok(Self {
            api,
            store,
            retry,
            progress,
        })
    }

    #[must_use]
    pub fn progress(&self) -> &RegistrationProgress {
        &self.progress
    }

    fn commit(&mut self, transition: Transition) -> Result<()> {
        let mut next = self.progress.clone();
        next.apply(transition)?;
        if next.is_complete() {
            self.store.clear()?;
        } else {
            self.store.save(&next)?;
        }
        self.progress = next;
        Ok(())
    }

    fn expect_step(&self, step: RegistrationStep) -> Result<()> {
        if self.progress.current_step() == step {
            Ok(())
        } else {
            Err(Error::Transition(format!(
                "expected {step}, registration is at {}",
                self.progress.current_step()
            )))
        }
    }

    /// Validates the form locally, then registers with up to the configured
    /// number of attempts, retrying timeouts only.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] before any network call, the last
    /// transport error, or [`Error::Rejected`] with the server's message.
    #[instrument(skip_all)]
    pub async fn submit_personal_info(&mut self, info: PersonalInfo) -> Result<String> {
        self.expect_step(RegistrationStep::PersonalInfo)?;
        let info = info.normalized();
        info.validate()?;

        let policy = self.retry;
        let (api, info) = (&self.api, &info);
        let user_id = policy
            .run("registration", move |_| api.register(info))
            .await
            .inspect_err(|err| warn!("registration failed: {err}"))?;

        self.commit(Transition::PersonalInfoAccepted {
            user_id: user_id.clone(),
        })?;
        info!("registration accepted, user {user_id}");
        Ok(user_id)
    }

    /// Single attempt; biometric capture failures are rarely transient.
    ///
    /// # Errors
    /// Returns [`Error::InvalidImage`] before any network call, the transport
    /// error, or [`Error::Rejected`] with the server's message.
    #[instrument(skip(self, image))]
    pub async fn submit_face_image(&mut self, user_id: &str, image: &ImageUpload) -> Result<()> {
        self.expect_step(RegistrationStep::FaceVerification)?;
        image
            .check(ImageKind::Face)
            .map_err(Error::InvalidImage)?;

        self.api
            .verify_face(user_id, image)
            .await
            .inspect_err(|err| warn!("face verification failed: {err}"))?;

        self.commit(Transition::FaceVerified)?;
        info!("face verified for user {user_id}");
        Ok(())
    }

    /// Single attempt. Failures leave the step unchanged so the user can try
    /// again, and come back classified.
    #[instrument(skip(self, image))]
    pub async fn submit_nic_image(
        &mut self,
        user_id: &str,
        image: &ImageUpload,
    ) -> VerificationOutcome {
        if !self.progress.face_verification_completed() {
            return VerificationOutcome {
                message: "Face verification must be completed before NIC verification.".to_string(),
                error: Some(NicErrorKind::MissingFaceImage),
                suggestions: NicErrorKind::MissingFaceImage.default_suggestions(),
                ..VerificationOutcome::system_error("face verification not completed")
            };
        }
        if let Err(err) = self.expect_step(RegistrationStep::NicVerification) {
            return VerificationOutcome::system_error(err.to_string());
        }
        if let Err(problem) = image.check(ImageKind::Nic) {
            warn!("NIC image rejected locally: {problem}");
            return VerificationOutcome::poor_image_quality(problem);
        }

        let outcome = match self.api.verify_nic(user_id, image).await {
            Ok(response) => VerificationOutcome::from_response(response),
            Err(err) => {
                warn!("NIC verification request failed: {err}");
                VerificationOutcome::system_error(err.to_string())
            }
        };

        if !outcome.success {
            warn!(
                "NIC verification failed: {}",
                outcome.error.unwrap_or(NicErrorKind::SystemError)
            );
            return outcome;
        }

        // The server has verified the user; a local storage failure only
        // loses the resume point.
        if let Err(err) = self.commit(Transition::NicVerified) {
            error!("failed to record completed registration: {err}");
        }
        info!("registration complete for user {user_id}");
        outcome
    }

    /// Navigates to an already reachable step without touching completion.
    ///
    /// # Errors
    /// Returns [`Error::Transition`] if `step` is not reachable yet.
    pub fn go_to_step(&mut self, step: RegistrationStep) -> Result<()> {
        self.commit(Transition::GoTo(step))
    }

    /// Starts over and removes the stored progress.
    ///
    /// # Errors
    /// Returns an error if the stored progress cannot be removed.
    pub fn reset(&mut self) -> Result<()> {
        let mut next = self.progress.clone();
        next.apply(Transition::Reset)?;
        self.store.clear()?;
        self.progress = next;
        info!("registration reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idgate::client::ApiResponse;
    use crate::idgate::registration::outcome::NicVerificationData;
    use crate::idgate::registration::personal::test_forms;
    use crate::idgate::store::{
        KeyValueStore, MemoryStore, Origin, StorageEvent, StoreError, StoreOp,
        REGISTRATION_PROGRESS_KEY,
    };
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::broadcast;
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingApi {
        calls: AtomicU32,
    }

    impl IdentityApi for CountingApi {
        async fn register(&self, _info: &PersonalInfo) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("u-1".to_string())
        }

        async fn verify_face(&self, _user_id: &str, _image: &ImageUpload) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn verify_nic(
            &self,
            _user_id: &str,
            _image: &ImageUpload,
        ) -> Result<ApiResponse<NicVerificationData>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ApiResponse {
                success: true,
                message: "Verified".to_string(),
                data: None,
            })
        }
    }

    fn registration() -> anyhow::Result<(Arc<MemoryStore>, Registration<CountingApi>)> {
        let backend = Arc::new(MemoryStore::new());
        let store = ProgressStore::new(backend.clone());
        let registration =
            Registration::resume(CountingApi::default(), store, RetryPolicy::registration())?;
        Ok((backend, registration))
    }

    fn image(name: &str) -> ImageUpload {
        ImageUpload::new(name, vec![0xff, 0xd8, 0xff])
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_network() -> anyhow::Result<()> {
        let (backend, mut registration) = registration()?;
        let mut form = test_forms::valid();
        form.nic_number = "12345".to_string();

        let result = registration.submit_personal_info(form).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(registration.api.calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.get(REGISTRATION_PROGRESS_KEY)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn face_step_requires_personal_info() -> anyhow::Result<()> {
        let (_, mut registration) = registration()?;
        let result = registration.submit_face_image("u-1", &image("face.jpg")).await;
        assert!(matches!(result, Err(Error::Transition(_))));
        assert_eq!(registration.api.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_face_image_is_an_error() -> anyhow::Result<()> {
        let (_, mut registration) = registration()?;
        registration.submit_personal_info(test_forms::valid()).await?;

        let bad = ImageUpload::new("face.bmp", vec![1, 2, 3]);
        let result = registration.submit_face_image("u-1", &bad).await;
        assert!(matches!(result, Err(Error::InvalidImage(_))));
        assert_eq!(
            registration.progress().current_step(),
            RegistrationStep::FaceVerification
        );
        Ok(())
    }

    #[tokio::test]
    async fn nic_before_face_is_missing_face_image() -> anyhow::Result<()> {
        let (_, mut registration) = registration()?;
        registration.submit_personal_info(test_forms::valid()).await?;

        let outcome = registration.submit_nic_image("u-1", &image("nic.jpg")).await;
        assert_eq!(outcome.error, Some(NicErrorKind::MissingFaceImage));
        assert!(!outcome.suggestions.is_empty());
        assert_eq!(registration.api.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_nic_image_is_poor_quality_without_upload() -> anyhow::Result<()> {
        let (_, mut registration) = registration()?;
        registration.submit_personal_info(test_forms::valid()).await?;
        registration.submit_face_image("u-1", &image("face.jpg")).await?;

        let huge = ImageUpload::new("nic.png", vec![0; 11 * 1024 * 1024]);
        let outcome = registration.submit_nic_image("u-1", &huge).await;
        assert_eq!(outcome.error, Some(NicErrorKind::PoorImageQuality));
        assert_eq!(registration.api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            registration.progress().current_step(),
            RegistrationStep::NicVerification
        );
        Ok(())
    }

    #[tokio::test]
    async fn completion_deletes_stored_progress() -> anyhow::Result<()> {
        let (backend, mut registration) = registration()?;
        registration.submit_personal_info(test_forms::valid()).await?;
        registration.submit_face_image("u-1", &image("face.jpg")).await?;
        assert!(backend.get(REGISTRATION_PROGRESS_KEY)?.is_some());

        let outcome = registration.submit_nic_image("u-1", &image("nic.jpg")).await;
        assert!(outcome.success);
        assert!(registration.progress().is_complete());
        assert_eq!(backend.get(REGISTRATION_PROGRESS_KEY)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn back_navigation_and_reset() -> anyhow::Result<()> {
        let (backend, mut registration) = registration()?;
        registration.submit_personal_info(test_forms::valid()).await?;

        registration.go_to_step(RegistrationStep::PersonalInfo)?;
        assert!(registration.progress().personal_info_completed());
        assert!(registration
            .go_to_step(RegistrationStep::NicVerification)
            .is_err());

        registration.reset()?;
        assert_eq!(registration.progress(), &RegistrationProgress::default());
        assert_eq!(backend.get(REGISTRATION_PROGRESS_KEY)?, None);
        Ok(())
    }

    /// Memory backend whose writes fail while `broken` is set.
    struct FlakyStore {
        inner: MemoryStore,
        broken: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.apply(ops)
        }

        fn origin(&self) -> Origin {
            self.inner.origin()
        }

        fn watch(&self) -> broadcast::Receiver<StorageEvent> {
            self.inner.watch()
        }
    }

    #[tokio::test]
    async fn failed_reset_keeps_memory_and_storage_in_step() -> anyhow::Result<()> {
        let backend = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            broken: AtomicBool::new(false),
        });
        let store = ProgressStore::new(backend.clone());
        let mut registration =
            Registration::resume(CountingApi::default(), store, RetryPolicy::registration())?;
        registration.submit_personal_info(test_forms::valid()).await?;
        let before = registration.progress().clone();

        backend.broken.store(true, Ordering::SeqCst);
        assert!(registration.reset().is_err());
        assert_eq!(registration.progress(), &before);
        assert!(backend.get(REGISTRATION_PROGRESS_KEY)?.is_some());

        backend.broken.store(false, Ordering::SeqCst);
        registration.reset()?;
        assert_eq!(registration.progress(), &RegistrationProgress::default());
        assert_eq!(backend.get(REGISTRATION_PROGRESS_KEY)?, None);
        Ok(())
    }
}
