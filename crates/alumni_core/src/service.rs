//! AdminService: the privileged operations behind the admin API.
//!
//! Takes port traits via `Arc<dyn PortTrait>` so the same logic runs against
//! the BaaS adapters or the in-memory doubles in [`crate::memory`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::{
    credentials::{generate_temporary_password, MIN_PASSWORD_LEN},
    error::{ApprovalError, Result},
    ports::{
        Claim, ClaimOutcome, EmailSender, IdentityProvider, ProfileStore, RegistrationStore,
        UserStore,
    },
    saga::{Resource, Saga, Step, StepFailure},
    types::*,
};

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Tunables for the provisioning workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound on every remote call, forward or compensating.
    pub step_timeout: Duration,
    /// Age after which an approval claim is considered abandoned.
    pub claim_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(10),
            claim_ttl: Duration::from_secs(300),
        }
    }
}

/// Most remote calls one approval can make: five forward steps plus four
/// compensations, each bounded by `step_timeout`.
pub const MAX_CALLS_PER_APPROVAL: u32 = 9;

impl ServiceConfig {
    /// A claim must outlive the longest approval run, otherwise a second
    /// approval can take it over while the first is still provisioning.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.step_timeout.is_zero() {
            anyhow::bail!("step timeout must be greater than zero");
        }
        let longest_run = self.step_timeout * MAX_CALLS_PER_APPROVAL;
        if self.claim_ttl <= longest_run {
            anyhow::bail!(
                "claim TTL of {}s must exceed {}s ({} calls of {}ms)",
                self.claim_ttl.as_secs(),
                longest_run.as_secs(),
                MAX_CALLS_PER_APPROVAL,
                self.step_timeout.as_millis()
            );
        }
        Ok(())
    }
}

pub struct AdminService {
    registrations: Arc<dyn RegistrationStore>,
    users: Arc<dyn UserStore>,
    profiles: Arc<dyn ProfileStore>,
    identities: Arc<dyn IdentityProvider>,
    mailer: Option<Arc<dyn EmailSender>>,
    config: ServiceConfig,
}

impl AdminService {
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        users: Arc<dyn UserStore>,
        profiles: Arc<dyn ProfileStore>,
        identities: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            registrations,
            users,
            profiles,
            identities,
            mailer: None,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> ServiceConfig {
        self.config
    }

    // ── Registration approval ─────────────────────────────────

    /// Turn one pending registration into an identity, a user row and a
    /// profile row, then delete the registration.
    ///
    /// Failures in the provisioning steps roll back whatever was created.
    /// A failed final delete is reported as [`ApprovalError::CleanupFailed`]
    /// with the new user id; the account itself stays in place.
    pub async fn approve_registration(&self, registration_id: &str) -> Result<Approval> {
        let registration_id = registration_id.trim();
        if registration_id.is_empty() {
            return Err(ApprovalError::InvalidInput(
                "registrationId is required".to_string(),
            ));
        }

        let mut saga = Saga::new("approve_registration", self.config.step_timeout);

        let claim = saga
            .run(
                Step::FetchRegistration,
                self.registrations.claim(registration_id, self.config.claim_ttl),
            )
            .await;
        let Claim {
            registration,
            token,
        } = match claim {
            Ok(ClaimOutcome::Claimed(claim)) => claim,
            Ok(ClaimOutcome::Busy) => {
                return Err(ApprovalError::AlreadyInProgress(registration_id.to_string()))
            }
            Ok(ClaimOutcome::Missing) => {
                return Err(ApprovalError::NotFound(format!(
                    "Registration not found: {}",
                    registration_id
                )))
            }
            Err(failure) => {
                return Err(ApprovalError::from_step(
                    Step::FetchRegistration,
                    failure,
                    Vec::new(),
                ))
            }
        };

        {
            let registrations = Arc::clone(&self.registrations);
            let id = registration_id.to_string();
            saga.on_rollback(Resource::RegistrationClaim, registration_id, move || async move {
                registrations.release(&id, &token).await
            });
        }

        info!(
            registration_id,
            email = %registration.email,
            "approving registration"
        );

        let user_id = self
            .provision(
                &mut saga,
                &registration.email,
                generate_temporary_password(),
                Role::Alumni,
                registration.profile_fields(),
            )
            .await?;
        saga.commit();

        match saga
            .run(
                Step::DeleteRegistration,
                self.registrations.delete(registration_id),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                registration_id,
                user_id = %user_id,
                "pending registration already gone at cleanup"
            ),
            Err(failure) => {
                warn!(
                    registration_id,
                    user_id = %user_id,
                    error = %failure,
                    "approval succeeded but cleanup failed"
                );
                return Err(ApprovalError::CleanupFailed {
                    user_id,
                    message: failure.to_string(),
                });
            }
        }

        info!(registration_id, user_id = %user_id, "registration approved");
        Ok(Approval { user_id })
    }

    /// Delete a pending registration without approving it.
    ///
    /// Also the manual retry for a registration left behind by
    /// [`ApprovalError::CleanupFailed`].
    pub async fn reject_registration(&self, registration_id: &str) -> Result<()> {
        let registration_id = registration_id.trim();
        if registration_id.is_empty() {
            return Err(ApprovalError::InvalidInput(
                "registrationId is required".to_string(),
            ));
        }

        let saga = Saga::new("reject_registration", self.config.step_timeout);
        let deleted = saga
            .run(
                Step::DeleteRegistration,
                self.registrations.delete(registration_id),
            )
            .await
            .map_err(|failure| read_failure(Step::DeleteRegistration, failure))?;

        if !deleted {
            return Err(ApprovalError::NotFound(format!(
                "Registration not found: {}",
                registration_id
            )));
        }
        info!(registration_id, "registration removed");
        Ok(())
    }

    pub async fn list_pending(&self, limit: Option<i64>) -> Result<Vec<PendingRegistration>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let saga = Saga::new("list_pending", self.config.step_timeout);
        saga.run(Step::FetchRegistration, self.registrations.list(limit))
            .await
            .map_err(|failure| read_failure(Step::FetchRegistration, failure))
    }

    // ── Direct account creation ───────────────────────────────

    /// Provision an account that never went through self-registration.
    pub async fn create_account(&self, account: NewAccount) -> Result<Approval> {
        let account = validate_account(account)?;
        let password = account
            .password
            .clone()
            .unwrap_or_else(generate_temporary_password);

        let mut saga = Saga::new("create_account", self.config.step_timeout);
        let user_id = self
            .provision(
                &mut saga,
                &account.email,
                password,
                account.role,
                account.profile,
            )
            .await?;
        saga.commit();

        info!(user_id = %user_id, role = %account.role, "account created");
        Ok(Approval { user_id })
    }

    // ── Email ─────────────────────────────────────────────────

    pub async fn send_test_email(&self, to: &str) -> Result<EmailReceipt> {
        let to = to.trim();
        if !looks_like_email(to) {
            return Err(ApprovalError::InvalidInput(
                "a valid recipient address is required".to_string(),
            ));
        }
        let mailer = self
            .mailer
            .as_ref()
            .ok_or_else(|| ApprovalError::NotConfigured("email provider".to_string()))?;

        let message = EmailMessage {
            to: to.to_string(),
            subject: "Alumni Portal test email".to_string(),
            html: "<p>This is a test message from the Alumni Portal admin service.</p>"
                .to_string(),
        };
        let saga = Saga::new("send_test_email", self.config.step_timeout);
        let receipt = saga
            .run(Step::SendEmail, mailer.send_email(&message))
            .await
            .map_err(|failure| ApprovalError::from_step(Step::SendEmail, failure, Vec::new()))?;
        info!(to, "test email sent");
        Ok(receipt)
    }

    // ── Shared provisioning chain ─────────────────────────────

    /// Identity → user row → profile row, registering a compensation after
    /// each step. Returns the new user id; compensates and fails otherwise.
    async fn provision(
        &self,
        saga: &mut Saga,
        email: &str,
        password: String,
        role: Role,
        fields: ProfileFields,
    ) -> Result<String> {
        let request = NewIdentity {
            email: email.to_string(),
            password,
            confirmed: true,
        };
        let identity = match saga
            .run(
                Step::ProvisionIdentity,
                self.identities.create_identity(&request),
            )
            .await
        {
            Ok(identity) => identity,
            Err(failure) => {
                let orphans = saga.compensate().await;
                return Err(ApprovalError::from_step(
                    Step::ProvisionIdentity,
                    failure,
                    orphans,
                ));
            }
        };
        {
            let identities = Arc::clone(&self.identities);
            let id = identity.id.clone();
            saga.on_rollback(Resource::Identity, &identity.id, move || async move {
                identities.delete_identity(&id).await
            });
        }

        let user = NewUser::approved(&identity, role);
        if let Err(failure) = saga.run(Step::WriteUser, self.users.insert(&user)).await {
            let orphans = saga.compensate().await;
            return Err(ApprovalError::from_step(Step::WriteUser, failure, orphans));
        }
        {
            let users = Arc::clone(&self.users);
            let id = user.id.clone();
            saga.on_rollback(Resource::User, &user.id, move || async move {
                users.delete(&id).await
            });
        }

        let profile = UserProfile {
            user_id: user.id.clone(),
            fields,
        };
        if let Err(failure) = saga
            .run(Step::WriteProfile, self.profiles.insert(&profile))
            .await
        {
            let orphans = saga.compensate().await;
            return Err(ApprovalError::from_step(
                Step::WriteProfile,
                failure,
                orphans,
            ));
        }
        {
            let profiles = Arc::clone(&self.profiles);
            let id = user.id.clone();
            saga.on_rollback(Resource::Profile, &user.id, move || async move {
                profiles.delete(&id).await
            });
        }

        Ok(user.id)
    }
}

/// Failures of single-step operations that have nothing to compensate.
fn read_failure(step: Step, failure: StepFailure) -> ApprovalError {
    match failure {
        StepFailure::TimedOut(_) => ApprovalError::from_step(step, failure, Vec::new()),
        StepFailure::Port(e) => ApprovalError::Unexpected(e.into()),
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn validate_account(mut account: NewAccount) -> Result<NewAccount> {
    account.email = account.email.trim().to_lowercase();
    if !looks_like_email(&account.email) {
        return Err(ApprovalError::InvalidInput(
            "a valid email is required".to_string(),
        ));
    }
    account.profile.first_name = account.profile.first_name.trim().to_string();
    account.profile.last_name = account.profile.last_name.trim().to_string();
    if account.profile.first_name.is_empty() || account.profile.last_name.is_empty() {
        return Err(ApprovalError::InvalidInput(
            "firstName and lastName are required".to_string(),
        ));
    }
    if let Some(password) = &account.password {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApprovalError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
    }
    Ok(account)
}
