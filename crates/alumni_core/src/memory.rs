//! In-memory port implementations.
//!
//! Used by unit tests here and by the HTTP tests of the server crate. Every
//! double can be told to fail its writes or deletes, and all of them append
//! to a shared journal so tests can assert the exact call order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::ports::*;
use crate::service::AdminService;
use crate::types::*;

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Injected failures for one double.
#[derive(Default)]
struct Faults {
    insert: RwLock<Option<String>>,
    delete: RwLock<Option<String>>,
}

impl Faults {
    async fn on_insert(&self) -> PortResult<()> {
        match self.insert.read().await.as_ref() {
            Some(message) => Err(PortError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    async fn on_delete(&self) -> PortResult<()> {
        match self.delete.read().await.as_ref() {
            Some(message) => Err(PortError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    async fn heal(&self) {
        *self.insert.write().await = None;
        *self.delete.write().await = None;
    }
}

async fn record<T>(journal: &Journal, entry: String, result: &PortResult<T>) {
    let entry = if result.is_ok() {
        entry
    } else {
        format!("{} (failed)", entry)
    };
    journal.lock().await.push(entry);
}

// ── Pending registrations ─────────────────────────────────────

struct Entry {
    registration: PendingRegistration,
    claim: Option<(Instant, String)>,
}

pub struct MemoryRegistrationStore {
    rows: RwLock<BTreeMap<String, Entry>>,
    next_token: AtomicU64,
    faults: Faults,
    journal: Journal,
}

impl MemoryRegistrationStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_token: AtomicU64::new(1),
            faults: Faults::default(),
            journal,
        }
    }

    pub async fn seed(&self, registration: PendingRegistration) {
        self.rows.write().await.insert(
            registration.id.clone(),
            Entry {
                registration,
                claim: None,
            },
        );
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.rows.read().await.contains_key(id)
    }

    pub async fn is_claimed(&self, id: &str) -> bool {
        self.rows
            .read()
            .await
            .get(id)
            .map(|entry| entry.claim.is_some())
            .unwrap_or(false)
    }

    /// Simulate an approval already running elsewhere.
    pub async fn mark_claimed(&self, id: &str) {
        let token = self.mint_token();
        if let Some(entry) = self.rows.write().await.get_mut(id) {
            entry.claim = Some((Instant::now(), token));
        }
    }

    pub async fn fail_deletes(&self, message: &str) {
        *self.faults.delete.write().await = Some(message.to_string());
    }

    pub async fn heal(&self) {
        self.faults.heal().await;
    }

    fn mint_token(&self) -> String {
        format!("claim-{}", self.next_token.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn claim(&self, id: &str, ttl: Duration) -> PortResult<ClaimOutcome> {
        let outcome = {
            let mut rows = self.rows.write().await;
            match rows.get_mut(id) {
                None => ClaimOutcome::Missing,
                Some(entry) => {
                    let live = matches!(&entry.claim, Some((at, _)) if at.elapsed() < ttl);
                    if live {
                        ClaimOutcome::Busy
                    } else {
                        let token = self.mint_token();
                        entry.claim = Some((Instant::now(), token.clone()));
                        ClaimOutcome::Claimed(Claim {
                            registration: entry.registration.clone(),
                            token,
                        })
                    }
                }
            }
        };
        let result = Ok(outcome);
        record(&self.journal, format!("claim {}", id), &result).await;
        result
    }

    async fn release(&self, id: &str, token: &str) -> PortResult<()> {
        if let Some(entry) = self.rows.write().await.get_mut(id) {
            if matches!(&entry.claim, Some((_, held)) if held == token) {
                entry.claim = None;
            }
        }
        let result = Ok(());
        record(&self.journal, format!("release {}", id), &result).await;
        result
    }

    async fn delete(&self, id: &str) -> PortResult<bool> {
        let result = match self.faults.on_delete().await {
            Ok(()) => Ok(self.rows.write().await.remove(id).is_some()),
            Err(e) => Err(e),
        };
        record(&self.journal, format!("delete_registration {}", id), &result).await;
        result
    }

    async fn list(&self, limit: i64) -> PortResult<Vec<PendingRegistration>> {
        let rows = self.rows.read().await;
        let mut registrations: Vec<_> = rows
            .values()
            .map(|entry| entry.registration.clone())
            .collect();
        registrations.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        registrations.truncate(limit.max(0) as usize);
        Ok(registrations)
    }
}

// ── Users ─────────────────────────────────────────────────────

pub struct MemoryUserStore {
    rows: RwLock<BTreeMap<String, NewUser>>,
    faults: Faults,
    journal: Journal,
}

impl MemoryUserStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            faults: Faults::default(),
            journal,
        }
    }

    pub async fn get(&self, id: &str) -> Option<NewUser> {
        self.rows.read().await.get(id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn fail_inserts(&self, message: &str) {
        *self.faults.insert.write().await = Some(message.to_string());
    }

    pub async fn fail_deletes(&self, message: &str) {
        *self.faults.delete.write().await = Some(message.to_string());
    }

    pub async fn heal(&self) {
        self.faults.heal().await;
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &NewUser) -> PortResult<()> {
        let result = match self.faults.on_insert().await {
            Ok(()) => {
                let mut rows = self.rows.write().await;
                if rows.contains_key(&user.id) {
                    Err(PortError::Conflict(format!("users.id {} exists", user.id)))
                } else {
                    rows.insert(user.id.clone(), user.clone());
                    Ok(())
                }
            }
            Err(e) => Err(e),
        };
        record(&self.journal, "insert_user".to_string(), &result).await;
        result
    }

    async fn delete(&self, user_id: &str) -> PortResult<()> {
        let result = match self.faults.on_delete().await {
            Ok(()) => {
                self.rows.write().await.remove(user_id);
                Ok(())
            }
            Err(e) => Err(e),
        };
        record(&self.journal, "delete_user".to_string(), &result).await;
        result
    }
}

// ── Profiles ──────────────────────────────────────────────────

pub struct MemoryProfileStore {
    rows: RwLock<BTreeMap<String, UserProfile>>,
    faults: Faults,
    journal: Journal,
}

impl MemoryProfileStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            faults: Faults::default(),
            journal,
        }
    }

    pub async fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.rows.read().await.get(user_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn fail_inserts(&self, message: &str) {
        *self.faults.insert.write().await = Some(message.to_string());
    }

    pub async fn heal(&self) {
        self.faults.heal().await;
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn insert(&self, profile: &UserProfile) -> PortResult<()> {
        let result = match self.faults.on_insert().await {
            Ok(()) => {
                self.rows
                    .write()
                    .await
                    .insert(profile.user_id.clone(), profile.clone());
                Ok(())
            }
            Err(e) => Err(e),
        };
        record(&self.journal, "insert_profile".to_string(), &result).await;
        result
    }

    async fn delete(&self, user_id: &str) -> PortResult<()> {
        let result = match self.faults.on_delete().await {
            Ok(()) => {
                self.rows.write().await.remove(user_id);
                Ok(())
            }
            Err(e) => Err(e),
        };
        record(&self.journal, "delete_profile".to_string(), &result).await;
        result
    }
}

// ── Identity service ──────────────────────────────────────────

pub struct MemoryIdentityProvider {
    identities: RwLock<Vec<Identity>>,
    next_id: AtomicU64,
    latency: RwLock<Option<Duration>>,
    faults: Faults,
    journal: Journal,
}

impl MemoryIdentityProvider {
    pub fn new(journal: Journal) -> Self {
        Self {
            identities: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            latency: RwLock::new(None),
            faults: Faults::default(),
            journal,
        }
    }

    fn mint_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("00000000-0000-4000-8000-{:012}", n)
    }

    pub async fn all(&self) -> Vec<Identity> {
        self.identities.read().await.clone()
    }

    /// Pre-existing identity, as if created by an earlier approval.
    pub async fn register_existing(&self, email: &str) {
        let identity = Identity {
            id: self.mint_id(),
            email: email.to_string(),
            confirmed: true,
        };
        self.identities.write().await.push(identity);
    }

    pub async fn forget(&self, email: &str) {
        self.identities
            .write()
            .await
            .retain(|identity| !identity.email.eq_ignore_ascii_case(email));
    }

    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    pub async fn fail_deletes(&self, message: &str) {
        *self.faults.delete.write().await = Some(message.to_string());
    }

    pub async fn heal(&self) {
        self.faults.heal().await;
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_identity(&self, request: &NewIdentity) -> PortResult<Identity> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let result = {
            let mut identities = self.identities.write().await;
            if identities
                .iter()
                .any(|identity| identity.email.eq_ignore_ascii_case(&request.email))
            {
                Err(PortError::Conflict(
                    "A user with this email address has already been registered".to_string(),
                ))
            } else {
                let identity = Identity {
                    id: self.mint_id(),
                    email: request.email.clone(),
                    confirmed: request.confirmed,
                };
                identities.push(identity.clone());
                Ok(identity)
            }
        };
        record(
            &self.journal,
            format!("create_identity {}", request.email),
            &result,
        )
        .await;
        result
    }

    async fn delete_identity(&self, identity_id: &str) -> PortResult<()> {
        let result = match self.faults.on_delete().await {
            Ok(()) => {
                let mut identities = self.identities.write().await;
                let before = identities.len();
                identities.retain(|identity| identity.id != identity_id);
                if identities.len() == before {
                    Err(PortError::NotFound(identity_id.to_string()))
                } else {
                    Ok(())
                }
            }
            Err(e) => Err(e),
        };
        record(&self.journal, "delete_identity".to_string(), &result).await;
        result
    }
}

// ── Email ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryEmailSender {
    sent: RwLock<Vec<EmailMessage>>,
    blocked: RwLock<BTreeSet<String>>,
}

impl MemoryEmailSender {
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }

    /// Make the provider refuse mail for this recipient.
    pub async fn block(&self, recipient: &str) {
        self.blocked.write().await.insert(recipient.to_string());
    }
}

#[async_trait]
impl EmailSender for MemoryEmailSender {
    async fn send_email(&self, message: &EmailMessage) -> PortResult<EmailReceipt> {
        if self.blocked.read().await.contains(&message.to) {
            return Err(PortError::Rejected(format!(
                "recipient {} is suppressed",
                message.to
            )));
        }
        let mut sent = self.sent.write().await;
        sent.push(message.clone());
        Ok(EmailReceipt {
            success: true,
            provider_response: serde_json::json!({ "id": format!("memory-{}", sent.len()) }),
        })
    }
}

// ── Wiring ────────────────────────────────────────────────────

/// A full set of in-memory ports sharing one journal.
pub struct MemoryBackend {
    pub registrations: Arc<MemoryRegistrationStore>,
    pub users: Arc<MemoryUserStore>,
    pub profiles: Arc<MemoryProfileStore>,
    pub identities: Arc<MemoryIdentityProvider>,
    pub mailer: Arc<MemoryEmailSender>,
    journal: Journal,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        Self {
            registrations: Arc::new(MemoryRegistrationStore::new(Arc::clone(&journal))),
            users: Arc::new(MemoryUserStore::new(Arc::clone(&journal))),
            profiles: Arc::new(MemoryProfileStore::new(Arc::clone(&journal))),
            identities: Arc::new(MemoryIdentityProvider::new(Arc::clone(&journal))),
            mailer: Arc::new(MemoryEmailSender::default()),
            journal,
        }
    }

    /// Service wired to these ports, without a mailer.
    pub fn service(&self) -> AdminService {
        AdminService::new(
            self.registrations.clone(),
            self.users.clone(),
            self.profiles.clone(),
            self.identities.clone(),
        )
    }

    pub async fn journal(&self) -> Vec<String> {
        self.journal.lock().await.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
