//! Patron directory contract and an in-process implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::PatronEligibility,
    repository::CirculationStore,
};

use super::clock::Clock;

/// Read-only view of patron data owned elsewhere
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatronDirectory: Send + Sync {
    async fn get_eligibility(&self, patron_id: Uuid) -> AppResult<PatronEligibility>;

    /// Address used by the e-mail notifier
    async fn contact_email(&self, patron_id: Uuid) -> AppResult<Option<String>>;
}

#[derive(Debug, Clone, Default)]
struct PatronProfile {
    max_concurrent_loans: Option<u32>,
    email: Option<String>,
}

/// Directory deriving loan counts from a circulation store, with per-patron
/// limits and contact data registered in memory
pub struct MemoryPatronDirectory {
    store: Arc<dyn CirculationStore>,
    clock: Arc<dyn Clock>,
    default_max_loans: u32,
    profiles: RwLock<HashMap<Uuid, PatronProfile>>,
}

impl MemoryPatronDirectory {
    pub fn new(store: Arc<dyn CirculationStore>, clock: Arc<dyn Clock>, default_max_loans: u32) -> Self {
        Self {
            store,
            clock,
            default_max_loans,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_max_loans(&self, patron_id: Uuid, max_concurrent_loans: u32) {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        profiles.entry(patron_id).or_default().max_concurrent_loans = Some(max_concurrent_loans);
    }

    pub fn set_email(&self, patron_id: Uuid, email: impl Into<String>) {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        profiles.entry(patron_id).or_default().email = Some(email.into());
    }

    fn profile(&self, patron_id: Uuid) -> PatronProfile {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&patron_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PatronDirectory for MemoryPatronDirectory {
    async fn get_eligibility(&self, patron_id: Uuid) -> AppResult<PatronEligibility> {
        let now = self.clock.now();
        let records = self.store.records_by_patron(patron_id).await?;
        let open: Vec<_> = records.iter().filter(|r| r.is_open()).collect();

        Ok(PatronEligibility {
            active_loan_count: u32::try_from(open.len()).unwrap_or(u32::MAX),
            has_overdue_loan: open.iter().any(|r| r.is_overdue(now)),
            max_concurrent_loans: self
                .profile(patron_id)
                .max_concurrent_loans
                .unwrap_or(self.default_max_loans),
        })
    }

    async fn contact_email(&self, patron_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.profile(patron_id).email)
    }
}
