//! Account lookup.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use smol_str::SmolStr;

/// A user the gate can authenticate.
///
/// `secret` is the cleartext password; the gate feeds it into HA1 and never
/// logs or echoes it.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub username: SmolStr,
    pub secret: SmolStr,
    pub roles: BTreeSet<SmolStr>,
}

impl Account {
    pub fn new(username: impl Into<SmolStr>, secret: impl Into<SmolStr>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<SmolStr>) -> Self {
        self.roles.insert(role.into());
        self
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// Identity of an authenticated request. Carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: SmolStr,
    pub roles: BTreeSet<SmolStr>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl From<&Account> for Principal {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            roles: account.roles.clone(),
        }
    }
}

/// Synchronous account source. Must be safe to call from many threads.
pub trait AccountStore: Send + Sync {
    fn find_account(&self, username: &str) -> Option<Account>;
}

impl<F> AccountStore for F
where
    F: Fn(&str) -> Option<Account> + Send + Sync,
{
    fn find_account(&self, username: &str) -> Option<Account> {
        self(username)
    }
}

/// Account source backed by I/O (database, directory service).
#[async_trait]
pub trait AsyncAccountStore: Send + Sync {
    async fn find_account(&self, username: &str) -> Option<Account>;
}

/// Fixed set of accounts held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    accounts: HashMap<SmolStr, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, account: Account) -> Self {
        self.add(account);
        self
    }

    /// Inserts or replaces by username.
    pub fn add(&mut self, account: Account) {
        self.accounts.insert(account.username.clone(), account);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Exact, case-sensitive username match.
    pub fn find_account(&self, username: &str) -> Option<Account> {
        self.accounts.get(username).cloned()
    }
}

impl FromIterator<Account> for MemoryAccountStore {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        let mut store = Self::new();
        for account in iter {
            store.add(account);
        }
        store
    }
}

impl AccountStore for MemoryAccountStore {
    fn find_account(&self, username: &str) -> Option<Account> {
        MemoryAccountStore::find_account(self, username)
    }
}

#[async_trait]
impl AsyncAccountStore for MemoryAccountStore {
    async fn find_account(&self, username: &str) -> Option<Account> {
        MemoryAccountStore::find_account(self, username)
    }
}
