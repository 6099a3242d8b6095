//! Session store.
//!
//! The single authority for which bearer token the client holds and who it
//! represents. `set`, `clear` and `update_user` are the only mutators, and
//! each runs as one critical section: readers never see a token without its
//! matching snapshot or the other way round.
//!
//! Everything here is synchronous. Callers run it between awaits, never
//! across one, so a read-decide-write sequence such as "decode, find it
//! expired, clear" cannot interleave with another writer.

use crate::claims::{self, Claims};
use crate::constants::storage_keys;
use crate::error::{AuthError, Result};
use crate::providers::{KeyValueStorage, StorageWrite};
use crate::state::{AuthUser, Session};
use bookclub_core::environment::Clock;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// In-memory mirror of what storage holds.
#[derive(Debug, Default)]
struct Cached {
    session: Option<Session>,
    user: Option<AuthUser>,
}

/// Holds the session and its user snapshot, mirrored to durable storage.
///
/// Construct one per client and share it (`Arc`) with everything that
/// needs to know who is signed in.
///
/// # Example
///
/// ```
/// use bookclub_auth::session::SessionStore;
/// use bookclub_auth::stores::MemoryStorage;
/// use bookclub_core::environment::SystemClock;
/// use std::sync::Arc;
///
/// let store = SessionStore::open(MemoryStorage::new(), Arc::new(SystemClock));
/// assert!(store.get().is_none());
/// assert!(store.current_user().is_none());
/// ```
pub struct SessionStore<S: KeyValueStorage> {
    storage: S,
    clock: Arc<dyn Clock>,
    cache: RwLock<Cached>,
}

impl<S: KeyValueStorage> SessionStore<S> {
    /// Load whatever a previous run left in `storage`.
    ///
    /// Unreadable entries are treated as absent.
    pub fn open(storage: S, clock: Arc<dyn Clock>) -> Self {
        let read = |key: &str| {
            storage.get(key).unwrap_or_else(|e| {
                tracing::warn!(key, error = %e, "Failed to read session storage");
                None
            })
        };

        let session = read(storage_keys::AUTH_TOKEN).map(|token| {
            Session::new(token).with_refresh_token(read(storage_keys::REFRESH_TOKEN))
        });

        let user = session
            .as_ref()
            .and(read(storage_keys::AUTH_USER))
            .and_then(|json| match serde_json::from_str::<AuthUser>(&json) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable user snapshot");
                    None
                },
            });

        tracing::debug!(
            has_session = session.is_some(),
            has_snapshot = user.is_some(),
            "Opened session store"
        );

        Self {
            storage,
            clock,
            cache: RwLock::new(Cached { session, user }),
        }
    }

    /// The current session, if any. Never fails.
    #[must_use]
    pub fn get(&self) -> Option<Session> {
        self.read().session.clone()
    }

    /// The raw bearer token, expired or not.
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        self.read().session.as_ref().map(|s| s.bearer_token.clone())
    }

    /// The bearer token, only while it still names a signed-in user.
    ///
    /// Goes through [`current_user`](Self::current_user), so an expired or
    /// malformed token clears the store and reads as absent.
    #[must_use]
    pub fn active_bearer_token(&self) -> Option<String> {
        self.current_user()?;
        self.bearer_token()
    }

    /// Store a new session.
    ///
    /// A cached user snapshot survives only if it belongs to the identity
    /// the new token names; it then takes the token's subject as username.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the session could not be
    /// persisted. The in-memory state is left unchanged in that case.
    pub fn set(&self, session: Session) -> Result<()> {
        let mut cache = self.write();

        let user = match claims::decode(&session.bearer_token) {
            Ok(claims) => cache
                .user
                .as_ref()
                .filter(|user| user.matches(&claims))
                .map(|user| {
                    let mut user = user.clone();
                    user.merge_claims(&claims);
                    user
                }),
            Err(_) => None,
        };

        if let Err(e) = self.persist(&session, user.as_ref()) {
            tracing::error!(error = %e, "Failed to persist session");
            return Err(e);
        }

        cache.session = Some(session);
        cache.user = user;
        drop(cache);

        metrics::counter!("auth.session.set").increment(1);
        tracing::info!("Session stored");
        Ok(())
    }

    /// Store a session and resolve who it belongs to.
    ///
    /// A token that cannot be decoded, or that is already expired, is not
    /// left behind half-authenticated: the store is cleared again.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Claims`] if the token is malformed
    /// - [`AuthError::SessionExpired`] if it has already expired
    /// - [`AuthError::Storage`] if it could not be persisted
    pub fn establish(&self, session: Session) -> Result<AuthUser> {
        self.establish_claims(session)?;
        self.current_user().ok_or(AuthError::NotAuthenticated)
    }

    /// Like [`establish`](Self::establish), adopting `user` (from a server
    /// response) as the snapshot. Token claims win for id, username and
    /// role.
    ///
    /// # Errors
    ///
    /// See [`establish`](Self::establish).
    pub fn establish_with_user(&self, session: Session, mut user: AuthUser) -> Result<AuthUser> {
        let claims = self.establish_claims(session)?;
        user.merge_claims(&claims);
        self.update_user(user.clone())?;
        Ok(user)
    }

    fn establish_claims(&self, session: Session) -> Result<Claims> {
        let decoded = claims::decode(&session.bearer_token);
        self.set(session)?;

        match decoded {
            Ok(claims) if !claims.is_expired(self.clock.now()) => Ok(claims),
            Ok(_) => {
                tracing::warn!("Received an already expired token");
                self.clear();
                Err(AuthError::SessionExpired)
            },
            Err(e) => {
                tracing::warn!(error = %e, "Received an undecodable token");
                self.clear();
                Err(e.into())
            },
        }
    }

    /// Remove the session and everything derived from it. Idempotent.
    ///
    /// Storage failures are logged, not returned: the in-memory state is
    /// cleared regardless, and absence is what callers care about.
    pub fn clear(&self) {
        let mut cache = self.write();
        self.clear_locked(&mut cache);
    }

    /// The signed-in user, or `None` if nobody is.
    ///
    /// Decodes the token on every call. An undecodable or expired token
    /// clears the store. A cached snapshot of the same identity is preferred
    /// over a user synthesized from the claims.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        let mut cache = self.write();
        let token = cache.session.as_ref()?.bearer_token.clone();

        let claims = match claims::decode(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Stored token is malformed, clearing session");
                self.clear_locked(&mut cache);
                return None;
            },
        };

        if claims.is_expired(self.clock.now()) {
            tracing::debug!(
                expired_at = claims.expiry_epoch_seconds,
                "Stored token expired, clearing session"
            );
            self.clear_locked(&mut cache);
            return None;
        }

        let user = match cache.user.take() {
            Some(mut user) if user.matches(&claims) => {
                user.merge_claims(&claims);
                user
            },
            _ => AuthUser::from_claims(&claims),
        };

        cache.user = Some(user.clone());
        Some(user)
    }

    /// Replace the user snapshot (after profile changes or linking). The
    /// token is not touched.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] if there is no session
    /// - [`AuthError::Storage`] if the snapshot could not be persisted
    pub fn update_user(&self, user: AuthUser) -> Result<()> {
        let mut cache = self.write();
        if cache.session.is_none() {
            return Err(AuthError::NotAuthenticated);
        }

        self.storage
            .set(storage_keys::AUTH_USER, &encode_user(&user)?)?;
        cache.user = Some(user);
        Ok(())
    }

    /// Token, refresh token and snapshot go to storage as one batch.
    fn persist(&self, session: &Session, user: Option<&AuthUser>) -> Result<()> {
        let user = user.map(encode_user).transpose()?;

        let writes = [
            StorageWrite::Set(storage_keys::AUTH_TOKEN, &session.bearer_token),
            match &session.refresh_token {
                Some(refresh) => StorageWrite::Set(storage_keys::REFRESH_TOKEN, refresh),
                None => StorageWrite::Remove(storage_keys::REFRESH_TOKEN),
            },
            match &user {
                Some(json) => StorageWrite::Set(storage_keys::AUTH_USER, json),
                None => StorageWrite::Remove(storage_keys::AUTH_USER),
            },
        ];
        self.storage.apply(&writes)
    }

    fn clear_locked(&self, cache: &mut Cached) {
        let had_session = cache.session.is_some();
        *cache = Cached::default();

        let writes = storage_keys::ALL.map(StorageWrite::Remove);
        if let Err(e) = self.storage.apply(&writes) {
            tracing::warn!(error = %e, "Failed to remove session entries");
        }

        if had_session {
            metrics::counter!("auth.session.cleared").increment(1);
            tracing::info!("Session cleared");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Cached> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Cached> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: KeyValueStorage> std::fmt::Debug for SessionStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.read();
        f.debug_struct("SessionStore")
            .field("session", &cache.session)
            .field("user", &cache.user.as_ref().map(|u| &u.username))
            .finish_non_exhaustive()
    }
}

fn encode_user(user: &AuthUser) -> Result<String> {
    serde_json::to_string(user)
        .map_err(|e| AuthError::Storage(format!("Failed to encode user snapshot: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::mint_token;
    use crate::state::{ProviderName, UserId};
    use crate::stores::MemoryStorage;
    use bookclub_testing::{FixedClock, epoch};

    const HOUR: i64 = 3600;

    fn store_at(storage: Arc<MemoryStorage>) -> SessionStore<Arc<MemoryStorage>> {
        SessionStore::open(storage, Arc::new(FixedClock::new(epoch())))
    }

    fn valid(sub: &str, id: Option<i64>) -> String {
        mint_token(sub, id, Some("USER"), epoch().timestamp() + HOUR)
    }

    #[test]
    fn set_then_get() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_at(Arc::clone(&storage));
        let token = valid("ana", Some(1));

        store
            .set(Session::new(&token).with_refresh_token(Some("r1".into())))
            .unwrap();

        let session = store.get().unwrap();
        assert_eq!(session.bearer_token, token);
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(
            storage.get(storage_keys::AUTH_TOKEN).unwrap(),
            Some(token)
        );
    }

    #[test]
    fn current_user_is_synthesized_from_claims() {
        let store = store_at(Arc::new(MemoryStorage::new()));
        store.set(Session::new(valid("ana", Some(4)))).unwrap();

        let user = store.current_user().unwrap();
        assert_eq!(user.username, "ana");
        assert_eq!(user.id, Some(UserId(4)));
        assert!(!user.is_admin());
    }

    #[test]
    fn expired_session_self_clears() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_at(Arc::clone(&storage));
        let expired = mint_token("ana", Some(1), None, epoch().timestamp() - 1);
        store.set(Session::new(expired)).unwrap();

        assert!(store.current_user().is_none());
        assert!(store.get().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn malformed_session_self_clears() {
        let store = store_at(Arc::new(MemoryStorage::new()));
        store.set(Session::new("garbage")).unwrap();

        assert!(store.current_user().is_none());
        assert!(store.get().is_none());
    }

    #[test]
    fn establish_rejects_and_clears_bad_tokens() {
        let store = store_at(Arc::new(MemoryStorage::new()));

        let err = store.establish(Session::new("a.b")).unwrap_err();
        assert!(matches!(err, AuthError::Claims(_)));
        assert!(store.get().is_none());

        let expired = mint_token("ana", None, None, epoch().timestamp());
        assert_eq!(
            store.establish(Session::new(expired)).unwrap_err(),
            AuthError::SessionExpired
        );
        assert!(store.get().is_none());
    }

    #[test]
    fn warm_reload_restores_the_snapshot() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_at(Arc::clone(&storage));
        let mut user = store.establish(Session::new(valid("ana", Some(1)))).unwrap();
        user.avatar_ref = Some("ana.png".into());
        user.oauth_providers.insert(ProviderName::Google);
        store.update_user(user).unwrap();
        drop(store);

        let reloaded = store_at(storage);
        let user = reloaded.current_user().unwrap();
        assert_eq!(user.avatar_ref.as_deref(), Some("ana.png"));
        assert!(user.has_provider(ProviderName::Google));
    }

    #[test]
    fn snapshot_of_another_identity_is_dropped_on_set() {
        let store = store_at(Arc::new(MemoryStorage::new()));
        let mut ana = store.establish(Session::new(valid("ana", Some(1)))).unwrap();
        ana.avatar_ref = Some("ana.png".into());
        store.update_user(ana).unwrap();

        store.set(Session::new(valid("bob", Some(2)))).unwrap();
        let user = store.current_user().unwrap();
        assert_eq!(user.username, "bob");
        assert!(user.avatar_ref.is_none());
    }

    #[test]
    fn reissued_token_keeps_the_snapshot_and_adopts_the_new_username() {
        let store = store_at(Arc::new(MemoryStorage::new()));
        let mut ana = store.establish(Session::new(valid("ana", Some(1)))).unwrap();
        ana.avatar_ref = Some("ana.png".into());
        store.update_user(ana).unwrap();

        store.set(Session::new(valid("ana_reads", Some(1)))).unwrap();
        let user = store.current_user().unwrap();
        assert_eq!(user.username, "ana_reads");
        assert_eq!(user.avatar_ref.as_deref(), Some("ana.png"));
    }

    #[test]
    fn clear_is_idempotent_and_removes_everything() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_at(Arc::clone(&storage));
        store
            .establish(Session::new(valid("ana", None)).with_refresh_token(Some("r".into())))
            .unwrap();
        store.update_user(store.current_user().unwrap()).unwrap();

        store.clear();
        store.clear();

        assert!(store.get().is_none());
        assert!(store.current_user().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn update_user_requires_a_session() {
        let store = store_at(Arc::new(MemoryStorage::new()));
        let user = AuthUser::from_claims(&claims::decode(&valid("ana", None)).unwrap());
        assert_eq!(store.update_user(user), Err(AuthError::NotAuthenticated));
    }

    #[test]
    fn active_bearer_token_clears_an_expired_session() {
        let storage = Arc::new(MemoryStorage::new());
        let store = store_at(Arc::clone(&storage));
        let expired = mint_token("ana", Some(1), None, epoch().timestamp() - 1);
        store.set(Session::new(&expired)).unwrap();

        assert_eq!(store.bearer_token(), Some(expired));
        assert!(store.active_bearer_token().is_none());
        assert!(store.get().is_none());
        assert!(storage.is_empty());

        let token = valid("ana", Some(1));
        store.set(Session::new(&token)).unwrap();
        assert_eq!(store.active_bearer_token(), Some(token));
    }

    #[test]
    fn admin_role_survives_prefix() {
        let store = store_at(Arc::new(MemoryStorage::new()));
        let token = mint_token("root", Some(1), Some("ROLE_ADMIN"), epoch().timestamp() + HOUR);
        assert!(store.establish(Session::new(token)).unwrap().is_admin());
    }
}
