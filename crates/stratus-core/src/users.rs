//! User catalog operations.
//!
//! User records live in the global users index; access keys and emails get
//! their own lookup indices pointing back at the user ID. Storing a user
//! is guarded by an optimistic version check: the caller writes back the
//! version it read, and a mismatch means somebody else won the race.

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, warn};

use crate::catalog::{self, ACCESS_KEYS_IDX, EMAILS_IDX, USERS_IDX};
use crate::error::{CoreError, CoreResult};
use crate::records::{AccessKeyRecord, UserInfo, UserRecord};
use crate::store::Store;

impl Store {
    /// Create a user. Fails with `AlreadyExists` when the ID is taken.
    pub async fn create_user(&self, info: UserInfo) -> CoreResult<UserRecord> {
        let mut record = UserRecord {
            info,
            version: 0,
            version_tag: String::new(),
            attrs: Default::default(),
        };
        self.store_user(&mut record, true).await?;
        Ok(record)
    }

    /// Load a user record by ID, through the user cache.
    pub async fn load_user(&self, user_id: &str) -> CoreResult<UserRecord> {
        if let Some(raw) = self.user_cache().get(user_id) {
            return UserRecord::from_bytes(&raw);
        }
        let raw = match self.index().get(USERS_IDX, user_id.as_bytes()).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                return Err(CoreError::NoSuchUser {
                    user_id: user_id.to_owned(),
                })
            }
            Err(e) => return Err(e),
        };
        self.user_cache().put(user_id, raw.clone());
        UserRecord::from_bytes(&raw)
    }

    /// Persist a user record.
    ///
    /// With `exclusive`, an existing record fails with `AlreadyExists`.
    /// Otherwise the record's version must match the stored one
    /// ([`CoreError::VersionConflict`] when it does not); the version is
    /// bumped on success. Access-key and email lookup entries are
    /// reconciled with the record's current key set.
    pub async fn store_user(&self, record: &mut UserRecord, exclusive: bool) -> CoreResult<()> {
        let user_id = record.info.user_id.clone();
        if user_id.is_empty() {
            return Err(CoreError::invalid("user id must not be empty"));
        }

        let existing = match self.index().get(USERS_IDX, user_id.as_bytes()).await {
            Ok(raw) => Some(UserRecord::from_bytes(&raw)?),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        match &existing {
            Some(orig) => {
                if exclusive {
                    return Err(CoreError::AlreadyExists {
                        entity: format!("user {user_id}"),
                    });
                }
                if orig.version != record.version {
                    warn!(user = %user_id, "user read-version mismatch");
                    return Err(CoreError::VersionConflict);
                }
                record.version += 1;
            }
            None => {
                record.version = 1;
                if record.version_tag.is_empty() {
                    record.version_tag = format!("user.{}", Utc::now().timestamp_millis());
                }
            }
        }

        let raw = record.to_bytes();
        self.index()
            .put(USERS_IDX, user_id.as_bytes(), raw.clone(), true)
            .await?;
        self.user_cache().put(&user_id, raw);

        // Per-user indices exist from the first store onward.
        self.index().ensure(&catalog::user_info_index(&user_id)).await?;
        self.index().ensure(&catalog::user_stats_index(&user_id)).await?;

        // Reconcile credential lookups with the record's key set.
        for key in &record.info.access_keys {
            let val = AccessKeyRecord {
                user_id: user_id.clone(),
                secret: key.secret.clone(),
            };
            self.index()
                .put(ACCESS_KEYS_IDX, key.id.as_bytes(), val.to_bytes(), true)
                .await?;
        }
        if let Some(orig) = &existing {
            for old in &orig.info.access_keys {
                if !record.info.access_keys.iter().any(|k| k.id == old.id) {
                    debug!(user = %user_id, key = %old.id, "dropping stale access key");
                    self.del_tolerant(ACCESS_KEYS_IDX, old.id.as_bytes()).await?;
                }
            }
            if !orig.info.email.is_empty() && orig.info.email != record.info.email {
                self.del_tolerant(EMAILS_IDX, orig.info.email.as_bytes()).await?;
            }
        }
        if !record.info.email.is_empty() {
            self.index()
                .put(
                    EMAILS_IDX,
                    record.info.email.as_bytes(),
                    Bytes::from(user_id.clone()),
                    true,
                )
                .await?;
        }

        debug!(user = %user_id, version = record.version, "stored user");
        Ok(())
    }

    /// Look a user up by access key.
    pub async fn user_by_access_key(&self, access_key: &str) -> CoreResult<UserRecord> {
        let raw = match self.index().get(ACCESS_KEYS_IDX, access_key.as_bytes()).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                return Err(CoreError::NoSuchUser {
                    user_id: format!("access-key {access_key}"),
                })
            }
            Err(e) => return Err(e),
        };
        let record = AccessKeyRecord::from_bytes(&raw)?;
        self.load_user(&record.user_id).await
    }

    /// Look a user up by email.
    pub async fn user_by_email(&self, email: &str) -> CoreResult<UserRecord> {
        let raw = match self.index().get(EMAILS_IDX, email.as_bytes()).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                return Err(CoreError::NoSuchUser {
                    user_id: format!("email {email}"),
                })
            }
            Err(e) => return Err(e),
        };
        let user_id = String::from_utf8(raw.to_vec())
            .map_err(|_| CoreError::decode("email mapping is not UTF-8"))?;
        self.load_user(&user_id).await
    }

    /// Remove a user and every mapping hanging off it: access keys, email,
    /// the per-user bucket list and stats indices, and the user record.
    pub async fn remove_user(&self, record: &UserRecord) -> CoreResult<()> {
        let user_id = &record.info.user_id;

        for key in &record.info.access_keys {
            self.del_tolerant(ACCESS_KEYS_IDX, key.id.as_bytes()).await?;
        }
        if !record.info.email.is_empty() {
            self.del_tolerant(EMAILS_IDX, record.info.email.as_bytes()).await?;
        }
        for index in [
            catalog::user_info_index(user_id),
            catalog::user_stats_index(user_id),
        ] {
            match self.index().delete(&index).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        match self.index().del(USERS_IDX, user_id.as_bytes()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return Err(CoreError::NoSuchUser {
                    user_id: user_id.clone(),
                })
            }
            Err(e) => return Err(e),
        }
        self.user_cache().invalidate_remove(user_id);
        debug!(user = %user_id, "removed user");
        Ok(())
    }

    /// Delete an index entry, tolerating its absence.
    pub(crate) async fn del_tolerant(&self, index: &str, key: &[u8]) -> CoreResult<()> {
        match self.index().del(index, key).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
