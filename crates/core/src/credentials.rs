use crate::error::ShellResult;
use crate::storage::{CookieJar, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Role exempt from permission filtering
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Key of the JSON user object written by older shell revisions
pub const LEGACY_USER_KEY: &str = "user";

/// A persisted credential field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialField {
    Token,
    TenantId,
    UserId,
    Name,
    Role,
    Permissions,
}

impl CredentialField {
    pub const ALL: [CredentialField; 6] = [
        CredentialField::Token,
        CredentialField::TenantId,
        CredentialField::UserId,
        CredentialField::Name,
        CredentialField::Role,
        CredentialField::Permissions,
    ];

    /// Storage key, also the URL query parameter name
    pub fn key(self) -> &'static str {
        match self {
            CredentialField::Token => "token",
            CredentialField::TenantId => "tenantId",
            CredentialField::UserId => "userId",
            CredentialField::Name => "name",
            CredentialField::Role => "role",
            CredentialField::Permissions => "permissions",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }
}

impl std::fmt::Display for CredentialField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Session identity of the current browsing context.
///
/// A present `token` is what makes a context authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl CredentialRecord {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_super_admin(&self) -> bool {
        self.role.as_deref() == Some(SUPER_ADMIN_ROLE)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_super_admin() || self.permissions.contains(permission)
    }

    /// Value of a single field as it is persisted
    pub fn field(&self, field: CredentialField) -> Option<String> {
        match field {
            CredentialField::Token => self.token.clone(),
            CredentialField::TenantId => self.tenant_id.clone(),
            CredentialField::UserId => self.user_id.clone(),
            CredentialField::Name => self.name.clone(),
            CredentialField::Role => self.role.clone(),
            CredentialField::Permissions => {
                if self.permissions.is_empty() {
                    None
                } else {
                    Some(encode_permissions(&self.permissions))
                }
            }
        }
    }

    /// Name shown in the header, `Demo` when unknown
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Demo")
    }

    /// Avatar letter for the header
    pub fn avatar_initial(&self) -> char {
        self.display_name()
            .trim()
            .chars()
            .next()
            .map(|c| c.to_uppercase().next().unwrap_or(c))
            .unwrap_or('D')
    }

    /// Computed user view; never persisted on its own
    pub fn user(&self) -> Option<SessionUser> {
        if self.user_id.is_none() && self.name.is_none() {
            return None;
        }

        Some(SessionUser {
            id: self.user_id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            tenant_id: self.tenant_id.clone(),
            permissions: self.permissions.clone(),
        })
    }

    /// Decompose a user object as returned by the auth server (or written by
    /// older revisions under `user`). Unknown shapes yield an empty record.
    pub fn from_user_object(user: &Value) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| user.get(*k))
                .find_map(value_as_text)
        };

        let role = user.get("role").and_then(|r| match r {
            Value::Object(_) => r.get("name").and_then(value_as_text),
            other => value_as_text(other),
        });

        let permissions = user
            .get("permissions")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(value_as_text).collect())
            .unwrap_or_default();

        Self {
            token: None,
            tenant_id: text(&["tenantId", "tenant_id"]),
            user_id: text(&["id", "userId", "_id"]),
            name: text(&["name", "fullName"]),
            role,
            permissions,
        }
    }
}

/// Read-only user projection of a [`CredentialRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub tenant_id: Option<String>,
    pub permissions: BTreeSet<String>,
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Canonical permission encoding: a JSON array of strings
pub fn encode_permissions(permissions: &BTreeSet<String>) -> String {
    serde_json::to_string(permissions).unwrap_or_else(|_| "[]".to_string())
}

/// Parse the canonical permission encoding. Anything but a JSON array of
/// strings is malformed.
pub fn decode_permissions(raw: &str) -> Option<BTreeSet<String>> {
    serde_json::from_str::<Vec<String>>(raw)
        .ok()
        .map(|items| items.into_iter().filter(|p| !p.is_empty()).collect())
}

/// Credential persistence for one browsing context.
///
/// The origin's local store is the only place credentials are written. The
/// session store and cookies are only ever read during migration and wiped on
/// [`CredentialStore::clear`].
#[derive(Clone)]
pub struct CredentialStore {
    local: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    cookies: Arc<CookieJar>,
}

impl CredentialStore {
    pub fn new(
        local: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        cookies: Arc<CookieJar>,
    ) -> Self {
        Self {
            local,
            session,
            cookies,
        }
    }

    pub fn get(&self, field: CredentialField) -> ShellResult<Option<String>> {
        self.local.get(field.key())
    }

    pub fn set(&self, field: CredentialField, value: &str) -> ShellResult<()> {
        self.local.set(field.key(), value)?;
        Ok(())
    }

    pub fn set_permissions(&self, permissions: &BTreeSet<String>) -> ShellResult<()> {
        self.set(CredentialField::Permissions, &encode_permissions(permissions))
    }

    /// Stored permissions; a malformed entry reads as empty
    pub fn permissions(&self) -> ShellResult<BTreeSet<String>> {
        let Some(raw) = self.get(CredentialField::Permissions)? else {
            return Ok(BTreeSet::new());
        };

        Ok(decode_permissions(&raw).unwrap_or_else(|| {
            warn!("Stored permissions are not a JSON array, ignoring");
            BTreeSet::new()
        }))
    }

    /// Current full record
    pub fn record(&self) -> ShellResult<CredentialRecord> {
        Ok(CredentialRecord {
            token: self.get(CredentialField::Token)?,
            tenant_id: self.get(CredentialField::TenantId)?,
            user_id: self.get(CredentialField::UserId)?,
            name: self.get(CredentialField::Name)?,
            role: self.get(CredentialField::Role)?,
            permissions: self.permissions()?,
        })
    }

    /// Write every present field of `record`, overwriting stored values
    pub fn store(&self, record: &CredentialRecord) -> ShellResult<()> {
        for field in CredentialField::ALL {
            if let Some(value) = record.field(field) {
                self.set(field, &value)?;
            }
        }
        Ok(())
    }

    /// Make the stored credentials exactly `record`: present fields are
    /// written, absent ones removed
    pub fn replace(&self, record: &CredentialRecord) -> ShellResult<()> {
        for field in CredentialField::ALL {
            match record.field(field) {
                Some(value) => self.set(field, &value)?,
                None => {
                    self.local.remove(field.key())?;
                }
            }
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> ShellResult<bool> {
        Ok(self.get(CredentialField::Token)?.is_some())
    }

    /// Erase everything: every key of the origin store, the session store and
    /// all cookies. Each layer is attempted even if an earlier one fails.
    pub fn clear(&self) -> ShellResult<()> {
        let local = self.local.clear();
        let session = self.session.clear();
        let expired_cookies = self.cookies.expire_all();

        info!(expired_cookies, "Cleared credential store");

        local?;
        session?;
        Ok(())
    }

    /// Move credentials written by older revisions (session-store duplicates
    /// and the JSON `user` object) into the local store. Values already in the
    /// local store win. Returns the number of fields migrated.
    pub fn migrate_legacy(&self) -> ShellResult<usize> {
        let mut migrated = 0;

        for field in CredentialField::ALL {
            if let Some(value) = self.session.remove(field.key())? {
                if self.get(field)?.is_none() {
                    self.set(field, &value)?;
                    migrated += 1;
                }
            }
        }

        for store in [&self.local, &self.session] {
            let Some(raw) = store.remove(LEGACY_USER_KEY)? else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(user) => {
                    migrated += self.fill_absent(&CredentialRecord::from_user_object(&user))?;
                }
                Err(e) => warn!(error = %e, "Dropping unreadable legacy user object"),
            }
        }

        if migrated > 0 {
            debug!(migrated, "Migrated legacy credential fields");
        }

        Ok(migrated)
    }

    fn fill_absent(&self, record: &CredentialRecord) -> ShellResult<usize> {
        let mut filled = 0;
        for field in CredentialField::ALL {
            if let Some(value) = record.field(field) {
                if self.get(field)?.is_none() {
                    self.set(field, &value)?;
                    filled += 1;
                }
            }
        }
        Ok(filled)
    }
}
