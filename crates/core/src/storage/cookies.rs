use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// A document cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|at| at <= now).unwrap_or(false)
    }
}

/// Cookies visible to the current document
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<BTreeMap<String, Cookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a session cookie on path `/`
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let cookie = Cookie {
            name: name.clone(),
            value: value.into(),
            path: "/".to_string(),
            expires: None,
        };
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, cookie);
    }

    /// Value of a live cookie
    pub fn get(&self, name: &str) -> Option<String> {
        let now = Utc::now();
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .filter(|c| !c.is_expired(now))
            .map(|c| c.value.clone())
    }

    /// Names of live cookies
    pub fn names(&self) -> Vec<String> {
        let now = Utc::now();
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| !c.is_expired(now))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Overwrite every cookie with an empty value expiring now on path `/`,
    /// then drop the expired entries. Returns how many were expired.
    pub fn expire_all(&self) -> usize {
        let now = Utc::now();
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);

        let mut expired = 0;
        for cookie in cookies.values_mut() {
            if !cookie.is_expired(now) {
                expired += 1;
            }
            cookie.value.clear();
            cookie.path = "/".to_string();
            cookie.expires = Some(now);
        }
        cookies.retain(|_, c| !c.is_expired(now));

        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_all() {
        let jar = CookieJar::new();
        jar.set("session", "s-1");
        jar.set("csrf", "c-1");
        assert_eq!(jar.get("session"), Some("s-1".to_string()));

        assert_eq!(jar.expire_all(), 2);
        assert!(jar.names().is_empty());
        assert_eq!(jar.get("session"), None);
        assert_eq!(jar.expire_all(), 0);
    }
}
