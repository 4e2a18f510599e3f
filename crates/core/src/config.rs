//! Shell configuration.
//!
//! One TOML document describes the environment, the auth endpoints, the
//! service directory, the navigation table and the menu tree. A built-in
//! default ships with the crate and is used when no file is present.

use crate::clearer::DEFAULT_CLEAR_TIMEOUT;
use crate::error::{ShellError, ShellResult};
use crate::menu::{MenuEntry, MenuNode};
use crate::navigation::{table_problems, Environment, NavigationTable, NavigationTarget, Navigator, SignIn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

const BUILTIN_CONFIG: &str = include_str!("default_shell.toml");

/// A URL that differs between development and production
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvUrls {
    pub dev: Url,
    pub prod: Url,
}

impl EnvUrls {
    pub fn select(&self, environment: Environment) -> &Url {
        match environment {
            Environment::Development => &self.dev,
            Environment::Production => &self.prod,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Domain under which tenants get their own subdomain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_domain: Option<String>,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_logout_path")]
    pub logout_path: String,

    /// Sign-in page
    pub sign_in: EnvUrls,

    /// Landing page after a successful login
    pub login_redirect: EnvUrls,

    /// Base of the backend API
    pub api_base: EnvUrls,
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_logout_path() -> String {
    "/auth/logout".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearConfig {
    /// Per-origin bound on the cross-origin clear
    #[serde(default = "default_clear_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_clear_timeout_ms() -> u64 {
    DEFAULT_CLEAR_TIMEOUT.as_millis() as u64
}

impl Default for ClearConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_clear_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub environment: Environment,

    pub auth: AuthConfig,

    #[serde(default)]
    pub clear: ClearConfig,

    /// Service directory: name to per-environment base URL
    #[serde(default)]
    pub services: BTreeMap<String, EnvUrls>,

    /// Navigation table: route key to owning application
    #[serde(default)]
    pub navigation: BTreeMap<String, NavigationTarget>,

    #[serde(default)]
    pub menu: Vec<MenuEntry>,
}

impl ShellConfig {
    /// The configuration shipped with the shell
    pub fn builtin() -> ShellResult<Self> {
        Self::from_toml_str(BUILTIN_CONFIG)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> ShellResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ShellError::config(format!("failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or the built-in one if it does not exist
    pub fn load(path: &Path) -> ShellResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Configuration file not found, using built-in defaults");
            return Self::builtin();
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ShellError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;

        info!(
            path = %path.display(),
            environment = ?config.environment,
            routes = config.navigation.len(),
            "Loaded shell configuration"
        );

        Ok(config)
    }

    /// Check the whole document, reporting every problem at once
    pub fn validate(&self) -> ShellResult<()> {
        let mut problems = table_problems(&self.navigation);

        for entry in &self.menu {
            if let Err(e) = MenuNode::try_from(entry.clone()) {
                problems.push(match e {
                    ShellError::Config(message) => message,
                    other => other.to_string(),
                });
            }
        }

        let auth = [
            ("auth.sign_in", &self.auth.sign_in),
            ("auth.login_redirect", &self.auth.login_redirect),
            ("auth.api_base", &self.auth.api_base),
        ];
        let services = self
            .services
            .iter()
            .map(|(name, urls)| (name.as_str(), urls));

        for (name, urls) in auth.into_iter().chain(services) {
            for url in [&urls.dev, &urls.prod] {
                if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
                    problems.push(format!("'{name}': {url} is not an http(s) URL"));
                }
            }
        }

        for (name, path) in [
            ("auth.login_path", &self.auth.login_path),
            ("auth.logout_path", &self.auth.logout_path),
        ] {
            if !path.starts_with('/') {
                problems.push(format!("{name} must start with '/'"));
            }
        }
        if self.clear.timeout_ms == 0 {
            problems.push("clear.timeout_ms must be non-zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ShellError::config(problems.join("; ")))
        }
    }

    pub fn navigation_table(&self) -> ShellResult<NavigationTable> {
        NavigationTable::new(self.navigation.clone())
    }

    pub fn menu_tree(&self) -> ShellResult<Vec<MenuNode>> {
        self.menu.iter().cloned().map(MenuNode::try_from).collect()
    }

    pub fn navigator(&self) -> ShellResult<Navigator> {
        Ok(Navigator::new(
            Arc::new(self.navigation_table()?),
            self.environment,
        ))
    }

    pub fn sign_in_url(&self) -> &Url {
        self.auth.sign_in.select(self.environment)
    }

    pub fn sign_in(&self) -> SignIn {
        let sign_in = SignIn::new(self.sign_in_url().clone());
        match &self.auth.tenant_domain {
            Some(domain) => sign_in.with_tenant_domain(domain.clone()),
            None => sign_in,
        }
    }

    pub fn login_redirect_url(&self) -> &Url {
        self.auth.login_redirect.select(self.environment)
    }

    /// Backend API URL for `service` (empty for the API root)
    pub fn api_url(&self, service: &str) -> ShellResult<Url> {
        Ok(self.auth.api_base.select(self.environment).join(service)?)
    }

    /// Backend login endpoint
    pub fn login_url(&self) -> ShellResult<Url> {
        self.api_url(self.auth.login_path.trim_start_matches('/'))
    }

    /// Backend logout endpoint
    pub fn logout_url(&self) -> ShellResult<Url> {
        self.api_url(self.auth.logout_path.trim_start_matches('/'))
    }

    /// URL of `path` on a named service, `None` for unknown services
    pub fn service_url(&self, name: &str, path: &str) -> Option<Url> {
        let Some(urls) = self.services.get(name) else {
            warn!(service = name, "Service not found in navigation configuration");
            return None;
        };

        match urls.select(self.environment).join(path) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(service = name, path, error = %e, "Invalid service path");
                None
            }
        }
    }

    pub fn clear_timeout(&self) -> Duration {
        Duration::from_millis(self.clear.timeout_ms)
    }

    /// Every distinct application origin the shell knows about: the
    /// navigation table first, then the service directory
    pub fn known_origins(&self) -> ShellResult<Vec<Url>> {
        let mut origins = self.navigation_table()?.origins(self.environment)?;

        for urls in self.services.values() {
            let origin = urls.select(self.environment).join("/")?;
            if !origins.iter().any(|o| o.origin() == origin.origin()) {
                origins.push(origin);
            }
        }

        Ok(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::SUPER_ADMIN_ROLE;
    use crate::menu::filter_menu;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [auth]
        sign_in = { dev = "http://localhost:3001/auth", prod = "https://signin.example.com/auth" }
        login_redirect = { dev = "http://localhost:3002/dashboard", prod = "https://app.example.com/dashboard" }
        api_base = { dev = "http://localhost:8000/api/", prod = "https://api.example.com/" }
    "#;

    #[test]
    fn test_builtin_config_is_valid() {
        let config = ShellConfig::builtin().unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.navigation_table().unwrap().len(), 12);
        assert_eq!(config.clear_timeout(), Duration::from_millis(500));
        assert_eq!(config.sign_in_url().as_str(), "http://localhost:3001/auth");
        assert_eq!(
            config.login_redirect_url().as_str(),
            "http://localhost:3002/dashboard"
        );
    }

    #[test]
    fn test_builtin_menu_mirrors_sidebar() {
        let config = ShellConfig::builtin().unwrap();
        let tree = config.menu_tree().unwrap();

        let labels: Vec<&str> = tree.iter().map(|n| n.label()).collect();
        assert_eq!(
            labels,
            vec![
                "Dashboard",
                "Users Management",
                "Sales",
                "Ticket",
                "Inventory Management",
                "Marketing",
                "Tenants",
                "Subscriptions",
            ]
        );

        let anonymous = filter_menu(&tree, None, &BTreeSet::new());
        assert_eq!(anonymous.len(), 1);
        assert_eq!(filter_menu(&tree, Some(SUPER_ADMIN_ROLE), &BTreeSet::new()).len(), 8);

        let managers: BTreeSet<String> = ["manage_tenants", "manage_subscriptions", "view_leads"]
            .into_iter()
            .map(String::from)
            .collect();
        let manager = filter_menu(&tree, Some("manager"), &managers);
        let keys: Vec<&str> = manager.iter().map(|n| n.key()).collect();
        assert_eq!(keys, vec!["/dashboard", "/sales"]);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ShellConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.auth.login_path, "/auth/login");
        assert_eq!(config.auth.logout_path, "/auth/logout");
        assert_eq!(config.clear.timeout_ms, 500);
        assert!(config.navigation.is_empty());
        assert!(config.menu.is_empty());
    }

    #[test]
    fn test_production_urls() {
        let mut config = ShellConfig::builtin().unwrap();
        config.environment = Environment::Production;

        assert_eq!(config.sign_in_url().as_str(), "https://signin.tclaccord.com/auth");
        assert_eq!(
            config.api_url("lead").unwrap().as_str(),
            "https://api.tclaccord.com/lead"
        );
        assert_eq!(
            config.login_url().unwrap().as_str(),
            "https://api.tclaccord.com/auth/login"
        );
        assert_eq!(
            config.logout_url().unwrap().as_str(),
            "https://api.tclaccord.com/auth/logout"
        );
        assert_eq!(
            config.service_url("ticket", "/tickets/7").unwrap().as_str(),
            "https://support.tclaccord.com/tickets/7"
        );
    }

    #[test]
    fn test_unknown_service_is_none() {
        let config = ShellConfig::builtin().unwrap();
        assert_eq!(config.service_url("payroll", "/"), None);
        assert_eq!(
            config.logout_url().unwrap().as_str(),
            "http://localhost:8000/api/auth/logout"
        );
    }

    #[test]
    fn test_known_origins_are_distinct() {
        let config = ShellConfig::builtin().unwrap();
        let origins = config.known_origins().unwrap();

        // Six application ports from the table, plus 3001, 3000, 3008, 3009
        // from the service directory
        assert_eq!(origins.len(), 10);
        assert!(origins.contains(&Url::parse("http://localhost:3001/").unwrap()));
        let unique: BTreeSet<String> = origins.iter().map(|o| o.to_string()).collect();
        assert_eq!(unique.len(), origins.len());
    }

    #[test]
    fn test_validation_reports_all_problems() {
        let content = format!(
            r#"{MINIMAL}
            [clear]
            timeout_ms = 0

            [services]
            mail = {{ dev = "ftp://localhost", prod = "https://mail.example.com" }}

            [navigation]
            "/tickets" = {{ base_url = "https://support.example.com", dev_port = 0, path_prefix = "tickets" }}

            [[menu]]
            key = "sales"
            label = "Sales"
            "#
        );

        let err = ShellConfig::from_toml_str(&content).unwrap_err().to_string();

        assert!(err.contains("dev_port must be non-zero"));
        assert!(err.contains("menu key 'sales'"));
        assert!(err.contains("'mail': ftp://localhost"));
        assert!(err.contains("clear.timeout_ms"));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let result = ShellConfig::from_toml_str("environment = ");
        assert!(matches!(result, Err(ShellError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let config = ShellConfig::load(&temp_dir.path().join("shell.toml")).unwrap();
        assert_eq!(config, ShellConfig::builtin().unwrap());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shell.toml");
        std::fs::write(&path, format!("environment = \"production\"\n{MINIMAL}")).unwrap();

        let config = ShellConfig::load(&path).unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.sign_in_url().as_str(), "https://signin.example.com/auth");
    }
}
