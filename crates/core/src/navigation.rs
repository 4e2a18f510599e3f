//! Cross-application navigation.
//!
//! Each micro-frontend is deployed on its own origin with its own router. A
//! menu click either stays inside the current application (route change, the
//! credentials are already in this origin's store) or leaves for another
//! origin with the credentials carried in the query string, where the
//! importer picks them up.

use crate::context::BrowsingContext;
use crate::credentials::{CredentialField, CredentialRecord};
use crate::error::{ShellError, ShellResult};
use crate::importer::import_from_current_url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Every application on `localhost` with its own port
    #[default]
    Development,
    Production,
}

/// Where a logical route key lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTarget {
    /// Production origin of the owning application
    pub base_url: Url,
    /// Port of the owning application in local development
    pub dev_port: u16,
    /// First path segment under which the application mounts its routes
    pub path_prefix: String,
}

impl NavigationTarget {
    /// Origin of the owning application in `environment`
    pub fn origin_url(&self, environment: Environment) -> ShellResult<Url> {
        match environment {
            Environment::Production => Ok(self.base_url.join("/")?),
            Environment::Development => Ok(Url::parse(&format!(
                "http://localhost:{}/",
                self.dev_port
            ))?),
        }
    }

    /// Translate a logical key into the application's own route by dropping
    /// the mount prefix (`/sales/leads` becomes `/leads`, `/sales` becomes `/`)
    pub fn local_path(&self, key: &str) -> String {
        let prefix = format!("/{}", self.path_prefix);
        match key.strip_prefix(prefix.as_str()) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => key.to_string(),
        }
    }

    fn problems(&self, key: &str) -> Vec<String> {
        let mut problems = Vec::new();

        if !matches!(self.base_url.scheme(), "http" | "https") || !self.base_url.has_host() {
            problems.push(format!("'{key}': base_url must be an http(s) URL with a host"));
        }
        if self.base_url.path() != "/"
            || self.base_url.query().is_some()
            || self.base_url.fragment().is_some()
        {
            problems.push(format!(
                "'{key}': base_url must be an origin without path, query or fragment"
            ));
        }
        if self.dev_port == 0 {
            problems.push(format!("'{key}': dev_port must be non-zero"));
        }
        if self.path_prefix.is_empty() || self.path_prefix.contains('/') {
            problems.push(format!("'{key}': path_prefix must be a single path segment"));
        } else if first_segment(key) != Some(self.path_prefix.as_str()) {
            problems.push(format!(
                "'{key}': path_prefix '{}' does not match the key's first segment",
                self.path_prefix
            ));
        }

        problems
    }
}

fn first_segment(key: &str) -> Option<&str> {
    key.strip_prefix('/')?.split('/').next().filter(|s| !s.is_empty())
}

fn key_problem(key: &str) -> Option<String> {
    let well_formed = key.starts_with('/')
        && key.len() > 1
        && !key.ends_with('/')
        && !key.contains("//")
        && !key
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '?' | '#' | '%'));

    (!well_formed).then(|| format!("'{key}': route key must look like '/section/page'"))
}

/// Every problem with `targets`, in key order
pub fn table_problems(targets: &BTreeMap<String, NavigationTarget>) -> Vec<String> {
    targets
        .iter()
        .flat_map(|(key, target)| {
            let mut problems: Vec<String> = key_problem(key).into_iter().collect();
            problems.extend(target.problems(key));
            problems
        })
        .collect()
}

/// Static table from logical route key to owning application.
///
/// Validated once on construction and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavigationTable {
    targets: BTreeMap<String, NavigationTarget>,
}

impl NavigationTable {
    pub fn new(targets: BTreeMap<String, NavigationTarget>) -> ShellResult<Self> {
        let problems = table_problems(&targets);
        if !problems.is_empty() {
            return Err(ShellError::config(format!(
                "invalid navigation table: {}",
                problems.join("; ")
            )));
        }

        Ok(Self { targets })
    }

    pub fn get(&self, key: &str) -> Option<&NavigationTarget> {
        self.targets.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Distinct application origins in `environment`
    pub fn origins(&self, environment: Environment) -> ShellResult<Vec<Url>> {
        let mut origins: Vec<Url> = Vec::new();
        for target in self.targets.values() {
            let origin = target.origin_url(environment)?;
            if !origins.iter().any(|o| o.origin() == origin.origin()) {
                origins.push(origin);
            }
        }
        Ok(origins)
    }
}

/// How the navigation was triggered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    #[default]
    Sidebar,
    /// Collapsed/mobile drawer, closed after navigating
    Drawer,
}

/// Navigation decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Navigation {
    /// Route change inside the current application
    InApp { path: String },
    /// Full page load of another application
    Redirect { url: Url },
}

/// Decides between in-app routing and cross-origin redirects
#[derive(Debug, Clone)]
pub struct Navigator {
    table: Arc<NavigationTable>,
    environment: Environment,
}

impl Navigator {
    pub fn new(table: Arc<NavigationTable>, environment: Environment) -> Self {
        Self { table, environment }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn table(&self) -> &NavigationTable {
        &self.table
    }

    /// Decide how `ctx` should reach `key` without performing it
    pub fn resolve(&self, ctx: &BrowsingContext, key: &str) -> ShellResult<Navigation> {
        let Some(target) = self.table.get(key) else {
            return Ok(Navigation::InApp {
                path: key.to_string(),
            });
        };

        let destination = target.origin_url(self.environment)?;
        if destination.origin() == *ctx.origin() {
            return Ok(Navigation::InApp {
                path: target.local_path(key),
            });
        }

        let mut url = destination.join(key)?;
        append_credentials(&mut url, &ctx.credentials().record()?);

        Ok(Navigation::Redirect { url })
    }

    /// Navigate `ctx` to `key`
    pub fn navigate(
        &self,
        ctx: &BrowsingContext,
        key: &str,
        presentation: Presentation,
    ) -> ShellResult<Navigation> {
        let navigation = self.resolve(ctx, key)?;

        match &navigation {
            Navigation::InApp { path } => {
                debug!(key, path = %path, "In-app navigation");
                ctx.push_route(path);
            }
            Navigation::Redirect { url } => {
                info!(key, origin = %url.origin().ascii_serialization(), "Cross-application navigation");
                ctx.assign(url.clone());
            }
        }

        if presentation == Presentation::Drawer {
            ctx.close_drawer();
        }

        Ok(navigation)
    }
}

/// Append the credential record to an outbound URL, only when a token is
/// present. Absent fields are left out; values are percent-encoded.
pub fn append_credentials(url: &mut Url, record: &CredentialRecord) {
    if !record.is_authenticated() {
        return;
    }

    let query = CredentialField::ALL
        .into_iter()
        .filter_map(|field| record.field(field).map(|value| (field, value)))
        .map(|(field, value)| format!("{}={}", field.key(), urlencoding::encode(&value)))
        .collect::<Vec<_>>()
        .join("&");

    url.set_query(Some(&query));
}

/// Sign-in collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignIn {
    url: Url,
    tenant_domain: Option<String>,
}

impl SignIn {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            tenant_domain: None,
        }
    }

    /// Treat `<tenant>.<domain>` hosts as tenant subdomains
    pub fn with_tenant_domain(mut self, domain: impl Into<String>) -> Self {
        self.tenant_domain = Some(domain.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Tenant slug taken from the subdomain of `current`
    pub fn tenant_for(&self, current: &Url) -> Option<String> {
        let domain = self.tenant_domain.as_deref()?;
        let subdomain = current.host_str()?.strip_suffix(domain)?.strip_suffix('.')?;

        if subdomain.is_empty() || subdomain.contains('.') || subdomain == "www" {
            None
        } else {
            Some(subdomain.to_string())
        }
    }

    /// Sign-in URL that returns the user to `current` afterwards
    pub fn redirect_url(&self, current: &Url) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("redirect", current.as_str());
            if let Some(tenant) = self.tenant_for(current) {
                query.append_pair("tenant", &tenant);
            }
        }
        url
    }
}

/// Import URL credentials and require a token.
///
/// Without one the context is sent to sign-in and `None` is returned.
pub fn check_auth_and_redirect(
    ctx: &BrowsingContext,
    sign_in: &SignIn,
) -> ShellResult<Option<CredentialRecord>> {
    let record = import_from_current_url(ctx)?;

    if record.is_authenticated() {
        return Ok(Some(record));
    }

    let target = sign_in.redirect_url(&ctx.location());
    info!(context = %ctx.id(), "No session token, redirecting to sign-in");
    ctx.assign(target);

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Browser, NavigationEffect};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn target(base: &str, port: u16, prefix: &str) -> NavigationTarget {
        NavigationTarget {
            base_url: url(base),
            dev_port: port,
            path_prefix: prefix.to_string(),
        }
    }

    fn table() -> Arc<NavigationTable> {
        let mut targets = BTreeMap::new();
        targets.insert(
            "/sales/leads".to_string(),
            target("https://sale.tclaccord.com", 3004, "sales"),
        );
        targets.insert(
            "/sales".to_string(),
            target("https://sale.tclaccord.com", 3004, "sales"),
        );
        targets.insert(
            "/inventory/products".to_string(),
            target("https://asset.tclaccord.com", 3003, "inventory"),
        );
        Arc::new(NavigationTable::new(targets).unwrap())
    }

    fn signed_in(browser: &Browser, location: &str) -> Arc<BrowsingContext> {
        let ctx = browser.open(url(location)).unwrap();
        ctx.credentials()
            .store(&CredentialRecord {
                token: Some("tok-123".to_string()),
                tenant_id: Some("t-1".to_string()),
                user_id: Some("42".to_string()),
                name: Some("Ada Lovelace".to_string()),
                role: Some("sales agent".to_string()),
                permissions: ["view_leads".to_string()].into_iter().collect(),
            })
            .unwrap();
        ctx
    }

    #[test]
    fn test_same_origin_routes_in_app() {
        let browser = Browser::in_memory();
        let ctx = signed_in(&browser, "https://sale.tclaccord.com/sales/contacts");
        ctx.open_drawer();
        let navigator = Navigator::new(table(), Environment::Production);

        let navigation = navigator
            .navigate(&ctx, "/sales/leads", Presentation::Drawer)
            .unwrap();

        assert_eq!(
            navigation,
            Navigation::InApp {
                path: "/leads".to_string()
            }
        );
        assert_eq!(ctx.effects(), vec![NavigationEffect::Route("/leads".to_string())]);
        assert!(!ctx.is_drawer_open());
    }

    #[test]
    fn test_cross_origin_redirect_carries_credentials() {
        let browser = Browser::in_memory();
        let ctx = signed_in(&browser, "https://dashboard.tclaccord.com/dashboard");
        let navigator = Navigator::new(table(), Environment::Production);

        let navigation = navigator
            .navigate(&ctx, "/sales/leads", Presentation::Sidebar)
            .unwrap();

        let Navigation::Redirect { url: target } = navigation else {
            panic!("expected redirect");
        };
        assert_eq!(target.origin().ascii_serialization(), "https://sale.tclaccord.com");
        assert_eq!(target.path(), "/sales/leads");
        assert_eq!(
            target.query(),
            Some(
                "token=tok-123&tenantId=t-1&userId=42&name=Ada%20Lovelace\
                 &role=sales%20agent&permissions=%5B%22view_leads%22%5D"
            )
        );
        assert_eq!(ctx.last_effect(), Some(NavigationEffect::Assign(target)));
    }

    #[test]
    fn test_redirect_then_import_round_trips_record() {
        let browser = Browser::in_memory();
        let origin_ctx = signed_in(&browser, "https://dashboard.tclaccord.com/dashboard");
        let expected = origin_ctx.credentials().record().unwrap();
        let navigator = Navigator::new(table(), Environment::Production);

        let Navigation::Redirect { url: target } = navigator
            .navigate(&origin_ctx, "/inventory/products", Presentation::Sidebar)
            .unwrap()
        else {
            panic!("expected redirect");
        };

        let landed = browser.open(target).unwrap();
        let imported = import_from_current_url(&landed).unwrap();

        assert_eq!(imported, expected);
        assert_eq!(landed.location().as_str(), "https://asset.tclaccord.com/inventory/products");
    }

    #[test]
    fn test_without_token_navigates_bare() {
        let browser = Browser::in_memory();
        let ctx = browser.open(url("https://dashboard.tclaccord.com/dashboard")).unwrap();
        ctx.credentials().set(CredentialField::Name, "Ada").unwrap();
        let navigator = Navigator::new(table(), Environment::Production);

        let navigation = navigator.resolve(&ctx, "/sales/leads").unwrap();

        assert_eq!(
            navigation,
            Navigation::Redirect {
                url: url("https://sale.tclaccord.com/sales/leads")
            }
        );
    }

    #[test]
    fn test_development_uses_local_ports() {
        let browser = Browser::in_memory();
        let navigator = Navigator::new(table(), Environment::Development);

        let on_sales = browser.open(url("http://localhost:3004/sales")).unwrap();
        assert_eq!(
            navigator.resolve(&on_sales, "/sales").unwrap(),
            Navigation::InApp {
                path: "/".to_string()
            }
        );

        let on_dashboard = signed_in(&browser, "http://localhost:3002/dashboard");
        let Navigation::Redirect { url: target } =
            navigator.resolve(&on_dashboard, "/inventory/products").unwrap()
        else {
            panic!("expected redirect");
        };
        assert!(target.as_str().starts_with("http://localhost:3003/inventory/products?token=tok-123"));
    }

    #[test]
    fn test_unknown_key_routes_locally() {
        let browser = Browser::in_memory();
        let ctx = browser.open(url("https://dashboard.tclaccord.com/")).unwrap();
        let navigator = Navigator::new(table(), Environment::Production);

        let navigation = navigator
            .navigate(&ctx, "/profile", Presentation::Sidebar)
            .unwrap();

        assert_eq!(
            navigation,
            Navigation::InApp {
                path: "/profile".to_string()
            }
        );
    }

    #[test]
    fn test_table_validation_reports_every_problem() {
        let mut targets = BTreeMap::new();
        targets.insert("sales/leads".to_string(), target("https://sale.tclaccord.com", 3004, "sales"));
        targets.insert(
            "/tickets".to_string(),
            target("https://support.tclaccord.com/tickets", 0, "support"),
        );

        let err = NavigationTable::new(targets).unwrap_err().to_string();

        assert!(err.contains("'sales/leads': route key"));
        assert!(err.contains("base_url must be an origin"));
        assert!(err.contains("dev_port must be non-zero"));
        assert!(err.contains("path_prefix 'support' does not match"));
    }

    #[test]
    fn test_origins_are_distinct() {
        assert_eq!(
            table().origins(Environment::Production).unwrap(),
            vec![url("https://asset.tclaccord.com/"), url("https://sale.tclaccord.com/")]
        );
        assert_eq!(table().origins(Environment::Development).unwrap().len(), 2);
    }

    #[test]
    fn test_check_auth_redirects_anonymous_visitors() {
        let browser = Browser::in_memory();
        let sign_in = SignIn::new(url("https://signin.tclaccord.com/auth"))
            .with_tenant_domain("crm.tclaccord.com");
        let ctx = browser.open(url("https://acme.crm.tclaccord.com/sales/leads")).unwrap();

        assert_eq!(check_auth_and_redirect(&ctx, &sign_in).unwrap(), None);

        let Some(NavigationEffect::Assign(target)) = ctx.last_effect() else {
            panic!("expected sign-in redirect");
        };
        let pairs: Vec<(String, String)> = target.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                (
                    "redirect".to_string(),
                    "https://acme.crm.tclaccord.com/sales/leads".to_string()
                ),
                ("tenant".to_string(), "acme".to_string()),
            ]
        );
    }

    #[test]
    fn test_check_auth_accepts_token_from_url() {
        let browser = Browser::in_memory();
        let sign_in = SignIn::new(url("https://signin.tclaccord.com/auth"));
        let ctx = browser.open(url("https://sale.tclaccord.com/sales/leads?token=abc")).unwrap();

        let record = check_auth_and_redirect(&ctx, &sign_in).unwrap().unwrap();

        assert_eq!(record.token.as_deref(), Some("abc"));
        assert!(!matches!(ctx.last_effect(), Some(NavigationEffect::Assign(_))));
        assert_eq!(sign_in.tenant_for(&ctx.location()), None);
    }
}
