use accord_shell_client::{AccordClient, LogoutFlow, LogoutReport};
use accord_shell_core::clearer::FrameHost;
use accord_shell_core::menu::{open_keys, selected_keys};
use accord_shell_core::{
    check_auth_and_redirect, filter_menu, import_from_current_url, Browser, CredentialRecord,
    MenuNode, Navigation, NavigationEffect, Presentation, ShellConfig,
};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;
use url::Url;

/// Credentials to seed into the context before acting
#[derive(Args, Debug, Default, Clone)]
pub struct CredentialArgs {
    #[arg(long)]
    pub token: Option<String>,

    #[arg(long)]
    pub tenant_id: Option<String>,

    #[arg(long)]
    pub user_id: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub role: Option<String>,

    /// Granted permission, repeatable
    #[arg(long = "permission")]
    pub permissions: Vec<String>,
}

impl CredentialArgs {
    pub fn is_empty(&self) -> bool {
        self.record() == CredentialRecord::default()
    }

    pub fn record(&self) -> CredentialRecord {
        CredentialRecord {
            token: self.token.clone(),
            tenant_id: self.tenant_id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            permissions: self.permissions.iter().cloned().collect(),
        }
    }
}

/// Result of loading a URL in a fresh context
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub location: Url,
    pub record: CredentialRecord,
    pub effects: Vec<NavigationEffect>,
}

/// Result of the authentication gate
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Url>,
}

pub fn validate(config: &ShellConfig) -> Result<String> {
    config.validate().context("Configuration is invalid")?;

    Ok(format!(
        "Configuration OK: {:?}, {} routes, {} menu sections, {} services, {} origins",
        config.environment,
        config.navigation.len(),
        config.menu.len(),
        config.services.len(),
        config.known_origins()?.len(),
    ))
}

pub fn print_config(config: &ShellConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

/// Render the menu visible to `role` with `permissions`
pub fn menu(
    config: &ShellConfig,
    role: Option<&str>,
    permissions: &[String],
    path: Option<&str>,
) -> Result<String> {
    let tree = config.menu_tree()?;
    let permissions: BTreeSet<String> = permissions.iter().cloned().collect();
    let visible = filter_menu(&tree, role, &permissions);

    let mut out = String::new();
    render_menu(&visible, 0, &mut out);

    if let Some(path) = path {
        writeln!(out, "selected: {}", selected_keys(&visible, path).join(", "))?;
        writeln!(out, "open: {}", open_keys(&visible, path).join(", "))?;
    }

    Ok(out)
}

fn render_menu(nodes: &[MenuNode], depth: usize, out: &mut String) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        match node {
            MenuNode::Leaf {
                key,
                label,
                permission: Some(permission),
                ..
            } => {
                let _ = writeln!(out, "{indent}{label} ({key}) [{permission}]");
            }
            MenuNode::Leaf { key, label, .. } => {
                let _ = writeln!(out, "{indent}{label} ({key})");
            }
            MenuNode::Group {
                key,
                label,
                children,
                ..
            } => {
                let _ = writeln!(out, "{indent}{label} ({key})");
                render_menu(children, depth + 1, out);
            }
        }
    }
}

/// Open `from`, seed credentials, and navigate to `key`
pub fn resolve(
    config: &ShellConfig,
    browser: &Browser,
    from: Url,
    key: &str,
    credentials: &CredentialArgs,
    presentation: Presentation,
) -> Result<Navigation> {
    let ctx = browser.open(from)?;
    if !credentials.is_empty() {
        ctx.credentials().store(&credentials.record())?;
    }

    let navigation = config.navigator()?.navigate(&ctx, key, presentation)?;
    Ok(navigation)
}

/// Open `url` and import whatever credentials it carries
pub fn import(browser: &Browser, url: Url) -> Result<ImportSummary> {
    let ctx = browser.open(url)?;
    let record = import_from_current_url(&ctx)?;

    Ok(ImportSummary {
        location: ctx.location(),
        record,
        effects: ctx.effects(),
    })
}

/// Run the authentication gate on `url`
pub fn check(config: &ShellConfig, browser: &Browser, url: Url) -> Result<CheckSummary> {
    let ctx = browser.open(url)?;
    let record = check_auth_and_redirect(&ctx, &config.sign_in())?;

    let redirect = match ctx.last_effect() {
        Some(NavigationEffect::Assign(target)) if record.is_none() => Some(target),
        _ => None,
    };

    Ok(CheckSummary {
        authenticated: record.is_some(),
        redirect,
    })
}

pub async fn login(
    config: &ShellConfig,
    browser: &Browser,
    email: &str,
    password: &str,
) -> Result<(CredentialRecord, Url)> {
    let client = AccordClient::from_shell_config(config)?;
    let ctx = browser.open(config.sign_in_url().clone())?;

    let record = client
        .auth()
        .login(ctx.credentials(), email, password)
        .await
        .context("Login failed")?;

    Ok((record, config.login_redirect_url().clone()))
}

pub async fn logout(
    config: &ShellConfig,
    browser: Arc<Browser>,
    from: Url,
    credentials: &CredentialArgs,
) -> Result<LogoutReport> {
    let ctx = browser.open(from)?;
    if !credentials.is_empty() {
        ctx.credentials().store(&credentials.record())?;
    }

    let client = AccordClient::from_shell_config(config)?;
    let host: Arc<dyn FrameHost> = browser;
    let flow = LogoutFlow::from_shell_config(config, client, host)?;

    Ok(flow.run(&ctx).await)
}
