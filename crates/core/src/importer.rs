use crate::context::BrowsingContext;
use crate::credentials::{decode_permissions, encode_permissions, CredentialField, CredentialRecord};
use crate::error::ShellResult;
use tracing::{debug, info, warn};
use url::Url;

/// Historical query parameter carrying the tenant id
pub const LEGACY_TENANT_PARAM: &str = "tenant";

/// Credentials found in a URL query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCredentials {
    /// Recognised, well-formed values in query order (last one wins)
    pub fields: Vec<(CredentialField, String)>,
    /// The URL with every recognised parameter removed
    pub sanitized: Url,
    /// Whether any recognised parameter was present, valid or not
    pub found: bool,
}

/// Split `url` into the credentials it carries and the URL without them.
///
/// Values are percent-decoded. Empty values and malformed permission lists
/// count as absent but are still stripped. `tenant` stands in for `tenantId`
/// only when `tenantId` itself is missing.
pub fn extract_credentials(url: &Url) -> UrlCredentials {
    let mut fields = Vec::new();
    let mut kept = Vec::new();
    let mut legacy_tenant = None;
    let mut found = false;

    for (key, value) in url.query_pairs() {
        if key == LEGACY_TENANT_PARAM {
            found = true;
            if !value.is_empty() {
                legacy_tenant = Some(value.into_owned());
            }
            continue;
        }

        let Some(field) = CredentialField::from_key(&key) else {
            kept.push((key.into_owned(), value.into_owned()));
            continue;
        };

        found = true;
        if value.is_empty() {
            continue;
        }

        if field == CredentialField::Permissions {
            match decode_permissions(&value) {
                Some(permissions) => fields.push((field, encode_permissions(&permissions))),
                None => warn!("Ignoring permissions parameter that is not a JSON array"),
            }
        } else {
            fields.push((field, value.into_owned()));
        }
    }

    if let Some(tenant) = legacy_tenant {
        if !fields.iter().any(|(f, _)| *f == CredentialField::TenantId) {
            fields.push((CredentialField::TenantId, tenant));
        }
    }

    let mut sanitized = url.clone();
    if found {
        sanitized.set_query(None);
        if !kept.is_empty() {
            sanitized.query_pairs_mut().extend_pairs(kept);
        }
    }

    UrlCredentials {
        fields,
        sanitized,
        found,
    }
}

/// Import credentials carried by the context's current URL.
///
/// Present values overwrite stored ones, then the URL is rewritten in place
/// without them. Returns the full record after import. Without credential
/// parameters this only reads the store.
pub fn import_from_current_url(ctx: &BrowsingContext) -> ShellResult<CredentialRecord> {
    let location = ctx.location();
    let imported = extract_credentials(&location);

    if imported.found {
        let store = ctx.credentials();
        for (field, value) in &imported.fields {
            store.set(*field, value)?;
        }

        ctx.replace_state(imported.sanitized);

        info!(
            context = %ctx.id(),
            fields = imported.fields.len(),
            "Imported credentials from URL"
        );
    } else {
        debug!(context = %ctx.id(), "No credentials in URL");
    }

    ctx.credentials().record()
}
