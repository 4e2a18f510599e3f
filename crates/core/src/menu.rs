use crate::credentials::{CredentialRecord, SUPER_ADMIN_ROLE};
use crate::error::{ShellError, ShellResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;

/// Navigation menu tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MenuNode {
    /// A destination, optionally gated by a permission
    Leaf {
        key: String,
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permission: Option<String>,
        /// Shown to `super_admin` only, whatever permissions others hold
        #[serde(default, skip_serializing_if = "is_false")]
        admin_only: bool,
    },
    /// A section; visible while any child is visible
    Group {
        key: String,
        label: String,
        #[serde(default, skip_serializing_if = "is_false")]
        admin_only: bool,
        children: Vec<MenuNode>,
    },
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl MenuNode {
    pub fn leaf(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Leaf {
            key: key.into(),
            label: label.into(),
            permission: None,
            admin_only: false,
        }
    }

    pub fn gated(
        key: impl Into<String>,
        label: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self::Leaf {
            key: key.into(),
            label: label.into(),
            permission: Some(permission.into()),
            admin_only: false,
        }
    }

    pub fn group(key: impl Into<String>, label: impl Into<String>, children: Vec<MenuNode>) -> Self {
        Self::Group {
            key: key.into(),
            label: label.into(),
            admin_only: false,
            children,
        }
    }

    /// Restrict this node and everything under it to `super_admin`
    pub fn admin_only(mut self) -> Self {
        match &mut self {
            Self::Leaf { admin_only, .. } | Self::Group { admin_only, .. } => *admin_only = true,
        }
        self
    }

    pub fn is_admin_only(&self) -> bool {
        match self {
            Self::Leaf { admin_only, .. } | Self::Group { admin_only, .. } => *admin_only,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Leaf { key, .. } | Self::Group { key, .. } => key,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Leaf { label, .. } | Self::Group { label, .. } => label,
        }
    }

    pub fn children(&self) -> &[MenuNode] {
        match self {
            Self::Leaf { .. } => &[],
            Self::Group { children, .. } => children,
        }
    }
}

/// Menu entry as written in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub admin_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<MenuEntry>>,
}

impl TryFrom<MenuEntry> for MenuNode {
    type Error = ShellError;

    fn try_from(entry: MenuEntry) -> ShellResult<Self> {
        if !entry.key.starts_with('/') {
            return Err(ShellError::config(format!(
                "menu key '{}' must start with '/'",
                entry.key
            )));
        }

        match entry.children {
            Some(_) if entry.permission.is_some() => Err(ShellError::config(format!(
                "menu group '{}' cannot require a permission; gate its children instead",
                entry.key
            ))),
            Some(children) if children.is_empty() => Err(ShellError::config(format!(
                "menu group '{}' has no children",
                entry.key
            ))),
            Some(children) => Ok(MenuNode::Group {
                key: entry.key,
                label: entry.label,
                admin_only: entry.admin_only,
                children: children
                    .into_iter()
                    .map(MenuNode::try_from)
                    .collect::<ShellResult<_>>()?,
            }),
            None => Ok(MenuNode::Leaf {
                key: entry.key,
                label: entry.label,
                permission: entry.permission,
                admin_only: entry.admin_only,
            }),
        }
    }
}

/// Visible menu for a role and permission set.
///
/// `super_admin` gets `tree` back untouched. Everyone else loses admin-only
/// nodes, then gets leaves whose permission they hold (or that need none), and
/// groups with at least one surviving child. Source order is kept; emptied groups disappear.
pub fn filter_menu<'a>(
    tree: &'a [MenuNode],
    role: Option<&str>,
    permissions: &BTreeSet<String>,
) -> Cow<'a, [MenuNode]> {
    if role == Some(SUPER_ADMIN_ROLE) {
        return Cow::Borrowed(tree);
    }

    Cow::Owned(
        tree.iter()
            .filter_map(|node| filter_node(node, permissions))
            .collect(),
    )
}

/// Visible menu for the holder of `record`
pub fn menu_for<'a>(tree: &'a [MenuNode], record: &CredentialRecord) -> Cow<'a, [MenuNode]> {
    filter_menu(tree, record.role.as_deref(), &record.permissions)
}

fn filter_node(node: &MenuNode, permissions: &BTreeSet<String>) -> Option<MenuNode> {
    if node.is_admin_only() {
        return None;
    }

    match node {
        MenuNode::Leaf { permission, .. } => match permission {
            Some(required) if !permissions.contains(required) => None,
            _ => Some(node.clone()),
        },
        MenuNode::Group {
            key,
            label,
            children,
            ..
        } => {
            let visible: Vec<MenuNode> = children
                .iter()
                .filter_map(|child| filter_node(child, permissions))
                .collect();

            if visible.is_empty() {
                None
            } else {
                Some(MenuNode::Group {
                    key: key.clone(),
                    label: label.clone(),
                    admin_only: false,
                    children: visible,
                })
            }
        }
    }
}

fn path_matches(path: &str, key: &str) -> bool {
    path == key
        || path
            .strip_prefix(key)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

fn best_leaf<'a>(nodes: &'a [MenuNode], path: &str, best: &mut Option<&'a str>) {
    for node in nodes {
        match node {
            MenuNode::Leaf { key, .. } => {
                let more_specific = match *best {
                    Some(current) => key.len() > current.len(),
                    None => true,
                };
                if more_specific && path_matches(path, key) {
                    *best = Some(key.as_str());
                }
            }
            MenuNode::Group { children, .. } => best_leaf(children, path, best),
        }
    }
}

/// Menu keys to highlight for `path`: the most specific leaf the path falls
/// under, or the path itself
pub fn selected_keys(tree: &[MenuNode], path: &str) -> Vec<String> {
    let mut best = None;
    best_leaf(tree, path, &mut best);
    vec![best.unwrap_or(path).to_string()]
}

/// Top-level section to expand for `path` (one open at a time)
pub fn open_keys(tree: &[MenuNode], path: &str) -> Vec<String> {
    tree.iter()
        .filter(|node| matches!(node, MenuNode::Group { .. }))
        .find(|node| path_matches(path, node.key()))
        .map(|node| vec![node.key().to_string()])
        .unwrap_or_default()
}
