// Session and menu authorization layer shared by the Accord admin applications

pub mod broadcast;
pub mod clearer;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod importer;
pub mod menu;
pub mod navigation;
pub mod storage;

pub use broadcast::{broadcast_logout, setup_logout_listener, LogoutListener};
pub use clearer::{ClearOutcome, ClearReport, CrossOriginClearer};
pub use config::ShellConfig;
pub use context::{Browser, BrowsingContext, ContextId, NavigationEffect};
pub use credentials::{CredentialField, CredentialRecord, CredentialStore};
pub use error::{ShellError, ShellResult};
pub use importer::import_from_current_url;
pub use menu::{filter_menu, MenuNode};
pub use navigation::{check_auth_and_redirect, Environment, Navigation, Navigator, Presentation, SignIn};
