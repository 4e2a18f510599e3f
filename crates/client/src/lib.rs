//! # Accord shell client
//!
//! Backend access for the admin shell: login into the credential store and the
//! full logout sequence across every application origin.
//!
//! ```rust,no_run
//! use accord_shell_client::{AccordClient, ClientResult, LogoutFlow};
//! use accord_shell_core::{Browser, ShellConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> ClientResult<()> {
//! let shell = ShellConfig::builtin()?;
//! let client = AccordClient::from_shell_config(&shell)?;
//! let browser = Arc::new(Browser::in_memory());
//!
//! let ctx = browser.open(shell.login_redirect_url().clone())?;
//! client.auth().login(ctx.credentials(), "ada@example.com", "secret").await?;
//!
//! let logout = LogoutFlow::from_shell_config(&shell, client, browser.clone())?;
//! let report = logout.run(&ctx).await;
//! println!("Redirected to {}", report.redirect);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logout;
pub mod transport;

pub use client::{AccordClient, AccordClientBuilder};
pub use config::{ClientConfig, RetryConfig};
pub use error::{ClientError, ClientResult};
pub use logout::{LogoutFlow, LogoutReport};
