//! Pagopar Client: typed access to the Pagopar payment gateway
//!
//! An async client for [Pagopar](https://www.pagopar.com), the Paraguayan
//! payment gateway. Every remote operation is an authenticated JSON call
//! against `https://api.pagopar.com/api/`; this crate signs the calls,
//! manages one HTTP session per commerce, and decodes the service's
//! `{"respuesta": bool, "resultado": ...}` envelopes into typed values.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Endpoints: checkout · courier · recurring · login · sync │
//! └────────────┬─────────────────────────────────────────────┘
//!              │ impl Endpoint (payload + path + seed)
//! ┌────────────▼────────────┐      ┌───────────────────────┐
//! │  transport::call        │──────│  signer (SHA-1 token) │
//! │  (encode, sign, decode) │      └───────────────────────┘
//! └────────────┬────────────┘
//!              │ session per application
//! ┌────────────▼────────────┐
//! │  registry::Application  │  credentials, proxy, HTTP settings
//! └─────────────────────────┘
//! ```
//!
//! Inbound traffic (sync deliveries, subscription notifications) is decoded
//! by [`sync::parse_synchronization`] and [`subscription::parse_notification`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chrono::{Duration, Local};
//! use pagopar_client::{
//!     ApplicationConfig, Registry,
//!     checkout::{BasicItem, Buyer, DocumentType, Item, PaymentType, StartTransaction, checkout_url, start_transaction},
//! };
//!
//! # async fn example() -> pagopar_client::Result<()> {
//! let registry = Registry::new();
//! let app = registry.initialize(ApplicationConfig::new("shop").with_credentials("private", "public"))?;
//!
//! let item = Item::new(BasicItem::new(1, "Mate", 1, 80_000), app.public_token());
//! let buyer = Buyer::new("Ana Gómez", "ana@example.com", "+595981000000", "1234567", DocumentType::Ci);
//! let deadline = (Local::now() + Duration::days(2)).naive_local();
//! let request = StartTransaction::new("order-1", vec![item], 80_000, PaymentType::Bancard, deadline, buyer)?;
//!
//! let transaction = start_transaction(&app, &request).await?;
//! println!("{}", checkout_url(&transaction.order_hash, None));
//!
//! app.close_session();
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`registry`]: named applications and their HTTP sessions
//! - [`config`]: application and HTTP settings, TOML loading
//! - [`signer`]: request tokens
//! - [`transport`]: signed calls and envelope decoding
//! - [`checkout`]: transactions, orders, payment methods
//! - [`courier`]: freight quotes and shipping selection
//! - [`recurring`]: stored cards, preauthorizations, wallet payments
//! - [`login`]: Pagopar Login account linking
//! - [`sync`]: product publishing and catalog synchronization
//! - [`subscription`]: subscription notifications
//! - [`error`]: error type
//!
//! # Credentials
//!
//! The private key never leaves the process: it is only hashed into request
//! tokens, redacted from `Debug` output, and zeroized when the application is
//! dropped. The default application (named [`config::DEFAULT_APP_NAME`])
//! falls back to `PAGOPAR_PRIVATE_TOKEN` and `PAGOPAR_PUBLIC_TOKEN`.
//!
//! # Error Handling
//!
//! All operations return [`Result<T, PagoparError>`](error::Result):
//!
//! ```rust
//! use pagopar_client::{PagoparError, error::RejectionKind};
//!
//! fn describe(err: &PagoparError) -> &'static str {
//!     match err {
//!         PagoparError::Rejected { kind: RejectionKind::InvalidToken, .. } => "check the private key",
//!         PagoparError::Rejected { .. } => "request refused",
//!         PagoparError::Transport { .. } => "network failure, retry later",
//!         _ => "other",
//!     }
//! }
//! # assert_eq!(describe(&PagoparError::rejected("Token no corresponde.")), "check the private key");
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions, reason = "transitive dependencies from reqwest")]

pub mod checkout;
pub mod config;
pub mod courier;
pub mod error;
pub mod login;
pub mod recurring;
pub mod registry;
pub mod signer;
pub mod subscription;
pub mod sync;
pub mod transport;
mod wire;

pub use config::{ApplicationConfig, HttpConfig};
pub use error::{PagoparError, Result};
pub use registry::{Application, Registry, SessionGuard, SessionStatus};
pub use transport::{CallSpec, CredentialFields, Endpoint};
