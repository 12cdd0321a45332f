//! Starts a Pagopar transaction and prints the checkout URL.
//!
//! Credentials come from the environment:
//!
//! ```bash
//! export PAGOPAR_PRIVATE_TOKEN=<private key>
//! export PAGOPAR_PUBLIC_TOKEN=<public key>
//! LOG_FORMAT=json RUST_LOG=pagopar_client=debug cargo run --example checkout_flow
//! ```

#![allow(
    clippy::print_stdout,
    clippy::uninlined_format_args,
    reason = "examples are allowed to use println and simple formatting"
)]

use std::io;

use chrono::{Duration, Local};
use pagopar_client::{
    ApplicationConfig, Registry,
    checkout::{self, BasicItem, Buyer, DocumentType, Item, PaymentType, StartTransaction},
    config::DEFAULT_APP_NAME,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    match std::env::var("LOG_FORMAT").unwrap_or_default().to_lowercase().as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true).with_writer(io::stderr)).init(),
        _ => subscriber.with(fmt::layer().with_target(true).with_writer(io::stderr)).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let registry = Registry::global();
    let app = registry.initialize(ApplicationConfig::new(DEFAULT_APP_NAME))?;
    let _session = app.acquire()?;

    let methods = checkout::get_payment_methods(&app).await?;
    for method in &methods {
        println!("{:>3}  {} (min {} Gs.)", method.id, method.title.as_deref().unwrap_or("-"), method.min_amount);
    }

    let item = Item::new(BasicItem::new(1, "Mate de calabaza", 1, 80_000), app.public_token());
    let buyer = Buyer::new("Ana Gómez", "ana@example.com", "+595981000000", "1234567", DocumentType::Ci);
    let deadline = (Local::now() + Duration::days(2)).naive_local();
    let order_id = format!("demo-{}", Local::now().timestamp());
    let request = StartTransaction::new(order_id, vec![item], 80_000, PaymentType::Bancard, deadline, buyer)?
        .with_description("Demo order");

    let transaction = checkout::start_transaction(&app, &request).await?;
    println!("order {} -> {}", transaction.order_number, checkout::checkout_url(&transaction.order_hash, None));

    let order = checkout::get_order(&app, &transaction.order_hash).await?;
    println!("paid: {}, authentic: {}", order.paid, order.is_authentic(&app));
    Ok(())
}
