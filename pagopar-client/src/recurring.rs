//! Recurring payments with stored cards.
//!
//! The flow is:
//!
//! 1. [`add_client`] registers the buyer once.
//! 2. [`add_card`] starts card registration and returns an alias token, which
//!    is rendered with [`bancard_iframe_url`] or [`upay_iframe_url`].
//! 3. [`confirm_card`] runs after the buyer is redirected back.
//! 4. [`get_cards`] returns fresh card aliases, required before every
//!    [`pay`], [`delete_card`] or [`pre_authorize`], because aliases expire.
//!
//! Preauthorizations reserve funds and expire after 30 days unless confirmed.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize, de::IgnoredAny};
use serde_with::serde_as;
use tracing::instrument;
use url::form_urlencoded;

use crate::{
    error::{PagoparError, Result},
    registry::Application,
    transport::{CredentialFields, Endpoint},
    wire,
};

const RECURRING_SEED: &str = "PAGO-RECURRENTE";

/// Registered buyer.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Client {
    /// Commerce buyer id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "id_comprador_comercio")]
    pub buyer_id: String,
    /// Full name.
    #[serde(rename = "nombres_apellidos")]
    pub full_name: String,
    /// Email.
    pub email: String,
    /// Phone.
    #[serde(rename = "celular")]
    pub phone: String,
}

/// Card kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    /// Credit.
    #[serde(rename = "Crédito")]
    Credit,
    /// Debit.
    #[serde(rename = "Débito")]
    Debit,
    /// Prepaid.
    #[serde(rename = "Prepaga")]
    Prepaid,
}

/// Stored card. The alias token is temporary.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Card {
    /// Temporary alias for payments and deletion.
    pub alias_token: String,
    /// Brand.
    #[serde(rename = "marca")]
    pub brand: String,
    /// Numeric card id, used for preauthorizations.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "tarjeta")]
    pub card_id: String,
    /// Issuing bank.
    #[serde(rename = "emisor")]
    pub issuer: String,
    /// Masked number.
    #[serde(rename = "tarjeta_numero")]
    pub masked_number: String,
    /// Kind.
    #[serde(rename = "tipo_tarjeta")]
    pub card_type: CardType,
    /// Brand logo.
    #[serde(rename = "url_logo")]
    pub logo_url: String,
    /// Registration provider.
    #[serde(rename = "proveedor")]
    pub provider: String,
}

/// Funds reserved by [`pre_authorize`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreAuthorization {
    /// Pagopar transaction id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "transaccion")]
    pub transaction_id: String,
    /// Internal receipt.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "comprobante_interno")]
    pub receipt: String,
}

/// Card registration provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CardProvider {
    /// uPay.
    #[serde(rename = "uPay")]
    UPay,
    /// Bancard.
    Bancard,
}

/// Registers a buyer.
#[derive(Debug, Clone, Serialize)]
pub struct AddClient {
    #[serde(rename = "identificador")]
    client_id: u64,
    #[serde(rename = "nombre_apellido")]
    full_name: String,
    email: String,
    #[serde(rename = "celular")]
    phone: String,
}

impl AddClient {
    /// Buyer with the commerce's own numeric id.
    #[must_use]
    pub fn new(client_id: u64, full_name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self { client_id, full_name: full_name.into(), email: email.into(), phone: phone.into() }
    }
}

impl Endpoint for AddClient {
    type Response = Client;
    const PATH: &'static str = "pago-recurrente/3.0/agregar-cliente/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Starts card registration; the response is the provider's alias token.
#[derive(Debug, Clone, Serialize)]
pub struct AddCard {
    #[serde(rename = "url")]
    return_url: String,
    #[serde(rename = "proveedor")]
    provider: CardProvider,
    #[serde(rename = "identificador")]
    client_id: u64,
}

impl AddCard {
    /// Registration that redirects to `return_url` when done.
    #[must_use]
    pub fn new(client_id: u64, return_url: impl Into<String>, provider: CardProvider) -> Self {
        Self { return_url: return_url.into(), provider, client_id }
    }
}

impl Endpoint for AddCard {
    type Response = String;
    const PATH: &'static str = "pago-recurrente/3.0/agregar-tarjeta/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    // This endpoint is signed over an empty seed.
    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
}

/// Confirms a registered card after the iframe flow.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmCard {
    #[serde(rename = "url")]
    return_url: String,
    #[serde(rename = "identificador")]
    client_id: u64,
}

impl Endpoint for ConfirmCard {
    type Response = IgnoredAny;
    const PATH: &'static str = "pago-recurrente/3.0/confirmar-tarjeta/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Lists a buyer's cards.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GetCards {
    #[serde(rename = "identificador")]
    client_id: u64,
}

impl Endpoint for GetCards {
    type Response = Vec<Card>;
    const PATH: &'static str = "pago-recurrente/3.0/listar-tarjeta/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Deletes a card.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteCard {
    #[serde(rename = "identificador")]
    client_id: u64,
    #[serde(rename = "tarjeta")]
    alias_token: String,
}

impl Endpoint for DeleteCard {
    type Response = IgnoredAny;
    const PATH: &'static str = "pago-recurrente/3.0/eliminar-tarjeta/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Charges an order to a stored card.
#[derive(Debug, Clone, Serialize)]
pub struct Pay {
    #[serde(rename = "hash_pedido")]
    order_hash: String,
    #[serde(rename = "tarjeta")]
    alias_token: String,
    #[serde(rename = "identificador")]
    client_id: u64,
}

impl Endpoint for Pay {
    type Response = IgnoredAny;
    const PATH: &'static str = "pago-recurrente/3.0/pagar/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Reserves funds on a card.
#[derive(Debug, Clone, Serialize)]
pub struct PreAuthorize {
    #[serde(rename = "tarjeta")]
    card_id: String,
    #[serde(rename = "monto")]
    amount: u64,
    #[serde(rename = "id_transaccion")]
    commerce_transaction_id: u64,
    #[serde(rename = "identificador")]
    client_id: u64,
}

impl PreAuthorize {
    /// Reservation of `amount` on the card with numeric id `card_id`.
    #[must_use]
    pub fn new(client_id: u64, card_id: impl Into<String>, amount: u64, commerce_transaction_id: u64) -> Self {
        Self { card_id: card_id.into(), amount, commerce_transaction_id, client_id }
    }
}

impl Endpoint for PreAuthorize {
    type Response = PreAuthorization;
    const PATH: &'static str = "pago-recurrente/3.0/preautorizar/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Identifies an existing preauthorization.
#[derive(Debug, Clone, Serialize)]
pub struct PreAuthorizationRef {
    #[serde(rename = "hash_pedido")]
    order_hash: String,
    #[serde(rename = "transaccion")]
    transaction_id: String,
    #[serde(rename = "id_transaccion")]
    commerce_transaction_id: u64,
    #[serde(rename = "identificador")]
    client_id: u64,
}

impl PreAuthorizationRef {
    /// Reference to the preauthorization `transaction_id` of `order_hash`.
    #[must_use]
    pub fn new(
        client_id: u64,
        order_hash: impl Into<String>,
        transaction_id: impl Into<String>,
        commerce_transaction_id: u64,
    ) -> Self {
        Self {
            order_hash: order_hash.into(),
            transaction_id: transaction_id.into(),
            commerce_transaction_id,
            client_id,
        }
    }
}

/// Captures a preauthorization.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ConfirmPreauthorization<'a>(pub &'a PreAuthorizationRef);

impl Endpoint for ConfirmPreauthorization<'_> {
    type Response = IgnoredAny;
    const PATH: &'static str = "pago-recurrente/3.0/confirmar-preautorizacion/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Releases a preauthorization.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct CancelPreauthorization<'a>(pub &'a PreAuthorizationRef);

impl Endpoint for CancelPreauthorization<'_> {
    type Response = IgnoredAny;
    const PATH: &'static str = "pago-recurrente/3.0/cancelar-preautorizacion/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed(RECURRING_SEED)
    }
}

/// Charges an order to a Billetera Personal wallet.
#[derive(Debug, Clone, Serialize)]
pub struct PersonalPay {
    #[serde(rename = "hash_pedido")]
    order_hash: String,
    #[serde(rename = "celular")]
    phone: String,
}

impl Endpoint for PersonalPay {
    type Response = IgnoredAny;
    const PATH: &'static str = "billetera-personal/1.0/pagar";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("pagar")
    }
}

/// Registers a buyer for recurring payments. Repeating it is harmless.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(client = request.client_id))]
pub async fn add_client(app: &Application, request: &AddClient) -> Result<Client> {
    app.send(request).await
}

/// Starts card registration and returns the provider's alias token.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(client = request.client_id, provider = ?request.provider))]
pub async fn add_card(app: &Application, request: &AddCard) -> Result<String> {
    app.send(request).await
}

/// Confirms the card registered by `client_id`.
///
/// # Errors
///
/// Transport errors.
pub async fn confirm_card(app: &Application, client_id: u64, return_url: &str) -> Result<()> {
    app.send(&ConfirmCard { return_url: return_url.to_owned(), client_id }).await.map(drop)
}

/// Lists the cards of `client_id` with fresh aliases.
///
/// # Errors
///
/// Transport errors.
pub async fn get_cards(app: &Application, client_id: u64) -> Result<Vec<Card>> {
    app.send(&GetCards { client_id }).await
}

/// Deletes the card behind `alias_token`.
///
/// # Errors
///
/// Transport errors.
pub async fn delete_card(app: &Application, client_id: u64, alias_token: &str) -> Result<()> {
    app.send(&DeleteCard { client_id, alias_token: alias_token.to_owned() }).await.map(drop)
}

/// Charges `order_hash` to the card behind `alias_token`.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip(app, alias_token))]
pub async fn pay(app: &Application, client_id: u64, alias_token: &str, order_hash: &str) -> Result<()> {
    let request = Pay { order_hash: order_hash.to_owned(), alias_token: alias_token.to_owned(), client_id };
    app.send(&request).await.map(drop)
}

/// Reserves funds on a card.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(client = request.client_id, amount = request.amount))]
pub async fn pre_authorize(app: &Application, request: &PreAuthorize) -> Result<PreAuthorization> {
    app.send(request).await
}

/// Captures reserved funds.
///
/// # Errors
///
/// Transport errors.
pub async fn confirm_preauthorization(app: &Application, reference: &PreAuthorizationRef) -> Result<()> {
    app.send(&ConfirmPreauthorization(reference)).await.map(drop)
}

/// Releases reserved funds.
///
/// # Errors
///
/// Transport errors.
pub async fn cancel_preauthorization(app: &Application, reference: &PreAuthorizationRef) -> Result<()> {
    app.send(&CancelPreauthorization(reference)).await.map(drop)
}

/// Charges `order_hash` to the Billetera Personal wallet of `phone`.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip(app, phone))]
pub async fn personal_pay(app: &Application, order_hash: &str, phone: &str) -> Result<()> {
    app.send(&PersonalPay { order_hash: order_hash.to_owned(), phone: phone.to_owned() }).await.map(drop)
}

/// Colours of the Bancard card registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[allow(missing_docs, reason = "CSS colour slots named after the form's style keys")]
pub struct BancardIframeStyle {
    pub button_background_color: String,
    pub button_border_color: String,
    pub button_text_color: String,
    pub form_background_color: String,
    pub form_border_color: String,
    pub header_background_color: String,
    pub header_text_color: String,
    pub hr_border_color: String,
    pub input_background_color: String,
    pub input_border_color: String,
    pub input_placeholder_color: String,
    pub input_text_color: String,
    pub label_kyc_text_color: String,
}

impl Default for BancardIframeStyle {
    fn default() -> Self {
        Self {
            button_background_color: "#5CB85C".to_owned(),
            button_border_color: "#4CAE4C".to_owned(),
            button_text_color: "#FFFFFF".to_owned(),
            form_background_color: "#FFFFFF".to_owned(),
            form_border_color: "#DDDDDD".to_owned(),
            header_background_color: "#F5F5F5".to_owned(),
            header_text_color: "#333333".to_owned(),
            hr_border_color: "#EEEEEE".to_owned(),
            input_background_color: "#FFFFFF".to_owned(),
            input_border_color: "#CCCCCC".to_owned(),
            input_placeholder_color: "#999999".to_owned(),
            input_text_color: "#555555".to_owned(),
            label_kyc_text_color: "#000000".to_owned(),
        }
    }
}

/// Bancard deployment hosting the registration form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BancardEnvironment {
    /// Live.
    #[default]
    Production,
    /// Staging.
    Sandbox,
    /// Bancard's development host.
    Development,
}

impl BancardEnvironment {
    /// Host and port.
    #[must_use]
    pub const fn host(self) -> &'static str {
        match self {
            Self::Production => "vpos.infonet.com.py",
            Self::Sandbox => "vpos.infonet.com.py:8888",
            Self::Development => "desa.infonet.com.py:8085",
        }
    }
}

impl fmt::Display for BancardEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
            Self::Development => "development",
        })
    }
}

/// URL of the Bancard card registration iframe.
///
/// Equivalent to `Bancard.Cards.createForm` from `bancard-checkout.js`.
///
/// # Errors
///
/// Returns [`PagoparError::InvalidInput`] if the style cannot be encoded.
///
/// # Examples
///
/// ```
/// use pagopar_client::recurring::{BancardEnvironment, BancardIframeStyle, bancard_iframe_url};
///
/// let url = bancard_iframe_url("alias", &BancardIframeStyle::default(), BancardEnvironment::Sandbox).unwrap();
/// assert!(url.starts_with("https://vpos.infonet.com.py:8888/checkout/register_card/new?process_id=alias&styles="));
/// ```
pub fn bancard_iframe_url(alias_token: &str, style: &BancardIframeStyle, environment: BancardEnvironment) -> Result<String> {
    let styles = serde_json::to_string(style).map_err(|e| PagoparError::InvalidInput(e.to_string()))?;
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("process_id", alias_token)
        .append_pair("styles", &styles)
        .finish();
    Ok(format!("https://{}/checkout/register_card/new?{query}", environment.host()))
}

/// URL of the uPay card registration iframe.
#[must_use]
pub fn upay_iframe_url(alias_token: &str) -> String {
    format!("https://www.pagopar.com/upay-iframe/?id-form={alias_token}")
}
