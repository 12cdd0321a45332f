//! Pagopar Login: linking child commerces to a parent platform.
//!
//! A marketplace sends its users to [`linking_url`], where they sign in or
//! register with Pagopar. On return, [`confirm_linking`] finalises the link
//! and yields the child commerce's data; [`get_linked_commerce`] refreshes it
//! later. [`get_commerce`] returns the same data for the calling commerce.

use std::borrow::Cow;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use tracing::instrument;
use url::form_urlencoded;

use crate::{error::Result, registry::Application, transport::Endpoint, wire};

const LOGIN_URL: &str = "https://www.pagopar.com/v1.0/pagopar-login/login/";

/// Payment method enabled for a commerce.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommercePaymentMethod {
    /// Method id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "forma_pago")]
    pub id: String,
    /// Smallest amount accepted.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "monto_minimo")]
    pub min_amount: u64,
    /// Commission percentage.
    #[serde(rename = "porcentaje_comision")]
    pub commission_percent: Decimal,
    /// Method category.
    #[serde(rename = "tipo", default)]
    pub kind: Option<String>,
}

/// Billing plan.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Plan {
    /// Plan id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "plan")]
    pub id: String,
    /// Description.
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Cost.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "costo")]
    pub cost: u64,
    /// Next invoice, ISO 8601.
    #[serde(rename = "fecha_siguiente_factura")]
    pub next_billing_date: String,
}

/// Account owning a commerce.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    /// Email.
    pub email: String,
    /// First name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Last name.
    #[serde(rename = "apellido")]
    pub last_name: String,
    /// Phone.
    #[serde(rename = "celular")]
    pub phone: String,
    /// Balance.
    #[serde(rename = "saldo")]
    pub balance: i64,
    /// Document number.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "documento")]
    pub document: String,
    /// When the balance was last updated.
    #[serde(rename = "fecha_saldo_actualizacion")]
    pub balance_updated_at: String,
    /// Amount pending collection; may be negative.
    #[serde(rename = "monto_pendiente_cobro")]
    pub pending_collection: i64,
    /// User hash.
    #[serde(default)]
    pub hash: Option<String>,
    /// Payment status.
    #[serde(rename = "estado_pago")]
    pub payment_status: String,
    /// Whether the plan is being paid.
    #[serde(rename = "pago_plan")]
    pub plan_paid: bool,
    /// Whether card payments are enabled.
    #[serde(rename = "pago_tarjeta")]
    pub card_payments: bool,
}

/// Order awaiting payment.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PendingOrder {
    /// Amount.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "monto")]
    pub amount: u64,
    /// Description.
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Payment deadline.
    #[serde(rename = "fecha_maxima_pago")]
    pub max_payment_date: String,
    /// State.
    #[serde(rename = "estado")]
    pub state: String,
    /// Payment page.
    pub url: String,
}

/// Commerce profile.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Commerce {
    /// Description.
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Commission percentage.
    #[serde(rename = "porcentaje_comision")]
    pub commission_percent: Decimal,
    /// Legal name.
    #[serde(rename = "razon_social")]
    pub legal_name: String,
    /// Tax id.
    pub ruc: String,
    /// Payment mode label.
    #[serde(rename = "modo_pago_denominacion")]
    pub payment_mode_label: String,
    /// Whether services are enabled.
    #[serde(rename = "servicios")]
    pub services: bool,
    /// Whether local pickup is offered.
    #[serde(rename = "retiro_local")]
    pub local_pickup: bool,
    /// Whether the commerce delivers with its own fleet.
    #[serde(rename = "envio_propio")]
    pub own_delivery: bool,
    /// Commerce id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "comercio")]
    pub id: String,
    /// Ranking score.
    pub ranking: i64,
    /// Payment mode id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "modo_pago")]
    pub payment_mode: String,
    /// Whether the contract is signed.
    #[serde(rename = "contrato_firmado")]
    pub contract_signed: bool,
    /// Whether sale links are allowed.
    #[serde(rename = "permisos_link_venta")]
    pub sale_links_allowed: bool,
    /// Environment, e.g. `Staging` or `Produccion`.
    #[serde(rename = "entorno")]
    pub environment: String,
    /// Sale type.
    #[serde(rename = "tipo_venta")]
    pub sale_type: String,
    /// Enabled payment methods.
    #[serde(rename = "forma_pago", default)]
    pub payment_methods: Vec<CommercePaymentMethod>,
    /// Billing plan.
    pub plan: Plan,
    /// Owner account.
    #[serde(rename = "usuario")]
    pub account: Account,
    /// Orders awaiting payment.
    #[serde(rename = "pedidos_pendientes", default)]
    pub pending_orders: Vec<PendingOrder>,
}

/// URL where a user links their Pagopar account to the parent commerce.
///
/// `commerce_hash` is the parent's public key. After linking, Pagopar
/// redirects to `redirect_url` adding the child's public key as
/// `hash_comercio`.
///
/// # Examples
///
/// ```
/// use pagopar_client::login::linking_url;
///
/// assert_eq!(
///     linking_url("pub", "42", "https://shop/back", Some(3)),
///     "https://www.pagopar.com/v1.0/pagopar-login/login/?hash_comercio=pub&usuario_id=42\
///      &url_redirect=https%3A%2F%2Fshop%2Fback&plan=3"
/// );
/// ```
#[must_use]
pub fn linking_url(commerce_hash: &str, user_id: &str, redirect_url: &str, plan: Option<u32>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("hash_comercio", commerce_hash)
        .append_pair("usuario_id", user_id)
        .append_pair("url_redirect", redirect_url);
    if let Some(plan) = plan {
        query.append_pair("plan", &plan.to_string());
    }
    format!("{LOGIN_URL}?{}", query.finish())
}

/// Child commerce reference used by the linking endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedCommerce {
    #[serde(rename = "token_comercio_hijo")]
    child_public_token: String,
    #[serde(rename = "usuario_id")]
    user_id: u64,
}

impl LinkedCommerce {
    /// Child identified by its public token and the parent's user id.
    #[must_use]
    pub fn new(child_public_token: impl Into<String>, user_id: u64) -> Self {
        Self { child_public_token: child_public_token.into(), user_id }
    }
}

/// Finalises a link.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ConfirmLinking<'a>(pub &'a LinkedCommerce);

impl Endpoint for ConfirmLinking<'_> {
    type Response = Commerce;
    const PATH: &'static str = "pagopar-login/2.0/confirmar-vinculacion/";

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("PAGOPAR-LOGIN")
    }
}

/// Reads a linked child's profile.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct GetLinkedCommerce<'a>(pub &'a LinkedCommerce);

impl Endpoint for GetLinkedCommerce<'_> {
    type Response = Commerce;
    const PATH: &'static str = "pagopar-login/2.0/datos-comercio/";

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("PAGOPAR-LOGIN")
    }
}

/// Reads the calling commerce's profile.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GetCommerce;

impl Endpoint for GetCommerce {
    type Response = Commerce;
    const PATH: &'static str = "comercios/2.0/datos-comercio/";

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("DATOS-COMERCIO")
    }
}

/// Confirms the link after the user returns from [`linking_url`].
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(user = child.user_id))]
pub async fn confirm_linking(app: &Application, child: &LinkedCommerce) -> Result<Commerce> {
    app.send(&ConfirmLinking(child)).await
}

/// Current profile of a linked child commerce.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(user = child.user_id))]
pub async fn get_linked_commerce(app: &Application, child: &LinkedCommerce) -> Result<Commerce> {
    app.send(&GetLinkedCommerce(child)).await
}

/// Current profile of the calling commerce.
///
/// # Errors
///
/// Transport errors.
pub async fn get_commerce(app: &Application) -> Result<Commerce> {
    app.send(&GetCommerce).await
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::transport::{CredentialFields, to_payload};

    #[test]
    fn test_linking_url_without_plan() {
        let url = linking_url("pub", "u 1", "https://shop/back?x=1", None);
        let parsed = url::Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            [
                ("hash_comercio".to_owned(), "pub".to_owned()),
                ("usuario_id".to_owned(), "u 1".to_owned()),
                ("url_redirect".to_owned(), "https://shop/back?x=1".to_owned()),
            ]
        );
    }

    #[test]
    fn test_linking_payload_uses_default_credentials() {
        let child = LinkedCommerce::new("child-pub", 42);
        assert_eq!(
            Value::Object(to_payload(&ConfirmLinking(&child)).unwrap()),
            json!({"token_comercio_hijo": "child-pub", "usuario_id": 42})
        );
        assert_eq!(<ConfirmLinking<'_> as Endpoint>::CREDENTIALS, CredentialFields::DEFAULT);
        assert_eq!(GetCommerce.seed(), "DATOS-COMERCIO");
    }

    #[test]
    fn test_commerce_decodes() {
        let commerce: Commerce = serde_json::from_value(json!({
            "descripcion": "Tienda", "porcentaje_comision": "6.82", "razon_social": "Tienda SA",
            "ruc": "800-1", "modo_pago_denominacion": "Semanal", "servicios": false,
            "retiro_local": true, "envio_propio": false, "comercio": 12, "ranking": 0,
            "modo_pago": 1, "contrato_firmado": true, "permisos_link_venta": true,
            "entorno": "Staging", "tipo_venta": "Producto",
            "forma_pago": [{"forma_pago": "9", "monto_minimo": "1000", "porcentaje_comision": 5.5}],
            "plan": {"plan": 2, "descripcion": "Pro", "costo": 100000, "fecha_siguiente_factura": "2020-08-01T12:36:56"},
            "usuario": {
                "email": "a@b.c", "nombre": "Ana", "apellido": "Gómez", "celular": "0981",
                "saldo": 0, "documento": 1234567, "fecha_saldo_actualizacion": "2020-08-01",
                "monto_pendiente_cobro": -500, "hash": null, "estado_pago": "Al dia",
                "pago_plan": true, "pago_tarjeta": false
            },
            "pedidos_pendientes": []
        }))
        .unwrap();
        assert_eq!(commerce.id, "12");
        assert_eq!(commerce.commission_percent, Decimal::new(682, 2));
        assert_eq!(commerce.payment_methods[0].min_amount, 1000);
        assert_eq!(commerce.account.pending_collection, -500);
        assert!(commerce.payment_methods[0].kind.is_none());
    }
}
