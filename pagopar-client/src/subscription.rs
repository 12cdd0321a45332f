//! Subscription notifications.
//!
//! Pagopar posts a notification when a buyer subscribes, unsubscribes, or is
//! charged for a subscription. The action is named by `tipo_accion`; payments
//! additionally carry a `pago` block.

use std::fmt;

use serde::Deserialize;
use serde_with::serde_as;

use crate::{
    error::{PagoparError, Result},
    registry::Application,
    signer, wire,
};

/// What triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// New subscription.
    Subscribed,
    /// Subscription cancelled.
    Unsubscribed,
    /// Billing cycle paid.
    Paid,
}

impl Action {
    /// Wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "suscripcion",
            Self::Unsubscribed => "desuscripcion",
            Self::Paid => "pagado",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "suscripcion" => Some(Self::Subscribed),
            "desuscripcion" => Some(Self::Unsubscribed),
            "pagado" => Some(Self::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subscriber {
    /// Pagopar user token.
    #[serde(rename = "token_identificador")]
    pub token_id: String,
    /// First name.
    #[serde(rename = "nombre")]
    pub name: String,
    /// Last name.
    #[serde(rename = "apellido")]
    pub last_name: String,
    /// Email.
    pub email: String,
    /// Phone.
    #[serde(rename = "celular")]
    pub phone: String,
    /// Document number.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "documento")]
    pub document: String,
    /// Legal name.
    #[serde(rename = "razon_social", default)]
    pub legal_name: String,
    /// Tax id.
    #[serde(default)]
    pub ruc: String,
}

/// Subscription details.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subscription {
    /// Pagopar subscription link id.
    #[serde_as(as = "wire::NumberOrString")]
    pub id: String,
    /// When the buyer subscribed.
    #[serde(rename = "fecha_suscripcion")]
    pub subscribed_at: String,
    /// Payment link id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "link_suscripcion")]
    pub link: String,
    /// Commerce's own subscription id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "identificador_comercio")]
    pub commerce_id: String,
    /// Amount per cycle.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "monto")]
    pub amount: String,
    /// Current title.
    #[serde(rename = "titulo")]
    pub title: String,
    /// Title at subscription time.
    #[serde(rename = "titulo_suscripcion")]
    pub original_title: String,
    /// Status, e.g. `Pendiente de Pago`, `Pagada`, `Cancelada`.
    #[serde(rename = "estado")]
    pub status: String,
    /// Cycles charged so far.
    #[serde_as(as = "Option<wire::NumberOrString>")]
    #[serde(rename = "cantidad_debito")]
    pub cycles_charged: Option<String>,
    /// Visits included or consumed.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "visitas")]
    pub visits: String,
    /// Billing period, e.g. `Mensual`.
    #[serde(rename = "periodicidad")]
    pub periodicity: String,
    /// Method chosen at subscription time.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "identificador_forma_pago")]
    pub payment_method_id: String,
    /// Its name.
    #[serde(rename = "titulo_forma_pago")]
    pub payment_method_title: String,
    /// Validity period.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "vigencia")]
    pub validity: String,
    /// When the buyer unsubscribed.
    #[serde(rename = "fecha_desuscripcion", default)]
    pub unsubscribed_at: Option<String>,
}

/// Charge for one billing cycle.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Payment {
    /// Order hash.
    #[serde(rename = "hash_pedido")]
    pub order_hash: String,
    /// Internal receipt number.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "comprobante_interno")]
    pub receipt: String,
    /// When it was paid.
    #[serde(rename = "fecha_pago")]
    pub paid_at: String,
    /// Method used.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "identificador_forma_pago_transaccion")]
    pub payment_method_id: String,
    /// Its name.
    #[serde(rename = "titulo_forma_pago_transaccion")]
    pub payment_method_title: String,
}

/// Notification event. Only payments carry extra data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// New subscription.
    Subscribed,
    /// Subscription cancelled.
    Unsubscribed,
    /// Billing cycle paid.
    Paid(Payment),
}

impl SubscriptionEvent {
    /// Action tag.
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Self::Subscribed => Action::Subscribed,
            Self::Unsubscribed => Action::Unsubscribed,
            Self::Paid(_) => Action::Paid,
        }
    }
}

/// Decoded subscription notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Token sent with the notification.
    pub token: String,
    /// Subscriber.
    pub user: Subscriber,
    /// Subscription.
    pub subscription: Subscription,
    /// What happened.
    pub event: SubscriptionEvent,
}

impl Notification {
    /// Checks that the token is the action tag signed with `app`'s private key.
    #[must_use]
    pub fn is_authentic(&self, app: &Application) -> bool {
        signer::tokens_match(&app.sign(self.event.action().as_str()), &self.token)
    }
}

#[derive(Deserialize)]
struct RawNotification {
    #[serde(rename = "tipo_accion")]
    action: String,
    token: String,
    #[serde(rename = "usuario")]
    user: Subscriber,
    #[serde(rename = "suscripcion")]
    subscription: Subscription,
    #[serde(rename = "pago", default)]
    payment: Option<Payment>,
}

/// Decodes a subscription notification body.
///
/// # Errors
///
/// Returns [`PagoparError::InvalidNotification`] if the body is malformed,
/// the action is unknown, or a payment notification lacks its `pago` block.
pub fn parse_notification(raw: &str) -> Result<Notification> {
    let raw: RawNotification =
        serde_json::from_str(raw).map_err(|e| PagoparError::InvalidNotification(e.to_string()))?;

    let event = match (Action::parse(&raw.action), raw.payment) {
        (Some(Action::Subscribed), _) => SubscriptionEvent::Subscribed,
        (Some(Action::Unsubscribed), _) => SubscriptionEvent::Unsubscribed,
        (Some(Action::Paid), Some(payment)) => SubscriptionEvent::Paid(payment),
        (Some(Action::Paid), None) => {
            return Err(PagoparError::InvalidNotification("payment notification without 'pago'".to_owned()));
        }
        (None, _) => {
            return Err(PagoparError::InvalidNotification(format!("unknown action '{}'", raw.action)));
        }
    };

    Ok(Notification { token: raw.token, user: raw.user, subscription: raw.subscription, event })
}
