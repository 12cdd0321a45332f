//! Product catalog synchronization.
//!
//! Outbound, [`create_product`] and [`edit_product`] publish sale links. Inbound,
//! Pagopar posts change logs to the commerce whenever stock moves or a
//! product is edited on its side; [`parse_synchronization`] decodes such a
//! delivery and [`respond_synchronization`] builds the acknowledgement.
//!
//! Each log is discriminated by `tipo_aviso`: sales and cancellations carry
//! only inventory, creations and modifications carry the full product.

use std::{borrow::Cow, fmt, str::FromStr};

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, value::RawValue};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use tracing::{debug, instrument};

use crate::{
    error::{PagoparError, Result},
    registry::Application,
    transport::{CredentialFields, Endpoint},
    wire,
};

/// AEX pickup settings for a product.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AexConfig {
    /// Pickup street address.
    #[serde(rename = "direccion")]
    pub address: String,
    /// Pickup city id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "direccion_ciudad")]
    pub city_id: String,
    /// Pickup coordinates, `lat,lng`.
    #[serde(rename = "direccion_coordenadas")]
    pub coordinates: String,
    /// Address reference.
    #[serde(rename = "direccion_referencia")]
    pub address_ref: String,
    /// Instructions for the courier.
    #[serde(rename = "comentarioPickUp")]
    pub comment: String,
    /// Whether AEX is enabled.
    #[serde(rename = "activo", default = "enabled")]
    pub enabled: bool,
    /// Pickup window start.
    #[serde(rename = "hora_inicio", with = "wire::time_of_day")]
    pub start_time: NaiveTime,
    /// Pickup window end.
    #[serde(rename = "hora_fin", with = "wire::time_of_day")]
    pub end_time: NaiveTime,
    /// Weight in kilograms.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "peso")]
    pub weight: String,
    /// Length in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "largo")]
    pub length: String,
    /// Width in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "ancho")]
    pub width: String,
    /// Height in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "alto")]
    pub height: String,
    /// Pagopar pickup address id; overrides the address above when set.
    #[serde(rename = "direccion_retiro", default)]
    pub pickup_address_id: Option<String>,
}

/// Weekly MOBI pickup window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobiSchedule {
    /// Weekdays, `"1"` (Monday) to `"5"` (Friday).
    #[serde(rename = "dias")]
    pub days: Vec<String>,
    /// Window start.
    #[serde(rename = "pickup_inicio", with = "wire::time_of_day")]
    pub start: NaiveTime,
    /// Window end.
    #[serde(rename = "pickup_fin", with = "wire::time_of_day")]
    pub end: NaiveTime,
}

/// MOBI settings for a product.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobiConfig {
    /// Whether MOBI is enabled.
    #[serde(rename = "activo", default = "enabled")]
    pub enabled: bool,
    /// Schedule title.
    #[serde(rename = "titulo")]
    pub title: String,
    /// MOBI user id. Unset on creation, required on edits.
    #[serde_as(as = "Option<wire::NumberOrString>")]
    #[serde(rename = "usuario_mobi")]
    pub user_id: Option<String>,
    /// Pagopar pickup address id. May be unset when AEX carries one.
    #[serde(rename = "direccion_retiro", default)]
    pub pickup_address_id: Option<String>,
    /// Pickup windows.
    #[serde(rename = "horarios")]
    pub schedules: Vec<MobiSchedule>,
}

const fn enabled() -> bool {
    true
}

/// Product data for [`create_product`] and [`edit_product`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductListing {
    /// Commerce product id.
    #[serde(rename = "id_producto")]
    pub commerce_product_id: String,
    /// Pagopar category id.
    #[serde(rename = "categoria")]
    pub category_id: String,
    #[serde(rename = "link_venta")]
    sale_link: &'static str,
    /// Whether the product is publicly listed.
    #[serde(rename = "link_publico")]
    pub public: bool,
    /// Whether the product is active.
    #[serde(rename = "activo")]
    pub enabled: bool,
    /// Price in guaraníes.
    #[serde(rename = "monto")]
    pub price: u64,
    /// Title.
    #[serde(rename = "titulo")]
    pub title: String,
    /// Description.
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Units in stock.
    #[serde(rename = "cantidad")]
    pub stock: u64,
    /// Image URLs.
    #[serde(rename = "imagen")]
    pub images: Vec<String>,
    /// AEX settings.
    #[serde(rename = "envio_aex")]
    pub aex: Option<AexConfig>,
    /// MOBI settings.
    #[serde(rename = "envio_mobi")]
    pub mobi: Option<MobiConfig>,
}

impl ProductListing {
    /// Default category for listings that don't set one.
    pub const DEFAULT_CATEGORY: &'static str = "979";

    /// Active, public listing in the default category, without couriers.
    #[must_use]
    pub fn new(
        commerce_product_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        price: u64,
        stock: u64,
    ) -> Self {
        Self {
            commerce_product_id: commerce_product_id.into(),
            category_id: Self::DEFAULT_CATEGORY.to_owned(),
            sale_link: "",
            public: true,
            enabled: true,
            price,
            title: title.into(),
            description: description.into(),
            stock,
            images: Vec::new(),
            aex: None,
            mobi: None,
        }
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = category_id.into();
        self
    }

    /// Sets the image URLs.
    #[must_use]
    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    /// Enables AEX delivery.
    #[must_use]
    pub fn with_aex(mut self, aex: AexConfig) -> Self {
        self.aex = Some(aex);
        self
    }

    /// Enables MOBI delivery.
    #[must_use]
    pub fn with_mobi(mut self, mobi: MobiConfig) -> Self {
        self.mobi = Some(mobi);
        self
    }
}

/// Outcome of a product creation or edit.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductOperation {
    /// Commerce product id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "id")]
    pub commerce_product_id: String,
    /// Pagopar sale link id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "link_venta")]
    pub product_id: String,
    /// Public product page.
    pub url: String,
}

/// Publishes a new sale link.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct CreateProduct<'a>(pub &'a ProductListing);

impl Endpoint for CreateProduct<'_> {
    type Response = ProductOperation;
    const PATH: &'static str = "links-venta/1.1/agregar/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("LINKS-VENTA")
    }
}

/// Updates an existing sale link.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct EditProduct<'a>(pub &'a ProductListing);

impl Endpoint for EditProduct<'_> {
    type Response = ProductOperation;
    const PATH: &'static str = "links-venta/1.1/editar/";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("LINKS-VENTA")
    }
}

/// Publishes `listing` as a new product.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(product = %listing.commerce_product_id))]
pub async fn create_product(app: &Application, listing: &ProductListing) -> Result<ProductOperation> {
    app.send(&CreateProduct(listing)).await
}

/// Replaces an existing product with `listing`.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(product = %listing.commerce_product_id))]
pub async fn edit_product(app: &Application, listing: &ProductListing) -> Result<ProductOperation> {
    app.send(&EditProduct(listing)).await
}

/// What happened to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogType {
    /// A sale; stock goes down.
    SoldOrder,
    /// A cancelled sale; stock goes up.
    CancelledOrder,
    /// Product edited on Pagopar.
    ModifiedProduct,
    /// Product created on Pagopar.
    CreatedProduct,
}

impl LogType {
    /// Numeric code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::SoldOrder => 1,
            Self::CancelledOrder => 2,
            Self::ModifiedProduct => 3,
            Self::CreatedProduct => 4,
        }
    }

    /// Symbolic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SoldOrder => "SOLD_ORDER",
            Self::CancelledOrder => "CANCELLED_ORDER",
            Self::ModifiedProduct => "MODIFIED_PRODUCT",
            Self::CreatedProduct => "CREATED_PRODUCT",
        }
    }

    /// Whether logs of this type carry the full product.
    #[must_use]
    pub const fn carries_product(self) -> bool {
        matches!(self, Self::ModifiedProduct | Self::CreatedProduct)
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::SoldOrder),
            2 => Some(Self::CancelledOrder),
            3 => Some(Self::ModifiedProduct),
            4 => Some(Self::CreatedProduct),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().and_then(Self::from_code),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromStr for LogType {
    type Err = PagoparError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        s.parse::<u64>()
            .ok()
            .and_then(Self::from_code)
            .or_else(|| {
                [Self::SoldOrder, Self::CancelledOrder, Self::ModifiedProduct, Self::CreatedProduct]
                    .into_iter()
                    .find(|kind| kind.name() == s)
            })
            .ok_or_else(|| PagoparError::UnknownLogType(s.to_owned()))
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for LogType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).ok_or_else(|| serde::de::Error::custom(format!("unknown log type {value}")))
    }
}

/// Commerce owner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Owner {
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
}

/// Product category as reported in logs.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductCategory {
    /// Category id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "categoria")]
    pub id: String,
    /// Name.
    #[serde(rename = "descripcion")]
    pub name: String,
    /// Whether weight and dimensions are required.
    #[serde(rename = "medidas")]
    pub needs_dimensions: bool,
    /// Whether the product is physical.
    #[serde(rename = "producto_fisico")]
    pub physical: bool,
    /// Commerce id, informational.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "comercio")]
    pub commerce_id: String,
}

/// Pickup address of a product.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PickupAddress {
    /// Street address.
    #[serde(rename = "direccion")]
    pub address: String,
    /// Coordinates.
    #[serde(rename = "latitud_longitud")]
    pub coordinates: String,
    /// Notes.
    #[serde(rename = "observacion", default)]
    pub note: String,
    /// City id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "ciudad")]
    pub city_id: String,
    /// City name.
    #[serde(rename = "ciudad_descripcion")]
    pub city_name: String,
    /// Pagopar pickup address id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "direccion_retiro")]
    pub pickup_address_id: String,
    /// Courier instructions.
    #[serde(rename = "comentario_pickup", default)]
    pub pickup_note: String,
    /// Pickup window start, as sent.
    #[serde(rename = "hora_inicio")]
    pub start_time: String,
    /// Pickup window end, as sent.
    #[serde(rename = "hora_fin")]
    pub end_time: String,
}

/// MOBI settings as reported in logs.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MobiShipping {
    /// Whether MOBI is enabled.
    #[serde(rename = "activo")]
    pub enabled: bool,
    /// Schedule title.
    #[serde(rename = "titulo")]
    pub title: String,
    /// Pickup windows.
    #[serde(rename = "horarios", default)]
    pub schedules: Vec<MobiSchedule>,
    /// MOBI user id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "mobi_usuario")]
    pub user_id: String,
}

/// Own-fleet price for one city.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CityShipping {
    /// City id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "ciudad")]
    pub city_id: String,
    /// City name.
    #[serde(rename = "descripcion")]
    pub name: String,
    /// Cost.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "costo")]
    pub cost: u64,
    /// Hours until delivery.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "horas_entrega")]
    pub delivery_time: u64,
}

/// Own-fleet delivery zone.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OwnShipping {
    /// Zone name.
    #[serde(rename = "descripcion")]
    pub zone_name: String,
    /// Zone id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "zona_envio")]
    pub zone_id: String,
    /// Cities covered.
    #[serde(rename = "ciudad", default)]
    pub cities: Vec<CityShipping>,
}

/// Full product as reported by creation and modification logs.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Product {
    /// Weight in kilograms.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "peso")]
    pub weight: String,
    /// Length in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "largo")]
    pub length: String,
    /// Width in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "ancho")]
    pub width: String,
    /// Height in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "alto")]
    pub height: String,
    /// Price in guaraníes.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "monto")]
    pub price: u64,
    /// Whether the product is for sale.
    #[serde(rename = "activo")]
    pub enabled: bool,
    /// Image URLs; only filled when images changed.
    #[serde(rename = "imagen", default)]
    pub images: Vec<String>,
    /// Title.
    #[serde(rename = "titulo")]
    pub name: String,
    /// Description.
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Units in stock.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "cantidad")]
    pub stock: u64,
    /// Whether AEX is enabled.
    #[serde(rename = "envio_aex")]
    pub aex_enabled: bool,
    /// Whether local pickup is enabled.
    #[serde(rename = "retiro_local")]
    pub local_pickup_enabled: bool,
    /// Local pickup notes.
    #[serde(rename = "observacion_retiro", default)]
    pub local_pickup_note: Option<String>,
    /// Whether the commerce is linked, informational.
    #[serde(rename = "vinculado")]
    pub linked: bool,
    /// Commerce owner.
    #[serde(rename = "usuario")]
    pub owner: Owner,
    /// Category.
    #[serde(rename = "categoria")]
    pub category: ProductCategory,
    /// Pickup address.
    #[serde(rename = "direccion")]
    pub address: PickupAddress,
    /// MOBI settings.
    #[serde(rename = "envio_mobi")]
    pub mobi: MobiShipping,
    /// Own-fleet zones.
    #[serde(rename = "envio_propio", default)]
    pub own_shipping: Vec<OwnShipping>,
}

/// Stock-only product data.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Inventory {
    /// Units in stock.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "cantidad")]
    pub stock: u64,
}

/// Creation or modification log.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductLog {
    /// Created or modified.
    #[serde(rename = "tipo_aviso")]
    pub log_type: LogType,
    /// Commerce public token.
    #[serde(rename = "token_publico")]
    pub public_token: String,
    /// Log id, echoed in the acknowledgement.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "logs")]
    pub log_id: String,
    /// When the change happened.
    #[serde(rename = "fecha", with = "wire::datetime")]
    pub date: NaiveDateTime,
    /// Units sold in this event.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "cantidad_venta", default)]
    pub quantity_sold: u64,
    /// Pagopar sale link id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "link_venta")]
    pub product_id: String,
    /// Product data.
    #[serde(rename = "datos")]
    pub product: Product,
}

/// Sale or cancellation log.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InventoryLog {
    /// Sold or cancelled.
    #[serde(rename = "tipo_aviso")]
    pub log_type: LogType,
    /// Commerce public token.
    #[serde(rename = "token_publico")]
    pub public_token: String,
    /// Log id, echoed in the acknowledgement.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "logs")]
    pub log_id: String,
    /// When the change happened.
    #[serde(rename = "fecha", with = "wire::datetime")]
    pub date: NaiveDateTime,
    /// Units sold in this event.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "cantidad_venta", default)]
    pub quantity_sold: u64,
    /// Pagopar sale link id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "link_venta")]
    pub product_id: String,
    /// Stock after the event.
    #[serde(rename = "datos")]
    pub inventory: Inventory,
    /// Image synchronization hint.
    #[serde(rename = "imagenes", default)]
    pub images: String,
    /// Commerce id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "comercio", default)]
    pub commerce_id: String,
    /// Parent commerce, for inherited products.
    #[serde_as(as = "Option<wire::NumberOrString>")]
    #[serde(rename = "comercio_padre_heredado")]
    pub parent_commerce_id: Option<String>,
}

/// One decoded change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncLog {
    /// Full product.
    Product(ProductLog),
    /// Stock only.
    Inventory(InventoryLog),
}

impl SyncLog {
    /// Log discriminant.
    #[must_use]
    pub fn log_type(&self) -> LogType {
        match self {
            Self::Product(log) => log.log_type,
            Self::Inventory(log) => log.log_type,
        }
    }

    /// Log id.
    #[must_use]
    pub fn log_id(&self) -> &str {
        match self {
            Self::Product(log) => &log.log_id,
            Self::Inventory(log) => &log.log_id,
        }
    }

    /// Pagopar sale link id.
    #[must_use]
    pub fn product_id(&self) -> &str {
        match self {
            Self::Product(log) => &log.product_id,
            Self::Inventory(log) => &log.product_id,
        }
    }
}

#[derive(Deserialize)]
struct LogPeek {
    #[serde(rename = "tipo_aviso", default)]
    log_type: Value,
}

/// Decodes one change log, choosing its shape from `tipo_aviso`.
///
/// The discriminant may be the numeric code, the code as a string, or the
/// symbolic name (`"SOLD_ORDER"`).
///
/// # Errors
///
/// - [`PagoparError::UnknownLogType`] if `tipo_aviso` is missing or unknown
/// - [`PagoparError::InvalidNotification`] if the log is malformed
pub fn decode_inbound_log(raw: &str) -> Result<SyncLog> {
    let peek: LogPeek = serde_json::from_str(raw).map_err(invalid)?;
    let Some(log_type) = LogType::from_value(&peek.log_type) else {
        let shown = match peek.log_type {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Err(PagoparError::UnknownLogType(shown));
    };

    if log_type.carries_product() {
        serde_json::from_str(raw).map(SyncLog::Product).map_err(invalid)
    } else {
        serde_json::from_str(raw).map(SyncLog::Inventory).map_err(invalid)
    }
}

fn invalid(err: serde_json::Error) -> PagoparError {
    PagoparError::InvalidNotification(err.to_string())
}

/// A synchronization delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Commerce public token.
    pub public_token: String,
    /// Token sent with the delivery.
    pub token: String,
    /// Change logs, in delivery order.
    pub logs: Vec<SyncLog>,
}

#[derive(Deserialize)]
struct RawSyncRequest<'a> {
    #[serde(rename = "token_publico")]
    public_token: String,
    token: String,
    #[serde(rename = "datos", borrow)]
    logs: Vec<&'a RawValue>,
}

/// Decodes a synchronization delivery body.
///
/// # Errors
///
/// Fails on the first log [`decode_inbound_log`] rejects, or with
/// [`PagoparError::InvalidNotification`] if the envelope is malformed.
#[instrument(skip_all, fields(len = raw.len()))]
pub fn parse_synchronization(raw: &str) -> Result<SyncRequest> {
    let request: RawSyncRequest<'_> = serde_json::from_str(raw).map_err(invalid)?;
    let logs = request.logs.iter().map(|log| decode_inbound_log(log.get())).collect::<Result<Vec<_>>>()?;
    debug!(logs = logs.len(), "decoded synchronization");
    Ok(SyncRequest { public_token: request.public_token, token: request.token, logs })
}

/// Acknowledgement of a stock log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryResponse {
    /// Log id being acknowledged.
    #[serde(rename = "logs")]
    pub log_id: String,
    /// Its type.
    #[serde(rename = "tipo_aviso")]
    pub log_type: LogType,
    /// Pagopar sale link id.
    #[serde(rename = "link_venta")]
    pub product_id: String,
    /// Whether the commerce applied it.
    #[serde(rename = "respuesta")]
    pub success: bool,
}

/// Acknowledgement of a product log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductResponse {
    /// Common acknowledgement fields.
    #[serde(flatten)]
    pub inventory: InventoryResponse,
    /// Commerce product id the log was applied to.
    #[serde(rename = "id_producto")]
    pub commerce_product_id: String,
}

/// Acknowledgement of one log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SyncAck {
    /// Stock log.
    Inventory(InventoryResponse),
    /// Product log.
    Product(ProductResponse),
}

impl SyncAck {
    /// Acknowledges `log`.
    ///
    /// Product logs must echo the commerce's own product id; it is ignored
    /// for stock logs.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::InvalidInput`] for a product log without
    /// `commerce_product_id`.
    pub fn for_log(log: &SyncLog, success: bool, commerce_product_id: Option<&str>) -> Result<Self> {
        let inventory = InventoryResponse {
            log_id: log.log_id().to_owned(),
            log_type: log.log_type(),
            product_id: log.product_id().to_owned(),
            success,
        };
        match (log, commerce_product_id) {
            (SyncLog::Product(_), Some(id)) => {
                Ok(Self::Product(ProductResponse { inventory, commerce_product_id: id.to_owned() }))
            }
            (SyncLog::Product(_), None) => Err(PagoparError::InvalidInput(format!(
                "product log {} needs the commerce product id",
                inventory.log_id
            ))),
            (SyncLog::Inventory(_), _) => Ok(Self::Inventory(inventory)),
        }
    }
}

impl From<InventoryResponse> for SyncAck {
    fn from(response: InventoryResponse) -> Self {
        Self::Inventory(response)
    }
}

impl From<ProductResponse> for SyncAck {
    fn from(response: ProductResponse) -> Self {
        Self::Product(response)
    }
}

/// Body answered to a synchronization delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResponse {
    /// Per-log acknowledgements.
    #[serde(rename = "resultado")]
    pub results: Vec<SyncAck>,
    /// Always true.
    #[serde(rename = "respuesta")]
    pub success: bool,
}

impl SyncResponse {
    /// JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::InvalidInput`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| PagoparError::InvalidInput(e.to_string()))
    }
}

/// Builds the acknowledgement for a delivery.
#[must_use]
pub fn respond_synchronization<I, A>(responses: I) -> SyncResponse
where
    I: IntoIterator<Item = A>,
    A: Into<SyncAck>,
{
    SyncResponse { results: responses.into_iter().map(Into::into).collect(), success: true }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn inventory_log(kind: Value) -> Value {
        json!({
            "tipo_aviso": kind,
            "token_publico": "pub",
            "logs": 881,
            "fecha": "2024-05-01 13:45:00",
            "cantidad_venta": 2,
            "link_venta": 77,
            "datos": {"cantidad": "8"},
            "imagenes": "",
            "comercio": 12,
            "comercio_padre_heredado": null
        })
    }

    fn product_log(kind: Value) -> Value {
        json!({
            "tipo_aviso": kind,
            "token_publico": "pub",
            "logs": "882",
            "fecha": "2024-05-01T13:45:00",
            "cantidad_venta": 0,
            "link_venta": "77",
            "datos": {
                "peso": 1, "largo": 20, "ancho": 10, "alto": 10,
                "monto": 80000, "activo": true, "imagen": ["https://img/1.png"],
                "titulo": "Mate", "descripcion": "Mate de calabaza", "cantidad": 10,
                "envio_aex": true, "retiro_local": false, "observacion_retiro": null,
                "vinculado": false,
                "usuario": {"nombre": "Ana", "apellido": "Gómez", "email": "ana@example.com", "celular": "0981"},
                "categoria": {"categoria": 979, "descripcion": "Otros", "medidas": false, "producto_fisico": true, "comercio": 12},
                "direccion": {
                    "direccion": "Palma 123", "latitud_longitud": "-25.28,-57.63", "observacion": "",
                    "ciudad": 1, "ciudad_descripcion": "Asunción", "direccion_retiro": 5,
                    "comentario_pickup": "", "hora_inicio": "08:00", "hora_fin": "17:00"
                },
                "envio_mobi": {"activo": false, "titulo": "", "horarios": [], "mobi_usuario": 0},
                "envio_propio": []
            }
        })
    }

    #[test]
    fn test_log_type_accepts_code_string_and_name() {
        assert_eq!("1".parse::<LogType>().unwrap(), LogType::SoldOrder);
        assert_eq!("CREATED_PRODUCT".parse::<LogType>().unwrap(), LogType::CreatedProduct);
        assert!(matches!("9".parse::<LogType>(), Err(PagoparError::UnknownLogType(_))));
        assert_eq!(serde_json::from_value::<LogType>(json!(3)).unwrap(), LogType::ModifiedProduct);
        assert_eq!(serde_json::to_value(LogType::CancelledOrder).unwrap(), json!(2));
    }

    #[test]
    fn test_decode_inventory_log() {
        for kind in [json!(1), json!("2"), json!("SOLD_ORDER")] {
            let raw = inventory_log(kind).to_string();
            let SyncLog::Inventory(log) = decode_inbound_log(&raw).unwrap() else {
                panic!("expected inventory log");
            };
            assert_eq!(log.inventory.stock, 8);
            assert_eq!(log.log_id, "881");
            assert_eq!(log.product_id, "77");
            assert_eq!(log.commerce_id, "12");
            assert!(log.parent_commerce_id.is_none());
        }
    }

    #[test]
    fn test_decode_product_log() {
        let raw = product_log(json!("CREATED_PRODUCT")).to_string();
        let log = decode_inbound_log(&raw).unwrap();
        assert_eq!(log.log_type(), LogType::CreatedProduct);
        let SyncLog::Product(log) = log else {
            panic!("expected product log");
        };
        assert_eq!(log.product.price, 80000);
        assert_eq!(log.product.category.id, "979");
        assert_eq!(log.product.address.pickup_address_id, "5");
        assert_eq!(log.date, crate::wire::parse_datetime("2024-05-01 13:45:00").unwrap());
    }

    #[test]
    fn test_decode_unknown_log_type() {
        let raw = inventory_log(json!(7)).to_string();
        assert!(matches!(decode_inbound_log(&raw), Err(PagoparError::UnknownLogType(ref t)) if t == "7"));

        let raw = inventory_log(json!("RESTOCKED")).to_string();
        assert!(matches!(decode_inbound_log(&raw), Err(PagoparError::UnknownLogType(ref t)) if t == "RESTOCKED"));
    }

    #[test]
    fn test_decode_malformed_log() {
        assert!(matches!(decode_inbound_log("not json"), Err(PagoparError::InvalidNotification(_))));
        let mut log = inventory_log(json!(1));
        log["datos"] = json!({});
        assert!(matches!(decode_inbound_log(&log.to_string()), Err(PagoparError::InvalidNotification(_))));
    }

    #[test]
    fn test_parse_synchronization_keeps_order() {
        let body = json!({
            "token_publico": "pub",
            "token": "t",
            "datos": [inventory_log(json!(1)), product_log(json!(3)), inventory_log(json!(2))]
        });
        let request = parse_synchronization(&body.to_string()).unwrap();
        let kinds: Vec<_> = request.logs.iter().map(SyncLog::log_type).collect();
        assert_eq!(kinds, [LogType::SoldOrder, LogType::ModifiedProduct, LogType::CancelledOrder]);
        assert_eq!(request.token, "t");
    }

    #[test]
    fn test_respond_synchronization_shape() {
        let sold = decode_inbound_log(&inventory_log(json!(1)).to_string()).unwrap();
        let created = decode_inbound_log(&product_log(json!(4)).to_string()).unwrap();
        let response = respond_synchronization([
            SyncAck::for_log(&sold, true, None).unwrap(),
            SyncAck::for_log(&created, true, Some("sku-1")).unwrap(),
        ]);

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "resultado": [
                    {"logs": "881", "tipo_aviso": 1, "link_venta": "77", "respuesta": true},
                    {"logs": "882", "tipo_aviso": 4, "link_venta": "77", "respuesta": true, "id_producto": "sku-1"}
                ],
                "respuesta": true
            })
        );
        let bytes = response.to_json().unwrap();
        assert!(bytes.starts_with(b"{\"resultado\""));
    }

    #[test]
    fn test_product_ack_requires_commerce_id() {
        let created = decode_inbound_log(&product_log(json!(4)).to_string()).unwrap();
        let err = SyncAck::for_log(&created, false, None).unwrap_err();
        assert!(matches!(err, PagoparError::InvalidInput(ref msg) if msg.contains("882")));

        let sold = decode_inbound_log(&inventory_log(json!(1)).to_string()).unwrap();
        let ack = SyncAck::for_log(&sold, true, Some("ignored")).unwrap();
        assert!(matches!(ack, SyncAck::Inventory(_)));
    }

    #[test]
    fn test_empty_acknowledgement() {
        let response = respond_synchronization(Vec::<SyncAck>::new());
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"resultado": [], "respuesta": true}));
    }

    #[test]
    fn test_listing_payload() {
        let listing = ProductListing::new("sku-1", "Mate", "Mate de calabaza", 80_000, 10).with_images(["a.png"]);
        let payload = Value::Object(crate::transport::to_payload(&CreateProduct(&listing)).unwrap());
        assert_eq!(payload["categoria"], json!("979"));
        assert_eq!(payload["link_venta"], json!(""));
        assert_eq!(payload["link_publico"], json!(true));
        assert_eq!(payload["envio_aex"], Value::Null);
        assert_eq!(payload["imagen"], json!(["a.png"]));
        assert_eq!(CreateProduct(&listing).seed(), "LINKS-VENTA");
    }
}
