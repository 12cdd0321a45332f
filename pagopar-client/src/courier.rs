//! Freight quotes and shipping selection.
//!
//! [`calculate_freight`] returns every item with the shipping methods the
//! service can offer for it: pickup, the commerce's own fleet, and quotes
//! from the AEX and MOBI couriers. The buyer's choice is committed locally
//! with [`select_shipping_method`], which checks the choice against the
//! quote and fixes the shipping cost before the items go back to
//! [`start_transaction`](crate::checkout::start_transaction).
//!
//! Selection never touches the network.

use std::{borrow::Cow, fmt};

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use tracing::instrument;

use crate::{
    checkout::{Buyer, Item, OrderType, PaymentType},
    error::{PagoparError, Result},
    registry::Application,
    transport::{CredentialFields, Endpoint},
    wire,
};

/// Delivery method tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShippingMethod {
    /// AEX courier.
    #[serde(rename = "aex")]
    Aex,
    /// MOBI courier.
    #[serde(rename = "mobi")]
    Mobi,
    /// The commerce's own delivery.
    #[serde(rename = "propio")]
    OwnDelivery,
    /// In-store pickup.
    #[serde(rename = "retiro")]
    Pickup,
}

impl ShippingMethod {
    /// Wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aex => "aex",
            Self::Mobi => "mobi",
            Self::OwnDelivery => "propio",
            Self::Pickup => "retiro",
        }
    }

    /// Whether this method is priced by a courier quote.
    #[must_use]
    pub const fn is_courier(self) -> bool {
        matches!(self, Self::Aex | Self::Mobi)
    }
}

impl fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-store pickup settings.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupMethod {
    /// Pickup instructions.
    #[serde(rename = "observacion", default)]
    pub notes: String,
    /// Cost.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "costo", default)]
    pub cost: u64,
    /// Hours until ready.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "tiempo_entrega", default)]
    pub delivery_time: u64,
}

/// Own-fleet price for one destination.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRule {
    /// Destination city id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "destino")]
    pub destination_id: String,
    /// Price.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "precio")]
    pub price: u64,
    /// Hours until delivery.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "tiempo_entrega")]
    pub delivery_time: u64,
}

/// Own-fleet delivery settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMethod {
    /// Per-destination rules.
    #[serde(rename = "listado", default)]
    pub rules: Vec<DeliveryRule>,
}

/// One courier quote.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierOption {
    /// Option id, e.g. `10-0`.
    #[serde_as(as = "wire::NumberOrString")]
    pub id: String,
    /// Service description.
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Quoted cost.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "costo")]
    pub cost: u64,
    /// Estimated delivery time, as text.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "tiempo_entrega")]
    pub delivery_time: String,
}

/// Quotes from one courier (AEX or MOBI).
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierMethod {
    /// Chosen option id; unset until a selection is made.
    #[serde_as(as = "Option<wire::NumberOrString>")]
    #[serde(rename = "id")]
    pub selected: Option<String>,
    /// Quoted options.
    #[serde(rename = "opciones", default)]
    pub options: Vec<CourierOption>,
    /// Estimated delivery time of the chosen option.
    #[serde_as(as = "Option<wire::NumberOrString>")]
    #[serde(rename = "tiempo_entrega")]
    pub delivery_time: Option<String>,
    /// Cost reported by the service.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "costo", default)]
    pub cost: u64,
}

impl CourierMethod {
    /// Looks up a quoted option.
    #[must_use]
    pub fn option(&self, id: &str) -> Option<&CourierOption> {
        self.options.iter().find(|option| option.id == id)
    }
}

/// Shipping methods offered for an item. Absent methods are not offered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingOptions {
    /// In-store pickup.
    #[serde(rename = "metodo_retiro", default)]
    pub pickup: Option<PickupMethod>,
    /// Own-fleet delivery.
    #[serde(rename = "metodo_propio", default)]
    pub own_delivery: Option<DeliveryMethod>,
    /// MOBI quotes.
    #[serde(rename = "metodo_mobi", default)]
    pub mobi: Option<CourierMethod>,
    /// AEX quotes.
    #[serde(rename = "metodo_aex", default)]
    pub aex: Option<CourierMethod>,
}

impl ShippingOptions {
    /// Pickup-only options.
    #[must_use]
    pub fn pickup(notes: impl Into<String>) -> Self {
        Self {
            pickup: Some(PickupMethod { notes: notes.into(), ..PickupMethod::default() }),
            ..Self::default()
        }
    }

    fn clear_courier_choices(&mut self) {
        for courier in [self.aex.as_mut(), self.mobi.as_mut()].into_iter().flatten() {
            courier.selected = None;
        }
    }

    fn courier_mut(&mut self, method: ShippingMethod) -> Option<&mut CourierMethod> {
        match method {
            ShippingMethod::Aex => self.aex.as_mut(),
            ShippingMethod::Mobi => self.mobi.as_mut(),
            ShippingMethod::OwnDelivery | ShippingMethod::Pickup => None,
        }
    }
}

/// Shipping options plus the committed choice.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSelection {
    /// Options the choice was made from.
    #[serde(flatten)]
    pub options: ShippingOptions,
    /// Commerce commission on the shipping.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "comercio_comision", default)]
    pub commerce_commission: u64,
    /// Cost committed for this item.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "costo_envio")]
    pub shipping_cost: u64,
    /// Chosen method.
    #[serde(rename = "envio_seleccionado")]
    pub method: ShippingMethod,
}

/// The `opciones_envio` field of an item: offered options, or a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ShippingState {
    /// Nothing chosen yet.
    Offered(ShippingOptions),
    /// A method was chosen.
    Selected(ShippingSelection),
}

impl Default for ShippingState {
    fn default() -> Self {
        Self::Offered(ShippingOptions::default())
    }
}

impl ShippingState {
    /// Offered options, whether or not a choice was made.
    #[must_use]
    pub fn options(&self) -> &ShippingOptions {
        match self {
            Self::Offered(options) => options,
            Self::Selected(selection) => &selection.options,
        }
    }

    /// The committed choice, if any.
    #[must_use]
    pub fn selection(&self) -> Option<&ShippingSelection> {
        match self {
            Self::Offered(_) => None,
            Self::Selected(selection) => Some(selection),
        }
    }
}

#[serde_as]
#[derive(Deserialize)]
struct ShippingStateWire {
    #[serde(flatten)]
    options: ShippingOptions,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(rename = "comercio_comision")]
    commerce_commission: Option<u64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(rename = "costo_envio")]
    shipping_cost: Option<u64>,
    #[serde(rename = "envio_seleccionado", default)]
    method: Option<ShippingMethod>,
}

impl<'de> Deserialize<'de> for ShippingState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = ShippingStateWire::deserialize(deserializer)?;
        let Some(method) = wire.method else {
            return Ok(Self::Offered(wire.options));
        };
        let shipping_cost = wire
            .shipping_cost
            .ok_or_else(|| serde::de::Error::missing_field("costo_envio"))?;
        Ok(Self::Selected(ShippingSelection {
            options: wire.options,
            commerce_commission: wire.commerce_commission.unwrap_or_default(),
            shipping_cost,
            method,
        }))
    }
}

/// Item with physical dimensions and shipping options.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalItem {
    /// Product, seller and courier fields.
    #[serde(flatten)]
    pub item: Item,
    /// Weight in kilograms.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "peso", default)]
    pub weight: String,
    /// Length in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "largo", default)]
    pub length: String,
    /// Width in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "ancho", default)]
    pub width: String,
    /// Height in centimetres.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "alto", default)]
    pub height: String,
    /// Offered options or committed selection.
    #[serde(rename = "opciones_envio", default)]
    pub shipping: ShippingState,
}

impl PhysicalItem {
    /// Item without dimensions; the service estimates from its category.
    #[must_use]
    pub fn new(item: Item, options: ShippingOptions) -> Self {
        Self {
            item,
            weight: String::new(),
            length: String::new(),
            width: String::new(),
            height: String::new(),
            shipping: ShippingState::Offered(options),
        }
    }

    /// Sets weight (kg) and dimensions (cm).
    #[must_use]
    pub fn with_dimensions(
        mut self,
        weight: impl Into<String>,
        length: impl Into<String>,
        width: impl Into<String>,
        height: impl Into<String>,
    ) -> Self {
        self.weight = weight.into();
        self.length = length.into();
        self.width = width.into();
        self.height = height.into();
        self
    }

    /// Committed shipping cost; zero while nothing is selected.
    #[must_use]
    pub fn shipping_cost(&self) -> u64 {
        self.shipping.selection().map_or(0, |selection| selection.shipping_cost)
    }
}

/// Commits a shipping choice for `item`.
///
/// For AEX and MOBI the option must be one of the quoted ones: its cost
/// becomes the committed cost and its id is recorded as the courier's
/// selected option. Pickup and own delivery commit a cost of zero and
/// ignore `option_id`; their real price is whatever the service already
/// computed.
///
/// Selecting again replaces the previous choice, including any courier
/// option recorded by it. On error `item` is left unchanged.
///
/// # Errors
///
/// - [`PagoparError::MissingShippingMethod`] if the courier was not offered
/// - [`PagoparError::InvalidShippingOption`] if `option_id` was not quoted
///
/// # Examples
///
/// ```
/// use pagopar_client::{
///     checkout::{BasicItem, Item},
///     courier::{PhysicalItem, ShippingMethod, ShippingOptions, select_shipping_method},
/// };
///
/// let item = Item::new(BasicItem::new(1, "Mate", 1, 80_000), "public-key");
/// let mut item = PhysicalItem::new(item, ShippingOptions::pickup("Local central"));
///
/// select_shipping_method(&mut item, ShippingMethod::Pickup, None).unwrap();
/// assert_eq!(item.shipping_cost(), 0);
/// ```
pub fn select_shipping_method(item: &mut PhysicalItem, method: ShippingMethod, option_id: Option<&str>) -> Result<()> {
    let (options, commerce_commission) = match &item.shipping {
        ShippingState::Offered(options) => (options, 0),
        ShippingState::Selected(selection) => (&selection.options, selection.commerce_commission),
    };
    let mut options = options.clone();
    options.clear_courier_choices();

    let shipping_cost = if method.is_courier() {
        let courier = options.courier_mut(method).ok_or(PagoparError::MissingShippingMethod(method))?;
        let option = option_id.and_then(|id| courier.option(id)).ok_or_else(|| PagoparError::InvalidShippingOption {
            method,
            option_id: option_id.unwrap_or_default().to_owned(),
        })?;
        let (id, cost) = (option.id.clone(), option.cost);
        courier.selected = Some(id);
        cost
    } else {
        0
    };

    item.shipping = ShippingState::Selected(ShippingSelection { options, commerce_commission, shipping_cost, method });
    Ok(())
}

/// Sum of committed shipping costs across an order.
#[must_use]
pub fn total_shipping_cost(items: &[PhysicalItem]) -> u64 {
    items.iter().map(PhysicalItem::shipping_cost).sum()
}

/// Neighbourhood within a city.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Neighborhood {
    /// Neighbourhood id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "barrio")]
    pub id: String,
    /// Name.
    #[serde(rename = "descripcion")]
    pub name: String,
}

/// City served by the couriers.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct City {
    /// City id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "ciudad")]
    pub id: String,
    /// Name.
    #[serde(rename = "descripcion")]
    pub name: String,
    /// Neighbourhoods, only filled by [`get_neighborhoods`].
    #[serde(rename = "barrios", default)]
    pub neighborhoods: Vec<Neighborhood>,
}

/// Freight category, an average size and weight profile.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    /// Category id.
    #[serde_as(as = "wire::NumberOrString")]
    #[serde(rename = "categoria")]
    pub id: String,
    /// Short name.
    #[serde(rename = "descripcion")]
    pub name: String,
    /// Full breadcrumb.
    #[serde(rename = "descripcion_completa")]
    pub description: String,
    /// Whether dimensions are needed on top of the category.
    #[serde(rename = "medidas")]
    pub needs_dimensions: bool,
    /// Whether items in it are physical.
    #[serde(rename = "producto_fisico")]
    pub physical: bool,
    /// Whether couriers deliver it.
    #[serde(rename = "envio_aex")]
    pub courier_shipping: bool,
}

/// Lists cities.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Cities;

impl Endpoint for Cities {
    type Response = Vec<City>;
    const PATH: &'static str = "ciudades/1.1/traer";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("CIUDADES")
    }
}

/// Lists cities with their neighbourhoods, grouped in nested lists.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Neighborhoods;

impl Endpoint for Neighborhoods {
    type Response = Vec<Vec<City>>;
    const PATH: &'static str = "ciudades/1.1/traer-barrios";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("CIUDADES")
    }
}

/// Lists freight categories.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Categories;

impl Endpoint for Categories {
    type Response = Vec<Category>;
    const PATH: &'static str = "categorias/2.0/traer";
    const CREDENTIALS: CredentialFields = CredentialFields::TOKEN_PUBLICO;

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("CATEGORIAS")
    }
}

/// Quote returned by [`CalculateFreight`]. Only the items are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FreightQuote {
    /// Items with every offered method filled in.
    #[serde(rename = "compras_items")]
    pub items: Vec<PhysicalItem>,
}

/// Requests shipping quotes for an order.
#[derive(Debug, Clone, Serialize)]
pub struct CalculateFreight {
    #[serde(rename = "monto_total")]
    amount: u64,
    #[serde(rename = "tipo_pedido")]
    order_type: OrderType,
    #[serde(rename = "fecha_maxima_pago", with = "wire::datetime")]
    max_payment_date: NaiveDateTime,
    #[serde(rename = "id_pedido_comercio")]
    commerce_order_id: String,
    #[serde(rename = "descripcion_resumen")]
    description: String,
    #[serde(rename = "forma_pago", skip_serializing_if = "Option::is_none")]
    payment_type: Option<PaymentType>,
    #[serde(rename = "comprador")]
    buyer: Buyer,
    #[serde(rename = "compras_items")]
    items: Vec<PhysicalItem>,
}

impl CalculateFreight {
    /// Builds the quote request.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::InvalidInput`] if `items` is empty.
    pub fn new(
        commerce_order_id: impl Into<String>,
        items: Vec<PhysicalItem>,
        amount: u64,
        max_payment_date: NaiveDateTime,
        buyer: Buyer,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(PagoparError::InvalidInput("empty item list".to_owned()));
        }
        Ok(Self {
            amount,
            order_type: OrderType::Simple,
            max_payment_date,
            commerce_order_id: commerce_order_id.into(),
            description: String::new(),
            payment_type: None,
            buyer,
            items,
        })
    }

    /// Sets the intended payment method.
    #[must_use]
    pub fn with_payment_type(mut self, payment_type: PaymentType) -> Self {
        self.payment_type = Some(payment_type);
        self
    }

    /// Sets the order summary.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Endpoint for CalculateFreight {
    type Response = FreightQuote;
    const PATH: &'static str = "calcular-flete/2.0/traer";

    fn seed(&self) -> Cow<'_, str> {
        Cow::Borrowed("CALCULAR-FLETE")
    }
}

/// Cities served by the couriers.
///
/// # Errors
///
/// Transport errors.
pub async fn get_cities(app: &Application) -> Result<Vec<City>> {
    app.send(&Cities).await
}

/// Cities with their neighbourhoods, flattened into one list.
///
/// # Errors
///
/// Transport errors.
pub async fn get_neighborhoods(app: &Application) -> Result<Vec<City>> {
    Ok(app.send(&Neighborhoods).await?.into_iter().flatten().collect())
}

/// Freight categories.
///
/// # Errors
///
/// Transport errors.
pub async fn get_categories(app: &Application) -> Result<Vec<Category>> {
    app.send(&Categories).await
}

/// Quotes shipping for every item of an order.
///
/// # Errors
///
/// Transport errors.
#[instrument(skip_all, fields(order = %request.commerce_order_id, items = request.items.len()))]
pub async fn calculate_freight(app: &Application, request: &CalculateFreight) -> Result<Vec<PhysicalItem>> {
    Ok(app.send(request).await?.items)
}
