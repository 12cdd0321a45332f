//! End-to-end flows: freight quote, shipping selection, transaction start,
//! product publishing and recurring card payments.

use std::sync::Arc;

use httpmock::prelude::*;
use pagopar_client::{
    Application, ApplicationConfig, HttpConfig, PagoparError, Registry,
    checkout::{self, BasicItem, Buyer, DocumentType, Item, OrderType, PaymentType, StartTransaction},
    courier::{self, CalculateFreight, PhysicalItem, ShippingMethod, ShippingOptions},
    recurring::{self, AddCard, CardProvider, CardType},
    signer,
    sync::{self, ProductListing, SyncAck},
};
use serde_json::json;

const PRIVATE: &str = "private-key";
const PUBLIC: &str = "public-key";

fn app_for(server: &MockServer) -> Arc<Application> {
    let http = HttpConfig {
        base_url: format!("{}/api/", server.base_url()),
        allow_insecure_http: true,
        ..HttpConfig::default()
    };
    Registry::new()
        .initialize(ApplicationConfig::new("shop").with_credentials(PRIVATE, PUBLIC).with_http(http))
        .unwrap()
}

fn buyer() -> Buyer {
    Buyer::new("Ana Gómez", "ana@example.com", "+595981000000", "1234567", DocumentType::Ci).with_address(
        "1",
        "Palma 123",
        "",
        "-25.28,-57.63",
    )
}

fn deadline() -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2025, 1, 31).unwrap().and_hms_opt(23, 59, 0).unwrap()
}

fn quoted_item() -> serde_json::Value {
    json!({
        "cantidad": 1, "descripcion": "Mate", "nombre": "Mate", "id_producto": 7, "precio_total": 80000,
        "url_imagen": "", "categoria": "909", "ciudad": "1", "public_key": PUBLIC,
        "vendedor_direccion": "", "vendedor_direccion_referencia": "", "vendedor_direccion_coordenadas": "",
        "vendedor_telefono": "", "peso": "1", "largo": "", "ancho": "", "alto": "",
        "opciones_envio": {
            "metodo_retiro": {"observacion": "Local", "costo": 0, "tiempo_entrega": 0},
            "metodo_propio": null,
            "metodo_mobi": null,
            "metodo_aex": {
                "id": null,
                "opciones": [
                    {"id": "10-0", "descripcion": "Estándar", "costo": 15000, "tiempo_entrega": "48"},
                    {"id": "10-1", "descripcion": "Express", "costo": 20000, "tiempo_entrega": "24"}
                ],
                "tiempo_entrega": null,
                "costo": 0
            }
        }
    })
}

#[tokio::test]
async fn test_freight_quote_then_selection() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/calcular-flete/2.0/traer");
        then.status(200).json_body(json!({
            "respuesta": true,
            "resultado": {"compras_items": [quoted_item()], "monto_total": 80000}
        }));
    });
    let app = app_for(&server);

    let item = PhysicalItem::new(Item::new(BasicItem::new(7, "Mate", 1, 80_000), PUBLIC), ShippingOptions::pickup("Local"));
    let request = CalculateFreight::new("order-1", vec![item], 80_000, deadline(), buyer()).unwrap();
    let mut items = courier::calculate_freight(&app, &request).await.unwrap();
    mock.assert();

    let mut aex = items[0].clone();
    courier::select_shipping_method(&mut aex, ShippingMethod::Aex, Some("10-0")).unwrap();
    assert_eq!(aex.shipping_cost(), 15000);

    let err = courier::select_shipping_method(&mut items[0], ShippingMethod::Mobi, Some("10-0")).unwrap_err();
    assert!(matches!(err, PagoparError::MissingShippingMethod(ShippingMethod::Mobi)));

    courier::select_shipping_method(&mut items[0], ShippingMethod::Aex, Some("10-1")).unwrap();
    assert_eq!(courier::total_shipping_cost(&items), 20000);

    let selected = serde_json::to_value(&items[0]).unwrap();
    assert_eq!(selected["opciones_envio"]["envio_seleccionado"], json!("aex"));
    assert_eq!(selected["opciones_envio"]["costo_envio"], json!(20000));
}

#[tokio::test]
async fn test_start_transaction_signs_amount() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/comercios/2.0/iniciar-transaccion").json_body(json!({
            "monto_total": 80000,
            "tipo_pedido": "VENTA-COMERCIO",
            "fecha_maxima_pago": "2025-01-31 23:59:00",
            "id_pedido_comercio": "order-1",
            "descripcion_resumen": "",
            "forma_pago": 9,
            "comprador": {
                "nombre": "Ana Gómez", "email": "ana@example.com", "telefono": "+595981000000",
                "documento": "1234567", "tipo_documento": "CI", "ruc": "", "razon_social": "",
                "ciudad": "1", "direccion": "Palma 123", "direccion_referencia": "",
                "coordenadas": "-25.28,-57.63"
            },
            "compras_items": [{
                "cantidad": 1, "descripcion": "Mate", "url_imagen": "", "nombre": "Mate",
                "id_producto": 7, "precio_total": 80000, "categoria": "909", "ciudad": "1",
                "vendedor_direccion": "", "vendedor_direccion_referencia": "",
                "vendedor_direccion_coordenadas": "", "vendedor_telefono": "", "public_key": PUBLIC
            }],
            "token": signer::sign("80000", PRIVATE),
            "public_key": PUBLIC
        }));
        then.status(200).json_body(json!({"respuesta": true, "resultado": [{"data": "hash-1", "pedido": 1234}]}));
    });
    let app = app_for(&server);

    let item = Item::new(BasicItem::new(7, "Mate", 1, 80_000), PUBLIC);
    let request = StartTransaction::new("order-1", vec![item], 80_000, PaymentType::Bancard, deadline(), buyer()).unwrap();
    assert_eq!(request.order_type(), OrderType::Simple);

    let transaction = checkout::start_transaction(&app, &request).await.unwrap();

    mock.assert();
    assert_eq!(transaction.order_hash, "hash-1");
    assert_eq!(transaction.order_number, "1234");
    assert_eq!(
        checkout::checkout_url(&transaction.order_hash, Some(PaymentType::Bancard)),
        "https://www.pagopar.com/pagos/hash-1?forma_pago=9"
    );
}

#[test]
fn test_split_billing_and_empty_items() {
    let ours = Item::new(BasicItem::new(1, "Mate", 1, 80_000), "seller-a");
    let theirs = Item::new(BasicItem::new(2, "Termo", 1, 120_000), "seller-b");
    let request =
        StartTransaction::new("order-2", vec![ours, theirs], 200_000, PaymentType::Bancard, deadline(), buyer()).unwrap();
    assert_eq!(request.order_type(), OrderType::SplitBilling);

    let err = StartTransaction::new("order-3", Vec::new(), 0, PaymentType::Bancard, deadline(), buyer()).unwrap_err();
    assert!(matches!(err, PagoparError::InvalidInput(_)));
}

#[tokio::test]
async fn test_create_product_uses_public_token_field() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/links-venta/1.1/agregar/").json_body(json!({
            "id_producto": "sku-1",
            "categoria": "979",
            "link_venta": "",
            "link_publico": true,
            "activo": true,
            "monto": 80000,
            "titulo": "Mate",
            "descripcion": "Mate de calabaza",
            "cantidad": 10,
            "imagen": [],
            "envio_aex": null,
            "envio_mobi": null,
            "token": signer::sign("LINKS-VENTA", PRIVATE),
            "token_publico": PUBLIC
        }));
        then.status(200).json_body(json!({
            "respuesta": true,
            "resultado": {"id": "sku-1", "link_venta": 77, "url": "https://www.pagopar.com/links/77"}
        }));
    });
    let app = app_for(&server);

    let listing = ProductListing::new("sku-1", "Mate", "Mate de calabaza", 80_000, 10);
    let created = sync::create_product(&app, &listing).await.unwrap();

    mock.assert();
    assert_eq!(created.product_id, "77");
}

#[test]
fn test_synchronization_round_trip() {
    let body = json!({
        "token_publico": PUBLIC,
        "token": "t",
        "datos": [{
            "tipo_aviso": "1", "token_publico": PUBLIC, "logs": "9", "fecha": "2024-05-01 13:45:00",
            "cantidad_venta": 1, "link_venta": "77", "datos": {"cantidad": 9},
            "imagenes": "", "comercio": "12", "comercio_padre_heredado": null
        }]
    });
    let request = sync::parse_synchronization(&body.to_string()).unwrap();
    let acks: Vec<SyncAck> =
        request.logs.iter().map(|log| SyncAck::for_log(log, true, None)).collect::<Result<_, _>>().unwrap();

    let response = serde_json::to_value(sync::respond_synchronization(acks)).unwrap();
    assert_eq!(
        response,
        json!({"resultado": [{"logs": "9", "tipo_aviso": 1, "link_venta": "77", "respuesta": true}], "respuesta": true})
    );
}

#[tokio::test]
async fn test_card_registration_and_listing() {
    let server = MockServer::start();
    let add = server.mock(|when, then| {
        when.method(POST).path("/api/pago-recurrente/3.0/agregar-tarjeta/").json_body(json!({
            "url": "https://shop/cards",
            "proveedor": "Bancard",
            "identificador": 5,
            "token": signer::sign("", PRIVATE),
            "token_publico": PUBLIC
        }));
        then.status(200).json_body(json!({"respuesta": true, "resultado": "alias-1"}));
    });
    let list = server.mock(|when, then| {
        when.method(POST).path("/api/pago-recurrente/3.0/listar-tarjeta/");
        then.status(200).json_body(json!({
            "respuesta": true,
            "resultado": [{
                "alias_token": "tmp-1", "marca": "Visa", "tarjeta": 3, "emisor": "Banco",
                "tarjeta_numero": "4111********1111", "tipo_tarjeta": "Débito",
                "url_logo": "https://logo", "proveedor": "Bancard"
            }]
        }));
    });
    let pay = server.mock(|when, then| {
        when.method(POST).path("/api/pago-recurrente/3.0/pagar/");
        then.status(200).json_body(json!({"respuesta": true, "resultado": ""}));
    });
    let app = app_for(&server);

    let alias = recurring::add_card(&app, &AddCard::new(5, "https://shop/cards", CardProvider::Bancard)).await.unwrap();
    assert_eq!(alias, "alias-1");

    let cards = recurring::get_cards(&app, 5).await.unwrap();
    assert_eq!(cards[0].card_type, CardType::Debit);

    recurring::pay(&app, 5, &cards[0].alias_token, "hash-1").await.unwrap();

    add.assert();
    list.assert();
    pay.assert();
}
