mod common;

use common::{checkout_request, TestApp};
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Statement};
use storefront_api::{
    auth::Role,
    entities::{invoice, order, order_detail},
    errors::ServiceError,
    services::carts::CartService,
    services::orders::OrderService,
};
use uuid::Uuid;

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn place_order_creates_all_three_records_and_clears_cart() {
    let app = TestApp::new().await;
    let user_id = app.create_user(Role::Customer).await;
    let actor = app.customer_actor(user_id);

    let cart_service = CartService::new(app.db.clone(), app.event_sender.clone());
    cart_service
        .set_item(user_id, Uuid::new_v4(), "M".to_string(), 2)
        .await
        .expect("seed cart");

    let order_service = OrderService::new(app.db.clone(), Some(app.event_sender.clone()));
    let placed = order_service
        .place_order(actor, checkout_request())
        .await
        .expect("checkout should succeed");

    // Order exists and awaits payment
    let order = order::Entity::find_by_id(placed.order_id)
        .one(&*app.db)
        .await
        .unwrap()
        .expect("order row");
    assert_eq!(order.status, "Menunggu Pembayaran");
    assert!(!order.is_paid);
    assert_eq!(order.user_id, user_id);

    // Detail references the order and froze the line snapshot
    let detail = order_detail::Entity::find_by_id(placed.order_detail_id)
        .one(&*app.db)
        .await
        .unwrap()
        .expect("order detail row");
    assert_eq!(detail.order_id, placed.order_id);
    let items = detail.line_items().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].size, "M");

    // Invoice references the detail, pending
    let invoice = invoice::Entity::find_by_id(placed.invoice_id)
        .one(&*app.db)
        .await
        .unwrap()
        .expect("invoice row");
    assert_eq!(invoice.order_detail_id, placed.order_detail_id);
    assert_eq!(invoice.payment_status, "Pending");
    assert!(invoice.payment_date.is_none());

    // Cart is empty afterwards
    let cart = cart_service.get_cart(user_id).await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn failed_detail_insert_compensates_the_order() {
    let app = TestApp::new().await;
    let user_id = app.create_user(Role::Customer).await;
    let actor = app.customer_actor(user_id);

    let cart_service = CartService::new(app.db.clone(), app.event_sender.clone());
    let product = Uuid::new_v4();
    cart_service
        .set_item(user_id, product, "M".to_string(), 2)
        .await
        .unwrap();
    let cart_before = cart_service.get_cart(user_id).await.unwrap();

    // Force step 2 to fail
    app.db
        .execute(Statement::from_string(
            app.db.get_database_backend(),
            "DROP TABLE order_details;".to_string(),
        ))
        .await
        .unwrap();

    let order_service = OrderService::new(app.db.clone(), Some(app.event_sender.clone()));
    let result = order_service.place_order(actor, checkout_request()).await;
    assert!(matches!(result, Err(ServiceError::DatabaseError(_))));

    // The order from this attempt was rolled back
    let orders = order::Entity::find().count(&*app.db).await.unwrap();
    assert_eq!(orders, 0);
    let invoices = invoice::Entity::find().count(&*app.db).await.unwrap();
    assert_eq!(invoices, 0);

    // Cart untouched
    let cart_after = cart_service.get_cart(user_id).await.unwrap();
    assert_eq!(cart_after, cart_before);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn failed_invoice_insert_compensates_detail_and_order() {
    let app = TestApp::new().await;
    let user_id = app.create_user(Role::Customer).await;
    let actor = app.customer_actor(user_id);

    let cart_service = CartService::new(app.db.clone(), app.event_sender.clone());
    cart_service
        .set_item(user_id, Uuid::new_v4(), "L".to_string(), 1)
        .await
        .unwrap();
    let cart_before = cart_service.get_cart(user_id).await.unwrap();

    // Force step 3 to fail
    app.db
        .execute(Statement::from_string(
            app.db.get_database_backend(),
            "DROP TABLE invoices;".to_string(),
        ))
        .await
        .unwrap();

    let order_service = OrderService::new(app.db.clone(), Some(app.event_sender.clone()));
    let result = order_service.place_order(actor, checkout_request()).await;
    assert!(result.is_err());

    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
    assert_eq!(
        order_detail::Entity::find().count(&*app.db).await.unwrap(),
        0
    );

    let cart_after = cart_service.get_cart(user_id).await.unwrap();
    assert_eq!(cart_after, cart_before);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn unknown_user_fails_before_any_write() {
    let app = TestApp::new().await;
    let actor = app.customer_actor(Uuid::new_v4());

    let order_service = OrderService::new(app.db.clone(), Some(app.event_sender.clone()));
    let result = order_service.place_order(actor, checkout_request()).await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));

    assert_eq!(order::Entity::find().count(&*app.db).await.unwrap(), 0);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn joined_view_tolerates_missing_detail() {
    let app = TestApp::new().await;
    let user_id = app.create_user(Role::Customer).await;
    let actor = app.customer_actor(user_id);

    let order_service = OrderService::new(app.db.clone(), Some(app.event_sender.clone()));
    let placed = order_service
        .place_order(actor, checkout_request())
        .await
        .unwrap();

    // Simulate the visibility window where the detail row is not there yet
    order_detail::Entity::delete_by_id(placed.order_detail_id)
        .exec(&*app.db)
        .await
        .unwrap();

    let view = order_service
        .get_order(actor, placed.order_id)
        .await
        .expect("order readable without detail");
    assert!(view.detail.is_none());
    assert!(view.invoice.is_none());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn customers_cannot_read_each_others_orders() {
    let app = TestApp::new().await;
    let owner = app.create_user(Role::Customer).await;
    let other = app.create_user(Role::Customer).await;

    let order_service = OrderService::new(app.db.clone(), Some(app.event_sender.clone()));
    let placed = order_service
        .place_order(app.customer_actor(owner), checkout_request())
        .await
        .unwrap();

    let result = order_service
        .get_order(app.customer_actor(other), placed.order_id)
        .await;
    assert!(matches!(result, Err(ServiceError::Forbidden(_))));

    // Admins can
    let admin = app.create_user(Role::Admin).await;
    assert!(order_service
        .get_order(app.admin_actor(admin), placed.order_id)
        .await
        .is_ok());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn cart_set_get_clear_round_trip() {
    let app = TestApp::new().await;
    let user_id = app.create_user(Role::Customer).await;
    let cart_service = CartService::new(app.db.clone(), app.event_sender.clone());

    let product = Uuid::new_v4();
    cart_service
        .set_item(user_id, product, "M".to_string(), 2)
        .await
        .unwrap();
    cart_service
        .set_item(user_id, product, "L".to_string(), 1)
        .await
        .unwrap();

    let cart = cart_service.get_cart(user_id).await.unwrap();
    assert_eq!(cart[&product]["M"], 2);
    assert_eq!(cart[&product]["L"], 1);

    // Zero removes the line; removing the last size removes the product
    cart_service
        .set_item(user_id, product, "M".to_string(), 0)
        .await
        .unwrap();
    cart_service
        .set_item(user_id, product, "L".to_string(), 0)
        .await
        .unwrap();
    assert!(cart_service.get_cart(user_id).await.unwrap().is_empty());

    cart_service
        .set_item(user_id, product, "M".to_string(), 4)
        .await
        .unwrap();
    cart_service.clear_cart(user_id).await.unwrap();
    assert!(cart_service.get_cart(user_id).await.unwrap().is_empty());

    // Unknown user surfaces NotFound
    let missing = cart_service.get_cart(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(ServiceError::NotFound(_))));
}
