use crate::{
    db::DbPool,
    entities::user::{self, Entity as UserEntity, Model as UserModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// The cart document stored on the user row: product id → size → quantity.
/// Absence means "not in cart"; a quantity of zero is never stored.
pub type CartState = BTreeMap<Uuid, BTreeMap<String, u32>>;

/// Service for the per-user shopping cart. Every operation replaces the
/// whole cart document (last write wins per product+size); there is no
/// line-level locking. Quantity, size, and product correctness are the
/// caller's responsibility.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the full cart mapping, empty if the user has none.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartState, ServiceError> {
        let user = self.load_user(user_id).await?;
        decode_cart(&user)
    }

    /// Sets the absolute quantity for a product+size line. A quantity of
    /// zero removes the size entry and prunes the product entry when it
    /// becomes empty.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id, size = %size, quantity = quantity))]
    pub async fn set_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: String,
        quantity: u32,
    ) -> Result<CartState, ServiceError> {
        let user = self.load_user(user_id).await?;
        let mut cart = decode_cart(&user)?;

        apply_set(&mut cart, product_id, &size, quantity);
        self.store_cart(user, &cart).await?;

        if let Err(e) = self.event_sender.send(Event::CartUpdated(user_id)).await {
            warn!(error = %e, user_id = %user_id, "Failed to send cart updated event");
        }

        Ok(cart)
    }

    /// Replaces the cart with an empty document.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let user = self.load_user(user_id).await?;
        self.store_cart(user, &CartState::new()).await?;

        if let Err(e) = self.event_sender.send(Event::CartCleared(user_id)).await {
            warn!(error = %e, user_id = %user_id, "Failed to send cart cleared event");
        }

        Ok(())
    }

    async fn load_user(&self, user_id: Uuid) -> Result<UserModel, ServiceError> {
        UserEntity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    async fn store_cart(&self, user: UserModel, cart: &CartState) -> Result<(), ServiceError> {
        let mut active: user::ActiveModel = user.into();
        active.cart = Set(serde_json::to_value(cart)?);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&*self.db).await?;
        Ok(())
    }
}

/// Decodes the stored cart document; a JSON null (never-initialized row)
/// reads as an empty cart.
pub fn decode_cart(user: &UserModel) -> Result<CartState, ServiceError> {
    if user.cart.is_null() {
        return Ok(CartState::new());
    }
    Ok(serde_json::from_value(user.cart.clone())?)
}

/// Applies the set-absolute-quantity operation to a cart document.
pub fn apply_set(cart: &mut CartState, product_id: Uuid, size: &str, quantity: u32) {
    if quantity == 0 {
        if let Some(sizes) = cart.get_mut(&product_id) {
            sizes.remove(size);
            if sizes.is_empty() {
                cart.remove(&product_id);
            }
        }
        return;
    }

    cart.entry(product_id)
        .or_default()
        .insert(size.to_string(), quantity);
}
