use async_trait::async_trait;
use common::{
    CartId, CartItemId, Money, OrderDetailId, OrderId, PaymentId, ProductId, UserId,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Audit, Cart, CartItem, Order, OrderDetail, OrderStatus, Payment, PaymentStatus, Product,
    Result, StoreError,
    store::{CartStore, OrderStore, ProductCatalog},
};

/// PostgreSQL-backed store implementation.
///
/// Every method is a single statement against the pool; nothing here opens
/// a multi-statement transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a catalog product. The catalog itself is owned elsewhere;
    /// this exists for seeding and tests.
    pub async fn create_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_audit(row: &PgRow) -> Result<Audit> {
        Ok(Audit {
            created_by: UserId::from_uuid(row.try_get::<Uuid, _>("created_by")?),
            created_at: row.try_get("created_at")?,
            updated_by: UserId::from_uuid(row.try_get::<Uuid, _>("updated_by")?),
            updated_at: row.try_get("updated_at")?,
            deleted_by: row
                .try_get::<Option<Uuid>, _>("deleted_by")?
                .map(UserId::from_uuid),
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            total_items: to_u32("total_items", row.try_get("total_items")?)?,
            version: row.try_get("version")?,
            audit: Self::row_to_audit(&row)?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<CartItem> {
        Ok(CartItem {
            id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: to_u32("quantity", row.try_get("quantity")?)?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            audit: Self::row_to_audit(&row)?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: i16 = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            payment_id: row
                .try_get::<Option<Uuid>, _>("payment_id")?
                .map(PaymentId::from_uuid),
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            status: OrderStatus::from_i16(status).ok_or(StoreError::Corrupt {
                column: "orders.status",
                value: i64::from(status),
            })?,
            order_at: row.try_get("order_at")?,
            payment_at: row.try_get("payment_at")?,
            completed_at: row.try_get("completed_at")?,
            audit: Self::row_to_audit(&row)?,
        })
    }

    fn row_to_detail(row: PgRow) -> Result<OrderDetail> {
        Ok(OrderDetail {
            id: OrderDetailId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: to_u32("order_details.quantity", row.try_get("quantity")?)?,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            audit: Self::row_to_audit(&row)?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let status: i16 = row.try_get("status")?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            payment_method: row.try_get("payment_method")?,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            status: PaymentStatus::from_i16(status).ok_or(StoreError::Corrupt {
                column: "payments.status",
                value: i64::from(status),
            })?,
            payment_at: row.try_get("payment_at")?,
            audit: Self::row_to_audit(&row)?,
        })
    }
}

fn to_u32(column: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt { column, value })
}

fn expect_one(rows_affected: u64, entity: &'static str, id: impl ToString) -> Result<()> {
    if rows_affected == 0 {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn create_cart(&self, cart: &Cart) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, total_price_cents, total_items, version,
                               created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.total_price.cents())
        .bind(i64::from(cart.total_items))
        .bind(cart.version)
        .bind(cart.audit.created_by.as_uuid())
        .bind(cart.audit.created_at)
        .bind(cart.audit.updated_by.as_uuid())
        .bind(cart.audit.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate("cart", cart.user_id));
        }
        Ok(())
    }

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, total_price_cents, total_items, version,
                   created_by, created_at, updated_by, updated_at, deleted_by, deleted_at
            FROM carts
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_cart).transpose()
    }

    async fn get_items_by_cart(&self, cart_id: CartId) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, cart_id, product_id, quantity, subtotal_cents,
                   created_by, created_at, updated_by, updated_at, deleted_by, deleted_at
            FROM cart_items
            WHERE cart_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn create_item(&self, item: &CartItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, subtotal_cents,
                                    created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.cart_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(i64::from(item.quantity))
        .bind(item.subtotal.cents())
        .bind(item.audit.created_by.as_uuid())
        .bind(item.audit.created_at)
        .bind(item.audit.updated_by.as_uuid())
        .bind(item.audit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::duplicate("cart item", item.id);
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn update_item(&self, item: &CartItem) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE cart_items
            SET quantity = $2, subtotal_cents = $3, updated_by = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(i64::from(item.quantity))
        .bind(item.subtotal.cents())
        .bind(item.audit.updated_by.as_uuid())
        .bind(item.audit.updated_at)
        .execute(&self.pool)
        .await?;

        expect_one(result.rows_affected(), "cart item", item.id)
    }

    async fn delete_item(&self, item_id: CartItemId) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id.as_uuid())
            .execute(&self.pool)
            .await?;

        expect_one(result.rows_affected(), "cart item", item_id)
    }

    async fn update_cart(&self, cart: &Cart) -> Result<Cart> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE carts
            SET total_price_cents = $2, total_items = $3, updated_by = $4, updated_at = $5,
                version = version + 1
            WHERE id = $1 AND version = $6
            RETURNING version
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.total_price.cents())
        .bind(i64::from(cart.total_items))
        .bind(cart.audit.updated_by.as_uuid())
        .bind(cart.audit.updated_at)
        .bind(cart.version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = version {
            let mut updated = cart.clone();
            updated.version = version;
            return Ok(updated);
        }

        // Nothing matched: either the cart is gone or the version moved on
        let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM carts WHERE id = $1")
            .bind(cart.id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            Some(actual) => {
                tracing::warn!(
                    cart_id = %cart.id,
                    expected = cart.version,
                    actual,
                    "cart version moved"
                );
                Err(StoreError::ConcurrencyConflict {
                    cart_id: cart.id,
                    expected: cart.version,
                    actual,
                })
            }
            None => Err(StoreError::not_found("cart", cart.id)),
        }
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn create_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, payment_id, total_price_cents, status, order_at,
                                payment_at, completed_at, created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.payment_id.map(|id| id.as_uuid()))
        .bind(order.total_price.cents())
        .bind(order.status.as_i16())
        .bind(order.order_at)
        .bind(order.payment_at)
        .bind(order.completed_at)
        .bind(order.audit.created_by.as_uuid())
        .bind(order.audit.created_at)
        .bind(order.audit.updated_by.as_uuid())
        .bind(order.audit.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, payment_id, total_price_cents, status, order_at, payment_at,
                   completed_at, created_by, created_at, updated_by, updated_at, deleted_by, deleted_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_id = $2, total_price_cents = $3, status = $4, payment_at = $5,
                completed_at = $6, updated_by = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.payment_id.map(|id| id.as_uuid()))
        .bind(order.total_price.cents())
        .bind(order.status.as_i16())
        .bind(order.payment_at)
        .bind(order.completed_at)
        .bind(order.audit.updated_by.as_uuid())
        .bind(order.audit.updated_at)
        .execute(&self.pool)
        .await?;

        expect_one(result.rows_affected(), "order", order.id)
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .execute(&self.pool)
            .await?;

        expect_one(result.rows_affected(), "order", order_id)
    }

    async fn create_order_detail(&self, detail: &OrderDetail) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_details (id, order_id, product_id, quantity, subtotal_cents,
                                       created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(detail.id.as_uuid())
        .bind(detail.order_id.as_uuid())
        .bind(detail.product_id.as_uuid())
        .bind(i64::from(detail.quantity))
        .bind(detail.subtotal.cents())
        .bind(detail.audit.created_by.as_uuid())
        .bind(detail.audit.created_at)
        .bind(detail.audit.updated_by.as_uuid())
        .bind(detail.audit.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order_details(&self, order_id: OrderId) -> Result<Vec<OrderDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, subtotal_cents,
                   created_by, created_at, updated_by, updated_at, deleted_by, deleted_at
            FROM order_details
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_detail).collect()
    }

    async fn delete_order_detail(&self, detail_id: OrderDetailId) -> Result<()> {
        let result = sqlx::query("DELETE FROM order_details WHERE id = $1")
            .bind(detail_id.as_uuid())
            .execute(&self.pool)
            .await?;

        expect_one(result.rows_affected(), "order detail", detail_id)
    }

    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, user_id, order_id, payment_method, total_price_cents, status,
                                  payment_at, created_by, created_at, updated_by, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(&payment.payment_method)
        .bind(payment.total_price.cents())
        .bind(payment.status.as_i16())
        .bind(payment.payment_at)
        .bind(payment.audit.created_by.as_uuid())
        .bind(payment.audit.created_at)
        .bind(payment.audit.updated_by.as_uuid())
        .bind(payment.audit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_payment_order")
            {
                return StoreError::duplicate("payment", payment.order_id);
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_payment_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, order_id, payment_method, total_price_cents, status, payment_at,
                   created_by, created_at, updated_by, updated_at, deleted_by, deleted_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET payment_method = $2, total_price_cents = $3, status = $4, payment_at = $5,
                updated_by = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(&payment.payment_method)
        .bind(payment.total_price.cents())
        .bind(payment.status.as_i16())
        .bind(payment.payment_at)
        .bind(payment.audit.updated_by.as_uuid())
        .bind(payment.audit.updated_at)
        .execute(&self.pool)
        .await?;

        expect_one(result.rows_affected(), "payment", payment.id)
    }

    async fn delete_payment(&self, payment_id: PaymentId) -> Result<()> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(payment_id.as_uuid())
            .execute(&self.pool)
            .await?;

        expect_one(result.rows_affected(), "payment", payment_id)
    }
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> =
            sqlx::query("SELECT id, name, price_cents, stock FROM products WHERE id = $1")
                .bind(product_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(Some(Product {
                id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
                name: row.try_get("name")?,
                price: Money::from_cents(row.try_get("price_cents")?),
                stock: to_u32("products.stock", row.try_get("stock")?)?,
            })),
            None => Ok(None),
        }
    }

    async fn decrement_stock(&self, product_id: ProductId, quantity: u32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("product", product_id)),
        }
    }

    async fn increment_stock(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        expect_one(result.rows_affected(), "product", product_id)
    }
}
