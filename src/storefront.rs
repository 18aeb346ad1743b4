//! The store boundary, implemented by the embedded `StoreService` and the HTTP `RemoteStore`
use crate::account::{Registration, UserAccount};
use crate::cart::{CartView, OrderIntent};
use crate::product::{Product, ProductDraft};
use crate::session::Session;
use crate::types::ApprovalStatus;

pub trait Storefront {
    /// `GET /products/approved`. No session needed.
    fn approved_products(&self) -> anyhow::Result<Vec<Product>>;
    /// `GET /products/all`, narrowed to what the session's role may see.
    fn all_products(&self, session: &Session) -> anyhow::Result<Vec<Product>>;
    /// `POST /products/add`, farmers only.
    fn submit_product(&self, session: &Session, draft: ProductDraft) -> anyhow::Result<Product>;
    /// `PUT /products/:id/status`, admins only.
    fn set_product_status(
        &self,
        session: &Session,
        product_id: &str,
        status: ApprovalStatus,
    ) -> anyhow::Result<Product>;

    fn cart(&self, session: &Session) -> anyhow::Result<CartView>;
    fn add_to_cart(&self, session: &Session, product_id: &str) -> anyhow::Result<CartView>;
    /// A quantity below 1 removes the line.
    fn update_cart(
        &self,
        session: &Session,
        product_id: &str,
        quantity: i64,
    ) -> anyhow::Result<CartView>;
    fn remove_from_cart(&self, session: &Session, product_id: &str) -> anyhow::Result<CartView>;

    /// Farmers who are not approved are refused even with the right password.
    fn login(&self, email: &str, password: &str) -> anyhow::Result<Session>;
    fn register(&self, registration: Registration) -> anyhow::Result<UserAccount>;
    fn register_farmer(&self, registration: Registration) -> anyhow::Result<UserAccount>;
    fn register_admin(&self, registration: Registration) -> anyhow::Result<UserAccount>;
    /// `PUT /users/farmer-status/:id`, admins only.
    fn set_farmer_status(
        &self,
        session: &Session,
        farmer_id: &str,
        status: ApprovalStatus,
    ) -> anyhow::Result<UserAccount>;
    fn all_users(&self, session: &Session) -> anyhow::Result<Vec<UserAccount>>;
    fn delete_user(&self, session: &Session, user_id: &str) -> anyhow::Result<()>;

    /// Turn the session's cart into an order intent at current prices.
    fn checkout(&self, session: &Session) -> anyhow::Result<OrderIntent> {
        self.cart(session)?.checkout(&session.user_id)
    }
}
