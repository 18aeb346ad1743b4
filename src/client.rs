//! Blocking HTTP client for the storefront REST backend
use crate::account::{Registration, UserAccount};
use crate::cart::CartView;
use crate::config::Config;
use crate::envelope::{
    self, CartPayload, LoginPayload, ProductPayload, ProductsPayload, UserPayload, UsersPayload,
};
use crate::error::RemoteError;
use crate::inflight::InFlight;
use crate::product::{Product, ProductDraft, ProductFilter};
use crate::session::Session;
use crate::storefront::Storefront;
use crate::types::{ApprovalStatus, Role};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, multipart::Form};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;
use std::fmt;

/// Every call the storefront makes against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    AllProducts,
    ApprovedProducts,
    AddProduct,
    ProductStatus(String),
    Cart,
    CartAdd,
    CartUpdate(String),
    CartRemove(String),
    Login,
    Register,
    AdminRegister,
    FarmerRegister,
    FarmerStatus(String),
    AllUsers,
    DeleteUser(String),
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::AllProducts
            | Endpoint::ApprovedProducts
            | Endpoint::Cart
            | Endpoint::AllUsers => Method::GET,
            Endpoint::AddProduct
            | Endpoint::CartAdd
            | Endpoint::Login
            | Endpoint::Register
            | Endpoint::AdminRegister
            | Endpoint::FarmerRegister => Method::POST,
            Endpoint::ProductStatus(_) | Endpoint::CartUpdate(_) | Endpoint::FarmerStatus(_) => {
                Method::PUT
            }
            Endpoint::CartRemove(_) | Endpoint::DeleteUser(_) => Method::DELETE,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Endpoint::AllProducts => "/products/all".into(),
            Endpoint::ApprovedProducts => "/products/approved".into(),
            Endpoint::AddProduct => "/products/add".into(),
            Endpoint::ProductStatus(id) => format!("/products/{id}/status"),
            Endpoint::Cart => "/cart".into(),
            Endpoint::CartAdd => "/cart/add".into(),
            Endpoint::CartUpdate(id) => format!("/cart/update/{id}"),
            Endpoint::CartRemove(id) => format!("/cart/remove/{id}"),
            Endpoint::Login => "/users/login".into(),
            Endpoint::Register => "/users/register".into(),
            Endpoint::AdminRegister => "/users/admin-register".into(),
            Endpoint::FarmerRegister => "/users/farmer-register".into(),
            Endpoint::FarmerStatus(id) => format!("/users/farmer-status/{id}"),
            Endpoint::AllUsers => "/users/all".into(),
            Endpoint::DeleteUser(id) => format!("/users/{id}"),
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            Endpoint::ApprovedProducts
                | Endpoint::Login
                | Endpoint::Register
                | Endpoint::AdminRegister
                | Endpoint::FarmerRegister
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}

pub struct RemoteStore {
    http: Client,
    base_url: String,
    in_flight: InFlight,
}

impl RemoteStore {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(http, &config.api_base_url))
    }

    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            in_flight: InFlight::new(),
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn url(&self, endpoint: &Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    /// Request for `endpoint`, with the bearer token attached when one is given.
    pub fn request(&self, endpoint: &Endpoint, session: Option<&Session>) -> RequestBuilder {
        let builder = self.http.request(endpoint.method(), self.url(endpoint));
        match session {
            Some(session) => builder.bearer_auth(&session.token),
            None => builder,
        }
    }

    fn send<T: DeserializeOwned>(&self, endpoint: &Endpoint, builder: RequestBuilder) -> anyhow::Result<T> {
        tracing::debug!(%endpoint, "sending request");
        let response = builder
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        envelope::decode(status, &body).map_err(|err| {
            tracing::warn!(%endpoint, status, error = %err, "request failed");
            err.into()
        })
    }

    fn call<T: DeserializeOwned>(&self, endpoint: Endpoint, session: Option<&Session>) -> anyhow::Result<T> {
        let builder = self.request(&endpoint, session);
        self.send(&endpoint, builder)
    }

    fn call_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        session: Option<&Session>,
        body: serde_json::Value,
    ) -> anyhow::Result<T> {
        let builder = self.request(&endpoint, session).json(&body);
        self.send(&endpoint, builder)
    }

    fn call_form<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        session: Option<&Session>,
        fields: Vec<(&'static str, String)>,
    ) -> anyhow::Result<T> {
        let form = fields
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value));
        let builder = self.request(&endpoint, session).multipart(form);
        self.send(&endpoint, builder)
    }

    fn register_json(&self, registration: Registration, role: Role, endpoint: Endpoint) -> anyhow::Result<UserAccount> {
        registration.validate_for(role)?;
        let payload: UserPayload = self.call_json(endpoint, None, registration.to_json(role))?;
        Ok(payload.user)
    }
}

impl Storefront for RemoteStore {
    fn approved_products(&self) -> anyhow::Result<Vec<Product>> {
        let payload: ProductsPayload = self.call(Endpoint::ApprovedProducts, None)?;
        // the approved listing is re-filtered in case the server returns more
        Ok(ProductFilter::shopper().apply(payload.products))
    }

    fn all_products(&self, session: &Session) -> anyhow::Result<Vec<Product>> {
        let payload: ProductsPayload = self.call(Endpoint::AllProducts, Some(session))?;
        Ok(ProductFilter::for_viewer(session.role, &session.user_id).apply(payload.products))
    }

    fn submit_product(&self, session: &Session, draft: ProductDraft) -> anyhow::Result<Product> {
        draft.validate()?;
        let _guard = self.in_flight.begin("products:add")?;
        let payload: ProductPayload =
            self.call_form(Endpoint::AddProduct, Some(session), draft.form_fields())?;
        tracing::info!(product_id = %payload.product.id, "product submitted for approval");
        Ok(payload.product)
    }

    fn set_product_status(
        &self,
        session: &Session,
        product_id: &str,
        status: ApprovalStatus,
    ) -> anyhow::Result<Product> {
        let _guard = self.in_flight.begin(format!("product-status:{product_id}"))?;
        let payload: ProductPayload = self.call_json(
            Endpoint::ProductStatus(product_id.to_string()),
            Some(session),
            json!({ "status": status }),
        )?;
        tracing::info!(%product_id, to = %status, "product status changed");
        Ok(payload.product)
    }

    fn cart(&self, session: &Session) -> anyhow::Result<CartView> {
        let payload: CartPayload = self.call(Endpoint::Cart, Some(session))?;
        CartView::new(payload.cart.items)
    }

    fn add_to_cart(&self, session: &Session, product_id: &str) -> anyhow::Result<CartView> {
        {
            let _guard = self.in_flight.begin(format!("cart:{product_id}"))?;
            let _: IgnoredAny = self.call_json(
                Endpoint::CartAdd,
                Some(session),
                json!({ "productId": product_id }),
            )?;
        }
        self.cart(session)
    }

    fn update_cart(
        &self,
        session: &Session,
        product_id: &str,
        quantity: i64,
    ) -> anyhow::Result<CartView> {
        if quantity < 1 {
            return self.remove_from_cart(session, product_id);
        }
        {
            let _guard = self.in_flight.begin(format!("cart:{product_id}"))?;
            let _: IgnoredAny = self.call_json(
                Endpoint::CartUpdate(product_id.to_string()),
                Some(session),
                json!({ "quantity": quantity }),
            )?;
        }
        self.cart(session)
    }

    fn remove_from_cart(&self, session: &Session, product_id: &str) -> anyhow::Result<CartView> {
        {
            let _guard = self.in_flight.begin(format!("cart:{product_id}"))?;
            let _: IgnoredAny =
                self.call(Endpoint::CartRemove(product_id.to_string()), Some(session))?;
        }
        self.cart(session)
    }

    fn login(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        let payload: LoginPayload = self.call_json(
            Endpoint::Login,
            None,
            json!({ "email": email, "password": password }),
        )?;

        if !payload.user.can_login() {
            tracing::info!(user_id = %payload.user.id, "farmer login refused");
            return Err(RemoteError::PendingApproval.into());
        }
        tracing::info!(user_id = %payload.user.id, role = %payload.user.role, "logged in");
        Ok(Session::new(payload.token, payload.user.id, payload.user.role))
    }

    fn register(&self, registration: Registration) -> anyhow::Result<UserAccount> {
        self.register_json(registration, Role::User, Endpoint::Register)
    }

    fn register_farmer(&self, registration: Registration) -> anyhow::Result<UserAccount> {
        registration.validate_for(Role::Farmer)?;
        let payload: UserPayload =
            self.call_form(Endpoint::FarmerRegister, None, registration.form_fields())?;
        Ok(payload.user)
    }

    fn register_admin(&self, registration: Registration) -> anyhow::Result<UserAccount> {
        self.register_json(registration, Role::Admin, Endpoint::AdminRegister)
    }

    fn set_farmer_status(
        &self,
        session: &Session,
        farmer_id: &str,
        status: ApprovalStatus,
    ) -> anyhow::Result<UserAccount> {
        let _guard = self.in_flight.begin(format!("farmer-status:{farmer_id}"))?;
        let payload: UserPayload = self.call_json(
            Endpoint::FarmerStatus(farmer_id.to_string()),
            Some(session),
            json!({ "status": status }),
        )?;
        tracing::info!(%farmer_id, to = %status, "farmer status changed");
        Ok(payload.user)
    }

    fn all_users(&self, session: &Session) -> anyhow::Result<Vec<UserAccount>> {
        let payload: UsersPayload = self.call(Endpoint::AllUsers, Some(session))?;
        Ok(payload.data.into_accounts())
    }

    fn delete_user(&self, session: &Session, user_id: &str) -> anyhow::Result<()> {
        let _guard = self.in_flight.begin(format!("user:{user_id}"))?;
        let _: IgnoredAny = self.call(Endpoint::DeleteUser(user_id.to_string()), Some(session))?;
        tracing::info!(%user_id, "deleted user");
        Ok(())
    }
}
