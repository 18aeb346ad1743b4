//! Embedded store: every storefront endpoint served from a sled database
use crate::account::{Registration, UserAccount, normalise_email};
use crate::cart::{Cart, CartView, Catalog};
use crate::config::Config;
use crate::error::RemoteError;
use crate::moderation::{self, TransitionPolicy};
use crate::product::{Product, ProductDraft, ProductFilter};
use crate::session::Session;
use crate::storefront::Storefront;
use crate::types::{ApprovalStatus, Role};
use crate::utils;
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, abort,
};
use std::sync::Arc;

const PRODUCTS: &str = "products";
const USERS: &str = "users";
const EMAILS: &str = "emails"; // normalised email -> user id
const CARTS: &str = "carts"; // user id -> cart
const SESSIONS: &str = "sessions"; // token -> session

pub struct StoreService {
    instance: Arc<sled::Db>,
    products: sled::Tree,
    users: sled::Tree,
    emails: sled::Tree,
    carts: sled::Tree,
    sessions: sled::Tree,
    policy: TransitionPolicy,
}

impl StoreService {
    pub fn new(instance: Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            products: instance.open_tree(PRODUCTS)?,
            users: instance.open_tree(USERS)?,
            emails: instance.open_tree(EMAILS)?,
            carts: instance.open_tree(CARTS)?,
            sessions: instance.open_tree(SESSIONS)?,
            policy: TransitionPolicy::default(),
            instance,
        })
    }

    /// Open the database named in the config and apply its transition policy.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let db = sled::open(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "opened store");
        Ok(Self::new(Arc::new(db))?.with_policy(config.transition_policy))
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    /// Forget a session token. Later calls with it fail with 401.
    pub fn logout(&self, session: &Session) -> anyhow::Result<()> {
        self.sessions.remove(session.token.as_bytes())?;
        tracing::info!(user_id = %session.user_id, "logged out");
        Ok(())
    }

    /// Resolve a session to its account, re-checking that it may still log in.
    fn authenticate(&self, session: &Session) -> anyhow::Result<UserAccount> {
        let stored: Option<Session> = get(&self.sessions, &session.token)?;
        let Some(stored) = stored.filter(|s| s.user_id == session.user_id) else {
            return Err(RemoteError::Unauthorized("Session expired. Please login again".into()).into());
        };

        match get::<UserAccount>(&self.users, &stored.user_id)? {
            Some(account) if account.can_login() => Ok(account),
            _ => {
                self.sessions.remove(stored.token.as_bytes())?;
                Err(RemoteError::Unauthorized("Session expired. Please login again".into()).into())
            }
        }
    }

    fn authorize(&self, session: &Session, role: Role) -> anyhow::Result<UserAccount> {
        let account = self.authenticate(session)?;
        if account.role != role {
            return Err(RemoteError::Forbidden(format!("{role} access required")).into());
        }
        Ok(account)
    }

    fn load_cart(&self, user_id: &str) -> anyhow::Result<Cart> {
        Ok(get(&self.carts, user_id)?.unwrap_or_else(|| Cart::new(user_id)))
    }

    /// Change the stored cart in one transaction, starting from an empty cart.
    fn modify_cart<R>(
        &self,
        user_id: &str,
        change: impl Fn(&mut Cart) -> anyhow::Result<R>,
    ) -> anyhow::Result<(CartView, R)> {
        let (cart, output) = modify(&self.carts, user_id, || Ok(Cart::new(user_id)), change)?;
        Ok((CartView::from_cart(&cart, self)?, output))
    }

    fn list_products(&self, filter: &ProductFilter) -> anyhow::Result<Vec<Product>> {
        let mut products = filter.apply(scan::<Product>(&self.products)?);
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(products)
    }

    fn register_as(&self, registration: Registration, role: Role) -> anyhow::Result<UserAccount> {
        let id = utils::new_uuid_to_bech32("user_")?;
        let account = registration.into_account(id, role)?;
        let encoded = minicbor::to_vec(&account)?;

        let result = (&self.users, &self.emails).transaction(|(users, emails)| {
            if emails.get(account.email.as_bytes())?.is_some() {
                return abort(RemoteError::Conflict(format!(
                    "{} is already registered",
                    account.email
                )));
            }
            emails.insert(account.email.as_bytes(), account.id.as_bytes())?;
            users.insert(account.id.as_bytes(), encoded.clone())?;
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::info!(user_id = %account.id, %role, "registered account");
                Ok(account)
            }
            Err(TransactionError::Abort(err)) => Err(err.into()),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }
}

impl Catalog for StoreService {
    fn product(&self, product_id: &str) -> anyhow::Result<Option<Product>> {
        get(&self.products, product_id)
    }
}

impl Storefront for StoreService {
    fn approved_products(&self) -> anyhow::Result<Vec<Product>> {
        self.list_products(&ProductFilter::shopper())
    }

    fn all_products(&self, session: &Session) -> anyhow::Result<Vec<Product>> {
        let account = self.authenticate(session)?;
        self.list_products(&ProductFilter::for_viewer(account.role, &account.id))
    }

    fn submit_product(&self, session: &Session, draft: ProductDraft) -> anyhow::Result<Product> {
        let farmer = self.authorize(session, Role::Farmer)?;
        let id = utils::new_uuid_to_bech32("product_")?;
        let product = draft.finalise(id, &farmer.id)?;

        put(&self.products, &product.id, &product)?;
        tracing::info!(product_id = %product.id, farmer_id = %farmer.id, "product submitted for approval");

        Ok(product)
    }

    fn set_product_status(
        &self,
        session: &Session,
        product_id: &str,
        status: ApprovalStatus,
    ) -> anyhow::Result<Product> {
        let actor = self.authenticate(session)?;
        let (product, from) = modify(
            &self.products,
            product_id,
            || Err(RemoteError::NotFound(format!("product {product_id}")).into()),
            |product: &mut Product| {
                Ok(moderation::transition(product, actor.role, status, self.policy)?)
            },
        )?;
        tracing::info!(%product_id, %from, to = %status, "product status changed");

        Ok(product)
    }

    fn cart(&self, session: &Session) -> anyhow::Result<CartView> {
        let account = self.authenticate(session)?;
        CartView::from_cart(&self.load_cart(&account.id)?, self)
    }

    fn add_to_cart(&self, session: &Session, product_id: &str) -> anyhow::Result<CartView> {
        let account = self.authenticate(session)?;
        let product = self.require_product(product_id)?;
        if !product.is_approved() {
            return Err(RemoteError::Conflict(format!("{} is not available", product.name)).into());
        }
        if product.stock == 0 {
            return Err(RemoteError::Conflict(format!("{} is out of stock", product.name)).into());
        }

        let (view, quantity) =
            self.modify_cart(&account.id, |cart| cart.add_item(self, product_id, 1))?;
        tracing::debug!(user_id = %account.id, %product_id, quantity, "added to cart");

        Ok(view)
    }

    fn update_cart(
        &self,
        session: &Session,
        product_id: &str,
        quantity: i64,
    ) -> anyhow::Result<CartView> {
        let account = self.authenticate(session)?;
        let (view, remaining) =
            self.modify_cart(&account.id, |cart| cart.set_quantity(product_id, quantity))?;
        tracing::debug!(user_id = %account.id, %product_id, ?remaining, "cart quantity updated");

        Ok(view)
    }

    fn remove_from_cart(&self, session: &Session, product_id: &str) -> anyhow::Result<CartView> {
        let account = self.authenticate(session)?;
        let (view, _) = self.modify_cart(&account.id, |cart| cart.remove_item(product_id))?;
        tracing::debug!(user_id = %account.id, %product_id, "removed from cart");

        Ok(view)
    }

    fn login(&self, email: &str, password: &str) -> anyhow::Result<Session> {
        let invalid = || RemoteError::Unauthorized("Invalid email or password".into());

        let user_id = self
            .emails
            .get(normalise_email(email).as_bytes())?
            .ok_or_else(invalid)?;
        let user_id = String::from_utf8(user_id.to_vec())?;
        let account: UserAccount = get(&self.users, &user_id)?.ok_or_else(invalid)?;

        if !account.verify_password(password) {
            return Err(invalid().into());
        }
        if !account.can_login() {
            tracing::info!(%user_id, status = ?account.farmer_status(), "farmer login refused");
            return Err(RemoteError::PendingApproval.into());
        }

        let session = Session::new(utils::new_uuid_to_bech32("session_")?, account.id, account.role);
        put(&self.sessions, &session.token, &session)?;
        tracing::info!(%user_id, role = %session.role, "logged in");

        Ok(session)
    }

    fn register(&self, registration: Registration) -> anyhow::Result<UserAccount> {
        self.register_as(registration, Role::User)
    }

    fn register_farmer(&self, registration: Registration) -> anyhow::Result<UserAccount> {
        self.register_as(registration, Role::Farmer)
    }

    fn register_admin(&self, registration: Registration) -> anyhow::Result<UserAccount> {
        self.register_as(registration, Role::Admin)
    }

    fn set_farmer_status(
        &self,
        session: &Session,
        farmer_id: &str,
        status: ApprovalStatus,
    ) -> anyhow::Result<UserAccount> {
        let actor = self.authenticate(session)?;
        let (farmer, from) = modify(
            &self.users,
            farmer_id,
            || Err(RemoteError::NotFound(format!("farmer {farmer_id}")).into()),
            |farmer: &mut UserAccount| {
                Ok(farmer.set_farmer_status(actor.role, status, self.policy)?)
            },
        )?;
        tracing::info!(%farmer_id, %from, to = %status, "farmer status changed");

        Ok(farmer)
    }

    fn all_users(&self, session: &Session) -> anyhow::Result<Vec<UserAccount>> {
        self.authorize(session, Role::Admin)?;
        let mut users = scan::<UserAccount>(&self.users)?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    fn delete_user(&self, session: &Session, user_id: &str) -> anyhow::Result<()> {
        self.authorize(session, Role::Admin)?;
        let account: UserAccount = get(&self.users, user_id)?
            .ok_or_else(|| RemoteError::NotFound(format!("user {user_id}")))?;

        (&self.users, &self.emails, &self.carts)
            .transaction(|(users, emails, carts)| {
                users.remove(account.id.as_bytes())?;
                emails.remove(account.email.as_bytes())?;
                carts.remove(account.id.as_bytes())?;
                Ok::<_, sled::transaction::ConflictableTransactionError<()>>(())
            })
            .map_err(|e| anyhow::anyhow!("failed to delete user {user_id}: {e:?}"))?;
        tracing::info!(%user_id, "deleted user");

        Ok(())
    }
}

fn get<T>(tree: &sled::Tree, key: &str) -> anyhow::Result<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
        None => Ok(None),
    }
}

fn put<T: minicbor::Encode<()>>(tree: &sled::Tree, key: &str, value: &T) -> anyhow::Result<()> {
    tree.insert(key.as_bytes(), minicbor::to_vec(value)?)?;
    Ok(())
}

/// Decode, change and re-encode one record inside a sled transaction.
/// `change` runs again whenever sled retries on a conflicting write, and an
/// error from `missing` or `change` aborts without writing anything.
fn modify<T, R>(
    tree: &sled::Tree,
    key: &str,
    missing: impl Fn() -> anyhow::Result<T>,
    change: impl Fn(&mut T) -> anyhow::Result<R>,
) -> anyhow::Result<(T, R)>
where
    T: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()>,
{
    let result = tree.transaction(|tx| -> ConflictableTransactionResult<(T, R), anyhow::Error> {
        let mut value: T = match tx.get(key.as_bytes())? {
            Some(bytes) => minicbor::decode(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(anyhow::Error::from(e)))?,
            None => missing().map_err(ConflictableTransactionError::Abort)?,
        };
        let output = change(&mut value).map_err(ConflictableTransactionError::Abort)?;
        let encoded = minicbor::to_vec(&value)
            .map_err(|e| ConflictableTransactionError::Abort(anyhow::Error::from(e)))?;
        tx.insert(key.as_bytes(), encoded)?;
        Ok((value, output))
    });

    match result {
        Ok(done) => Ok(done),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

fn scan<T>(tree: &sled::Tree) -> anyhow::Result<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.iter()
        .values()
        .map(|bytes| -> anyhow::Result<T> { Ok(minicbor::decode(&bytes?)?) })
        .collect()
}
