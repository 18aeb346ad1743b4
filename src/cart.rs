//! The cart aggregate: quantities per product and a derived total.
//!
//! Totals are never stored. Every call to [`Cart::total`] looks up current
//! prices through a [`Catalog`], so a price change between viewing the cart
//! and checking out is always reflected.
use crate::error::{RemoteError, ValidationError};
use crate::product::Product;
use crate::types::{Money, TimeStamp, rupees};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Product lookup used to price and gate cart lines.
pub trait Catalog {
    fn product(&self, product_id: &str) -> anyhow::Result<Option<Product>>;

    fn require_product(&self, product_id: &str) -> anyhow::Result<Product> {
        self.product(product_id)?
            .ok_or_else(|| RemoteError::NotFound(format!("product {product_id}")).into())
    }
}

impl Catalog for HashMap<String, Product> {
    fn product(&self, product_id: &str) -> anyhow::Result<Option<Product>> {
        Ok(self.get(product_id).cloned())
    }
}

impl Catalog for [Product] {
    fn product(&self, product_id: &str) -> anyhow::Result<Option<Product>> {
        Ok(self.iter().find(|p| p.id == product_id).cloned())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[n(0)]
    pub product_id: String,
    #[n(1)]
    pub quantity: u32, // always >= 1
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            items: vec![],
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn quantity_of(&self, product_id: &str) -> Option<u32> {
        self.position(product_id).map(|i| self.items[i].quantity)
    }

    fn position(&self, product_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.product_id == product_id)
    }

    /// Add `qty` of a product. A product already in the cart has its quantity
    /// raised instead of getting a second entry. Returns the new quantity.
    pub fn add_item<C: Catalog + ?Sized>(
        &mut self,
        catalog: &C,
        product_id: &str,
        qty: u32,
    ) -> anyhow::Result<u32> {
        if qty == 0 {
            return Err(ValidationError::InvalidQuantity(0).into());
        }
        catalog.require_product(product_id)?;

        match self.position(product_id) {
            Some(i) => {
                let item = &mut self.items[i];
                item.quantity = item
                    .quantity
                    .checked_add(qty)
                    .ok_or(ValidationError::InvalidQuantity(i64::from(qty)))?;
                Ok(item.quantity)
            }
            None => {
                self.items.push(CartItem {
                    product_id: product_id.to_string(),
                    quantity: qty,
                });
                Ok(qty)
            }
        }
    }

    /// Set the quantity of a product already in the cart. Anything below 1
    /// removes the line. Returns the remaining quantity, `None` if removed.
    pub fn set_quantity(&mut self, product_id: &str, qty: i64) -> anyhow::Result<Option<u32>> {
        let Some(i) = self.position(product_id) else {
            return Err(RemoteError::NotFound(format!("product {product_id} in cart")).into());
        };
        if qty < 1 {
            self.items.remove(i);
            return Ok(None);
        }

        let qty = u32::try_from(qty).map_err(|_| ValidationError::InvalidQuantity(qty))?;
        self.items[i].quantity = qty;
        Ok(Some(qty))
    }

    pub fn remove_item(&mut self, product_id: &str) -> anyhow::Result<CartItem> {
        match self.position(product_id) {
            Some(i) => Ok(self.items.remove(i)),
            None => Err(RemoteError::NotFound(format!("product {product_id} in cart")).into()),
        }
    }

    /// Sum of quantity times current price, looked up fresh for every line.
    pub fn total<C: Catalog + ?Sized>(&self, catalog: &C) -> anyhow::Result<Money> {
        let mut total: Money = 0;
        for item in &self.items {
            let product = catalog.require_product(&item.product_id)?;
            total = total
                .checked_add(line_total(&product, item.quantity)?)
                .ok_or_else(|| anyhow::anyhow!("cart total overflowed"))?;
        }
        Ok(total)
    }

    /// Resolve every line against the catalog, keeping the cart's order.
    pub fn lines<C: Catalog + ?Sized>(&self, catalog: &C) -> anyhow::Result<Vec<CartLine>> {
        self.items
            .iter()
            .map(|item| {
                Ok(CartLine {
                    product: catalog.require_product(&item.product_id)?,
                    quantity: item.quantity,
                })
            })
            .collect()
    }
}

fn line_total(product: &Product, quantity: u32) -> anyhow::Result<Money> {
    product
        .our_price
        .checked_mul(Money::from(quantity))
        .ok_or_else(|| anyhow::anyhow!("line total overflowed for {}", product.id))
}

/// A cart line with the product record it refers to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

/// The cart as shown to its owner: resolved lines and their total.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLine>,
    #[serde(with = "rupees")]
    pub total_amount: Money,
}

impl CartView {
    /// The total is always derived from the lines, whatever a server reported.
    pub fn new(items: Vec<CartLine>) -> anyhow::Result<Self> {
        let mut total_amount: Money = 0;
        for line in &items {
            total_amount = total_amount
                .checked_add(line_total(&line.product, line.quantity)?)
                .ok_or_else(|| anyhow::anyhow!("cart total overflowed"))?;
        }
        Ok(Self {
            items,
            total_amount,
        })
    }

    pub fn from_cart<C: Catalog + ?Sized>(cart: &Cart, catalog: &C) -> anyhow::Result<Self> {
        Self::new(cart.lines(catalog)?)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_cart(&self, user_id: &str) -> Cart {
        Cart {
            user_id: user_id.to_string(),
            items: self
                .items
                .iter()
                .map(|l| CartItem {
                    product_id: l.product.id.clone(),
                    quantity: l.quantity,
                })
                .collect(),
        }
    }

    /// Checkout using the product records carried by the view.
    pub fn checkout(&self, user_id: &str) -> anyhow::Result<OrderIntent> {
        checkout(&self.to_cart(user_id), self)
    }
}

impl Catalog for CartView {
    fn product(&self, product_id: &str) -> anyhow::Result<Option<Product>> {
        Ok(self
            .items
            .iter()
            .find(|l| l.product.id == product_id)
            .map(|l| l.product.clone()))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub name: String,
    #[serde(with = "rupees")]
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(with = "rupees")]
    pub line_total: Money,
}

/// What a cart turns into at checkout. Payment happens elsewhere.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    pub user_id: String,
    pub lines: Vec<OrderLine>,
    #[serde(with = "rupees")]
    pub total_amount: Money,
    pub created_at: TimeStamp,
}

/// Price the cart at current prices. Every product must be approved and in
/// stock for the requested quantity. The cart itself is left untouched.
pub fn checkout<C: Catalog + ?Sized>(cart: &Cart, catalog: &C) -> anyhow::Result<OrderIntent> {
    if cart.is_empty() {
        return Err(ValidationError::EmptyCart.into());
    }

    let mut lines = Vec::with_capacity(cart.items.len());
    for item in &cart.items {
        let product = catalog.require_product(&item.product_id)?;
        if !product.is_approved() {
            return Err(
                RemoteError::Conflict(format!("{} is not available", product.name)).into(),
            );
        }
        if item.quantity > product.stock {
            return Err(RemoteError::Conflict(format!(
                "only {} {} of {} left",
                product.stock, product.unit, product.name
            ))
            .into());
        }
        lines.push(OrderLine {
            line_total: line_total(&product, item.quantity)?,
            product_id: product.id,
            name: product.name,
            unit_price: product.our_price,
            quantity: item.quantity,
        });
    }

    let total_amount = lines
        .iter()
        .try_fold(0 as Money, |sum, l| sum.checked_add(l.line_total))
        .ok_or_else(|| anyhow::anyhow!("cart total overflowed"))?;
    Ok(OrderIntent {
        user_id: cart.user_id.clone(),
        lines,
        total_amount,
        created_at: TimeStamp::new(),
    })
}
