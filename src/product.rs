//! Catalog records, farmer drafts and listing filters
use crate::error::ValidationError;
use crate::moderation::Moderated;
use crate::types::{ApprovalStatus, Category, Money, Role, TimeStamp, Unit, rupees};
use serde::{Deserialize, Serialize};

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[n(0)]
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub category: Category,
    #[n(4)]
    #[serde(with = "rupees")]
    pub market_price: Money,
    #[n(5)]
    #[serde(with = "rupees")]
    pub our_price: Money, // expected <= market_price, not enforced
    #[n(6)]
    pub stock: u32,
    #[n(7)]
    pub unit: Unit,
    #[n(8)]
    pub image_url: String,
    #[n(9)]
    #[serde(rename = "farmer")]
    pub farmer_id: String,
    #[n(10)]
    #[serde(default)]
    status: ApprovalStatus,
    #[n(11)]
    #[serde(default)]
    pub created_at: TimeStamp,
}

impl Product {
    pub fn status(&self) -> ApprovalStatus {
        self.status
    }
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
    pub fn belongs_to(&self, farmer_id: &str) -> bool {
        self.farmer_id == farmer_id
    }
}

impl Moderated for Product {
    fn status(&self) -> ApprovalStatus {
        self.status
    }
    fn apply_status(&mut self, status: ApprovalStatus) {
        self.status = status;
    }
}

/// A farmer's product submission before it has an id.
/// Submissions carry no status; every new product starts out pending.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    name: Option<String>,
    description: Option<String>,
    category: Category,
    market_price: Money,
    our_price: Money,
    stock: u32,
    unit: Unit,
    image_url: Option<String>,
}

impl ProductDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn set_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
    pub fn set_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
    pub fn set_market_price(mut self, price: Money) -> Self {
        self.market_price = price;
        self
    }
    pub fn set_our_price(mut self, price: Money) -> Self {
        self.our_price = price;
        self
    }
    pub fn set_stock(mut self, stock: u32) -> Self {
        self.stock = stock;
        self
    }
    pub fn set_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }
    pub fn set_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if is_blank(&self.name) {
            return Err(ValidationError::MissingField("name"));
        }
        if is_blank(&self.description) {
            return Err(ValidationError::MissingField("description"));
        }
        if is_blank(&self.image_url) {
            return Err(ValidationError::MissingField("image"));
        }
        if self.market_price == 0 {
            return Err(ValidationError::InvalidPrice("market price"));
        }
        if self.our_price == 0 {
            return Err(ValidationError::InvalidPrice("our price"));
        }
        Ok(())
    }

    /// Validate and turn the draft into a pending product owned by `farmer_id`.
    pub fn finalise(self, id: String, farmer_id: &str) -> Result<Product, ValidationError> {
        self.validate()?;

        Ok(Product {
            id,
            name: self.name.unwrap_or_default().trim().to_string(),
            description: self.description.unwrap_or_default().trim().to_string(),
            category: self.category,
            market_price: self.market_price,
            our_price: self.our_price,
            stock: self.stock,
            unit: self.unit,
            image_url: self.image_url.unwrap_or_default(),
            farmer_id: farmer_id.to_string(),
            status: ApprovalStatus::Pending,
            created_at: TimeStamp::new(),
        })
    }

    /// Form fields for the multipart submission, in wire names.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone().unwrap_or_default()),
            ("description", self.description.clone().unwrap_or_default()),
            ("category", self.category.to_string()),
            ("marketPrice", rupees::to_rupee_string(self.market_price)),
            ("ourPrice", rupees::to_rupee_string(self.our_price)),
            ("stock", self.stock.to_string()),
            ("unit", self.unit.to_string()),
            ("imageUrl", self.image_url.clone().unwrap_or_default()),
        ]
    }
}

fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// Which products a listing shows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<Category>,
    pub status: Option<ApprovalStatus>,
    pub farmer_id: Option<String>,
}

impl ProductFilter {
    /// Everything, for admins.
    pub fn all() -> Self {
        Self::default()
    }

    /// What shoppers and anonymous visitors see.
    pub fn shopper() -> Self {
        Self {
            status: Some(ApprovalStatus::Approved),
            ..Self::default()
        }
    }

    /// Farmers see their own products whatever the status.
    pub fn farmer(farmer_id: impl Into<String>) -> Self {
        Self {
            farmer_id: Some(farmer_id.into()),
            ..Self::default()
        }
    }

    pub fn for_viewer(role: Role, user_id: &str) -> Self {
        match role {
            Role::Admin => Self::all(),
            Role::Farmer => Self::farmer(user_id),
            Role::User => Self::shopper(),
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn matches(&self, product: &Product) -> bool {
        self.category.is_none_or(|c| product.category == c)
            && self.status.is_none_or(|s| product.status == s)
            && self
                .farmer_id
                .as_deref()
                .is_none_or(|f| product.belongs_to(f))
    }

    pub fn apply(&self, products: impl IntoIterator<Item = Product>) -> Vec<Product> {
        products.into_iter().filter(|p| self.matches(p)).collect()
    }
}
