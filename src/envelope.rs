//! `{success: bool, ...}` response envelopes of the REST contract
use crate::account::UserAccount;
use crate::cart::CartLine;
use crate::error::RemoteError;
use crate::product::Product;
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Header {
    fn into_message(self) -> Option<String> {
        self.message.or(self.error)
    }
}

/// Decode a response body. Non-2xx statuses and `success: false` become errors.
pub fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, RemoteError> {
    let header = serde_json::from_str::<Header>(body).ok();

    if !(200..300).contains(&status) {
        let message = header
            .and_then(Header::into_message)
            .unwrap_or_else(|| body.trim().to_string());
        return Err(RemoteError::from_status(status, message));
    }

    let Some(header) = header else {
        return Err(RemoteError::Malformed(format!("not an envelope: {body}")));
    };
    if !header.success {
        let message = header
            .into_message()
            .unwrap_or_else(|| "request was not successful".to_string());
        return Err(RemoteError::Rejected(message));
    }

    serde_json::from_str(body).map_err(|e| RemoteError::Malformed(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ProductsPayload {
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub product: Product,
}

#[derive(Debug, Deserialize)]
pub struct CartPayload {
    pub cart: CartBody,
}

// totalAmount is not read, CartView derives it from the lines
#[derive(Debug, Deserialize)]
pub struct CartBody {
    #[serde(default)]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub token: String,
    pub user: UserAccount,
}

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    #[serde(alias = "farmer")]
    pub user: UserAccount,
}

#[derive(Debug, Deserialize)]
pub struct UsersPayload {
    pub data: UsersData,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsersData {
    #[serde(default)]
    pub users: Vec<UserAccount>,
    #[serde(default)]
    pub farmers: Vec<UserAccount>,
}

impl UsersData {
    /// Users and farmers in one list, without duplicates.
    pub fn into_accounts(self) -> Vec<UserAccount> {
        let mut accounts = self.users;
        for farmer in self.farmers {
            if !accounts.iter().any(|a| a.id == farmer.id) {
                accounts.push(farmer);
            }
        }
        accounts
    }
}
