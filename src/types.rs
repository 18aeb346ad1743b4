//! Shared value types: timestamps, roles, approval status, catalog enums
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Amounts are integer minor units (paise).
pub type Money = u64;

/// Wire format for [`Money`]: rupees as a JSON number, paise in memory.
///
/// Use with `#[serde(with = "crate::types::rupees")]`. Whole amounts are
/// written as integers, anything else as a decimal (`4050` -> `40.5`).
pub mod rupees {
    use super::Money;
    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    const PAISE_PER_RUPEE: Money = 100;

    /// Rupee string for form fields, always with two decimals.
    pub fn to_rupee_string(amount: Money) -> String {
        format!("{}.{:02}", amount / PAISE_PER_RUPEE, amount % PAISE_PER_RUPEE)
    }

    /// Convert a rupee amount to paise, rounding to the nearest paisa.
    pub fn from_rupees(rupees: f64) -> Option<Money> {
        let paise = (rupees * PAISE_PER_RUPEE as f64).round();
        (rupees.is_finite() && paise >= 0.0 && paise < Money::MAX as f64).then_some(paise as Money)
    }

    pub fn serialize<S: Serializer>(amount: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        if amount % PAISE_PER_RUPEE == 0 {
            serializer.serialize_u64(amount / PAISE_PER_RUPEE)
        } else {
            serializer.serialize_f64(*amount as f64 / PAISE_PER_RUPEE as f64)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        deserializer.deserialize_any(RupeeVisitor)
    }

    struct RupeeVisitor;

    impl Visitor<'_> for RupeeVisitor {
        type Value = Money;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative rupee amount")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
            v.checked_mul(PAISE_PER_RUPEE)
                .ok_or_else(|| E::invalid_value(Unexpected::Unsigned(v), &self))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
            match u64::try_from(v) {
                Ok(v) => self.visit_u64(v),
                Err(_) => Err(E::invalid_value(Unexpected::Signed(v), &self)),
            }
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
            from_rupees(v).ok_or_else(|| E::invalid_value(Unexpected::Float(v), &self))
        }

        // some backends send prices as strings
        fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
            match v.trim().parse::<f64>() {
                Ok(rupees) => self.visit_f64(rupees),
                Err(_) => Err(E::invalid_value(Unexpected::Str(v), &self)),
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    #[n(0)]
    User,
    #[n(1)]
    Farmer,
    #[n(2)]
    Admin,
}

/// Moderation state shared by products and farmer accounts.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    #[n(0)]
    Vegetables,
    #[n(1)]
    Fruits,
    #[n(2)]
    Dairy,
    #[n(3)]
    Grains,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    #[n(0)]
    Kg,
    #[n(1)]
    Gram,
    #[n(2)]
    Piece,
    #[n(3)]
    Dozen,
    #[n(4)]
    Liter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Farmer => "farmer",
            Role::Admin => "admin",
        }
    }
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Vegetables => "vegetables",
            Category::Fruits => "fruits",
            Category::Dairy => "dairy",
            Category::Grains => "grains",
        }
    }
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kg => "kg",
            Unit::Gram => "gram",
            Unit::Piece => "piece",
            Unit::Dozen => "dozen",
            Unit::Liter => "liter",
        }
    }
}

macro_rules! display_and_parse {
    ($ty:ty, [$($variant:path),+]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase();
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| anyhow::anyhow!("unknown {}: {s}", stringify!($ty)))
            }
        }
    };
}

display_and_parse!(Role, [Role::User, Role::Farmer, Role::Admin]);
display_and_parse!(
    ApprovalStatus,
    [ApprovalStatus::Pending, ApprovalStatus::Approved, ApprovalStatus::Rejected]
);
display_and_parse!(
    Category,
    [Category::Vegetables, Category::Fruits, Category::Dairy, Category::Grains]
);
display_and_parse!(Unit, [Unit::Kg, Unit::Gram, Unit::Piece, Unit::Dozen, Unit::Liter]);
