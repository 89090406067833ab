use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ValidationError;

pub const ORDER_PLACED_MESSAGE: &str =
    "Your order has been successfully placed. Thank you for shopping with us!";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    /// Time-ordered id, so ids sort by placement time.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Finds the first UUID-shaped token in free text.
    pub fn find_in(text: &str) -> Option<Self> {
        text.split(|ch: char| !(ch.is_ascii_hexdigit() || ch == '-'))
            .filter(|token| token.len() == 36)
            .find_map(|token| Uuid::parse_str(token).ok())
            .map(|uuid| Self(uuid.to_string()))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub title: String,
    #[serde(alias = "Price")]
    pub price: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl CartItem {
    pub fn checked_subtotal(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }

    /// Saturates at `Decimal::MAX`; carts from `parse_cart` never reach it.
    pub fn subtotal(&self) -> Decimal {
        self.price.saturating_mul(Decimal::from(self.quantity))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

impl fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}, {}", self.street, self.city, self.state, self.zip_code)
    }
}

/// Card details as typed by the user. Only the last four digits outlive the order.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentDetails {
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
}

impl PaymentDetails {
    pub fn new(
        card_number: impl Into<String>,
        expiry_date: impl Into<String>,
        cvv: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let details = Self {
            card_number: card_number.into(),
            expiry_date: expiry_date.into(),
            cvv: cvv.into(),
        };
        validate_card_number(&details.card_number)?;
        validate_expiry_date(&details.expiry_date)?;
        validate_cvv(&details.cvv)?;
        Ok(details)
    }

    pub fn card_last4(&self) -> String {
        let start = self.card_number.len().saturating_sub(4);
        self.card_number[start..].to_string()
    }
}

impl fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentDetails")
            .field("card_number", &format!("****{}", self.card_last4()))
            .field("expiry_date", &self.expiry_date)
            .field("cvv", &"***")
            .finish()
    }
}

pub fn validate_card_number(value: &str) -> Result<(), ValidationError> {
    if value.len() == 16 && value.chars().all(|ch| ch.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::CardNumber)
    }
}

/// Syntactic `MM/YY` check; the month range is not enforced.
pub fn validate_expiry_date(value: &str) -> Result<(), ValidationError> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 5
        && bytes[2] == b'/'
        && bytes[..2].iter().chain(&bytes[3..]).all(u8::is_ascii_digit);
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::ExpiryDate)
    }
}

pub fn validate_cvv(value: &str) -> Result<(), ValidationError> {
    if value.len() == 3 && value.chars().all(|ch| ch.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::Cvv)
    }
}

/// Parses `"Street, City, State, ZIP"`. Extra leading segments fold into the street.
pub fn parse_address(text: &str) -> Result<ShippingAddress, ValidationError> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() < 4 || parts.iter().any(|part| part.is_empty()) {
        return Err(ValidationError::AddressFormat);
    }

    let split = parts.len() - 3;
    Ok(ShippingAddress {
        street: parts[..split].join(", "),
        city: parts[split].to_string(),
        state: parts[split + 1].to_string(),
        zip_code: parts[split + 2].to_string(),
    })
}

/// Parses `"CARDNUM MM/YY CVV"`.
pub fn parse_payment(text: &str) -> Result<PaymentDetails, ValidationError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [card_number, expiry_date, cvv] = tokens.as_slice() else {
        return Err(ValidationError::PaymentFormat);
    };
    PaymentDetails::new(*card_number, *expiry_date, *cvv)
}

pub fn parse_cart(value: &Value) -> Result<Vec<CartItem>, ValidationError> {
    let Some(entries) = value.as_array() else {
        return Err(ValidationError::InvalidCartItem("cart must be a list".to_string()));
    };
    if entries.is_empty() {
        return Err(ValidationError::EmptyCart);
    }

    let items = entries
        .iter()
        .map(|entry| {
            let item = serde_json::from_value::<CartItem>(entry.clone())
                .map_err(|error| ValidationError::InvalidCartItem(error.to_string()))?;
            if item.title.trim().is_empty() {
                return Err(ValidationError::InvalidCartItem("title is empty".to_string()));
            }
            if item.quantity == 0 {
                return Err(ValidationError::InvalidCartItem("quantity must be positive".to_string()));
            }
            if item.price.is_sign_negative() {
                return Err(ValidationError::InvalidCartItem("price is negative".to_string()));
            }
            Ok(item)
        })
        .collect::<Result<Vec<_>, _>>()?;

    checked_total(&items)
        .ok_or_else(|| ValidationError::InvalidCartItem("total out of range".to_string()))?;
    Ok(items)
}

fn checked_total(items: &[CartItem]) -> Option<Decimal> {
    items.iter().try_fold(Decimal::ZERO, |total, item| total.checked_add(item.checked_subtotal()?))
}

/// A fully-formed order request: `{order_data: [...], user_details: {...}}`.
#[derive(Clone, Debug, PartialEq)]
pub struct BulkOrderRequest {
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub address: ShippingAddress,
    pub payment: PaymentDetails,
}

impl BulkOrderRequest {
    /// Validates in a fixed order and reports the first failure.
    pub fn from_value(payload: &Value) -> Result<Self, ValidationError> {
        let (Some(order_data), Some(user_details)) =
            (payload.get("order_data"), payload.get("user_details"))
        else {
            return Err(ValidationError::InvalidPayloadShape);
        };
        let Some(details) = user_details.as_object() else {
            return Err(ValidationError::InvalidPayloadShape);
        };

        let has_flat_address = ["street", "city", "state"].iter().all(|key| details.contains_key(*key))
            && (details.contains_key("zip_code") || details.contains_key("zip"));
        let mut missing = Vec::new();
        if !details.contains_key("user_id") {
            missing.push("user_id".to_string());
        }
        if !details.contains_key("address") && !has_flat_address {
            missing.push("address".to_string());
        }
        for field in ["cardNumber", "expiryDate", "cvv"] {
            if !details.contains_key(field) {
                missing.push(field.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let card_number = text_field(user_details, "cardNumber");
        validate_card_number(&card_number)?;
        let expiry_date = text_field(user_details, "expiryDate");
        validate_expiry_date(&expiry_date)?;
        let cvv = text_field(user_details, "cvv");
        validate_cvv(&cvv)?;

        let user_id = text_field(user_details, "user_id");
        if user_id.trim().is_empty() {
            return Err(ValidationError::MissingUserId);
        }

        let address = match user_details.get("address") {
            Some(Value::String(text)) => parse_address(text)?,
            Some(nested @ Value::Object(_)) => address_from_fields(nested)?,
            Some(_) => return Err(ValidationError::AddressFormat),
            None => address_from_fields(user_details)?,
        };

        let items = parse_cart(order_data)?;
        Ok(Self {
            user_id: user_id.trim().to_string(),
            items,
            address,
            payment: PaymentDetails { card_number, expiry_date, cvv },
        })
    }
}

fn text_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn address_from_fields(value: &Value) -> Result<ShippingAddress, ValidationError> {
    let zip_code = match text_field(value, "zip_code") {
        zip if zip.is_empty() => text_field(value, "zip"),
        zip => zip,
    };
    let address = ShippingAddress {
        street: text_field(value, "street"),
        city: text_field(value, "city"),
        state: text_field(value, "state"),
        zip_code,
    };
    let complete = [&address.street, &address.city, &address.state, &address.zip_code]
        .iter()
        .all(|part| !part.is_empty());
    if complete {
        Ok(address)
    } else {
        Err(ValidationError::AddressFormat)
    }
}

/// An order ready to persist: one row per item, all sharing `order_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub address: ShippingAddress,
    pub card_last4: String,
    pub expiry_date: String,
    pub purchased_at: DateTime<Utc>,
    pub expected_delivery: NaiveDate,
}

impl NewOrder {
    pub fn new(
        user_id: impl Into<String>,
        items: Vec<CartItem>,
        address: ShippingAddress,
        payment: &PaymentDetails,
        purchased_at: DateTime<Utc>,
        delivery_days: u32,
    ) -> Self {
        let expected_delivery =
            (purchased_at + Duration::days(i64::from(delivery_days))).date_naive();
        Self {
            order_id: OrderId::generate(),
            user_id: user_id.into(),
            items,
            address,
            card_last4: payment.card_last4(),
            expiry_date: payment.expiry_date.clone(),
            purchased_at,
            expected_delivery,
        }
    }

    pub fn total_cost(&self) -> Decimal {
        self.items.iter().map(CartItem::subtotal).fold(Decimal::ZERO, Decimal::saturating_add)
    }

    pub fn confirmation(&self) -> OrderConfirmation {
        OrderConfirmation {
            order_id: self.order_id.0.clone(),
            total_cost: format_money(self.total_cost()),
            order_placed_on: self.purchased_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            expected_delivery: self.expected_delivery.format("%Y-%m-%d").to_string(),
            status: "success".to_string(),
            message: ORDER_PLACED_MESSAGE.to_string(),
        }
    }
}

pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub total_cost: String,
    pub order_placed_on: String,
    pub expected_delivery: String,
    pub status: String,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Delivered,
    #[serde(rename = "In Transit")]
    InTransit,
}

impl DeliveryStatus {
    pub fn at(expected_delivery: NaiveDate, now: DateTime<Utc>) -> Self {
        if now.date_naive() >= expected_delivery {
            Self::Delivered
        } else {
            Self::InTransit
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub title: String,
    pub price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

/// A stored order as read back for its owner.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderDetail {
    pub order_id: OrderId,
    pub user_id: String,
    pub items: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub purchased_at: DateTime<Utc>,
    pub expected_delivery: NaiveDate,
}

impl OrderDetail {
    pub fn total_cost(&self) -> Decimal {
        self.items.iter().map(|line| line.subtotal).fold(Decimal::ZERO, Decimal::saturating_add)
    }

    pub fn to_info(&self, now: DateTime<Utc>) -> OrderInfo {
        OrderInfo {
            order_id: self.order_id.0.clone(),
            total_cost: format_money(self.total_cost()),
            order_placed_on: self.purchased_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            expected_delivery: self.expected_delivery.format("%Y-%m-%d").to_string(),
            status: DeliveryStatus::at(self.expected_delivery, now),
            message: "Order details retrieved successfully.".to_string(),
            shipping_address: self.shipping_address.clone(),
            items: self.items.clone(),
        }
    }

    pub fn to_summary(&self, now: DateTime<Utc>) -> OrderSummary {
        OrderSummary {
            order_id: self.order_id.0.clone(),
            total_cost: format_money(self.total_cost()),
            order_placed_on: self.purchased_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            expected_delivery: self.expected_delivery.format("%Y-%m-%d").to_string(),
            item_count: self.items.iter().map(|line| line.quantity).fold(0, u32::saturating_add),
            status: DeliveryStatus::at(self.expected_delivery, now),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    pub total_cost: String,
    pub order_placed_on: String,
    pub expected_delivery: String,
    pub status: DeliveryStatus,
    pub message: String,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub total_cost: String,
    pub order_placed_on: String,
    pub expected_delivery: String,
    pub item_count: u32,
    pub status: DeliveryStatus,
}
