use thiserror::Error;

use crate::flows::FlowTransitionError;

/// Malformed or missing user-supplied order fields.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload must contain both order_data and user_details")]
    InvalidPayloadShape,
    #[error("missing required fields: {0:?}")]
    MissingFields(Vec<String>),
    #[error("card number must be 16 digits")]
    CardNumber,
    #[error("expiry date must be MM/YY")]
    ExpiryDate,
    #[error("cvv must be 3 digits")]
    Cvv,
    #[error("user id is missing")]
    MissingUserId,
    #[error("address must have at least street, city, state and zip")]
    AddressFormat,
    #[error("payment must be card number, expiry and cvv")]
    PaymentFormat,
    #[error("cart is empty")]
    EmptyCart,
    #[error("cart item is invalid: {0}")]
    InvalidCartItem(String),
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidPayloadShape => {
                "Invalid order format. Please include both order and user details.".to_string()
            }
            Self::MissingFields(fields) => {
                format!("Missing required fields: {}", fields.join(", "))
            }
            Self::CardNumber => "Card number must be 16 digits.".to_string(),
            Self::ExpiryDate => "Expiry date must be in MM/YY format.".to_string(),
            Self::Cvv => "CVV must be 3 digits.".to_string(),
            Self::MissingUserId => "User ID is missing.".to_string(),
            Self::AddressFormat => {
                "Please provide your address as: Street, City, State, ZIP.".to_string()
            }
            Self::PaymentFormat => {
                "Please provide payment as: CARD_NUMBER MM/YY CVV.".to_string()
            }
            Self::EmptyCart => "Your cart is empty. Add a book before placing an order.".to_string(),
            Self::InvalidCartItem(_) => {
                "One of the items in your cart is invalid. Please review your cart.".to_string()
            }
        }
    }
}

/// How a failure is presented to a chat client. User input problems never
/// get here: they are answered with an error envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Unavailable,
    Internal,
}

impl FailureClass {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Unavailable => "The service is temporarily unavailable. Please retry shortly.",
            Self::Internal => "An unexpected internal error occurred.",
        }
    }
}

/// Failures that abort a request instead of producing an envelope.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error("catalog failure: {0}")]
    Catalog(String),
}

impl ApplicationError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Catalog(_) => FailureClass::Unavailable,
            Self::Flow(_) => FailureClass::Internal,
        }
    }

    /// Tags the error with `correlation_id` for the client response. The
    /// detail text is kept for logs only.
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        InterfaceError {
            class: self.class(),
            detail: self.to_string(),
            correlation_id: correlation_id.into(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{class:?} [{correlation_id}]: {detail}")]
pub struct InterfaceError {
    pub class: FailureClass,
    pub detail: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        self.class.user_message()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}
