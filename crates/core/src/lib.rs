pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod text;

pub use domain::book::{normalize_title, BookRecord, RecommendationCandidate, RecommendedBook};
pub use domain::conversation::{ConversationMemory, ConversationTurn, Message, Metadata, Role};
pub use domain::envelope::{Payload, ResponseEnvelope, ResponseKind, NEXT_NODE_END};
pub use domain::order::{
    BulkOrderRequest, CartItem, DeliveryStatus, NewOrder, OrderConfirmation, OrderDetail,
    OrderId, OrderInfo, OrderLine, OrderSummary, PaymentDetails, ShippingAddress,
};
pub use errors::{ApplicationError, FailureClass, InterfaceError, ValidationError};
