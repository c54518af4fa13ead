//! Customer notifications. There is no mail transport; every message is a structured log event
//! under the `notify` target so a log shipper can route it.
use chrono::{DateTime, Utc};
use shop::{orders::Order, users::User};
use tracing::info;

pub fn order_confirmation(email: &str, order: &Order) {
    info!(
        target: "notify",
        email,
        order = %order.id,
        items = order.order_items.len(),
        total = order.total_amount,
        tracking = %order.tracking_number,
        "Sending order confirmation"
    );
}

pub fn order_status(email: &str, order: &Order) {
    info!(
        target: "notify",
        email,
        order = %order.id,
        status = %order.order_status,
        "Sending order status update"
    );
}

pub fn reset_code(user: &User, code: &str, expires_at: DateTime<Utc>) {
    info!(
        target: "notify",
        user = %user.id,
        email = %user.email,
        code,
        expires_at = %expires_at,
        "Sending password reset verification code"
    );
}

pub fn deactivated(user: &User) {
    info!(
        target: "notify",
        user = %user.id,
        email = %user.email,
        "User account deactivated, access revoked"
    );
}
