//! Revenue-decline check against a customer's established revenue.

use rust_decimal::Decimal;

use crate::domain::customer::{CustomerId, DeliveredOrder};
use crate::errors::DomainError;

/// Orders averaged for the recent-revenue side of the comparison.
pub const RECENT_REVENUE_ORDERS: usize = 3;

/// True when the mean of the newest usable order totals sits strictly below
/// `established_revenue * (1 - decline_percent)`.
///
/// Missing data is never a decline: no baseline, or no positive totals among the
/// newest [`RECENT_REVENUE_ORDERS`] orders, reports `false`. A negative total is
/// malformed input and fails the classification for that customer.
pub fn is_revenue_declined(
    customer_id: &CustomerId,
    orders: &[DeliveredOrder],
    established_revenue: Option<Decimal>,
    decline_percent: Decimal,
) -> Result<bool, DomainError> {
    let recent = &orders[..orders.len().min(RECENT_REVENUE_ORDERS)];

    let mut totals = Vec::with_capacity(recent.len());
    for order in recent {
        match order.total {
            Some(total) if total < Decimal::ZERO => {
                return Err(DomainError::InvalidOrderTotal {
                    customer_id: customer_id.clone(),
                    order_id: order.id.clone(),
                });
            }
            Some(total) if total > Decimal::ZERO => totals.push(total),
            _ => {}
        }
    }

    let Some(established) = established_revenue.filter(|value| *value > Decimal::ZERO) else {
        return Ok(false);
    };
    if totals.is_empty() {
        return Ok(false);
    }

    let recent_average = totals.iter().copied().sum::<Decimal>() / Decimal::from(totals.len());
    let floor = established * (Decimal::ONE - decline_percent);
    Ok(recent_average < floor)
}
