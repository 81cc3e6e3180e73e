//! Pure valuation arithmetic. Nothing in here touches storage.

use rust_decimal::Decimal;
use stockledger_core::{LedgerEntry, average_price};

/// Running quantity and value of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub balance: Decimal,
    pub value: Decimal,
}

impl Position {
    pub const ZERO: Position = Position {
        balance: Decimal::ZERO,
        value: Decimal::ZERO,
    };

    pub fn new(balance: Decimal, value: Decimal) -> Self {
        Self { balance, value }
    }

    pub fn after(entry: &LedgerEntry) -> Self {
        Self {
            balance: entry.running_balance,
            value: entry.running_value,
        }
    }

    pub fn average_price(&self, fallback: Decimal) -> Decimal {
        average_price(self.balance, self.value, fallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Movement {
    pub quantity_in: Decimal,
    pub quantity_out: Decimal,
    pub unit_price: Decimal,
    /// Value added by the inbound quantity; `quantity_in * unit_price` unless the
    /// inflow arrived as several cost slices.
    pub inflow_value: Decimal,
}

impl Movement {
    pub fn new(quantity_in: Decimal, quantity_out: Decimal, unit_price: Decimal) -> Self {
        Self {
            quantity_in,
            quantity_out,
            unit_price,
            inflow_value: quantity_in * unit_price,
        }
    }

    pub fn with_inflow_value(mut self, inflow_value: Decimal) -> Self {
        self.inflow_value = inflow_value;
        self
    }
}

/// How the outbound part of a movement is costed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutflowCost {
    /// Weighted-average formula over the prior position.
    Average,
    /// Total cost of the layers (or synthesized slices) actually consumed.
    Consumed(Decimal),
}

pub fn value_movement(
    prior: Position,
    movement: &Movement,
    outflow: OutflowCost,
    cost_scale: u32,
) -> Position {
    match outflow {
        OutflowCost::Average => weighted_average(prior, movement, cost_scale),
        OutflowCost::Consumed(consumed_cost) => layered(prior, movement, consumed_cost),
    }
}

pub fn weighted_average(prior: Position, movement: &Movement, cost_scale: u32) -> Position {
    let total_value = prior.value + movement.inflow_value;
    let total_quantity = prior.balance + movement.quantity_in;
    let balance = total_quantity - movement.quantity_out;

    if movement.quantity_out.is_zero() {
        return Position::new(balance, total_value);
    }
    // issuing everything on hand must not leave rounding dust behind
    if balance.is_zero() {
        return Position::new(balance, Decimal::ZERO);
    }

    let average = if total_quantity > Decimal::ZERO {
        (total_value / total_quantity).round_dp(cost_scale)
    } else {
        movement.unit_price
    };

    Position::new(balance, total_value - movement.quantity_out * average)
}

pub fn layered(prior: Position, movement: &Movement, consumed_cost: Decimal) -> Position {
    Position::new(
        prior.balance + movement.quantity_in - movement.quantity_out,
        prior.value + movement.inflow_value - consumed_cost,
    )
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn weighted_average_receipt_then_issue() {
        let prior = Position::new(dec!(100), dec!(1000));

        let received = weighted_average(prior, &Movement::new(dec!(50), dec!(0), dec!(14)), 6);
        assert_eq!(received, Position::new(dec!(150), dec!(1700)));
        assert_eq!(received.average_price(dec!(0)).round_dp(2), dec!(11.33));

        let issued = weighted_average(received, &Movement::new(dec!(0), dec!(60), dec!(0)), 6);
        assert_eq!(issued.balance, dec!(90));
        assert_eq!(issued.value.round_dp(2), dec!(1020.00));
    }

    #[test]
    fn weighted_average_from_empty_uses_movement_price() {
        let position = weighted_average(
            Position::ZERO,
            &Movement::new(dec!(0), dec!(5), dec!(8)),
            6,
        );
        assert_eq!(position, Position::new(dec!(-5), dec!(-40)));
    }

    #[test]
    fn weighted_average_clears_value_when_emptied() {
        let prior = Position::new(dec!(150), dec!(1700));
        let position = weighted_average(prior, &Movement::new(dec!(0), dec!(150), dec!(0)), 6);
        assert_eq!(position, Position::new(dec!(0), dec!(0)));
    }

    #[test]
    fn layered_subtracts_consumed_cost() {
        let prior = Position::new(dec!(10), dec!(150));
        let position = value_movement(
            prior,
            &Movement::new(dec!(0), dec!(7), dec!(0)),
            OutflowCost::Consumed(dec!(90)),
            6,
        );
        assert_eq!(position, Position::new(dec!(3), dec!(60)));
    }

    #[test]
    fn inflow_value_overrides_quantity_times_price() {
        let movement = Movement::new(dec!(10), dec!(0), dec!(15)).with_inflow_value(dec!(145));
        let position = layered(Position::ZERO, &movement, dec!(0));
        assert_eq!(position.value, dec!(145));
    }
}
