use crate::error::BotError;
use crate::Result;

/// How many contracts to open on a new position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingPolicy {
    /// Always the same contract count
    Fixed { amount: f64 },
    /// Split leveraged balance evenly across traded symbols
    Balance { leverage: f64 },
}

impl SizingPolicy {
    /// Contract count for an order at `price`
    ///
    /// Balance sizing floors to whole contracts; a result of zero is an
    /// order error rather than a silent no-op.
    pub fn order_size(
        &self,
        price: f64,
        balance: f64,
        contract_multiplier: f64,
        symbol_count: usize,
    ) -> Result<f64> {
        let size = match *self {
            SizingPolicy::Fixed { amount } => amount,
            SizingPolicy::Balance { leverage } => {
                if price <= 0.0 || contract_multiplier <= 0.0 {
                    return Err(BotError::Order(format!(
                        "cannot size order at price {} with multiplier {}",
                        price, contract_multiplier
                    )));
                }
                let contract_value = price * contract_multiplier;
                (balance * leverage / contract_value / symbol_count.max(1) as f64).floor()
            }
        };

        if !size.is_finite() || size <= 0.0 {
            return Err(BotError::Order(format!(
                "order size rounds to zero (balance {:.2}, price {})",
                balance, price
            )));
        }

        Ok(size)
    }
}
