use serde::Serialize;

use crate::execution::PaperTrade;

/// Summary statistics for a backtest run
#[derive(Debug, Clone, Serialize)]
pub struct BacktestMetrics {
    // P&L
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_fees: f64,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64, // Total wins / Total losses

    // Risk
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
}

impl BacktestMetrics {
    /// Calculate metrics from closed paper trades (net of fees)
    pub fn from_trades(trades: &[PaperTrade], initial_balance: f64, final_balance: f64) -> Self {
        let total_trades = trades.len();
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let total_fees: f64 = trades.iter().map(|t| t.fees).sum();
        let total_return_pct = if initial_balance > 0.0 {
            (final_balance - initial_balance) / initial_balance * 100.0
        } else {
            0.0
        };

        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p <= 0.0).collect();

        let total_wins: f64 = wins.iter().sum();
        let total_losses: f64 = losses.iter().map(|p| p.abs()).sum();

        let win_rate = if total_trades > 0 {
            wins.len() as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };
        let avg_win = if wins.is_empty() { 0.0 } else { total_wins / wins.len() as f64 };
        let avg_loss = if losses.is_empty() {
            0.0
        } else {
            total_losses / losses.len() as f64
        };

        let largest_win = wins.iter().copied().fold(0.0, f64::max);
        let largest_loss = losses.iter().copied().fold(0.0, f64::min);

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = Self::calculate_drawdown(trades, initial_balance);

        Self {
            total_pnl,
            total_return_pct,
            initial_balance,
            final_balance,
            total_fees,
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
        }
    }

    /// Peak-to-trough drop of the closed-trade equity curve
    fn calculate_drawdown(trades: &[PaperTrade], initial_balance: f64) -> (f64, f64) {
        let mut peak = initial_balance;
        let mut equity = initial_balance;
        let mut max_dd: f64 = 0.0;
        let mut max_dd_pct: f64 = 0.0;

        for trade in trades {
            equity += trade.pnl;
            peak = peak.max(equity);

            let drawdown = peak - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
                max_dd_pct = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
            }
        }

        (max_dd, max_dd_pct)
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n=== BACKTEST PERFORMANCE REPORT ===\n");

        println!("P&L");
        println!("  Initial balance:  {:.2}", self.initial_balance);
        println!("  Final balance:    {:.2}", self.final_balance);
        println!("  Net P&L:          {:.2}", self.total_pnl);
        println!("  Return:           {:.2}%", self.total_return_pct);
        println!("  Fees paid:        {:.2}", self.total_fees);

        println!("\nTrades");
        println!("  Total:            {}", self.total_trades);
        println!(
            "  Won / lost:       {} / {} ({:.1}%)",
            self.winning_trades, self.losing_trades, self.win_rate
        );
        println!("  Avg win:          {:.2}", self.avg_win);
        println!("  Avg loss:         {:.2}", self.avg_loss);
        println!("  Largest win:      {:.2}", self.largest_win);
        println!("  Largest loss:     {:.2}", self.largest_loss);
        println!("  Profit factor:    {:.2}", self.profit_factor);

        println!("\nRisk");
        println!(
            "  Max drawdown:     {:.2} ({:.2}%)",
            self.max_drawdown, self.max_drawdown_pct
        );
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeSide;
    use chrono::Utc;
    use uuid::Uuid;

    fn trade(pnl: f64) -> PaperTrade {
        PaperTrade {
            id: Uuid::new_v4(),
            symbol: "BTC_USDT".to_string(),
            side: TradeSide::Buy,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            size: 1.0,
            pnl,
            fees: 0.1,
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn test_metrics_from_trades() {
        let trades = vec![trade(50.0), trade(-20.0), trade(30.0), trade(-10.0)];
        let metrics = BacktestMetrics::from_trades(&trades, 1000.0, 1050.0);

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.win_rate, 50.0);
        assert_eq!(metrics.total_pnl, 50.0);
        assert_eq!(metrics.avg_win, 40.0);
        assert_eq!(metrics.avg_loss, 15.0);
        assert_eq!(metrics.largest_loss, -20.0);
        assert!((metrics.profit_factor - 80.0 / 30.0).abs() < 1e-9);
        assert!((metrics.total_fees - 0.4).abs() < 1e-9);
        assert_eq!(metrics.total_return_pct, 5.0);
    }

    #[test]
    fn test_drawdown() {
        // 1000 -> 1100 -> 1050 -> 980 -> 1200
        let trades = vec![trade(100.0), trade(-50.0), trade(-70.0), trade(220.0)];
        let metrics = BacktestMetrics::from_trades(&trades, 1000.0, 1200.0);

        assert_eq!(metrics.max_drawdown, 120.0);
        assert!((metrics.max_drawdown_pct - 120.0 / 1100.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_trades() {
        let metrics = BacktestMetrics::from_trades(&[], 1000.0, 1000.0);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.profit_factor, 0.0);
    }
}
